use crate::catalog::Catalog;
use crate::model::{
    Activity, Category, Curriculum, CurriculumItem, CurriculumSettings, FixedSession,
    FixedSessionKind, ItemOrigin, Pathway, Period, Profile, SettingsError,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

/// Where each questionnaire/coaching pair lands.
pub const FIXED_CYCLE: [(Period, u8); 3] = [
    (Period::September, 1),
    (Period::January, 2),
    (Period::May, 3),
];

// Vision, Effort, Systems, Practice, Attitude
const PROFILE_WEIGHTS: [[f64; 5]; 5] = [
    [0.28, 0.24, 0.20, 0.14, 0.14],
    [0.24, 0.24, 0.20, 0.16, 0.16],
    [0.20, 0.20, 0.20, 0.20, 0.20],
    [0.16, 0.18, 0.20, 0.24, 0.22],
    [0.14, 0.16, 0.20, 0.26, 0.24],
];
const ACADEMIC_WEIGHTS: [f64; 5] = [0.18, 0.20, 0.24, 0.24, 0.14];
const VOCATIONAL_WEIGHTS: [f64; 5] = [0.22, 0.22, 0.18, 0.20, 0.18];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorTuning {
    /// Subtracted from a category's score when the period already holds it.
    pub same_period_penalty: f64,
    /// Upper bound of the uniform tiebreak added to every score.
    pub jitter: f64,
}

impl Default for GeneratorTuning {
    fn default() -> Self {
        Self {
            same_period_penalty: 0.75,
            jitter: 0.1,
        }
    }
}

/// Desired share per category, indexed by `Category::index`.
/// A specific pathway replaces the profile row entirely.
pub fn category_weights(settings: &CurriculumSettings) -> [f64; 5] {
    match settings.pathway {
        Pathway::Academic => ACADEMIC_WEIGHTS,
        Pathway::Vocational => VOCATIONAL_WEIGHTS,
        Pathway::Both => {
            let row = match settings.profile {
                Profile::VeryLow => 0,
                Profile::Low => 1,
                Profile::Mid => 2,
                Profile::High => 3,
                Profile::VeryHigh => 4,
            };
            PROFILE_WEIGHTS[row]
        }
    }
}

pub fn fixed_session_category(kind: FixedSessionKind) -> Category {
    match kind {
        FixedSessionKind::Questionnaire => Category::Vision,
        FixedSessionKind::Coaching => Category::Attitude,
    }
}

pub fn fixed_session_activity(session: FixedSession) -> Activity {
    let (slug, name, summary) = match session.kind {
        FixedSessionKind::Questionnaire => (
            "questionnaire",
            format!("Cycle {} VESPA Questionnaire", session.cycle),
            "Students complete the VESPA questionnaire and review their scores.",
        ),
        FixedSessionKind::Coaching => (
            "coaching",
            format!("Cycle {} Coaching Conversation", session.cycle),
            "One-to-one reflection on the questionnaire results and next steps.",
        ),
    };
    Activity {
        id: format!("fixed-cycle{}-{}", session.cycle, slug),
        name,
        category: fixed_session_category(session.kind),
        level: None,
        pathway: Pathway::Both,
        summary: summary.to_string(),
        guidance: String::new(),
        assets: Vec::new(),
    }
}

pub(crate) fn new_item(
    activity: Activity,
    period: Period,
    fixed_session: Option<FixedSession>,
    origin: ItemOrigin,
) -> CurriculumItem {
    CurriculumItem {
        uid: Uuid::new_v4().to_string(),
        activity,
        period,
        sequence: 0,
        fixed_session,
        origin,
        notes: None,
    }
}

fn choose_category<R: Rng>(
    weights: &[f64; 5],
    counts: &[usize; 5],
    in_period: &[Category],
    tuning: &GeneratorTuning,
    rng: &mut R,
) -> Category {
    let placed: usize = counts.iter().sum();
    let mut best = Category::ALL[0];
    let mut best_score = f64::NEG_INFINITY;
    for c in Category::ALL {
        let i = c.index();
        let mut score = weights[i] * placed as f64 + 1.0 - counts[i] as f64;
        if in_period.contains(&c) {
            score -= tuning.same_period_penalty;
        }
        score += rng.gen::<f64>() * tuning.jitter;
        if score > best_score {
            best = c;
            best_score = score;
        }
    }
    best
}

/// Build a balanced curriculum for one cohort.
///
/// Every run is seeded: pass `seed` to reproduce an earlier result, or leave
/// it empty to draw one from entropy. The seed used is recorded on the
/// returned curriculum. Running out of eligible activities ends generation
/// early; the result is then shorter than `itemsPerPeriod * 11`.
pub fn generate(
    catalog: &Catalog,
    settings: &CurriculumSettings,
    tuning: &GeneratorTuning,
    seed: Option<u64>,
) -> Result<Curriculum, SettingsError> {
    settings.validate()?;
    let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut rng = StdRng::seed_from_u64(seed);

    let mut pool: Vec<&Activity> = catalog.eligible(settings).collect();
    pool.sort_by_key(|a| !a.has_document());

    let mut items: Vec<CurriculumItem> = Vec::new();
    let mut counts = [0usize; 5];
    let mut fixed_in_period = [0usize; 11];

    if settings.include_fixed_sessions {
        for (period, cycle) in FIXED_CYCLE {
            for kind in [FixedSessionKind::Questionnaire, FixedSessionKind::Coaching] {
                let session = FixedSession { cycle, kind };
                let activity = fixed_session_activity(session);
                counts[activity.category.index()] += 1;
                fixed_in_period[period.index()] += 1;
                items.push(new_item(activity, period, Some(session), ItemOrigin::Generated));
            }
        }
    }

    let weights = category_weights(settings);
    let mut used: HashSet<&str> = HashSet::new();

    'periods: for period in Period::ALL {
        let free = (settings.items_per_period as usize)
            .saturating_sub(fixed_in_period[period.index()]);
        let mut in_period: Vec<Category> = items
            .iter()
            .filter(|i| i.period == period)
            .map(|i| i.activity.category)
            .collect();
        for _ in 0..free {
            if used.len() >= pool.len() {
                break 'periods;
            }
            let category = choose_category(&weights, &counts, &in_period, tuning, &mut rng);
            let pick = pool
                .iter()
                .find(|a| a.category == category && !used.contains(a.id.as_str()))
                .or_else(|| pool.iter().find(|a| !used.contains(a.id.as_str())))
                .copied();
            let Some(activity) = pick else {
                break 'periods;
            };
            used.insert(activity.id.as_str());
            counts[activity.category.index()] += 1;
            in_period.push(activity.category);
            items.push(new_item(
                activity.clone(),
                period,
                None,
                ItemOrigin::Generated,
            ));
        }
    }

    // Stable: insertion order breaks ties within (period, fixed-first).
    items.sort_by_key(|i| (i.period.index(), !i.is_fixed()));
    for (idx, item) in items.iter_mut().enumerate() {
        item.sequence = idx as u32 + 1;
    }

    info!(
        seed,
        pool = pool.len(),
        items = items.len(),
        requested = settings.requested_slots(),
        "curriculum generated"
    );
    Ok(Curriculum {
        settings: settings.clone(),
        items,
        seed,
        generated_at: Utc::now(),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBalance {
    pub category: Category,
    pub desired_share: f64,
    pub desired: f64,
    pub actual: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodFill {
    pub period: Period,
    pub capacity: usize,
    pub filled: usize,
    pub fixed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceReport {
    pub total: usize,
    pub requested: usize,
    pub categories: Vec<CategoryBalance>,
    pub periods: Vec<PeriodFill>,
}

/// Desired vs actual category mix. Informational only; nothing enforces it.
pub fn balance(curriculum: &Curriculum) -> BalanceReport {
    let weights = category_weights(&curriculum.settings);
    let total = curriculum.items.len();
    let categories = Category::ALL
        .into_iter()
        .map(|c| CategoryBalance {
            category: c,
            desired_share: weights[c.index()],
            desired: weights[c.index()] * total as f64,
            actual: curriculum
                .items
                .iter()
                .filter(|i| i.activity.category == c)
                .count(),
        })
        .collect();
    let periods = Period::ALL
        .into_iter()
        .map(|p| PeriodFill {
            period: p,
            capacity: curriculum.settings.items_per_period as usize,
            filled: curriculum.items_in(p).count(),
            fixed: curriculum.items_in(p).filter(|i| i.is_fixed()).count(),
        })
        .collect();
    BalanceReport {
        total,
        requested: curriculum.settings.requested_slots(),
        categories,
        periods,
    }
}
