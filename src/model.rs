use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Category {
    Vision,
    Effort,
    Systems,
    Practice,
    Attitude,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Vision,
        Category::Effort,
        Category::Systems,
        Category::Practice,
        Category::Attitude,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Vision => "Vision",
            Self::Effort => "Effort",
            Self::Systems => "Systems",
            Self::Practice => "Practice",
            Self::Attitude => "Attitude",
        }
    }

    /// Accepts the full label in any case, or its initial letter.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "vision" | "v" => Some(Self::Vision),
            "effort" | "e" => Some(Self::Effort),
            "systems" | "s" => Some(Self::Systems),
            "practice" | "p" => Some(Self::Practice),
            "attitude" | "a" => Some(Self::Attitude),
            _ => None,
        }
    }
}

impl TryFrom<String> for Category {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown category: {}", value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Level {
    #[serde(rename = "Level 2")]
    Level2,
    #[serde(rename = "Level 3")]
    Level3,
}

impl Level {
    /// Years 7-11 sit in the Level 2 bucket; sixth form (12-13) is Level 3.
    pub fn for_year_group(year_group: u8) -> Self {
        if year_group >= 12 {
            Self::Level3
        } else {
            Self::Level2
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Level2 => "Level 2",
            Self::Level3 => "Level 3",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let compact: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match compact.as_str() {
            "level2" | "l2" | "2" => Some(Self::Level2),
            "level3" | "l3" | "3" => Some(Self::Level3),
            _ => None,
        }
    }

    /// Reads a catalog level tag, which may list several stages
    /// (`"Level 2, Level 3"`, `"L2/L3"`). A tag covering both stages places
    /// no restriction and reads as `Some(None)`. Unknown stages give `None`.
    pub fn parse_tag(raw: &str) -> Option<Option<Self>> {
        if matches!(raw.trim().to_ascii_lowercase().as_str(), "both" | "all") {
            return Some(None);
        }
        let mut found: Option<Self> = None;
        for part in raw.split([',', '/', '&', '+', ';']) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let level = Self::parse(part)?;
            match found {
                Some(prev) if prev != level => return Some(None),
                _ => found = Some(level),
            }
        }
        found.map(Some)
    }
}

impl TryFrom<String> for Level {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown level: {}", value))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Pathway {
    Academic,
    Vocational,
    #[default]
    Both,
}

impl Pathway {
    pub fn label(self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::Vocational => "vocational",
            Self::Both => "both",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "academic" | "a-level" | "alevel" => Some(Self::Academic),
            "vocational" | "btec" => Some(Self::Vocational),
            "both" | "all" | "" => Some(Self::Both),
            _ => None,
        }
    }

    /// An activity tagged `self` may be placed for a cohort on `cohort`.
    pub fn admits(self, cohort: Pathway) -> bool {
        self == Pathway::Both || self == cohort
    }
}

impl TryFrom<String> for Pathway {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown pathway: {}", value))
    }
}

/// Proficiency bands, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "String")]
pub enum Profile {
    VeryLow,
    Low,
    Mid,
    High,
    VeryHigh,
}

impl Profile {
    pub fn parse(raw: &str) -> Option<Self> {
        let compact: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match compact.as_str() {
            "verylow" => Some(Self::VeryLow),
            "low" => Some(Self::Low),
            "mid" | "medium" => Some(Self::Mid),
            "high" => Some(Self::High),
            "veryhigh" => Some(Self::VeryHigh),
            _ => None,
        }
    }
}

impl TryFrom<String> for Profile {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown profile: {}", value))
    }
}

/// Calendar buckets of the academic year, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Period {
    September,
    October,
    November,
    December,
    January,
    February,
    March,
    April,
    May,
    June,
    July,
}

impl Period {
    pub const ALL: [Period; 11] = [
        Period::September,
        Period::October,
        Period::November,
        Period::December,
        Period::January,
        Period::February,
        Period::March,
        Period::April,
        Period::May,
        Period::June,
        Period::July,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::September => "September",
            Self::October => "October",
            Self::November => "November",
            Self::December => "December",
            Self::January => "January",
            Self::February => "February",
            Self::March => "March",
            Self::April => "April",
            Self::May => "May",
            Self::June => "June",
            Self::July => "July",
        }
    }

    /// Full month name or its three-letter abbreviation, any case.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_ascii_lowercase();
        if s.len() < 3 {
            return None;
        }
        Self::ALL.into_iter().find(|p| {
            let label = p.label().to_ascii_lowercase();
            label == s || (s.len() == 3 && label.starts_with(&s))
        })
    }
}

impl TryFrom<String> for Period {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown period: {}", value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum AssetKind {
    Document,
    Slides,
    Video,
    Link,
}

impl AssetKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "document" | "doc" | "pdf" | "worksheet" => Self::Document,
            "slides" | "slide" | "ppt" | "presentation" => Self::Slides,
            "video" => Self::Video,
            _ => Self::Link,
        }
    }
}

impl TryFrom<String> for AssetKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self::parse(&value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub kind: AssetKind,
    pub url: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub level: Option<Level>,
    #[serde(default)]
    pub pathway: Pathway,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub guidance: String,
    #[serde(default)]
    pub assets: Vec<AssetRef>,
}

impl Activity {
    pub fn has_document(&self) -> bool {
        self.assets.iter().any(|a| a.kind == AssetKind::Document)
    }

    /// Level and pathway filter for a cohort. A missing level matches any bucket.
    pub fn is_eligible(&self, settings: &CurriculumSettings) -> bool {
        let level_ok = self
            .level
            .map(|l| l == settings.level())
            .unwrap_or(true);
        level_ok && self.pathway.admits(settings.pathway)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("yearGroup must be in 7..=13, got {0}")]
    YearGroup(u8),
    #[error("itemsPerPeriod must be in 1..=4, got {0}")]
    ItemsPerPeriod(u8),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CurriculumError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("item uid {0} appears more than once")]
    DuplicateUid(String),
    #[error("activity {0} is placed more than once")]
    DuplicateActivity(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumSettings {
    pub year_group: u8,
    #[serde(default)]
    pub pathway: Pathway,
    pub profile: Profile,
    #[serde(default)]
    pub include_fixed_sessions: bool,
    pub items_per_period: u8,
}

impl CurriculumSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(7..=13).contains(&self.year_group) {
            return Err(SettingsError::YearGroup(self.year_group));
        }
        if !(1..=4).contains(&self.items_per_period) {
            return Err(SettingsError::ItemsPerPeriod(self.items_per_period));
        }
        Ok(())
    }

    pub fn level(&self) -> Level {
        Level::for_year_group(self.year_group)
    }

    pub fn requested_slots(&self) -> usize {
        self.items_per_period as usize * Period::ALL.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixedSessionKind {
    Questionnaire,
    Coaching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedSession {
    pub cycle: u8,
    pub kind: FixedSessionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemOrigin {
    Generated,
    Manual,
}

/// One scheduled slot. `activity` is a snapshot taken at placement time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumItem {
    pub uid: String,
    pub activity: Activity,
    pub period: Period,
    pub sequence: u32,
    #[serde(default)]
    pub fixed_session: Option<FixedSession>,
    pub origin: ItemOrigin,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CurriculumItem {
    pub fn is_fixed(&self) -> bool {
        self.fixed_session.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Curriculum {
    pub settings: CurriculumSettings,
    pub items: Vec<CurriculumItem>,
    pub seed: u64,
    pub generated_at: DateTime<Utc>,
}

impl Curriculum {
    /// Groups items by period (keeping their relative order) and renumbers 1..N.
    pub fn resequence(&mut self) {
        self.items.sort_by_key(|item| item.period.index());
        for (idx, item) in self.items.iter_mut().enumerate() {
            item.sequence = idx as u32 + 1;
        }
    }

    /// Validates a curriculum that arrived from outside the generator and
    /// restores canonical order: by period, fixed sessions first, then by the
    /// recorded sequence. Sequences are renumbered 1..N.
    pub fn check(&mut self) -> Result<(), CurriculumError> {
        self.settings.validate()?;
        let mut uids = HashSet::new();
        let mut activities = HashSet::new();
        for item in &self.items {
            if !uids.insert(item.uid.as_str()) {
                return Err(CurriculumError::DuplicateUid(item.uid.clone()));
            }
            if !item.is_fixed() && !activities.insert(item.activity.id.as_str()) {
                return Err(CurriculumError::DuplicateActivity(item.activity.id.clone()));
            }
        }
        self.items
            .sort_by_key(|item| (item.period.index(), !item.is_fixed(), item.sequence));
        for (idx, item) in self.items.iter_mut().enumerate() {
            item.sequence = idx as u32 + 1;
        }
        Ok(())
    }

    pub fn used_activity_ids(&self) -> HashSet<&str> {
        self.items
            .iter()
            .filter(|i| !i.is_fixed())
            .map(|i| i.activity.id.as_str())
            .collect()
    }

    pub fn position(&self, uid: &str) -> Option<usize> {
        self.items.iter().position(|i| i.uid == uid)
    }

    pub fn find(&self, uid: &str) -> Option<&CurriculumItem> {
        self.items.iter().find(|i| i.uid == uid)
    }

    pub fn items_in(&self, period: Period) -> impl Iterator<Item = &CurriculumItem> {
        self.items.iter().filter(move |i| i.period == period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_labels_parse_back() {
        for c in Category::ALL {
            assert_eq!(Category::parse(c.label()), Some(c));
        }
        for p in Period::ALL {
            assert_eq!(Period::parse(p.label()), Some(p));
        }
        assert_eq!(Period::parse("sep"), Some(Period::September));
        assert_eq!(Period::parse("Ju"), None);
        assert_eq!(Level::parse("Level 3"), Some(Level::Level3));
        assert_eq!(Level::parse("L2"), Some(Level::Level2));
        assert_eq!(Level::parse_tag("Level 2"), Some(Some(Level::Level2)));
        assert_eq!(Level::parse_tag("Level 2, Level 3"), Some(None));
        assert_eq!(Level::parse_tag("L3/L3"), Some(Some(Level::Level3)));
        assert_eq!(Level::parse_tag("Level 2, Level 4"), None);
        assert_eq!(Profile::parse("Mid"), Some(Profile::Mid));
        assert_eq!(Profile::parse("very high"), Some(Profile::VeryHigh));
        assert_eq!(Pathway::parse(""), Some(Pathway::Both));
    }

    #[test]
    fn settings_accept_display_casing() {
        let settings: CurriculumSettings = serde_json::from_value(serde_json::json!({
            "yearGroup": 10,
            "pathway": "Academic",
            "profile": "Mid",
            "includeFixedSessions": false,
            "itemsPerPeriod": 1
        }))
        .expect("settings");
        assert_eq!(settings.pathway, Pathway::Academic);
        assert_eq!(settings.profile, Profile::Mid);
        assert_eq!(settings.level(), Level::Level2);
        assert!(settings.validate().is_ok());

        let bad = CurriculumSettings {
            items_per_period: 5,
            ..settings
        };
        assert_eq!(bad.validate(), Err(SettingsError::ItemsPerPeriod(5)));
    }

    fn item(
        uid: &str,
        activity: &str,
        period: Period,
        sequence: u32,
        fixed: bool,
    ) -> CurriculumItem {
        CurriculumItem {
            uid: uid.to_string(),
            activity: Activity {
                id: activity.to_string(),
                name: activity.to_string(),
                category: Category::Vision,
                level: None,
                pathway: Pathway::Both,
                summary: String::new(),
                guidance: String::new(),
                assets: Vec::new(),
            },
            period,
            sequence,
            fixed_session: fixed.then_some(FixedSession {
                cycle: 1,
                kind: FixedSessionKind::Questionnaire,
            }),
            origin: ItemOrigin::Generated,
            notes: None,
        }
    }

    fn curriculum(items: Vec<CurriculumItem>) -> Curriculum {
        Curriculum {
            settings: CurriculumSettings {
                year_group: 10,
                pathway: Pathway::Both,
                profile: Profile::Mid,
                include_fixed_sessions: true,
                items_per_period: 2,
            },
            items,
            seed: 1,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn check_restores_canonical_order() {
        let mut c = curriculum(vec![
            item("c", "a2", Period::October, 7, false),
            item("b", "a1", Period::September, 42, false),
            item("a", "q1", Period::September, 9, true),
        ]);
        c.check().expect("valid");
        let order: Vec<(&str, u32)> = c
            .items
            .iter()
            .map(|i| (i.uid.as_str(), i.sequence))
            .collect();
        assert_eq!(order, vec![("a", 1), ("b", 2), ("c", 3)]);
    }

    #[test]
    fn check_rejects_broken_curricula() {
        let mut dup_activity = curriculum(vec![
            item("a", "a1", Period::September, 1, false),
            item("b", "a1", Period::October, 2, false),
        ]);
        assert_eq!(
            dup_activity.check(),
            Err(CurriculumError::DuplicateActivity("a1".to_string()))
        );

        let mut dup_uid = curriculum(vec![
            item("a", "a1", Period::September, 1, false),
            item("a", "a2", Period::October, 2, false),
        ]);
        assert_eq!(dup_uid.check(), Err(CurriculumError::DuplicateUid("a".to_string())));

        // Fixed sessions may share an activity across cycles.
        let mut fixed = curriculum(vec![
            item("a", "q", Period::September, 1, true),
            item("b", "q", Period::January, 2, true),
        ]);
        assert!(fixed.check().is_ok());

        let mut bad_settings = curriculum(Vec::new());
        bad_settings.settings.items_per_period = 9;
        assert_eq!(
            bad_settings.check(),
            Err(CurriculumError::Settings(SettingsError::ItemsPerPeriod(9)))
        );
    }

    #[test]
    fn pathway_admission() {
        assert!(Pathway::Both.admits(Pathway::Academic));
        assert!(Pathway::Academic.admits(Pathway::Academic));
        assert!(!Pathway::Vocational.admits(Pathway::Academic));
        assert!(!Pathway::Academic.admits(Pathway::Both));
    }
}
