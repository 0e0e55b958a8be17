use crate::catalog::Catalog;
use crate::generator::new_item;
use crate::model::{Activity, Category, Curriculum, ItemOrigin, Period};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }
}

/// Why an edit left the curriculum untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoChange {
    UnknownItem,
    UnknownActivity,
    FixedSession,
    AtBoundary,
    AlreadyUsed,
    CategoryMismatch,
    NotEligible,
    SamePosition,
}

impl NoChange {
    pub fn code(self) -> &'static str {
        match self {
            Self::UnknownItem => "unknownItem",
            Self::UnknownActivity => "unknownActivity",
            Self::FixedSession => "fixedSession",
            Self::AtBoundary => "atBoundary",
            Self::AlreadyUsed => "alreadyUsed",
            Self::CategoryMismatch => "categoryMismatch",
            Self::NotEligible => "notEligible",
            Self::SamePosition => "samePosition",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Changed,
    Unchanged(NoChange),
}

impl EditOutcome {
    pub fn changed(self) -> bool {
        matches!(self, Self::Changed)
    }

    pub fn reason(self) -> Option<NoChange> {
        match self {
            Self::Changed => None,
            Self::Unchanged(r) => Some(r),
        }
    }
}

/// In-place edits on a generated curriculum.
///
/// Every change ends with `Curriculum::resequence`, so sequence numbers stay
/// contiguous and period-grouped. Fixed sessions can be annotated but never
/// moved, removed or swapped. Activities already placed are never offered or
/// accepted again.
pub struct Editor<'a> {
    curriculum: &'a mut Curriculum,
    catalog: &'a Catalog,
}

impl<'a> Editor<'a> {
    pub fn new(curriculum: &'a mut Curriculum, catalog: &'a Catalog) -> Self {
        Self {
            curriculum,
            catalog,
        }
    }

    fn finish(&mut self, op: &str) -> EditOutcome {
        self.curriculum.resequence();
        debug!(op, items = self.curriculum.items.len(), "curriculum edited");
        EditOutcome::Changed
    }

    fn reject(op: &str, reason: NoChange) -> EditOutcome {
        debug!(op, reason = reason.code(), "edit left curriculum unchanged");
        EditOutcome::Unchanged(reason)
    }

    fn plain_position(&self, uid: &str) -> Result<usize, NoChange> {
        let idx = self.curriculum.position(uid).ok_or(NoChange::UnknownItem)?;
        if self.curriculum.items[idx].is_fixed() {
            return Err(NoChange::FixedSession);
        }
        Ok(idx)
    }

    fn available(&self, activity_id: &str) -> Result<&'a Activity, NoChange> {
        let catalog = self.catalog;
        let activity = catalog.get(activity_id).ok_or(NoChange::UnknownActivity)?;
        if self.curriculum.used_activity_ids().contains(activity_id) {
            return Err(NoChange::AlreadyUsed);
        }
        Ok(activity)
    }

    /// Index of `before_uid` when it sits in `period`, else the end of that period's run.
    /// Never lands ahead of the period's fixed sessions.
    fn insertion_index(&self, period: Period, before_uid: Option<&str>) -> usize {
        let items = &self.curriculum.items;
        let floor = items
            .iter()
            .rposition(|i| {
                i.period.index() < period.index() || (i.period == period && i.is_fixed())
            })
            .map(|p| p + 1)
            .unwrap_or(0);
        if let Some(target) = before_uid {
            if let Some(at) = items
                .iter()
                .position(|i| i.uid == target && i.period == period)
            {
                return at.max(floor);
            }
        }
        items
            .iter()
            .rposition(|i| i.period.index() <= period.index())
            .map(|p| p + 1)
            .unwrap_or(0)
    }

    pub fn move_within_period(&mut self, uid: &str, direction: Direction) -> EditOutcome {
        let idx = match self.plain_position(uid) {
            Ok(i) => i,
            Err(r) => return Self::reject("moveWithinPeriod", r),
        };
        let items = &mut self.curriculum.items;
        let period = items[idx].period;
        let neighbour = match direction {
            Direction::Up => idx.checked_sub(1),
            Direction::Down => Some(idx + 1).filter(|&j| j < items.len()),
        };
        match neighbour {
            Some(j) if items[j].period == period && !items[j].is_fixed() => {
                items.swap(idx, j);
                self.finish("moveWithinPeriod")
            }
            _ => Self::reject("moveWithinPeriod", NoChange::AtBoundary),
        }
    }

    pub fn remove(&mut self, uid: &str) -> EditOutcome {
        let idx = match self.plain_position(uid) {
            Ok(i) => i,
            Err(r) => return Self::reject("remove", r),
        };
        self.curriculum.items.remove(idx);
        self.finish("remove")
    }

    pub fn add(
        &mut self,
        activity_id: &str,
        period: Period,
        before_uid: Option<&str>,
    ) -> EditOutcome {
        let activity = match self.available(activity_id) {
            Ok(a) => a.clone(),
            Err(r) => return Self::reject("add", r),
        };
        let at = self.insertion_index(period, before_uid);
        self.curriculum
            .items
            .insert(at, new_item(activity, period, None, ItemOrigin::Manual));
        self.finish("add")
    }

    /// Add to the least populated period, earliest period on ties.
    pub fn quick_add(&mut self, activity_id: &str) -> EditOutcome {
        let period = Period::ALL
            .into_iter()
            .min_by_key(|p| self.curriculum.items_in(*p).count())
            .unwrap_or(Period::September);
        self.add(activity_id, period, None)
    }

    pub fn move_to_period(
        &mut self,
        uid: &str,
        period: Period,
        before_uid: Option<&str>,
    ) -> EditOutcome {
        let idx = match self.plain_position(uid) {
            Ok(i) => i,
            Err(r) => return Self::reject("moveToPeriod", r),
        };
        if before_uid == Some(uid) {
            return Self::reject("moveToPeriod", NoChange::SamePosition);
        }
        let mut item = self.curriculum.items.remove(idx);
        let from = item.period;
        item.period = period;
        let at = self.insertion_index(period, before_uid);
        self.curriculum.items.insert(at, item);
        if from == period && at == idx {
            return Self::reject("moveToPeriod", NoChange::SamePosition);
        }
        self.finish("moveToPeriod")
    }

    /// Replace the activity in a slot, keeping uid, period, sequence and notes.
    pub fn swap(&mut self, uid: &str, activity_id: &str) -> EditOutcome {
        let idx = match self.plain_position(uid) {
            Ok(i) => i,
            Err(r) => return Self::reject("swap", r),
        };
        let replacement = match self.available(activity_id) {
            Ok(a) => a,
            Err(r) => return Self::reject("swap", r),
        };
        if replacement.category != self.curriculum.items[idx].activity.category {
            return Self::reject("swap", NoChange::CategoryMismatch);
        }
        if !replacement.is_eligible(&self.curriculum.settings) {
            return Self::reject("swap", NoChange::NotEligible);
        }
        self.curriculum.items[idx].activity = replacement.clone();
        self.finish("swap")
    }

    /// Unused, eligible activities in the slot's category; document-bearing first.
    pub fn swap_candidates(&self, uid: &str) -> Vec<&'a Activity> {
        let Ok(idx) = self.plain_position(uid) else {
            return Vec::new();
        };
        let category = self.curriculum.items[idx].activity.category;
        let used = self.curriculum.used_activity_ids();
        let catalog = self.catalog;
        let mut out: Vec<&'a Activity> = catalog
            .iter()
            .filter(|a| a.category == category)
            .filter(|a| a.is_eligible(&self.curriculum.settings))
            .filter(|a| !used.contains(a.id.as_str()))
            .collect();
        out.sort_by_key(|a| !a.has_document());
        out
    }

    /// Unused catalog activities, eligible ones first.
    pub fn add_candidates(&self, category: Option<Category>) -> Vec<&'a Activity> {
        let used = self.curriculum.used_activity_ids();
        let catalog = self.catalog;
        let mut out: Vec<&'a Activity> = catalog
            .iter()
            .filter(|a| category.map(|c| a.category == c).unwrap_or(true))
            .filter(|a| !used.contains(a.id.as_str()))
            .collect();
        out.sort_by_key(|a| (!a.is_eligible(&self.curriculum.settings), !a.has_document()));
        out
    }

    pub fn annotate(&mut self, uid: &str, notes: Option<&str>) -> EditOutcome {
        let Some(idx) = self.curriculum.position(uid) else {
            return Self::reject("annotate", NoChange::UnknownItem);
        };
        let notes = notes
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self.curriculum.items[idx].notes = notes;
        self.finish("annotate")
    }
}
