//! Pending changelist state.

use crate::core::encoding::StateElement;
use crate::core::error::{CacheError, Result};
use crate::state::cached_state::{deserialize_date, serialize_date, CachedState, NEVER_LOADED};
use crate::state::references::{DecodeReferences, EncodeReferences};
use crate::sync::exec::ChangelistSummary;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

pub const TAG: &str = "ch";

/// The default changelist every client has.
pub const P4_DEFAULT: i32 = 0;
/// Placeholder for a changelist whose id is not known.
pub const P4_UNKNOWN: i32 = -1;
/// Ids at or below this value only exist locally.
pub const P4_LOCAL: i32 = -2;

#[derive(Debug, Clone)]
pub struct P4ChangeListState {
    pub id: i32,
    pub comment: String,
    pub jobs: BTreeSet<String>,
    pub shelved: bool,
    pub restricted: bool,
    pub deleted: bool,
    /// Pending update that created or changed this changelist locally.
    pub pending_ref: Option<u32>,
    last_updated: DateTime<Utc>,
}

impl P4ChangeListState {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            comment: String::new(),
            jobs: BTreeSet::new(),
            shelved: false,
            restricted: false,
            deleted: false,
            pending_ref: None,
            last_updated: NEVER_LOADED,
        }
    }

    pub fn with_comment(id: i32, comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            ..Self::new(id)
        }
    }

    pub fn from_summary(summary: &ChangelistSummary) -> Self {
        let mut state = Self::with_comment(summary.id, summary.description.clone());
        state.shelved = summary.shelved;
        state.restricted = summary.restricted;
        state.set_updated();
        state
    }

    pub fn is_default(&self) -> bool {
        self.id == P4_DEFAULT
    }

    /// True when the server knows this changelist.
    pub fn is_on_server(&self) -> bool {
        self.id >= P4_DEFAULT
    }

    pub fn is_local(&self) -> bool {
        is_local_id(self.id)
    }
}

pub fn is_local_id(id: i32) -> bool {
    id <= P4_LOCAL
}

impl PartialEq for P4ChangeListState {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for P4ChangeListState {}

impl Hash for P4ChangeListState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl CachedState for P4ChangeListState {
    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    fn set_last_updated(&mut self, when: DateTime<Utc>) {
        self.last_updated = when;
    }

    fn serialize(&self, wrapper: &mut StateElement, _refs: &EncodeReferences) {
        serialize_date(wrapper, self.last_updated);
        wrapper.set_int("id", i64::from(self.id));
        wrapper.set_bool("s", self.shelved);
        wrapper.set_bool("r", self.restricted);
        wrapper.set_bool("d", self.deleted);
        if let Some(pending_ref) = self.pending_ref {
            wrapper.set_int("p", i64::from(pending_ref));
        }
        if !self.comment.is_empty() {
            wrapper.set_text(self.comment.as_str());
        }
        for job in &self.jobs {
            let mut child = StateElement::new("j");
            child.set_attr("id", job.as_str());
            wrapper.add_child(child);
        }
    }

    fn deserialize(wrapper: &StateElement, _refs: &DecodeReferences) -> Result<Self> {
        wrapper.expect_tag(TAG)?;
        let id = wrapper.require_int("id")?;
        let id = i32::try_from(id).map_err(|_| CacheError::invalid_number(TAG, id.to_string()))?;
        let pending_ref = wrapper
            .get_int("p")?
            .and_then(|value| u32::try_from(value).ok());
        let mut jobs = BTreeSet::new();
        for child in wrapper.children_named("j") {
            jobs.insert(child.require_attr("id")?.to_string());
        }
        Ok(Self {
            id,
            comment: wrapper.text().unwrap_or_default().to_string(),
            jobs,
            shelved: wrapper.get_bool("s"),
            restricted: wrapper.get_bool("r"),
            deleted: wrapper.get_bool("d"),
            pending_ref,
            last_updated: deserialize_date(wrapper)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_by_id() {
        let a = P4ChangeListState::with_comment(5, "one");
        let b = P4ChangeListState::with_comment(5, "two");
        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_id_classification() {
        assert!(P4ChangeListState::new(P4_DEFAULT).is_default());
        assert!(P4ChangeListState::new(12).is_on_server());
        assert!(!P4ChangeListState::new(P4_UNKNOWN).is_on_server());
        assert!(!P4ChangeListState::new(P4_UNKNOWN).is_local());
        assert!(P4ChangeListState::new(-3).is_local());
    }

    #[test]
    fn test_from_summary_is_loaded() {
        let state = P4ChangeListState::from_summary(&ChangelistSummary {
            id: 9,
            description: "refactor".into(),
            shelved: true,
            restricted: false,
        });
        assert_eq!(state.comment, "refactor");
        assert!(state.shelved);
        assert!(!state.is_never_loaded());
    }
}
