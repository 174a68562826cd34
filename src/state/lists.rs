//! Small server-wide lists that change rarely: job statuses and users.

use crate::core::encoding::StateElement;
use crate::core::error::Result;
use crate::state::cached_state::{deserialize_date, serialize_date, CachedState, NEVER_LOADED};
use crate::state::references::{DecodeReferences, EncodeReferences};
use crate::sync::exec::UserSummary;
use chrono::{DateTime, Utc};

pub const JOB_STATUS_TAG: &str = "job-status";
pub const USER_LIST_TAG: &str = "users";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusListState {
    pub statuses: Vec<String>,
    last_updated: DateTime<Utc>,
}

impl Default for JobStatusListState {
    fn default() -> Self {
        Self {
            statuses: Vec::new(),
            last_updated: NEVER_LOADED,
        }
    }
}

impl JobStatusListState {
    pub fn new(statuses: Vec<String>) -> Self {
        Self {
            statuses,
            last_updated: NEVER_LOADED,
        }
    }
}

impl CachedState for JobStatusListState {
    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    fn set_last_updated(&mut self, when: DateTime<Utc>) {
        self.last_updated = when;
    }

    fn serialize(&self, wrapper: &mut StateElement, _refs: &EncodeReferences) {
        serialize_date(wrapper, self.last_updated);
        for status in &self.statuses {
            let mut child = StateElement::new("s");
            child.set_text(status.as_str());
            wrapper.add_child(child);
        }
    }

    fn deserialize(wrapper: &StateElement, _refs: &DecodeReferences) -> Result<Self> {
        wrapper.expect_tag(JOB_STATUS_TAG)?;
        Ok(Self {
            statuses: wrapper
                .children_named("s")
                .filter_map(|child| child.text().map(str::to_string))
                .collect(),
            last_updated: deserialize_date(wrapper)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummaryListState {
    pub users: Vec<UserSummary>,
    last_updated: DateTime<Utc>,
}

impl Default for UserSummaryListState {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            last_updated: NEVER_LOADED,
        }
    }
}

impl UserSummaryListState {
    pub fn new(users: Vec<UserSummary>) -> Self {
        Self {
            users,
            last_updated: NEVER_LOADED,
        }
    }

    pub fn find(&self, id: &str) -> Option<&UserSummary> {
        self.users.iter().find(|user| user.id == id)
    }
}

impl CachedState for UserSummaryListState {
    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    fn set_last_updated(&mut self, when: DateTime<Utc>) {
        self.last_updated = when;
    }

    fn serialize(&self, wrapper: &mut StateElement, _refs: &EncodeReferences) {
        serialize_date(wrapper, self.last_updated);
        for user in &self.users {
            let mut child = StateElement::new("usr");
            child.set_attr("id", user.id.as_str());
            child.set_attr("n", user.full_name.as_str());
            child.set_attr("e", user.email.as_str());
            wrapper.add_child(child);
        }
    }

    fn deserialize(wrapper: &StateElement, _refs: &DecodeReferences) -> Result<Self> {
        wrapper.expect_tag(USER_LIST_TAG)?;
        let mut users = Vec::new();
        for child in wrapper.children_named("usr") {
            users.push(UserSummary {
                id: child.require_attr("id")?.to_string(),
                full_name: child.attr("n").unwrap_or_default().to_string(),
                email: child.attr("e").unwrap_or_default().to_string(),
            });
        }
        Ok(Self {
            users,
            last_updated: deserialize_date(wrapper)?,
        })
    }
}
