//! Cached job records.

use crate::core::encoding::StateElement;
use crate::core::error::Result;
use crate::state::cached_state::{deserialize_date, serialize_date, CachedState, NEVER_LOADED};
use crate::state::references::{DecodeReferences, EncodeReferences};
use crate::sync::exec::JobDetails;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const TAG: &str = "j";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P4JobState {
    pub id: String,
    pub description: String,
    pub details: BTreeMap<String, String>,
    last_updated: DateTime<Utc>,
}

impl P4JobState {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            details: BTreeMap::new(),
            last_updated: NEVER_LOADED,
        }
    }

    pub fn from_details(details: &JobDetails) -> Self {
        let mut state = Self::new(details.id.clone(), details.description.clone());
        state.details = details.fields.iter().cloned().collect();
        state.set_updated();
        state
    }
}

impl CachedState for P4JobState {
    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    fn set_last_updated(&mut self, when: DateTime<Utc>) {
        self.last_updated = when;
    }

    fn serialize(&self, wrapper: &mut StateElement, _refs: &EncodeReferences) {
        serialize_date(wrapper, self.last_updated);
        wrapper.set_attr("id", self.id.as_str());
        if !self.description.is_empty() {
            wrapper.set_text(self.description.as_str());
        }
        for (key, value) in &self.details {
            let mut field = StateElement::new("f");
            field.set_attr("k", key.as_str());
            field.set_text(value.as_str());
            wrapper.add_child(field);
        }
    }

    fn deserialize(wrapper: &StateElement, _refs: &DecodeReferences) -> Result<Self> {
        wrapper.expect_tag(TAG)?;
        let mut details = BTreeMap::new();
        for field in wrapper.children_named("f") {
            details.insert(
                field.require_attr("k")?.to_string(),
                field.text().unwrap_or_default().to_string(),
            );
        }
        Ok(Self {
            id: wrapper.require_attr("id")?.to_string(),
            description: wrapper.text().unwrap_or_default().to_string(),
            details,
            last_updated: deserialize_date(wrapper)?,
        })
    }
}
