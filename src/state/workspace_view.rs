//! Workspace (client spec) view: name, roots and depot-to-client mappings.

use crate::core::encoding::StateElement;
use crate::core::error::Result;
use crate::state::cached_state::{deserialize_date, serialize_date, CachedState, NEVER_LOADED};
use crate::state::references::{DecodeReferences, EncodeReferences};
use crate::sync::exec::{ClientSpec, ViewMapping};
use chrono::{DateTime, Utc};

pub const TAG: &str = "workspace";

/// Root value the server reports for views that span several drives.
pub const NULL_ROOT: &str = "null";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P4WorkspaceViewState {
    pub name: String,
    /// Primary root first, then alternates.
    pub roots: Vec<String>,
    /// Order decides mapping precedence.
    pub view: Vec<ViewMapping>,
    last_updated: DateTime<Utc>,
}

impl P4WorkspaceViewState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roots: Vec::new(),
            view: Vec::new(),
            last_updated: NEVER_LOADED,
        }
    }

    pub fn from_client_spec(spec: &ClientSpec) -> Self {
        Self {
            name: spec.name.clone(),
            roots: spec.roots(),
            view: spec.view.clone(),
            last_updated: NEVER_LOADED,
        }
    }
}

impl CachedState for P4WorkspaceViewState {
    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    fn set_last_updated(&mut self, when: DateTime<Utc>) {
        self.last_updated = when;
    }

    fn serialize(&self, wrapper: &mut StateElement, _refs: &EncodeReferences) {
        serialize_date(wrapper, self.last_updated);
        wrapper.set_attr("n", self.name.as_str());
        for root in &self.roots {
            let mut child = StateElement::new("r");
            child.set_text(root.as_str());
            wrapper.add_child(child);
        }
        for mapping in &self.view {
            let mut child = StateElement::new("x");
            child.set_attr("d", mapping.depot.as_str());
            child.set_attr("c", mapping.client.as_str());
            wrapper.add_child(child);
        }
    }

    fn deserialize(wrapper: &StateElement, _refs: &DecodeReferences) -> Result<Self> {
        wrapper.expect_tag(TAG)?;
        let roots = wrapper
            .children_named("r")
            .filter_map(|child| child.text().map(str::to_string))
            .collect();
        let mut view = Vec::new();
        for child in wrapper.children_named("x") {
            view.push(ViewMapping::new(
                child.require_attr("d")?,
                child.require_attr("c")?,
            ));
        }
        Ok(Self {
            name: wrapper.attr("n").unwrap_or_default().to_string(),
            roots,
            view,
            last_updated: deserialize_date(wrapper)?,
        })
    }
}
