//! A user change waiting to be sent to the server.
//!
//! A [`PendingUpdateState`] describes intent, not execution: the action, the object
//! ids it concerns and its parameters. Parameters are checked against the action's
//! schema when the update is built, so an invalid update never exists.

use crate::core::encoding::StateElement;
use crate::core::error::{CacheError, Result};
use crate::state::update_action::{ParamValue, UpdateAction, UpdateGroup, UpdateParameterName};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

pub const TAG: &str = "update";

static NEXT_REF_ID: AtomicU32 = AtomicU32::new(1);

fn next_ref_id() -> u32 {
    NEXT_REF_ID.fetch_add(1, Ordering::SeqCst)
}

/// Keeps freshly built updates from reusing an id read back from disk.
fn observe_ref_id(ref_id: u32) {
    NEXT_REF_ID.fetch_max(ref_id.saturating_add(1), Ordering::SeqCst);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdateState {
    action: UpdateAction,
    ids: BTreeSet<String>,
    parameters: BTreeMap<String, ParamValue>,
    ref_id: u32,
}

impl PendingUpdateState {
    pub fn new<I, S>(
        action: UpdateAction,
        ids: I,
        parameters: BTreeMap<String, ParamValue>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        validate(action, &ids, &parameters)?;
        Ok(Self {
            action,
            ids,
            parameters,
            ref_id: next_ref_id(),
        })
    }

    /// Builds an update from parameters that may be missing a value; a `None`
    /// value is rejected the same way as an unknown key.
    pub fn from_optional_params<I, S>(
        action: UpdateAction,
        ids: I,
        parameters: BTreeMap<String, Option<ParamValue>>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut checked = BTreeMap::new();
        for (key, value) in parameters {
            if !action.is_valid_parameter_name(&key) {
                return Err(CacheError::invalid_parameter(action, key));
            }
            match value {
                Some(value) => {
                    checked.insert(key, value);
                }
                None => return Err(CacheError::null_parameter(action, key)),
            }
        }
        Self::new(action, ids, checked)
    }

    pub fn action(&self) -> UpdateAction {
        self.action
    }

    pub fn group(&self) -> UpdateGroup {
        self.action.group()
    }

    pub fn ids(&self) -> &BTreeSet<String> {
        &self.ids
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.parameters
    }

    /// Process-unique id, used by local speculative states to point back here.
    pub fn ref_id(&self) -> u32 {
        self.ref_id
    }

    pub fn get(&self, name: UpdateParameterName) -> Option<&ParamValue> {
        self.parameters
            .iter()
            .find(|(key, _)| name.matches(key))
            .map(|(_, value)| value)
    }

    pub fn get_str(&self, name: UpdateParameterName) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn changelist(&self) -> Option<i32> {
        self.get(UpdateParameterName::Changelist)
            .and_then(ParamValue::as_int)
            .and_then(|id| i32::try_from(id).ok())
    }

    pub fn file(&self) -> Option<PathBuf> {
        self.get_str(UpdateParameterName::File).map(PathBuf::from)
    }

    pub fn source_file(&self) -> Option<PathBuf> {
        self.get_str(UpdateParameterName::FileSource)
            .map(PathBuf::from)
    }

    /// Values of the `field*` parameters, ordered by their numeric suffix.
    pub fn field_values(&self) -> Vec<&str> {
        let mut fields: Vec<(u64, &str)> = self
            .parameters
            .iter()
            .filter(|(key, _)| UpdateParameterName::Field.matches(key))
            .filter_map(|(key, value)| {
                let index = key["field".len()..].parse::<u64>().unwrap_or(0);
                value.as_str().map(|v| (index, v))
            })
            .collect();
        fields.sort_by_key(|(index, _)| *index);
        fields.into_iter().map(|(_, value)| value).collect()
    }

    /// True when both updates belong to the same group and share an object id.
    pub fn overlaps(&self, other: &PendingUpdateState) -> bool {
        self.group() == other.group() && !self.ids.is_disjoint(&other.ids)
    }

    /// Copy pointing at `new_id` instead of the local changelist `old_id`.
    /// Keeps the ref id so speculative states still match.
    pub(crate) fn with_changelist(&self, old_id: i32, new_id: i32) -> Option<Self> {
        if self.changelist() != Some(old_id) {
            return None;
        }
        let mut copy = self.clone();
        let key = copy
            .parameters
            .keys()
            .find(|key| UpdateParameterName::Changelist.matches(key))
            .cloned()?;
        copy.parameters.insert(key, ParamValue::from(new_id));
        let old_text = old_id.to_string();
        if copy.ids.remove(&old_text) {
            copy.ids.insert(new_id.to_string());
        }
        Some(copy)
    }

    pub fn serialize(&self) -> Result<StateElement> {
        let mut element = StateElement::new(TAG);
        element.set_attr("a", self.action.as_str());
        element.set_int("r", i64::from(self.ref_id));
        for id in &self.ids {
            let mut child = StateElement::new("i");
            child.set_text(id.as_str());
            element.add_child(child);
        }
        for (key, value) in &self.parameters {
            let mut child = StateElement::new("p");
            child.set_attr("k", key.as_str());
            child.set_text(self.action.serialize_value(key, value)?);
            element.add_child(child);
        }
        Ok(element)
    }

    pub fn deserialize(element: &StateElement) -> Result<Self> {
        element.expect_tag(TAG)?;
        let action: UpdateAction = element.require_attr("a")?.parse()?;
        let ref_id = element.require_int("r")?;
        let ref_id =
            u32::try_from(ref_id).map_err(|_| CacheError::invalid_number(TAG, ref_id.to_string()))?;

        let ids: BTreeSet<String> = element
            .children_named("i")
            .filter_map(|child| child.text().map(str::to_string))
            .collect();
        let mut parameters = BTreeMap::new();
        for child in element.children_named("p") {
            let key = child.require_attr("k")?;
            let raw = child.text().unwrap_or_default();
            parameters.insert(key.to_string(), action.deserialize_value(key, raw)?);
        }
        validate(action, &ids, &parameters)?;
        observe_ref_id(ref_id);
        Ok(Self {
            action,
            ids,
            parameters,
            ref_id,
        })
    }
}

fn validate(
    action: UpdateAction,
    ids: &BTreeSet<String>,
    parameters: &BTreeMap<String, ParamValue>,
) -> Result<()> {
    if ids.is_empty() {
        return Err(CacheError::NoUpdateIds {
            action: action.to_string(),
        });
    }
    for (key, value) in parameters {
        let name = action
            .parameter_for(key)
            .ok_or_else(|| CacheError::invalid_parameter(action, key))?;
        if name.is_integer() && value.as_int().is_none() {
            return Err(CacheError::invalid_parameter_type(action, key, "an integer"));
        }
        if !name.is_integer() && value.as_str().is_none() {
            return Err(CacheError::invalid_parameter_type(action, key, "a string"));
        }
    }
    Ok(())
}

impl fmt::Display for PendingUpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} [", self.ref_id, self.action)?;
        let ids: Vec<&str> = self.ids.iter().map(String::as_str).collect();
        write!(f, "{}]", ids.join(", "))
    }
}
