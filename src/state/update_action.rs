//! Kinds of user-initiated changes that can wait in the pending update queue.
//!
//! Each [`UpdateAction`] belongs to an [`UpdateGroup`] and declares the parameter
//! names it accepts. Actions in one group share the same server-side execution, so
//! consecutive updates of a group run as one batch.

use crate::core::error::{CacheError, Result};
use crate::sync::exec::OpenAction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UpdateGroup {
    Changelist,
    ChangelistFiles,
    ChangelistDelete,
    FileAddEdit,
    FileDelete,
    FileMove,
    FileIntegrate,
    FileRevert,
}

impl UpdateGroup {
    pub fn is_file_group(self) -> bool {
        matches!(
            self,
            Self::FileAddEdit
                | Self::FileDelete
                | Self::FileMove
                | Self::FileIntegrate
                | Self::FileRevert
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdateParameterName {
    Changelist,
    Description,
    Job,
    /// Matches any key starting with `field`, e.g. `field0`, `field1`.
    Field,
    Depot,
    DepotSource,
    File,
    FileSource,
}

impl UpdateParameterName {
    pub fn key_name(self) -> &'static str {
        match self {
            Self::Changelist => "changelist",
            Self::Description => "description",
            Self::Job => "job",
            Self::Field => "field",
            Self::Depot => "depot",
            Self::DepotSource => "depot_source",
            Self::File => "file",
            Self::FileSource => "file_source",
        }
    }

    /// Key for one of several values of a prefix parameter.
    pub fn indexed_key(self, index: usize) -> String {
        format!("{}{index}", self.key_name())
    }

    pub fn matches(self, key: &str) -> bool {
        match self {
            Self::Field => key.to_ascii_lowercase().starts_with(self.key_name()),
            _ => key.eq_ignore_ascii_case(self.key_name()),
        }
    }

    /// Whether values of this parameter are integers rather than strings.
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Changelist)
    }
}

/// Typed parameter value of a pending update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Str(String),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            Self::Int(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UpdateAction {
    ChangeChangelistDescription,
    AddJobToChangelist,
    RemoveJobFromChangelist,
    DeleteChangelist,
    ReopenFilesIntoChangelist,
    AddEditFile,
    EditFile,
    DeleteFile,
    MoveFile,
    MoveDeleteFile,
    IntegrateFile,
    RevertFile,
}

use UpdateParameterName as P;

impl UpdateAction {
    pub const ALL: [UpdateAction; 12] = [
        Self::ChangeChangelistDescription,
        Self::AddJobToChangelist,
        Self::RemoveJobFromChangelist,
        Self::DeleteChangelist,
        Self::ReopenFilesIntoChangelist,
        Self::AddEditFile,
        Self::EditFile,
        Self::DeleteFile,
        Self::MoveFile,
        Self::MoveDeleteFile,
        Self::IntegrateFile,
        Self::RevertFile,
    ];

    pub fn group(self) -> UpdateGroup {
        match self {
            Self::ChangeChangelistDescription
            | Self::AddJobToChangelist
            | Self::RemoveJobFromChangelist => UpdateGroup::Changelist,
            Self::ReopenFilesIntoChangelist => UpdateGroup::ChangelistFiles,
            Self::DeleteChangelist => UpdateGroup::ChangelistDelete,
            Self::AddEditFile | Self::EditFile => UpdateGroup::FileAddEdit,
            Self::DeleteFile | Self::MoveDeleteFile => UpdateGroup::FileDelete,
            Self::MoveFile => UpdateGroup::FileMove,
            Self::IntegrateFile => UpdateGroup::FileIntegrate,
            Self::RevertFile => UpdateGroup::FileRevert,
        }
    }

    pub fn parameter_names(self) -> &'static [UpdateParameterName] {
        match self {
            Self::ChangeChangelistDescription => &[P::Changelist, P::Description],
            Self::AddJobToChangelist | Self::RemoveJobFromChangelist => &[P::Changelist, P::Job],
            Self::DeleteChangelist => &[P::Changelist],
            Self::ReopenFilesIntoChangelist => &[P::Changelist, P::Description, P::Field],
            Self::AddEditFile | Self::DeleteFile | Self::MoveDeleteFile => {
                &[P::Depot, P::File, P::Changelist]
            }
            Self::EditFile => &[P::File, P::Changelist],
            Self::MoveFile | Self::IntegrateFile => &[
                P::Depot,
                P::DepotSource,
                P::File,
                P::FileSource,
                P::Changelist,
            ],
            Self::RevertFile => &[P::Depot, P::File],
        }
    }

    /// The declared parameter that `key` belongs to, if any.
    pub fn parameter_for(self, key: &str) -> Option<UpdateParameterName> {
        self.parameter_names()
            .iter()
            .copied()
            .find(|name| name.matches(key))
    }

    pub fn is_valid_parameter_name(self, key: &str) -> bool {
        self.parameter_for(key).is_some()
    }

    /// Encodes a parameter value for persistence.
    pub fn serialize_value(self, key: &str, value: &ParamValue) -> Result<String> {
        if !self.is_valid_parameter_name(key) {
            return Err(CacheError::invalid_parameter(self, key));
        }
        Ok(value.to_string())
    }

    /// Decodes a persisted parameter value; integer parameters must parse.
    pub fn deserialize_value(self, key: &str, raw: &str) -> Result<ParamValue> {
        let name = self
            .parameter_for(key)
            .ok_or_else(|| CacheError::invalid_parameter(self, key))?;
        if name.is_integer() {
            raw.trim()
                .parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|_| CacheError::invalid_parameter_type(self, key, "an integer"))
        } else {
            Ok(ParamValue::Str(raw.to_string()))
        }
    }

    /// Maps the action reported by an opened-files query. Administrative actions
    /// (purge, archive) and unrecognized ones have no update action.
    pub fn for_opened(action: &OpenAction) -> Option<UpdateAction> {
        match action {
            OpenAction::Add | OpenAction::AddEdit | OpenAction::Added => Some(Self::AddEditFile),
            OpenAction::Edit | OpenAction::EditFrom => Some(Self::EditFile),
            OpenAction::Delete | OpenAction::Deleted => Some(Self::DeleteFile),
            OpenAction::Branch | OpenAction::Integrate | OpenAction::Import => {
                Some(Self::IntegrateFile)
            }
            OpenAction::MoveAdd => Some(Self::MoveFile),
            OpenAction::MoveDelete => Some(Self::MoveDeleteFile),
            OpenAction::Purge | OpenAction::Archive | OpenAction::Unknown(_) => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChangeChangelistDescription => "change_changelist_description",
            Self::AddJobToChangelist => "add_job_to_changelist",
            Self::RemoveJobFromChangelist => "remove_job_from_changelist",
            Self::DeleteChangelist => "delete_changelist",
            Self::ReopenFilesIntoChangelist => "reopen_files_into_changelist",
            Self::AddEditFile => "add_edit_file",
            Self::EditFile => "edit_file",
            Self::DeleteFile => "delete_file",
            Self::MoveFile => "move_file",
            Self::MoveDeleteFile => "move_delete_file",
            Self::IntegrateFile => "integrate_file",
            Self::RevertFile => "revert_file",
        }
    }
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateAction {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|action| action.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CacheError::unknown_enum_value("update action", s))
    }
}
