//! A file opened (or about to be opened) in a changelist.

use crate::core::encoding::StateElement;
use crate::core::error::{CacheError, Result};
use crate::state::cached_state::{deserialize_date, serialize_date, CachedState, NEVER_LOADED};
use crate::state::changelist::P4_DEFAULT;
use crate::state::identity::FileMapping;
use crate::state::references::{DecodeReferences, EncodeReferences};
use crate::state::update_action::UpdateAction;
use crate::sync::exec::OpenAction;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

pub const TAG: &str = "u";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileUpdateAction {
    AddFile,
    EditFile,
    AddEditFile,
    DeleteFile,
    IntegrateFile,
    MoveFile,
    MoveDeleteFile,
    RevertFile,
}

impl FileUpdateAction {
    const ALL: [FileUpdateAction; 8] = [
        Self::AddFile,
        Self::EditFile,
        Self::AddEditFile,
        Self::DeleteFile,
        Self::IntegrateFile,
        Self::MoveFile,
        Self::MoveDeleteFile,
        Self::RevertFile,
    ];

    /// The pending update that produces this file state.
    pub fn update_action(self) -> UpdateAction {
        match self {
            Self::AddFile | Self::AddEditFile => UpdateAction::AddEditFile,
            Self::EditFile => UpdateAction::EditFile,
            Self::DeleteFile => UpdateAction::DeleteFile,
            Self::IntegrateFile => UpdateAction::IntegrateFile,
            Self::MoveFile => UpdateAction::MoveFile,
            Self::MoveDeleteFile => UpdateAction::MoveDeleteFile,
            Self::RevertFile => UpdateAction::RevertFile,
        }
    }

    pub fn from_update_action(action: UpdateAction) -> Option<Self> {
        match action {
            UpdateAction::AddEditFile => Some(Self::AddEditFile),
            UpdateAction::EditFile => Some(Self::EditFile),
            UpdateAction::DeleteFile => Some(Self::DeleteFile),
            UpdateAction::IntegrateFile => Some(Self::IntegrateFile),
            UpdateAction::MoveFile => Some(Self::MoveFile),
            UpdateAction::MoveDeleteFile => Some(Self::MoveDeleteFile),
            UpdateAction::RevertFile => Some(Self::RevertFile),
            _ => None,
        }
    }

    /// File state matching an action reported for an opened file.
    pub fn from_opened(action: &OpenAction) -> Option<Self> {
        match action {
            OpenAction::Add | OpenAction::Added => Some(Self::AddFile),
            _ => UpdateAction::for_opened(action).and_then(Self::from_update_action),
        }
    }

    /// Whether the file shows up as opened. A revert hides the file.
    pub fn is_open(self) -> bool {
        self != Self::RevertFile
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddFile => "add",
            Self::EditFile => "edit",
            Self::AddEditFile => "add_edit",
            Self::DeleteFile => "delete",
            Self::IntegrateFile => "integrate",
            Self::MoveFile => "move",
            Self::MoveDeleteFile => "move_delete",
            Self::RevertFile => "revert",
        }
    }
}

impl fmt::Display for FileUpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileUpdateAction {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| CacheError::unknown_enum_value("file update action", s))
    }
}

#[derive(Debug, Clone)]
pub struct P4FileUpdateState {
    mapping: FileMapping,
    pub changelist: i32,
    pub action: FileUpdateAction,
    /// Integrate or move source.
    pub source: Option<FileMapping>,
    /// Ref id of the pending update that created this local state.
    pub pending_ref: Option<u32>,
    last_updated: DateTime<Utc>,
}

impl P4FileUpdateState {
    pub fn new(mapping: FileMapping, changelist: i32, action: FileUpdateAction) -> Self {
        Self {
            mapping,
            changelist,
            action,
            source: None,
            pending_ref: None,
            last_updated: NEVER_LOADED,
        }
    }

    pub fn mapping(&self) -> &FileMapping {
        &self.mapping
    }

    pub fn is_in_default_changelist(&self) -> bool {
        self.changelist == P4_DEFAULT
    }
}

/// Two update states are the same file, whatever the action.
impl PartialEq for P4FileUpdateState {
    fn eq(&self, other: &Self) -> bool {
        self.mapping == other.mapping
    }
}

impl CachedState for P4FileUpdateState {
    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    fn set_last_updated(&mut self, when: DateTime<Utc>) {
        self.last_updated = when;
    }

    fn serialize(&self, wrapper: &mut StateElement, refs: &EncodeReferences) {
        serialize_date(wrapper, self.last_updated);
        wrapper.set_attr("f", refs.mapping_ref(&self.mapping));
        wrapper.set_int("c", i64::from(self.changelist));
        wrapper.set_attr("a", self.action.as_str());
        if let Some(source) = &self.source {
            wrapper.set_attr("s", refs.mapping_ref(source));
        }
        if let Some(pending_ref) = self.pending_ref {
            wrapper.set_int("p", i64::from(pending_ref));
        }
    }

    fn deserialize(wrapper: &StateElement, refs: &DecodeReferences) -> Result<Self> {
        wrapper.expect_tag(TAG)?;
        let changelist = wrapper.get_int("c")?.unwrap_or(i64::from(P4_DEFAULT));
        let changelist = i32::try_from(changelist)
            .map_err(|_| CacheError::invalid_number(TAG, changelist.to_string()))?;
        let source = match wrapper.attr("s") {
            Some(reference) => Some(refs.mapping(reference)?),
            None => None,
        };
        Ok(Self {
            mapping: refs.mapping(wrapper.require_attr("f")?)?,
            changelist,
            action: wrapper.require_attr("a")?.parse()?,
            source,
            pending_ref: wrapper
                .get_int("p")?
                .and_then(|value| u32::try_from(value).ok()),
            last_updated: deserialize_date(wrapper)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_opened() {
        assert_eq!(
            FileUpdateAction::from_opened(&OpenAction::Add),
            Some(FileUpdateAction::AddFile)
        );
        assert_eq!(
            FileUpdateAction::from_opened(&OpenAction::Edit),
            Some(FileUpdateAction::EditFile)
        );
        assert_eq!(
            FileUpdateAction::from_opened(&OpenAction::MoveAdd),
            Some(FileUpdateAction::MoveFile)
        );
        assert_eq!(FileUpdateAction::from_opened(&OpenAction::Archive), None);
    }

    #[test]
    fn test_update_action_links() {
        for action in FileUpdateAction::ALL {
            let update = action.update_action();
            let back = FileUpdateAction::from_update_action(update).unwrap();
            assert_eq!(back.update_action(), update);
        }
        assert_eq!(
            FileUpdateAction::from_update_action(UpdateAction::DeleteChangelist),
            None
        );
    }

    #[test]
    fn test_revert_is_not_open() {
        assert!(!FileUpdateAction::RevertFile.is_open());
        assert!(FileUpdateAction::MoveDeleteFile.is_open());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            "move_delete".parse::<FileUpdateAction>().unwrap(),
            FileUpdateAction::MoveDeleteFile
        );
        assert!("shelve".parse::<FileUpdateAction>().is_err());
    }
}
