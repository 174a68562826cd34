//! The server execution capability consumed by the cache core.
//!
//! [`ServerExec`] is the boundary to the real Perforce connection. Every call may
//! block and may fail with an [`ExecError`]; the cache core never lets those errors
//! escape except for an interruption.

use crate::core::error::{CacheError, ExecError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Open action reported by the server for a file in a pending changelist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpenAction {
    Add,
    AddEdit,
    Added,
    Edit,
    EditFrom,
    MoveAdd,
    Integrate,
    Branch,
    MoveDelete,
    Delete,
    Deleted,
    Import,
    Purge,
    Archive,
    Unknown(String),
}

impl OpenAction {
    /// Parses the action text the server reports, e.g. `edit` or `move/add`.
    pub fn from_p4(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "add" => Self::Add,
            "add/edit" => Self::AddEdit,
            "added" => Self::Added,
            "edit" => Self::Edit,
            "edit/from" => Self::EditFrom,
            "move/add" => Self::MoveAdd,
            "integrate" => Self::Integrate,
            "branch" => Self::Branch,
            "move/delete" => Self::MoveDelete,
            "delete" => Self::Delete,
            "deleted" => Self::Deleted,
            "import" => Self::Import,
            "purge" => Self::Purge,
            "archive" => Self::Archive,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_p4(&self) -> &str {
        match self {
            Self::Add => "add",
            Self::AddEdit => "add/edit",
            Self::Added => "added",
            Self::Edit => "edit",
            Self::EditFrom => "edit/from",
            Self::MoveAdd => "move/add",
            Self::Integrate => "integrate",
            Self::Branch => "branch",
            Self::MoveDelete => "move/delete",
            Self::Delete => "delete",
            Self::Deleted => "deleted",
            Self::Import => "import",
            Self::Purge => "purge",
            Self::Archive => "archive",
            Self::Unknown(text) => text,
        }
    }
}

impl fmt::Display for OpenAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_p4())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewMapping {
    pub depot: String,
    pub client: String,
}

impl ViewMapping {
    pub fn new(depot: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            depot: depot.into(),
            client: client.into(),
        }
    }
}

/// Client spec as returned by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSpec {
    pub name: String,
    pub root: Option<String>,
    pub alt_roots: Vec<String>,
    pub view: Vec<ViewMapping>,
}

impl ClientSpec {
    /// Primary root first, then the alternate roots.
    pub fn roots(&self) -> Vec<String> {
        self.root
            .iter()
            .chain(self.alt_roots.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelistSummary {
    pub id: i32,
    pub description: String,
    pub shelved: bool,
    pub restricted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedFile {
    pub depot_path: String,
    pub client_path: Option<PathBuf>,
    pub action: OpenAction,
    pub changelist: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaveEntry {
    pub depot_path: String,
    pub local_path: PathBuf,
    pub revision: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDetails {
    pub id: String,
    pub description: String,
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: String,
    pub full_name: String,
    pub email: String,
}

/// One result of a file status query, positionally aligned with the request
/// except for `Info` entries, which carry no file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Valid {
        depot_path: String,
        open_action: Option<OpenAction>,
        changelist: i32,
        head_rev: i64,
    },
    NotOnServer,
    NotInClientView {
        client_path: Option<String>,
    },
    Error {
        message: String,
    },
    Info {
        message: String,
    },
}

/// Per-file message from a batch command such as add or edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMessage {
    pub file: Option<PathBuf>,
    pub message: String,
    pub is_error: bool,
}

impl FileMessage {
    pub fn info(file: &Path, message: impl Into<String>) -> Self {
        Self {
            file: Some(file.to_path_buf()),
            message: message.into(),
            is_error: false,
        }
    }

    pub fn error(file: &Path, message: impl Into<String>) -> Self {
        Self {
            file: Some(file.to_path_buf()),
            message: message.into(),
            is_error: true,
        }
    }
}

/// Blocking operations against one client on one server.
///
/// Implementations take `&self`; any internal mutation is their own business.
pub trait ServerExec: Send + Sync {
    fn client_name(&self) -> String;
    fn username(&self) -> String;

    fn get_client(&self) -> ExecResult<ClientSpec>;
    fn get_pending_changelists(&self) -> ExecResult<Vec<ChangelistSummary>>;
    fn get_job_ids_for_changelist(&self, changelist: i32) -> ExecResult<Vec<String>>;
    /// `None` when the job does not exist on the server.
    fn get_job(&self, id: &str) -> ExecResult<Option<JobDetails>>;
    fn get_opened_files(&self, roots: &[PathBuf]) -> ExecResult<Vec<OpenedFile>>;
    fn get_file_status(&self, files: &[PathBuf]) -> ExecResult<Vec<FileStatus>>;
    fn get_have_list(&self, files: &[PathBuf]) -> ExecResult<Vec<HaveEntry>>;
    fn get_users(&self) -> ExecResult<Vec<UserSummary>>;
    fn get_job_status_values(&self) -> ExecResult<Vec<String>>;

    fn add_files(&self, files: &[PathBuf], changelist: i32) -> ExecResult<Vec<FileMessage>>;
    fn edit_files(&self, files: &[PathBuf], changelist: i32) -> ExecResult<Vec<FileMessage>>;
    fn reopen_files(&self, files: &[PathBuf], changelist: i32) -> ExecResult<Vec<FileMessage>>;
    fn delete_files(&self, files: &[PathBuf], changelist: i32) -> ExecResult<Vec<FileMessage>>;
    fn revert_files(&self, files: &[PathBuf]) -> ExecResult<Vec<FileMessage>>;
    fn move_file(
        &self,
        source: &Path,
        target: &Path,
        changelist: i32,
    ) -> ExecResult<Vec<FileMessage>>;
    fn integrate_file(
        &self,
        source: &Path,
        target: &Path,
        changelist: i32,
    ) -> ExecResult<Vec<FileMessage>>;

    /// Returns the server-assigned id of the new changelist.
    fn create_changelist(&self, description: &str) -> ExecResult<i32>;
    fn update_changelist_description(&self, changelist: i32, description: &str)
        -> ExecResult<()>;
    fn delete_pending_changelist(&self, changelist: i32) -> ExecResult<()>;
    fn add_jobs_to_changelist(&self, changelist: i32, jobs: &[String]) -> ExecResult<()>;
    fn remove_jobs_from_changelist(&self, changelist: i32, jobs: &[String]) -> ExecResult<()>;
}

/// Lifts an interruption out of a server result so it can be propagated with `?`.
pub trait Interruptible<T> {
    fn interruptible(self) -> Result<ExecResult<T>>;
}

impl<T> Interruptible<T> for ExecResult<T> {
    fn interruptible(self) -> Result<ExecResult<T>> {
        match self {
            Err(ExecError::Interrupted) => Err(CacheError::Interrupted),
            other => Ok(other),
        }
    }
}

/// True when any message of a batch command is an error.
pub fn has_errors(messages: &[FileMessage]) -> bool {
    messages.iter().any(|m| m.is_error)
}
