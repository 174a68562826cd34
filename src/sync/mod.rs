//! Server synchronization: the cache front-ends, pending update execution and
//! the connection that serializes both.

pub mod action;
pub mod alerts;
pub mod change_lists;
pub mod connection;
pub mod exec;
pub mod file_actions;
pub mod front_end;
pub mod job_status_list;
pub mod jobs;
pub mod known_have;
pub mod manager;
pub mod user_list;
pub mod workspace;

pub use action::{ActionOutcome, ExecutionStatus, FileCategory, ServerUpdateAction};
pub use alerts::{Alert, AlertLevel, AlertLog, AlertSink};
pub use connection::{ProcessSummary, ServerConnection};
pub use exec::{
    ChangelistSummary, ClientSpec, ExecResult, FileMessage, FileStatus, HaveEntry, JobDetails,
    OpenAction, OpenedFile, ServerExec, UserSummary, ViewMapping,
};
pub use front_end::{CacheFrontEnd, ServerContext};
pub use manager::{ClientCacheManager, ServerQuery};
