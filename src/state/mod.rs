//! Cached client state: file identities, server-mirrored records, local
//! speculative records and the pending update queue.

pub mod cached_state;
pub mod changelist;
pub mod client_state;
pub mod identity;
pub mod job;
pub mod lists;
pub mod local_server_state;
pub mod mapping_repo;
pub mod pending_update;
pub mod references;
pub mod sync_state;
pub mod update_action;
pub mod update_state;
pub mod workspace_view;

pub use cached_state::{CachedState, NEVER_LOADED};
pub use changelist::{P4ChangeListState, P4_DEFAULT, P4_LOCAL, P4_UNKNOWN};
pub use client_state::P4ClientState;
pub use identity::FileMapping;
pub use job::P4JobState;
pub use lists::{JobStatusListState, UserSummaryListState};
pub use local_server_state::{ClientLocalServerState, ClientServerId};
pub use mapping_repo::FileMappingRepo;
pub use pending_update::PendingUpdateState;
pub use references::{DecodeReferences, EncodeReferences};
pub use sync_state::{P4FileSyncState, REV_NONE};
pub use update_action::{ParamValue, UpdateAction, UpdateGroup, UpdateParameterName};
pub use update_state::{FileUpdateAction, P4FileUpdateState};
pub use workspace_view::P4WorkspaceViewState;
