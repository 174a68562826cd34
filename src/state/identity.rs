//! File identity shared by every state record that talks about a file.
//!
//! A [`FileMapping`] unites a depot path and a local path. Handles are cheap to
//! clone and all clones see the same record, so when the mapping repo learns a new
//! location for a depot file every state holding the handle sees it. Only the repo
//! may change the paths.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, Weak};

#[derive(Debug)]
pub(crate) struct MappingRecord {
    id: u64,
    case_insensitive: bool,
    paths: RwLock<MappingPaths>,
}

#[derive(Debug, Clone, Default)]
struct MappingPaths {
    depot: Option<String>,
    local: Option<PathBuf>,
}

/// Key that decides equality: depot path when known, otherwise local path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Depot(String),
    Local(PathBuf),
    Unbound(u64),
}

#[derive(Clone)]
pub struct FileMapping {
    record: Arc<MappingRecord>,
}

impl FileMapping {
    pub(super) fn new(
        id: u64,
        case_insensitive: bool,
        depot: Option<String>,
        local: Option<PathBuf>,
    ) -> Self {
        debug_assert!(depot.is_some() || local.is_some());
        Self {
            record: Arc::new(MappingRecord {
                id,
                case_insensitive,
                paths: RwLock::new(MappingPaths { depot, local }),
            }),
        }
    }

    pub(super) fn from_record(record: Arc<MappingRecord>) -> Self {
        Self { record }
    }

    pub(super) fn downgrade(&self) -> Weak<MappingRecord> {
        Arc::downgrade(&self.record)
    }

    /// Repo-assigned number, stable for the life of the record.
    pub fn id(&self) -> u64 {
        self.record.id
    }

    pub fn depot_path(&self) -> Option<String> {
        self.read().depot.clone()
    }

    pub fn local_path(&self) -> Option<PathBuf> {
        self.read().local.clone()
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.record.case_insensitive
    }

    /// True when both handles point at the same record.
    pub fn same_record(&self, other: &FileMapping) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }

    pub fn identity_key(&self) -> IdentityKey {
        let paths = self.read();
        match (&paths.depot, &paths.local) {
            (Some(depot), _) => IdentityKey::Depot(normalize_depot(depot, self.record.case_insensitive)),
            (None, Some(local)) => IdentityKey::Local(local.clone()),
            (None, None) => IdentityKey::Unbound(self.record.id),
        }
    }

    pub(super) fn set_local_path(&self, local: Option<PathBuf>) {
        self.write().local = local;
    }

    pub(super) fn set_depot_path(&self, depot: Option<String>) {
        self.write().depot = depot;
    }

    /// True when the local path equals `path`.
    pub fn is_at(&self, path: &Path) -> bool {
        self.read().local.as_deref() == Some(path)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MappingPaths> {
        self.record.paths.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MappingPaths> {
        self.record.paths.write().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn normalize_depot(depot: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        depot.to_lowercase()
    } else {
        depot.to_string()
    }
}

impl PartialEq for FileMapping {
    fn eq(&self, other: &Self) -> bool {
        self.same_record(other) || self.identity_key() == other.identity_key()
    }
}

impl Eq for FileMapping {}

impl Hash for FileMapping {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity_key().hash(state);
    }
}

impl fmt::Debug for FileMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paths = self.read();
        f.debug_struct("FileMapping")
            .field("id", &self.record.id)
            .field("depot", &paths.depot)
            .field("local", &paths.local)
            .finish()
    }
}

impl fmt::Display for FileMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paths = self.read();
        match (&paths.depot, &paths.local) {
            (Some(depot), Some(local)) => write!(f, "{depot} ({})", local.display()),
            (Some(depot), None) => write!(f, "{depot}"),
            (None, Some(local)) => write!(f, "{}", local.display()),
            (None, None) => write!(f, "<unmapped #{}>", self.record.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_prefers_depot_path() {
        let a = FileMapping::new(1, false, Some("//depot/a.txt".into()), Some("/ws/a.txt".into()));
        let b = FileMapping::new(2, false, Some("//depot/a.txt".into()), Some("/other/a.txt".into()));
        assert_eq!(a, b);
        assert!(!a.same_record(&b));
    }

    #[test]
    fn test_equality_falls_back_to_local_path() {
        let a = FileMapping::new(1, false, None, Some("/ws/a.txt".into()));
        let b = FileMapping::new(2, false, None, Some("/ws/a.txt".into()));
        let c = FileMapping::new(3, false, Some("//depot/a.txt".into()), Some("/ws/a.txt".into()));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_case_insensitive_key() {
        let a = FileMapping::new(1, true, Some("//depot/Foo".into()), None);
        let b = FileMapping::new(2, true, Some("//depot/foo".into()), None);
        assert_eq!(a, b);

        let c = FileMapping::new(3, false, Some("//depot/Foo".into()), None);
        let d = FileMapping::new(4, false, Some("//depot/foo".into()), None);
        assert_ne!(c, d);
    }

    #[test]
    fn test_clones_share_updates() {
        let a = FileMapping::new(1, false, None, Some("/ws/a.txt".into()));
        let b = a.clone();
        a.set_depot_path(Some("//depot/a.txt".into()));
        assert_eq!(b.depot_path().as_deref(), Some("//depot/a.txt"));
        assert!(b.is_at(Path::new("/ws/a.txt")));
    }

    #[test]
    fn test_display() {
        let a = FileMapping::new(1, false, Some("//depot/a.txt".into()), None);
        assert_eq!(a.to_string(), "//depot/a.txt");
    }
}
