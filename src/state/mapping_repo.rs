//! Identity registry for [`FileMapping`] records.
//!
//! The repo is the only writer of mapping paths. It keeps three indexes (by id, by
//! local path, by normalized depot path), all holding weak references, so a mapping
//! disappears once no state record holds a handle to it. A dead reference found
//! during a lookup counts as a cache miss; once the miss count exceeds the
//! threshold, every index is swept and the counter starts again.
//!
//! All operations take one lock: the depot and local indexes must change together.

use crate::core::config::DEFAULT_CACHE_MISS_THRESHOLD;
use crate::state::identity::{normalize_depot, FileMapping, MappingRecord};
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};

#[derive(Debug)]
pub struct FileMappingRepo {
    case_insensitive: bool,
    indexes: Mutex<RepoIndexes>,
}

#[derive(Debug)]
struct RepoIndexes {
    case_insensitive: bool,
    miss_threshold: usize,
    miss_count: usize,
    next_id: u64,
    files: HashMap<u64, Weak<MappingRecord>>,
    by_local: HashMap<PathBuf, Weak<MappingRecord>>,
    by_depot: HashMap<String, Weak<MappingRecord>>,
}

impl FileMappingRepo {
    pub fn new(case_insensitive: bool) -> Self {
        Self::with_threshold(case_insensitive, DEFAULT_CACHE_MISS_THRESHOLD)
    }

    pub fn with_threshold(case_insensitive: bool, miss_threshold: usize) -> Self {
        Self {
            case_insensitive,
            indexes: Mutex::new(RepoIndexes {
                case_insensitive,
                miss_threshold,
                miss_count: 0,
                next_id: 1,
                files: HashMap::new(),
                by_local: HashMap::new(),
                by_depot: HashMap::new(),
            }),
        }
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// Returns the mapping registered at `path`, creating a depot-less one if needed.
    pub fn get_by_location(&self, path: &Path) -> FileMapping {
        let mut indexes = self.lock();
        if let Some(found) = indexes.lookup_local(path) {
            return found;
        }
        indexes.create(None, Some(path.to_path_buf()))
    }

    /// Returns the mapping for `depot`, falling back to the one at `path`.
    ///
    /// A found mapping takes on the incoming local path and depot path. When the
    /// depot path belongs to one mapping and the local path to another, the depot
    /// mapping wins the index entry. The other keeps its paths, so its identity
    /// does not change, but lookups by that path no longer find it.
    pub fn get_by_depot_location(&self, depot: &str, path: Option<&Path>) -> FileMapping {
        let mut indexes = self.lock();
        let key = normalize_depot(depot, self.case_insensitive);
        let found = match indexes.lookup_depot(&key) {
            Some(found) => Some(found),
            None => path.and_then(|p| indexes.lookup_local(p)),
        };

        match found {
            Some(mapping) => {
                if let Some(path) = path {
                    if !mapping.is_at(path) {
                        indexes.relocate(&mapping, Some(path));
                    }
                }
                indexes.redepot(&mapping, depot);
                mapping
            }
            None => indexes.create(Some(depot.to_string()), path.map(Path::to_path_buf)),
        }
    }

    pub fn get_by_depot(&self, depot: &str) -> Option<FileMapping> {
        let key = normalize_depot(depot, self.case_insensitive);
        self.lock().lookup_depot(&key)
    }

    pub fn get_by_local_file_path(&self, path: &Path) -> Option<FileMapping> {
        self.lock().lookup_local(path)
    }

    /// Moves `mapping` to a new local path, or removes its location when `None`.
    /// The depot association is kept either way.
    pub fn update_location(&self, mapping: &FileMapping, location: Option<&Path>) {
        let mut indexes = self.lock();
        indexes.register(mapping);
        indexes.relocate(mapping, location);
    }

    pub fn update_depot_path(&self, mapping: &FileMapping, depot: &str) {
        let mut indexes = self.lock();
        indexes.register(mapping);
        indexes.redepot(mapping, depot);
    }

    /// Replaces every index with the given mappings.
    pub fn refresh_files<I>(&self, mappings: I)
    where
        I: IntoIterator<Item = FileMapping>,
    {
        let mut indexes = self.lock();
        indexes.files.clear();
        indexes.by_local.clear();
        indexes.by_depot.clear();
        indexes.miss_count = 0;
        for mapping in mappings {
            indexes.add_mapping(&mapping);
        }
    }

    /// Forgets every local path while keeping depot knowledge. Used when the
    /// workspace view changes and local locations can no longer be trusted.
    pub fn clear_locations(&self) {
        let mut indexes = self.lock();
        indexes.by_local.clear();
        let mut dead = Vec::new();
        for (id, weak) in &indexes.files {
            match weak.upgrade() {
                Some(record) => FileMapping::from_record(record).set_local_path(None),
                None => dead.push(*id),
            }
        }
        for id in dead {
            indexes.files.remove(&id);
        }
        debug!("Cleared local locations for {} file mappings", indexes.files.len());
    }

    /// Removes every index entry whose mapping has been dropped.
    pub fn flush(&self) {
        self.lock().flush();
    }

    pub fn all_files(&self) -> Vec<FileMapping> {
        let indexes = self.lock();
        let mut files: Vec<FileMapping> = indexes
            .files
            .values()
            .filter_map(Weak::upgrade)
            .map(FileMapping::from_record)
            .collect();
        files.sort_by_key(FileMapping::id);
        files
    }

    pub fn cache_miss_count(&self) -> usize {
        self.lock().miss_count
    }

    /// Number of live mappings.
    pub fn len(&self) -> usize {
        self.lock()
            .files
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw index sizes `(files, by_local, by_depot)`, dead entries included.
    pub fn index_sizes(&self) -> (usize, usize, usize) {
        let indexes = self.lock();
        (
            indexes.files.len(),
            indexes.by_local.len(),
            indexes.by_depot.len(),
        )
    }

    fn lock(&self) -> MutexGuard<'_, RepoIndexes> {
        self.indexes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RepoIndexes {
    fn lookup_local(&mut self, path: &Path) -> Option<FileMapping> {
        let weak = self.by_local.get(path)?;
        match weak.upgrade() {
            Some(record) => Some(FileMapping::from_record(record)),
            None => {
                self.by_local.remove(path);
                self.on_cache_miss();
                None
            }
        }
    }

    fn lookup_depot(&mut self, key: &str) -> Option<FileMapping> {
        let weak = self.by_depot.get(key)?;
        match weak.upgrade() {
            Some(record) => Some(FileMapping::from_record(record)),
            None => {
                self.by_depot.remove(key);
                self.on_cache_miss();
                None
            }
        }
    }

    fn on_cache_miss(&mut self) {
        self.miss_count += 1;
        if self.miss_count > self.miss_threshold {
            debug!("File mapping cache miss threshold exceeded; flushing");
            self.flush();
        }
    }

    fn flush(&mut self) {
        let before = self.files.len();
        self.files.retain(|_, weak| weak.strong_count() > 0);
        self.by_local.retain(|_, weak| weak.strong_count() > 0);
        self.by_depot.retain(|_, weak| weak.strong_count() > 0);
        self.miss_count = 0;
        debug!(
            "Flushed {} dead file mappings",
            before.saturating_sub(self.files.len())
        );
    }

    fn create(&mut self, depot: Option<String>, local: Option<PathBuf>) -> FileMapping {
        let id = self.next_id;
        self.next_id += 1;
        let mapping = FileMapping::new(id, self.case_insensitive, depot, local);
        self.add_mapping(&mapping);
        mapping
    }

    /// Makes sure `mapping` is in the full set.
    fn register(&mut self, mapping: &FileMapping) {
        self.files.insert(mapping.id(), mapping.downgrade());
        self.next_id = self.next_id.max(mapping.id() + 1);
    }

    fn add_mapping(&mut self, mapping: &FileMapping) {
        if let Some(local) = mapping.local_path() {
            if let Some(original) = self.by_local.remove(&local).and_then(|w| w.upgrade()) {
                let original = FileMapping::from_record(original);
                if !original.same_record(mapping) {
                    if let Some(depot) = original.depot_path() {
                        self.by_depot
                            .remove(&normalize_depot(&depot, self.case_insensitive));
                    }
                    self.files.remove(&original.id());
                }
            }
            self.by_local.insert(local, mapping.downgrade());
        }
        if let Some(depot) = mapping.depot_path() {
            self.by_depot.insert(
                normalize_depot(&depot, self.case_insensitive),
                mapping.downgrade(),
            );
        }
        self.register(mapping);
    }

    fn relocate(&mut self, mapping: &FileMapping, location: Option<&Path>) {
        if let Some(old) = mapping.local_path() {
            if self.points_to(self.by_local.get(&old), mapping) {
                self.by_local.remove(&old);
            }
        }
        if let Some(location) = location {
            let previous = self
                .by_local
                .insert(location.to_path_buf(), mapping.downgrade());
            if let Some(displaced) = previous.and_then(|w| w.upgrade()) {
                let displaced = FileMapping::from_record(displaced);
                if !displaced.same_record(mapping) {
                    debug!("{displaced} is no longer indexed by location; {mapping} took it");
                }
            }
        }
        mapping.set_local_path(location.map(Path::to_path_buf));
    }

    fn redepot(&mut self, mapping: &FileMapping, depot: &str) {
        let key = normalize_depot(depot, self.case_insensitive);
        let old_key = mapping
            .depot_path()
            .map(|old| normalize_depot(&old, self.case_insensitive));
        if old_key.as_deref() == Some(key.as_str()) {
            return;
        }
        if let Some(old_key) = old_key {
            if self.points_to(self.by_depot.get(&old_key), mapping) {
                self.by_depot.remove(&old_key);
            }
        }
        let previous = self.by_depot.insert(key, mapping.downgrade());
        if let Some(displaced) = previous.and_then(|w| w.upgrade()) {
            let displaced = FileMapping::from_record(displaced);
            if !displaced.same_record(mapping) {
                debug!("{displaced} is no longer indexed by depot path; {mapping} took it");
            }
        }
        mapping.set_depot_path(Some(depot.to_string()));
    }

    fn points_to(&self, weak: Option<&Weak<MappingRecord>>, mapping: &FileMapping) -> bool {
        weak.and_then(Weak::upgrade)
            .map(|record| FileMapping::from_record(record).same_record(mapping))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_by_location_creates_once() {
        let repo = FileMappingRepo::new(false);
        let a = repo.get_by_location(Path::new("/ws/a.txt"));
        let b = repo.get_by_location(Path::new("/ws/a.txt"));
        assert!(a.same_record(&b));
        assert!(a.depot_path().is_none());
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_depot_location_adopts_local_identity() {
        let repo = FileMappingRepo::new(false);
        let local = repo.get_by_location(Path::new("/ws/a.txt"));
        let both = repo.get_by_depot_location("//depot/a.txt", Some(Path::new("/ws/a.txt")));
        assert!(local.same_record(&both));
        assert_eq!(local.depot_path().as_deref(), Some("//depot/a.txt"));
        assert_eq!(repo.index_sizes(), (1, 1, 1));
    }

    #[test]
    fn test_depot_location_moves_local_path() {
        let repo = FileMappingRepo::new(false);
        let a = repo.get_by_depot_location("//depot/a.txt", Some(Path::new("/old/a.txt")));
        let b = repo.get_by_depot_location("//depot/a.txt", Some(Path::new("/new/a.txt")));
        assert!(a.same_record(&b));
        assert!(repo.get_by_local_file_path(Path::new("/old/a.txt")).is_none());
        assert!(repo
            .get_by_local_file_path(Path::new("/new/a.txt"))
            .is_some_and(|m| m.same_record(&a)));
    }

    #[test]
    fn test_conflicting_paths_favor_depot_identity() {
        let repo = FileMappingRepo::new(false);
        let by_depot = repo.get_by_depot_location("//depot/a.txt", None);
        let by_local = repo.get_by_location(Path::new("/ws/a.txt"));
        let before = by_local.identity_key();
        let result = repo.get_by_depot_location("//depot/a.txt", Some(Path::new("/ws/a.txt")));
        assert!(result.same_record(&by_depot));

        // The displaced mapping keeps its path and its identity.
        assert!(by_local.is_at(Path::new("/ws/a.txt")));
        assert_eq!(by_local.identity_key(), before);
        assert!(repo
            .get_by_local_file_path(Path::new("/ws/a.txt"))
            .is_some_and(|m| m.same_record(&by_depot)));
    }

    #[test]
    fn test_displaced_depot_mapping_keeps_identity() {
        let repo = FileMappingRepo::new(false);
        let old = repo.get_by_depot_location("//depot/a.txt", Some(Path::new("/old/a.txt")));
        let new = repo.get_by_location(Path::new("/new/a.txt"));
        let before = old.identity_key();

        repo.update_depot_path(&new, "//depot/a.txt");

        assert_eq!(old.depot_path().as_deref(), Some("//depot/a.txt"));
        assert!(old.is_at(Path::new("/old/a.txt")));
        assert_eq!(old.identity_key(), before);
        assert!(repo
            .get_by_depot("//depot/a.txt")
            .is_some_and(|m| m.same_record(&new)));
    }

    #[test]
    fn test_case_insensitive_server() {
        let repo = FileMappingRepo::new(true);
        let a = repo.get_by_depot_location("//depot/Foo", None);
        let b = repo.get_by_depot_location("//depot/foo", None);
        assert!(a.same_record(&b));

        let repo = FileMappingRepo::new(false);
        let a = repo.get_by_depot_location("//depot/Foo", None);
        let b = repo.get_by_depot_location("//depot/foo", None);
        assert!(!a.same_record(&b));
    }

    #[test]
    fn test_update_location_to_none_keeps_depot() {
        let repo = FileMappingRepo::new(false);
        let a = repo.get_by_depot_location("//depot/a.txt", Some(Path::new("/ws/a.txt")));
        repo.update_location(&a, None);
        assert!(a.local_path().is_none());
        assert!(repo.get_by_local_file_path(Path::new("/ws/a.txt")).is_none());
        assert!(repo.get_by_depot("//depot/a.txt").is_some());
    }

    #[test]
    fn test_clear_locations() {
        let repo = FileMappingRepo::new(false);
        let a = repo.get_by_depot_location("//depot/a.txt", Some(Path::new("/ws/a.txt")));
        let b = repo.get_by_depot_location("//depot/b.txt", Some(Path::new("/ws/b.txt")));
        repo.clear_locations();
        assert!(a.local_path().is_none());
        assert!(b.local_path().is_none());
        assert_eq!(repo.index_sizes(), (2, 0, 2));
        assert!(repo.get_by_depot("//depot/b.txt").is_some());
    }

    #[test]
    fn test_dropped_mapping_is_a_miss() {
        let repo = FileMappingRepo::new(false);
        drop(repo.get_by_depot_location("//depot/a.txt", None));
        assert!(repo.get_by_depot("//depot/a.txt").is_none());
        assert_eq!(repo.cache_miss_count(), 1);
        assert!(repo.is_empty());
    }

    #[test]
    fn test_flush_after_threshold() {
        let repo = FileMappingRepo::with_threshold(false, 2);
        for i in 0..5 {
            drop(repo.get_by_depot_location(&format!("//depot/{i}"), None));
        }
        let kept = repo.get_by_depot_location("//depot/kept", None);
        assert_eq!(repo.index_sizes().0, 6);

        repo.get_by_depot("//depot/0");
        repo.get_by_depot("//depot/1");
        assert_eq!(repo.cache_miss_count(), 2);
        repo.get_by_depot("//depot/2");

        assert_eq!(repo.cache_miss_count(), 0);
        assert_eq!(repo.index_sizes(), (1, 0, 1));
        assert!(repo.get_by_depot("//depot/kept").is_some_and(|m| m.same_record(&kept)));
    }

    #[test]
    fn test_refresh_files_replaces_indexes() {
        let repo = FileMappingRepo::new(false);
        let a = repo.get_by_depot_location("//depot/a.txt", Some(Path::new("/ws/a.txt")));
        let _b = repo.get_by_depot_location("//depot/b.txt", None);
        repo.refresh_files(vec![a.clone()]);
        assert_eq!(repo.index_sizes(), (1, 1, 1));
        assert_eq!(repo.cache_miss_count(), 0);
        assert!(repo.get_by_depot("//depot/b.txt").is_none());
    }
}
