//! Indirection tables for shared objects in persisted state.
//!
//! A file mapping is usually referenced from several states (a have record, an
//! open file, a move source). It is written once at the root as an `m` element and
//! every state refers to it by its short id. Jobs are handled the same way with
//! root `j` elements. Decoding reads the tables first, so the states can resolve
//! their references in a second pass.

use crate::core::encoding::{encode_long, StateElement};
use crate::core::error::{CacheError, Result};
use crate::state::cached_state::CachedState;
use crate::state::client_state::P4ClientState;
use crate::state::identity::FileMapping;
use crate::state::job::{self, P4JobState};
use crate::state::mapping_repo::FileMappingRepo;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const MAPPING_TAG: &str = "m";

#[derive(Debug, Default)]
pub struct EncodeReferences {
    mappings: BTreeMap<u64, FileMapping>,
    jobs: BTreeMap<String, P4JobState>,
}

impl EncodeReferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every mapping and job reachable from `state`.
    pub fn collect(&mut self, state: &P4ClientState) {
        for have in &state.have_files {
            self.add_mapping(have.mapping());
        }
        for update in &state.updated_files {
            self.add_mapping(update.mapping());
            if let Some(source) = &update.source {
                self.add_mapping(source);
            }
        }
        for (id, job) in &state.jobs {
            self.jobs.entry(id.clone()).or_insert_with(|| job.clone());
        }
    }

    pub fn add_mapping(&mut self, mapping: &FileMapping) {
        self.mappings
            .entry(mapping.id())
            .or_insert_with(|| mapping.clone());
    }

    pub fn mapping_ref(&self, mapping: &FileMapping) -> String {
        encode_long(mapping.id() as i64)
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }

    /// Writes the mapping and job tables as children of `root`.
    pub fn serialize(&self, root: &mut StateElement) {
        for mapping in self.mappings.values() {
            let mut element = StateElement::new(MAPPING_TAG);
            element.set_attr("i", self.mapping_ref(mapping));
            element.set_opt_attr("d", mapping.depot_path());
            element.set_opt_attr(
                "l",
                mapping
                    .local_path()
                    .map(|path| path.to_string_lossy().into_owned()),
            );
            root.add_child(element);
        }
        for job in self.jobs.values() {
            let mut element = StateElement::new(job::TAG);
            job.serialize(&mut element, self);
            root.add_child(element);
        }
    }
}

#[derive(Debug, Default)]
pub struct DecodeReferences {
    mappings: HashMap<String, FileMapping>,
    jobs: BTreeMap<String, P4JobState>,
}

impl DecodeReferences {
    /// Reads the tables under `root`, registering every mapping in `repo`.
    pub fn deserialize(root: &StateElement, repo: &FileMappingRepo) -> Result<Self> {
        let mut refs = Self::default();
        for element in root.children_named(MAPPING_TAG) {
            let reference = element.require_attr("i")?;
            let local = element.attr("l").map(Path::new);
            let mapping = match (element.attr("d"), local) {
                (Some(depot), local) => repo.get_by_depot_location(depot, local),
                (None, Some(local)) => repo.get_by_location(local),
                (None, None) => {
                    debug!("Skipping file mapping {reference} with no paths");
                    continue;
                }
            };
            refs.mappings.insert(reference.to_string(), mapping);
        }
        for element in root.children_named(job::TAG) {
            let job = P4JobState::deserialize(element, &refs)?;
            refs.jobs.insert(job.id.clone(), job);
        }
        Ok(refs)
    }

    pub fn mapping(&self, reference: &str) -> Result<FileMapping> {
        self.mappings
            .get(reference)
            .cloned()
            .ok_or_else(|| CacheError::unknown_mapping_reference(reference))
    }

    pub fn job(&self, id: &str) -> Option<P4JobState> {
        self.jobs.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_table_round_trip() {
        let repo = FileMappingRepo::new(false);
        let a = repo.get_by_depot_location("//depot/a.txt", Some(Path::new("/ws/a.txt")));
        let b = repo.get_by_location(Path::new("/ws/new.txt"));

        let mut encode = EncodeReferences::new();
        encode.add_mapping(&a);
        encode.add_mapping(&b);
        encode.add_mapping(&a);
        assert_eq!(encode.mapping_count(), 2);

        let mut root = StateElement::new("client");
        encode.serialize(&mut root);

        let fresh = FileMappingRepo::new(false);
        let decode = DecodeReferences::deserialize(&root, &fresh).unwrap();
        let a2 = decode.mapping(&encode.mapping_ref(&a)).unwrap();
        let b2 = decode.mapping(&encode.mapping_ref(&b)).unwrap();
        assert_eq!(a2.depot_path().as_deref(), Some("//depot/a.txt"));
        assert!(a2.is_at(Path::new("/ws/a.txt")));
        assert!(b2.depot_path().is_none());
        assert_eq!(fresh.len(), 2);
    }

    #[test]
    fn test_unknown_reference() {
        let decode = DecodeReferences::default();
        assert!(matches!(
            decode.mapping("zz"),
            Err(CacheError::UnknownMappingReference { .. })
        ));
    }
}
