//! The "have" record: which revision of a file the client has synced.

use crate::core::encoding::StateElement;
use crate::core::error::Result;
use crate::state::cached_state::{deserialize_date, serialize_date, CachedState, NEVER_LOADED};
use crate::state::identity::FileMapping;
use crate::state::references::{DecodeReferences, EncodeReferences};
use chrono::{DateTime, Utc};
use log::debug;
use std::fs;
use std::io::ErrorKind;

pub const TAG: &str = "h";

/// Revision of a file that is not on the client.
pub const REV_NONE: i64 = -1;

#[derive(Debug, Clone)]
pub struct P4FileSyncState {
    mapping: FileMapping,
    revision: i64,
    digest: Option<String>,
    last_updated: DateTime<Utc>,
}

impl P4FileSyncState {
    pub fn new(mapping: FileMapping) -> Self {
        Self {
            mapping,
            revision: REV_NONE,
            digest: None,
            last_updated: NEVER_LOADED,
        }
    }

    pub fn mapping(&self) -> &FileMapping {
        &self.mapping
    }

    pub fn revision(&self) -> i64 {
        self.revision
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// A new revision invalidates the content digest.
    pub fn set_revision(&mut self, revision: i64) {
        if revision != self.revision {
            self.digest = None;
        }
        self.revision = revision;
    }

    /// Applies a have-list result and marks the record fresh.
    pub fn update_from_have(&mut self, revision: i64) {
        self.set_revision(revision);
        self.set_updated();
    }

    /// Recomputes the md5 digest of the local file. A missing file clears it.
    pub fn refresh_digest(&mut self) -> Result<()> {
        let Some(path) = self.mapping.local_path() else {
            self.digest = None;
            return Ok(());
        };
        match fs::read(&path) {
            Ok(bytes) => {
                self.digest = Some(format!("{:x}", md5::compute(bytes)));
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("No local file for {}; clearing digest", path.display());
                self.digest = None;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl PartialEq for P4FileSyncState {
    fn eq(&self, other: &Self) -> bool {
        self.mapping == other.mapping
    }
}

impl CachedState for P4FileSyncState {
    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    fn set_last_updated(&mut self, when: DateTime<Utc>) {
        self.last_updated = when;
    }

    fn serialize(&self, wrapper: &mut StateElement, refs: &EncodeReferences) {
        serialize_date(wrapper, self.last_updated);
        wrapper.set_attr("f", refs.mapping_ref(&self.mapping));
        wrapper.set_int("r", self.revision);
        wrapper.set_opt_attr("d", self.digest.as_deref());
    }

    fn deserialize(wrapper: &StateElement, refs: &DecodeReferences) -> Result<Self> {
        wrapper.expect_tag(TAG)?;
        Ok(Self {
            mapping: refs.mapping(wrapper.require_attr("f")?)?,
            revision: wrapper.get_int("r")?.unwrap_or(REV_NONE),
            digest: wrapper.attr("d").map(str::to_string),
            last_updated: deserialize_date(wrapper)?,
        })
    }
}
