//! Common contract for every piece of persisted, timestamped cache state.

use crate::core::encoding::StateElement;
use crate::core::error::Result;
use crate::state::references::{DecodeReferences, EncodeReferences};
use chrono::{DateTime, Utc};

/// Timestamp of state that has never been loaded from the server.
pub const NEVER_LOADED: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

const DATE_ATTR: &str = "t";

pub trait CachedState {
    fn last_updated(&self) -> DateTime<Utc>;

    fn set_last_updated(&mut self, when: DateTime<Utc>);

    /// Marks the state as freshly loaded.
    fn set_updated(&mut self) {
        self.set_last_updated(Utc::now());
    }

    fn is_never_loaded(&self) -> bool {
        self.last_updated() <= NEVER_LOADED
    }

    /// Writes this state's fields into `wrapper`, whose tag the caller chose.
    fn serialize(&self, wrapper: &mut StateElement, refs: &EncodeReferences);

    fn deserialize(wrapper: &StateElement, refs: &DecodeReferences) -> Result<Self>
    where
        Self: Sized;
}

pub(crate) fn serialize_date(wrapper: &mut StateElement, when: DateTime<Utc>) {
    wrapper.set_date(DATE_ATTR, when);
}

pub(crate) fn deserialize_date(wrapper: &StateElement) -> Result<DateTime<Utc>> {
    wrapper.get_date(DATE_ATTR)
}

/// Most recent timestamp among `states`, or [`NEVER_LOADED`] when empty.
pub fn max_last_updated<'a, S, I>(states: I) -> DateTime<Utc>
where
    S: CachedState + 'a,
    I: IntoIterator<Item = &'a S>,
{
    states
        .into_iter()
        .map(CachedState::last_updated)
        .max()
        .unwrap_or(NEVER_LOADED)
}
