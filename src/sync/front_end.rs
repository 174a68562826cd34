//! Staleness and refresh framework shared by every cache front-end.
//!
//! A front-end owns one slice of the server-mirrored state in a
//! [`ClientLocalServerState`] and decides when that slice is stale. Loading always
//! happens through a [`ServerContext`], which only the server connection can hand
//! out while it holds the per-client lock, so two refreshes for one client can
//! never overlap.

use crate::core::error::Result;
use crate::state::{ClientLocalServerState, NEVER_LOADED};
use crate::sync::alerts::AlertSink;
use crate::sync::exec::ServerExec;
use chrono::{DateTime, Duration, Utc};
use log::debug;

/// Access to the server while the connection lock is held.
pub struct ServerContext<'a> {
    exec: &'a dyn ServerExec,
    alerts: &'a dyn AlertSink,
}

impl<'a> ServerContext<'a> {
    pub(crate) fn new(exec: &'a dyn ServerExec, alerts: &'a dyn AlertSink) -> Self {
        Self { exec, alerts }
    }

    pub fn exec(&self) -> &'a dyn ServerExec {
        self.exec
    }

    pub fn alerts(&self) -> &'a dyn AlertSink {
        self.alerts
    }
}

pub trait CacheFrontEnd {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    fn last_refresh_date(&self) -> DateTime<Utc>;

    fn refresh_interval(&self) -> Duration;

    fn needs_refresh(&self) -> bool {
        self.last_refresh_date() + self.refresh_interval() < Utc::now()
    }

    /// Queries the server and replaces the cached slice. Server failures become
    /// alerts; only an interruption is returned as an error.
    fn inner_load_server_cache(
        &mut self,
        ctx: &ServerContext<'_>,
        state: &mut ClientLocalServerState,
    ) -> Result<()>;

    /// Refreshes the slice only when it is stale.
    fn load_server_cache(
        &mut self,
        ctx: &ServerContext<'_>,
        state: &mut ClientLocalServerState,
    ) -> Result<()> {
        if self.needs_refresh() {
            debug!(
                "Refreshing the {} cache; last refresh was {}",
                self.name(),
                self.last_refresh_date()
            );
            self.inner_load_server_cache(ctx, state)
        } else {
            debug!(
                "No need to refresh the {} cache; last refresh was {}",
                self.name(),
                self.last_refresh_date()
            );
            Ok(())
        }
    }

    /// Drops local speculative state that no pending update accounts for.
    fn check_local_integrity(&mut self, _state: &mut ClientLocalServerState) {}
}

/// True when `last` is older than `interval`, or was never loaded.
pub fn is_stale(last: DateTime<Utc>, interval: Duration) -> bool {
    last <= NEVER_LOADED || last + interval < Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        last: DateTime<Utc>,
    }

    impl CacheFrontEnd for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn last_refresh_date(&self) -> DateTime<Utc> {
            self.last
        }

        fn refresh_interval(&self) -> Duration {
            Duration::milliseconds(60_000)
        }

        fn inner_load_server_cache(
            &mut self,
            _ctx: &ServerContext<'_>,
            _state: &mut ClientLocalServerState,
        ) -> Result<()> {
            self.last = Utc::now();
            Ok(())
        }
    }

    #[test]
    fn test_needs_refresh_by_age() {
        let old = Fixed {
            last: Utc::now() - Duration::minutes(5),
        };
        assert!(old.needs_refresh());

        let fresh = Fixed { last: Utc::now() };
        assert!(!fresh.needs_refresh());
    }

    #[test]
    fn test_is_stale_never_loaded() {
        assert!(is_stale(NEVER_LOADED, Duration::days(365 * 100)));
        assert!(!is_stale(Utc::now(), Duration::minutes(1)));
    }
}
