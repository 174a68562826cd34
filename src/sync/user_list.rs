//! Server user list, refreshed daily.

use crate::core::error::Result;
use crate::state::{CachedState, ClientLocalServerState, UserSummaryListState};
use crate::sync::exec::Interruptible;
use crate::sync::front_end::{CacheFrontEnd, ServerContext};
use chrono::{DateTime, Duration, Utc};
use log::debug;

#[derive(Debug)]
pub struct UserListCache {
    last_refreshed: DateTime<Utc>,
    interval: Duration,
}

impl UserListCache {
    pub fn new(state: &ClientLocalServerState, interval: Duration) -> Self {
        Self {
            last_refreshed: state.server.users.last_updated(),
            interval,
        }
    }
}

impl CacheFrontEnd for UserListCache {
    fn name(&self) -> &'static str {
        "users"
    }

    fn last_refresh_date(&self) -> DateTime<Utc> {
        self.last_refreshed
    }

    fn refresh_interval(&self) -> Duration {
        self.interval
    }

    fn inner_load_server_cache(
        &mut self,
        ctx: &ServerContext<'_>,
        state: &mut ClientLocalServerState,
    ) -> Result<()> {
        match ctx.exec().get_users().interruptible()? {
            Ok(users) => {
                debug!("Loaded {} user(s)", users.len());
                let mut list = UserSummaryListState::new(users);
                list.set_updated();
                self.last_refreshed = list.last_updated();
                state.server.users = list;
            }
            Err(err) => {
                ctx.alerts()
                    .add_warning("Could not load the user list", &err.to_string(), Vec::new());
            }
        }
        Ok(())
    }
}
