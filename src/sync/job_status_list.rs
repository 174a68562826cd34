//! Allowed job status values, refreshed daily.

use crate::core::error::Result;
use crate::state::{CachedState, ClientLocalServerState, JobStatusListState};
use crate::sync::exec::Interruptible;
use crate::sync::front_end::{CacheFrontEnd, ServerContext};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug)]
pub struct JobStatusListCache {
    last_refreshed: DateTime<Utc>,
    interval: Duration,
}

impl JobStatusListCache {
    pub fn new(state: &ClientLocalServerState, interval: Duration) -> Self {
        Self {
            last_refreshed: state.server.job_status.last_updated(),
            interval,
        }
    }
}

impl CacheFrontEnd for JobStatusListCache {
    fn name(&self) -> &'static str {
        "job statuses"
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
        match ctx.exec().get_job_status_values().interruptible()? {
            Ok(statuses) => {
                let mut list = JobStatusListState::new(statuses);
                list.set_updated();
                self.last_refreshed = list.last_updated();
                state.server.job_status = list;
            }
            // The previous list stays in use.
            Err(err) => ctx.alerts().add_warning(
                "Could not load job statuses",
                &err.to_string(),
                Vec::new(),
            ),
        }
        Ok(())
    }
}
