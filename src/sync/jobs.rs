//! Job details referenced by pending changelists.

use crate::core::error::Result;
use crate::state::cached_state::max_last_updated;
use crate::state::{ClientLocalServerState, P4JobState};
use crate::sync::exec::Interruptible;
use crate::sync::front_end::{CacheFrontEnd, ServerContext};
use chrono::{DateTime, Duration, Utc};
use log::debug;

#[derive(Debug)]
pub struct JobCache {
    last_refreshed: DateTime<Utc>,
    interval: Duration,
}

impl JobCache {
    pub fn new(state: &ClientLocalServerState, interval: Duration) -> Self {
        Self {
            last_refreshed: max_last_updated(state.server.jobs.values()),
            interval,
        }
    }

    pub fn get_job<'a>(&self, state: &'a ClientLocalServerState, id: &str) -> Option<&'a P4JobState> {
        state.server.jobs.get(id)
    }
}

impl CacheFrontEnd for JobCache {
    fn name(&self) -> &'static str {
        "jobs"
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
        let ids: Vec<String> = state.server.jobs.keys().cloned().collect();
        refresh_job_states(ctx, state, &ids)?;
        self.last_refreshed = Utc::now();
        Ok(())
    }
}

/// Reloads the given jobs. Jobs the server no longer has are dropped.
pub(crate) fn refresh_job_states(
    ctx: &ServerContext<'_>,
    state: &mut ClientLocalServerState,
    ids: &[String],
) -> Result<()> {
    for id in ids {
        match ctx.exec().get_job(id).interruptible()? {
            Ok(Some(details)) => {
                state
                    .server
                    .jobs
                    .insert(id.clone(), P4JobState::from_details(&details));
            }
            Ok(None) => {
                debug!("Job {id} no longer exists");
                state.server.jobs.remove(id);
            }
            Err(err) => ctx.alerts().add_notice(
                &format!("Could not load job {id}"),
                &err.to_string(),
                Vec::new(),
            ),
        }
    }
    Ok(())
}
