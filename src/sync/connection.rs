//! Serialized access to one client's cache and its queue of server actions.
//!
//! Every query and every queued action runs while holding the connection lock,
//! so the cache never sees two refreshes or two replays at once. Losing the
//! server puts the connection offline: queries are skipped and the interrupted
//! batch waits at the head of the queue until the connection is back.

use crate::core::error::Result;
use crate::state::PendingUpdateState;
use crate::sync::action::{ActionOutcome, ServerUpdateAction};
use crate::sync::alerts::AlertSink;
use crate::sync::exec::ServerExec;
use crate::sync::front_end::ServerContext;
use crate::sync::manager::{ClientCacheManager, ServerQuery};
use log::{debug, info};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Totals of one pass over the action queue.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    pub performed: usize,
    pub completed: usize,
    pub failed: usize,
    /// Updates left queued for a later pass.
    pub retained: usize,
    /// The pass stopped because the server went away.
    pub went_offline: bool,
}

struct ConnectionState {
    manager: ClientCacheManager,
    online: bool,
    queue: VecDeque<ServerUpdateAction>,
    /// Batches cut short by a lost connection; they run before the queue.
    redo: VecDeque<ServerUpdateAction>,
}

pub struct ServerConnection {
    exec: Arc<dyn ServerExec>,
    alerts: Arc<dyn AlertSink>,
    inner: Mutex<ConnectionState>,
}

impl ServerConnection {
    /// Pending updates persisted with the state are queued again, in order.
    pub fn new(
        exec: Arc<dyn ServerExec>,
        alerts: Arc<dyn AlertSink>,
        manager: ClientCacheManager,
    ) -> Self {
        let queue: VecDeque<ServerUpdateAction> =
            ServerUpdateAction::group_consecutive(manager.state().pending_updates().to_vec())
                .into();
        if !queue.is_empty() {
            info!(
                "Restored {} pending action(s) for {}",
                queue.len(),
                manager.id()
            );
        }
        Self {
            exec,
            alerts,
            inner: Mutex::new(ConnectionState {
                manager,
                online: true,
                queue,
                redo: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn context(&self) -> ServerContext<'_> {
        ServerContext::new(self.exec.as_ref(), self.alerts.as_ref())
    }

    pub fn alerts(&self) -> &Arc<dyn AlertSink> {
        &self.alerts
    }

    pub fn is_online(&self) -> bool {
        self.lock().online
    }

    pub fn set_online(&self, online: bool) {
        let mut inner = self.lock();
        if inner.online != online {
            info!(
                "{} is now {}",
                inner.manager.id(),
                if online { "online" } else { "offline" }
            );
        }
        inner.online = online;
    }

    /// Runs `f` against the cache with the connection lock held.
    pub fn with_cache<T>(&self, f: impl FnOnce(&mut ClientCacheManager) -> T) -> T {
        f(&mut self.lock().manager)
    }

    /// Reloads part of the cache. Does nothing while offline.
    pub fn query(&self, query: &ServerQuery) -> Result<()> {
        let mut inner = self.lock();
        if !inner.online {
            debug!("Offline; skipping {query:?}");
            return Ok(());
        }
        let ctx = self.context();
        inner.manager.run_query(&ctx, query)
    }

    /// Performs `action` now, ahead of the queue. Offline, the action is queued
    /// and `None` is returned.
    pub fn run_immediately(&self, action: ServerUpdateAction) -> Result<Option<ActionOutcome>> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        for update in action.updates() {
            inner.manager.add_pending_update(update.clone());
        }
        if !inner.online {
            inner.queue.push_back(action);
            return Ok(None);
        }

        let ctx = self.context();
        let group = action.group();
        let mut outcome = action.perform(&ctx, &mut inner.manager)?;
        if !outcome.retained.is_empty() {
            inner
                .queue
                .push_back(ServerUpdateAction::new(group, outcome.retained.clone()));
        }
        if let Some(retry) = outcome.retry.take() {
            inner.redo.push_front(retry.clone());
            self.go_offline(inner);
            outcome.retry = Some(retry);
        }
        Ok(Some(outcome))
    }

    /// Creates pending updates through `f` and queues them for the server.
    /// Returns the number of updates queued.
    pub fn queue_updates<F>(&self, f: F) -> Result<usize>
    where
        F: FnOnce(&mut ClientCacheManager) -> Result<Vec<Option<PendingUpdateState>>>,
    {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let updates: Vec<PendingUpdateState> = f(&mut inner.manager)?.into_iter().flatten().collect();
        for update in &updates {
            inner.manager.add_pending_update(update.clone());
        }
        let count = updates.len();
        inner
            .queue
            .extend(ServerUpdateAction::group_consecutive(updates));
        debug!("Queued {count} update(s) for {}", inner.manager.id());
        Ok(count)
    }

    /// Puts a batch back to run before the rest of the queue.
    pub fn requeue(&self, action: ServerUpdateAction) {
        self.lock().redo.push_back(action);
    }

    pub fn pending_action_count(&self) -> usize {
        let inner = self.lock();
        inner.queue.len() + inner.redo.len()
    }

    fn go_offline(&self, inner: &mut ConnectionState) {
        inner.online = false;
        self.alerts.add_warning(
            "Disconnected",
            &format!(
                "Lost the connection to {}; pending changes are kept until it is back",
                inner.manager.id().server_id
            ),
            Vec::new(),
        );
    }

    /// Performs queued batches in order until the queue is empty or the server
    /// goes away.
    ///
    /// An interruption is returned as an error. The interrupted batch leaves the
    /// queue but its updates stay in the persisted state. Updates the server
    /// state made ambiguous are queued again behind the rest.
    pub fn process_queue(&self) -> Result<ProcessSummary> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let mut summary = ProcessSummary::default();
        if !inner.online {
            debug!("Offline; {} action(s) wait", inner.queue.len() + inner.redo.len());
            return Ok(summary);
        }

        let ctx = self.context();
        let mut held = Vec::new();
        while let Some(action) = inner.redo.pop_front().or_else(|| inner.queue.pop_front()) {
            summary.performed += 1;
            let group = action.group();
            let outcome = action.perform(&ctx, &mut inner.manager)?;
            summary.completed += outcome.completed.len();
            summary.failed += outcome.failed.len();
            summary.retained += outcome.retained.len();
            if !outcome.retained.is_empty() {
                held.push(ServerUpdateAction::new(group, outcome.retained));
            }
            if let Some(retry) = outcome.retry {
                debug!("{} update(s) wait for the server", retry.len());
                inner.redo.push_front(retry);
                self.go_offline(inner);
                summary.went_offline = true;
                break;
            }
        }
        // Run again on the next pass, not this one.
        inner.queue.extend(held);
        Ok(summary)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.lock().manager.save(path)
    }

    pub fn into_manager(self) -> ClientCacheManager {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .manager
    }
}
