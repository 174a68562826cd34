//! In-memory stand-in for a Perforce server
//!
//! Keeps just enough server behavior (depot files, opened files, pending
//! changelists, jobs) for the cache to reconcile against, records every call it
//! receives and can be told to drop the connection or interrupt a call.

#![allow(dead_code)]

use p4ic_cache::core::error::ExecError;
use p4ic_cache::sync::{
    ChangelistSummary, ClientSpec, ExecResult, FileMessage, FileStatus, HaveEntry, JobDetails,
    OpenAction, OpenedFile, ServerExec, UserSummary, ViewMapping,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeChange {
    pub description: String,
    pub jobs: Vec<String>,
}

#[derive(Debug, Clone)]
struct DepotFile {
    depot_path: String,
    head_rev: i64,
    have_rev: i64,
}

#[derive(Debug, Clone)]
struct OpenRecord {
    depot_path: String,
    action: OpenAction,
    changelist: i32,
}

#[derive(Debug, Default)]
struct ServerData {
    client: ClientSpec,
    depot: BTreeMap<PathBuf, DepotFile>,
    opened: BTreeMap<PathBuf, OpenRecord>,
    changes: BTreeMap<i32, FakeChange>,
    jobs: BTreeMap<String, JobDetails>,
    users: Vec<UserSummary>,
    job_statuses: Vec<String>,
    next_change: i32,
    calls: Vec<String>,
    offline: bool,
    disconnect_on: Option<&'static str>,
    interrupt_on: Option<&'static str>,
    failing: BTreeSet<&'static str>,
}

pub struct FakeServer {
    data: Mutex<ServerData>,
}

impl FakeServer {
    /// A server whose client `name` maps `//depot/...` under `root`.
    pub fn new(name: &str, root: &Path) -> Self {
        let client = ClientSpec {
            name: name.to_string(),
            root: Some(root.to_string_lossy().into_owned()),
            alt_roots: Vec::new(),
            view: vec![ViewMapping::new("//depot/...", format!("//{name}/..."))],
        };
        Self {
            data: Mutex::new(ServerData {
                client,
                next_change: 100,
                job_statuses: vec!["open".into(), "suspended".into(), "closed".into()],
                ..ServerData::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServerData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Scenario setup

    pub fn set_client(&self, client: ClientSpec) {
        self.lock().client = client;
    }

    pub fn client_spec(&self) -> ClientSpec {
        self.lock().client.clone()
    }

    /// Submits `path` at `head_rev`, synced to `have_rev` (0 for not synced).
    pub fn add_depot_file(&self, path: &Path, head_rev: i64, have_rev: i64) {
        let mut data = self.lock();
        let depot_path = data.depot_path_for(path);
        data.depot.insert(
            path.to_path_buf(),
            DepotFile {
                depot_path,
                head_rev,
                have_rev,
            },
        );
    }

    pub fn open_file(&self, path: &Path, action: OpenAction, changelist: i32) {
        let mut data = self.lock();
        let depot_path = data.depot_path_for(path);
        data.opened.insert(
            path.to_path_buf(),
            OpenRecord {
                depot_path,
                action,
                changelist,
            },
        );
    }

    pub fn add_changelist(&self, id: i32, description: &str, jobs: &[&str]) {
        let mut data = self.lock();
        data.changes.insert(
            id,
            FakeChange {
                description: description.to_string(),
                jobs: jobs.iter().map(|job| job.to_string()).collect(),
            },
        );
        data.next_change = data.next_change.max(id + 1);
    }

    pub fn add_job(&self, id: &str, description: &str) {
        self.lock().jobs.insert(
            id.to_string(),
            JobDetails {
                id: id.to_string(),
                description: description.to_string(),
                fields: vec![("Status".into(), "open".into())],
            },
        );
    }

    pub fn add_user(&self, id: &str, full_name: &str) {
        self.lock().users.push(UserSummary {
            id: id.to_string(),
            full_name: full_name.to_string(),
            email: format!("{id}@example.com"),
        });
    }

    // Connection behavior

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// The named call, and every call after it, fails with a lost connection.
    pub fn disconnect_on(&self, call: &'static str) {
        self.lock().disconnect_on = Some(call);
    }

    /// The next named call is interrupted.
    pub fn interrupt_on(&self, call: &'static str) {
        self.lock().interrupt_on = Some(call);
    }

    /// The named call always fails with a server error.
    pub fn fail_on(&self, call: &'static str) {
        self.lock().failing.insert(call);
    }

    // Inspection

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.as_str() == call).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Open action and changelist of `path`, if it is open.
    pub fn opened(&self, path: &Path) -> Option<(OpenAction, i32)> {
        self.lock()
            .opened
            .get(path)
            .map(|open| (open.action.clone(), open.changelist))
    }

    pub fn opened_count(&self) -> usize {
        self.lock().opened.len()
    }

    pub fn changelist(&self, id: i32) -> Option<FakeChange> {
        self.lock().changes.get(&id).cloned()
    }

    pub fn depot_path_of(&self, path: &Path) -> String {
        self.lock().depot_path_for(path)
    }

    fn begin(&self, call: &'static str) -> ExecResult<MutexGuard<'_, ServerData>> {
        let mut data = self.lock();
        data.calls.push(call.to_string());
        if data.interrupt_on == Some(call) {
            data.interrupt_on = None;
            return Err(ExecError::Interrupted);
        }
        if data.disconnect_on == Some(call) {
            data.disconnect_on = None;
            data.offline = true;
        }
        if data.offline {
            return Err(ExecError::disconnected(format!("{call}: connection refused")));
        }
        if data.failing.contains(call) {
            return Err(ExecError::server(format!("{call} rejected")));
        }
        Ok(data)
    }
}

impl ServerData {
    fn root(&self) -> Option<PathBuf> {
        self.client.root.as_ref().map(PathBuf::from)
    }

    fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        let root = self.root()?;
        path.strip_prefix(root).ok()
    }

    fn slashed(path: &Path) -> String {
        path.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn depot_path_for(&self, path: &Path) -> String {
        match self.relative(path) {
            Some(relative) => format!("//depot/{}", Self::slashed(relative)),
            None => format!("//outside/{}", Self::slashed(path)),
        }
    }

    fn client_path_for(&self, path: &Path) -> PathBuf {
        match self.relative(path) {
            Some(relative) => {
                PathBuf::from(format!("//{}/{}", self.client.name, Self::slashed(relative)))
            }
            None => path.to_path_buf(),
        }
    }

    fn head_rev(&self, path: &Path) -> i64 {
        self.depot.get(path).map_or(0, |file| file.head_rev)
    }

    fn open(&mut self, path: &Path, action: OpenAction, changelist: i32) {
        let depot_path = self.depot_path_for(path);
        self.opened.insert(
            path.to_path_buf(),
            OpenRecord {
                depot_path,
                action,
                changelist,
            },
        );
    }

    fn check_changelist(&self, changelist: i32) -> ExecResult<()> {
        if changelist == 0 || self.changes.contains_key(&changelist) {
            Ok(())
        } else {
            Err(ExecError::server(format!("Change {changelist} unknown")))
        }
    }
}

fn opened_message(file: &Path, action: &str) -> FileMessage {
    FileMessage::info(file, format!("{} - opened for {action}", file.display()))
}

impl ServerExec for FakeServer {
    fn client_name(&self) -> String {
        self.lock().client.name.clone()
    }

    fn username(&self) -> String {
        "tester".to_string()
    }

    fn get_client(&self) -> ExecResult<ClientSpec> {
        Ok(self.begin("get_client")?.client.clone())
    }

    fn get_pending_changelists(&self) -> ExecResult<Vec<ChangelistSummary>> {
        let data = self.begin("get_pending_changelists")?;
        Ok(data
            .changes
            .iter()
            .map(|(id, change)| ChangelistSummary {
                id: *id,
                description: change.description.clone(),
                shelved: false,
                restricted: false,
            })
            .collect())
    }

    fn get_job_ids_for_changelist(&self, changelist: i32) -> ExecResult<Vec<String>> {
        let data = self.begin("get_job_ids_for_changelist")?;
        data.changes
            .get(&changelist)
            .map(|change| change.jobs.clone())
            .ok_or_else(|| ExecError::server(format!("Change {changelist} unknown")))
    }

    fn get_job(&self, id: &str) -> ExecResult<Option<JobDetails>> {
        Ok(self.begin("get_job")?.jobs.get(id).cloned())
    }

    fn get_opened_files(&self, roots: &[PathBuf]) -> ExecResult<Vec<OpenedFile>> {
        let data = self.begin("get_opened_files")?;
        Ok(data
            .opened
            .iter()
            .filter(|(path, _)| roots.is_empty() || roots.iter().any(|root| path.starts_with(root)))
            .map(|(path, open)| OpenedFile {
                depot_path: open.depot_path.clone(),
                client_path: Some(data.client_path_for(path)),
                action: open.action.clone(),
                changelist: open.changelist,
            })
            .collect())
    }

    fn get_file_status(&self, files: &[PathBuf]) -> ExecResult<Vec<FileStatus>> {
        let data = self.begin("get_file_status")?;
        Ok(files
            .iter()
            .map(|file| {
                if data.relative(file).is_none() {
                    return FileStatus::NotInClientView { client_path: None };
                }
                match (data.opened.get(file), data.depot.get(file)) {
                    (Some(open), _) => FileStatus::Valid {
                        depot_path: open.depot_path.clone(),
                        open_action: Some(open.action.clone()),
                        changelist: open.changelist,
                        head_rev: data.head_rev(file),
                    },
                    (None, Some(depot)) => FileStatus::Valid {
                        depot_path: depot.depot_path.clone(),
                        open_action: None,
                        changelist: 0,
                        head_rev: depot.head_rev,
                    },
                    (None, None) => FileStatus::NotOnServer,
                }
            })
            .collect())
    }

    fn get_have_list(&self, files: &[PathBuf]) -> ExecResult<Vec<HaveEntry>> {
        let data = self.begin("get_have_list")?;
        Ok(files
            .iter()
            .filter_map(|file| {
                let depot = data.depot.get(file).filter(|depot| depot.have_rev > 0)?;
                Some(HaveEntry {
                    depot_path: depot.depot_path.clone(),
                    local_path: file.clone(),
                    revision: depot.have_rev,
                })
            })
            .collect())
    }

    fn get_users(&self) -> ExecResult<Vec<UserSummary>> {
        Ok(self.begin("get_users")?.users.clone())
    }

    fn get_job_status_values(&self) -> ExecResult<Vec<String>> {
        Ok(self.begin("get_job_status_values")?.job_statuses.clone())
    }

    fn add_files(&self, files: &[PathBuf], changelist: i32) -> ExecResult<Vec<FileMessage>> {
        let mut data = self.begin("add_files")?;
        data.check_changelist(changelist)?;
        let mut messages = Vec::new();
        for file in files {
            if data.depot.contains_key(file) || data.opened.contains_key(file) {
                messages.push(FileMessage::error(
                    file,
                    format!("{} - can't add existing file", file.display()),
                ));
                continue;
            }
            data.open(file, OpenAction::Add, changelist);
            messages.push(opened_message(file, "add"));
        }
        Ok(messages)
    }

    fn edit_files(&self, files: &[PathBuf], changelist: i32) -> ExecResult<Vec<FileMessage>> {
        let mut data = self.begin("edit_files")?;
        data.check_changelist(changelist)?;
        let mut messages = Vec::new();
        for file in files {
            if let Some(open) = data.opened.get(file) {
                messages.push(FileMessage::info(
                    file,
                    format!("{} - currently opened for {}", file.display(), open.action),
                ));
                continue;
            }
            if !data.depot.contains_key(file) {
                messages.push(FileMessage::error(
                    file,
                    format!("{} - file(s) not on client", file.display()),
                ));
                continue;
            }
            data.open(file, OpenAction::Edit, changelist);
            messages.push(opened_message(file, "edit"));
        }
        Ok(messages)
    }

    fn reopen_files(&self, files: &[PathBuf], changelist: i32) -> ExecResult<Vec<FileMessage>> {
        let mut data = self.begin("reopen_files")?;
        data.check_changelist(changelist)?;
        let mut messages = Vec::new();
        for file in files {
            match data.opened.get_mut(file) {
                Some(open) => {
                    open.changelist = changelist;
                    messages.push(FileMessage::info(
                        file,
                        format!("{} - reopened; change {changelist}", file.display()),
                    ));
                }
                None => messages.push(FileMessage::error(
                    file,
                    format!("{} - file(s) not opened on this client", file.display()),
                )),
            }
        }
        Ok(messages)
    }

    fn delete_files(&self, files: &[PathBuf], changelist: i32) -> ExecResult<Vec<FileMessage>> {
        let mut data = self.begin("delete_files")?;
        data.check_changelist(changelist)?;
        let mut messages = Vec::new();
        for file in files {
            if !data.depot.contains_key(file) {
                messages.push(FileMessage::error(
                    file,
                    format!("{} - file(s) not on client", file.display()),
                ));
            } else if let Some(open) = data.opened.get(file) {
                messages.push(FileMessage::error(
                    file,
                    format!("{} - currently opened for {}", file.display(), open.action),
                ));
            } else {
                data.open(file, OpenAction::Delete, changelist);
                messages.push(opened_message(file, "delete"));
            }
        }
        Ok(messages)
    }

    fn revert_files(&self, files: &[PathBuf]) -> ExecResult<Vec<FileMessage>> {
        let mut data = self.begin("revert_files")?;
        let mut messages = Vec::new();
        for file in files {
            match data.opened.remove(file) {
                Some(_) => messages.push(FileMessage::info(
                    file,
                    format!("{} - was reverted", file.display()),
                )),
                None => messages.push(FileMessage::error(
                    file,
                    format!("{} - file(s) not opened on this client", file.display()),
                )),
            }
        }
        Ok(messages)
    }

    fn move_file(
        &self,
        source: &Path,
        target: &Path,
        changelist: i32,
    ) -> ExecResult<Vec<FileMessage>> {
        let mut data = self.begin("move_file")?;
        data.check_changelist(changelist)?;
        let movable = data
            .opened
            .get(source)
            .is_some_and(|open| matches!(open.action, OpenAction::Edit | OpenAction::Add));
        if !movable {
            return Ok(vec![FileMessage::error(
                source,
                format!("{} - not opened for edit", source.display()),
            )]);
        }
        data.opened.remove(source);
        if data.depot.contains_key(source) {
            data.open(source, OpenAction::MoveDelete, changelist);
        }
        data.open(target, OpenAction::MoveAdd, changelist);
        Ok(vec![FileMessage::info(
            target,
            format!("{} - moved from {}", target.display(), source.display()),
        )])
    }

    fn integrate_file(
        &self,
        source: &Path,
        target: &Path,
        changelist: i32,
    ) -> ExecResult<Vec<FileMessage>> {
        let mut data = self.begin("integrate_file")?;
        data.check_changelist(changelist)?;
        if !data.depot.contains_key(source) {
            return Ok(vec![FileMessage::error(
                source,
                format!("{} - no such file(s)", source.display()),
            )]);
        }
        let action = if data.depot.contains_key(target) {
            OpenAction::Integrate
        } else {
            OpenAction::Branch
        };
        data.open(target, action, changelist);
        Ok(vec![FileMessage::info(
            target,
            format!("{} - branch/sync from {}", target.display(), source.display()),
        )])
    }

    fn create_changelist(&self, description: &str) -> ExecResult<i32> {
        let mut data = self.begin("create_changelist")?;
        let id = data.next_change;
        data.next_change += 1;
        data.changes.insert(
            id,
            FakeChange {
                description: description.to_string(),
                jobs: Vec::new(),
            },
        );
        Ok(id)
    }

    fn update_changelist_description(
        &self,
        changelist: i32,
        description: &str,
    ) -> ExecResult<()> {
        let mut data = self.begin("update_changelist_description")?;
        match data.changes.get_mut(&changelist) {
            Some(change) => {
                change.description = description.to_string();
                Ok(())
            }
            None => Err(ExecError::server(format!("Change {changelist} unknown"))),
        }
    }

    fn delete_pending_changelist(&self, changelist: i32) -> ExecResult<()> {
        let mut data = self.begin("delete_pending_changelist")?;
        if data.opened.values().any(|open| open.changelist == changelist) {
            return Err(ExecError::server(format!(
                "Change {changelist} has files open"
            )));
        }
        data.changes
            .remove(&changelist)
            .map(|_| ())
            .ok_or_else(|| ExecError::server(format!("Change {changelist} unknown")))
    }

    fn add_jobs_to_changelist(&self, changelist: i32, jobs: &[String]) -> ExecResult<()> {
        let mut data = self.begin("add_jobs_to_changelist")?;
        if let Some(missing) = jobs.iter().find(|job| !data.jobs.contains_key(*job)) {
            return Err(ExecError::server(format!("Job '{missing}' doesn't exist")));
        }
        let change = data
            .changes
            .get_mut(&changelist)
            .ok_or_else(|| ExecError::server(format!("Change {changelist} unknown")))?;
        for job in jobs {
            if !change.jobs.contains(job) {
                change.jobs.push(job.clone());
            }
        }
        Ok(())
    }

    fn remove_jobs_from_changelist(&self, changelist: i32, jobs: &[String]) -> ExecResult<()> {
        let mut data = self.begin("remove_jobs_from_changelist")?;
        let change = data
            .changes
            .get_mut(&changelist)
            .ok_or_else(|| ExecError::server(format!("Change {changelist} unknown")))?;
        change.jobs.retain(|job| !jobs.contains(job));
        Ok(())
    }
}
