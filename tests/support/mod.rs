#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use questlog::{
    app::{App, AppStatus, Instance, InstanceStatus, assemble_apps},
    backend::{BackendError, BackendResult, DeviceBackend},
    core::store::OperationStore,
    operation::OperationRecord,
    runtime::handle::{RuntimeConfig, TrackerHandle, spawn_tracker},
    types::{AppKey, OperationId, OperationStatus},
};

pub const TICK: Duration = Duration::from_millis(5);

/// Kind of mutating request, used to pick a status script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Install,
    Sideload,
    Uninstall,
    Create,
    Start,
    Stop,
    DeleteInstance,
    Migrate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Install(AppKey),
    Sideload(AppKey),
    Uninstall(AppKey),
    Create(AppKey),
    Start(String),
    Stop(String),
    DeleteInstance(String),
    Migrate(String, String),
    DeleteOperation(OperationId),
    /// Operation observed in a terminal status for the first time.
    Finished(OperationId, OperationStatus),
}

impl Call {
    pub fn kind(&self) -> Option<Kind> {
        Some(match self {
            Call::Install(_) => Kind::Install,
            Call::Sideload(_) => Kind::Sideload,
            Call::Uninstall(_) => Kind::Uninstall,
            Call::Create(_) => Kind::Create,
            Call::Start(_) => Kind::Start,
            Call::Stop(_) => Kind::Stop,
            Call::DeleteInstance(_) => Kind::DeleteInstance,
            Call::Migrate(..) => Kind::Migrate,
            Call::DeleteOperation(_) | Call::Finished(..) => return None,
        })
    }
}

struct Scripted {
    description: String,
    statuses: VecDeque<OperationStatus>,
    current: OperationStatus,
    result: Option<String>,
    effect: Option<Call>,
}

#[derive(Default)]
struct State {
    next_op: OperationId,
    next_instance: u32,
    ops: HashMap<OperationId, Scripted>,
    scripts: HashMap<Kind, VecDeque<Vec<OperationStatus>>>,
    calls: Vec<Call>,
    listing: Vec<OperationRecord>,
    list_calls: usize,
    get_calls: usize,
    fail_gets: bool,
    fail_list: bool,
    fail_deletes: HashSet<OperationId>,
    apps: Vec<App>,
    instances: Vec<Instance>,
}

/// In-memory device whose operations advance one scripted status per get.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<State>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Statuses reported by successive gets of the next `kind` operation.
    /// Without a script an operation reports `running`, then `successful`.
    pub fn script(&self, kind: Kind, statuses: &[OperationStatus]) {
        self.lock()
            .scripts
            .entry(kind)
            .or_default()
            .push_back(statuses.to_vec());
    }

    pub fn set_listing(&self, records: Vec<OperationRecord>) {
        self.lock().listing = records;
    }

    pub fn set_fail_gets(&self, on: bool) {
        self.lock().fail_gets = on;
    }

    pub fn set_fail_list(&self, on: bool) {
        self.lock().fail_list = on;
    }

    pub fn fail_delete(&self, id: OperationId) {
        self.lock().fail_deletes.insert(id);
    }

    pub fn add_app(&self, key: AppKey, title: Option<&str>, status: AppStatus) {
        self.lock().apps.push(App {
            app_key: key,
            title: title.map(str::to_string),
            status,
            installed_versions: Default::default(),
            instances: Vec::new(),
        });
    }

    pub fn add_instance(&self, id: &str, key: AppKey, status: InstanceStatus) {
        self.lock().instances.push(Instance {
            instance_id: id.to_string(),
            instance_name: id.to_string(),
            app_key: key,
            status,
            desired: status,
            editors: Vec::new(),
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, kind: Kind) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.kind() == Some(kind))
            .count()
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn get_calls(&self) -> usize {
        self.lock().get_calls
    }

    pub fn instances(&self) -> Vec<Instance> {
        self.lock().instances.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake backend lock")
    }

    fn issue(&self, call: Call, description: &str) -> OperationId {
        let mut state = self.lock();
        let kind = call.kind().expect("mutating call");
        let statuses = state
            .scripts
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| vec![OperationStatus::Running, OperationStatus::Successful]);

        state.next_op += 1;
        let id = state.next_op;
        let result = if kind == Kind::Create {
            state.next_instance += 1;
            Some(format!("inst-{}", state.next_instance))
        } else {
            None
        };
        state.calls.push(call.clone());
        state.ops.insert(
            id,
            Scripted {
                description: description.to_string(),
                statuses: statuses.into(),
                current: OperationStatus::Pending,
                result,
                effect: Some(call),
            },
        );
        id
    }
}

fn apply(state: &mut State, effect: Call, result: Option<&str>) {
    match effect {
        Call::Install(key) | Call::Sideload(key) => {
            match state.apps.iter_mut().find(|a| a.app_key == key) {
                Some(app) => app.status = AppStatus::Installed,
                None => state.apps.push(App {
                    app_key: key,
                    title: None,
                    status: AppStatus::Installed,
                    installed_versions: Default::default(),
                    instances: Vec::new(),
                }),
            }
        }
        Call::Uninstall(key) => state.apps.retain(|a| a.app_key != key),
        Call::Create(key) => {
            let id = result.unwrap_or_default().to_string();
            state.instances.push(Instance {
                instance_id: id.clone(),
                instance_name: id,
                app_key: key,
                status: InstanceStatus::Created,
                desired: InstanceStatus::Created,
                editors: Vec::new(),
            });
        }
        Call::Start(id) => set_instance_status(state, &id, InstanceStatus::Running),
        Call::Stop(id) => set_instance_status(state, &id, InstanceStatus::Stopped),
        Call::DeleteInstance(id) => state.instances.retain(|i| i.instance_id != id),
        Call::Migrate(id, to) => {
            if let Some(instance) = state.instances.iter_mut().find(|i| i.instance_id == id) {
                instance.app_key.version = to;
            }
        }
        Call::DeleteOperation(_) | Call::Finished(..) => {}
    }
}

fn set_instance_status(state: &mut State, id: &str, status: InstanceStatus) {
    if let Some(instance) = state.instances.iter_mut().find(|i| i.instance_id == id) {
        instance.status = status;
        instance.desired = status;
    }
}

fn find_listed(records: &[OperationRecord], id: OperationId) -> Option<OperationRecord> {
    records.iter().find_map(|r| {
        if r.id == id {
            Some(r.clone())
        } else {
            find_listed(&r.subquests, id)
        }
    })
}

fn not_found(id: OperationId) -> BackendError {
    BackendError::Api {
        status: 404,
        body: format!("no operation {id}"),
    }
}

#[async_trait]
impl DeviceBackend for FakeBackend {
    async fn list_operations(&self) -> BackendResult<Vec<OperationRecord>> {
        let mut state = self.lock();
        state.list_calls += 1;
        if state.fail_list {
            return Err(BackendError::Transport("connection refused".into()));
        }
        Ok(state.listing.clone())
    }

    async fn get_operation(&self, id: OperationId) -> BackendResult<OperationRecord> {
        let mut state = self.lock();
        state.get_calls += 1;
        if state.fail_gets {
            return Err(BackendError::Transport("connection reset".into()));
        }
        if let Some(record) = find_listed(&state.listing, id) {
            return Ok(record);
        }

        let op = state.ops.get_mut(&id).ok_or_else(|| not_found(id))?;
        let was_terminal = op.current.is_terminal();
        if !was_terminal {
            if let Some(next) = op.statuses.pop_front() {
                op.current = next;
            }
        }
        let mut record = OperationRecord::new(id, op.current, op.description.clone());
        if let Some(result) = &op.result {
            record = record.with_result(result.clone());
        }
        let finished_now = !was_terminal && record.is_terminal();
        let effect = if finished_now && record.is_finished_ok() {
            op.effect.take()
        } else {
            None
        };
        let result = op.result.clone();

        if finished_now {
            state.calls.push(Call::Finished(id, record.status));
        }
        if let Some(effect) = effect {
            apply(&mut state, effect, result.as_deref());
        }
        Ok(record)
    }

    async fn delete_operation(&self, id: OperationId) -> BackendResult<()> {
        let mut state = self.lock();
        if state.fail_deletes.contains(&id) {
            return Err(BackendError::Api {
                status: 500,
                body: "busy".into(),
            });
        }
        state.calls.push(Call::DeleteOperation(id));
        state.listing.retain(|r| r.id != id);
        Ok(())
    }

    async fn list_apps(&self) -> BackendResult<Vec<App>> {
        let state = self.lock();
        Ok(assemble_apps(state.apps.clone(), state.instances.clone()))
    }

    async fn install_app(&self, app: &AppKey) -> BackendResult<OperationId> {
        Ok(self.issue(Call::Install(app.clone()), "Installation of app"))
    }

    async fn sideload_app(&self, manifest: &str) -> BackendResult<OperationId> {
        let doc: serde_json::Value =
            serde_json::from_str(manifest).map_err(|e| BackendError::Decode(e.to_string()))?;
        let key = AppKey::new(
            doc["app"].as_str().unwrap_or_default(),
            doc["version"].as_str().unwrap_or_default(),
        );
        Ok(self.issue(Call::Sideload(key), "Sideloading of app"))
    }

    async fn uninstall_app(&self, app: &AppKey) -> BackendResult<OperationId> {
        Ok(self.issue(Call::Uninstall(app.clone()), "Uninstallation of app"))
    }

    async fn create_instance(
        &self,
        app: &AppKey,
        _instance_name: Option<&str>,
    ) -> BackendResult<OperationId> {
        Ok(self.issue(Call::Create(app.clone()), "Creation of instance"))
    }

    async fn start_instance(&self, instance_id: &str) -> BackendResult<OperationId> {
        Ok(self.issue(Call::Start(instance_id.to_string()), "Starting instance"))
    }

    async fn stop_instance(&self, instance_id: &str) -> BackendResult<OperationId> {
        // reports no description, so failures fall back to a generated message
        Ok(self.issue(Call::Stop(instance_id.to_string()), ""))
    }

    async fn delete_instance(&self, instance_id: &str) -> BackendResult<OperationId> {
        Ok(self.issue(Call::DeleteInstance(instance_id.to_string()), "Deleting instance"))
    }

    async fn migrate_instance(
        &self,
        instance_id: &str,
        to_version: &str,
    ) -> BackendResult<OperationId> {
        Ok(self.issue(
            Call::Migrate(instance_id.to_string(), to_version.to_string()),
            "Migrating instance",
        ))
    }
}

pub fn runtime_config() -> RuntimeConfig {
    RuntimeConfig::default().with_poll_interval(TICK)
}

pub fn tracker(backend: Arc<FakeBackend>) -> TrackerHandle {
    spawn_tracker(OperationStore::new(), backend, runtime_config())
}

pub fn op(id: OperationId, status: OperationStatus) -> OperationRecord {
    OperationRecord::new(id, status, format!("operation {id}"))
}
