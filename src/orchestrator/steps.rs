//! Multi-step app lifecycle sequences.
//!
//! Each sequence issues one backend operation per step and only moves on
//! once the previous operation finished OK. Failures come back as
//! [`FlowError`]; [`super::flow::Flow`] turns them into view state.

use std::{fmt, sync::Arc};

use futures::future::try_join_all;

use crate::{
    app::find_app,
    backend::{BackendError, DeviceBackend},
    operation::OperationRecord,
    runtime::{
        handle::{TrackerError, TrackerHandle},
        waiter::Waiter,
    },
    types::{AppKey, InstanceId, OperationId, OperationStatus},
    version::is_upgrade,
};

/// An instance whose migration did not finish OK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFailure {
    pub instance_id: InstanceId,
    pub operation_id: OperationId,
    pub status: OperationStatus,
}

impl fmt::Display for MigrationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.status, self.instance_id)
    }
}

fn join_failures(failures: &[MigrationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("{name} is not installed and therefore can't be updated!")]
    NotInstalled { name: String, version: String },

    /// A step's operation finished with a non-OK status.
    #[error("{message}")]
    OperationFailed {
        id: OperationId,
        status: OperationStatus,
        message: String,
    },

    #[error("One or more instance migrations failed with status: {}", join_failures(.0))]
    MigrationsFailed(Vec<MigrationFailure>),

    #[error("invalid app manifest: {0}")]
    InvalidManifest(String),

    #[error("operation {0} finished without reporting an instance id")]
    MissingInstanceId(OperationId),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// A user-visible action made of one or more backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Install from the marketplace, then create and start one instance.
    Install {
        app: AppKey,
        title: Option<String>,
        instance_name: Option<String>,
    },
    /// Install from a manifest document, then create and start one instance.
    Sideload {
        manifest: String,
        title: Option<String>,
    },
    /// Install `to`, migrate every instance of `from`, optionally remove `from`.
    Update {
        app_name: String,
        title: Option<String>,
        from: String,
        to: String,
        /// Off by default; the device keeps `from` installed after migrating.
        remove_previous: bool,
    },
    Uninstall {
        app: AppKey,
        title: Option<String>,
    },
    AddInstance {
        app: AppKey,
        instance_name: Option<String>,
        start: bool,
    },
    StartInstance {
        instance_id: InstanceId,
    },
    StopInstance {
        instance_id: InstanceId,
    },
    DeleteInstance {
        instance_id: InstanceId,
    },
}

impl LifecycleAction {
    pub fn install(app: AppKey) -> Self {
        Self::Install {
            app,
            title: None,
            instance_name: None,
        }
    }

    pub fn update(app_name: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Update {
            app_name: app_name.into(),
            title: None,
            from: from.into(),
            to: to.into(),
            remove_previous: false,
        }
    }

    pub fn uninstall(app: AppKey) -> Self {
        Self::Uninstall { app, title: None }
    }

    pub fn sideload(manifest: impl Into<String>) -> Self {
        Self::Sideload {
            manifest: manifest.into(),
            title: None,
        }
    }

    /// Labels of the step indicator, in execution order.
    pub fn steps(&self) -> Vec<String> {
        let labels: &[&str] = match self {
            Self::Install { .. } => &["Installing app", "Creating instance", "Starting instance"],
            Self::Sideload { .. } => &["Sideloading app", "Creating instance", "Starting instance"],
            Self::Update {
                remove_previous: true,
                ..
            } => &["Installing version", "Migrating instances", "Removing previous version"],
            Self::Update { .. } => &["Installing version", "Migrating instances"],
            Self::Uninstall { .. } => &["Uninstalling app"],
            Self::AddInstance { start: true, .. } => &["Creating instance", "Starting instance"],
            Self::AddInstance { .. } => &["Creating instance"],
            Self::StartInstance { .. } => &["Starting instance"],
            Self::StopInstance { .. } => &["Stopping instance"],
            Self::DeleteInstance { .. } => &["Deleting instance"],
        };
        labels.iter().map(|l| l.to_string()).collect()
    }
}

/// Receives progress while a sequence runs.
pub trait StepObserver: Send + Sync {
    fn enter_step(&self, index: usize);
    fn track_operation(&self, id: OperationId);
    fn note(&self, _message: &str) {}
}

impl StepObserver for () {
    fn enter_step(&self, _index: usize) {}
    fn track_operation(&self, _id: OperationId) {}
}

/// Runs lifecycle sequences against one device.
#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<dyn DeviceBackend>,
    tracker: TrackerHandle,
    waiter: Waiter,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn DeviceBackend>, tracker: TrackerHandle) -> Self {
        let waiter = tracker.waiter();
        Self {
            backend,
            tracker,
            waiter,
        }
    }

    /// Replaces the waiter, e.g. to bound every step with a deadline.
    pub fn with_waiter(mut self, waiter: Waiter) -> Self {
        self.waiter = waiter;
        self
    }

    pub fn tracker(&self) -> &TrackerHandle {
        &self.tracker
    }

    pub fn backend(&self) -> &Arc<dyn DeviceBackend> {
        &self.backend
    }

    /// Executes `action` from its first step. Returns the success message.
    pub async fn run(
        &self,
        action: &LifecycleAction,
        observer: &dyn StepObserver,
    ) -> Result<String, FlowError> {
        match action {
            LifecycleAction::Install {
                app,
                title,
                instance_name,
            } => {
                let title = title.as_deref().unwrap_or(&app.name);
                self.install(app, title, instance_name.as_deref(), observer)
                    .await
            }
            LifecycleAction::Sideload { manifest, title } => {
                self.sideload(manifest, title.as_deref(), observer).await
            }
            LifecycleAction::Update {
                app_name,
                title,
                from,
                to,
                remove_previous,
            } => {
                self.update(app_name, title.as_deref(), from, to, *remove_previous, observer)
                    .await
            }
            LifecycleAction::Uninstall { app, title } => {
                let title = title.as_deref().unwrap_or(&app.name);
                self.uninstall(app, title, observer).await
            }
            LifecycleAction::AddInstance {
                app,
                instance_name,
                start,
            } => {
                self.add_instance(app, instance_name.as_deref(), *start, observer)
                    .await
            }
            LifecycleAction::StartInstance { instance_id } => {
                observer.enter_step(0);
                let id = self.backend.start_instance(instance_id).await?;
                self.execute_step(id, observer, "start", instance_id).await?;
                Ok(format!("Instance {instance_id} started."))
            }
            LifecycleAction::StopInstance { instance_id } => {
                observer.enter_step(0);
                let id = self.backend.stop_instance(instance_id).await?;
                self.execute_step(id, observer, "stop", instance_id).await?;
                Ok(format!("Instance {instance_id} stopped."))
            }
            LifecycleAction::DeleteInstance { instance_id } => {
                observer.enter_step(0);
                let id = self.backend.delete_instance(instance_id).await?;
                self.execute_step(id, observer, "removal", instance_id).await?;
                Ok(format!("Instance {instance_id} deleted."))
            }
        }
    }

    async fn install(
        &self,
        app: &AppKey,
        title: &str,
        instance_name: Option<&str>,
        observer: &dyn StepObserver,
    ) -> Result<String, FlowError> {
        observer.note("You can close this window. Installation takes place automatically in the background.");
        observer.enter_step(0);
        let id = self.backend.install_app(app).await?;
        self.execute_step(id, observer, "installation", title).await?;

        self.create_and_start(app, title, instance_name, true, 1, observer)
            .await?;
        Ok(format!("{title} successfully installed."))
    }

    async fn sideload(
        &self,
        manifest: &str,
        title: Option<&str>,
        observer: &dyn StepObserver,
    ) -> Result<String, FlowError> {
        let (app, manifest_title) = manifest_identity(manifest)?;
        let title = title.or(manifest_title.as_deref()).unwrap_or(&app.name);

        observer.enter_step(0);
        let id = self.backend.sideload_app(manifest).await?;
        self.execute_step(id, observer, "installation", title).await?;

        self.create_and_start(&app, title, None, true, 1, observer)
            .await?;
        Ok(format!("Congratulations! {title} was successfully installed!"))
    }

    async fn update(
        &self,
        app_name: &str,
        title: Option<&str>,
        from: &str,
        to: &str,
        remove_previous: bool,
        observer: &dyn StepObserver,
    ) -> Result<String, FlowError> {
        let apps = self.backend.list_apps().await?;
        let installed = find_app(&apps, app_name, from)
            .filter(|app| app.is_installed(from))
            .ok_or_else(|| FlowError::NotInstalled {
                name: app_name.to_string(),
                version: from.to_string(),
            })?;

        let title = title.unwrap_or(installed.display_title());
        let (verb, activity) = if is_upgrade(from, to) {
            ("updated", "update")
        } else {
            ("downgraded", "downgrade")
        };
        tracing::info!(app = app_name, from, to, instances = installed.instances.len(), "updating app");

        observer.enter_step(0);
        let target = installed.app_key.with_version(to);
        let id = self.backend.install_app(&target).await?;
        self.execute_step(id, observer, activity, title).await?;

        observer.enter_step(1);
        observer.note(&format!("Migrating {} instances...", installed.instances.len()));
        let ids = try_join_all(
            installed
                .instances
                .iter()
                .map(|instance| self.backend.migrate_instance(&instance.instance_id, to)),
        )
        .await?;
        let records = self.waiter.wait_for_many(&ids).await?;
        let failures: Vec<MigrationFailure> = installed
            .instances
            .iter()
            .zip(records)
            .filter(|(_, record)| !record.is_finished_ok())
            .map(|(instance, record)| MigrationFailure {
                instance_id: instance.instance_id.clone(),
                operation_id: record.id,
                status: record.status,
            })
            .collect();
        if !failures.is_empty() {
            return Err(FlowError::MigrationsFailed(failures));
        }

        if remove_previous {
            observer.enter_step(2);
            let id = self.backend.uninstall_app(&installed.app_key).await?;
            self.execute_step(id, observer, activity, title).await?;
        }

        Ok(format!(
            "Congratulations! {title} was successfully {verb} from version {from} to version {to}!"
        ))
    }

    async fn uninstall(
        &self,
        app: &AppKey,
        title: &str,
        observer: &dyn StepObserver,
    ) -> Result<String, FlowError> {
        observer.enter_step(0);
        let id = self.backend.uninstall_app(app).await?;
        self.execute_step(id, observer, "uninstallation", title).await?;
        Ok(format!("{title} successfully uninstalled."))
    }

    async fn add_instance(
        &self,
        app: &AppKey,
        instance_name: Option<&str>,
        start: bool,
        observer: &dyn StepObserver,
    ) -> Result<String, FlowError> {
        let instance_id = self
            .create_and_start(app, &app.name, instance_name, start, 0, observer)
            .await?;
        if start {
            Ok(format!("Instance {instance_id} of {} created and started.", app.name))
        } else {
            Ok(format!("Instance {instance_id} of {} created.", app.name))
        }
    }

    /// Creates an instance at step `first_step` and optionally starts it
    /// at the following step. Returns the new instance id.
    async fn create_and_start(
        &self,
        app: &AppKey,
        title: &str,
        instance_name: Option<&str>,
        start: bool,
        first_step: usize,
        observer: &dyn StepObserver,
    ) -> Result<InstanceId, FlowError> {
        observer.enter_step(first_step);
        let id = self.backend.create_instance(app, instance_name).await?;
        let created = self
            .execute_step(id, observer, "instance creation", title)
            .await?;
        let instance_id = created
            .result_message()
            .map(str::to_string)
            .ok_or(FlowError::MissingInstanceId(created.id))?;

        if start {
            observer.enter_step(first_step + 1);
            let id = self.backend.start_instance(&instance_id).await?;
            self.execute_step(id, observer, "instance start", title)
                .await?;
        }
        Ok(instance_id)
    }

    /// Waits for `id` and fails unless it finished OK.
    async fn execute_step(
        &self,
        id: OperationId,
        observer: &dyn StepObserver,
        activity: &str,
        title: &str,
    ) -> Result<OperationRecord, FlowError> {
        observer.track_operation(id);
        self.tracker.fetch_one(id).await?;
        let record = self.waiter.wait_for_one(id).await?;
        if !record.is_finished_ok() {
            tracing::warn!(operation_id = id, status = %record.status, activity, "step failed");
            return Err(FlowError::OperationFailed {
                id,
                status: record.status,
                message: failure_text(&record, activity, title),
            });
        }
        tracing::debug!(operation_id = id, activity, "step finished");
        Ok(record)
    }
}

fn failure_text(record: &OperationRecord, activity: &str, title: &str) -> String {
    record
        .result_message()
        .or(Some(record.description.as_str()).filter(|d| !d.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Error during the {activity} of {title}."))
}

/// Reads the app key and optional title from a JSON app manifest.
fn manifest_identity(manifest: &str) -> Result<(AppKey, Option<String>), FlowError> {
    let doc: serde_json::Value =
        serde_json::from_str(manifest).map_err(|e| FlowError::InvalidManifest(e.to_string()))?;
    let field = |name: &str| doc.get(name).and_then(|v| v.as_str()).map(str::to_string);
    let app = field("app").ok_or_else(|| FlowError::InvalidManifest("missing \"app\"".into()))?;
    let version =
        field("version").ok_or_else(|| FlowError::InvalidManifest("missing \"version\"".into()))?;
    Ok((AppKey::new(app, version), field("title")))
}
