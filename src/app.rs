//! Installed apps, their instances, and instance editors.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{AppKey, InstanceId};

/// Install status of one app version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppStatus {
    /// Installed and usable.
    Installed,
    /// Known but not installed.
    #[serde(alias = "not installed", alias = "not-installed")]
    Uninstalled,
    /// Any intermediate or unrecognised state.
    #[serde(other)]
    Other,
}

/// Runtime status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceStatus {
    /// Created but never started.
    Created,
    /// Container running.
    Running,
    /// Container stopped.
    Stopped,
    /// Instance whose app is gone.
    Orphaned,
    /// Any state this client does not know.
    #[serde(other)]
    Unknown,
}

/// URL-addressable endpoint exposed by a running instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Editor {
    /// Display name.
    pub name: String,
    /// Container port the editor listens on.
    #[serde(default)]
    pub port: Option<u16>,
    /// Reachable URL, when the backend already resolved one.
    #[serde(default)]
    pub url: Option<String>,
}

/// One running or stopped workload of an app version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Opaque id.
    pub instance_id: InstanceId,
    /// User-facing name.
    #[serde(default)]
    pub instance_name: String,
    /// App version this instance belongs to.
    pub app_key: AppKey,
    /// Current status.
    pub status: InstanceStatus,
    /// Status the device is steering towards.
    #[serde(default = "unknown_status")]
    pub desired: InstanceStatus,
    /// Exposed editors.
    #[serde(default)]
    pub editors: Vec<Editor>,
}

fn unknown_status() -> InstanceStatus {
    InstanceStatus::Unknown
}

/// An app version known to the device together with its instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    /// Name and version of this entry.
    pub app_key: AppKey,
    /// Display title; falls back to the app name.
    #[serde(default)]
    pub title: Option<String>,
    /// Install status of this version.
    pub status: AppStatus,
    /// Every installed version of this app name.
    #[serde(default)]
    pub installed_versions: BTreeSet<String>,
    /// Instances of this version.
    #[serde(default)]
    pub instances: Vec<Instance>,
}

impl App {
    /// Title for user-facing messages.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.app_key.name)
    }

    /// True iff `version` is among the installed versions.
    pub fn is_installed(&self, version: &str) -> bool {
        self.installed_versions.contains(version)
    }
}

/// Finds the entry for `name` at exactly `version`.
pub fn find_app<'a>(apps: &'a [App], name: &str, version: &str) -> Option<&'a App> {
    apps.iter()
        .find(|app| app.app_key.name == name && app.app_key.version == version)
}

/// Groups a flat instance list under the app entries they belong to and
/// recomputes each entry's installed-version set from the listing.
pub fn assemble_apps(mut apps: Vec<App>, instances: Vec<Instance>) -> Vec<App> {
    let installed: Vec<AppKey> = apps
        .iter()
        .filter(|app| app.status == AppStatus::Installed)
        .map(|app| app.app_key.clone())
        .collect();

    for app in &mut apps {
        app.installed_versions = installed
            .iter()
            .filter(|key| key.name == app.app_key.name)
            .map(|key| key.version.clone())
            .collect();
        app.instances.clear();
    }

    for instance in instances {
        if let Some(app) = apps.iter_mut().find(|app| app.app_key == instance.app_key) {
            app.instances.push(instance);
        }
    }
    apps
}
