//! Device REST backend abstraction.

pub mod http;

use async_trait::async_trait;

use crate::{
    app::App,
    operation::OperationRecord,
    types::{AppKey, OperationId},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The request never produced a response (connect, DNS, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The device answered with a non-2xx status.
    #[error("device API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Operations the tracker and orchestrator need from a device.
///
/// Every mutating call returns the id of the backend operation it created;
/// completion is observed through [`DeviceBackend::get_operation`].
#[async_trait]
pub trait DeviceBackend: Send + Sync + 'static {
    async fn list_operations(&self) -> BackendResult<Vec<OperationRecord>>;
    async fn get_operation(&self, id: OperationId) -> BackendResult<OperationRecord>;
    async fn delete_operation(&self, id: OperationId) -> BackendResult<()>;

    /// Every app version known to the device, instances attached.
    async fn list_apps(&self) -> BackendResult<Vec<App>>;

    async fn install_app(&self, app: &AppKey) -> BackendResult<OperationId>;
    async fn sideload_app(&self, manifest: &str) -> BackendResult<OperationId>;
    async fn uninstall_app(&self, app: &AppKey) -> BackendResult<OperationId>;

    async fn create_instance(
        &self,
        app: &AppKey,
        instance_name: Option<&str>,
    ) -> BackendResult<OperationId>;
    async fn start_instance(&self, instance_id: &str) -> BackendResult<OperationId>;
    async fn stop_instance(&self, instance_id: &str) -> BackendResult<OperationId>;
    async fn delete_instance(&self, instance_id: &str) -> BackendResult<OperationId>;
    async fn migrate_instance(&self, instance_id: &str, to_version: &str)
    -> BackendResult<OperationId>;
}
