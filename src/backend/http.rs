//! REST client for the device's `/api/v2` endpoints.
//!
//! Wraps operation (quest) queries and the app/instance mutations using
//! [`reqwest`]. Every mutation answers with a [`JobMeta`] naming the
//! operation to wait for.

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;

use crate::{
    app::{App, Instance, assemble_apps},
    config::DeviceConfig,
    operation::{JobMeta, OperationRecord},
    types::{AppKey, OperationId},
};

use super::{BackendError, BackendResult, DeviceBackend};

/// HTTP implementation of [`DeviceBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Builds a client with its own connection pool.
    pub fn new(config: &DeviceConfig) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Reuses an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: &DeviceConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> BackendResult<T> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::parse_response(response).await
    }

    async fn post_job<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> BackendResult<OperationId> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let meta: JobMeta = Self::parse_response(response).await?;
        Ok(meta.job_id)
    }

    /// Turns a non-2xx response into [`BackendError::Api`] with the body text.
    async fn ensure_success(response: reqwest::Response) -> BackendResult<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> BackendResult<T> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DeviceBackend for HttpBackend {
    async fn list_operations(&self) -> BackendResult<Vec<OperationRecord>> {
        self.get_json("/quests").await
    }

    async fn get_operation(&self, id: OperationId) -> BackendResult<OperationRecord> {
        self.get_json(&format!("/quests/{id}")).await
    }

    async fn delete_operation(&self, id: OperationId) -> BackendResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("/quests/{id}")))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn list_apps(&self) -> BackendResult<Vec<App>> {
        let apps: Vec<App> = self.get_json("/apps").await?;
        let instances: Vec<Instance> = self.get_json("/instances").await?;
        Ok(assemble_apps(apps, instances))
    }

    async fn install_app(&self, app: &AppKey) -> BackendResult<OperationId> {
        self.post_job("/apps/install", &json!({ "appKey": app })).await
    }

    async fn sideload_app(&self, manifest: &str) -> BackendResult<OperationId> {
        self.post_job("/apps/sideload", &json!({ "manifest": manifest }))
            .await
    }

    async fn uninstall_app(&self, app: &AppKey) -> BackendResult<OperationId> {
        let response = self
            .client
            .delete(self.url(&format!("/apps/{}", app.name)))
            .query(&[("version", app.version.as_str())])
            .send()
            .await?;
        let meta: JobMeta = Self::parse_response(response).await?;
        Ok(meta.job_id)
    }

    async fn create_instance(
        &self,
        app: &AppKey,
        instance_name: Option<&str>,
    ) -> BackendResult<OperationId> {
        let mut body = json!({ "appKey": app });
        if let Some(name) = instance_name {
            body["instanceName"] = json!(name);
        }
        self.post_job("/instances/create", &body).await
    }

    async fn start_instance(&self, instance_id: &str) -> BackendResult<OperationId> {
        self.post_job(&format!("/instances/{instance_id}/start"), &json!({}))
            .await
    }

    async fn stop_instance(&self, instance_id: &str) -> BackendResult<OperationId> {
        self.post_job(&format!("/instances/{instance_id}/stop"), &json!({}))
            .await
    }

    async fn delete_instance(&self, instance_id: &str) -> BackendResult<OperationId> {
        let response = self
            .client
            .delete(self.url(&format!("/instances/{instance_id}")))
            .send()
            .await?;
        let meta: JobMeta = Self::parse_response(response).await?;
        Ok(meta.job_id)
    }

    async fn migrate_instance(
        &self,
        instance_id: &str,
        to_version: &str,
    ) -> BackendResult<OperationId> {
        let response = self
            .client
            .patch(self.url(&format!("/instances/{instance_id}")))
            .json(&json!({ "to": to_version }))
            .send()
            .await?;
        let meta: JobMeta = Self::parse_response(response).await?;
        Ok(meta.job_id)
    }
}
