//! REST client for the generation service.
//!
//! Every endpoint answers with an envelope `{ "code": 0, "data": ... }`;
//! a non-zero code carries a message in `error`.

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error};

use crate::artifacts::assign_stage;
use crate::config::EngineConfig;
use crate::core::{Artifact, StageId};
use crate::errors::{RemoteCallError, WorkflowError};
use crate::ports::{RemoteExecutor, RemoteStageOutput, StageExecutionRequest};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    data: Option<T>,
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteStageData {
    #[serde(default)]
    artifacts: Vec<Artifact>,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Default, Deserialize)]
struct ArtifactListData {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

fn decode_envelope<T: DeserializeOwned>(body: &str) -> anyhow::Result<T> {
    let envelope: Envelope<T> =
        serde_json::from_str(body).context("Malformed response from generation service")?;
    if envelope.code != 0 {
        let reason = envelope
            .error
            .or(envelope.message)
            .unwrap_or_else(|| "unknown error".to_string());
        bail!("Service returned code {}: {reason}", envelope.code);
    }
    match envelope.data {
        Some(data) => Ok(data),
        // Endpoints without a payload decode into `Option<_>`.
        None => serde_json::from_value(serde_json::Value::Null)
            .context("Response envelope has no data"),
    }
}

/// A [`RemoteExecutor`] speaking the service's JSON REST API.
#[derive(Debug, Clone)]
pub struct HttpRemoteExecutor {
    client: Client,
    base_url: String,
}

impl HttpRemoteExecutor {
    /// Creates a client for `config.api_base_url` using the configured timeout.
    pub fn new(config: &EngineConfig) -> Result<Self, WorkflowError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| WorkflowError::Internal(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self::with_client(client, &config.api_base_url))
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The API root every path is appended to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, project_id: &str, path: &str) -> String {
        format!("{}/workflow/{project_id}/{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, RemoteCallError> {
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                error!(error = %err, "Generation service request timed out");
                RemoteCallError::new(format!("Request timed out: {err}"))
            } else {
                error!(error = %err, "Generation service request failed");
                RemoteCallError::new(format!("Request failed: {err}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| RemoteCallError::new(format!("Failed to read response body: {err}")))?;

        if !status.is_success() {
            error!(%status, "Generation service returned error status");
            return Err(
                RemoteCallError::new(format!("HTTP {status}: {body}")).with_status(status.as_u16())
            );
        }

        decode_envelope(&body)
            .map_err(|err| RemoteCallError::new(format!("{err:#}")).with_status(status.as_u16()))
    }
}

#[async_trait]
impl RemoteExecutor for HttpRemoteExecutor {
    async fn execute_stage(
        &self,
        project_id: &str,
        request: &StageExecutionRequest,
    ) -> Result<RemoteStageOutput, WorkflowError> {
        let url = self.url(project_id, "execute-stage");
        debug!(%url, stage_id = %request.stage_id, "Executing stage remotely");

        let data: ExecuteStageData = self
            .send(self.client.post(&url).json(request))
            .await
            .map_err(|err| err.with_stage(request.stage_id.clone()))?;

        Ok(RemoteStageOutput {
            artifacts: assign_stage(data.artifacts, &request.stage_id),
            total_tokens: data.total_tokens,
        })
    }

    async fn get_stage_artifacts(
        &self,
        project_id: &str,
        stage_id: &StageId,
    ) -> Result<Vec<Artifact>, WorkflowError> {
        let url = self.url(project_id, &format!("stages/{stage_id}/artifacts"));
        let data: ArtifactListData = self
            .send(self.client.get(&url))
            .await
            .map_err(|err| err.with_stage(stage_id.clone()))?;
        Ok(assign_stage(data.artifacts, stage_id))
    }

    async fn get_all_artifacts(&self, project_id: &str) -> Result<Vec<Artifact>, WorkflowError> {
        let url = self.url(project_id, "artifacts");
        let data: ArtifactListData = self.send(self.client.get(&url)).await?;
        Ok(data.artifacts)
    }

    async fn delete_artifact(
        &self,
        project_id: &str,
        artifact_id: &str,
    ) -> Result<(), WorkflowError> {
        let url = self.url(project_id, &format!("artifacts/{artifact_id}"));
        let _: Option<serde_json::Value> = self.send(self.client.delete(&url)).await?;
        Ok(())
    }
}
