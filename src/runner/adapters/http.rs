//! HTTP client for remote workers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Serialize;

use crate::runner::domain::{StepExit, StepRequest};
use crate::runner::ports::{Worker, WorkerError, WorkerResult};
use crate::task::domain::{TaskId, TemplateId};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Worker reached over its HTTP API.
///
/// Step waits are long polls without a client-side timeout; the dispatcher
/// bounds them by the step timeout.
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AbortRequest {
    task_id: TaskId,
}

impl HttpWorkerClient {
    /// Creates a client targeting `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/task/{path}", self.base_url.trim_end_matches('/'))
    }
}

async fn rejection(response: Response) -> WorkerError {
    let status = response.status();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(err) => return WorkerError::unreachable(err),
    };
    let message = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
    WorkerError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl Worker for HttpWorkerClient {
    async fn start_step(&self, request: &StepRequest) -> WorkerResult<()> {
        let response = self
            .client
            .post(self.url("run"))
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .json(request)
            .send()
            .await
            .map_err(WorkerError::unreachable)?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(rejection(response).await)
    }

    async fn wait_step(&self, task_id: TaskId, index: usize) -> WorkerResult<StepExit> {
        let response = self
            .client
            .get(self.url("step/wait"))
            .query(&[("taskId", task_id.to_string()), ("step", index.to_string())])
            .send()
            .await
            .map_err(WorkerError::unreachable)?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        response
            .json::<StepExit>()
            .await
            .map_err(|err| WorkerError::InvalidResponse(err.to_string()))
    }

    async fn abort(&self, task_id: TaskId) -> WorkerResult<()> {
        let response = self
            .client
            .post(self.url("abort"))
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .json(&AbortRequest { task_id })
            .send()
            .await
            .map_err(WorkerError::unreachable)?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(rejection(response).await)
    }

    async fn scan_output(
        &self,
        template_id: TemplateId,
        task_id: TaskId,
    ) -> WorkerResult<Option<String>> {
        let response = self
            .client
            .get(self.url("scan_result"))
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .query(&[
                ("templateId", template_id.to_string()),
                ("taskId", task_id.to_string()),
            ])
            .send()
            .await
            .map_err(WorkerError::unreachable)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .text()
                .await
                .map(Some)
                .map_err(|err| WorkerError::InvalidResponse(err.to_string())),
            _ => Err(rejection(response).await),
        }
    }
}
