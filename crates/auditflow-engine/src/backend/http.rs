//! HTTP client for the task service

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::remote::{SubmittedTask, TaskClient, TaskRequest, TaskStatusResponse};
use crate::constants::routes;
use crate::error::TransportError;

/// [`TaskClient`] speaking JSON over HTTP
///
/// - `POST {endpoint}/api/engine/dispatch` submits a task
/// - `GET {endpoint}/api/engine/tasks/{taskId}` reports its status
pub struct HttpTaskClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTaskClient {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    fn dispatch_url(&self) -> String {
        format!("{}{}", self.endpoint, routes::DISPATCH)
    }

    fn status_url(&self, task_id: &str) -> String {
        format!("{}{}/{}", self.endpoint, routes::TASKS, task_id)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TaskClient for HttpTaskClient {
    async fn submit_task(&self, request: &TaskRequest) -> Result<SubmittedTask, TransportError> {
        let response = self
            .client
            .post(self.dispatch_url())
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Self::decode(response).await
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatusResponse, TransportError> {
        let response = self
            .client
            .get(self.status_url(task_id))
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = HttpTaskClient::new("http://tasks.local:3000/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.dispatch_url(), "http://tasks.local:3000/api/engine/dispatch");
        assert_eq!(client.status_url("t-42"), "http://tasks.local:3000/api/engine/tasks/t-42");
    }
}
