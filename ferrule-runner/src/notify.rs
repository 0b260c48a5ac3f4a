//! Completion callbacks
//!
//! When a callback target is configured (per job, else the runner default),
//! the driver POSTs the job state once when it starts running and once when
//! it has finished. Delivery failures are logged; they never change the
//! job's outcome.

use async_trait::async_trait;
use ferrule_core::domain::job::{Artifact, CallbackConfig};
use ferrule_core::domain::run::JobStatus;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use thiserror::Error;

/// Body of a callback request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionPayload {
    pub job_id: String,
    pub status: JobStatus,
    pub exit_code: i32,
    pub log_file: String,
    pub artifacts: Vec<Artifact>,
}

/// Errors delivering a callback
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Network or protocol failure
    #[error("Callback request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Receiver answered with a non-success status
    #[error("Callback rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Delivers job state to a callback target
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        target: &CallbackConfig,
        payload: &CompletionPayload,
    ) -> Result<(), NotifyError>;
}

/// HTTP implementation of Notifier
pub struct HttpNotifier {
    client: Client,
}

impl HttpNotifier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The request sent for `payload`; a non-empty secret becomes a bearer token
    pub fn build_request(&self, target: &CallbackConfig, payload: &CompletionPayload) -> RequestBuilder {
        let request = self.client.post(&target.url).json(payload);
        if target.secret.is_empty() {
            request
        } else {
            request.bearer_auth(&target.secret)
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(
        &self,
        target: &CallbackConfig,
        payload: &CompletionPayload,
    ) -> Result<(), NotifyError> {
        let response = self.build_request(target, payload).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }

        Ok(())
    }
}
