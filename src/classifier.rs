use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::models::{Classification, InsightClassification, LearnerFeatures};

const MAX_RETRIES: usize = 2;
const BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier not configured: set CLASSIFIER_ENDPOINT")]
    NotConfigured,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Client for the external persona and pace classifiers. Each feature vector
/// is posted as a flat JSON object; the service answers with a label and a
/// confidence.
#[derive(Clone)]
pub struct ClassifierClient {
    endpoint: String,
    client: reqwest::Client,
}

impl ClassifierClient {
    pub fn new(endpoint: Option<&str>, timeout: Duration) -> Result<Self, ClassifierError> {
        let endpoint = endpoint
            .map(|e| e.trim().trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty())
            .ok_or(ClassifierError::NotConfigured)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { endpoint, client })
    }

    pub async fn classify(
        &self,
        features: &LearnerFeatures,
    ) -> Result<InsightClassification, ClassifierError> {
        let (persona, pace) = tokio::try_join!(
            self.post_with_retry("persona", &features.persona_features),
            self.post_with_retry("pace", &features.pace_features),
        )?;
        Ok(InsightClassification { persona, pace })
    }

    async fn post_with_retry<T: Serialize + ?Sized>(
        &self,
        kind: &str,
        payload: &T,
    ) -> Result<Classification, ClassifierError> {
        let url = format!("{}/{kind}", self.endpoint);

        let mut retry = 0;
        loop {
            let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
            match self.client.post(&url).json(payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await?;
                        let classification: Classification = serde_json::from_slice(&bytes)?;
                        debug!(kind, label = %classification.label, confidence = classification.confidence, "classified");
                        return Ok(classification);
                    }
                    let body = match resp.text().await {
                        Ok(body) => body,
                        Err(err) => {
                            warn!(kind, ?status, error = %err, "failed to read classifier error body");
                            String::new()
                        }
                    };
                    if retry < MAX_RETRIES && is_retryable(status) {
                        warn!(kind, retry, ?status, "classifier request failed, retrying");
                        sleep(backoff).await;
                        retry += 1;
                        continue;
                    }
                    return Err(ClassifierError::HttpStatus { status, body });
                }
                Err(err) => {
                    if retry < MAX_RETRIES {
                        warn!(kind, retry, error = %err, "classifier request error, retrying");
                        sleep(backoff).await;
                        retry += 1;
                        continue;
                    }
                    return Err(ClassifierError::Request(err));
                }
            }
        }
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}
