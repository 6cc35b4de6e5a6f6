use std::time::Duration;

use thiserror::Error;

/// Failure to read learner history. Never replaced by default features.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history query `{query}` failed: {source}")]
    Database {
        query: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("history query `{query}` timed out after {timeout:?}")]
    Timeout {
        query: &'static str,
        timeout: Duration,
    },
}
