// src/error.rs
//! Pipeline error taxonomy. None of these are process-fatal: each is logged at
//! the stage where it happens and the scheduler keeps ticking.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// One source failed; its contribution to the cycle is empty.
    #[error("source {source_name} failed: {message}")]
    SourceFetch {
        source_name: String,
        message: String,
    },

    /// One source exceeded its fetch deadline.
    #[error("source {source_name} timed out after {timeout:?}")]
    SourceTimeout {
        source_name: String,
        timeout: Duration,
    },

    /// The whole batch failed to classify; the cycle aborts without touching the cache.
    #[error("classification of {batch_len} items failed: {message}")]
    Classification { batch_len: usize, message: String },

    /// Delivery to one subscriber failed.
    #[error("dispatch to subscriber {subscriber} failed: {message}")]
    Dispatch { subscriber: String, message: String },
}

impl PipelineError {
    pub fn source_fetch(source_name: &str, err: &anyhow::Error) -> Self {
        Self::SourceFetch {
            source_name: source_name.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn classification(batch_len: usize, err: &anyhow::Error) -> Self {
        Self::Classification {
            batch_len,
            message: format!("{err:#}"),
        }
    }

    pub fn dispatch(subscriber: &str, err: &anyhow::Error) -> Self {
        Self::Dispatch {
            subscriber: subscriber.to_string(),
            message: format!("{err:#}"),
        }
    }

    /// Short label used as the `kind` field in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceFetch { .. } => "source_fetch",
            Self::SourceTimeout { .. } => "source_timeout",
            Self::Classification { .. } => "classification",
            Self::Dispatch { .. } => "dispatch",
        }
    }
}
