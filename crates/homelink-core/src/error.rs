//! Error taxonomy shared by adapters, the dispatcher and the orchestrator

use crate::device::{Backend, DeviceId};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Timeout, connection reset, upstream 5xx; worth one more attempt
    #[error("Transient failure: {0}")]
    Transient(String),
    /// Auth failure, rejected or malformed command
    #[error("Permanent failure: {0}")]
    Permanent(String),
    #[error("Action '{action}' is not supported by {backend} device {device}")]
    Unsupported {
        backend: Backend,
        device: DeviceId,
        action: String,
    },
    #[error("Device not found: {0}")]
    NotFound(DeviceId),
    /// Backend disabled or its external dependency is missing
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),
}

/// Coarse classification of a [`BackendError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
    Unsupported,
    NotFound,
    Unavailable,
    DeadlineExceeded,
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) => ErrorKind::Transient,
            Self::Permanent(_) => ErrorKind::Permanent,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
        }
    }

    /// Whether the dispatcher may retry the call
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn timeout(after: Duration) -> Self {
        Self::Transient(format!("timed out after {after:?}"))
    }
}

pub type BackendResult<T> = Result<T, BackendError>;
