//! Error types shared by the controller and the platform backends

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::platform::ServiceState;

/// Errors produced while inspecting or controlling a service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("Requires elevated privileges to stop the service")]
    NotElevated,

    #[error("Failed to wait for '{service}' to change status to '{desired}'")]
    Timeout { service: String, desired: ServiceState },

    #[error("Failed to start elevated process: {0}")]
    Launch(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),
}

/// Coarse classification of a [`ControlError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotElevated,
    Timeout,
    Launch,
    AccessDenied,
    Platform,
    Unsupported,
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::NotElevated => ErrorKind::NotElevated,
            ControlError::Timeout { .. } => ErrorKind::Timeout,
            ControlError::Launch(_) => ErrorKind::Launch,
            ControlError::AccessDenied(_) => ErrorKind::AccessDenied,
            ControlError::Platform(_) => ErrorKind::Platform,
            ControlError::Unsupported(_) => ErrorKind::Unsupported,
        }
    }
}

/// Result type for platform operations
pub type ControlResult<T> = std::result::Result<T, ControlError>;

/// Outcome of a privileged operation.
///
/// Failures are carried as data so the caller decides what the user sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub success: bool,
    pub error: Option<ControlError>,
}

impl OperationResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: ControlError) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(ControlError::kind)
    }

    pub fn into_result(self) -> ControlResult<()> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl From<ControlResult<()>> for OperationResult {
    fn from(result: ControlResult<()>) -> Self {
        match result {
            Ok(()) => Self::succeeded(),
            Err(e) => Self::failed(e),
        }
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "success"),
            Some(e) => write!(f, "failed: {}", e),
        }
    }
}
