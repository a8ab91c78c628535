use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the dashboard core.
///
/// `Validation` is raised locally and never reaches the brokerage.
/// `RemoteService` and `StreamInterrupted` both describe failures on the
/// brokerage side; see [`DashboardError::is_remote`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DashboardError {
    #[error("Invalid input: {reason}")]
    Validation { reason: String },

    #[error("Brokerage request failed: {message}")]
    RemoteService {
        status: Option<u16>,
        message: String,
    },

    #[error("Price stream interrupted: {reason}")]
    StreamInterrupted { reason: String },
}

impl DashboardError {
    pub fn validation(reason: impl Into<String>) -> Self {
        DashboardError::Validation {
            reason: reason.into(),
        }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        DashboardError::RemoteService {
            status: None,
            message: message.into(),
        }
    }

    pub fn remote_with_status(status: u16, message: impl Into<String>) -> Self {
        DashboardError::RemoteService {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn timeout(operation: &str, after: Duration) -> Self {
        DashboardError::remote(format!(
            "{} timed out after {}ms",
            operation,
            after.as_millis()
        ))
    }

    pub fn interrupted(reason: impl Into<String>) -> Self {
        DashboardError::StreamInterrupted {
            reason: reason.into(),
        }
    }

    /// True for any failure that originated at the brokerage, including a
    /// dropped price stream.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            DashboardError::RemoteService { .. } | DashboardError::StreamInterrupted { .. }
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DashboardError::Validation { .. })
    }

    /// HTTP status of a brokerage answer, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            DashboardError::RemoteService { status, .. } => *status,
            _ => None,
        }
    }

    /// The underlying reason without the category prefix.
    pub fn detail(&self) -> &str {
        match self {
            DashboardError::Validation { reason } => reason,
            DashboardError::RemoteService { message, .. } => message,
            DashboardError::StreamInterrupted { reason } => reason,
        }
    }
}
