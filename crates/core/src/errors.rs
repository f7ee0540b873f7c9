use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::action::{ActionId, PendingActionStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid action transition from {from} to {to}")]
    InvalidActionTransition { from: PendingActionStatus, to: PendingActionStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures of a single action's lifecycle. These are returned to callers as
/// data, never as transport failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("{message}")]
    PolicyDenied { policy: &'static str, message: String },
    #[error("action {0} was not found")]
    NotFound(ActionId),
    #[error("already {status}")]
    AlreadyResolved { status: PendingActionStatus },
    #[error("this action expired at {expired_at} and can no longer be confirmed")]
    Expired { expired_at: DateTime<Utc> },
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
}

impl ActionError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::PolicyDenied { .. } => "policy_denied",
            Self::NotFound(_) => "not_found",
            Self::AlreadyResolved { .. } => "already_resolved",
            Self::Expired { .. } => "expired",
            Self::ExecutionFailed(_) => "execution_failed",
            Self::ValidationFailed(_) => "validation_failed",
        }
    }

    /// Status the client should reconcile its local view to, when known.
    pub fn status_hint(&self) -> Option<PendingActionStatus> {
        match self {
            Self::AlreadyResolved { status } => Some(*status),
            Self::Expired { .. } => Some(PendingActionStatus::Expired),
            Self::ExecutionFailed(_) | Self::ValidationFailed(_) => {
                Some(PendingActionStatus::Failed)
            }
            Self::PolicyDenied { .. } | Self::NotFound(_) => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(_) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Action(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
