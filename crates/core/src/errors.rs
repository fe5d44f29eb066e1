use thiserror::Error;

use crate::domain::approval::ApprovalRecordId;
use crate::domain::ticket::{TicketId, TicketStatus, UserId};
use crate::ports::StorageError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("user `{user}` is not authorized to decide this approval")]
    Forbidden { user: UserId },
    #[error("approval record `{0}` was already decided")]
    AlreadyDecided(ApprovalRecordId),
    #[error("ticket status `{status:?}` does not allow this operation")]
    InvalidState { status: TicketStatus },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("resubmission limit reached: {rejected} rejections against a ceiling of {ceiling}")]
    ResubmissionLimitExceeded { rejected: u32, ceiling: u32 },
    #[error("ticket not found: {0}")]
    TicketNotFound(TicketId),
    #[error("approval record not found: {0}")]
    RecordNotFound(ApprovalRecordId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Transport-level classification so controllers can map workflow failures
/// onto status codes without matching every variant themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Forbidden,
    Conflict,
    Unprocessable,
    NotFound,
    Unavailable,
}

impl WorkflowError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Forbidden { .. } => ErrorClass::Forbidden,
            Self::AlreadyDecided(_) | Self::InvalidState { .. } => ErrorClass::Conflict,
            Self::Validation(_) | Self::ResubmissionLimitExceeded { .. } => {
                ErrorClass::Unprocessable
            }
            Self::TicketNotFound(_) | Self::RecordNotFound(_) => ErrorClass::NotFound,
            Self::Storage(_) => ErrorClass::Unavailable,
        }
    }

    /// Business-rule violations are final; only storage faults are worth a
    /// retry from the caller's side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
