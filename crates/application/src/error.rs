use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::broadcaster::BroadcastError;

/// 应用层错误
///
/// 发送路径上的错误只会通过发送者专属的错误主题报告，不会中断广播器。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplicationError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("room has reached maximum capacity of {max}")]
    CapacityExceeded { max: i32 },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("storage failure: {0}")]
    StorageFailure(String),
    /// 共享通道不可用，功能降级但不致命
    #[error("remote state unavailable: {0}")]
    RemoteStateUnavailable(String),
}

impl ApplicationError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageFailure(message.into())
    }

    pub fn remote_unavailable(message: impl Into<String>) -> Self {
        Self::RemoteStateUnavailable(message.into())
    }

    /// 客户端可见的稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::RateLimited => "RATE_LIMITED",
            Self::StorageFailure(_) => "STORAGE_FAILURE",
            Self::RemoteStateUnavailable(_) => "REMOTE_STATE_UNAVAILABLE",
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => Self::NotFound("record not found".to_owned()),
            RepositoryError::Conflict => Self::Conflict("record already exists".to_owned()),
            RepositoryError::CapacityExceeded { max } => Self::CapacityExceeded { max },
            RepositoryError::Storage { message } => Self::StorageFailure(message),
        }
    }
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::RoomAtCapacity { max } => Self::CapacityExceeded { max },
            DomainError::AlreadyParticipant => Self::Conflict(value.to_string()),
            DomainError::DirectRoomSize | DomainError::InvalidArgument { .. } => {
                Self::InvalidRequest(value.to_string())
            }
        }
    }
}

impl From<BroadcastError> for ApplicationError {
    fn from(value: BroadcastError) -> Self {
        match value {
            BroadcastError::Serialization(message) => Self::InvalidRequest(message),
            BroadcastError::Failed(message) => Self::RemoteStateUnavailable(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_maps_from_domain() {
        let err: ApplicationError = DomainError::RoomAtCapacity { max: 2 }.into();
        assert_eq!(err, ApplicationError::CapacityExceeded { max: 2 });
        assert_eq!(err.code(), "CAPACITY_EXCEEDED");
    }

    #[test]
    fn repository_conflict_maps_to_conflict() {
        let err: ApplicationError = RepositoryError::Conflict.into();
        assert!(matches!(err, ApplicationError::Conflict(_)));
    }

    #[test]
    fn storage_message_is_preserved() {
        let err: ApplicationError = RepositoryError::storage("disk full").into();
        assert_eq!(err, ApplicationError::StorageFailure("disk full".into()));
    }
}
