//! 领域模型错误定义
//!
//! 实体不变量被破坏时返回 [`DomainError`]，仓储接口统一返回 [`RepositoryError`]。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 私聊房间必须恰好包含两名不同的参与者
    #[error("direct room requires exactly two distinct participants")]
    DirectRoomSize,

    /// 房间人数已达上限
    #[error("room has reached maximum capacity of {max}")]
    RoomAtCapacity { max: i32 },

    /// 用户已经是房间参与者
    #[error("user is already a participant of the room")]
    AlreadyParticipant,

    /// 参数校验失败
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 仓储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    /// 唯一约束冲突（例如同一房间同一用户的参与者记录）
    #[error("record already exists")]
    Conflict,

    /// 写入会让房间人数超过上限
    #[error("room has reached maximum capacity of {max}")]
    CapacityExceeded { max: i32 },

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
