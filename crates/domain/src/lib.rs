//! 聊天室系统核心领域模型
//!
//! 包含房间、参与者、消息、用户等核心实体，以及这些实体自身必须维持的不变量。
//! 持久化、广播、在线状态等能力都通过上层定义的接口接入。

pub mod errors;
pub mod message;
pub mod participant;
pub mod room;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use message::{Message, MessageType};
pub use participant::{Participant, ParticipantRole};
pub use room::{Room, RoomKind, RoomSettings, UNBOUNDED_PARTICIPANTS};
pub use user::User;
pub use value_objects::{IdParseError, MessageId, RoomId, Timestamp, UserId};
