//! 应用层实现。
//!
//! 消息扇出与分布式在线状态引擎：成员鉴权、限流、在线状态复制、
//! 消息管道（先广播后异步持久化），以及对外部协作方（存储、传输、
//! 计数器、共享通道）的抽象。

pub mod authorizer;
pub mod broadcaster;
pub mod clock;
pub mod dto;
pub mod error;
pub mod local_broadcast;
pub mod memory;
pub mod persistence;
pub mod presence;
pub mod rate_limiter;
pub mod repository;
pub mod sequencer;
pub mod services;

pub use authorizer::MembershipAuthorizer;
pub use broadcaster::{BroadcastError, Envelope, MessageBroadcaster, Topic};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ApplicationError;
pub use local_broadcast::{LocalTopicBroadcaster, TopicStream};
pub use persistence::PersistenceDispatcher;
pub use presence::{PresenceChannel, PresenceReplicator, PresenceStore};
pub use rate_limiter::{CounterStore, RateLimitPolicy, RateLimiter};
pub use repository::{MessageRepository, ParticipantRepository, RoomRepository, UserRepository};
pub use sequencer::{KeyedSequencer, RoomSequencer, SequenceGuard, UserSequencer};
pub use services::{
    ChatService, ChatServiceDependencies, MessageHistory, MessageHistoryDependencies,
    ParticipantService, ParticipantServiceDependencies, SendOutcome,
};
