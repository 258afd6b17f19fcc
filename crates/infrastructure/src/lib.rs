//! 基础设施层实现。
//!
//! 提供 Redis 限流计数器和在线状态发布订阅等适配器，实现应用层定义的接口。

pub mod builder;
pub mod redis;

pub use builder::{Infrastructure, InfrastructureError};
pub use crate::redis::{
    PresenceSubscriber, RedisCounterStore, RedisError, RedisPresencePublisher, RedisResult,
};
