//! Redis 适配器
//!
//! 限流计数器与在线状态的发布订阅。

pub mod counter;
pub mod error;
pub mod publisher;
pub mod subscriber;

// 重新导出
pub use counter::RedisCounterStore;
pub use error::{RedisError, RedisResult};
pub use publisher::RedisPresencePublisher;
pub use subscriber::{backoff_delay, PresenceSubscriber};
