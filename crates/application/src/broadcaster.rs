use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use domain::{RoomId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 传输层可寻址的主题
///
/// 字符串形式：`public.<roomId>`、`typing.<roomId>`、`presence`、`errors.<userId>`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Topic {
    /// 房间消息与加入通知
    Public(RoomId),
    Typing(RoomId),
    /// 全局在线状态
    Presence,
    /// 发送者专属的错误队列
    UserErrors(UserId),
}

impl Topic {
    /// 房间作用域主题对应的房间
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            Topic::Public(room_id) | Topic::Typing(room_id) => Some(*room_id),
            Topic::Presence | Topic::UserErrors(_) => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Public(room_id) => write!(f, "public.{room_id}"),
            Topic::Typing(room_id) => write!(f, "typing.{room_id}"),
            Topic::Presence => f.write_str("presence"),
            Topic::UserErrors(user_id) => write!(f, "errors.{user_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown topic: {0}")]
pub struct TopicParseError(pub String);

impl FromStr for Topic {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "presence" {
            return Ok(Topic::Presence);
        }
        let invalid = || TopicParseError(s.to_owned());
        let (scope, id) = s.split_once('.').ok_or_else(invalid)?;
        match scope {
            "public" => id.parse().map(Topic::Public).map_err(|_| invalid()),
            "typing" => id.parse().map(Topic::Typing).map_err(|_| invalid()),
            "errors" => id.parse().map(Topic::UserErrors).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

impl From<Topic> for String {
    fn from(value: Topic) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Topic {
    type Error = TopicParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 发往某个主题的一帧数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: Topic,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(topic: Topic, payload: &impl Serialize) -> Result<Self, BroadcastError> {
        let payload = serde_json::to_value(payload)
            .map_err(|err| BroadcastError::Serialization(err.to_string()))?;
        Ok(Self { topic, payload })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error("payload serialization failed: {0}")]
    Serialization(String),
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageBroadcaster: Send + Sync {
    async fn broadcast(&self, envelope: Envelope) -> Result<(), BroadcastError>;
}
