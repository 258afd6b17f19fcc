use serde::{Deserialize, Serialize};

use crate::value_objects::{MessageId, RoomId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    Voice,
    File,
    System,
}

/// 聊天消息
///
/// `created_at` 创建后不可变，`updated_at` 永远不早于 `created_at`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub message_type: MessageType,
    /// 文本内容或媒体地址
    pub content: String,
    pub attachments: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub is_updated: bool,
    pub is_deleted: bool,
}

impl Message {
    pub fn new(
        id: MessageId,
        room_id: RoomId,
        sender_id: UserId,
        message_type: MessageType,
        content: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            room_id,
            sender_id,
            message_type,
            content: content.into(),
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
            is_updated: false,
            is_deleted: false,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }
}
