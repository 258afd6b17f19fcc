//! 传输层上收发的数据结构（JSON 字段均为 camelCase）。

use domain::{Message, MessageId, MessageType, RoomId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 单条消息内容上限（字符数）
pub const MAX_CONTENT_CHARS: u64 = 5000;

/// 用户名无法解析时的显示名
pub const UNKNOWN_SENDER_NAME: &str = "Unknown User";

/// `chat.sendMessage` 负载
///
/// 负载中的 `senderId` 会被忽略，发送者身份只取自已认证的会话。
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageCommand {
    pub room_id: RoomId,
    #[validate(length(min = 1, max = MAX_CONTENT_CHARS))]
    pub content: String,
    #[serde(default, rename = "type")]
    pub message_type: MessageType,
    /// 客户端生成的关联 ID，用于乐观更新对账
    #[serde(default)]
    pub temp_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// `chat.addUser` 负载
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserCommand {
    pub room_id: RoomId,
}

/// 广播到 `public.<roomId>` 的消息投影
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageResponse {
    pub id: MessageId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub is_updated: bool,
    pub is_deleted: bool,
}

impl ChatMessageResponse {
    pub fn from_message(message: &Message, sender_name: String, temp_id: Option<String>) -> Self {
        Self {
            id: message.id,
            temp_id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            sender_name,
            content: message.content.clone(),
            message_type: message.message_type,
            attachments: message.attachments.clone(),
            created_at: message.created_at,
            updated_at: message.updated_at,
            is_updated: message.is_updated,
            is_deleted: message.is_deleted,
        }
    }
}

/// 共享通道与 `presence` 主题上的在线状态变化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    pub user_id: UserId,
    pub online: bool,
}

/// `typing` 负载，其中的 `userId` 不被采信
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingCommand {
    pub room_id: RoomId,
    pub typing: bool,
}

/// `typing.<roomId>` 上的广播内容
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub typing: bool,
}

/// 发往 `errors.<userId>` 的发送失败通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendFailure {
    pub temp_id: Option<String>,
    pub code: String,
    pub message: String,
}
