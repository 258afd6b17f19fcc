use std::collections::HashMap;
use std::sync::Arc;

use domain::{RoomId, UserId};

use crate::{
    authorizer::MembershipAuthorizer,
    dto::{ChatMessageResponse, UNKNOWN_SENDER_NAME},
    error::ApplicationError,
    repository::{MessageRepository, RoomRepository, UserRepository},
};

pub struct MessageHistoryDependencies {
    pub room_repository: Arc<dyn RoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub authorizer: Arc<MembershipAuthorizer>,
    /// 每次返回的最大条数
    pub recent_limit: usize,
}

/// 房间最近消息查询
pub struct MessageHistory {
    deps: MessageHistoryDependencies,
}

impl MessageHistory {
    pub fn new(deps: MessageHistoryDependencies) -> Self {
        Self { deps }
    }

    /// 最近的未删除消息，最新的在前；只有房间成员可以查询。
    pub async fn recent(
        &self,
        room_id: RoomId,
        caller: UserId,
    ) -> Result<Vec<ChatMessageResponse>, ApplicationError> {
        if self
            .deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .is_none()
        {
            return Err(ApplicationError::not_found("room not found"));
        }
        self.deps
            .authorizer
            .require_participant(room_id, caller)
            .await?;

        let messages = self
            .deps
            .message_repository
            .recent_by_room(room_id, self.deps.recent_limit)
            .await?;

        let mut names: HashMap<UserId, String> = HashMap::new();
        let mut responses = Vec::with_capacity(messages.len());
        for message in &messages {
            let name = match names.get(&message.sender_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self
                        .deps
                        .user_repository
                        .find_by_id(message.sender_id)
                        .await?
                        .map(|user| user.name)
                        .unwrap_or_else(|| UNKNOWN_SENDER_NAME.to_owned());
                    names.insert(message.sender_id, name.clone());
                    name
                }
            };
            responses.push(ChatMessageResponse::from_message(message, name, None));
        }
        Ok(responses)
    }
}
