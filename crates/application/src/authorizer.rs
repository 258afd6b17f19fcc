use std::sync::Arc;

use domain::{Participant, ParticipantRole, RoomId, UserId};

use crate::{error::ApplicationError, repository::ParticipantRepository};

/// 房间成员权限校验，只读访问参与者存储。
///
/// 校验失败一律以错误返回，调用方不得在失败后继续执行。
pub struct MembershipAuthorizer {
    participants: Arc<dyn ParticipantRepository>,
}

impl MembershipAuthorizer {
    pub fn new(participants: Arc<dyn ParticipantRepository>) -> Self {
        Self { participants }
    }

    pub async fn is_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<bool, ApplicationError> {
        Ok(self.participants.exists(room_id, user_id).await?)
    }

    pub async fn require_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<(), ApplicationError> {
        if self.is_participant(room_id, user_id).await? {
            Ok(())
        } else {
            Err(ApplicationError::forbidden("not a participant of the room"))
        }
    }

    /// 要求调用者的角色不低于 `minimum`（MEMBER < ADMIN < OWNER）
    pub async fn require_role(
        &self,
        room_id: RoomId,
        user_id: UserId,
        minimum: ParticipantRole,
    ) -> Result<Participant, ApplicationError> {
        let participant = self
            .participants
            .find(room_id, user_id)
            .await?
            .ok_or_else(|| ApplicationError::forbidden("not a participant of the room"))?;

        if participant.has_at_least(minimum) {
            Ok(participant)
        } else {
            Err(ApplicationError::forbidden(format!(
                "requires role {minimum:?} or higher"
            )))
        }
    }
}
