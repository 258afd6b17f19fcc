use std::sync::Arc;

use domain::{Participant, ParticipantRole, RoomId, RoomKind, UserId};

use crate::{
    authorizer::MembershipAuthorizer,
    clock::Clock,
    error::ApplicationError,
    repository::{ParticipantRepository, RoomRepository, UserRepository},
    sequencer::RoomSequencer,
};

pub struct ParticipantServiceDependencies {
    pub room_repository: Arc<dyn RoomRepository>,
    pub participant_repository: Arc<dyn ParticipantRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub authorizer: Arc<MembershipAuthorizer>,
    pub sequencer: Arc<RoomSequencer>,
    pub clock: Arc<dyn Clock>,
}

/// 参与者写入守卫
pub struct ParticipantService {
    deps: ParticipantServiceDependencies,
}

impl ParticipantService {
    pub fn new(deps: ParticipantServiceDependencies) -> Self {
        Self { deps }
    }

    /// 把 `user_id` 以 MEMBER 身份加入房间。
    ///
    /// 自己加入只允许公开房间；替他人加入需要 ADMIN 及以上角色。
    /// 同一进程内对同一房间的加入操作串行执行；跨进程的唯一性与人数上限
    /// 由 [`ParticipantRepository::enroll`] 在同一个原子单元内检查。
    pub async fn add_participant(
        &self,
        actor: UserId,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Participant, ApplicationError> {
        if actor != user_id {
            self.deps
                .authorizer
                .require_role(room_id, actor, ParticipantRole::Admin)
                .await?;
        }

        let _guard = self.deps.sequencer.lock(room_id).await;

        let mut room = self
            .deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("room not found"))?;

        if actor == user_id && room.kind != RoomKind::Public {
            return Err(ApplicationError::forbidden("room is not open for joining"));
        }

        if self.deps.user_repository.find_by_id(user_id).await?.is_none() {
            return Err(ApplicationError::not_found("user not found"));
        }

        if self
            .deps
            .participant_repository
            .exists(room_id, user_id)
            .await?
        {
            return Err(ApplicationError::Conflict(
                "user is already a participant of the room".to_owned(),
            ));
        }

        let count = self
            .deps
            .participant_repository
            .count_by_room(room_id)
            .await?;
        if !room.has_capacity_for(count) {
            return Err(ApplicationError::CapacityExceeded {
                max: room.max_participants,
            });
        }

        let now = self.deps.clock.now();
        room.admit(user_id, now)?;
        let participant = Participant::new(room_id, user_id, ParticipantRole::Member, now);
        self.deps
            .participant_repository
            .enroll(participant.clone(), room.max_participants)
            .await?;

        tracing::info!(room_id = %room_id, user_id = %user_id, actor = %actor, "用户加入房间");
        Ok(participant)
    }
}
