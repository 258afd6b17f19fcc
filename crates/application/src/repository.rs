use async_trait::async_trait;
use domain::{Message, Participant, RepositoryError, Room, RoomId, User, UserId};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<User, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    async fn find(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Participant>, RepositoryError>;

    async fn exists(&self, room_id: RoomId, user_id: UserId) -> Result<bool, RepositoryError>;

    async fn count_by_room(&self, room_id: RoomId) -> Result<u64, RepositoryError>;

    /// 插入参与者记录，同时把用户加入房间的参与者集合并刷新最后活跃时间，
    /// 两者要么都成功要么都不生效。
    ///
    /// 同一 `(room_id, user_id)` 已存在时返回 [`RepositoryError::Conflict`]；
    /// `max_participants > 0` 且房间已满时返回 [`RepositoryError::CapacityExceeded`]。
    /// 人数检查与写入在同一个原子单元内完成。
    async fn enroll(
        &self,
        participant: Participant,
        max_participants: i32,
    ) -> Result<(), RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 保存消息，同时刷新所在房间的最后活跃时间
    async fn insert(&self, message: Message) -> Result<(), RepositoryError>;

    /// 房间内最近的未删除消息，按时间倒序
    async fn recent_by_room(
        &self,
        room_id: RoomId,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError>;
}
