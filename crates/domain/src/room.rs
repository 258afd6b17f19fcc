use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{RoomId, Timestamp, UserId};

/// 不限制参与人数
pub const UNBOUNDED_PARTICIPANTS: i32 = -1;

const DIRECT_ROOM_CAPACITY: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomKind {
    /// 任何人都可以加入
    Public,
    /// 仅限邀请
    Private,
    /// 一对一私聊
    Direct,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub allow_file_sharing: bool,
    pub allow_guest_users: bool,
    pub moderation_required: bool,
    pub welcome_message: String,
}

/// 聊天室
///
/// 参与者集合与 [`crate::Participant`] 记录是同一事实的两种视图，
/// 两者必须在同一个写入单元中更新。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: Option<String>,
    pub kind: RoomKind,
    pub created_by: UserId,
    pub participants: HashSet<UserId>,
    pub admins: HashSet<UserId>,
    /// `-1` 表示不限制
    pub max_participants: i32,
    pub is_active: bool,
    pub settings: RoomSettings,
    pub created_at: Timestamp,
    pub last_activity: Timestamp,
}

impl Room {
    /// 创建公开或私有房间，创建者是唯一的初始参与者和管理员。
    pub fn new_group(
        id: RoomId,
        name: impl Into<String>,
        kind: RoomKind,
        created_by: UserId,
        max_participants: Option<i32>,
        settings: RoomSettings,
        now: Timestamp,
    ) -> DomainResult<Self> {
        if kind == RoomKind::Direct {
            return Err(DomainError::invalid_argument(
                "kind",
                "use Room::new_direct for direct rooms",
            ));
        }

        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(DomainError::invalid_argument("name", "cannot be empty"));
        }

        let max_participants = max_participants.unwrap_or(UNBOUNDED_PARTICIPANTS);
        if max_participants == 0 || max_participants < UNBOUNDED_PARTICIPANTS {
            return Err(DomainError::invalid_argument(
                "max_participants",
                "must be positive or -1",
            ));
        }

        Ok(Self {
            id,
            name: Some(name),
            kind,
            created_by,
            participants: HashSet::from([created_by]),
            admins: HashSet::from([created_by]),
            max_participants,
            is_active: true,
            settings,
            created_at: now,
            last_activity: now,
        })
    }

    /// 创建一对一私聊，人数固定为 2。
    pub fn new_direct(
        id: RoomId,
        created_by: UserId,
        other: UserId,
        now: Timestamp,
    ) -> DomainResult<Self> {
        if created_by == other {
            return Err(DomainError::DirectRoomSize);
        }

        Ok(Self {
            id,
            name: None,
            kind: RoomKind::Direct,
            created_by,
            participants: HashSet::from([created_by, other]),
            admins: HashSet::new(),
            max_participants: DIRECT_ROOM_CAPACITY,
            is_active: true,
            settings: RoomSettings {
                allow_file_sharing: true,
                ..RoomSettings::default()
            },
            created_at: now,
            last_activity: now,
        })
    }

    pub fn is_bounded(&self) -> bool {
        self.max_participants > 0
    }

    /// 给定当前人数，是否还能再加入一人
    pub fn has_capacity_for(&self, current_count: u64) -> bool {
        !self.is_bounded() || current_count < self.max_participants as u64
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    /// 把用户加入参与者集合并刷新最后活跃时间。
    pub fn admit(&mut self, user_id: UserId, now: Timestamp) -> DomainResult<()> {
        if self.is_participant(user_id) {
            return Err(DomainError::AlreadyParticipant);
        }
        if !self.has_capacity_for(self.participants.len() as u64) {
            return Err(DomainError::RoomAtCapacity {
                max: self.max_participants,
            });
        }
        self.participants.insert(user_id);
        self.touch(now);
        Ok(())
    }

    pub fn touch(&mut self, now: Timestamp) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }
}
