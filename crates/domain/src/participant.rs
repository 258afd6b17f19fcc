use serde::{Deserialize, Serialize};

use crate::value_objects::{RoomId, Timestamp, UserId};

/// 房间内角色，声明顺序即权限顺序：`Member < Admin < Owner`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
    Member,
    Admin,
    Owner,
}

/// 用户在房间内的成员关系，`(room_id, user_id)` 唯一。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub is_muted: bool,
    pub is_blocked: bool,
    pub nickname: Option<String>,
    pub joined_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Participant {
    pub fn new(room_id: RoomId, user_id: UserId, role: ParticipantRole, now: Timestamp) -> Self {
        Self {
            room_id,
            user_id,
            role,
            is_muted: false,
            is_blocked: false,
            nickname: None,
            joined_at: now,
            updated_at: now,
        }
    }

    pub fn has_at_least(&self, minimum: ParticipantRole) -> bool {
        self.role >= minimum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn role_ordering() {
        assert!(ParticipantRole::Member < ParticipantRole::Admin);
        assert!(ParticipantRole::Admin < ParticipantRole::Owner);
    }

    #[test]
    fn owner_satisfies_every_minimum() {
        let p = Participant::new(
            RoomId::generate(),
            UserId::generate(),
            ParticipantRole::Owner,
            Utc::now(),
        );
        assert!(p.has_at_least(ParticipantRole::Member));
        assert!(p.has_at_least(ParticipantRole::Admin));
        assert!(p.has_at_least(ParticipantRole::Owner));
    }

    #[test]
    fn member_is_not_admin() {
        let p = Participant::new(
            RoomId::generate(),
            UserId::generate(),
            ParticipantRole::Member,
            Utc::now(),
        );
        assert!(!p.has_at_least(ParticipantRole::Admin));
    }
}
