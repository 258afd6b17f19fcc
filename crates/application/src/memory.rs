//! 内存实现（用于测试和单机运行）

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domain::{
    Message, Participant, ParticipantRole, RepositoryError, Room, RoomId, User, UserId,
};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{
    error::ApplicationError,
    presence::{PresenceChannel, PresenceReplicator},
    rate_limiter::CounterStore,
    repository::{MessageRepository, ParticipantRepository, RoomRepository, UserRepository},
};

#[derive(Default)]
struct StoreState {
    users: HashMap<UserId, User>,
    rooms: HashMap<RoomId, Room>,
    participants: HashMap<(RoomId, UserId), Participant>,
    messages: HashMap<RoomId, Vec<Message>>,
}

/// 四类仓储共用一把锁，参与者记录与房间成员集合在同一次写入中更新。
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入房间及其初始参与者：创建者为 OWNER，其余为 MEMBER。
    pub async fn insert_room(&self, room: Room) -> Room {
        let mut state = self.state.write().await;
        for user_id in &room.participants {
            let role = if *user_id == room.created_by {
                ParticipantRole::Owner
            } else {
                ParticipantRole::Member
            };
            state.participants.insert(
                (room.id, *user_id),
                Participant::new(room.id, *user_id, role, room.created_at),
            );
        }
        state.rooms.insert(room.id, room.clone());
        room
    }

    /// 修改已有参与者的角色（房间管理属于外部服务，这里只为测试和初始化提供）
    pub async fn set_role(
        &self,
        room_id: RoomId,
        user_id: UserId,
        role: ParticipantRole,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let participant = state
            .participants
            .get_mut(&(room_id, user_id))
            .ok_or(RepositoryError::NotFound)?;
        participant.role = role;
        if role >= ParticipantRole::Admin {
            if let Some(room) = state.rooms.get_mut(&room_id) {
                room.admins.insert(user_id);
            }
        }
        Ok(())
    }

    pub async fn message_count(&self, room_id: RoomId) -> usize {
        let state = self.state.read().await;
        state.messages.get(&room_id).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn save(&self, user: User) -> Result<User, RepositoryError> {
        self.state.write().await.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl RoomRepository for InMemoryStore {
    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        Ok(self.state.read().await.rooms.get(&id).cloned())
    }
}

#[async_trait]
impl ParticipantRepository for InMemoryStore {
    async fn find(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Participant>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.participants.get(&(room_id, user_id)).cloned())
    }

    async fn exists(&self, room_id: RoomId, user_id: UserId) -> Result<bool, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.participants.contains_key(&(room_id, user_id)))
    }

    async fn count_by_room(&self, room_id: RoomId) -> Result<u64, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .participants
            .keys()
            .filter(|(room, _)| *room == room_id)
            .count() as u64)
    }

    async fn enroll(
        &self,
        participant: Participant,
        max_participants: i32,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let key = (participant.room_id, participant.user_id);
        if state.participants.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        if max_participants > 0 {
            let count = state
                .participants
                .keys()
                .filter(|(room, _)| *room == participant.room_id)
                .count();
            if count >= max_participants as usize {
                return Err(RepositoryError::CapacityExceeded {
                    max: max_participants,
                });
            }
        }
        let room = state
            .rooms
            .get_mut(&participant.room_id)
            .ok_or(RepositoryError::NotFound)?;
        room.participants.insert(participant.user_id);
        room.touch(participant.joined_at);
        state.participants.insert(key, participant);
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn insert(&self, message: Message) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(room) = state.rooms.get_mut(&message.room_id) {
            room.touch(message.created_at);
        }
        state
            .messages
            .entry(message.room_id)
            .or_default()
            .push(message);
        Ok(())
    }

    async fn recent_by_room(
        &self,
        room_id: RoomId,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        let mut messages: Vec<Message> = state
            .messages
            .get(&room_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|message| !message.is_deleted)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages.truncate(limit);
        Ok(messages)
    }
}

/// 带过期时间的进程内计数器
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, (u64, Instant)>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, ApplicationError> {
        let now = Instant::now();
        let count = match self.counters.entry(key.to_owned()) {
            Entry::Occupied(mut entry) => {
                let (count, expires_at) = entry.get_mut();
                if *expires_at <= now {
                    *count = 1;
                    *expires_at = now + ttl;
                } else {
                    *count += 1;
                }
                *count
            }
            Entry::Vacant(entry) => {
                entry.insert((1, now + ttl));
                1
            }
        };
        self.counters.retain(|_, (_, expires_at)| *expires_at > now);
        Ok(count)
    }
}

/// 进程内的共享在线状态通道，多个 [`PresenceReplicator`] 挂在同一条总线上即可模拟多实例。
#[derive(Clone)]
pub struct MemoryPresenceBus {
    sender: broadcast::Sender<String>,
}

impl MemoryPresenceBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 把总线上的事件持续投递给 `replicator`，直到总线关闭。
    pub fn attach(&self, replicator: Arc<PresenceReplicator>) -> JoinHandle<()> {
        let mut receiver = self.sender.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => replicator.on_remote_event(&payload).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "在线状态总线消费过慢，跳过部分事件");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for MemoryPresenceBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl PresenceChannel for MemoryPresenceBus {
    async fn publish(&self, payload: String) -> Result<(), ApplicationError> {
        // 没有订阅者时视为发布成功
        let _ = self.sender.send(payload);
        Ok(())
    }
}
