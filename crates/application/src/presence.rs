//! 在线状态
//!
//! [`PresenceStore`] 是进程内的在线用户集合，进程启动时为空，崩溃即丢失。
//! [`PresenceReplicator`] 通过共享通道在实例之间复制状态变化，是最终一致的：
//! 某个用户是否在线，等于各实例对该用户最近状态的逻辑或。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use domain::UserId;

use crate::{
    broadcaster::{Envelope, MessageBroadcaster, Topic},
    dto::PresenceEvent,
    error::ApplicationError,
    sequencer::UserSequencer,
};

/// 进程内在线用户集合，所有操作无锁且幂等。
#[derive(Debug, Default)]
pub struct PresenceStore {
    online: DashSet<UserId>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回状态是否发生了变化
    pub fn connect(&self, user_id: UserId) -> bool {
        self.online.insert(user_id)
    }

    /// 返回状态是否发生了变化
    pub fn disconnect(&self, user_id: UserId) -> bool {
        self.online.remove(&user_id).is_some()
    }

    pub fn apply(&self, user_id: UserId, online: bool) -> bool {
        if online {
            self.connect(user_id)
        } else {
            self.disconnect(user_id)
        }
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.online.contains(&user_id)
    }

    /// 当前在线用户快照
    pub fn list_online(&self) -> HashSet<UserId> {
        self.online.iter().map(|entry| *entry.key()).collect()
    }
}

/// 跨实例共享的在线状态通道
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresenceChannel: Send + Sync {
    async fn publish(&self, payload: String) -> Result<(), ApplicationError>;
}

pub struct PresenceReplicator {
    store: Arc<PresenceStore>,
    channel: Arc<dyn PresenceChannel>,
    broadcaster: Arc<dyn MessageBroadcaster>,
    /// 本实例上每个用户打开的连接数
    sessions: DashMap<UserId, usize>,
    /// 仍有连接但显式上报了离线的用户，不参与“仍有连接则重新上线”
    hidden: DashSet<UserId>,
    /// 同一用户的状态修改与发布整体串行，发布顺序与修改顺序一致
    transitions: UserSequencer,
}

impl PresenceReplicator {
    pub fn new(
        store: Arc<PresenceStore>,
        channel: Arc<dyn PresenceChannel>,
        broadcaster: Arc<dyn MessageBroadcaster>,
    ) -> Self {
        Self {
            store,
            channel,
            broadcaster,
            sessions: DashMap::new(),
            hidden: DashSet::new(),
            transitions: UserSequencer::new(),
        }
    }

    pub fn store(&self) -> &Arc<PresenceStore> {
        &self.store
    }

    pub fn local_sessions(&self, user_id: UserId) -> usize {
        self.sessions.get(&user_id).map(|count| *count).unwrap_or(0)
    }

    /// 新连接建立；只有该用户在本实例的第一个连接才触发上线。
    pub async fn session_opened(&self, user_id: UserId) {
        let _guard = self.transitions.lock(user_id).await;
        let changed = match self.sessions.entry(user_id) {
            Entry::Occupied(mut entry) => {
                *entry.get_mut() += 1;
                None
            }
            Entry::Vacant(entry) => {
                entry.insert(1);
                self.hidden.remove(&user_id);
                Some(self.store.connect(user_id))
            }
        };

        if let Some(changed) = changed {
            self.announce(user_id, true, changed).await;
        }
    }

    /// 连接关闭；最后一个连接关闭时才触发下线。
    pub async fn session_closed(&self, user_id: UserId) {
        let _guard = self.transitions.lock(user_id).await;
        let changed = match self.sessions.entry(user_id) {
            Entry::Occupied(mut entry) => {
                *entry.get_mut() -= 1;
                if *entry.get() == 0 {
                    entry.remove();
                    self.hidden.remove(&user_id);
                    Some(self.store.disconnect(user_id))
                } else {
                    None
                }
            }
            Entry::Vacant(_) => None,
        };

        if let Some(changed) = changed {
            self.announce(user_id, false, changed).await;
        }
    }

    /// 客户端显式上报的状态，不影响连接计数。
    ///
    /// 显式离线在该用户下一次建立首个连接或重新上报上线之前一直有效。
    pub async fn set_local(&self, user_id: UserId, online: bool) {
        let _guard = self.transitions.lock(user_id).await;
        if online {
            self.hidden.remove(&user_id);
        } else {
            self.hidden.insert(user_id);
        }
        let changed = self.store.apply(user_id, online);
        self.announce(user_id, online, changed).await;
    }

    /// 序列化 `{userId, online}` 并发布到共享通道
    pub async fn publish(&self, user_id: UserId, online: bool) -> Result<(), ApplicationError> {
        let payload = serde_json::to_string(&PresenceEvent { user_id, online })
            .map_err(|err| ApplicationError::invalid_request(err.to_string()))?;
        self.channel.publish(payload).await
    }

    /// 处理来自共享通道的事件（包括本实例自己发布的）。
    ///
    /// 非法负载只记录日志后丢弃。只有本地状态真正变化时才向本地客户端广播，
    /// 所以本实例发布的事件回流时不会重复广播。
    pub async fn on_remote_event(&self, payload: &str) {
        let event: PresenceEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(payload = %payload, error = %err, "丢弃无法解析的在线状态事件");
                return;
            }
        };

        let _guard = self.transitions.lock(event.user_id).await;
        if !event.online
            && self.local_sessions(event.user_id) > 0
            && !self.hidden.contains(&event.user_id)
        {
            tracing::debug!(user_id = %event.user_id, "用户在本实例仍有连接，重新发布上线");
            if let Err(err) = self.publish(event.user_id, true).await {
                tracing::warn!(user_id = %event.user_id, error = %err, "在线状态发布失败，降级为本实例状态");
            }
            return;
        }

        if self.store.apply(event.user_id, event.online) {
            self.broadcast_local(event).await;
        }
    }

    async fn announce(&self, user_id: UserId, online: bool, changed: bool) {
        if changed {
            self.broadcast_local(PresenceEvent { user_id, online }).await;
        }
        if let Err(err) = self.publish(user_id, online).await {
            tracing::warn!(
                user_id = %user_id,
                online,
                error = %err,
                "在线状态发布失败，降级为本实例状态"
            );
        }
    }

    async fn broadcast_local(&self, event: PresenceEvent) {
        let envelope = match Envelope::new(Topic::Presence, &event) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::error!(error = %err, "在线状态事件序列化失败");
                return;
            }
        };
        if let Err(err) = self.broadcaster.broadcast(envelope).await {
            tracing::warn!(user_id = %event.user_id, error = %err, "在线状态广播失败");
        }
    }
}
