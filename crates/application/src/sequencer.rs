use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use domain::{RoomId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 按键串行化的异步锁
///
/// 同一个键上的临界区按获取顺序依次执行，不同键互不影响。
/// 最后一个持有者释放时删除该键的锁，映射大小不超过正在使用的键数。
#[derive(Debug)]
pub struct KeyedSequencer<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

/// 房间级顺序锁
///
/// 发送路径在鉴权通过后、广播完成前持有该锁，保证同一进程内同一房间的广播顺序
/// 与加锁顺序一致。跨进程没有全局顺序。
pub type RoomSequencer = KeyedSequencer<RoomId>;

/// 用户级顺序锁，在线状态的“修改本地状态 + 发布”在其中完成
pub type UserSequencer = KeyedSequencer<UserId>;

impl<K: Eq + Hash + Copy> KeyedSequencer<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub async fn lock(&self, key: K) -> SequenceGuard<'_, K> {
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        SequenceGuard {
            locks: &self.locks,
            key,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// 当前持有或等待中的键数
    pub fn active_keys(&self) -> usize {
        self.locks.len()
    }
}

impl<K: Eq + Hash + Copy> Default for KeyedSequencer<K> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SequenceGuard<'a, K: Eq + Hash> {
    locks: &'a DashMap<K, Arc<Mutex<()>>>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> Drop for SequenceGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // 只剩映射自身的引用时没有人在等待
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
