use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 有上限的并发额度，入站帧处理与出站写入各用一个
#[derive(Clone)]
pub struct WorkerPool {
    name: &'static str,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(name: &'static str, max: usize) -> Self {
        Self {
            name,
            permits: Arc::new(Semaphore::new(max.max(1))),
        }
    }

    /// 等待一个空闲额度；池已关闭时返回 `None`
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match self.permits.clone().acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(pool = self.name, "工作池已关闭");
                None
            }
        }
    }
}

/// 入站与出站两个相互独立的池
#[derive(Clone)]
pub struct WorkerPools {
    pub inbound: WorkerPool,
    pub outbound: WorkerPool,
}

impl WorkerPools {
    pub fn new(inbound_max: usize, outbound_max: usize) -> Self {
        Self {
            inbound: WorkerPool::new("inbound", inbound_max),
            outbound: WorkerPool::new("outbound", outbound_max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_caps_concurrent_permits() {
        let pool = WorkerPool::new("test", 2);
        let first = pool.acquire().await.unwrap();
        let _second = pool.acquire().await.unwrap();
        assert_eq!(pool.permits.available_permits(), 0);

        let waiting = tokio::spawn({
            let pool = pool.clone();
            async move { pool.acquire().await.is_some() }
        });
        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        drop(first);
        assert!(waiting.await.unwrap());
    }

    #[tokio::test]
    async fn closed_pool_yields_no_permit() {
        let pool = WorkerPool::new("test", 0);
        assert_eq!(pool.permits.available_permits(), 1);
        pool.permits.close();
        assert!(pool.acquire().await.is_none());
    }
}
