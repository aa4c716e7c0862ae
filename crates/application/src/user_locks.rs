//! 每用户互斥锁表。
//!
//! 为需要按用户串行的临界区提供锁：同一用户的操作互斥，不同用户
//! 互不阻塞。锁条目在既无持有者也无等待者时回收，表的大小只随
//! 正在进行的操作数变化，不随历史用户数累积。

use std::collections::HashMap;
use std::sync::Arc;

use domain::UserId;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub(crate) struct UserLockMap {
    inner: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLockMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 获取用户锁。guard 释放后调用方必须调用 `release` 回收条目。
    pub(crate) async fn acquire(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inner = self.inner.lock().await;
            inner.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// 回收锁条目。
    ///
    /// 等待者在 `lock_owned` 内部持有 Arc 克隆，所以只剩表内这一份
    /// 引用即说明既无持有者也无等待者，可以安全移除。
    pub(crate) async fn release(&self, user_id: UserId) {
        let mut inner = self.inner.lock().await;
        if let Some(lock) = inner.get(&user_id) {
            if Arc::strong_count(lock) == 1 {
                inner.remove(&user_id);
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
