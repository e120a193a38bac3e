//! 键盘快照存储
//!
//! 只保存被跟踪消息最近一次观察到的键盘：新的编辑无条件替换旧快照，不做任何合并，
//! 即使新键盘的选项比旧的少（远端是权威）。更新通过 watch 通道通知等待更新快照的一方。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

/// 远端消息 ID
pub type MessageId = i64;

/// 回调令牌（远端下发的不透明数据，原样回传）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationToken(pub String);

/// 键盘上的一个可点击选项，捕获后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOption {
    pub label: String,
    pub token: InvocationToken,
}

impl MenuOption {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: InvocationToken(token.into()),
        }
    }
}

/// 入站事件里携带的原始键盘：按行分组的选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keyboard {
    pub rows: Vec<Vec<MenuOption>>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<MenuOption>>) -> Self {
        Self { rows }
    }

    /// 每个选项单独一行（测试与回放中最常见的形态）
    pub fn single_column<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rows = labels
            .into_iter()
            .enumerate()
            .map(|(i, label)| vec![MenuOption::new(label, format!("cb:{i}"))])
            .collect();
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.is_empty())
    }
}

/// 某一时刻观察到的菜单
#[derive(Debug, Clone)]
pub struct MenuSnapshot {
    pub message_id: MessageId,
    /// 存储内单调递增的修订号
    pub revision: u64,
    /// 到达时间
    pub observed_at: Instant,
    pub groups: Vec<Vec<MenuOption>>,
}

impl MenuSnapshot {
    /// 按行、行内按列的顺序展开
    pub fn options(&self) -> impl Iterator<Item = &MenuOption> {
        self.groups.iter().flatten()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.options().map(|o| o.label.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.options().next().is_none()
    }

    pub fn age(&self) -> Duration {
        self.observed_at.elapsed()
    }

    pub fn is_stale(&self, ceiling: Duration) -> bool {
        self.age() > ceiling
    }
}

/// 单会话的快照存储
#[derive(Debug)]
pub struct SnapshotStore {
    tx: watch::Sender<Option<Arc<MenuSnapshot>>>,
    next_revision: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx,
            next_revision: AtomicU64::new(1),
        }
    }

    /// 无条件替换当前快照并打上到达时间，通知所有订阅者
    pub fn update(&self, message_id: MessageId, keyboard: Keyboard) -> Arc<MenuSnapshot> {
        let snapshot = Arc::new(MenuSnapshot {
            message_id,
            revision: self.next_revision.fetch_add(1, Ordering::Relaxed),
            observed_at: Instant::now(),
            groups: keyboard.rows,
        });
        tracing::debug!(
            message_id,
            revision = snapshot.revision,
            options = snapshot.options().count(),
            "Keyboard snapshot updated"
        );
        self.tx.send_replace(Some(Arc::clone(&snapshot)));
        snapshot
    }

    pub fn read(&self) -> Option<Arc<MenuSnapshot>> {
        self.tx.borrow().clone()
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<MenuSnapshot>>> {
        self.tx.subscribe()
    }

    /// 等待修订号大于 `after_revision` 的快照，超时返回 None
    #[cfg(test)]
    pub async fn wait_for_fresher(
        &self,
        after_revision: u64,
        timeout: Duration,
    ) -> Option<Arc<MenuSnapshot>> {
        let mut rx = self.subscribe();
        let wait = rx.wait_for(|s| s.as_ref().is_some_and(|s| s.revision > after_revision));
        let fresher = match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(snapshot)) => snapshot.clone(),
            _ => None,
        };
        fresher
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_empty_store() {
        let store = SnapshotStore::new();
        assert!(store.read().is_none());
    }

    #[test]
    fn test_update_replaces_even_with_fewer_options() {
        let store = SnapshotStore::new();
        store.update(10, Keyboard::single_column(["🚛 101", "🚛 102", "Назад"]));
        let second = store.update(10, Keyboard::single_column(["Подтвердить"]));

        let current = store.read().unwrap();
        assert_eq!(current.revision, second.revision);
        assert_eq!(current.labels(), vec!["Подтвердить"]);
    }

    #[test]
    fn test_revisions_are_monotonic() {
        let store = SnapshotStore::new();
        let a = store.update(1, Keyboard::single_column(["a"]));
        let b = store.update(2, Keyboard::single_column(["b"]));
        assert!(b.revision > a.revision);
        assert_eq!(store.read().unwrap().message_id, 2);
    }

    #[test]
    fn test_options_flatten_in_row_order() {
        let store = SnapshotStore::new();
        let snapshot = store.update(
            5,
            Keyboard::new(vec![
                vec![MenuOption::new("A", "1"), MenuOption::new("B", "2")],
                vec![MenuOption::new("C", "3")],
            ]),
        );
        assert_eq!(snapshot.labels(), vec!["A", "B", "C"]);
        assert!(!snapshot.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness_uses_arrival_time() {
        let store = SnapshotStore::new();
        let snapshot = store.update(1, Keyboard::single_column(["x"]));
        assert!(!snapshot.is_stale(Duration::from_secs(2)));
        tokio::time::advance(Duration::from_millis(2001)).await;
        assert!(snapshot.is_stale(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_update_notifies_waiters() {
        let store = Arc::new(SnapshotStore::new());
        let first = store.update(1, Keyboard::single_column(["old"]));

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .wait_for_fresher(first.revision, Duration::from_secs(1))
                    .await
            })
        };
        tokio::task::yield_now().await;
        store.update(1, Keyboard::single_column(["new"]));

        let fresher = waiter.await.unwrap().unwrap();
        assert_eq!(fresher.labels(), vec!["new"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_fresher_times_out() {
        let store = SnapshotStore::new();
        let first = store.update(1, Keyboard::single_column(["only"]));
        let result = store
            .wait_for_fresher(first.revision, Duration::from_millis(200))
            .await;
        assert!(result.is_none());
    }
}
