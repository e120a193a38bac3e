//! 去重 / 过期保护
//!
//! 远端在拼装一次回复时会连续发出多次编辑，对每次编辑都动作会导致重复点击。
//! 指纹 = SHA-256(message_id, 状态, 按行分组的有序选项文本)，每个字段带长度前缀，
//! 因此不同结构的键盘不会因为字符串拼接而碰撞。
//!
//! 指纹必须在发起点击 **之前** 记录：点击本身会触发远端编辑，
//! 若点击后才记录，处理该编辑时看不到标记。

use std::fmt;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::automation::snapshot::MenuSnapshot;
use crate::core::{AutomationError, AutomationState};

/// 快照在某一状态下的逻辑指纹
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn compute(snapshot: &MenuSnapshot, state: AutomationState) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(snapshot.message_id.to_be_bytes());
        write_field(&mut hasher, state.as_str().as_bytes());
        hasher.update((snapshot.groups.len() as u64).to_be_bytes());
        for row in &snapshot.groups {
            hasher.update((row.len() as u64).to_be_bytes());
            for option in row {
                write_field(&mut hasher, option.label.as_bytes());
            }
        }
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 日志里只需要前 12 位
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

/// 最近一次处理的指纹与处理时间
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DedupMark {
    pub fingerprint: Fingerprint,
    pub at: Instant,
}

/// 准入判定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// 可以处理；调用方已拿到新的标记，必须在点击前写回上下文
    Proceed(DedupMark),
    /// 去抖窗口内的同一逻辑迁移
    Duplicate,
    /// 快照过旧
    Stale(AutomationError),
}

#[derive(Debug, Clone)]
pub struct DedupGuard {
    debounce_window: Duration,
    staleness_ceiling: Duration,
}

impl DedupGuard {
    pub fn new(debounce_window: Duration, staleness_ceiling: Duration) -> Self {
        Self {
            debounce_window,
            staleness_ceiling,
        }
    }

    /// 过期检查先于去重：过期快照不会覆盖上一次的标记
    pub fn admit(
        &self,
        snapshot: &MenuSnapshot,
        state: AutomationState,
        last: Option<&DedupMark>,
    ) -> Admission {
        let age = snapshot.age();
        if age > self.staleness_ceiling {
            return Admission::Stale(AutomationError::StaleSnapshot { age });
        }

        let fingerprint = Fingerprint::compute(snapshot, state);
        let now = Instant::now();
        if let Some(mark) = last {
            if mark.fingerprint == fingerprint && now.duration_since(mark.at) < self.debounce_window {
                return Admission::Duplicate;
            }
        }
        Admission::Proceed(DedupMark {
            fingerprint,
            at: now,
        })
    }
}
