//! Pure observability around slot binds.
//!
//! Rapid rebinding (the host's mount → unmount → remount stress pattern)
//! is easiest to diagnose with a bind counter and the timestamps of the most
//! recent binds. None of this participates in the lifecycle state machine.
//!
//! 围绕槽位绑定的纯可观测性。绑定计数与最近绑定时间戳仅用于诊断，
//! 不参与生命周期状态机。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{Duration, Instant};

/// How many recent bind timestamps are retained.
const RECENT_BINDS_RETAINED: usize = 10;

/// Bind counters for one provider slot.
///
/// 单个provider槽位的绑定计数器。
#[derive(Debug, Default)]
pub struct BindStats {
    binds: AtomicU64,
    recent: Mutex<VecDeque<Instant>>,
}

impl BindStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_bind(&self) {
        self.binds.fetch_add(1, Ordering::Relaxed);
        let mut recent = match self.recent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        recent.push_back(Instant::now());
        while recent.len() > RECENT_BINDS_RETAINED {
            recent.pop_front();
        }
    }

    /// Total number of binds started on this slot, superseded ones included.
    /// 该槽位启动过的绑定总数，包含被取代的绑定。
    pub fn bind_count(&self) -> u64 {
        self.binds.load(Ordering::Relaxed)
    }

    /// Number of retained binds that started within `window` of now. Two or
    /// more within a short window usually means the host is double-mounting.
    ///
    /// 在距现在 `window` 时间内启动的已保留绑定数量。短窗口内出现两个以上
    /// 通常说明宿主正在重复挂载。
    pub fn recent_binds_within(&self, window: Duration) -> usize {
        let now = Instant::now();
        let recent = match self.recent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        recent
            .iter()
            .filter(|instant| now.duration_since(**instant) < window)
            .count()
    }
}
