//! The read-broadcast side of a fabric slot.
//!
//! A [`FabricProvider`](crate::provider::FabricProvider) owns the only
//! writable state; every [`FabricContext`] handed out by it mirrors that
//! state read-only through a watch channel. Once the provider is dropped the
//! channel closes and every read reports [`Error::NotInScope`].
//!
//! Fabric槽位的只读广播侧。Provider持有唯一可写状态；它发出的每个
//! `FabricContext` 都通过watch通道只读地镜像该状态。

use crate::error::{Error, Result};
use crate::fabric::Fabric;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// The public lifecycle phase of a fabric slot.
///
/// Fabric槽位的公开生命周期阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No attempt has been started for this slot.
    /// 该槽位尚未开始任何尝试。
    Idle,
    /// An attempt is running: the fabric is being created or entered.
    /// 尝试正在进行：fabric正在创建或进入。
    Connecting,
    /// The fabric was created and entered; consumers may use it.
    /// Fabric已创建并进入，消费者可以使用它。
    Ready,
    /// Creation or entry failed. Terminal until a fresh attempt begins.
    /// 创建或进入失败。在新的尝试开始之前是终止状态。
    Failed,
}

/// One published observation of a fabric slot.
///
/// `fabric` is populated only in [`Phase::Ready`]; `error` only in
/// [`Phase::Failed`].
///
/// Fabric槽位的一次发布观测。`fabric` 仅在 `Ready` 阶段存在；`error` 仅在
/// `Failed` 阶段存在。
#[derive(Clone)]
pub struct FabricSnapshot {
    /// The current lifecycle phase.
    pub phase: Phase,
    /// The published fabric session, when ready.
    pub fabric: Option<Arc<dyn Fabric>>,
    /// The captured attempt failure, when failed.
    pub error: Option<Error>,
}

impl FabricSnapshot {
    pub(crate) fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            fabric: None,
            error: None,
        }
    }

    pub(crate) fn connecting() -> Self {
        Self {
            phase: Phase::Connecting,
            fabric: None,
            error: None,
        }
    }

    pub(crate) fn ready(fabric: Arc<dyn Fabric>) -> Self {
        Self {
            phase: Phase::Ready,
            fabric: Some(fabric),
            error: None,
        }
    }

    pub(crate) fn failed(error: Error) -> Self {
        Self {
            phase: Phase::Failed,
            fabric: None,
            error: Some(error),
        }
    }

    /// Returns the published fabric if the slot is ready.
    /// 如果槽位就绪，返回已发布的fabric。
    pub fn ready_fabric(&self) -> Option<Arc<dyn Fabric>> {
        match self.phase {
            Phase::Ready => self.fabric.clone(),
            _ => None,
        }
    }
}

impl fmt::Debug for FabricSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FabricSnapshot")
            .field("phase", &self.phase)
            .field("fabric", &self.fabric.as_ref().map(|_| "<fabric>"))
            .field("error", &self.error)
            .finish()
    }
}

/// A read-only handle onto the published state of a fabric slot.
///
/// Cheap to clone; every clone observes the same slot.
///
/// Fabric槽位已发布状态的只读句柄。克隆成本低，所有克隆观测同一槽位。
#[derive(Debug, Clone)]
pub struct FabricContext {
    rx: watch::Receiver<FabricSnapshot>,
}

impl FabricContext {
    pub(crate) fn new(rx: watch::Receiver<FabricSnapshot>) -> Self {
        Self { rx }
    }

    pub(crate) fn receiver(&self) -> watch::Receiver<FabricSnapshot> {
        self.rx.clone()
    }

    /// Returns the latest published snapshot.
    ///
    /// Fails with [`Error::NotInScope`] once the owning provider is gone.
    ///
    /// 返回最新发布的快照。一旦所属provider消失，返回 `NotInScope` 错误。
    pub fn current(&self) -> Result<FabricSnapshot> {
        if self.rx.has_changed().is_err() {
            return Err(Error::NotInScope);
        }
        Ok(self.rx.borrow().clone())
    }

    /// Waits for the next state transition and returns the new snapshot.
    /// 等待下一次状态转换并返回新的快照。
    pub async fn changed(&mut self) -> Result<FabricSnapshot> {
        self.rx.changed().await.map_err(|_| Error::NotInScope)?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Waits until the slot settles: resolves with the fabric on `Ready`,
    /// with the captured error on `Failed`, or with [`Error::NotInScope`] if
    /// the provider goes away first.
    ///
    /// 等待槽位稳定：`Ready` 时返回fabric，`Failed` 时返回捕获的错误，
    /// 若provider先消失则返回 `NotInScope`。
    pub async fn wait_ready(&mut self) -> Result<Arc<dyn Fabric>> {
        loop {
            {
                let snapshot = self.rx.borrow_and_update().clone();
                if let Some(fabric) = snapshot.ready_fabric() {
                    return Ok(fabric);
                }
                if snapshot.phase == Phase::Failed {
                    if let Some(error) = snapshot.error {
                        return Err(error);
                    }
                }
            }
            self.rx.changed().await.map_err(|_| Error::NotInScope)?;
        }
    }
}
