//! Conditional effects gated on fabric readiness.
//!
//! An effect is caller-supplied logic that should run against the live
//! fabric: serving a local agent, subscribing to a topic, starting a poll
//! loop. It runs once per `(fabric identity, deps)` combination while the
//! slot is ready, never otherwise, and its cleanup is always invoked before
//! the next combination runs and on scope teardown.
//!
//! 以fabric就绪为条件的副作用。副作用在每个 `(fabric身份, 依赖)` 组合下
//! 运行一次，且仅在槽位就绪时运行；其清理总是在下一个组合运行之前以及
//! 作用域拆除时被调用。

use crate::context::{FabricContext, FabricSnapshot};
use crate::fabric::Fabric;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::trace;

/// The asynchronous tail of a cleanup action. Spawned without blocking the
/// next run; spawn order follows invocation order (FIFO per scope).
pub type AsyncCleanup = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A cleanup action returned by an effect. Invoked synchronously; may hand
/// back an asynchronous tail.
pub type Cleanup = Box<dyn FnOnce() -> Option<AsyncCleanup> + Send>;

fn fabric_identity(fabric: &Arc<dyn Fabric>) -> usize {
    Arc::as_ptr(fabric) as *const () as usize
}

fn invoke_cleanup(cleanup: Cleanup) {
    if let Some(tail) = cleanup() {
        tokio::spawn(tail);
    }
}

/// Spawns effects bound to a fabric context.
///
/// 派生绑定到fabric上下文的副作用任务。
pub struct FabricEffect;

impl FabricEffect {
    /// Runs `effect(fabric, &deps)` once per new `(fabric identity, deps)`
    /// combination while the slot is ready. The returned handle updates the
    /// deps and shuts the effect down; dropping the handle also shuts it
    /// down, with the final cleanup still invoked.
    ///
    /// 在槽位就绪时，对每个新的 `(fabric身份, 依赖)` 组合运行一次
    /// `effect`。返回的句柄可以更新依赖并关闭副作用。
    pub fn spawn<D, E>(context: &FabricContext, deps: D, effect: E) -> EffectHandle<D>
    where
        D: Clone + PartialEq + Send + Sync + 'static,
        E: FnMut(&Arc<dyn Fabric>, &D) -> Option<Cleanup> + Send + 'static,
    {
        let (deps_tx, deps_rx) = watch::channel(deps);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_effect(context.receiver(), deps_rx, stop_rx, effect));
        EffectHandle {
            deps_tx,
            stop_tx: Some(stop_tx),
            task,
        }
    }
}

/// Handle onto a spawned effect.
///
/// 已派生副作用的句柄。
pub struct EffectHandle<D> {
    deps_tx: watch::Sender<D>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl<D> EffectHandle<D> {
    /// Replaces the extra-dependency set. A structurally equal value does
    /// not re-run the effect.
    ///
    /// 替换额外依赖集。结构上相等的值不会重新运行副作用。
    pub fn set_deps(&self, deps: D) {
        self.deps_tx.send_replace(deps);
    }

    /// Stops the effect and waits until its final cleanup has been invoked.
    /// 停止副作用并等待其最终清理被调用。
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl<D> Drop for EffectHandle<D> {
    fn drop(&mut self) {
        // The detached task still runs the final cleanup.
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
    }
}

async fn run_effect<D, E>(
    mut state_rx: watch::Receiver<FabricSnapshot>,
    mut deps_rx: watch::Receiver<D>,
    mut stop_rx: oneshot::Receiver<()>,
    mut effect: E,
) where
    D: Clone + PartialEq + Send + Sync + 'static,
    E: FnMut(&Arc<dyn Fabric>, &D) -> Option<Cleanup> + Send + 'static,
{
    let mut active: Option<(usize, D)> = None;
    let mut cleanup: Option<Cleanup> = None;

    loop {
        let snapshot = state_rx.borrow_and_update().clone();
        let deps = deps_rx.borrow_and_update().clone();
        let target = snapshot.ready_fabric().map(|fabric| (fabric, deps));
        let target_key = target
            .as_ref()
            .map(|(fabric, deps)| (fabric_identity(fabric), deps.clone()));

        if target_key != active {
            if let Some(previous) = cleanup.take() {
                trace!("invoking effect cleanup before the next combination");
                invoke_cleanup(previous);
            }
            active = target_key;
            if let Some((fabric, deps)) = target.as_ref() {
                cleanup = effect(fabric, deps);
            }
        }

        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = deps_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut stop_rx => break,
        }
    }

    if let Some(last) = cleanup.take() {
        trace!("invoking effect cleanup on scope teardown");
        invoke_cleanup(last);
    }
}
