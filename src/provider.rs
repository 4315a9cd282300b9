//! The lifecycle controller for one fabric slot.
//!
//! A [`FabricProvider`] owns exactly one logical binding position ("slot").
//! Binding it runs one create→enter protocol; unbinding it runs the matching
//! exit. Overlapping binds and unbinds are serialized through two mechanisms:
//!
//! - **Supersession.** Every `bind` with changed options and every `unbind`
//!   bumps the slot generation. An attempt started under an older generation
//!   is a *zombie*: it keeps running so it can release whatever it created,
//!   but every publish it would make is refused atomically against the
//!   generation check, so its results are never observed.
//! - **Teardown chain.** Every exit task and every attempt task completes a
//!   latch, and each new piece of work first awaits the latch of the previous
//!   one. A new attempt therefore creates only after every earlier exit has
//!   finished — the exit of a published fabric as much as a zombie's exit of
//!   its own unpublished session — even when the attempt that originally
//!   awaited that exit was itself superseded in the meantime.
//!
//! Together these survive the host's mount → unmount → remount stress pattern
//! without double-entered sessions, leaked sessions, or stale state writes.
//!
//! 单个fabric槽位的生命周期控制器。
//!
//! 每次选项变化的 `bind` 和每次 `unbind` 都会递增槽位代数。旧代数下启动的
//! 尝试是"僵尸"：它继续运行以释放自己创建的资源，但其发布会在与代数检查
//! 原子化的判断中被拒绝。所有退出与尝试任务构成一条拆除链：新的尝试在创建
//! 之前等待链上之前的全部工作完成，即使最初等待的那次尝试已被取代。

use crate::context::{FabricContext, FabricSnapshot};
use crate::diagnostics::BindStats;
use crate::error::{Error, Result};
use crate::fabric::{Fabric, FabricFactory};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::watch;
use tracing::{debug, error, trace};


/// Mutable bookkeeping for one slot. Guarded by a mutex that is never held
/// across an await; publish decisions happen under the same guard as the
/// generation check.
///
/// 单个槽位的可变簿记。互斥锁从不跨await持有。
struct SlotState {
    /// The generation of the live attempt. Bumped on every supersession.
    generation: u64,
    /// Whether the slot currently has a bound configuration.
    bound: bool,
    /// Serialized form of the bound options, for structural comparison.
    fingerprint: Option<String>,
    /// The fabric currently visible to consumers, if any. Only the
    /// controller may call `exit` on it.
    published: Option<Arc<dyn Fabric>>,
    /// Tail of the teardown chain: resolves when the most recently scheduled
    /// exit or attempt task has fully finished. The next attempt awaits it
    /// before creating.
    settled: Option<watch::Receiver<()>>,
}

struct Shared {
    state: Mutex<SlotState>,
    /// Weak so in-flight attempt tasks cannot keep the broadcast channel
    /// open after the provider is dropped.
    publish: Weak<watch::Sender<FabricSnapshot>>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SlotState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn superseded(&self, generation: u64) -> bool {
        self.lock_state().generation != generation
    }

    /// Publishes a snapshot only if `generation` is still the live attempt
    /// and the provider still exists.
    ///
    /// 仅当 `generation` 仍是活动尝试且provider仍存在时才发布快照。
    fn publish_if_live(&self, generation: u64, snapshot: FabricSnapshot) -> bool {
        let state = self.lock_state();
        if state.generation != generation {
            return false;
        }
        let Some(publish) = self.publish.upgrade() else {
            return false;
        };
        publish.send_replace(snapshot);
        true
    }

    /// Hands ownership of `fabric` to the slot and publishes `Ready`, only if
    /// `generation` is still live. This is the sole path that makes a fabric
    /// visible to consumers.
    ///
    /// 仅当 `generation` 仍然活动时，将fabric的所有权交给槽位并发布 `Ready`。
    /// 这是fabric对消费者可见的唯一路径。
    fn publish_ready(&self, generation: u64, fabric: Arc<dyn Fabric>) -> bool {
        let mut state = self.lock_state();
        if state.generation != generation {
            return false;
        }
        let Some(publish) = self.publish.upgrade() else {
            return false;
        };
        state.published = Some(fabric.clone());
        publish.send_replace(FabricSnapshot::ready(fabric));
        true
    }
}

/// Spawns the exit of a previously published fabric as the new tail of the
/// teardown chain. The exit itself starts once the previous chain entry has
/// settled; the returned receiver resolves when the exit has finished,
/// successfully or not.
///
/// 将已发布fabric的退出任务挂到拆除链尾部。返回的接收端在退出结束时解析。
fn spawn_release(
    fabric: Arc<dyn Fabric>,
    settled: Option<watch::Receiver<()>>,
) -> Option<watch::Receiver<()>> {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        error!("no runtime available to exit the published fabric; it will leak");
        return settled;
    };
    let (done_tx, done_rx) = watch::channel(());
    handle.spawn(async move {
        if let Some(mut settled) = settled {
            let _ = settled.changed().await;
        }
        if let Err(err) = fabric.exit().await {
            error!(error = %Error::Release(err), "fabric release failed");
        }
        drop(done_tx);
    });
    Some(done_rx)
}

async fn release_quietly(fabric: Arc<dyn Fabric>) {
    if let Err(err) = fabric.exit().await {
        error!(error = %Error::Release(err), "fabric release failed");
    }
}

/// Binds a fabric session to a scope and publishes its lifecycle state.
///
/// The host calls [`bind`](FabricProvider::bind) on mount and whenever its
/// options change structurally, and [`unbind`](FabricProvider::unbind) on
/// unmount. Dropping the provider unbinds and closes the context channel.
///
/// 将fabric会话绑定到作用域并发布其生命周期状态。宿主在挂载时以及选项发生
/// 结构性变化时调用 `bind`，在卸载时调用 `unbind`。
pub struct FabricProvider<F: FabricFactory> {
    factory: Arc<F>,
    /// The only strong handle on the broadcast sender. Dropping the provider
    /// drops it, which is what makes held contexts report `NotInScope` even
    /// while zombie attempt tasks are still running.
    publish: Arc<watch::Sender<FabricSnapshot>>,
    shared: Arc<Shared>,
    stats: Arc<BindStats>,
}

impl<F: FabricFactory> FabricProvider<F> {
    /// Creates an idle provider around the given factory.
    /// 围绕给定工厂创建一个空闲的provider。
    pub fn new(factory: F) -> Self {
        let (publish, _) = watch::channel(FabricSnapshot::idle());
        let publish = Arc::new(publish);
        Self {
            factory: Arc::new(factory),
            shared: Arc::new(Shared {
                state: Mutex::new(SlotState {
                    generation: 0,
                    bound: false,
                    fingerprint: None,
                    published: None,
                    settled: None,
                }),
                publish: Arc::downgrade(&publish),
            }),
            publish,
            stats: Arc::new(BindStats::new()),
        }
    }

    /// Returns a read-only context onto this slot's published state.
    /// 返回该槽位已发布状态的只读上下文。
    pub fn context(&self) -> FabricContext {
        FabricContext::new(self.publish.subscribe())
    }

    /// Bind diagnostics for this slot.
    pub fn stats(&self) -> &BindStats {
        &self.stats
    }

    /// Starts (or keeps) an attempt for the given options.
    ///
    /// Options are compared by serialized form: a `bind` whose fingerprint
    /// matches the currently bound one is a no-op, which also keeps a
    /// `Failed` phase terminal until a genuine change or an unbind/bind
    /// cycle. A changed fingerprint supersedes the previous attempt, tears
    /// down any published fabric, and starts a fresh attempt that joins the
    /// teardown chain: it creates only once every earlier exit and attempt
    /// has fully finished.
    ///
    /// 为给定选项启动（或保持）一次尝试。选项按序列化形式比较：指纹不变的
    /// `bind` 是空操作；指纹变化会取代之前的尝试，拆除已发布的fabric，并
    /// 启动接入拆除链的新尝试。
    pub fn bind(&self, opts: Option<&F::Opts>) -> Result<()> {
        let fingerprint = serde_json::to_string(&opts)?;

        let mut state = self.shared.lock_state();
        if state.bound && state.fingerprint.as_deref() == Some(fingerprint.as_str()) {
            trace!("bind with structurally equal options; keeping the current attempt");
            return Ok(());
        }
        state.generation += 1;
        let generation = state.generation;
        state.bound = true;
        state.fingerprint = Some(fingerprint);
        let mut settled = state.settled.take();
        if let Some(previous) = state.published.take() {
            settled = spawn_release(previous, settled);
        }
        let (done_tx, done_rx) = watch::channel(());
        state.settled = Some(done_rx);
        self.publish.send_replace(FabricSnapshot::connecting());
        drop(state);

        self.stats.record_bind();
        let attempt_id: u64 = rand::random();
        debug!(generation, attempt_id, "starting fabric attempt");
        tokio::spawn(run_attempt(
            self.shared.clone(),
            self.factory.clone(),
            opts.cloned(),
            generation,
            settled,
            done_tx,
            attempt_id,
        ));
        Ok(())
    }

    /// Supersedes the live attempt and tears down any published fabric.
    ///
    /// The published reference is cleared immediately, so no consumer can
    /// start new interactions against a session that is about to exit; the
    /// exit itself runs in the background on the teardown chain and is
    /// awaited by the next bind. Safe to call repeatedly and before any
    /// fabric exists.
    ///
    /// 取代活动尝试并拆除已发布的fabric。已发布引用被立即清除；退出在拆除
    /// 链上后台运行并由下一次bind等待。可以重复调用，也可以在任何fabric
    /// 存在之前调用。
    pub fn unbind(&self) {
        let mut state = self.shared.lock_state();
        state.generation += 1;
        state.bound = false;
        state.fingerprint = None;
        let published = state.published.take();
        self.publish.send_replace(FabricSnapshot::idle());
        if let Some(fabric) = published {
            debug!(generation = state.generation, "unbinding published fabric");
            let settled = state.settled.take();
            state.settled = spawn_release(fabric, settled);
        }
    }
}

impl<F: FabricFactory> Drop for FabricProvider<F> {
    fn drop(&mut self) {
        self.unbind();
    }
}

/// One create→enter sequence. Runs to completion even when superseded, so
/// that anything it created is released exactly once; the `_done` latch
/// drops on every return path, which is what lets the next chain entry
/// proceed.
///
/// 一次 create→enter 序列。即使被取代也会运行到结束，确保其创建的资源被
/// 恰好释放一次。`_done` 在任何返回路径上释放，使链上的下一项得以继续。
async fn run_attempt<F: FabricFactory>(
    shared: Arc<Shared>,
    factory: Arc<F>,
    opts: Option<F::Opts>,
    generation: u64,
    settled: Option<watch::Receiver<()>>,
    _done: watch::Sender<()>,
    attempt_id: u64,
) {
    if let Some(mut settled) = settled {
        trace!(attempt_id, "waiting for earlier teardown work to settle");
        let _ = settled.changed().await;
    }
    if shared.superseded(generation) {
        debug!(attempt_id, "superseded before creation; nothing to release");
        return;
    }

    let fabric = match factory.create(opts.as_ref()).await {
        Ok(fabric) => fabric,
        Err(err) => {
            let live =
                shared.publish_if_live(generation, FabricSnapshot::failed(Error::Creation(err)));
            if !live {
                debug!(attempt_id, "creation failure discarded: attempt superseded");
            }
            return;
        }
    };

    if shared.superseded(generation) {
        debug!(attempt_id, "superseded after creation; exiting the fresh fabric unpublished");
        release_quietly(fabric).await;
        return;
    }

    if let Err(err) = fabric.enter().await {
        let live = shared.publish_if_live(generation, FabricSnapshot::failed(Error::Entry(err)));
        if !live {
            debug!(attempt_id, "entry failure discarded: attempt superseded");
        }
        release_quietly(fabric).await;
        return;
    }

    if shared.publish_ready(generation, fabric.clone()) {
        debug!(attempt_id, "fabric ready");
    } else {
        debug!(attempt_id, "superseded after entry; exiting the entered fabric unpublished");
        release_quietly(fabric).await;
    }
}
