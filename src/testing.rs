//! 测试辅助工具模块
//! Test utilities module

#![cfg(test)]

use crate::error::FabricError;
use crate::fabric::{Fabric, FabricAddress, FabricFactory};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, sleep};

/// One observed call on the mock fabric stack, recorded when the call
/// completes. The `u64` is the id of the session involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FabricEvent {
    Created(u64),
    Entered(u64),
    Exited(u64),
}

pub type EventLog = Arc<Mutex<Vec<FabricEvent>>>;

/// Options payload used by provider tests; compared structurally through
/// its serialized form, like any real options value.
#[derive(Debug, Clone, Serialize)]
pub struct TestOpts {
    pub root: String,
    pub version: u32,
}

impl TestOpts {
    pub fn version(version: u32) -> Self {
        Self {
            root: "test-root".to_string(),
            version,
        }
    }
}

/// Runtime-adjustable behavior of the mock stack. Delays are in virtual
/// milliseconds; tests run under paused tokio time.
#[derive(Debug, Default)]
pub struct Knobs {
    pub create_delay_ms: AtomicU64,
    pub enter_delay_ms: AtomicU64,
    pub exit_delay_ms: AtomicU64,
    pub fail_create: AtomicBool,
    pub fail_enter: AtomicBool,
}

impl Knobs {
    fn delay(&self, field: &AtomicU64) -> Duration {
        Duration::from_millis(field.load(Ordering::SeqCst))
    }
}

/// A mock fabric session that records its lifecycle into a shared log.
pub struct MockFabric {
    id: u64,
    log: EventLog,
    knobs: Arc<Knobs>,
}

#[async_trait]
impl Fabric for MockFabric {
    async fn enter(&self) -> Result<(), FabricError> {
        sleep(self.knobs.delay(&self.knobs.enter_delay_ms)).await;
        self.log.lock().unwrap().push(FabricEvent::Entered(self.id));
        if self.knobs.fail_enter.load(Ordering::SeqCst) {
            return Err(Arc::new(std::io::Error::other("enter refused")));
        }
        Ok(())
    }

    async fn exit(&self) -> Result<(), FabricError> {
        sleep(self.knobs.delay(&self.knobs.exit_delay_ms)).await;
        self.log.lock().unwrap().push(FabricEvent::Exited(self.id));
        Ok(())
    }

    async fn invoke(
        &self,
        address: &FabricAddress,
        method: &str,
        params: Value,
    ) -> Result<Value, FabricError> {
        Ok(json!({
            "session": self.id,
            "address": address.as_str(),
            "method": method,
            "params": params,
        }))
    }
}

/// A mock factory handing out [`MockFabric`] sessions with increasing ids.
pub struct MockFactory {
    log: EventLog,
    next_id: AtomicU64,
    pub knobs: Arc<Knobs>,
}

impl MockFactory {
    pub fn new() -> (Self, EventLog, Arc<Knobs>) {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let knobs = Arc::new(Knobs::default());
        let factory = Self {
            log: log.clone(),
            next_id: AtomicU64::new(1),
            knobs: knobs.clone(),
        };
        (factory, log, knobs)
    }
}

#[async_trait]
impl FabricFactory for MockFactory {
    type Opts = TestOpts;

    async fn create(
        &self,
        _opts: Option<&TestOpts>,
    ) -> Result<Arc<dyn Fabric>, FabricError> {
        // Ids follow create start order, so interleavings stay deterministic
        // even when several delayed creates resolve on the same tick.
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        sleep(self.knobs.delay(&self.knobs.create_delay_ms)).await;
        if self.knobs.fail_create.load(Ordering::SeqCst) {
            return Err(Arc::new(std::io::Error::other("create refused")));
        }
        self.log.lock().unwrap().push(FabricEvent::Created(id));
        Ok(Arc::new(MockFabric {
            id,
            log: self.log.clone(),
            knobs: self.knobs.clone(),
        }))
    }
}

/// Snapshot of the log contents.
pub fn events(log: &EventLog) -> Vec<FabricEvent> {
    log.lock().unwrap().clone()
}

/// How many times session `id` completed an exit.
pub fn exits_of(log: &EventLog, id: u64) -> usize {
    events(log)
        .into_iter()
        .filter(|event| *event == FabricEvent::Exited(id))
        .count()
}
