//! Shared harness for fabric lifecycle integration tests.

use async_trait::async_trait;
use fabric_scope::{Fabric, FabricAddress, FabricError, FabricFactory};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio::time::{Duration, sleep};

/// Helper to initialize tracing for tests.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("trace")
            .with_test_writer()
            .init();
    });
}

/// One completed call on the stub fabric stack, tagged with the session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Create(u64),
    Enter(u64),
    Exit(u64),
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Virtual-time latencies and failure switches for the stub stack.
#[derive(Debug, Default)]
pub struct Latencies {
    pub create_ms: AtomicU64,
    pub enter_ms: AtomicU64,
    pub exit_ms: AtomicU64,
    pub refuse_create: AtomicBool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StubOpts {
    pub endpoint: String,
}

impl StubOpts {
    pub fn endpoint(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
        }
    }
}

pub struct StubFabric {
    id: u64,
    log: CallLog,
    latencies: Arc<Latencies>,
}

#[async_trait]
impl Fabric for StubFabric {
    async fn enter(&self) -> Result<(), FabricError> {
        sleep(Duration::from_millis(
            self.latencies.enter_ms.load(Ordering::SeqCst),
        ))
        .await;
        self.log.lock().unwrap().push(Call::Enter(self.id));
        Ok(())
    }

    async fn exit(&self) -> Result<(), FabricError> {
        sleep(Duration::from_millis(
            self.latencies.exit_ms.load(Ordering::SeqCst),
        ))
        .await;
        self.log.lock().unwrap().push(Call::Exit(self.id));
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

pub struct StubFactory {
    log: CallLog,
    next_id: AtomicU64,
    latencies: Arc<Latencies>,
}

impl StubFactory {
    pub fn new() -> (Self, CallLog, Arc<Latencies>) {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let latencies = Arc::new(Latencies::default());
        let factory = Self {
            log: log.clone(),
            next_id: AtomicU64::new(1),
            latencies: latencies.clone(),
        };
        (factory, log, latencies)
    }
}

#[async_trait]
impl FabricFactory for StubFactory {
    type Opts = StubOpts;

    async fn create(&self, _opts: Option<&StubOpts>) -> Result<Arc<dyn Fabric>, FabricError> {
        // Ids follow create start order, which keeps storm tests deterministic
        // when several delayed creates resolve on the same virtual-time tick.
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(
            self.latencies.create_ms.load(Ordering::SeqCst),
        ))
        .await;
        if self.latencies.refuse_create.load(Ordering::SeqCst) {
            return Err(Arc::new(std::io::Error::other(
                "admission controller refused the session",
            )));
        }
        self.log.lock().unwrap().push(Call::Create(id));
        Ok(Arc::new(StubFabric {
            id,
            log: self.log.clone(),
            latencies: self.latencies.clone(),
        }))
    }
}

pub fn calls(log: &CallLog) -> Vec<Call> {
    log.lock().unwrap().clone()
}

/// The session id a fabric handle reports through its invoke echo.
pub async fn session_of(fabric: &Arc<dyn Fabric>) -> u64 {
    fabric
        .invoke(&FabricAddress::new("probe@test.fabric"), "id", json!({}))
        .await
        .unwrap()["session"]
        .as_u64()
        .unwrap()
}
