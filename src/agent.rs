//! Remote-agent proxies derived from the published fabric.
//!
//! A proxy is cheap to build but downstream consumers often key their own
//! memoization on it, so the cache guarantees referential stability: the
//! same `(fabric identity, address)` pair always yields the exact same
//! proxy instance, and a fresh instance appears only when either half of
//! the pair changes.
//!
//! 从已发布fabric派生的远程代理。缓存保证引用稳定性：相同的
//! `(fabric身份, 地址)` 组合总是返回同一个代理实例。

use crate::context::FabricContext;
use crate::error::{Error, Result};
use crate::fabric::{Fabric, FabricAddress};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::{Arc, Weak};

/// A handle for invoking methods on one remote agent through the fabric.
///
/// Construction is pure and synchronous; all communication happens in
/// [`invoke`](AgentProxy::invoke), which simply fails if the fabric has been
/// torn down mid-flight.
///
/// 通过fabric调用单个远程代理方法的句柄。构造是纯同步的；所有通信发生在
/// `invoke` 中。
pub struct AgentProxy {
    address: FabricAddress,
    fabric: Arc<dyn Fabric>,
}

impl AgentProxy {
    pub(crate) fn new(address: FabricAddress, fabric: Arc<dyn Fabric>) -> Self {
        Self { address, fabric }
    }

    /// The address this proxy points at.
    pub fn address(&self) -> &FabricAddress {
        &self.address
    }

    /// Invokes `method` on the remote agent.
    /// 调用远程代理上的 `method`。
    pub async fn invoke(&self, method: &str, params: Value) -> Result<Value> {
        self.fabric
            .invoke(&self.address, method, params)
            .await
            .map_err(Error::Invoke)
    }
}

struct CacheEntry {
    fabric: Weak<dyn Fabric>,
    proxy: Arc<AgentProxy>,
}

/// A memoizing cache of [`AgentProxy`] instances keyed by
/// `(fabric identity, address)`.
///
/// Fabric identity is pointer identity of the published reference; the
/// address is compared structurally. While the slot is not ready the cache
/// returns the unavailable sentinel (`None`) instead of building a proxy.
///
/// 以 `(fabric身份, 地址)` 为键的代理缓存。fabric身份按指针比较，地址按
/// 结构比较。槽位未就绪时返回"不可用"哨兵值（`None`）。
#[derive(Default)]
pub struct RemoteAgentCache {
    entries: DashMap<FabricAddress, CacheEntry>,
}

impl RemoteAgentCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized proxy for `address` against the currently
    /// published fabric, or `None` while the slot is not ready.
    ///
    /// 返回 `address` 针对当前已发布fabric的记忆化代理；槽位未就绪时返回
    /// `None`。
    pub fn remote_agent(
        &self,
        context: &FabricContext,
        address: &FabricAddress,
    ) -> Result<Option<Arc<AgentProxy>>> {
        let snapshot = context.current()?;
        let Some(fabric) = snapshot.ready_fabric() else {
            return Ok(None);
        };

        if let Some(entry) = self.entries.get(address) {
            if let Some(cached) = entry.fabric.upgrade() {
                if Arc::ptr_eq(&cached, &fabric) {
                    return Ok(Some(entry.proxy.clone()));
                }
            }
        }

        let proxy = Arc::new(AgentProxy::new(address.clone(), fabric.clone()));
        self.entries.insert(
            address.clone(),
            CacheEntry {
                fabric: Arc::downgrade(&fabric),
                proxy: proxy.clone(),
            },
        );
        Ok(Some(proxy))
    }
}
