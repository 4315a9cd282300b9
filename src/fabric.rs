//! Traits for abstracting over the external fabric collaborator.
//!
//! The provider treats the fabric as a black box: it only ever calls
//! `create`, `enter` and `exit` on it, in that order, and hands `invoke`
//! through to agent proxies. How those operations work internally (routing,
//! security, transport) is entirely the collaborator's business.
//!
//! 对外部fabric协作者进行抽象的trait。
//!
//! Provider将fabric视为黑盒：只会按顺序调用 `create`、`enter` 和 `exit`，
//! 并将 `invoke` 转交给代理。这些操作的内部实现完全由协作者负责。

use crate::error::FabricError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// The address of a remote agent on the fabric, e.g. `math@fame.fabric`.
///
/// Compared structurally; used as the key half of the derived-accessor cache.
///
/// Fabric上远程代理的地址，例如 `math@fame.fabric`。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FabricAddress(String);

impl FabricAddress {
    /// Creates an address from any string-like value.
    /// 从任意类似字符串的值创建地址。
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FabricAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FabricAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for FabricAddress {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// A live fabric session.
///
/// `enter` is called at most once per created session, by the provider only.
/// `exit` should tolerate being called when `enter` failed or never ran, and
/// implementers are encouraged to tolerate a redundant second call even though
/// the provider guarantees a single one.
///
/// 一个活动的fabric会话。
///
/// `enter` 对每个已创建的会话最多被provider调用一次。`exit` 应当容忍在
/// `enter` 失败或从未运行的情况下被调用。
#[async_trait]
pub trait Fabric: Send + Sync + 'static {
    /// Joins the fabric. May suspend for an unbounded external duration.
    /// 加入fabric。可能会因外部原因无限期挂起。
    async fn enter(&self) -> std::result::Result<(), FabricError>;

    /// Leaves the fabric and releases its resources.
    /// 离开fabric并释放其资源。
    async fn exit(&self) -> std::result::Result<(), FabricError>;

    /// Invokes a method on a remote agent. Only meaningful between a
    /// successful `enter` and the matching `exit`; callers must tolerate
    /// failures if the session is torn down mid-flight.
    ///
    /// 调用远程代理上的方法。仅在成功 `enter` 与对应 `exit` 之间有意义。
    async fn invoke(
        &self,
        address: &FabricAddress,
        method: &str,
        params: Value,
    ) -> std::result::Result<Value, FabricError>;
}

/// A factory for fabric sessions.
///
/// Options are compared by their serialized form, not by reference, so a
/// provider only recreates the session on a genuine structural change.
///
/// Fabric会话工厂。选项按序列化形式比较，而非按引用比较，因此只有在发生真正的
/// 结构性变化时，provider才会重建会话。
#[async_trait]
pub trait FabricFactory: Send + Sync + 'static {
    /// The options payload passed through to `create`.
    type Opts: Serialize + Clone + Send + Sync + 'static;

    /// Creates a new, not-yet-entered fabric session.
    /// 创建一个新的、尚未进入的fabric会话。
    async fn create(
        &self,
        opts: Option<&Self::Opts>,
    ) -> std::result::Result<Arc<dyn Fabric>, FabricError>;
}
