//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use std::sync::Arc;
use thiserror::Error;

/// An opaque error raised by the external fabric collaborator.
///
/// Carried verbatim so consumers observe the original failure; `Arc` so the
/// error can ride inside the broadcast snapshot.
///
/// 外部fabric协作者抛出的不透明错误。
pub type FabricError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// The primary error type for the fabric scope-binding library.
/// Fabric作用域绑定库的主要错误类型。
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The fabric collaborator failed to create a session.
    /// Fabric协作者创建会话失败。
    #[error("fabric creation failed: {0}")]
    Creation(FabricError),

    /// A created fabric failed to enter.
    /// 已创建的fabric进入失败。
    #[error("fabric entry failed: {0}")]
    Entry(FabricError),

    /// A fabric failed while exiting. Never published as phase state; by the
    /// time an exit runs the fabric is no longer visible to consumers, so
    /// this is only reported through the log.
    ///
    /// Fabric退出时失败。不会作为阶段状态发布，仅记录日志。
    #[error("fabric release failed: {0}")]
    Release(FabricError),

    /// A remote invocation through an agent proxy failed.
    /// 通过代理进行的远程调用失败。
    #[error("remote invocation failed: {0}")]
    Invoke(FabricError),

    /// The published fabric state was read outside an active provider scope.
    /// This is a programmer error, not a runtime condition.
    ///
    /// 在活动的provider作用域之外读取了已发布的fabric状态。
    #[error("fabric context accessed outside an active provider scope")]
    NotInScope,

    /// The fabric options could not be serialized for structural comparison.
    /// Fabric选项无法序列化，无法进行结构化比较。
    #[error("fabric options could not be fingerprinted: {0}")]
    InvalidOptions(Arc<serde_json::Error>),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidOptions(Arc::new(err))
    }
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;
