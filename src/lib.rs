#![deny(clippy::expect_used, clippy::unwrap_used)]

//! The root of the fabric scope-binding library.
//! Fabric作用域绑定库的根。

pub mod agent;
pub mod context;
pub mod diagnostics;
pub mod effect;
pub mod error;
pub mod fabric;
pub mod provider;

#[cfg(test)]
mod testing;

pub use agent::{AgentProxy, RemoteAgentCache};
pub use context::{FabricContext, FabricSnapshot, Phase};
pub use effect::{AsyncCleanup, Cleanup, EffectHandle, FabricEffect};
pub use error::{Error, FabricError, Result};
pub use fabric::{Fabric, FabricAddress, FabricFactory};
pub use provider::FabricProvider;
