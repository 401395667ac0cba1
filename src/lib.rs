#![doc = include_str!("../README.md")]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::future_not_send)]

pub mod assembler;
pub mod backend;
pub mod computed;
pub mod config;
pub mod driver;
/// Error taxonomy of the core.
pub mod error;
pub mod instance;
pub mod logging;
pub mod markup;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod shortcut;
pub mod store;

#[cfg(test)]
mod testing;

pub use aqueduct_core::{
    CallbackId, ComponentId, ComputedId, DescriptorTree, EventHandler, ModelId, PathKey,
    PropValue,
};

pub use assembler::Assembler;
pub use backend::{Backend, BackendError, InstanceBridge, Outgoing};
pub use computed::ComputedValue;
pub use config::SessionConfig;
pub use driver::{MountTarget, RenderDriver, Surface, SyncReport};
pub use error::{Error, Result};
pub use markup::Markup;
pub use protocol::HostMessage;
pub use session::Session;
pub use shortcut::KeyCombo;

pub use nami as reactive;
pub use tracing as log;
