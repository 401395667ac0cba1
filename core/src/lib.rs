//! Descriptor data model for Aqueduct.
//!
//! The backend describes a user interface as a tree of plain records. This crate holds
//! the types those records decode into, plus the identifiers and paths used to address
//! model state. It has no runtime behaviour of its own; the `aqueduct` crate consumes it.

pub mod descriptor;
pub mod id;
pub mod path;
pub mod prop;

pub use descriptor::{
    Child, Descriptor, DescriptorTree, LOAD_EVENT, Node, Slot, SlotTree, TreeChild, TreeNode,
};
pub use id::{CallbackId, ComponentId, ComputedId, ModelId};
pub use path::{Path, PathError, PathKey};
pub use prop::{EventHandler, ModelRef, Modifiers, PropValue, ScopedRef};
