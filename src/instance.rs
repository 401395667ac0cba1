//! Mounted instances and their one-time `load` flags.

use core::fmt;
use std::collections::HashSet;

use aqueduct_core::ComponentId;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Identity of one mount of a root into the live view.
///
/// Remounting after a refresh keeps the id; mounting a different root, or mounting the
/// overlay again after it was cleared, allocates a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MountId(u64);

impl MountId {
    /// Returns the raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Remembers which `(mount, component)` pairs already dispatched their `load` event.
#[derive(Debug, Default)]
pub struct LoadTracker {
    fired: HashSet<(MountId, ComponentId)>,
    next_mount: u64,
}

impl LoadTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh mount id.
    pub fn new_mount(&mut self) -> MountId {
        self.next_mount += 1;
        MountId(self.next_mount)
    }

    /// Returns `true` when `id` already fired its load event within `mount`.
    #[must_use]
    pub fn has_fired(&self, mount: MountId, id: ComponentId) -> bool {
        self.fired.contains(&(mount, id))
    }

    /// Records that `id` fired its load event within `mount`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateLoadEvent`] when it had already fired.
    pub fn mark(&mut self, mount: MountId, id: ComponentId) -> Result<()> {
        if self.fired.insert((mount, id)) {
            Ok(())
        } else {
            Err(Error::DuplicateLoadEvent { id })
        }
    }

    /// Drops every flag of `mount`.
    pub fn forget(&mut self, mount: MountId) {
        let before = self.fired.len();
        self.fired.retain(|(owner, _)| *owner != mount);
        debug!(%mount, dropped = before - self.fired.len(), "forgot load flags");
    }
}
