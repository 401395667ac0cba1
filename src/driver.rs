//! Mounting assembled markup into the live view.
//!
//! The driver remembers, per mount target, which id it mounted, under which [`MountId`],
//! and the registry revision of every descriptor the mount expanded. [`RenderDriver::sync`]
//! compares that with the session and only touches the surface when the target id changed
//! or one of those descriptors was explicitly refreshed. Deferred children the host
//! resolved later are tracked apart: a refresh of one is reported in
//! [`SyncReport::refreshed`] for the host to resolve again. Model and computed changes
//! never remount anything; the host runtime re-renders bindings on its own.

use aqueduct_core::ComponentId;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::instance::MountId;
use crate::markup::{Markup, SlotMarkup};
use crate::session::Session;

/// Where a fragment is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MountTarget {
    /// The main view.
    Root,
    /// The optional secondary root, e.g. a dialog.
    Overlay,
}

impl MountTarget {
    const ALL: [Self; 2] = [Self::Root, Self::Overlay];
}

/// The live view receiving assembled markup.
pub trait Surface {
    /// Replaces whatever is mounted at `target`.
    fn mount(&mut self, target: MountTarget, markup: Markup);

    /// Removes whatever is mounted at `target`.
    fn unmount(&mut self, target: MountTarget);
}

/// What one [`RenderDriver::sync`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Targets mounted with a new instance.
    pub mounted: Vec<MountTarget>,
    /// Targets remounted after a refresh, keeping their instance.
    pub remounted: Vec<MountTarget>,
    /// Targets cleared.
    pub unmounted: Vec<MountTarget>,
    /// Resolved deferred children whose descriptor was refreshed since.
    pub refreshed: Vec<(MountTarget, ComponentId)>,
}

impl SyncReport {
    /// Returns `true` when neither the surface nor the host has anything to redo.
    #[must_use]
    pub const fn is_unchanged(&self) -> bool {
        self.mounted.is_empty()
            && self.remounted.is_empty()
            && self.unmounted.is_empty()
            && self.refreshed.is_empty()
    }
}

type Revisions = Vec<(ComponentId, Option<u64>)>;

#[derive(Debug, Clone)]
struct Mounted {
    id: ComponentId,
    mount: MountId,
    expanded: Revisions,
    resolved: Revisions,
}

/// First recorded id whose revision moved on.
fn first_stale(recorded: &[(ComponentId, Option<u64>)], session: &Session) -> Option<ComponentId> {
    recorded
        .iter()
        .find(|(id, revision)| session.revision(*id) != *revision)
        .map(|(id, _)| *id)
}

/// Keeps a [`Surface`] in step with a [`Session`].
#[derive(Debug)]
pub struct RenderDriver<S> {
    surface: S,
    root: Option<Mounted>,
    overlay: Option<Mounted>,
}

impl<S: Surface> RenderDriver<S> {
    /// Creates a driver with nothing mounted.
    pub const fn new(surface: S) -> Self {
        Self {
            surface,
            root: None,
            overlay: None,
        }
    }

    /// The driven surface.
    pub const fn surface(&self) -> &S {
        &self.surface
    }

    /// Mount id currently used for `target`.
    pub fn mount_of(&self, target: MountTarget) -> Option<MountId> {
        self.slot(target).as_ref().map(|mounted| mounted.mount)
    }

    /// Brings the surface in line with the session's root and overlay.
    pub fn sync(&mut self, session: &Session) -> SyncReport {
        let mut report = SyncReport::default();
        for target in MountTarget::ALL {
            let desired = match target {
                MountTarget::Root => session.root(),
                MountTarget::Overlay => session.overlay(),
            };
            let current = self
                .slot(target)
                .as_ref()
                .map(|mounted| (mounted.id, mounted.mount));

            match (desired, current) {
                (None, None) => {}
                (None, Some((id, mount))) => {
                    debug!(?target, %id, "unmounting");
                    self.surface.unmount(target);
                    session.forget_mount(mount);
                    *self.slot_mut(target) = None;
                    report.unmounted.push(target);
                }
                (Some(id), Some((mounted_id, mount))) if mounted_id == id => {
                    let Some(mounted) = self.slot_mut(target).as_mut() else {
                        continue;
                    };
                    if let Some(changed) = first_stale(&mounted.expanded, session) {
                        debug!(?target, %id, %changed, %mount, "remounting refreshed tree");
                        self.mount(session, target, id, mount);
                        report.remounted.push(target);
                        continue;
                    }
                    let mut refreshed = Vec::new();
                    mounted.resolved.retain(|(child, revision)| {
                        let fresh = session.revision(*child) == *revision;
                        if !fresh {
                            refreshed.push(*child);
                        }
                        fresh
                    });
                    if refreshed.is_empty() {
                        trace!(?target, %id, "mounted tree is current");
                    }
                    for child in refreshed {
                        debug!(?target, %child, "resolved child was refreshed");
                        report.refreshed.push((target, child));
                    }
                }
                (Some(id), previous) => {
                    if let Some((_, previous)) = previous {
                        session.forget_mount(previous);
                    }
                    let mount = session.new_mount();
                    debug!(?target, %id, %mount, "mounting new tree");
                    self.mount(session, target, id, mount);
                    report.mounted.push(target);
                }
            }
        }
        report
    }

    /// Assembles a deferred child within the instance mounted at `target`.
    ///
    /// The descriptors it expands are tracked, so a later refresh of one is reported by
    /// [`RenderDriver::sync`]. Returns [`Markup::Empty`] when nothing is mounted there.
    pub fn resolve(&mut self, session: &Session, target: MountTarget, id: ComponentId) -> Markup {
        let Some(mounted) = self.slot_mut(target).as_mut() else {
            debug!(?target, %id, "nothing mounted, cannot resolve child");
            return Markup::Empty;
        };
        let (markup, expanded) =
            session.assemble_tracked(mounted.mount, id, !session.config().lazy_children);
        for (child, revision) in expanded {
            if mounted.expanded.iter().any(|(seen, _)| *seen == child) {
                continue;
            }
            match mounted.resolved.iter_mut().find(|(seen, _)| *seen == child) {
                Some(entry) => entry.1 = revision,
                None => mounted.resolved.push((child, revision)),
            }
        }
        markup
    }

    /// Assembles one invocation of a scoped slot within the instance at `target`.
    pub fn render_slot(
        &self,
        session: &Session,
        target: MountTarget,
        owner: ComponentId,
        slot: &str,
        argument: Value,
    ) -> Option<SlotMarkup> {
        let mounted = self.slot(target).as_ref()?;
        session.render_slot(mounted.mount, owner, slot, argument)
    }

    fn mount(&mut self, session: &Session, target: MountTarget, id: ComponentId, mount: MountId) {
        let (markup, expanded) =
            session.assemble_tracked(mount, id, !session.config().lazy_children);
        *self.slot_mut(target) = Some(Mounted {
            id,
            mount,
            expanded,
            resolved: Vec::new(),
        });
        self.surface.mount(target, markup);
    }

    const fn slot(&self, target: MountTarget) -> &Option<Mounted> {
        match target {
            MountTarget::Root => &self.root,
            MountTarget::Overlay => &self.overlay,
        }
    }

    const fn slot_mut(&mut self, target: MountTarget) -> &mut Option<Mounted> {
        match target {
            MountTarget::Root => &mut self.root,
            MountTarget::Overlay => &mut self.overlay,
        }
    }
}
