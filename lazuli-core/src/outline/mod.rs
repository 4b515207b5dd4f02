//! # Outline
//! Browser-side projection. [`OutlinePresenter`] adapts a store snapshot to
//! the two narrow surfaces a tree control needs: [`TreeDataSource`] for rows,
//! [`ActivationSink`] for double-activation. Refreshes are gated on the store
//! revision, so polling an unchanged store costs one comparison.

use std::sync::Arc;

use crate::scene::SceneID;
use crate::store::{Revision, SceneSnapshot, SceneStore};

/// Row side of a tree control. A `None` parent addresses the invisible top
/// level, i.e. the store roots.
pub trait TreeDataSource {
    fn child_count(&self, parent: Option<SceneID>) -> usize;
    fn child_at(&self, parent: Option<SceneID>, index: usize) -> Option<SceneID>;
    fn is_expandable(&self, node: SceneID) -> bool;
    fn label(&self, node: SceneID) -> Option<String>;
}

/// Event side of a tree control.
pub trait ActivationSink {
    /// A row was double-activated.
    fn handle_activation(&self, node: SceneID);
}

pub struct OutlinePresenter {
    store: Arc<SceneStore>,
    // The tree currently on screen. Swapped wholesale on refresh; the control
    // reloads from scratch rather than diffing.
    shown: parking_lot::RwLock<SceneSnapshot>,
    focus: crossbeam::channel::Sender<SceneID>,
}

impl OutlinePresenter {
    #[must_use]
    pub fn new(store: Arc<SceneStore>, focus: crossbeam::channel::Sender<SceneID>) -> Self {
        let shown = parking_lot::RwLock::new(store.snapshot());
        Self {
            store,
            shown,
            focus,
        }
    }

    /// Re-reads the store if its revision moved on. Returns true when the
    /// shown tree changed and the control should reload.
    pub fn refresh(&self) -> bool {
        if self.shown.read().revision() == self.store.revision() {
            return false;
        }
        let mut shown = self.shown.write();
        *shown = self.store.snapshot();
        log::trace!("outline reloaded at revision {}", shown.revision().get());
        true
    }

    /// Revision of the tree currently on screen.
    #[must_use]
    pub fn shown_revision(&self) -> Revision {
        self.shown.read().revision()
    }
}

impl TreeDataSource for OutlinePresenter {
    fn child_count(&self, parent: Option<SceneID>) -> usize {
        let shown = self.shown.read();
        match parent {
            None => shown.forest().roots().count(),
            Some(id) => shown.forest().children_of(id).map_or(0, Iterator::count),
        }
    }
    fn child_at(&self, parent: Option<SceneID>, index: usize) -> Option<SceneID> {
        let shown = self.shown.read();
        match parent {
            None => shown.forest().roots().nth(index).map(|(id, _)| id),
            Some(id) => shown
                .forest()
                .children_of(id)?
                .nth(index)
                .map(|(id, _)| id),
        }
    }
    fn is_expandable(&self, node: SceneID) -> bool {
        let shown = self.shown.read();
        shown
            .forest()
            .children_of(node)
            .is_some_and(|mut children| children.next().is_some())
    }
    fn label(&self, node: SceneID) -> Option<String> {
        let shown = self.shown.read();
        shown.forest().get(node).map(|object| object.label().to_owned())
    }
}

impl ActivationSink for OutlinePresenter {
    fn handle_activation(&self, node: SceneID) {
        if self.shown.read().forest().get(node).is_none() {
            // Controls can hold rows from before a reload.
            log::trace!("activation on vanished node {node:?}");
            return;
        }
        if self.focus.send(node).is_err() {
            log::warn!("focus intent dropped, controller side closed");
        }
    }
}
