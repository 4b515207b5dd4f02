//! # Viewport
//! Render-side projection. [`ViewportProjection`] owns the overlay toggle
//! state and answers the one question a paint loop asks: does anything on
//! screen differ from what the store and toggles say should be there?
//! Camera and resource intents go out through [`RenderProxy`], the only
//! surface the render device has to implement.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use crate::scene::{Bounds, SceneID};
use crate::store::{Revision, SceneSnapshot, SceneStore};

bitflags::bitflags! {
    /// Overlays drawn on top of the solid scene.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct RenderToggles : u8 {
        const EDGES = 0b0000_0001;
        const BOUNDING_BOXES = 0b0000_0010;
    }
}

/// Device-facing side of the projection. Implemented by whatever owns the
/// actual surface and camera.
pub trait RenderProxy: Send + Sync {
    /// Every loaded object is gone. Drop per-object GPU resources.
    fn scene_cleared(&self) -> anyhow::Result<()>;
    /// Move the camera to take in the whole scene.
    fn frame_scene(&self, bounds: Option<Bounds>);
    /// Move the camera to one object.
    fn frame_object(&self, id: SceneID, bounds: Option<Bounds>);
}

/// Everything a renderer needs to draw one frame. The snapshot keeps the
/// frame's view of the scene alive for however long drawing takes.
pub struct FrameDescription {
    snapshot: SceneSnapshot,
    toggles: RenderToggles,
}
impl FrameDescription {
    #[must_use]
    pub fn snapshot(&self) -> &SceneSnapshot {
        &self.snapshot
    }
    #[must_use]
    pub fn toggles(&self) -> RenderToggles {
        self.toggles
    }
}

/// What the surface is known to show.
struct Presented {
    // None until the first frame lands, so a fresh projection always reports
    // stale.
    revision: Option<Revision>,
    toggles: RenderToggles,
}

pub struct ViewportProjection {
    store: Arc<SceneStore>,
    proxy: Arc<dyn RenderProxy>,
    toggles: AtomicU8,
    // Latched by intents that change the picture without touching the store,
    // camera moves and clears. Cleared when the next frame is taken.
    dirty: AtomicBool,
    presented: parking_lot::Mutex<Presented>,
}

impl ViewportProjection {
    #[must_use]
    pub fn new(store: Arc<SceneStore>, proxy: Arc<dyn RenderProxy>) -> Self {
        Self {
            store,
            proxy,
            toggles: AtomicU8::new(RenderToggles::empty().bits()),
            dirty: AtomicBool::new(false),
            presented: parking_lot::Mutex::new(Presented {
                revision: None,
                toggles: RenderToggles::empty(),
            }),
        }
    }

    /// Current overlay state, the menu reads its checkmarks from here.
    #[must_use]
    pub fn toggles(&self) -> RenderToggles {
        RenderToggles::from_bits_truncate(self.toggles.load(Ordering::SeqCst))
    }

    /// Flips one overlay. Returns the state it ended up in.
    pub fn toggle(&self, mode: RenderToggles) -> bool {
        let before = self.toggles.fetch_xor(mode.bits(), Ordering::SeqCst);
        let now_on = !RenderToggles::from_bits_truncate(before).contains(mode);
        log::trace!("render toggle {mode:?} -> {now_on}");
        now_on
    }

    /// True when the surface shows something other than the current scene
    /// and toggles. Cheap enough to poll every tick.
    #[must_use]
    pub fn needs_redraw(&self) -> bool {
        if self.dirty.load(Ordering::SeqCst) {
            return true;
        }
        let presented = self.presented.lock();
        presented.revision != Some(self.store.revision()) || presented.toggles != self.toggles()
    }

    /// Starts a frame: clears the intent latch and captures the scene and
    /// toggles it should draw. An intent arriving after this call keeps
    /// [`Self::needs_redraw`] true for the frame after.
    #[must_use]
    pub fn take_frame(&self) -> FrameDescription {
        self.dirty.store(false, Ordering::SeqCst);
        FrameDescription {
            snapshot: self.store.snapshot(),
            toggles: self.toggles(),
        }
    }

    /// The frame made it to the surface.
    pub fn mark_presented(&self, frame: &FrameDescription) {
        let mut presented = self.presented.lock();
        presented.revision = Some(frame.snapshot.revision());
        presented.toggles = frame.toggles;
    }

    /// Frame the whole scene.
    pub fn go_home(&self) {
        self.proxy.frame_scene(self.store.snapshot().scene_bounds());
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Frame one object, usually in response to an outline activation.
    pub fn focus_object(&self, id: SceneID) {
        let snapshot = self.store.snapshot();
        if snapshot.forest().get(id).is_none() {
            // Intent from a stale tree, the object is already gone.
            log::trace!("focus on vanished node {id:?}");
            return;
        }
        self.proxy.frame_object(id, snapshot.forest().subtree_bounds(id));
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// The document was cleared, tell the device to let go of its resources.
    pub fn scene_cleared(&self) {
        if let Err(e) = self.proxy.scene_cleared() {
            log::warn!("render resource discard failed: {e:#}");
        }
        self.dirty.store(true, Ordering::SeqCst);
    }
}
