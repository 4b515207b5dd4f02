//! # Session
//! One open window. [`SessionController`] wires the store, loader, and the
//! two projections together and derives the chrome the shell paints verbatim:
//! title, represented path, sidebar state, menu checkmarks. It owns no scene
//! data itself, everything is re-derived from the store on demand.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::load::{FeatureParser, LoadOutcome, LoadProgress, Loader};
use crate::outline::OutlinePresenter;
use crate::scene::SceneID;
use crate::store::SceneStore;
use crate::viewport::{RenderProxy, RenderToggles, ViewportProjection};

/// Window title while no single file represents the document.
pub const DEFAULT_TITLE: &str = "Lazuli";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DocumentState {
    /// No file contributed anything yet. `New Document` returns here.
    Empty,
    /// At least one file is open.
    Loaded,
}

pub struct SessionController {
    store: Arc<SceneStore>,
    loader: Arc<Loader>,
    outline: Arc<OutlinePresenter>,
    // None when no render device exists. Everything but the 3d preview
    // keeps working.
    viewport: Option<Arc<ViewportProjection>>,
    focus_intents: crossbeam::channel::Receiver<SceneID>,
    load_tx: crossbeam::channel::Sender<LoadOutcome>,
    load_rx: crossbeam::channel::Receiver<LoadOutcome>,
    sidebar_visible: AtomicBool,
}

impl SessionController {
    #[must_use]
    pub fn new(
        parser: Arc<dyn FeatureParser>,
        proxy: Option<Arc<dyn RenderProxy>>,
        progress: Option<Arc<dyn LoadProgress>>,
    ) -> Self {
        let store = Arc::new(SceneStore::new());

        let mut loader = Loader::new(Arc::clone(&store), parser);
        if let Some(progress) = progress {
            loader = loader.with_progress(progress);
        }

        let (focus_tx, focus_intents) = crossbeam::channel::unbounded();
        let outline = Arc::new(OutlinePresenter::new(Arc::clone(&store), focus_tx));

        let viewport = match proxy {
            Some(proxy) => Some(Arc::new(ViewportProjection::new(Arc::clone(&store), proxy))),
            None => {
                log::warn!("no render device available, continuing without 3d preview");
                None
            }
        };

        let (load_tx, load_rx) = crossbeam::channel::unbounded();

        Self {
            store,
            loader: Arc::new(loader),
            outline,
            viewport,
            focus_intents,
            load_tx,
            load_rx,
            sidebar_visible: AtomicBool::new(true),
        }
    }

    /// `File > New`. Clears the scene and lets the render side drop its
    /// resources.
    pub fn new_document(&self) {
        self.store.reset();
        if let Some(viewport) = &self.viewport {
            viewport.scene_cleared();
        }
        self.outline.refresh();
    }

    /// `File > Open`. Parses off the caller's thread, the outcome surfaces
    /// through [`Self::pump`]. An empty list is a cancelled picker and does
    /// nothing.
    pub fn open_files(&self, paths: Vec<std::path::PathBuf>) {
        if paths.is_empty() {
            return;
        }
        let loader = Arc::clone(&self.loader);
        let done = self.load_tx.clone();
        rayon::spawn(move || {
            let outcome = loader.load(paths);
            if done.send(outcome).is_err() {
                log::warn!("load finished after controller shutdown");
            }
        });
    }

    /// [`Self::open_files`] on the current thread. For callers with nothing
    /// better to do while parsing.
    pub fn open_files_blocking(&self, paths: Vec<std::path::PathBuf>) -> LoadOutcome {
        let outcome = self.loader.load(paths);
        self.outline.refresh();
        outcome
    }

    /// Drains finished loads and queued activations. Call from the shell's
    /// tick, between frames.
    pub fn pump(&self) -> Vec<LoadOutcome> {
        let outcomes: Vec<_> = self.load_rx.try_iter().collect();
        if !outcomes.is_empty() {
            self.outline.refresh();
        }
        for node in self.focus_intents.try_iter() {
            match &self.viewport {
                Some(viewport) => viewport.focus_object(node),
                None => log::trace!("focus intent ignored, no render surface"),
            }
        }
        outcomes
    }

    /// `View > Home`.
    pub fn go_home(&self) {
        if let Some(viewport) = &self.viewport {
            viewport.go_home();
        }
    }

    /// Flips a render overlay. Returns the state it ended up in, always off
    /// without a render device.
    pub fn toggle(&self, mode: RenderToggles) -> bool {
        self.viewport.as_ref().is_some_and(|v| v.toggle(mode))
    }

    /// Checkmark state for the view menu.
    #[must_use]
    pub fn render_toggles(&self) -> RenderToggles {
        self.viewport
            .as_ref()
            .map_or_else(RenderToggles::empty, |v| v.toggles())
    }

    /// Returns the new visibility.
    pub fn toggle_sidebar(&self) -> bool {
        !self.sidebar_visible.fetch_xor(true, Ordering::SeqCst)
    }
    #[must_use]
    pub fn sidebar_visible(&self) -> bool {
        self.sidebar_visible.load(Ordering::SeqCst)
    }
    #[must_use]
    pub fn sidebar_caption(&self) -> &'static str {
        if self.sidebar_visible() {
            "Hide Sidebar"
        } else {
            "Show Sidebar"
        }
    }

    #[must_use]
    pub fn document_state(&self) -> DocumentState {
        if self.store.snapshot().files().is_empty() {
            DocumentState::Empty
        } else {
            DocumentState::Loaded
        }
    }

    /// Window title. The file's name when exactly one is open, the app name
    /// otherwise.
    #[must_use]
    pub fn title(&self) -> String {
        self.single_file()
            .and_then(|file| {
                file.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| DEFAULT_TITLE.to_owned())
    }

    /// Path the window proxies for, drag targets and such. Only a
    /// single-file document represents one.
    #[must_use]
    pub fn represented_path(&self) -> Option<Arc<std::path::Path>> {
        self.single_file()
    }

    fn single_file(&self) -> Option<Arc<std::path::Path>> {
        let snapshot = self.store.snapshot();
        let files = snapshot.files();
        if files.len() == 1 {
            // unwrap ok - length was just checked.
            Some(Arc::clone(files.iter().next().unwrap()))
        } else {
            None
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SceneStore> {
        &self.store
    }
    #[must_use]
    pub fn outline(&self) -> &Arc<OutlinePresenter> {
        &self.outline
    }
    #[must_use]
    pub fn viewport(&self) -> Option<&Arc<ViewportProjection>> {
        self.viewport.as_ref()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::load::ParseError;
    use crate::outline::{ActivationSink, TreeDataSource};
    use crate::scene::{Bounds, Kind, ParsedFeature};
    use std::sync::atomic::AtomicUsize;

    struct StubParser;
    impl FeatureParser for StubParser {
        fn parse(&self, path: &std::path::Path) -> Result<Vec<ParsedFeature>, ParseError> {
            let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
            if stem == "broken" {
                return Err(ParseError::Malformed("no features".to_owned()));
            }
            Ok(vec![ParsedFeature {
                name: stem,
                kind: Kind::Building,
                bounds: Some(Bounds {
                    min: [0.0; 3],
                    max: [1.0; 3],
                }),
                ..Default::default()
            }])
        }
    }

    #[derive(Default)]
    struct StubProxy {
        cleared: AtomicUsize,
        scene_frames: AtomicUsize,
        object_frames: AtomicUsize,
    }
    impl RenderProxy for StubProxy {
        fn scene_cleared(&self) -> anyhow::Result<()> {
            self.cleared.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn frame_scene(&self, _bounds: Option<Bounds>) {
            self.scene_frames.fetch_add(1, Ordering::SeqCst);
        }
        fn frame_object(&self, _id: SceneID, _bounds: Option<Bounds>) {
            self.object_frames.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn controller() -> (SessionController, Arc<StubProxy>) {
        let proxy = Arc::new(StubProxy::default());
        let controller =
            SessionController::new(Arc::new(StubParser), Some(Arc::clone(&proxy) as _), None);
        (controller, proxy)
    }

    fn present_once(controller: &SessionController) {
        let viewport = controller.viewport().unwrap();
        let frame = viewport.take_frame();
        viewport.mark_presented(&frame);
    }

    #[test]
    fn open_then_open_then_new() {
        let (controller, proxy) = controller();
        assert_eq!(controller.document_state(), DocumentState::Empty);
        assert_eq!(controller.title(), DEFAULT_TITLE);
        assert_eq!(controller.represented_path(), None);

        // One file: the window speaks for it.
        let outcome = controller.open_files_blocking(vec!["a.gml".into()]);
        assert!(outcome.any_success());
        assert_eq!(controller.document_state(), DocumentState::Loaded);
        assert_eq!(controller.title(), "a.gml");
        assert_eq!(
            controller.represented_path().as_deref(),
            Some(std::path::Path::new("a.gml"))
        );
        assert!(controller.viewport().unwrap().needs_redraw());
        present_once(&controller);
        assert!(!controller.viewport().unwrap().needs_redraw());

        // Several files: back to the app name.
        controller.open_files_blocking(vec!["b.gml".into(), "c.xml".into()]);
        assert_eq!(controller.title(), DEFAULT_TITLE);
        assert_eq!(controller.represented_path(), None);
        assert_eq!(controller.outline().child_count(None), 3);
        assert!(controller.viewport().unwrap().needs_redraw());
        present_once(&controller);

        controller.new_document();
        assert_eq!(controller.document_state(), DocumentState::Empty);
        assert_eq!(controller.title(), DEFAULT_TITLE);
        assert_eq!(controller.represented_path(), None);
        assert_eq!(controller.outline().child_count(None), 0);
        assert_eq!(proxy.cleared.load(Ordering::SeqCst), 1);
        assert!(controller.viewport().unwrap().needs_redraw());
    }

    #[test]
    fn failures_are_reported_not_fatal() {
        let (controller, _proxy) = controller();
        let outcome = controller.open_files_blocking(vec![
            "a.gml".into(),
            "broken.gml".into(),
            "c.gml".into(),
        ]);
        assert!(outcome.any_success());
        assert_eq!(outcome.loaded.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(
            outcome.failures[0].path.as_ref(),
            std::path::Path::new("broken.gml")
        );
        assert_eq!(controller.document_state(), DocumentState::Loaded);
        assert_eq!(controller.outline().child_count(None), 2);
    }

    #[test]
    fn async_open_surfaces_through_pump() {
        let (controller, _proxy) = controller();
        controller.open_files(vec!["a.gml".into()]);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let mut outcomes = Vec::new();
        while outcomes.is_empty() {
            assert!(std::time::Instant::now() < deadline, "load never finished");
            outcomes.extend(controller.pump());
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].any_success());
        // pump refreshed the outline on the way out.
        assert_eq!(controller.outline().child_count(None), 1);
    }

    #[test]
    fn activation_reaches_the_render_side() {
        let (controller, proxy) = controller();
        controller.open_files_blocking(vec!["a.gml".into()]);

        let node = controller.outline().child_at(None, 0).unwrap();
        controller.outline().handle_activation(node);
        // Queued, not delivered, until the next tick.
        assert_eq!(proxy.object_frames.load(Ordering::SeqCst), 0);
        controller.pump();
        assert_eq!(proxy.object_frames.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn degraded_mode_without_render_device() {
        let controller = SessionController::new(Arc::new(StubParser), None, None);
        let outcome = controller.open_files_blocking(vec!["a.gml".into()]);
        assert!(outcome.any_success());
        assert_eq!(controller.document_state(), DocumentState::Loaded);
        assert!(controller.viewport().is_none());
        assert!(!controller.toggle(RenderToggles::EDGES));
        assert_eq!(controller.render_toggles(), RenderToggles::empty());
        controller.go_home();

        // Activations drain harmlessly.
        let node = controller.outline().child_at(None, 0).unwrap();
        controller.outline().handle_activation(node);
        controller.pump();

        controller.new_document();
        assert_eq!(controller.document_state(), DocumentState::Empty);
    }

    #[test]
    fn sidebar_toggle_is_layout_only() {
        let (controller, _proxy) = controller();
        let before = controller.store().revision();
        assert!(controller.sidebar_visible());
        assert_eq!(controller.sidebar_caption(), "Hide Sidebar");
        assert!(!controller.toggle_sidebar());
        assert_eq!(controller.sidebar_caption(), "Show Sidebar");
        assert!(controller.toggle_sidebar());
        assert_eq!(controller.store().revision(), before);
    }

    #[test]
    fn reset_after_load_wins() {
        let (controller, _proxy) = controller();
        controller.open_files_blocking(vec!["a.gml".into()]);
        controller.new_document();
        assert_eq!(controller.document_state(), DocumentState::Empty);
        assert_eq!(controller.outline().child_count(None), 0);

        // A load finishing after the reset repopulates, latest completion
        // wins either way.
        controller.open_files_blocking(vec!["b.gml".into()]);
        assert_eq!(controller.document_state(), DocumentState::Loaded);
        assert_eq!(controller.title(), "b.gml");
    }
}
