//! # Loading
//! Ingestion pipeline: paths in, scene roots out. Parsing belongs to a
//! [`FeatureParser`] supplied by the embedding shell (the markup formats are
//! not this crate's business). The loader fans a request out over the thread
//! pool, keeps per-file failures from poisoning the rest, and lands every
//! success in the store as a single insertion.

use std::sync::Arc;

use rayon::prelude::*;

use crate::scene::ParsedFeature;
use crate::store::SceneStore;

/// File extensions an open dialog should admit.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["gml", "xml"];

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported file extension")]
    UnsupportedExtension,
    #[error("malformed document: {0}")]
    Malformed(String),
}

/// Boundary to the external format readers. One call per file, no store
/// access - implementations only describe what a file contains.
pub trait FeatureParser: Send + Sync {
    fn parse(&self, path: &std::path::Path) -> Result<Vec<ParsedFeature>, ParseError>;
}

/// Mirror for a determinate progress indicator. Calls arrive from worker
/// threads.
pub trait LoadProgress: Send + Sync {
    fn begin(&self, total_files: usize);
    fn file_done(&self, path: &std::path::Path);
    fn finish(&self);
}

/// One file the loader gave up on. The rest of its batch is unaffected.
#[derive(Debug)]
pub struct LoadFailure {
    pub path: Arc<std::path::Path>,
    pub error: ParseError,
}

/// What one [`Loader::load`] call accomplished.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// Files parsed and merged, in request order.
    pub loaded: Vec<Arc<std::path::Path>>,
    /// Files skipped, in request order, for user reporting.
    pub failures: Vec<LoadFailure>,
}
impl LoadOutcome {
    #[must_use]
    pub fn any_success(&self) -> bool {
        !self.loaded.is_empty()
    }
}

pub struct Loader {
    store: Arc<SceneStore>,
    parser: Arc<dyn FeatureParser>,
    progress: Option<Arc<dyn LoadProgress>>,
}

impl Loader {
    #[must_use]
    pub fn new(store: Arc<SceneStore>, parser: Arc<dyn FeatureParser>) -> Self {
        Self {
            store,
            parser,
            progress: None,
        }
    }
    /// Attach a progress mirror.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn LoadProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Parses `paths` on the thread pool and merges every success into the
    /// store as one batch, in request order, after whatever is already there.
    /// Failed files are logged, skipped and reported in the outcome.
    pub fn load(&self, paths: Vec<std::path::PathBuf>) -> LoadOutcome {
        if paths.is_empty() {
            // A cancelled open dialog lands here.
            log::trace!("load requested with no files");
            return LoadOutcome::default();
        }
        if let Some(progress) = &self.progress {
            progress.begin(paths.len());
        }
        // Parallel parse; collect keeps request order.
        let parsed: Vec<(Arc<std::path::Path>, Result<Vec<ParsedFeature>, ParseError>)> = paths
            .into_par_iter()
            .map(|path| {
                let path: Arc<std::path::Path> = path.into();
                let result = check_extension(&path).and_then(|()| self.parser.parse(&path));
                if let Some(progress) = &self.progress {
                    progress.file_done(&path);
                }
                (path, result)
            })
            .collect();
        if let Some(progress) = &self.progress {
            progress.finish();
        }

        let mut outcome = LoadOutcome::default();
        let mut batch = Vec::with_capacity(parsed.len());
        for (path, result) in parsed {
            match result {
                Ok(features) => {
                    outcome.loaded.push(Arc::clone(&path));
                    batch.push((path, features));
                }
                Err(error) => {
                    log::error!("failed to open file {path:?}: {error}");
                    outcome.failures.push(LoadFailure { path, error });
                }
            }
        }
        // One merge per call: readers see the whole batch appear at once.
        self.store.insert_roots(batch);
        outcome
    }
}

fn check_extension(path: &std::path::Path) -> Result<(), ParseError> {
    let supported = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        });
    if supported {
        Ok(())
    } else {
        Err(ParseError::UnsupportedExtension)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scene::Kind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Turns any path whose stem is not "broken" into one building named after
    // the stem.
    struct StubParser {
        calls: AtomicUsize,
    }
    impl StubParser {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }
    impl FeatureParser for StubParser {
        fn parse(&self, path: &std::path::Path) -> Result<Vec<ParsedFeature>, ParseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let stem = path
                .file_stem()
                .and_then(std::ffi::OsStr::to_str)
                .unwrap_or_default();
            if stem == "broken" {
                return Err(ParseError::Malformed("stub refuses".to_owned()));
            }
            Ok(vec![ParsedFeature {
                name: stem.to_owned(),
                kind: Kind::Building,
                ..Default::default()
            }])
        }
    }

    fn paths(names: &[&str]) -> Vec<std::path::PathBuf> {
        names.iter().map(std::path::PathBuf::from).collect()
    }

    fn root_names(store: &SceneStore) -> Vec<String> {
        store
            .snapshot()
            .forest()
            .roots()
            .map(|(_, object)| object.name.clone())
            .collect()
    }

    #[test]
    fn partial_failure_keeps_the_rest() {
        let store = Arc::new(SceneStore::new());
        let loader = Loader::new(Arc::clone(&store), StubParser::new());
        let outcome = loader.load(paths(&["a.gml", "broken.gml", "c.xml"]));

        assert_eq!(outcome.loaded.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].path.ends_with("broken.gml"));

        assert_eq!(root_names(&store), ["a", "c"]);
        // Failed files never join the document identity.
        assert_eq!(store.snapshot().files().len(), 2);
    }

    #[test]
    fn order_follows_requests() {
        let store = Arc::new(SceneStore::new());
        let loader = Loader::new(Arc::clone(&store), StubParser::new());
        loader.load(paths(&["b.gml"]));
        loader.load(paths(&["a.gml", "c.gml"]));
        assert_eq!(root_names(&store), ["b", "a", "c"]);
    }

    #[test]
    fn unsupported_extension_skips_parser() {
        let store = Arc::new(SceneStore::new());
        let parser = StubParser::new();
        let loader = Loader::new(Arc::clone(&store), Arc::clone(&parser) as _);
        let outcome = loader.load(paths(&["notes.txt"]));

        assert!(matches!(
            outcome.failures[0].error,
            ParseError::UnsupportedExtension
        ));
        assert_eq!(parser.calls.load(Ordering::SeqCst), 0);
        // The store saw nothing.
        assert_eq!(store.revision().get(), 0);
    }

    #[test]
    fn progress_mirrors_the_batch() {
        #[derive(Default)]
        struct CountingProgress {
            begun_with: AtomicUsize,
            files: AtomicUsize,
            finished: AtomicUsize,
        }
        impl LoadProgress for CountingProgress {
            fn begin(&self, total_files: usize) {
                self.begun_with.store(total_files, Ordering::SeqCst);
            }
            fn file_done(&self, _path: &std::path::Path) {
                self.files.fetch_add(1, Ordering::SeqCst);
            }
            fn finish(&self) {
                self.finished.fetch_add(1, Ordering::SeqCst);
            }
        }

        let progress = Arc::new(CountingProgress::default());
        let store = Arc::new(SceneStore::new());
        let loader =
            Loader::new(store, StubParser::new()).with_progress(Arc::clone(&progress) as _);
        let _ = loader.load(paths(&["a.gml", "b.gml", "broken.gml"]));

        assert_eq!(progress.begun_with.load(Ordering::SeqCst), 3);
        // Failed files still count as done, the bar must reach the end.
        assert_eq!(progress.files.load(Ordering::SeqCst), 3);
        assert_eq!(progress.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_request_is_silent() {
        let store = Arc::new(SceneStore::new());
        let loader = Loader::new(Arc::clone(&store), StubParser::new());
        let outcome = loader.load(Vec::new());
        assert!(!outcome.any_success());
        assert!(outcome.failures.is_empty());
        assert_eq!(store.revision().get(), 0);
    }
}
