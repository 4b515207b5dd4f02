//! # Scene store
//! Single source of truth for the open document. One writer at a time, any
//! number of readers through [`SceneSnapshot`]s that stay coherent while the
//! store moves on. A monotonic [`Revision`] lets both projections detect
//! staleness with a cheap poll instead of subscribing to pushed events.

use std::sync::Arc;

use crate::scene::{Bounds, ParsedFeature, SceneForest};

/// Open-file set. Set semantics: re-opening a path adds nothing here.
pub type FileSet = hashbrown::HashSet<Arc<std::path::Path>>;

/// Store generation counter. Strictly increases on every structural mutation,
/// never on reads; readers compare against their last seen value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);
impl Revision {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
    fn bump(&mut self) {
        self.0 += 1;
    }
}

struct Inner {
    forest: Arc<SceneForest>,
    files: Arc<FileSet>,
    revision: Revision,
}

/// Owner of the scene forest and the open-file set.
pub struct SceneStore {
    inner: parking_lot::RwLock<Inner>,
}

impl Default for SceneStore {
    fn default() -> Self {
        Self {
            inner: parking_lot::RwLock::new(Inner {
                forest: Arc::new(SceneForest::default()),
                files: Arc::new(FileSet::default()),
                revision: Revision::default(),
            }),
        }
    }
}

impl SceneStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current revision, for staleness checks. O(1).
    #[must_use]
    pub fn revision(&self) -> Revision {
        self.inner.read().revision
    }

    /// Coherent view of the current contents. Shares storage with the store
    /// until the next mutation, so taking one is cheap.
    #[must_use]
    pub fn snapshot(&self) -> SceneSnapshot {
        let read = self.inner.read();
        SceneSnapshot {
            forest: Arc::clone(&read.forest),
            files: Arc::clone(&read.files),
            revision: read.revision,
        }
    }

    /// Empties the forest and the open-file set. Always a mutation, so the
    /// revision always bumps. Live snapshots keep the old contents.
    pub fn reset(&self) {
        let mut write = self.inner.write();
        write.forest = Arc::new(SceneForest::default());
        write.files = Arc::new(FileSet::default());
        write.revision.bump();
        log::trace!("store reset, revision {}", write.revision.get());
    }

    /// Appends each file's features as new roots, in batch order, and unions
    /// the paths into the open-file set. One revision bump for the whole
    /// batch, however many objects it lands. Re-opened paths append their
    /// roots again while the file set gains nothing; a batch bringing neither
    /// new files nor objects is a silent no-op.
    pub fn insert_roots(&self, batch: Vec<(Arc<std::path::Path>, Vec<ParsedFeature>)>) {
        let mut write = self.inner.write();
        let adds_anything = batch
            .iter()
            .any(|(path, features)| !features.is_empty() || !write.files.contains(path));
        if !adds_anything {
            log::trace!("insertion adds no files and no objects, revision unchanged");
            return;
        }
        let Inner {
            forest,
            files,
            revision,
        } = &mut *write;
        // Clone-on-write: a deep copy happens only if a snapshot still holds
        // the current storage.
        let forest = Arc::make_mut(forest);
        let files = Arc::make_mut(files);
        for (path, features) in batch {
            files.insert(Arc::clone(&path));
            for feature in features {
                forest.insert_subtree(feature, &path);
            }
        }
        revision.bump();
        log::trace!("insertion merged, revision {}", revision.get());
    }
}

/// Frozen view of the store. Cheap to clone, safe to hold for a whole frame
/// or browser reload; the store mutating underneath never tears it.
#[derive(Clone)]
pub struct SceneSnapshot {
    forest: Arc<SceneForest>,
    files: Arc<FileSet>,
    revision: Revision,
}

impl SceneSnapshot {
    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }
    #[must_use]
    pub fn forest(&self) -> &SceneForest {
        &self.forest
    }
    #[must_use]
    pub fn files(&self) -> &FileSet {
        &self.files
    }
    /// Union of every object's bounds, for whole-scene framing.
    #[must_use]
    pub fn scene_bounds(&self) -> Option<Bounds> {
        self.forest
            .iter()
            .filter_map(|(_, object)| object.bounds)
            .reduce(Bounds::union)
    }
}
