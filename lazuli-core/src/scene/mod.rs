//! # Scene model
//! The object hierarchy loaded from city-model files. A [`SceneObject`] is one
//! node: display name, the feature class the reader recognized, an opaque
//! handle to geometry owned by the render side, and the file it came from.
//! Objects live in a [`SceneForest`] and are addressed by [`SceneID`].

mod forest;

pub use forest::{SceneForest, SceneID};

pub struct GeometryIDMarker;
/// Handle into the triangle/edge storage owned by the parsing and rendering
/// collaborators. The payload itself never passes through this crate.
pub type GeometryID = crate::LazID<GeometryIDMarker>;

/// Top-level feature classes the format readers report. Discriminants are the
/// values carried across the reader boundary.
#[derive(strum::AsRefStr, strum::EnumIter, PartialEq, Eq, Copy, Clone, Hash, Debug)]
#[repr(u8)]
pub enum Kind {
    Unknown = 0,
    Building = 1,
    Road = 2,
    WaterBody = 3,
    ReliefFeature = 4,
    PlantCover = 5,
    GenericCityObject = 6,
    Bridge = 7,
    LandUse = 8,
}
impl Default for Kind {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Axis-aligned bounding box in scene coordinates.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}
impl Bounds {
    /// Smallest box containing both.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        let mut min = self.min;
        let mut max = self.max;
        for axis in 0..3 {
            min[axis] = min[axis].min(other.min[axis]);
            max[axis] = max[axis].max(other.max[axis]);
        }
        Self { min, max }
    }
}

/// One node of the loaded hierarchy. Never mutated in place once inserted;
/// the browser and render sides only ever read it.
#[derive(Clone, Debug)]
pub struct SceneObject {
    pub name: String,
    pub kind: Kind,
    /// Geometry handle, or None for grouping nodes without geometry of their own.
    pub geometry: Option<GeometryID>,
    /// File this object was parsed from.
    pub source: std::sync::Arc<std::path::Path>,
    pub bounds: Option<Bounds>,
}
impl SceneObject {
    /// Row label: the parsed name, falling back to the kind for unnamed nodes.
    #[must_use]
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            self.kind.as_ref()
        } else {
            &self.name
        }
    }
}

/// A feature as a format reader describes it, before insertion. The loader
/// tags it with its source file and lands it in the store.
#[derive(Clone, Debug, Default)]
pub struct ParsedFeature {
    pub name: String,
    pub kind: Kind,
    pub geometry: Option<GeometryID>,
    pub bounds: Option<Bounds>,
    /// Nested features, in document order.
    pub children: Vec<ParsedFeature>,
}
impl ParsedFeature {
    /// Nodes in this subtree, the feature itself included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }
}
