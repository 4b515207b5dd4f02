//! Forest storage behind stable ids. `id_tree` backs the hierarchy, but its
//! `NodeId`s are invalidated by cloning the tree - and snapshots clone. So
//! every node also carries a process-unique [`SceneID`], glued to the tree ids
//! by a bidirectional map that the insert and clone paths keep in lockstep.

use std::sync::Arc;

use super::{Bounds, ParsedFeature, SceneObject};

// Raw id type behind SceneID.
type LazNodeID = crate::LazID<id_tree::NodeId>;

/// Stable address of one scene object. Survives snapshots and clones, unlike
/// the tree-internal ids it maps to.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct SceneID(LazNodeID);

// Tree payload. The root slot is structural and never escapes this module;
// its children are the document roots.
#[derive(Clone, Debug)]
enum Slot {
    Root,
    Object(SceneObject),
}

// SceneID <-> tree id glue.
#[derive(Default)]
struct IdMap {
    scene_to_tree: hashbrown::HashMap<LazNodeID, id_tree::NodeId>,
    tree_to_scene: hashbrown::HashMap<id_tree::NodeId, LazNodeID>,
}
impl IdMap {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            scene_to_tree: hashbrown::HashMap::with_capacity(capacity),
            tree_to_scene: hashbrown::HashMap::with_capacity(capacity),
        }
    }
    fn capacity(&self) -> usize {
        self.scene_to_tree
            .capacity()
            .max(self.tree_to_scene.capacity())
    }
    fn tree_id(&self, scene: SceneID) -> Option<&id_tree::NodeId> {
        self.scene_to_tree.get(&scene.0)
    }
    fn scene_id(&self, tree: &id_tree::NodeId) -> Option<SceneID> {
        self.tree_to_scene.get(tree).copied().map(SceneID)
    }
    fn insert_pair(&mut self, tree: id_tree::NodeId, scene: LazNodeID) {
        self.scene_to_tree.insert(scene, tree.clone());
        self.tree_to_scene.insert(tree, scene);
    }
}

/// Ordered forest of scene objects. Roots are the subtrees appended by file
/// loads, oldest first.
pub struct SceneForest {
    tree: id_tree::Tree<Slot>,
    ids: IdMap,
}

impl Default for SceneForest {
    fn default() -> Self {
        Self {
            tree: id_tree::TreeBuilder::new()
                .with_root(id_tree::Node::new(Slot::Root))
                .build(),
            ids: IdMap::default(),
        }
    }
}

impl SceneForest {
    fn root_id(&self) -> &id_tree::NodeId {
        // unwrap ok - built with a root, never torn down below it.
        self.tree.root_node_id().unwrap()
    }

    /// Top-level objects, in insertion order.
    pub fn roots(&self) -> impl Iterator<Item = (SceneID, &SceneObject)> + '_ {
        // unwrap ok - the root id is always live.
        self.children_of_raw(self.root_id()).unwrap()
    }

    /// Children of `id` in insertion order, or None if `id` is unknown.
    #[must_use]
    pub fn children_of(
        &self,
        id: SceneID,
    ) -> Option<impl Iterator<Item = (SceneID, &SceneObject)> + '_> {
        self.children_of_raw(self.ids.tree_id(id)?)
    }

    // Shared helper for all child iteration.
    fn children_of_raw<'s>(
        &'s self,
        node: &id_tree::NodeId,
    ) -> Option<impl Iterator<Item = (SceneID, &'s SceneObject)> + 's> {
        Some(self.tree.children_ids(node).ok()?.map(|child| {
            // unwrap ok - children_ids only yields live nodes.
            let object = match self.tree.get(child).unwrap().data() {
                Slot::Object(object) => object,
                Slot::Root => unreachable!("root as a child"),
            };
            let scene = self
                .ids
                .scene_id(child)
                .expect("unmapped node in iteration");
            (scene, object)
        }))
    }

    #[must_use]
    pub fn get(&self, id: SceneID) -> Option<&SceneObject> {
        match self.tree.get(self.ids.tree_id(id)?).ok()?.data() {
            Slot::Object(object) => Some(object),
            Slot::Root => None,
        }
    }

    /// Parent of `id`, or None when `id` is a root (or unknown).
    #[must_use]
    pub fn parent_of(&self, id: SceneID) -> Option<SceneID> {
        let tree_id = self.ids.tree_id(id)?;
        let parent = self.tree.get(tree_id).ok()?.parent()?;
        // The structural root has no SceneID - that is what makes its
        // children roots.
        self.ids.scene_id(parent)
    }

    /// Every object in the forest. Traversal order is not part of the contract.
    pub fn iter(&self) -> impl Iterator<Item = (SceneID, &SceneObject)> + '_ {
        self.tree
            .traverse_post_order_ids(self.root_id())
            // unwrap ok - the root id is always live.
            .unwrap()
            .filter_map(|tree_id| match self.tree.get(&tree_id).unwrap().data() {
                Slot::Object(object) => {
                    let scene = self
                        .ids
                        .scene_id(&tree_id)
                        .expect("unmapped node in iteration");
                    Some((scene, object))
                }
                // Structural, not an object.
                Slot::Root => None,
            })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots().next().is_none()
    }

    /// Union of bounds over `id` and all its descendants, for framing.
    #[must_use]
    pub fn subtree_bounds(&self, id: SceneID) -> Option<Bounds> {
        let tree_id = self.ids.tree_id(id)?;
        self.tree
            .traverse_pre_order(tree_id)
            .ok()?
            .filter_map(|node| match node.data() {
                Slot::Object(object) => object.bounds,
                Slot::Root => None,
            })
            .reduce(Bounds::union)
    }

    /// Appends `feature` and its nested children as the last root. Sibling
    /// order inside the subtree follows document order.
    pub fn insert_subtree(
        &mut self,
        feature: ParsedFeature,
        source: &Arc<std::path::Path>,
    ) -> SceneID {
        let mut fresh = LazNodeID::many(feature.node_count());
        let root_id = self.root_id().clone();
        let mut stack: smallvec::SmallVec<[(id_tree::NodeId, ParsedFeature); 8]> =
            smallvec::smallvec![(root_id, feature)];
        let mut inserted_root = None;
        while let Some((parent, feature)) = stack.pop() {
            let ParsedFeature {
                name,
                kind,
                geometry,
                bounds,
                children,
            } = feature;
            let node = id_tree::Node::new(Slot::Object(SceneObject {
                name,
                kind,
                geometry,
                source: Arc::clone(source),
                bounds,
            }));
            let tree_id = self
                .tree
                .insert(node, id_tree::InsertBehavior::UnderNode(&parent))
                // unwrap ok - parents come from this loop or the root, both live.
                .unwrap();
            // unwrap ok - `many` was sized by node_count.
            let scene = fresh.next().unwrap();
            self.ids.insert_pair(tree_id.clone(), scene);
            inserted_root.get_or_insert(SceneID(scene));
            // LIFO stack: push children reversed so left-to-right document
            // order survives append-as-last-child insertion.
            stack.extend(
                children
                    .into_iter()
                    .rev()
                    .map(|child| (tree_id.clone(), child)),
            );
        }
        // unwrap ok - the loop ran at least once, a feature contains itself.
        inserted_root.unwrap()
    }
}

/// Expensive clone impl! id_tree issues fresh `NodeId`s for a cloned tree, so
/// the stable map is rebuilt by zipping matching post-order traversals of the
/// original and the clone.
impl Clone for SceneForest {
    fn clone(&self) -> Self {
        let tree = self.tree.clone();
        let mut ids = IdMap::with_capacity(self.ids.capacity());

        self.tree
            .traverse_post_order_ids(self.root_id())
            // unwrap ok - the root id is always live.
            .unwrap()
            .zip(
                tree.traverse_post_order_ids(tree.root_node_id().unwrap())
                    .unwrap(),
            )
            .for_each(|(original, cloned)| {
                if let Some(SceneID(raw)) = self.ids.scene_id(&original) {
                    ids.insert_pair(cloned, raw);
                }
            });
        Self { tree, ids }
    }
}
