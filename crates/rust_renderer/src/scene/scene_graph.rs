//! Transform hierarchy
//!
//! Nodes live in a [`SlotMap`] arena and refer to each other by [`NodeId`].
//! A parent owns the ordered list of its children; the child's `parent` link
//! is a plain key and never keeps anything alive.
//!
//! World matrices are cached per node. Changing a local transform marks the
//! node and its whole subtree dirty; reading a world matrix recomputes only
//! the dirty part of the ancestor chain. Both walks are iterative so deep
//! hierarchies cannot overflow the stack.

use std::cell::Cell;
use std::sync::Arc;

use slotmap::{new_key_type, SlotMap};

use crate::foundation::math::{Mat4, Transform};
use crate::render::primitives::Mesh;
use crate::render::resources::materials::Material;

new_key_type! {
    /// Stable key of a node inside a [`SceneGraph`]
    pub struct NodeId;
}

/// Scene graph errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The key does not refer to a live node
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),

    /// Attaching would make a node its own ancestor
    #[error("attaching {child:?} under {parent:?} would create a cycle")]
    Cycle {
        /// Node being attached
        child: NodeId,
        /// Requested parent
        parent: NodeId,
    },
}

/// A single entry of the transform hierarchy
#[derive(Debug)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    local: Transform,
    world: Cell<Mat4>,
    dirty: Cell<bool>,
    mesh: Option<Arc<Mesh>>,
    material: Option<Arc<Material>>,
    visible: bool,
}

impl Node {
    fn new(name: String) -> Self {
        Self {
            name,
            parent: None,
            children: Vec::new(),
            local: Transform::identity(),
            world: Cell::new(Mat4::identity()),
            dirty: Cell::new(true),
            mesh: None,
            material: None,
            visible: true,
        }
    }

    /// Debug name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent key, `None` for roots and detached nodes
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in insertion order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Transform relative to the parent
    pub fn local_transform(&self) -> &Transform {
        &self.local
    }

    /// Shared mesh drawn at this node
    pub fn mesh(&self) -> Option<&Arc<Mesh>> {
        self.mesh.as_ref()
    }

    /// Shared material used for this node's mesh
    pub fn material(&self) -> Option<&Arc<Material>> {
        self.material.as_ref()
    }

    /// Own visibility flag (ancestors may still hide the node)
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether the cached world matrix must be recomputed
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }
}

/// Arena-backed transform hierarchy
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, Node>,
    roots: Vec<NodeId>,
}

impl SceneGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes, including detached ones
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the graph holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level nodes in insertion order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Whether `id` refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Look up a node
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Create a new root node
    pub fn create_node(&mut self, name: impl Into<String>) -> NodeId {
        let id = self.nodes.insert(Node::new(name.into()));
        self.roots.push(id);
        id
    }

    /// Create a new node as the last child of `parent`
    pub fn create_child(&mut self, parent: NodeId, name: impl Into<String>) -> Result<NodeId, SceneError> {
        if !self.contains(parent) {
            return Err(SceneError::UnknownNode(parent));
        }
        let id = self.nodes.insert(Node::new(name.into()));
        self.link(id, parent);
        Ok(id)
    }

    /// Attach `child` (and its subtree) as the last child of `parent`
    ///
    /// The child is unlinked from wherever it was first. Its subtree is marked
    /// dirty so the new ancestor chain is picked up on the next read.
    pub fn attach(&mut self, child: NodeId, parent: NodeId) -> Result<(), SceneError> {
        self.check(child)?;
        self.check(parent)?;
        if self.is_ancestor_or_self(child, parent) {
            return Err(SceneError::Cycle { child, parent });
        }
        self.unlink(child);
        self.link(child, parent);
        self.mark_subtree_dirty(child);
        Ok(())
    }

    /// Make `node` a root again
    pub fn attach_root(&mut self, node: NodeId) -> Result<(), SceneError> {
        self.check(node)?;
        self.unlink(node);
        self.roots.push(node);
        self.mark_subtree_dirty(node);
        Ok(())
    }

    /// Unlink `node` from its parent (or the root list) without destroying it
    ///
    /// Detached nodes are skipped by traversal and keep their last world
    /// matrix until they are attached again.
    pub fn detach(&mut self, node: NodeId) -> Result<(), SceneError> {
        self.check(node)?;
        self.unlink(node);
        Ok(())
    }

    /// Destroy `node` and its whole subtree, returning the number removed
    pub fn remove(&mut self, node: NodeId) -> Result<usize, SceneError> {
        self.check(node)?;
        self.unlink(node);

        let mut removed = 0;
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(entry) = self.nodes.remove(id) {
                stack.extend(entry.children);
                removed += 1;
            }
        }
        log::trace!("Removed {} scene nodes", removed);
        Ok(removed)
    }

    /// Replace the local transform and dirty the subtree
    pub fn set_local_transform(&mut self, node: NodeId, transform: Transform) -> Result<(), SceneError> {
        let entry = self.nodes.get_mut(node).ok_or(SceneError::UnknownNode(node))?;
        entry.local = transform;
        self.mark_subtree_dirty(node);
        Ok(())
    }

    /// Local transform of a node
    pub fn local_transform(&self, node: NodeId) -> Option<&Transform> {
        self.nodes.get(node).map(|n| &n.local)
    }

    /// Set the mesh drawn at `node`
    pub fn set_mesh(&mut self, node: NodeId, mesh: Option<Arc<Mesh>>) -> Result<(), SceneError> {
        self.nodes.get_mut(node).ok_or(SceneError::UnknownNode(node))?.mesh = mesh;
        Ok(())
    }

    /// Set the material used for `node`'s mesh
    pub fn set_material(&mut self, node: NodeId, material: Option<Arc<Material>>) -> Result<(), SceneError> {
        self.nodes.get_mut(node).ok_or(SceneError::UnknownNode(node))?.material = material;
        Ok(())
    }

    /// Show or hide `node` and everything below it
    pub fn set_visible(&mut self, node: NodeId, visible: bool) -> Result<(), SceneError> {
        self.nodes.get_mut(node).ok_or(SceneError::UnknownNode(node))?.visible = visible;
        Ok(())
    }

    /// World matrix of `node`, recomputing the dirty part of its ancestor chain
    pub fn world_matrix(&self, node: NodeId) -> Option<Mat4> {
        // Dirty nodes only have dirty descendants, so walk up until the first clean ancestor
        let mut chain = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let entry = self.nodes.get(id)?;
            if !entry.dirty.get() {
                break;
            }
            chain.push(id);
            current = entry.parent;
        }

        let mut parent_world = current
            .and_then(|id| self.nodes.get(id))
            .map_or_else(Mat4::identity, |n| n.world.get());

        for id in chain.into_iter().rev() {
            let Some(entry) = self.nodes.get(id) else { continue };
            parent_world *= entry.local.to_matrix();
            entry.world.set(parent_world);
            entry.dirty.set(false);
        }

        self.nodes.get(node).map(|n| n.world.get())
    }

    /// Visible attached nodes, depth-first, parents before children
    ///
    /// A hidden node hides its entire subtree.
    pub fn visible_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(entry) = self.nodes.get(id) else { continue };
            if !entry.visible {
                continue;
            }
            out.push(id);
            stack.extend(entry.children.iter().rev().copied());
        }
        out
    }

    /// Iterate over every live node, attached or not
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Find the first node with the given name
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|(_, n)| n.name == name).map(|(id, _)| id)
    }

    fn check(&self, id: NodeId) -> Result<(), SceneError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(SceneError::UnknownNode(id))
        }
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id).and_then(|n| n.parent);
        }
        false
    }

    fn link(&mut self, child: NodeId, parent: NodeId) {
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = Some(parent);
        }
    }

    fn unlink(&mut self, node: NodeId) {
        let parent = self.nodes.get_mut(node).and_then(|n| n.parent.take());
        match parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(parent) {
                    p.children.retain(|&c| c != node);
                }
            }
            None => self.roots.retain(|&r| r != node),
        }
    }

    fn mark_subtree_dirty(&self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(entry) = self.nodes.get(id) {
                entry.dirty.set(true);
                stack.extend_from_slice(&entry.children);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{constants::PI, Quat, Vec3};
    use approx::assert_relative_eq;

    fn chain(graph: &mut SceneGraph, depth: usize) -> Vec<NodeId> {
        let mut ids = vec![graph.create_node("n0")];
        for i in 1..depth {
            let parent = ids[i - 1];
            ids.push(graph.create_child(parent, format!("n{}", i)).unwrap());
        }
        ids
    }

    #[test]
    fn test_world_matrix_follows_parent_chain() {
        let mut graph = SceneGraph::new();
        let ids = chain(&mut graph, 4);

        let transforms = [
            Transform::from_position(Vec3::new(1.0, 0.0, 0.0)),
            Transform::from_position_rotation(Vec3::new(0.0, 2.0, 0.0), Quat::from_axis_angle(&Vec3::y_axis(), PI / 2.0)),
            Transform::from_position(Vec3::new(0.0, 0.0, 3.0)).with_scale(Vec3::new(2.0, 2.0, 2.0)),
            Transform::from_position(Vec3::new(1.0, 1.0, 1.0)),
        ];
        for (id, t) in ids.iter().zip(transforms.iter()) {
            graph.set_local_transform(*id, *t).unwrap();
        }

        for window in ids.windows(2) {
            let (parent, child) = (window[0], window[1]);
            let expected = graph.world_matrix(parent).unwrap() * graph.local_transform(child).unwrap().to_matrix();
            assert_relative_eq!(graph.world_matrix(child).unwrap(), expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_changing_ancestor_dirties_descendants() {
        let mut graph = SceneGraph::new();
        let ids = chain(&mut graph, 3);

        let before = graph.world_matrix(ids[2]).unwrap();
        assert!(!graph.node(ids[2]).unwrap().is_dirty());

        graph.set_local_transform(ids[0], Transform::from_position(Vec3::new(0.0, 5.0, 0.0))).unwrap();
        assert!(graph.node(ids[1]).unwrap().is_dirty());
        assert!(graph.node(ids[2]).unwrap().is_dirty());

        let after = graph.world_matrix(ids[2]).unwrap();
        assert_ne!(before, after);
        assert_relative_eq!(after.column(3)[1], 5.0);
        // Reading the leaf refreshed the whole chain
        assert!(!graph.node(ids[0]).unwrap().is_dirty());
        assert!(!graph.node(ids[1]).unwrap().is_dirty());
    }

    #[test]
    fn test_deep_hierarchy_does_not_recurse() {
        let mut graph = SceneGraph::new();
        let ids = chain(&mut graph, 10_000);
        graph.set_local_transform(ids[0], Transform::from_position(Vec3::new(1.0, 0.0, 0.0))).unwrap();

        let leaf = graph.world_matrix(*ids.last().unwrap()).unwrap();
        assert_relative_eq!(leaf.column(3)[0], 1.0);
    }

    #[test]
    fn test_detach_keeps_node_and_reattach_recomputes() {
        let mut graph = SceneGraph::new();
        let parent = graph.create_node("parent");
        let other = graph.create_node("other");
        let child = graph.create_child(parent, "child").unwrap();
        graph.set_local_transform(other, Transform::from_position(Vec3::new(0.0, 0.0, -4.0))).unwrap();

        graph.detach(child).unwrap();
        assert!(graph.contains(child));
        assert!(graph.node(parent).unwrap().children().is_empty());
        assert!(!graph.visible_nodes().contains(&child));

        graph.attach(child, other).unwrap();
        assert_eq!(graph.node(child).unwrap().parent(), Some(other));
        assert_relative_eq!(graph.world_matrix(child).unwrap().column(3)[2], -4.0);
    }

    #[test]
    fn test_attach_rejects_cycles() {
        let mut graph = SceneGraph::new();
        let ids = chain(&mut graph, 3);
        assert_eq!(
            graph.attach(ids[0], ids[2]),
            Err(SceneError::Cycle { child: ids[0], parent: ids[2] })
        );
        assert!(graph.attach(ids[1], ids[1]).is_err());
    }

    #[test]
    fn test_remove_destroys_subtree() {
        let mut graph = SceneGraph::new();
        let ids = chain(&mut graph, 3);
        let sibling = graph.create_node("sibling");

        assert_eq!(graph.remove(ids[1]).unwrap(), 2);
        assert!(!graph.contains(ids[2]));
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.visible_nodes(), vec![ids[0], sibling]);
        assert_eq!(graph.remove(ids[1]), Err(SceneError::UnknownNode(ids[1])));
    }

    #[test]
    fn test_visible_nodes_depth_first_and_hidden_subtrees() {
        let mut graph = SceneGraph::new();
        let a = graph.create_node("a");
        let a1 = graph.create_child(a, "a1").unwrap();
        let a1x = graph.create_child(a1, "a1x").unwrap();
        let a2 = graph.create_child(a, "a2").unwrap();
        let b = graph.create_node("b");

        assert_eq!(graph.visible_nodes(), vec![a, a1, a1x, a2, b]);

        graph.set_visible(a1, false).unwrap();
        assert_eq!(graph.visible_nodes(), vec![a, a2, b]);
        assert_eq!(graph.find_by_name("a1x"), Some(a1x));
    }
}
