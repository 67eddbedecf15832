//! The scene node hierarchy that skeletons are bound to.
//!
//! The engine never owns scene nodes. Renderers implement [SceneGraph]
//! for their own node storage, and [NodeTree] is a minimal implementation
//! for tools and tests.
use std::{fmt::Debug, hash::Hash};

use glam::Mat4;

use crate::RigidTransform;

/// Read and write access to a hierarchy of named nodes.
pub trait SceneGraph {
    type NodeId: Copy + Eq + Hash + Debug;

    fn name(&self, node: Self::NodeId) -> &str;

    fn parent(&self, node: Self::NodeId) -> Option<Self::NodeId>;

    fn children(&self, node: Self::NodeId) -> &[Self::NodeId];

    /// The transform of `node` relative to its parent.
    fn local_transform(&self, node: Self::NodeId) -> RigidTransform;

    fn set_local_transform(&mut self, node: Self::NodeId, transform: RigidTransform);

    /// The accumulated transform of `node` relative to the scene root.
    fn world_matrix(&self, node: Self::NodeId) -> Mat4;
}

/// Collect `root` and all of its descendants with parents before children.
pub fn pre_order<S: SceneGraph>(scene: &S, root: S::NodeId) -> Vec<S::NodeId> {
    let mut nodes = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        nodes.push(node);
        // Reverse to visit the first child first.
        stack.extend(scene.children(node).iter().rev().copied());
    }
    nodes
}

/// A simple arena of scene nodes indexed by `usize`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NodeTree {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub transform: RigidTransform,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its index.
    ///
    /// # Panics
    /// Panics if `parent` is not the index of an existing node.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        transform: RigidTransform,
        parent: Option<usize>,
    ) -> usize {
        let index = self.nodes.len();
        if let Some(parent) = parent {
            self.nodes[parent].children.push(index);
        }
        self.nodes.push(Node {
            name: name.into(),
            transform,
            parent,
            children: Vec::new(),
        });
        index
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl SceneGraph for NodeTree {
    type NodeId = usize;

    fn name(&self, node: usize) -> &str {
        &self.nodes[node].name
    }

    fn parent(&self, node: usize) -> Option<usize> {
        self.nodes[node].parent
    }

    fn children(&self, node: usize) -> &[usize] {
        &self.nodes[node].children
    }

    fn local_transform(&self, node: usize) -> RigidTransform {
        self.nodes[node].transform
    }

    fn set_local_transform(&mut self, node: usize, transform: RigidTransform) {
        self.nodes[node].transform = transform;
    }

    fn world_matrix(&self, node: usize) -> Mat4 {
        let mut transform = self.nodes[node].transform;
        let mut current = self.nodes[node].parent;
        while let Some(parent) = current {
            transform = self.nodes[parent].transform * transform;
            current = self.nodes[parent].parent;
        }
        transform.to_matrix()
    }
}
