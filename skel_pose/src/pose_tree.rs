//! A copy of a scene hierarchy used to animate bones directly from scene nodes.
//!
//! Nodes that do not contribute to any bone can be marked invalid and
//! pruned so each update only visits the nodes needed to compose bone transforms.
use std::{fmt::Debug, hash::Hash};

use ahash::AHashMap;
use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3};
use log::warn;

use crate::{
    RigidTransform, Skeleton,
    error::JointNotFoundError,
    scene::{SceneGraph, pre_order},
    transform::{rigid_inverse, with_rotation, with_translation},
};

bitflags! {
    /// Overrides applied during the next [PoseTree::update].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct NodeStatus: u8 {
        const GLOBAL_POSITION = 1;
        const GLOBAL_ROTATION = 2;
        const LOCAL_TRANSFORM = 4;
    }
}

#[derive(Debug, Clone)]
struct TreeNode<Id> {
    id: Id,
    parent: Option<usize>,
    local: Mat4,
    global: Mat4,
    global_rotation: Quat,
    global_position: Vec3,
    status: NodeStatus,
    valid: bool,
    pruned: bool,
    bone_index: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PoseTree<Id> {
    nodes: Vec<TreeNode<Id>>,
    node_indices: AHashMap<Id, usize>,
    name_to_node: AHashMap<String, usize>,
    bone_to_node: AHashMap<usize, usize>,
    /// Bone indices in the order their nodes were visited.
    ordered_bones: Vec<usize>,
}

impl<Id> Default for PoseTree<Id> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            node_indices: AHashMap::new(),
            name_to_node: AHashMap::new(),
            bone_to_node: AHashMap::new(),
            ordered_bones: Vec::new(),
        }
    }
}

impl<Id: Copy + Eq + Hash + Debug> PoseTree<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree for `root` and all of its descendants.
    pub fn build<S: SceneGraph<NodeId = Id>>(scene: &S, root: Id, skeleton: &Skeleton) -> Self {
        let mut tree = Self::new();
        for node in pre_order(scene, root) {
            tree.visit(scene, node, skeleton);
        }
        tree
    }

    /// Add `node` to the tree below its parent if the parent was already visited.
    ///
    /// Nodes named after a bone in `skeleton` are bound to that bone.
    pub fn visit<S: SceneGraph<NodeId = Id>>(&mut self, scene: &S, node: Id, skeleton: &Skeleton) {
        if self.node_indices.contains_key(&node) {
            return;
        }

        let index = self.nodes.len();
        let parent = scene
            .parent(node)
            .and_then(|p| self.node_indices.get(&p).copied());
        let local = scene.local_transform(node).to_matrix();
        let global = match parent {
            Some(p) => self.nodes[p].global * local,
            None => local,
        };

        let name = scene.name(node);
        let mut bone_index = None;
        if !name.is_empty() {
            self.name_to_node.entry(name.to_string()).or_insert(index);

            if let Some(bone) = skeleton.bone_index(name) {
                if self.bone_to_node.contains_key(&bone) {
                    warn!("Bone {name:?} is already bound to a node. Ignoring node {node:?}.");
                } else {
                    self.bone_to_node.insert(bone, index);
                    self.ordered_bones.push(bone);
                    bone_index = Some(bone);
                }
            }
        }

        self.node_indices.insert(node, index);
        self.nodes.push(TreeNode {
            id: node,
            parent,
            local,
            global,
            global_rotation: Quat::IDENTITY,
            global_position: Vec3::ZERO,
            status: NodeStatus::empty(),
            valid: true,
            pruned: false,
            bone_index,
        });
    }

    fn node_index(&self, node: Id) -> Option<usize> {
        let index = self.node_indices.get(&node).copied();
        if index.is_none() {
            warn!("Node {node:?} is not part of the pose tree.");
        }
        index
    }

    /// Mark a node that does not need to be updated unless a descendant does.
    pub fn mark_invalid(&mut self, node: Id) {
        if let Some(i) = self.node_index(node) {
            self.nodes[i].valid = false;
        }
    }

    pub fn mark_valid(&mut self, node: Id) {
        if let Some(i) = self.node_index(node) {
            self.nodes[i].valid = true;
        }
    }

    /// Remove nodes that are invalid, unbound and have no kept descendants.
    ///
    /// Returns `true` if any node is kept.
    pub fn prune(&mut self) -> bool {
        let mut keep = vec![false; self.nodes.len()];
        // Children are always visited after their parents.
        for i in (0..self.nodes.len()).rev() {
            let node = &self.nodes[i];
            keep[i] |= node.valid || node.bone_index.is_some();
            if let Some(p) = node.parent.filter(|_| keep[i]) {
                keep[p] = true;
            }
        }

        for (node, keep) in self.nodes.iter_mut().zip(&keep) {
            node.pruned = !keep;
        }

        keep.contains(&true)
    }

    pub fn is_pruned(&self, node: Id) -> bool {
        self.node_indices
            .get(&node)
            .is_some_and(|i| self.nodes[*i].pruned)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The bound bone indices in the order their nodes were visited.
    pub fn ordered_bones(&self) -> &[usize] {
        &self.ordered_bones
    }

    pub fn global_matrix(&self, name: &str) -> Option<Mat4> {
        self.name_to_node.get(name).map(|i| self.nodes[*i].global)
    }

    pub fn local_matrix(&self, name: &str) -> Option<Mat4> {
        self.name_to_node.get(name).map(|i| self.nodes[*i].local)
    }

    /// The global transform of the node bound to a bone.
    pub fn bone_global_matrix(&self, bone_index: usize) -> Option<Mat4> {
        self.bone_to_node
            .get(&bone_index)
            .map(|i| self.nodes[*i].global)
    }

    fn named_node_mut(&mut self, name: &str) -> Result<&mut TreeNode<Id>, JointNotFoundError> {
        match self.name_to_node.get(name) {
            Some(i) => Ok(&mut self.nodes[*i]),
            None => Err(JointNotFoundError(name.to_string())),
        }
    }

    /// Use `rotation` instead of the scene node's rotation for the next update.
    pub fn update_local_rotation(
        &mut self,
        name: &str,
        rotation: Quat,
    ) -> Result<(), JointNotFoundError> {
        let node = self.named_node_mut(name)?;
        node.local = with_rotation(node.local, rotation.normalize());
        node.status.insert(NodeStatus::LOCAL_TRANSFORM);
        Ok(())
    }

    /// Use `position` instead of the scene node's translation for the next update.
    pub fn update_local_position(
        &mut self,
        name: &str,
        position: Vec3,
    ) -> Result<(), JointNotFoundError> {
        let node = self.named_node_mut(name)?;
        node.local = with_translation(node.local, position);
        node.status.insert(NodeStatus::LOCAL_TRANSFORM);
        Ok(())
    }

    pub fn update_local_matrix(
        &mut self,
        name: &str,
        matrix: Mat4,
    ) -> Result<(), JointNotFoundError> {
        let node = self.named_node_mut(name)?;
        node.local = RigidTransform::from_matrix(matrix).to_matrix();
        node.status.insert(NodeStatus::LOCAL_TRANSFORM);
        Ok(())
    }

    /// Replace the rotation of the node's global transform during the next update.
    pub fn update_global_rotation(
        &mut self,
        name: &str,
        rotation: Quat,
    ) -> Result<(), JointNotFoundError> {
        let node = self.named_node_mut(name)?;
        node.global_rotation = rotation.normalize();
        node.status.insert(NodeStatus::GLOBAL_ROTATION);
        Ok(())
    }

    /// Replace the translation of the node's global transform during the next update.
    pub fn update_global_position(
        &mut self,
        name: &str,
        position: Vec3,
    ) -> Result<(), JointNotFoundError> {
        let node = self.named_node_mut(name)?;
        node.global_position = position;
        node.status.insert(NodeStatus::GLOBAL_POSITION);
        Ok(())
    }

    /// Recompute the global transform of every kept node.
    pub fn update<S: SceneGraph<NodeId = Id>>(&mut self, scene: &S) {
        self.update_with_parent(scene, Mat4::IDENTITY);
    }

    /// Recompute the global transform of every kept node
    /// with `parent` as the transform of the tree's root nodes.
    #[tracing::instrument(skip_all)]
    pub fn update_with_parent<S: SceneGraph<NodeId = Id>>(&mut self, scene: &S, parent: Mat4) {
        for i in 0..self.nodes.len() {
            if self.nodes[i].pruned {
                continue;
            }

            let parent_global = match self.nodes[i].parent {
                Some(p) => self.nodes[p].global,
                None => parent,
            };

            let node = &mut self.nodes[i];
            if !node.status.contains(NodeStatus::LOCAL_TRANSFORM) {
                node.local = scene.local_transform(node.id).to_matrix();
            }

            let mut global = parent_global * node.local;
            if node.status.contains(NodeStatus::GLOBAL_ROTATION) {
                global = with_rotation(global, node.global_rotation);
            }
            if node.status.contains(NodeStatus::GLOBAL_POSITION) {
                global = with_translation(global, node.global_position);
            }
            if node
                .status
                .intersects(NodeStatus::GLOBAL_ROTATION | NodeStatus::GLOBAL_POSITION)
            {
                node.local = rigid_inverse(parent_global) * global;
            }

            node.global = global;
            node.status = NodeStatus::empty();
        }
    }
}
