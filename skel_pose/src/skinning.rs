//! Skinning matrices for transforming bind pose vertices to the current pose.
//!
//! Each matrix is `inverse(mesh_world) * bone_world * inverse_bind`.
//! Removing the mesh node's own transform keeps vertices correct
//! wherever the skinned mesh is placed in the scene.
use std::{fmt::Debug, hash::Hash};

use glam::Mat4;
use log::error;

use crate::{Pose, PoseTree, Skeleton};

/// Calculate the skinning matrix for a single bone.
///
/// # Panics
/// Panics if `bone_index` is out of range for `skeleton` or `pose`.
pub fn resolve(
    skeleton: &Skeleton,
    pose: &Pose,
    bone_index: usize,
    mesh_world_inverse: Mat4,
) -> Mat4 {
    let inverse_bind = skeleton.inverse_bind_matrices()[bone_index];
    mesh_world_inverse * pose.world_matrix(bone_index) * inverse_bind
}

/// The skinning matrix for each bone in a [Skeleton].
#[derive(Debug, Clone, PartialEq)]
pub struct Skinning {
    matrices: Vec<Mat4>,
    mesh_world: Option<Mat4>,
}

impl Skinning {
    pub fn new(skeleton: &Skeleton) -> Self {
        Self {
            matrices: vec![Mat4::IDENTITY; skeleton.bone_count()],
            mesh_world: None,
        }
    }

    /// Recalculate the matrices for the synced `pose`.
    ///
    /// The previous matrices are kept if the pose did not change
    /// and the mesh has not moved since the last update.
    /// Returns `true` if the matrices were recalculated.
    #[tracing::instrument(skip_all)]
    pub fn update(
        &mut self,
        skeleton: &Skeleton,
        pose: &Pose,
        pose_changed: bool,
        mesh_world: Mat4,
    ) -> bool {
        if !pose_changed && self.mesh_world == Some(mesh_world) {
            return false;
        }

        if !pose.is_pose_of(skeleton) {
            error!("Cannot calculate skinning matrices for a pose of a different skeleton.");
            return false;
        }

        // The mesh node transform may contain scale.
        let mesh_world_inverse = mesh_world.inverse();
        self.matrices.resize(skeleton.bone_count(), Mat4::IDENTITY);
        for (i, matrix) in self.matrices.iter_mut().enumerate() {
            *matrix = resolve(skeleton, pose, i, mesh_world_inverse);
        }
        self.mesh_world = Some(mesh_world);
        true
    }

    /// Recalculate the matrices for bones bound to nodes in `tree`.
    ///
    /// Unbound bones keep their previous matrix.
    #[tracing::instrument(skip_all)]
    pub fn update_from_tree<Id: Copy + Eq + Hash + Debug>(
        &mut self,
        skeleton: &Skeleton,
        tree: &PoseTree<Id>,
        mesh_world: Mat4,
    ) {
        let mesh_world_inverse = mesh_world.inverse();
        self.matrices.resize(skeleton.bone_count(), Mat4::IDENTITY);
        for bone_index in tree.ordered_bones() {
            match (
                tree.bone_global_matrix(*bone_index),
                skeleton.inverse_bind_matrix(*bone_index),
            ) {
                (Some(global), Some(inverse_bind)) => {
                    self.matrices[*bone_index] = mesh_world_inverse * global * inverse_bind;
                }
                _ => error!(
                    "Bone index {bone_index} out of range for length {}",
                    skeleton.bone_count()
                ),
            }
        }
        self.mesh_world = Some(mesh_world);
    }

    pub fn matrices(&self) -> &[Mat4] {
        &self.matrices
    }
}
