//! Per bone rotations and positions for a [Skeleton].
//!
//! Writes are recorded with [Dirty] flags and only combined with the hierarchy
//! during [Pose::sync]. Local and world values may be written in any order.
//! For each bone, the most recent write wins over pending writes to the other
//! representation.
use std::sync::Arc;

use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3};
use log::{debug, error, warn};

use crate::{RigidTransform, Skeleton, error::IncompatibleSkeletonError, skeleton::Hierarchy};

/// The coordinate space of the rotations in a [Pose].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PoseSpace {
    /// Rotations are deltas applied on top of the skeleton's bind pose.
    BindPoseRelative,
    /// World values are relative to the skeleton root.
    #[default]
    Skeleton,
    /// The pose of the mesh when it was bound to the skeleton.
    BindPose,
}

bitflags! {
    /// Pending writes for a bone that have not been resolved by [Pose::sync].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Dirty: u8 {
        const LOCAL_ROTATION = 1;
        const LOCAL_POSITION = 2;
        const WORLD_ROTATION = 4;
        const WORLD_POSITION = 8;
        const LOCAL = Self::LOCAL_ROTATION.bits() | Self::LOCAL_POSITION.bits();
        const WORLD = Self::WORLD_ROTATION.bits() | Self::WORLD_POSITION.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PoseBone {
    local: RigidTransform,
    world: RigidTransform,
    dirty: Dirty,
    /// Recomputed during the current sync pass.
    updated: bool,
}

impl Default for PoseBone {
    fn default() -> Self {
        Self {
            local: RigidTransform::IDENTITY,
            world: RigidTransform::IDENTITY,
            dirty: Dirty::empty(),
            updated: false,
        }
    }
}

/// A set of bone transforms for a particular [Skeleton].
///
/// Reads never sync implicitly.
/// Call [Pose::sync] after writing to make local and world values consistent.
#[derive(Debug, Clone)]
pub struct Pose {
    hierarchy: Arc<Hierarchy>,
    space: PoseSpace,
    bones: Vec<PoseBone>,
    needs_sync: bool,
}

impl Pose {
    /// Create a pose with identity rotations and zero positions for every bone.
    pub fn new(skeleton: &Skeleton, space: PoseSpace) -> Self {
        Self::from_hierarchy(skeleton.hierarchy().clone(), space)
    }

    pub(crate) fn from_hierarchy(hierarchy: Arc<Hierarchy>, space: PoseSpace) -> Self {
        let bones = vec![PoseBone::default(); hierarchy.len()];
        Self {
            hierarchy,
            space,
            bones,
            needs_sync: false,
        }
    }

    pub fn space(&self) -> PoseSpace {
        self.space
    }

    pub(crate) fn set_space(&mut self, space: PoseSpace) {
        self.space = space;
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// Returns `true` if there are writes not yet resolved by [Pose::sync].
    pub fn needs_sync(&self) -> bool {
        self.needs_sync
    }

    /// Returns `true` if both poses were created for the same skeleton.
    pub fn is_compatible(&self, other: &Pose) -> bool {
        Arc::ptr_eq(&self.hierarchy, &other.hierarchy)
    }

    pub fn is_pose_of(&self, skeleton: &Skeleton) -> bool {
        Arc::ptr_eq(&self.hierarchy, skeleton.hierarchy())
    }

    pub fn is_root(&self, index: usize) -> bool {
        matches!(self.hierarchy.parents.get(index), Some(None))
    }

    pub fn world_rotation(&self, index: usize) -> Quat {
        self.bones[index].world.rotation
    }

    pub fn world_position(&self, index: usize) -> Vec3 {
        self.bones[index].world.translation
    }

    pub fn local_rotation(&self, index: usize) -> Quat {
        self.bones[index].local.rotation
    }

    pub fn local_position(&self, index: usize) -> Vec3 {
        self.bones[index].local.translation
    }

    pub fn world_transform(&self, index: usize) -> RigidTransform {
        self.bones[index].world
    }

    pub fn local_transform(&self, index: usize) -> RigidTransform {
        self.bones[index].local
    }

    /// The transform of a bone relative to the skeleton root.
    pub fn world_matrix(&self, index: usize) -> Mat4 {
        self.bones[index].world.to_matrix()
    }

    /// The transform of a bone relative to its parent.
    pub fn local_matrix(&self, index: usize) -> Mat4 {
        self.bones[index].local.to_matrix()
    }

    pub fn set_local_rotation(&mut self, index: usize, rotation: Quat) {
        if let Some(rotation) = self.checked_rotation(index, rotation) {
            self.write_local_rotation(index, rotation);
        }
    }

    pub fn set_world_rotation(&mut self, index: usize, rotation: Quat) {
        if let Some(rotation) = self.checked_rotation(index, rotation) {
            self.write_world_rotation(index, rotation);
        }
    }

    pub fn set_local_position(&mut self, index: usize, position: Vec3) {
        if position.is_finite() {
            self.write_local_position(index, position);
        } else {
            warn!("Ignoring non finite position {position} for bone {index}");
        }
    }

    pub fn set_world_position(&mut self, index: usize, position: Vec3) {
        if position.is_finite() {
            self.write_world_position(index, position);
        } else {
            warn!("Ignoring non finite position {position} for bone {index}");
        }
    }

    /// Set the world rotation and position of a bone from a rigid matrix.
    pub fn set_world_matrix(&mut self, index: usize, matrix: Mat4) {
        let transform = RigidTransform::from_matrix(matrix);
        self.set_world_rotation(index, transform.rotation);
        self.set_world_position(index, transform.translation);
    }

    /// Set the local rotation and position of a bone from a rigid matrix.
    pub fn set_local_matrix(&mut self, index: usize, matrix: Mat4) {
        let transform = RigidTransform::from_matrix(matrix);
        self.set_local_rotation(index, transform.rotation);
        self.set_local_position(index, transform.translation);
    }

    pub fn set_local_rotations(&mut self, rotations: &[Quat]) {
        self.check_len("local rotations", rotations.len());
        for (i, rotation) in rotations.iter().enumerate().take(self.bones.len()) {
            self.set_local_rotation(i, *rotation);
        }
    }

    pub fn set_world_rotations(&mut self, rotations: &[Quat]) {
        self.check_len("world rotations", rotations.len());
        for (i, rotation) in rotations.iter().enumerate().take(self.bones.len()) {
            self.set_world_rotation(i, *rotation);
        }
    }

    pub fn set_world_positions(&mut self, positions: &[Vec3]) {
        self.check_len("world positions", positions.len());
        for (i, position) in positions.iter().enumerate().take(self.bones.len()) {
            self.set_world_position(i, *position);
        }
    }

    fn check_len(&self, kind: &str, len: usize) {
        if len != self.bones.len() {
            warn!(
                "Expected {} {kind} but found {len}. Only the first {} will be set.",
                self.bones.len(),
                len.min(self.bones.len())
            );
        }
    }

    fn checked_rotation(&self, index: usize, rotation: Quat) -> Option<Quat> {
        if !rotation.is_finite() || rotation.length_squared() <= f32::EPSILON {
            warn!("Ignoring invalid rotation {rotation} for bone {index}");
            return None;
        }
        if self.hierarchy.is_locked(index) {
            debug!("Ignoring rotation for locked bone {index}");
            return None;
        }
        Some(rotation.normalize())
    }

    fn bone_mut(&mut self, index: usize) -> Option<(&mut PoseBone, bool)> {
        let len = self.bones.len();
        // Relative poses and roots store the same value in both representations.
        let shared = self.space == PoseSpace::BindPoseRelative || self.is_root(index);
        match self.bones.get_mut(index) {
            Some(bone) => {
                self.needs_sync = true;
                Some((bone, shared))
            }
            None => {
                error!("Bone index {index} out of range for length {len}");
                None
            }
        }
    }

    pub(crate) fn write_local_rotation(&mut self, index: usize, rotation: Quat) {
        if let Some((bone, shared)) = self.bone_mut(index) {
            bone.local.rotation = rotation;
            if shared {
                bone.world.rotation = rotation;
            }
            bone.dirty.remove(Dirty::WORLD);
            bone.dirty.insert(Dirty::LOCAL_ROTATION);
        }
    }

    pub(crate) fn write_world_rotation(&mut self, index: usize, rotation: Quat) {
        if let Some((bone, shared)) = self.bone_mut(index) {
            bone.world.rotation = rotation;
            if shared {
                bone.local.rotation = rotation;
            }
            bone.dirty.remove(Dirty::LOCAL);
            bone.dirty.insert(Dirty::WORLD_ROTATION);
        }
    }

    pub(crate) fn write_local_position(&mut self, index: usize, position: Vec3) {
        if let Some((bone, shared)) = self.bone_mut(index) {
            bone.local.translation = position;
            if shared {
                bone.world.translation = position;
            }
            bone.dirty.remove(Dirty::WORLD);
            bone.dirty.insert(Dirty::LOCAL_POSITION);
        }
    }

    pub(crate) fn write_world_position(&mut self, index: usize, position: Vec3) {
        if let Some((bone, shared)) = self.bone_mut(index) {
            bone.world.translation = position;
            if shared {
                bone.local.translation = position;
            }
            bone.dirty.remove(Dirty::LOCAL);
            bone.dirty.insert(Dirty::WORLD_POSITION);
        }
    }

    /// Resolve pending writes so local and world values agree.
    ///
    /// Returns `true` if any bone changed.
    #[tracing::instrument(skip_all)]
    pub fn sync(&mut self) -> bool {
        if !self.needs_sync {
            return false;
        }
        self.needs_sync = false;

        if self.space == PoseSpace::BindPoseRelative {
            let mut changed = false;
            for bone in &mut self.bones {
                changed |= !bone.dirty.is_empty();
                bone.dirty = Dirty::empty();
            }
            return changed;
        }

        let mut changed = false;
        for i in 0..self.bones.len() {
            // Parents always precede their children.
            let (previous, current) = self.bones.split_at_mut(i);
            let bone = &mut current[0];
            let parent = self.hierarchy.parents[i].map(|p| &previous[p]);

            if bone.dirty.is_empty() && !parent.is_some_and(|p| p.updated) {
                continue;
            }

            let parent_world = parent.map(|p| p.world).unwrap_or_default();
            let mut world = parent_world * bone.local;
            if bone.dirty.contains(Dirty::WORLD_ROTATION) {
                world.rotation = bone.world.rotation;
            }
            if bone.dirty.contains(Dirty::WORLD_POSITION) {
                world.translation = bone.world.translation;
            }
            if bone.dirty.intersects(Dirty::WORLD) {
                bone.local = parent_world.inverse() * world;
            }

            bone.world = world;
            bone.dirty = Dirty::empty();
            bone.updated = true;
            changed = true;
        }

        for bone in &mut self.bones {
            bone.updated = false;
        }

        changed
    }

    /// Copy all bone values and pending writes from `other`.
    pub fn copy_from(&mut self, other: &Pose) -> Result<(), IncompatibleSkeletonError> {
        if !self.is_compatible(other) {
            return Err(IncompatibleSkeletonError);
        }
        self.space = other.space;
        self.bones.copy_from_slice(&other.bones);
        self.needs_sync = other.needs_sync;
        Ok(())
    }

    /// Move the whole pose so the root bone is at `position`.
    ///
    /// Every world position moves by the same amount and rotations are unchanged.
    pub fn set_position(&mut self, position: Vec3) {
        let Some(root) = self.bones.first() else {
            return;
        };
        let delta = position - root.world.translation;
        if delta.length_squared() <= f32::EPSILON * f32::EPSILON {
            return;
        }

        for bone in &mut self.bones {
            bone.world.translation += delta;
        }
        self.bones[0].world.translation = position;

        // Every root stores its position in both spaces.
        for (bone, parent) in self.bones.iter_mut().zip(&self.hierarchy.parents) {
            if parent.is_none() {
                bone.local.translation = bone.world.translation;
                bone.dirty.remove(Dirty::WORLD);
                bone.dirty.insert(Dirty::LOCAL_POSITION);
            }
        }
        self.needs_sync = true;
    }

    /// Reset every rotation to identity while keeping positions.
    pub fn clear_rotations(&mut self) {
        for bone in &mut self.bones {
            bone.local.rotation = Quat::IDENTITY;
            bone.world.rotation = Quat::IDENTITY;
            bone.dirty = Dirty::LOCAL_ROTATION;
        }
        self.needs_sync = !self.bones.is_empty();
    }

    /// Compare the local and world values of every bone.
    ///
    /// Poses for different skeletons are never equal.
    pub fn approx_eq(&self, other: &Pose, epsilon: f32) -> bool {
        self.is_compatible(other)
            && self.bones.iter().zip(&other.bones).all(|(a, b)| {
                a.local.abs_diff_eq(b.local, epsilon) && a.world.abs_diff_eq(b.world, epsilon)
            })
    }
}
