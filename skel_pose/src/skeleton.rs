use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use ahash::AHashMap;
use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3};
use log::{debug, error, warn};

use crate::{
    Pose, PoseSpace, RigidTransform,
    error::{CreateSkeletonError, IncompatibleSkeletonError},
    scene::{SceneGraph, pre_order},
    transform::rigid_inverse,
};

bitflags! {
    /// Per bone flags controlling how poses may modify a bone.
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BoneOptions: u8 {
        /// Rotation writes from any [Pose] are silently ignored.
        const LOCK_ROTATION = 1;
        /// Bone motion is computed by a physics simulation.
        const PHYSICS = 2;
        /// Bone rotation is driven by keyframe animation.
        const ANIMATE = 4;
    }
}

/// A bone used to construct a [Skeleton].
#[derive(Debug, PartialEq, Clone)]
pub struct Bone {
    /// The name used by animations and scene nodes to identify this bone.
    pub name: String,
    /// The bind pose transform of the bone relative to its parent.
    pub transform: RigidTransform,
    /// The index of the parent [Bone] or `None` if this is a root bone.
    /// Parents must appear before their children.
    pub parent_index: Option<usize>,
}

/// The frozen topology shared by a skeleton and all of its poses.
#[derive(Debug)]
pub(crate) struct Hierarchy {
    pub(crate) parents: Vec<Option<usize>>,
    names: Vec<String>,
    name_to_index: AHashMap<String, usize>,
    options: Vec<AtomicU8>,
}

impl Hierarchy {
    fn new(parents: Vec<Option<usize>>, names: Vec<String>) -> Self {
        let mut name_to_index = AHashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            if name_to_index.contains_key(name) {
                warn!("Duplicate bone name {name:?} at index {i} will not be found by name.");
            } else {
                name_to_index.insert(name.clone(), i);
            }
        }

        let options = parents.iter().map(|_| AtomicU8::new(0)).collect();

        Self {
            parents,
            names,
            name_to_index,
            options,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.parents.len()
    }

    pub(crate) fn options(&self, index: usize) -> BoneOptions {
        self.options
            .get(index)
            .map(|o| BoneOptions::from_bits_truncate(o.load(Ordering::Relaxed)))
            .unwrap_or_default()
    }

    pub(crate) fn is_locked(&self, index: usize) -> bool {
        self.options(index).contains(BoneOptions::LOCK_ROTATION)
    }
}

/// The joint hierarchy, bind pose and inverse bind matrices for a skinned model.
///
/// Topology is fixed at construction. Bones always appear after their parents,
/// so every pass over the bones in index order sees a parent before its children.
/// Cloning a skeleton shares its topology, so poses stay compatible with both.
#[derive(Debug, Clone)]
pub struct Skeleton {
    hierarchy: Arc<Hierarchy>,
    bind_pose: Pose,
    bind_local_transforms: Vec<RigidTransform>,
    inverse_bind_matrices: Vec<Mat4>,
    bone_axis: Vec3,
    root_offset: Vec3,
}

impl Skeleton {
    /// Create a skeleton from `bones` using each bone's transform as the bind pose.
    pub fn new(bones: Vec<Bone>) -> Result<Self, CreateSkeletonError> {
        if bones.is_empty() {
            return Err(CreateSkeletonError::Empty);
        }

        for (i, bone) in bones.iter().enumerate() {
            if let Some(p) = bone.parent_index.filter(|p| *p >= i) {
                return Err(CreateSkeletonError::InvalidTopology {
                    index: i,
                    parent: p as i64,
                });
            }
        }

        // A single root is the common case but extra roots still animate correctly.
        let root_bone_count = bones.iter().filter(|b| b.parent_index.is_none()).count();
        if root_bone_count > 1 {
            warn!("Skeleton contains {root_bone_count} root bones.")
        }

        let (parents, names): (Vec<_>, Vec<_>) = bones
            .iter()
            .map(|b| (b.parent_index, b.name.clone()))
            .unzip();
        let hierarchy = Arc::new(Hierarchy::new(parents, names));

        let mut bind_pose = Pose::from_hierarchy(hierarchy.clone(), PoseSpace::BindPose);
        for (i, bone) in bones.iter().enumerate() {
            bind_pose.write_local_rotation(i, bone.transform.rotation.normalize());
            bind_pose.write_local_position(i, bone.transform.translation);
        }

        let count = bones.len();
        let mut skeleton = Self {
            hierarchy,
            bind_pose,
            bind_local_transforms: vec![RigidTransform::IDENTITY; count],
            inverse_bind_matrices: vec![Mat4::IDENTITY; count],
            bone_axis: Vec3::Z,
            root_offset: Vec3::ZERO,
        };
        skeleton.update_bind_pose();
        Ok(skeleton)
    }

    /// Create an unnamed skeleton with an identity bind pose.
    ///
    /// Root bones use a parent index of `-1`.
    pub fn from_parent_indices(parent_indices: &[i32]) -> Result<Self, CreateSkeletonError> {
        let bones = parent_indices
            .iter()
            .enumerate()
            .map(|(i, parent)| {
                let parent_index = match *parent {
                    -1 => None,
                    p if p < -1 => {
                        return Err(CreateSkeletonError::InvalidTopology {
                            index: i,
                            parent: p.into(),
                        });
                    }
                    p => Some(p as usize),
                };
                Ok(Bone {
                    name: String::new(),
                    transform: RigidTransform::IDENTITY,
                    parent_index,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(bones)
    }

    pub(crate) fn hierarchy(&self) -> &Arc<Hierarchy> {
        &self.hierarchy
    }

    pub fn bone_count(&self) -> usize {
        self.hierarchy.len()
    }

    pub fn parent_index(&self, index: usize) -> Option<usize> {
        self.hierarchy.parents.get(index).copied().flatten()
    }

    pub fn bone_name(&self, index: usize) -> Option<&str> {
        self.hierarchy.names.get(index).map(|n| n.as_str())
    }

    /// The bones with their bind pose transforms relative to their parents.
    pub fn bones(&self) -> impl Iterator<Item = Bone> + '_ {
        (0..self.bone_count()).map(|i| Bone {
            name: self.hierarchy.names[i].clone(),
            transform: self.bind_local_transforms[i],
            parent_index: self.hierarchy.parents[i],
        })
    }

    /// The index of the bone named `name` or `None` if there is no such bone.
    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.hierarchy.name_to_index.get(name).copied()
    }

    /// Find the first bone containing each name in `names` as a substring.
    ///
    /// This allows matching names with prefixes added by exporters like "mixamorig:Hips".
    pub fn bone_map<S: AsRef<str>>(&self, names: &[S]) -> Vec<Option<usize>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                if name.is_empty() {
                    None
                } else {
                    self.hierarchy.names.iter().position(|n| n.contains(name))
                }
            })
            .collect()
    }

    /// Set the options for a bone.
    ///
    /// Options are shared with every [Pose] for this skeleton and apply to the next write.
    pub fn set_bone_options(&self, index: usize, options: BoneOptions) {
        match self.hierarchy.options.get(index) {
            Some(o) => o.store(options.bits(), Ordering::Relaxed),
            None => error!(
                "Bone index {index} out of range for length {}",
                self.bone_count()
            ),
        }
    }

    pub fn bone_options(&self, index: usize) -> BoneOptions {
        self.hierarchy.options(index)
    }

    pub fn is_locked(&self, index: usize) -> bool {
        self.hierarchy.is_locked(index)
    }

    /// The axis each bone points along in its own coordinate system.
    pub fn bone_axis(&self) -> Vec3 {
        self.bone_axis
    }

    pub fn set_bone_axis(&mut self, axis: Vec3) {
        self.bone_axis = axis.normalize_or(Vec3::Z);
    }

    /// The [bone axis](Skeleton::bone_axis) of bone `index` rotated into the skeleton root's space.
    pub fn bone_direction(&self, pose: &Pose, index: usize) -> Vec3 {
        pose.world_rotation(index) * self.bone_axis
    }

    /// The offset added to the root position when reading animated scene nodes.
    pub fn root_offset(&self) -> Vec3 {
        self.root_offset
    }

    pub fn set_root_offset(&mut self, offset: Vec3) {
        self.root_offset = offset;
    }

    pub fn bind_pose(&self) -> &Pose {
        &self.bind_pose
    }

    /// Replace the bind pose with a copy of `pose` and recompute the inverse bind matrices.
    pub fn set_bind_pose(&mut self, pose: &Pose) -> Result<(), IncompatibleSkeletonError> {
        self.bind_pose.copy_from(pose)?;
        self.bind_pose.set_space(PoseSpace::BindPose);
        self.update_bind_pose();
        Ok(())
    }

    /// Replace the bind pose using rotations and positions relative to the skeleton root.
    ///
    /// Rotation locks do not apply to the bind pose.
    pub fn set_bind_pose_world(&mut self, rotations: &[Quat], positions: &[Vec3]) {
        if rotations.len() != self.bone_count() || positions.len() != self.bone_count() {
            warn!(
                "Bind pose has {} rotations and {} positions for {} bones.",
                rotations.len(),
                positions.len(),
                self.bone_count()
            );
        }

        for (i, rotation) in rotations.iter().enumerate() {
            self.bind_pose.write_world_rotation(i, rotation.normalize());
        }
        for (i, position) in positions.iter().enumerate() {
            self.bind_pose.write_world_position(i, *position);
        }
        self.update_bind_pose();
    }

    fn update_bind_pose(&mut self) {
        self.bind_pose.sync();

        for i in 0..self.bone_count() {
            let world = self.bind_pose.world_transform(i);
            self.inverse_bind_matrices[i] = rigid_inverse(world.to_matrix());
            self.bind_local_transforms[i] = match self.parent_index(i) {
                Some(p) => self.bind_pose.world_transform(p).inverse() * world,
                None => world,
            };
        }
    }

    /// The inverse of each bone's accumulated bind pose transform.
    pub fn inverse_bind_matrices(&self) -> &[Mat4] {
        &self.inverse_bind_matrices
    }

    pub fn inverse_bind_matrix(&self, index: usize) -> Option<Mat4> {
        self.inverse_bind_matrices.get(index).copied()
    }

    /// The bind pose transform of a bone relative to its parent.
    pub fn bind_local_transform(&self, index: usize) -> Option<RigidTransform> {
        self.bind_local_transforms.get(index).copied()
    }

    /// Create a new pose for this skeleton in the given coordinate space.
    ///
    /// Relative poses start with identity rotations.
    /// Other spaces start as a copy of the bind pose.
    pub fn make_pose(&self, space: PoseSpace) -> Pose {
        match space {
            PoseSpace::BindPoseRelative => Pose::new(self, space),
            PoseSpace::Skeleton | PoseSpace::BindPose => {
                let mut pose = self.bind_pose.clone();
                pose.set_space(space);
                pose
            }
        }
    }

    /// Apply the rotations from `source` to `current`.
    ///
    /// Rotations in a [PoseSpace::BindPoseRelative] pose are combined with the bind pose.
    /// Locked bones are left unchanged.
    pub fn apply_pose(
        &self,
        current: &mut Pose,
        source: &Pose,
    ) -> Result<(), IncompatibleSkeletonError> {
        if !current.is_pose_of(self) || !source.is_pose_of(self) {
            return Err(IncompatibleSkeletonError);
        }

        match source.space() {
            PoseSpace::BindPoseRelative => {
                for i in 0..self.bone_count() {
                    let rotation = source.world_rotation(i) * self.bind_pose.world_rotation(i);
                    current.set_world_rotation(i, rotation);
                }
            }
            PoseSpace::Skeleton | PoseSpace::BindPose => {
                for i in 0..self.bone_count() {
                    current.set_world_rotation(i, source.world_rotation(i));
                }
            }
        }
        Ok(())
    }

    /// Find the node for each bone by searching `root` and its descendants by name.
    ///
    /// Unnamed nodes and nodes that do not match a bone are ignored.
    /// Bones without a matching node remain unbound.
    pub fn find_bones<S: SceneGraph>(
        &self,
        scene: &S,
        root: S::NodeId,
    ) -> SkeletonBinding<S::NodeId> {
        let mut nodes = vec![None; self.bone_count()];

        for node in pre_order(scene, root) {
            let name = scene.name(node);
            if name.is_empty() {
                continue;
            }
            if let Some(index) = self.bone_index(name) {
                // Prefer the node closest to the root for duplicate names.
                if nodes[index].is_none() {
                    nodes[index] = Some(node);
                } else {
                    debug!("Ignoring duplicate node {node:?} for bone {name:?}");
                }
            }
        }

        let binding = SkeletonBinding { nodes };
        debug!(
            "Bound {} of {} bones to scene nodes",
            binding.bound_count(),
            self.bone_count()
        );
        binding
    }
}

/// The scene node for each bone in a [Skeleton] found by [Skeleton::find_bones].
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonBinding<Id> {
    nodes: Vec<Option<Id>>,
}

impl<Id: Copy + Eq> SkeletonBinding<Id> {
    pub fn node(&self, index: usize) -> Option<Id> {
        self.nodes.get(index).copied().flatten()
    }

    pub fn bound_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    fn bound(&self) -> impl Iterator<Item = (usize, Id)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.map(|n| (i, n)))
    }

    /// Set the world transform of each bound bone in `pose` from its node.
    pub fn capture_pose<S: SceneGraph<NodeId = Id>>(&self, scene: &S, pose: &mut Pose) {
        for (i, node) in self.bound() {
            pose.set_world_matrix(i, scene.world_matrix(node));
        }
    }

    /// Copy the node rotations of bones flagged [BoneOptions::ANIMATE] into `pose`.
    ///
    /// The root node's position is applied to the whole pose
    /// after adding the [root offset](Skeleton::root_offset).
    pub fn read_animated<S: SceneGraph<NodeId = Id>>(
        &self,
        scene: &S,
        skeleton: &Skeleton,
        pose: &mut Pose,
    ) {
        for (i, node) in self.bound() {
            if skeleton.bone_options(i).contains(BoneOptions::ANIMATE) {
                let transform = scene.local_transform(node);
                pose.set_local_rotation(i, transform.rotation);
                if i == 0 {
                    pose.set_position(transform.translation + skeleton.root_offset());
                }
            }
        }
    }

    /// Write the local rotations of `pose` back to the bound nodes.
    ///
    /// Only root bones also receive a translation.
    /// This preserves offsets from any unbound nodes between bones.
    pub fn write_pose<S: SceneGraph<NodeId = Id>>(&self, scene: &mut S, pose: &Pose) {
        for (i, node) in self.bound() {
            let mut transform = scene.local_transform(node);
            transform.rotation = pose.local_rotation(i);
            if pose.is_root(i) {
                transform.translation = pose.local_position(i);
            }
            scene.set_local_transform(node, transform);
        }
    }

    /// Reset each bound node to the skeleton's bind pose.
    pub fn apply_bind_pose<S: SceneGraph<NodeId = Id>>(&self, scene: &mut S, skeleton: &Skeleton) {
        for (i, node) in self.bound() {
            if let Some(transform) = skeleton.bind_local_transform(i) {
                scene.set_local_transform(node, transform);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::scene::NodeTree;
    use glam::vec3;
    use pretty_assertions::assert_eq;
    use std::f32::consts::FRAC_PI_2;

    fn bone(name: &str, translation: Vec3, parent_index: Option<usize>) -> Bone {
        Bone {
            name: name.to_string(),
            transform: RigidTransform::from_translation(translation),
            parent_index,
        }
    }

    fn arm() -> Skeleton {
        Skeleton::new(vec![
            bone("root", Vec3::ZERO, None),
            bone("shoulder", vec3(0.0, 1.0, 0.0), Some(0)),
            bone("elbow", vec3(0.0, 1.0, 0.0), Some(1)),
            bone("hand", vec3(0.0, 0.5, 0.0), Some(2)),
        ])
        .unwrap()
    }

    #[test]
    fn new_empty() {
        assert_eq!(
            CreateSkeletonError::Empty,
            Skeleton::new(Vec::new()).unwrap_err()
        );
    }

    #[test]
    fn new_parent_after_child() {
        assert_eq!(
            CreateSkeletonError::InvalidTopology {
                index: 1,
                parent: 2
            },
            Skeleton::new(vec![
                bone("a", Vec3::ZERO, None),
                bone("b", Vec3::ZERO, Some(2)),
                bone("c", Vec3::ZERO, Some(0)),
            ])
            .unwrap_err()
        );
    }

    #[test]
    fn new_self_parent() {
        assert_eq!(
            CreateSkeletonError::InvalidTopology {
                index: 1,
                parent: 1
            },
            Skeleton::from_parent_indices(&[-1, 1]).unwrap_err()
        );
    }

    #[test]
    fn from_parent_indices_root_not_first() {
        assert_eq!(
            CreateSkeletonError::InvalidTopology {
                index: 0,
                parent: 1
            },
            Skeleton::from_parent_indices(&[1, -1]).unwrap_err()
        );
    }

    #[test]
    fn from_parent_indices_negative() {
        assert_eq!(
            CreateSkeletonError::InvalidTopology {
                index: 2,
                parent: -3
            },
            Skeleton::from_parent_indices(&[-1, 0, -3]).unwrap_err()
        );
    }

    #[test]
    fn from_parent_indices_valid() {
        let skeleton = Skeleton::from_parent_indices(&[-1, 0, 1, 1, 0]).unwrap();
        assert_eq!(5, skeleton.bone_count());
        for i in 0..skeleton.bone_count() {
            if let Some(p) = skeleton.parent_index(i) {
                assert!(p < i);
            }
        }
        assert_eq!(None, skeleton.parent_index(0));
        assert_eq!(Some(1), skeleton.parent_index(3));
    }

    #[test]
    fn bone_index_by_name() {
        let skeleton = arm();
        assert_eq!(Some(2), skeleton.bone_index("elbow"));
        assert_eq!(None, skeleton.bone_index("knee"));
        assert_eq!(Some("hand"), skeleton.bone_name(3));
    }

    #[test]
    fn bones_round_trip() {
        let bones = vec![
            bone("root", Vec3::ZERO, None),
            bone("a", vec3(0.0, 1.0, 0.0), Some(0)),
            bone("b", vec3(1.0, 0.0, 0.0), Some(0)),
        ];
        let skeleton = Skeleton::new(bones.clone()).unwrap();
        assert_eq!(bones, skeleton.bones().collect::<Vec<_>>());
    }

    #[test]
    fn bone_map_substrings() {
        let skeleton = arm();
        assert_eq!(
            vec![Some(2), None, Some(1), None],
            skeleton.bone_map(&["elb", "knee", "shoulder", ""])
        );
    }

    #[test]
    fn inverse_bind_matrices_cancel_bind_pose() {
        let skeleton = arm();
        for i in 0..skeleton.bone_count() {
            assert_matrix_relative_eq!(
                Mat4::IDENTITY,
                skeleton.bind_pose().world_matrix(i) * skeleton.inverse_bind_matrices()[i]
            );
        }
        assert_matrix_relative_eq!(
            Mat4::from_translation(vec3(0.0, -2.0, 0.0)),
            skeleton.inverse_bind_matrix(2).unwrap()
        );
    }

    #[test]
    fn set_bind_pose_copies_values() {
        let mut skeleton = arm();
        let mut pose = skeleton.make_pose(PoseSpace::Skeleton);
        pose.set_local_rotation(1, Quat::from_rotation_z(FRAC_PI_2));
        pose.sync();

        skeleton.set_bind_pose(&pose).unwrap();

        // Later edits to the source don't affect the skeleton.
        pose.set_local_rotation(1, Quat::IDENTITY);
        pose.sync();

        let rotation = skeleton.bind_pose().world_rotation(2);
        assert!(rotation.abs_diff_eq(Quat::from_rotation_z(FRAC_PI_2), 0.0001));
        assert_matrix_relative_eq!(
            Mat4::IDENTITY,
            skeleton.bind_pose().world_matrix(2) * skeleton.inverse_bind_matrices()[2]
        );
        assert_eq!(PoseSpace::BindPose, skeleton.bind_pose().space());
    }

    #[test]
    fn set_bind_pose_incompatible() {
        let mut skeleton = arm();
        let other = arm();
        let before = skeleton.inverse_bind_matrices().to_vec();
        assert_eq!(
            Err(IncompatibleSkeletonError),
            skeleton.set_bind_pose(&other.make_pose(PoseSpace::Skeleton))
        );
        assert_eq!(before, skeleton.inverse_bind_matrices());
    }

    #[test]
    fn set_bind_pose_world_locals() {
        let mut skeleton = Skeleton::from_parent_indices(&[-1, 0]).unwrap();
        skeleton.set_bone_options(1, BoneOptions::LOCK_ROTATION);
        skeleton.set_bind_pose_world(
            &[Quat::IDENTITY, Quat::from_rotation_x(FRAC_PI_2)],
            &[vec3(1.0, 0.0, 0.0), vec3(1.0, 2.0, 0.0)],
        );

        let local = skeleton.bind_local_transform(1).unwrap();
        assert!(local.abs_diff_eq(
            RigidTransform::new(Quat::from_rotation_x(FRAC_PI_2), vec3(0.0, 2.0, 0.0)),
            0.0001
        ));
        assert_matrix_relative_eq!(
            Mat4::from_translation(vec3(-1.0, 0.0, 0.0)),
            skeleton.inverse_bind_matrix(0).unwrap()
        );
    }

    #[test]
    fn bone_options_shared_with_clones() {
        let skeleton = arm();
        let clone = skeleton.clone();
        skeleton.set_bone_options(2, BoneOptions::LOCK_ROTATION | BoneOptions::ANIMATE);
        assert!(clone.is_locked(2));
        assert!(clone.bone_options(2).contains(BoneOptions::ANIMATE));
        assert!(!clone.is_locked(1));
        assert_eq!(BoneOptions::empty(), skeleton.bone_options(10));
    }

    #[test]
    fn make_pose_spaces() {
        let skeleton = arm();
        let relative = skeleton.make_pose(PoseSpace::BindPoseRelative);
        assert_eq!(Vec3::ZERO, relative.world_position(2));

        let pose = skeleton.make_pose(PoseSpace::Skeleton);
        assert_eq!(PoseSpace::Skeleton, pose.space());
        assert_eq!(vec3(0.0, 2.0, 0.0), pose.world_position(2));
    }

    #[test]
    fn apply_relative_pose() {
        let mut skeleton = arm();
        skeleton.set_bind_pose_world(
            &[
                Quat::IDENTITY,
                Quat::from_rotation_y(0.5),
                Quat::from_rotation_y(0.5),
                Quat::from_rotation_y(0.5),
            ],
            &[
                Vec3::ZERO,
                vec3(0.0, 1.0, 0.0),
                vec3(0.0, 2.0, 0.0),
                vec3(0.0, 2.5, 0.0),
            ],
        );
        skeleton.set_bone_options(3, BoneOptions::LOCK_ROTATION);

        let mut relative = skeleton.make_pose(PoseSpace::BindPoseRelative);
        relative.set_world_rotation(2, Quat::from_rotation_x(0.25));

        let mut current = skeleton.make_pose(PoseSpace::Skeleton);
        skeleton.apply_pose(&mut current, &relative).unwrap();
        current.sync();

        let expected = Quat::from_rotation_x(0.25) * Quat::from_rotation_y(0.5);
        assert!(current.world_rotation(2).abs_diff_eq(expected, 0.0001));
        let rotation = current.world_rotation(1);
        assert!(rotation.abs_diff_eq(Quat::from_rotation_y(0.5), 0.0001));
    }

    #[test]
    fn apply_pose_incompatible() {
        let skeleton = arm();
        let other = arm();
        let mut current = skeleton.make_pose(PoseSpace::Skeleton);
        assert_eq!(
            Err(IncompatibleSkeletonError),
            skeleton.apply_pose(&mut current, &other.make_pose(PoseSpace::Skeleton))
        );
    }

    #[test]
    fn find_bones_by_name() {
        let skeleton = arm();
        let mut scene = NodeTree::new();
        let root = scene.add_node("root", RigidTransform::IDENTITY, None);
        let mesh = scene.add_node("", RigidTransform::IDENTITY, Some(root));
        let shoulder = scene.add_node("shoulder", RigidTransform::IDENTITY, Some(root));
        let prop = scene.add_node("prop", RigidTransform::IDENTITY, Some(shoulder));
        let elbow = scene.add_node("elbow", RigidTransform::IDENTITY, Some(shoulder));

        let binding = skeleton.find_bones(&scene, root);
        assert_eq!(Some(root), binding.node(0));
        assert_eq!(Some(shoulder), binding.node(1));
        assert_eq!(Some(elbow), binding.node(2));
        assert_eq!(None, binding.node(3));
        assert_eq!(3, binding.bound_count());
        assert_ne!(Some(mesh), binding.node(0));
        assert_ne!(Some(prop), binding.node(3));
    }

    #[test]
    fn binding_round_trip() {
        let skeleton = arm();
        skeleton.set_bone_options(2, BoneOptions::ANIMATE);
        let mut scene = NodeTree::new();
        let root = scene.add_node("root", RigidTransform::IDENTITY, None);
        let shoulder = scene.add_node("shoulder", RigidTransform::IDENTITY, Some(root));
        let elbow = scene.add_node("elbow", RigidTransform::IDENTITY, Some(shoulder));

        let binding = skeleton.find_bones(&scene, root);
        binding.apply_bind_pose(&mut scene, &skeleton);
        assert_eq!(vec3(0.0, 1.0, 0.0), scene.local_transform(elbow).translation);

        scene.set_local_transform(
            elbow,
            RigidTransform::new(Quat::from_rotation_x(FRAC_PI_2), vec3(0.0, 1.0, 0.0)),
        );

        let mut pose = skeleton.make_pose(PoseSpace::Skeleton);
        binding.read_animated(&scene, &skeleton, &mut pose);
        pose.sync();
        let rotation = pose.world_rotation(3);
        assert!(rotation.abs_diff_eq(Quat::from_rotation_x(FRAC_PI_2), 0.0001));

        let mut captured = skeleton.make_pose(PoseSpace::Skeleton);
        binding.capture_pose(&scene, &mut captured);
        captured.sync();
        let rotation = captured.world_rotation(2);
        assert!(rotation.abs_diff_eq(pose.world_rotation(2), 0.0001));

        pose.set_local_rotation(1, Quat::from_rotation_z(0.5));
        pose.sync();
        binding.write_pose(&mut scene, &pose);
        let rotation = scene.local_transform(shoulder).rotation;
        assert!(rotation.abs_diff_eq(Quat::from_rotation_z(0.5), 0.0001));
    }

    #[test]
    fn read_animated_root_moves_pose() {
        let mut skeleton = arm();
        assert_eq!(Vec3::ZERO, skeleton.root_offset());
        skeleton.set_root_offset(vec3(0.0, 0.0, 1.0));
        skeleton.set_bone_options(0, BoneOptions::ANIMATE);

        let mut scene = NodeTree::new();
        let root = scene.add_node(
            "root",
            RigidTransform::from_translation(vec3(2.0, 0.0, 0.0)),
            None,
        );
        scene.add_node("shoulder", RigidTransform::IDENTITY, Some(root));

        let mut pose = skeleton.make_pose(PoseSpace::Skeleton);
        let before = pose.clone();
        let binding = skeleton.find_bones(&scene, root);
        binding.read_animated(&scene, &skeleton, &mut pose);
        assert!(pose.sync());

        assert_eq!(vec3(2.0, 0.0, 1.0), pose.local_position(0));
        for i in 0..pose.bone_count() {
            let delta = pose.world_position(i) - before.world_position(i);
            assert!(delta.abs_diff_eq(vec3(2.0, 0.0, 1.0), 0.0001));
            let rotation = pose.world_rotation(i);
            assert!(rotation.abs_diff_eq(before.world_rotation(i), 0.0001));
        }
    }

    #[test]
    fn bone_axis_normalized() {
        let mut skeleton = arm();
        assert_eq!(Vec3::Z, skeleton.bone_axis());
        skeleton.set_bone_axis(vec3(0.0, 2.0, 0.0));
        assert_eq!(Vec3::Y, skeleton.bone_axis());
        skeleton.set_bone_axis(Vec3::ZERO);
        assert_eq!(Vec3::Z, skeleton.bone_axis());
    }

    #[test]
    fn bone_direction_follows_pose() {
        let mut skeleton = arm();
        skeleton.set_bone_axis(Vec3::Y);
        let mut pose = skeleton.make_pose(PoseSpace::Skeleton);
        let direction = skeleton.bone_direction(&pose, 2);
        assert!(direction.abs_diff_eq(Vec3::Y, 0.0001));

        pose.set_local_rotation(1, Quat::from_rotation_z(FRAC_PI_2));
        pose.sync();
        let direction = skeleton.bone_direction(&pose, 2);
        assert!(direction.abs_diff_eq(vec3(-1.0, 0.0, 0.0), 0.0001));
    }
}
