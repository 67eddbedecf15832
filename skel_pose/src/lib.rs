//! # skel_pose
//! skel_pose poses skeletal hierarchies and calculates the skinning matrices
//! used to deform meshes bound to them.
//!
//! A [Skeleton] stores the bone hierarchy and bind pose.
//! Each [Pose] holds the animated rotations and positions for one instance of a skeleton.
//! Synced poses are converted to per bone matrices with [Skinning].
//!
//! Bones can also be animated directly from scene nodes
//! using a [PoseTree] or a [SkinningController].

#[cfg(test)]
#[macro_use]
mod test_macros;

pub mod animation;
mod controller;
pub mod error;
mod pose;
mod pose_tree;
pub mod scene;
mod skeleton;
pub mod skinning;
pub mod transform;

pub use controller::SkinningController;
pub use pose::{Dirty, Pose, PoseSpace};
pub use pose_tree::PoseTree;
pub use scene::{NodeTree, SceneGraph};
pub use skeleton::{Bone, BoneOptions, Skeleton, SkeletonBinding};
pub use skinning::Skinning;
pub use transform::RigidTransform;
