use std::{fmt::Debug, hash::Hash};

use glam::Mat4;
use log::warn;

use crate::{
    BoneOptions, PoseTree, Skeleton, Skinning,
    animation::Animation,
    scene::{SceneGraph, pre_order},
};

/// Plays an [Animation] on scene nodes and calculates skinning matrices
/// from the animated node hierarchy.
#[derive(Debug, Clone)]
pub struct SkinningController<Id> {
    animation: Animation,
    /// The channel index for each animated node.
    channel_nodes: Vec<(usize, Id)>,
    tree: PoseTree<Id>,
    skinning: Skinning,
}

impl<Id: Copy + Eq + Hash + Debug> SkinningController<Id> {
    /// Bind the channels in `animation` to the nodes below `root` with the same name.
    ///
    /// Bones with a channel are flagged [BoneOptions::ANIMATE].
    /// Nodes without a channel are pruned unless they are needed to update a bone.
    pub fn new<S: SceneGraph<NodeId = Id>>(
        scene: &S,
        root: Id,
        skeleton: &Skeleton,
        animation: Animation,
    ) -> Self {
        let mut tree = PoseTree::build(scene, root, skeleton);

        let mut channel_nodes = Vec::new();
        for node in pre_order(scene, root) {
            let name = scene.name(node);
            let channel = (!name.is_empty())
                .then(|| animation.channels.iter().position(|c| c.bone_name == name))
                .flatten();

            match channel {
                Some(channel) => {
                    channel_nodes.push((channel, node));
                    if let Some(bone) = skeleton.bone_index(name) {
                        let options = skeleton.bone_options(bone) | BoneOptions::ANIMATE;
                        skeleton.set_bone_options(bone, options);
                    }
                }
                None => tree.mark_invalid(node),
            }
        }

        if !tree.prune() {
            warn!("Animation {:?} does not affect any nodes.", animation.name);
        }

        Self {
            animation,
            channel_nodes,
            tree,
            skinning: Skinning::new(skeleton),
        }
    }

    /// Write the animation at `frame` to the scene nodes and update the skinning matrices.
    #[tracing::instrument(skip_all)]
    pub fn animate<S: SceneGraph<NodeId = Id>>(
        &mut self,
        scene: &mut S,
        skeleton: &Skeleton,
        frame: f32,
        mesh_world: Mat4,
    ) {
        for (channel, node) in &self.channel_nodes {
            let channel = &self.animation.channels[*channel];
            let mut transform = scene.local_transform(*node);
            if let Some(rotation) = channel.sample_rotation(frame) {
                transform.rotation = rotation;
            }
            if let Some(translation) = channel.sample_translation(frame) {
                transform.translation = translation;
            }
            scene.set_local_transform(*node, transform);
        }

        self.tree.update(scene);
        self.skinning
            .update_from_tree(skeleton, &self.tree, mesh_world);
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }

    pub fn tree(&self) -> &PoseTree<Id> {
        &self.tree
    }

    pub fn skinning(&self) -> &Skinning {
        &self.skinning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Bone, RigidTransform, animation::Channel, scene::NodeTree};
    use glam::{Quat, Vec3, vec3};
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn animate_scene_nodes() {
        let up = RigidTransform::from_translation(vec3(0.0, 1.0, 0.0));
        let skeleton = Skeleton::new(vec![
            Bone {
                name: "root".to_string(),
                transform: RigidTransform::IDENTITY,
                parent_index: None,
            },
            Bone {
                name: "elbow".to_string(),
                transform: up,
                parent_index: Some(0),
            },
        ])
        .unwrap();

        let mut scene = NodeTree::new();
        let root = scene.add_node("root", RigidTransform::IDENTITY, None);
        let elbow = scene.add_node("elbow", up, Some(root));
        let prop = scene.add_node("prop", up, Some(elbow));

        let mut channel = Channel::new("elbow");
        let bent = Quat::from_rotation_x(FRAC_PI_2);
        let keyframes = &mut channel.rotation_keyframes;
        keyframes.insert(0.0.into(), Quat::IDENTITY);
        keyframes.insert(10.0.into(), bent);
        let animation = Animation {
            name: "bend".to_string(),
            frames_per_second: 30.0,
            frame_count: 11,
            play_mode: Default::default(),
            channels: vec![channel, Channel::new("missing")],
        };

        let mut controller = SkinningController::new(&scene, root, &skeleton, animation);
        assert!(skeleton.bone_options(1).contains(BoneOptions::ANIMATE));
        assert!(!skeleton.bone_options(0).contains(BoneOptions::ANIMATE));
        assert!(controller.tree().is_pruned(prop));
        assert!(!controller.tree().is_pruned(root));

        controller.animate(&mut scene, &skeleton, 10.0, Mat4::IDENTITY);

        let rotation = scene.local_transform(elbow).rotation;
        assert!(rotation.abs_diff_eq(bent, 0.0001));
        let animated = Mat4::from_rotation_translation(bent, Vec3::Y);
        let expected = animated * skeleton.inverse_bind_matrices()[1];
        assert_matrix_relative_eq!(expected, controller.skinning().matrices()[1]);
        assert_matrix_relative_eq!(Mat4::IDENTITY, controller.skinning().matrices()[0]);
    }
}
