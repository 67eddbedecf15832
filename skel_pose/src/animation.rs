//! Keyframed bone animations that drive the local transforms of a [Pose].
use std::{
    collections::BTreeMap,
    ops::Bound::{Excluded, Included, Unbounded},
};

use glam::{Quat, Vec3};
use log::error;
use ordered_float::OrderedFloat;

use crate::{Pose, RigidTransform, Skeleton};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum PlayMode {
    /// Wrap around to the first frame after the final frame.
    #[default]
    Loop,
    /// Hold the final frame.
    Single,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct Animation {
    pub name: String,
    pub frames_per_second: f32,
    pub frame_count: u32,
    pub play_mode: PlayMode,
    pub channels: Vec<Channel>,
}

/// Keyframes for the local transform of a single bone.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Channel {
    /// The name of the bone and scene node animated by this channel.
    pub bone_name: String,
    pub rotation_keyframes: BTreeMap<OrderedFloat<f32>, Quat>,
    pub translation_keyframes: BTreeMap<OrderedFloat<f32>, Vec3>,
}

impl Animation {
    /// The frame to sample at `current_time_seconds` based on the [PlayMode].
    pub fn current_frame(&self, current_time_seconds: f32) -> f32 {
        let frame = current_time_seconds * self.frames_per_second;
        let final_frame = self.frame_count.saturating_sub(1) as f32;
        if final_frame <= 0.0 {
            return 0.0;
        }

        match self.play_mode {
            PlayMode::Loop => frame.rem_euclid(final_frame),
            PlayMode::Single => frame.clamp(0.0, final_frame),
        }
    }

    pub fn find_channel(&self, bone_name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.bone_name == bone_name)
    }

    /// Write the local transforms sampled at `frame` to the matching bones in `pose`.
    ///
    /// Locked bones keep their rotation. Call [Pose::sync] afterwards.
    #[tracing::instrument(skip_all)]
    pub fn apply(&self, skeleton: &Skeleton, pose: &mut Pose, frame: f32) {
        let mut missing = Vec::new();

        for channel in &self.channels {
            match skeleton.bone_index(&channel.bone_name) {
                Some(index) => {
                    if let Some(rotation) = channel.sample_rotation(frame) {
                        pose.set_local_rotation(index, rotation);
                    }
                    if let Some(translation) = channel.sample_translation(frame) {
                        pose.set_local_position(index, translation);
                    }
                }
                None => missing.push(channel.bone_name.as_str()),
            }
        }

        if !missing.is_empty() {
            error!(
                "Animation {:?} has channels for missing bones {missing:?}",
                self.name
            );
        }
    }
}

impl Channel {
    pub fn new(bone_name: impl Into<String>) -> Self {
        Self {
            bone_name: bone_name.into(),
            ..Default::default()
        }
    }

    /// Sample the rotation at `frame` by interpolating between the surrounding keyframes.
    /// Returns `None` if there are no rotation keyframes.
    pub fn sample_rotation(&self, frame: f32) -> Option<Quat> {
        let (previous, next, factor) = keyframe_range(&self.rotation_keyframes, frame)?;
        Some(previous.slerp(*next, factor).normalize())
    }

    /// Sample the translation at `frame` by interpolating between the surrounding keyframes.
    /// Returns `None` if there are no translation keyframes.
    pub fn sample_translation(&self, frame: f32) -> Option<Vec3> {
        let (previous, next, factor) = keyframe_range(&self.translation_keyframes, frame)?;
        Some(previous.lerp(*next, factor))
    }

    /// Sample both rotation and translation.
    /// Components without keyframes use the identity transform.
    /// Returns `None` if the channel has no keyframes.
    pub fn sample_transform(&self, frame: f32) -> Option<RigidTransform> {
        let rotation = self.sample_rotation(frame);
        let translation = self.sample_translation(frame);
        if rotation.is_none() && translation.is_none() {
            return None;
        }

        Some(RigidTransform {
            rotation: rotation.unwrap_or(Quat::IDENTITY),
            translation: translation.unwrap_or(Vec3::ZERO),
        })
    }
}

fn keyframe_range<T>(
    keyframes: &BTreeMap<OrderedFloat<f32>, T>,
    frame: f32,
) -> Option<(&T, &T, f32)> {
    let key = OrderedFloat::<f32>::from(frame);
    let before = keyframes.range((Unbounded, Included(key))).next_back();
    let after = keyframes.range((Excluded(key), Unbounded)).next();

    // Frames outside the keyframe range hold the nearest keyframe.
    match (before, after) {
        (Some((f0, v0)), Some((f1, v1))) => {
            let factor = (frame - f0.0) / (f1.0 - f0.0);
            Some((v0, v1, factor))
        }
        (Some((_, v)), None) | (None, Some((_, v))) => Some((v, v, 0.0)),
        (None, None) => None,
    }
}
