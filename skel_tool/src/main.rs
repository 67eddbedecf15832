use std::time::Instant;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use glam::{Mat4, Quat, Vec3, vec3};
use log::{debug, info};
use skel_pose::{
    Bone, NodeTree, PoseSpace, RigidTransform, Skeleton, Skinning, SkinningController,
    animation::{Animation, Channel, PlayMode},
};

#[derive(Parser)]
#[command(author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// The number of bones in the generated chain.
    #[arg(long, default_value_t = 4)]
    bones: usize,

    /// The number of frames to animate.
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// The rotation in degrees for each bone on the final frame.
    #[arg(long, default_value_t = 45.0)]
    angle: f32,

    /// The playback rate used to report animation duration.
    #[arg(long, default_value_t = 30.0)]
    fps: f32,

    /// How bone transforms are animated.
    #[arg(long, value_enum, default_value_t = Mode::Pose)]
    mode: Mode,

    /// Write the animation and the skinning matrices for each frame to a JSON file.
    #[arg(long)]
    output: Option<String>,

    /// Print debug logs.
    #[arg(long)]
    verbose: bool,
}

#[derive(Copy, PartialEq, Clone, Eq, ValueEnum)]
enum Mode {
    /// Apply channels to a pose and sync the whole skeleton.
    Pose,
    /// Apply channels to scene nodes and update a pruned pose tree.
    Scene,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(not(feature = "tracing"))]
    simple_logger::SimpleLogger::new()
        .with_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init()?;

    #[cfg(feature = "tracing")]
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .try_init()
        .map_err(anyhow::Error::msg)?;

    let names: Vec<_> = (0..cli.bones).map(|i| format!("bone{i}")).collect();
    let skeleton = chain_skeleton(&names)?;
    let animation = bend_animation(&names, cli.frames, cli.fps, cli.angle.to_radians());
    info!(
        "Animating {} bones for {} frames ({:.2}s)",
        skeleton.bone_count(),
        animation.frame_count,
        animation.frame_count as f32 / animation.frames_per_second
    );

    let start = Instant::now();
    let frames = match cli.mode {
        Mode::Pose => animate_pose(&skeleton, &animation),
        Mode::Scene => animate_scene(&skeleton, &names, &animation),
    };
    info!("Calculated skinning matrices in {:?}", start.elapsed());

    if let Some(output) = cli.output {
        let json = serde_json::json!({
            "animation": animation,
            "frames": frames,
        });
        std::fs::write(&output, serde_json::to_string_pretty(&json)?)?;
        info!("Wrote {output:?}");
    }

    Ok(())
}

fn chain_skeleton(names: &[String]) -> Result<Skeleton> {
    let bones = names
        .iter()
        .enumerate()
        .map(|(i, name)| Bone {
            name: name.clone(),
            transform: RigidTransform::from_translation(if i == 0 { Vec3::ZERO } else { Vec3::Y }),
            parent_index: i.checked_sub(1),
        })
        .collect();
    let mut skeleton = Skeleton::new(bones)?;
    // Each bone is offset from its parent along Y.
    skeleton.set_bone_axis(Vec3::Y);
    Ok(skeleton)
}

fn bend_animation(
    names: &[String],
    frame_count: u32,
    frames_per_second: f32,
    angle: f32,
) -> Animation {
    let final_frame = frame_count.saturating_sub(1) as f32;
    let channels = names
        .iter()
        .map(|name| {
            let mut channel = Channel::new(name.clone());
            let keyframes = &mut channel.rotation_keyframes;
            keyframes.insert(0.0.into(), Quat::IDENTITY);
            keyframes.insert(final_frame.into(), Quat::from_rotation_x(angle));
            channel
        })
        .collect();

    Animation {
        name: "bend".to_string(),
        frames_per_second,
        frame_count,
        play_mode: PlayMode::Loop,
        channels,
    }
}

fn animate_pose(skeleton: &Skeleton, animation: &Animation) -> Vec<Vec<[f32; 16]>> {
    let mut pose = skeleton.make_pose(PoseSpace::Skeleton);
    let mut skinning = Skinning::new(skeleton);

    let frames = (0..animation.frame_count)
        .map(|frame| {
            animation.apply(skeleton, &mut pose, frame as f32);
            let changed = pose.sync();
            if !skinning.update(skeleton, &pose, changed, Mat4::IDENTITY) {
                debug!("Reused skinning matrices for frame {frame}");
            }
            matrices(&skinning)
        })
        .collect();

    if let Some(tip) = skeleton.bone_count().checked_sub(1) {
        let direction = skeleton.bone_direction(&pose, tip);
        info!("Bone {tip} points along {direction} on the final frame");
    }
    frames
}

fn animate_scene(
    skeleton: &Skeleton,
    names: &[String],
    animation: &Animation,
) -> Vec<Vec<[f32; 16]>> {
    let mut scene = NodeTree::new();
    let root = scene.add_node("root", RigidTransform::IDENTITY, None);
    let mut parent = root;
    for (i, name) in names.iter().enumerate() {
        let transform = skeleton.bind_local_transform(i).unwrap_or_default();
        parent = scene.add_node(name.clone(), transform, Some(parent));
    }
    // Unanimated nodes are pruned from the update.
    scene.add_node("camera", RigidTransform::from_translation(vec3(0.0, 1.0, 5.0)), Some(root));

    let mut controller = SkinningController::new(&scene, root, skeleton, animation.clone());
    (0..animation.frame_count)
        .map(|frame| {
            controller.animate(&mut scene, skeleton, frame as f32, Mat4::IDENTITY);
            matrices(controller.skinning())
        })
        .collect()
}

fn matrices(skinning: &Skinning) -> Vec<[f32; 16]> {
    skinning
        .matrices()
        .iter()
        .map(|m| m.to_cols_array())
        .collect()
}
