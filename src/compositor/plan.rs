//! What a frame is going to do, decided before any GPU resource is touched.
//!
//! [`plan_frame`] only reads the scene. It either names the input that is missing,
//! in which case nothing at all is acquired or encoded for the frame, or returns the
//! passes and draws the executor records.

use cgmath::Matrix4;

use crate::{
    config::{MAX_INSTANCES, SceneTraversal},
    data_structures::{
        scene_graph::{NodeId, Scene},
        uniforms::FrameUniforms,
    },
    error::FrameSkip,
};

pub struct FrameInputs<'a> {
    pub scene: Option<&'a Scene>,
    pub point_of_view: Option<NodeId>,
    pub has_render_target: bool,
    /// A captured camera image is available for the background quad.
    pub has_camera_image: bool,
    pub traversal: SceneTraversal,
    pub clear_colour: wgpu::Color,
}

/// One mesh draw. Instances `first_instance..first_instance + instance_count` of the
/// instance block all hold `model`.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCommand {
    pub node: NodeId,
    pub model: Matrix4<f32>,
    pub first_instance: u32,
    pub instance_count: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PassPlan {
    Scene {
        clear_colour: wgpu::Color,
        clear_depth: f32,
        /// Draw the camera image quad before the geometry.
        background: bool,
        draws: Vec<DrawCommand>,
    },
    Composite,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FramePlan {
    pub point_of_view: NodeId,
    pub frame_uniforms: FrameUniforms,
    /// Projection of the point of view, needed by the composite pass as well.
    pub projection: Matrix4<f32>,
    pub passes: Vec<PassPlan>,
    /// Drawable nodes left out because the instance block was full.
    pub dropped: usize,
}

impl FramePlan {
    pub fn draws(&self) -> impl Iterator<Item = &DrawCommand> {
        self.passes.iter().flat_map(|pass| match pass {
            PassPlan::Scene { draws, .. } => draws.as_slice(),
            PassPlan::Composite => &[][..],
        })
    }

    pub fn draw_count(&self) -> usize {
        self.draws().count()
    }

    /// Number of instance-block entries the frame writes.
    pub fn instances_used(&self) -> u32 {
        self.draws()
            .map(|d| d.first_instance + d.instance_count)
            .max()
            .unwrap_or(0)
    }
}

/// Checks the inputs that decide whether a frame is drawn at all, in the order they
/// are reported.
pub fn check_inputs(inputs: &FrameInputs) -> Result<(), FrameSkip> {
    let scene = inputs.scene.ok_or(FrameSkip::NoScene)?;
    let point_of_view = inputs
        .point_of_view
        .and_then(|id| scene.node(id))
        .ok_or(FrameSkip::NoPointOfView)?;
    if point_of_view.camera.is_none() {
        return Err(FrameSkip::NoCamera);
    }
    if !inputs.has_render_target {
        return Err(FrameSkip::NoRenderTarget);
    }
    Ok(())
}

pub fn plan_frame(inputs: &FrameInputs) -> Result<FramePlan, FrameSkip> {
    check_inputs(inputs)?;
    let (Some(scene), Some(point_of_view)) = (inputs.scene, inputs.point_of_view) else {
        return Err(FrameSkip::NoScene);
    };
    let camera = scene
        .node(point_of_view)
        .and_then(|node| node.camera)
        .ok_or(FrameSkip::NoCamera)?;
    // the point of view's world transform is the eye pose; a degenerate pose has no view
    let view = scene
        .world_transform(point_of_view)
        .and_then(|pose| pose.inverse())
        .ok_or(FrameSkip::NoPointOfView)?
        .matrix;

    let mut draws = Vec::new();
    let mut next_instance = 0u32;
    let mut dropped = 0;
    for id in scene.draw_list(point_of_view, inputs.traversal) {
        let (Some(node), Some(world)) = (scene.node(id), scene.world_transform(id)) else {
            continue;
        };
        let Some(geometry) = &node.geometry else {
            continue;
        };
        let instance_count = geometry.mesh.instance_count();
        if next_instance.saturating_add(instance_count) > MAX_INSTANCES {
            log::warn!(
                "instance block full, skipping {:?} ({} instances)",
                node.name,
                instance_count
            );
            dropped += 1;
            continue;
        }
        draws.push(DrawCommand {
            node: id,
            model: world.matrix,
            first_instance: next_instance,
            instance_count,
        });
        next_instance += instance_count;
    }

    Ok(FramePlan {
        point_of_view,
        frame_uniforms: FrameUniforms::new(view, camera.projection),
        projection: camera.projection,
        passes: vec![
            PassPlan::Scene {
                clear_colour: inputs.clear_colour,
                clear_depth: 1.0,
                background: inputs.has_camera_image,
                draws,
            },
            PassPlan::Composite,
        ],
        dropped,
    })
}
