//! The per-frame state machine.
//!
//! Every call to [`FrameCompositor::draw`] runs one frame through the same steps:
//!
//! 1. poll finished GPU work and hand completed readbacks to the recorder
//! 2. plan the frame; a missing scene, point of view, camera or target skips it
//!    before anything is acquired
//! 3. claim the in-flight slot of the frame and the pooled instance buffer
//! 4. make sure the scene targets match the surface and update the matte
//! 5. scene pass: camera image quad, then every visible node
//! 6. composite pass into the surface
//! 7. submit, return the instance buffer to the pool once the GPU is done with it,
//!    present and advance scene time

pub mod in_flight;
pub mod plan;
pub mod projection;
pub mod readback;
pub mod targets;

use std::{num::NonZeroU64, sync::Arc};

use cgmath::{Matrix4, Vector2, Vector3};
use instant::Duration;
use wgpu::util::DeviceExt;

use crate::{
    compositor::{
        in_flight::{InFlightSlots, SlotBuffers},
        plan::{FrameInputs, FramePlan, PassPlan, plan_frame},
        readback::Readback,
        targets::{CameraTextures, MatteTextures, RenderTargets, SceneTargets},
    },
    config::EngineConfig,
    context::Context,
    data_structures::{
        geometry::MaterialResources,
        scene_graph::{NodeId, Scene},
        texture::Texture,
        transform::Transform,
        uniforms::{
            CompositeUniforms, DisplayTransformUniform, FRAME_UNIFORMS_BINDING,
            MODEL_CONSTANTS_BINDING, ModelConstants,
        },
        vertex::CANONICAL_QUAD,
    },
    error::{FrameSkip, RecorderError},
    pipelines::{PipelineType, composite, video},
    recorder::{ExportHandle, FrameRecorder},
    tracking::{AffineTransform, MatteGenerator, Orientation, TrackingFrame},
};

/// What a drawn frame did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_number: u64,
    pub draws: usize,
    /// Drawable nodes that did not fit into the instance block.
    pub dropped: usize,
    pub background: bool,
    pub recorded: bool,
}

pub struct FrameCompositor {
    frame_number: u64,
    clock: Duration,
    orientation: Orientation,
    slots: InFlightSlots,
    slot_buffers: Vec<SlotBuffers>,
    targets: RenderTargets,
    camera: CameraTextures,
    matte: MatteTextures,
    matte_generator: Option<Box<dyn MatteGenerator>>,
    readback: Readback,
    recorder: FrameRecorder,
    quad: wgpu::Buffer,
    scene_quad: wgpu::Buffer,
    tracking_frame: Option<Arc<dyn TrackingFrame>>,
}

impl FrameCompositor {
    /// The number of in-flight slots is taken from the context's engine config at this
    /// point; later changes to it have no effect.
    pub fn new(ctx: &Context) -> Self {
        let slots = InFlightSlots::new(ctx.engine.max_frames_in_flight);
        let slot_buffers = (0..slots.len())
            .map(|slot| SlotBuffers::new(&ctx.device, slot))
            .collect();
        let quad_buffer = |label| {
            ctx.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice(&CANONICAL_QUAD),
                    usage: wgpu::BufferUsages::VERTEX,
                })
        };
        Self {
            frame_number: 0,
            clock: Duration::ZERO,
            orientation: Orientation::default(),
            slots,
            slot_buffers,
            targets: RenderTargets::default(),
            camera: CameraTextures::default(),
            matte: MatteTextures::default(),
            matte_generator: None,
            readback: Readback::new(ctx.readback_pool.clone()),
            recorder: FrameRecorder::new(ctx.engine.recorder.clone()),
            quad: quad_buffer("Canonical Quad"),
            scene_quad: quad_buffer("Scene Quad"),
            tracking_frame: None,
        }
    }

    pub fn with_matte_generator(mut self, generator: Box<dyn MatteGenerator>) -> Self {
        self.matte_generator = Some(generator);
        self
    }

    pub fn with_recorder(mut self, recorder: FrameRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn recorder(&self) -> &FrameRecorder {
        &self.recorder
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Global frame clock, advanced by `frame_time_step` every drawn frame.
    pub fn clock(&self) -> Duration {
        self.clock
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }

    pub fn set_tracking_frame(&mut self, frame: Option<Arc<dyn TrackingFrame>>) {
        self.tracking_frame = frame;
    }

    pub fn tracking_frame(&self) -> Option<&Arc<dyn TrackingFrame>> {
        self.tracking_frame.as_ref()
    }

    /// Stops the recorder once every frame already copied for it has arrived.
    ///
    /// Readbacks of submitted frames are otherwise only picked up by the next
    /// [`draw`](Self::draw) and would reach an idle recorder. This waits for the GPU
    /// while such copies are outstanding.
    pub fn stop_recording(&mut self, ctx: &Context) -> Result<Option<ExportHandle>, RecorderError> {
        if self.readback.pending() > 0 {
            if let Err(e) = ctx.device.poll(wgpu::PollType::wait_indefinitely()) {
                log::warn!("waiting for outstanding readbacks failed: {}", e);
            }
        }
        let delivered = self.readback.drain(&self.recorder);
        log::debug!("{} readback(s) delivered before stopping", delivered);
        self.recorder.stop_recording()
    }

    /// Number of frames whose GPU work has not completed yet.
    pub fn frames_in_flight(&self) -> usize {
        self.slots.in_flight()
    }

    /// Moves the point of view to the pose of the current tracking frame and updates
    /// its projection for `viewport`.
    ///
    /// The tracked pose is in world space. It is stored relative to the node's parent
    /// so the node's world transform ends up at the tracked eye wherever it hangs.
    pub fn update_point_of_view(&self, scene: &mut Scene, point_of_view: NodeId, viewport: [u32; 2]) {
        let Some(frame) = &self.tracking_frame else {
            return;
        };
        if !scene.contains(point_of_view) {
            return;
        }
        let Some(local) = tracked_local_pose(scene, point_of_view, frame.view_matrix(self.orientation))
        else {
            log::warn!("tracked pose cannot be expressed below the point of view's parent");
            return;
        };
        let Some(node) = scene.node_mut(point_of_view) else {
            return;
        };
        node.transform = local;
        if let Some(camera) = node.camera.as_mut() {
            camera.projection =
                frame.projection_matrix(self.orientation, viewport, camera.z_near, camera.z_far);
        }
    }

    /// World point to viewport pixels, using the pose of the current tracking frame.
    pub fn project_point(
        &self,
        point: Vector3<f32>,
        viewport: [u32; 2],
        config: &EngineConfig,
    ) -> Option<Vector2<f32>> {
        let frame = self.tracking_frame.as_ref()?;
        projection::project(
            frame.view_matrix(self.orientation),
            frame.projection_matrix(self.orientation, viewport, config.z_near, config.z_far),
            viewport,
            point,
        )
    }

    /// Viewport pixel at normalized `depth` back to world space, using the pose of the
    /// current tracking frame.
    pub fn unproject_point(
        &self,
        pixel: Vector2<f32>,
        depth: f32,
        viewport: [u32; 2],
        config: &EngineConfig,
    ) -> Option<Vector3<f32>> {
        let frame = self.tracking_frame.as_ref()?;
        projection::unproject(
            frame.view_matrix(self.orientation),
            frame.projection_matrix(self.orientation, viewport, config.z_near, config.z_far),
            viewport,
            pixel,
            depth,
        )
    }

    /// Draws one frame, or returns why it was skipped. A skipped frame submits no GPU
    /// work and leaves every pooled resource where it was.
    pub fn draw(
        &mut self,
        ctx: &mut Context,
        mut scene: Option<&mut Scene>,
        point_of_view: Option<NodeId>,
    ) -> Result<FrameStats, FrameSkip> {
        if let Err(e) = ctx.device.poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {}", e);
        }
        self.readback.drain(&self.recorder);

        let viewport = ctx.size();
        if let (Some(scene), Some(point_of_view)) = (scene.as_deref_mut(), point_of_view) {
            self.update_point_of_view(scene, point_of_view, viewport);
        }
        let captured_image = self
            .tracking_frame
            .as_ref()
            .and_then(|frame| frame.captured_image().cloned());

        let frame_number = self.frame_number;
        let skip = |reason: FrameSkip| {
            log::debug!("frame {} skipped: {}", frame_number, reason);
            reason
        };
        let plan = plan_frame(&FrameInputs {
            scene: scene.as_deref(),
            point_of_view,
            has_render_target: ctx.has_render_target(),
            has_camera_image: captured_image.is_some(),
            traversal: ctx.engine.traversal,
            clear_colour: ctx.engine.clear_colour,
        })
        .map_err(skip)?;
        let Some(scene) = scene else {
            return Err(skip(FrameSkip::NoScene));
        };
        let token = self
            .slots
            .try_claim(frame_number)
            .ok_or_else(|| skip(FrameSkip::InFlightLimit))?;
        let target = ctx.acquire_target().map_err(skip)?;

        // BeginFrame
        self.clock += ctx.engine.frame_time_step;
        let instance_buffer_size = ctx.engine.instance_buffer_size();
        let instance_buffer = ctx.instance_pool.acquire(instance_buffer_size);
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        // ConfigureMatteTargets
        let scene_targets = self.targets.ensure(&ctx.device, viewport);

        // UpdateMatte
        match &captured_image {
            Some(image) => self.camera.upload(&ctx.device, &ctx.queue, image),
            None => self.camera.clear(),
        }
        self.matte = match (&mut self.matte_generator, &self.tracking_frame) {
            (Some(generator), Some(frame)) => MatteTextures {
                alpha: generator.generate_matte(&ctx.device, &ctx.queue, frame.as_ref(), &mut encoder),
                dilated_depth: generator.generate_dilated_depth(
                    &ctx.device,
                    &ctx.queue,
                    frame.as_ref(),
                    &mut encoder,
                ),
            },
            _ => MatteTextures::default(),
        };

        // per-frame constant blocks
        let slot = &self.slot_buffers[token.slot()];
        let display_transform = self
            .tracking_frame
            .as_ref()
            .map_or(AffineTransform::IDENTITY, |frame| {
                frame.display_transform(self.orientation, viewport)
            });
        let inverse_display = display_transform.inverse().unwrap_or_else(|| {
            log::warn!("display transform is not invertible, using identity");
            AffineTransform::IDENTITY
        });
        ctx.queue.write_buffer(
            &slot.display_transform,
            0,
            bytemuck::bytes_of(&DisplayTransformUniform::from(inverse_display.to_matrix3())),
        );
        ctx.queue.write_buffer(
            &slot.frame_uniforms,
            0,
            bytemuck::bytes_of(&plan.frame_uniforms),
        );
        ctx.queue.write_buffer(
            &slot.composite_uniforms,
            0,
            bytemuck::bytes_of(&CompositeUniforms::from(plan.projection)),
        );
        let instances = instance_data(&plan);
        if !instances.is_empty() {
            ctx.queue
                .write_buffer(&instance_buffer, 0, bytemuck::cast_slice(&instances));
        }

        // ScenePass
        let materials = MaterialResources {
            layout: &ctx.layouts.material,
            textures: &ctx.textures,
            placeholder: &ctx.placeholders.texture,
            sampler: &ctx.sampler,
        };
        for draw in plan.draws() {
            if let Some(geometry) = scene
                .node_mut(draw.node)
                .and_then(|node| node.geometry.as_mut())
            {
                geometry.write_to_buffers(&ctx.device, &materials);
            }
        }
        let frame_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame_bind_group"),
            layout: &ctx.layouts.frame,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: FRAME_UNIFORMS_BINDING,
                    resource: slot.frame_uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: MODEL_CONSTANTS_BINDING,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &instance_buffer,
                        offset: 0,
                        size: NonZeroU64::new(instance_buffer_size),
                    }),
                },
            ],
        });
        let (luma, chroma) = self
            .camera
            .planes()
            .unwrap_or((&ctx.placeholders.luma, &ctx.placeholders.chroma));
        let video_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("video_bind_group"),
            layout: &ctx.layouts.video,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: video::DISPLAY_TRANSFORM_BINDING,
                    resource: slot.display_transform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: video::LUMA_BINDING,
                    resource: wgpu::BindingResource::TextureView(&luma.view),
                },
                wgpu::BindGroupEntry {
                    binding: video::CHROMA_BINDING,
                    resource: wgpu::BindingResource::TextureView(&chroma.view),
                },
                wgpu::BindGroupEntry {
                    binding: video::SAMPLER_BINDING,
                    resource: wgpu::BindingResource::Sampler(&ctx.sampler),
                },
            ],
        });
        let background = self.camera.planes().is_some();
        for pass in &plan.passes {
            match pass {
                PassPlan::Scene {
                    clear_colour,
                    clear_depth,
                    background: wants_background,
                    draws,
                } => {
                    let mut render_pass = begin_scene_pass(
                        &mut encoder,
                        scene_targets,
                        *clear_colour,
                        *clear_depth,
                    );
                    if *wants_background && background {
                        render_pass.set_pipeline(ctx.pipelines.get(PipelineType::Video));
                        render_pass.set_bind_group(0, &video_bind_group, &[]);
                        render_pass.set_vertex_buffer(0, self.quad.slice(..));
                        render_pass.draw(0..CANONICAL_QUAD.len() as u32, 0..1);
                    }
                    render_pass.set_pipeline(ctx.pipelines.get(PipelineType::Basic));
                    render_pass.set_bind_group(0, &frame_bind_group, &[]);
                    for draw in draws {
                        let Some(geometry) = scene
                            .node(draw.node)
                            .and_then(|node| node.geometry.as_ref())
                        else {
                            continue;
                        };
                        let Some(material) = geometry.bind_group() else {
                            log::warn!("{:?} has no material binding, skipping", draw.node);
                            continue;
                        };
                        render_pass.set_bind_group(1, material, &[]);
                        geometry.mesh.draw(&mut render_pass, draw.first_instance);
                    }
                }
                PassPlan::Composite => {
                    let composite_bind_group = composite_bind_group(
                        ctx,
                        slot,
                        scene_targets,
                        &self.matte,
                        (luma, chroma),
                    );
                    let view = target
                        .texture()
                        .create_view(&wgpu::TextureViewDescriptor::default());
                    let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Composite Pass"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &view,
                            depth_slice: None,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                                store: wgpu::StoreOp::Store,
                            },
                        })],
                        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                            view: &ctx.depth_texture.view,
                            depth_ops: Some(wgpu::Operations {
                                load: wgpu::LoadOp::Clear(1.0),
                                store: wgpu::StoreOp::Discard,
                            }),
                            stencil_ops: None,
                        }),
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                    render_pass.set_pipeline(ctx.pipelines.get(PipelineType::Composite));
                    render_pass.set_bind_group(0, &composite_bind_group, &[]);
                    render_pass.set_vertex_buffer(0, self.quad.slice(..));
                    render_pass.set_vertex_buffer(1, self.scene_quad.slice(..));
                    render_pass.draw(0..CANONICAL_QUAD.len() as u32, 0..1);
                }
            }
        }

        // Present
        let recorded = self.recorder.is_recording();
        if recorded {
            self.readback
                .encode_copy(&mut encoder, target.texture(), self.clock);
        }

        // EndFrame
        ctx.queue.submit(std::iter::once(encoder.finish()));
        let pool = ctx.instance_pool.clone();
        ctx.queue.on_submitted_work_done(move || {
            pool.release(instance_buffer);
            drop(token);
        });
        self.readback.map_submitted();
        target.present();
        scene.update(ctx.engine.scene_time_step);
        self.frame_number += 1;

        Ok(FrameStats {
            frame_number,
            draws: plan.draw_count(),
            dropped: plan.dropped,
            background,
            recorded,
        })
    }
}

/// Local transform that puts `point_of_view` at the eye described by `view` (world to
/// camera). `None` for an unknown node or when `view` or the parent's world transform
/// cannot be inverted.
pub fn tracked_local_pose(
    scene: &Scene,
    point_of_view: NodeId,
    view: Matrix4<f32>,
) -> Option<Transform> {
    let pose = Transform::from(view).inverse()?;
    let parent_world = match scene.node(point_of_view)?.parent() {
        Some(parent) => scene.world_transform(parent)?,
        None => Transform::identity(),
    };
    Some(parent_world.inverse()? * pose)
}

fn texture_entry(binding: u32, texture: &Texture) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: wgpu::BindingResource::TextureView(&texture.view),
    }
}

/// Everything the composite shader reads. Missing matte textures are replaced by
/// placeholders that disable occlusion.
fn composite_bind_group(
    ctx: &Context,
    slot: &SlotBuffers,
    scene_targets: &SceneTargets,
    matte: &MatteTextures,
    (luma, chroma): (&Texture, &Texture),
) -> wgpu::BindGroup {
    let alpha = matte.alpha.as_ref().unwrap_or(&ctx.placeholders.alpha_matte);
    let dilated_depth = matte
        .dilated_depth
        .as_ref()
        .unwrap_or(&ctx.placeholders.matte_depth);
    ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("composite_bind_group"),
        layout: &ctx.layouts.composite,
        entries: &[
            wgpu::BindGroupEntry {
                binding: composite::DISPLAY_TRANSFORM_BINDING,
                resource: slot.display_transform.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: composite::COMPOSITE_UNIFORMS_BINDING,
                resource: slot.composite_uniforms.as_entire_binding(),
            },
            texture_entry(composite::LUMA_BINDING, luma),
            texture_entry(composite::CHROMA_BINDING, chroma),
            texture_entry(composite::SCENE_COLOUR_BINDING, &scene_targets.colour),
            texture_entry(composite::SCENE_DEPTH_BINDING, &scene_targets.depth),
            texture_entry(composite::ALPHA_MATTE_BINDING, alpha),
            texture_entry(composite::DILATED_DEPTH_BINDING, dilated_depth),
            wgpu::BindGroupEntry {
                binding: composite::SAMPLER_BINDING,
                resource: wgpu::BindingResource::Sampler(&ctx.sampler),
            },
        ],
    })
}

/// Model constants of every planned draw, one entry per instance.
fn instance_data(plan: &FramePlan) -> Vec<ModelConstants> {
    let identity = ModelConstants::from(Matrix4::from_scale(1.0));
    let mut instances = vec![identity; plan.instances_used() as usize];
    for draw in plan.draws() {
        let start = draw.first_instance as usize;
        let end = start + draw.instance_count as usize;
        instances[start..end].fill(ModelConstants::from(draw.model));
    }
    instances
}

fn begin_scene_pass<'a>(
    encoder: &'a mut wgpu::CommandEncoder,
    targets: &SceneTargets,
    clear_colour: wgpu::Color,
    clear_depth: f32,
) -> wgpu::RenderPass<'a> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Scene Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &targets.colour.view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(clear_colour),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: &targets.depth.view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(clear_depth),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        camera::Camera,
        config::SceneTraversal,
        data_structures::{geometry::Geometry, mesh::ProceduralShape, scene_graph::Node},
    };

    #[test]
    fn instance_entries_repeat_the_world_matrix() {
        let mut scene = Scene::new();
        let root = scene.root();
        let eye = scene
            .add_child(root, Node::named("eye").with_camera(Camera::default()))
            .unwrap();
        let mut geometry = Geometry::from_shape(ProceduralShape::Cube);
        geometry.mesh.set_instance_count(2);
        scene
            .add_child(
                root,
                Node::new()
                    .with_geometry(geometry)
                    .with_transform(Vector3::new(1.0, 2.0, 3.0)),
            )
            .unwrap();
        let plan = plan_frame(&FrameInputs {
            scene: Some(&scene),
            point_of_view: Some(eye),
            has_render_target: true,
            has_camera_image: false,
            traversal: SceneTraversal::BreadthFirst,
            clear_colour: wgpu::Color::TRANSPARENT,
        })
        .unwrap();

        let instances = instance_data(&plan);
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0], instances[1]);
        assert_eq!(instances[1].model[3], [1.0, 2.0, 3.0, 1.0]);
    }
}
