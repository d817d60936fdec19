#![cfg(feature = "integration-tests")]

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use ar_ngin::{
    Context, EngineConfig, FrameCompositor, FrameRecorder, FrameSkip, RecorderConfig,
    camera::Camera,
    cgmath::{Deg, Matrix4, SquareMatrix, Vector3},
    compositor::readback::{padded_bytes_per_row, unpad_rows},
    data_structures::{
        geometry::Geometry,
        mesh::ProceduralShape,
        scene_graph::{Node, NodeId, Scene},
        texture::Texture,
    },
    error::ExportError,
    recorder::export::{MediaStore, VideoSink, VideoWriter},
    tracking::{CapturedImage, ImagePlane, MatteGenerator, Orientation, TrackingFrame},
    wgpu,
};
use image::RgbaImage;

const SIZE: [u32; 2] = [64, 64];

struct FlatFrame {
    image: CapturedImage,
}

impl FlatFrame {
    /// A camera image of one flat colour given in full-range Y'CbCr.
    fn new(y: u8, cb: u8, cr: u8) -> Self {
        let [w, h] = SIZE;
        let luma = ImagePlane {
            width: w,
            height: h,
            bytes_per_row: w,
            data: vec![y; (w * h) as usize].into(),
        };
        let chroma = ImagePlane {
            width: w / 2,
            height: h / 2,
            bytes_per_row: w,
            data: [cb, cr].repeat((w / 2 * h / 2) as usize).into(),
        };
        Self {
            image: CapturedImage { luma, chroma },
        }
    }
}

impl TrackingFrame for FlatFrame {
    fn timestamp(&self) -> Duration {
        Duration::ZERO
    }

    fn captured_image(&self) -> Option<&CapturedImage> {
        Some(&self.image)
    }

    fn view_matrix(&self, _orientation: Orientation) -> Matrix4<f32> {
        Matrix4::identity()
    }

    fn projection_matrix(
        &self,
        _orientation: Orientation,
        viewport: [u32; 2],
        z_near: f32,
        z_far: f32,
    ) -> Matrix4<f32> {
        let aspect = viewport[0] as f32 / viewport[1] as f32;
        Camera::perspective(Deg(60.0), aspect, z_near, z_far).projection
    }
}

/// Vertex colour of the procedural quad.
const QUAD_COLOUR: [u8; 4] = [230, 255, 0, 255];
const WHITE: [u8; 4] = [255, 255, 255, 255];

/// A matte of one value everywhere: `alpha` coverage at `depth` metres.
struct UniformMatte {
    alpha: u8,
    depth: f32,
}

impl MatteGenerator for UniformMatte {
    fn generate_matte(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        _frame: &dyn TrackingFrame,
        _encoder: &mut wgpu::CommandEncoder,
    ) -> Option<Texture> {
        Some(Texture::create_placeholder(
            device,
            queue,
            Texture::ALPHA_MATTE_FORMAT,
            &[self.alpha],
            "test_alpha_matte",
        ))
    }

    fn generate_dilated_depth(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        _frame: &dyn TrackingFrame,
        _encoder: &mut wgpu::CommandEncoder,
    ) -> Option<Texture> {
        Some(Texture::create_placeholder(
            device,
            queue,
            Texture::MATTE_DEPTH_FORMAT,
            &self.depth.to_le_bytes(),
            "test_dilated_depth",
        ))
    }
}

/// Counts appended frames and never touches the file system.
struct CountingSink {
    appended: Arc<Mutex<usize>>,
}

struct CountingWriter {
    appended: Arc<Mutex<usize>>,
}

impl VideoSink for CountingSink {
    fn open(
        &self,
        _path: &Path,
        _width: u32,
        _height: u32,
        _fps: u32,
    ) -> Result<Box<dyn VideoWriter>, ExportError> {
        Ok(Box::new(CountingWriter {
            appended: self.appended.clone(),
        }))
    }
}

impl VideoWriter for CountingWriter {
    fn append(&mut self, _frame: &RgbaImage, _presentation_time: Duration) -> Result<(), String> {
        *self.appended.lock().unwrap() += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), ExportError> {
        Ok(())
    }
}

struct KeepInPlace;

impl MediaStore for KeepInPlace {
    fn store(&self, file: &Path) -> Result<PathBuf, ExportError> {
        Ok(file.to_path_buf())
    }
}

/// The procedural quad facing the eye `distance` metres ahead. It covers the whole
/// 60 degree view for any distance used here.
fn add_quad(scene: &mut Scene, distance: f32) -> NodeId {
    let root = scene.root();
    scene
        .add_child(
            root,
            Node::named("quad")
                .with_geometry(Geometry::from_shape(ProceduralShape::Quad))
                .with_transform(Vector3::new(0.0, 0.0, -distance)),
        )
        .unwrap()
}

fn setup(config: EngineConfig) -> (Context, FrameCompositor, Scene, NodeId) {
    let ctx = futures::executor::block_on(Context::headless(SIZE, config))
        .expect("failed to create a headless context");
    let compositor = FrameCompositor::new(&ctx);
    let mut scene = Scene::new();
    let root = scene.root();
    let eye = scene
        .add_child(root, Node::named("eye").with_camera(Camera::default()))
        .unwrap();
    (ctx, compositor, scene, eye)
}

fn wait_idle(ctx: &Context) {
    ctx.device
        .poll(wgpu::PollType::wait_indefinitely())
        .expect("device poll failed");
}

fn read_target(ctx: &Context) -> RgbaImage {
    let texture = ctx.offscreen_target().expect("headless context has a target");
    let size = texture.size();
    let padded = padded_bytes_per_row(size.width);
    let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("test readback"),
        size: u64::from(padded) * u64::from(size.height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(size.height),
            },
        },
        size,
    );
    ctx.queue.submit(std::iter::once(encoder.finish()));
    buffer.slice(..).map_async(wgpu::MapMode::Read, |result| {
        result.expect("failed to map the readback buffer")
    });
    wait_idle(ctx);
    let data = buffer.slice(..).get_mapped_range();
    unpad_rows(&data, size.width, size.height, padded, false).expect("readback has the target size")
}

fn assert_close(actual: &image::Rgba<u8>, expected: [u8; 4]) {
    for (a, e) in actual.0.iter().zip(expected) {
        assert!(a.abs_diff(e) <= 2, "pixel {:?} differs from {:?}", actual.0, expected);
    }
}

#[test]
fn should_skip_frame_without_point_of_view() {
    let (mut ctx, mut compositor, mut scene, _) = setup(EngineConfig::default());
    let result = compositor.draw(&mut ctx, Some(&mut scene), None);
    assert_eq!(result, Err(FrameSkip::NoPointOfView));
    assert_eq!(compositor.frame_number(), 0);
    assert_eq!(compositor.frames_in_flight(), 0);
    assert_eq!(ctx.instance_pool.stats().misses, 0);
}

#[test]
fn should_show_camera_image_behind_empty_scene() {
    let (mut ctx, mut compositor, mut scene, eye) = setup(EngineConfig::default());
    // white: full luma, neutral chroma
    compositor.set_tracking_frame(Some(Arc::new(FlatFrame::new(255, 128, 128))));

    let stats = compositor.draw(&mut ctx, Some(&mut scene), Some(eye)).unwrap();
    assert!(stats.background);
    assert_eq!(stats.draws, 0);

    let image = read_target(&ctx);
    assert_close(image.get_pixel(0, 0), [255, 255, 255, 255]);
    assert_close(image.get_pixel(32, 32), [255, 255, 255, 255]);
}

#[test]
fn should_show_opaque_scene_clear_without_camera_image() {
    let mut config = EngineConfig::default();
    config.clear_colour = wgpu::Color::RED;
    let (mut ctx, mut compositor, mut scene, eye) = setup(config);

    let stats = compositor.draw(&mut ctx, Some(&mut scene), Some(eye)).unwrap();
    assert!(!stats.background);
    let image = read_target(&ctx);
    assert_close(image.get_pixel(10, 50), [255, 0, 0, 255]);
}

#[test]
fn should_return_instance_buffer_once_frame_completes() {
    let (mut ctx, mut compositor, mut scene, eye) = setup(EngineConfig::default());
    for _ in 0..3 {
        compositor.draw(&mut ctx, Some(&mut scene), Some(eye)).unwrap();
        wait_idle(&ctx);
    }
    let stats = ctx.instance_pool.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(compositor.frames_in_flight(), 0);
    assert_eq!(compositor.frame_number(), 3);
}

#[test]
fn should_hand_presented_frames_to_recorder() {
    let (mut ctx, mut compositor, mut scene, eye) = setup(EngineConfig::default());
    compositor.recorder().start_recording().unwrap();

    compositor.draw(&mut ctx, Some(&mut scene), Some(eye)).unwrap();
    wait_idle(&ctx);
    // completed readbacks are picked up at the start of the next frame
    compositor.draw(&mut ctx, Some(&mut scene), Some(eye)).unwrap();

    assert_eq!(compositor.recorder().sample_count(), 1);
}

#[test]
fn should_draw_scene_geometry_over_camera_image() {
    let (mut ctx, mut compositor, mut scene, eye) = setup(EngineConfig::default());
    compositor.set_tracking_frame(Some(Arc::new(FlatFrame::new(255, 128, 128))));
    add_quad(&mut scene, 2.0);

    let stats = compositor.draw(&mut ctx, Some(&mut scene), Some(eye)).unwrap();
    assert_eq!(stats.draws, 1);
    assert!(stats.background);

    let image = read_target(&ctx);
    assert_close(image.get_pixel(32, 32), QUAD_COLOUR);
}

#[test]
fn should_let_matte_occlude_geometry_behind_it() {
    let (mut ctx, compositor, mut scene, eye) = setup(EngineConfig::default());
    let mut compositor = compositor.with_matte_generator(Box::new(UniformMatte {
        alpha: 255,
        depth: 1.0,
    }));
    compositor.set_tracking_frame(Some(Arc::new(FlatFrame::new(255, 128, 128))));
    add_quad(&mut scene, 2.0);

    compositor.draw(&mut ctx, Some(&mut scene), Some(eye)).unwrap();

    // the subject at 1 m stands in front of the quad at 2 m: the camera shows through
    let image = read_target(&ctx);
    assert_close(image.get_pixel(32, 32), WHITE);
}

#[test]
fn should_keep_geometry_in_front_of_farther_matte() {
    let (mut ctx, compositor, mut scene, eye) = setup(EngineConfig::default());
    let mut compositor = compositor.with_matte_generator(Box::new(UniformMatte {
        alpha: 255,
        depth: 5.0,
    }));
    compositor.set_tracking_frame(Some(Arc::new(FlatFrame::new(255, 128, 128))));
    add_quad(&mut scene, 2.0);

    compositor.draw(&mut ctx, Some(&mut scene), Some(eye)).unwrap();

    let image = read_target(&ctx);
    assert_close(image.get_pixel(32, 32), QUAD_COLOUR);
}

#[test]
fn should_sample_bound_texture_instead_of_vertex_colour() {
    let (mut ctx, mut compositor, mut scene, eye) = setup(EngineConfig::default());
    let blue = image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        1,
        1,
        image::Rgba([0, 0, 255, 255]),
    ));
    let texture = Texture::from_image(&ctx.device, &ctx.queue, &blue, Some("blue"));
    ctx.textures.insert("blue", texture);
    let quad = add_quad(&mut scene, 2.0);
    if let Some(geometry) = scene.node_mut(quad).and_then(|node| node.geometry.as_mut()) {
        geometry.set_texture("blue");
    }

    compositor.draw(&mut ctx, Some(&mut scene), Some(eye)).unwrap();

    let image = read_target(&ctx);
    assert_close(image.get_pixel(32, 32), [0, 0, 255, 255]);
}

#[test]
fn should_deliver_outstanding_frames_before_stopping() {
    let (mut ctx, compositor, mut scene, eye) = setup(EngineConfig::default());
    let appended = Arc::new(Mutex::new(0));
    let recorder = FrameRecorder::with_backends(
        RecorderConfig {
            output_dir: std::env::temp_dir().join(format!("ar-ngin-stop-{}", std::process::id())),
            ..Default::default()
        },
        Arc::new(CountingSink {
            appended: appended.clone(),
        }),
        Arc::new(KeepInPlace),
    );
    let mut compositor = compositor.with_recorder(recorder);
    compositor.recorder().start_recording().unwrap();

    // the copy of this frame is still in flight when recording stops
    let stats = compositor.draw(&mut ctx, Some(&mut scene), Some(eye)).unwrap();
    assert!(stats.recorded);
    let handle = compositor
        .stop_recording(&ctx)
        .unwrap()
        .expect("the drawn frame reaches the recorder");

    assert!(handle.join().unwrap().is_some());
    assert_eq!(*appended.lock().unwrap(), 1);
    assert!(!compositor.recorder().is_recording());
}
