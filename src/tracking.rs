//! Interfaces of the AR tracking collaborators.
//!
//! The engine does not track anything itself. A [`TrackingSession`] supplies frames
//! (camera image, pose, projection) and anchor events, a [`MatteGenerator`] turns a
//! frame into the occlusion matte. Both are implemented by the embedding application.

use std::sync::Arc;

use cgmath::{Matrix3, Matrix4, Vector2};
use instant::Duration;

use crate::data_structures::texture::Texture;

/// Interface orientation of the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

/// 2D affine transform in the row-vector convention of display transforms:
/// `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineTransform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl AffineTransform {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Normalized camera-image coordinates to normalized view coordinates for a sensor
    /// mounted in landscape-right.
    pub fn for_orientation(orientation: Orientation) -> Self {
        match orientation {
            // x' = 1 - v, y' = u
            Orientation::Portrait => Self {
                a: 0.0,
                b: 1.0,
                c: -1.0,
                d: 0.0,
                tx: 1.0,
                ty: 0.0,
            },
            // x' = v, y' = 1 - u
            Orientation::PortraitUpsideDown => Self {
                a: 0.0,
                b: -1.0,
                c: 1.0,
                d: 0.0,
                tx: 0.0,
                ty: 1.0,
            },
            Orientation::LandscapeLeft => Self {
                a: -1.0,
                b: 0.0,
                c: 0.0,
                d: -1.0,
                tx: 1.0,
                ty: 1.0,
            },
            Orientation::LandscapeRight => Self::IDENTITY,
        }
    }

    pub fn apply(&self, p: Vector2<f32>) -> Vector2<f32> {
        Vector2::new(
            self.a * p.x + self.c * p.y + self.tx,
            self.b * p.x + self.d * p.y + self.ty,
        )
    }

    /// Column-major 3x3 matrix with columns `[a, b, 0]`, `[c, d, 0]`, `[tx, ty, 1]`.
    pub fn to_matrix3(&self) -> Matrix3<f32> {
        Matrix3::new(
            self.a, self.b, 0.0, //
            self.c, self.d, 0.0, //
            self.tx, self.ty, 1.0,
        )
    }

    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() <= f32::EPSILON {
            return None;
        }
        Some(Self {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            tx: (self.c * self.ty - self.d * self.tx) / det,
            ty: (self.b * self.tx - self.a * self.ty) / det,
        })
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One plane of a planar camera image, rows tightly packed unless `bytes_per_row`
/// says otherwise.
#[derive(Clone, Debug)]
pub struct ImagePlane {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    pub data: Arc<[u8]>,
}

/// Bi-planar camera image: full resolution luma (1 byte per texel) and half
/// resolution interleaved chroma (2 bytes per texel).
#[derive(Clone, Debug)]
pub struct CapturedImage {
    pub luma: ImagePlane,
    pub chroma: ImagePlane,
}

/// A tracked camera frame.
pub trait TrackingFrame: Send + Sync {
    fn timestamp(&self) -> Duration;

    fn captured_image(&self) -> Option<&CapturedImage>;

    /// World to camera for the given orientation.
    fn view_matrix(&self, orientation: Orientation) -> Matrix4<f32>;

    /// Camera to wgpu clip space (depth 0..1).
    fn projection_matrix(
        &self,
        orientation: Orientation,
        viewport: [u32; 2],
        z_near: f32,
        z_far: f32,
    ) -> Matrix4<f32>;

    fn display_transform(&self, orientation: Orientation, _viewport: [u32; 2]) -> AffineTransform {
        AffineTransform::for_orientation(orientation)
    }
}

pub type AnchorId = u64;

#[derive(Clone, Debug, PartialEq)]
pub struct PlaneGeometryData {
    pub vertices: Vec<[f32; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub indices: Vec<u16>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnchorKind {
    /// A user-placed anchor without geometry of its own.
    Point,
    Plane(PlaneGeometryData),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Anchor {
    pub id: AnchorId,
    pub transform: Matrix4<f32>,
    pub kind: AnchorKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnchorEvent {
    Added(Anchor),
    Updated(Anchor),
    Removed(AnchorId),
}

pub trait TrackingSession {
    fn current_frame(&self) -> Option<Arc<dyn TrackingFrame>>;

    /// Anchor changes since the last call.
    fn poll_anchor_events(&mut self) -> Vec<AnchorEvent>;
}

/// Produces the occlusion matte of a frame. Work may be recorded into `encoder`, which
/// is submitted together with the frame that uses the result.
pub trait MatteGenerator {
    /// Alpha matte, 1 where a real-world foreground subject covers the pixel.
    fn generate_matte(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        frame: &dyn TrackingFrame,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Option<Texture>;

    /// Linear depth in metres of the dilated foreground.
    fn generate_dilated_depth(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        frame: &dyn TrackingFrame,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Option<Texture>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vector2<f32>, b: Vector2<f32>) -> bool {
        (a.x - b.x).abs() < 1e-5 && (a.y - b.y).abs() < 1e-5
    }

    #[test]
    fn inverse_undoes_every_orientation() {
        for orientation in [
            Orientation::Portrait,
            Orientation::PortraitUpsideDown,
            Orientation::LandscapeLeft,
            Orientation::LandscapeRight,
        ] {
            let t = AffineTransform::for_orientation(orientation);
            let inv = t.inverse().unwrap();
            let p = Vector2::new(0.25, 0.75);
            assert!(close(inv.apply(t.apply(p)), p), "{:?}", orientation);
        }
    }

    #[test]
    fn matrix_agrees_with_apply() {
        let t = AffineTransform::for_orientation(Orientation::Portrait);
        let m = t.to_matrix3() * cgmath::Vector3::new(0.2, 0.6, 1.0);
        assert!(close(Vector2::new(m.x, m.y), t.apply(Vector2::new(0.2, 0.6))));
        assert!(close(t.apply(Vector2::new(0.2, 0.6)), Vector2::new(0.4, 0.2)));
    }

    #[test]
    fn degenerate_transform_has_no_inverse() {
        let t = AffineTransform {
            a: 1.0,
            b: 2.0,
            c: 2.0,
            d: 4.0,
            tx: 0.0,
            ty: 0.0,
        };
        assert!(t.inverse().is_none());
    }
}
