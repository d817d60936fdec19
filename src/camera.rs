//! Camera parameters of a point-of-view node.
//!
//! The view matrix is not stored here: it is the inverse of the world transform of the
//! node that carries the camera, whose world transform is the eye pose. The compositor refreshes both from the current tracking frame
//! before every scene pass.

use cgmath::{Deg, Matrix4, SquareMatrix};

/// Maps OpenGL clip space (z in -1..1) onto wgpu clip space (z in 0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// Projection into wgpu clip space.
    pub projection: Matrix4<f32>,
    pub z_near: f32,
    pub z_far: f32,
}

impl Camera {
    /// A camera whose projection is supplied later by the tracking session.
    pub fn new(z_near: f32, z_far: f32) -> Self {
        Self {
            projection: Matrix4::identity(),
            z_near,
            z_far,
        }
    }

    pub fn perspective(fovy: Deg<f32>, aspect: f32, z_near: f32, z_far: f32) -> Self {
        Self {
            projection: OPENGL_TO_WGPU_MATRIX * cgmath::perspective(fovy, aspect, z_near, z_far),
            z_near,
            z_far,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(0.01, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Vector4;

    use super::*;

    #[test]
    fn perspective_maps_clip_planes_to_wgpu_depth_range() {
        let camera = Camera::perspective(Deg(60.0), 1.0, 0.1, 10.0);
        let near = camera.projection * Vector4::new(0.0, 0.0, -0.1, 1.0);
        let far = camera.projection * Vector4::new(0.0, 0.0, -10.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }
}
