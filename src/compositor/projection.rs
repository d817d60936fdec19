//! Mapping between world space and viewport pixels.

use cgmath::{InnerSpace, Matrix4, SquareMatrix, Vector2, Vector3, Vector4};

/// Projects a world-space point to viewport pixels, origin top left.
///
/// Points behind the camera have no projection.
pub fn project(
    view: Matrix4<f32>,
    projection: Matrix4<f32>,
    viewport: [u32; 2],
    point: Vector3<f32>,
) -> Option<Vector2<f32>> {
    let clip = projection * view * point.extend(1.0);
    if clip.w <= f32::EPSILON {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    Some(Vector2::new(
        (ndc.x + 1.0) * 0.5 * viewport[0] as f32,
        (1.0 - ndc.y) * 0.5 * viewport[1] as f32,
    ))
}

/// Inverse of [`project`] for a pixel at normalized depth `depth` (0 near, 1 far).
pub fn unproject(
    view: Matrix4<f32>,
    projection: Matrix4<f32>,
    viewport: [u32; 2],
    pixel: Vector2<f32>,
    depth: f32,
) -> Option<Vector3<f32>> {
    if viewport[0] == 0 || viewport[1] == 0 {
        return None;
    }
    let ndc = Vector4::new(
        pixel.x / viewport[0] as f32 * 2.0 - 1.0,
        1.0 - pixel.y / viewport[1] as f32 * 2.0,
        depth,
        1.0,
    );
    let world = (projection * view).invert()? * ndc;
    if world.w.abs() <= f32::EPSILON {
        return None;
    }
    Some(world.truncate() / world.w)
}

/// Ray through `pixel`: its origin on the near plane and its unit direction.
pub fn pick_ray(
    view: Matrix4<f32>,
    projection: Matrix4<f32>,
    viewport: [u32; 2],
    pixel: Vector2<f32>,
) -> Option<(Vector3<f32>, Vector3<f32>)> {
    let near = unproject(view, projection, viewport, pixel, 0.0)?;
    let far = unproject(view, projection, viewport, pixel, 1.0)?;
    Some((near, (far - near).normalize()))
}
