//! Local and world transforms of scene nodes.
//!
//! A [`Transform`] is a plain 4x4 matrix. Tracking collaborators hand out full
//! matrices (camera poses, anchor transforms), so there is no decomposed form stored;
//! [`Transform::from_trs`] builds one from position, rotation and scale when a scene
//! builder prefers those.

use std::ops::Mul;

use cgmath::{Matrix4, SquareMatrix, Vector3, Vector4};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub matrix: Matrix4<f32>,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    pub fn from_translation(translation: Vector3<f32>) -> Self {
        Self {
            matrix: Matrix4::from_translation(translation),
        }
    }

    /// Translation, then rotation, then (non-uniform) scale.
    pub fn from_trs(
        position: Vector3<f32>,
        rotation: cgmath::Quaternion<f32>,
        scale: Vector3<f32>,
    ) -> Self {
        Self {
            matrix: Matrix4::from_translation(position)
                * Matrix4::from(rotation)
                * Matrix4::from_nonuniform_scale(scale.x, scale.y, scale.z),
        }
    }

    pub fn translation(&self) -> Vector3<f32> {
        self.matrix.w.truncate()
    }

    pub fn set_translation(&mut self, translation: Vector3<f32>) {
        self.matrix.w = Vector4::new(translation.x, translation.y, translation.z, 1.0);
    }

    pub fn inverse(&self) -> Option<Self> {
        self.matrix.invert().map(|matrix| Self { matrix })
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<Matrix4<f32>> for Transform {
    fn from(matrix: Matrix4<f32>) -> Self {
        Self { matrix }
    }
}

impl From<Vector3<f32>> for Transform {
    fn from(translation: Vector3<f32>) -> Self {
        Self::from_translation(translation)
    }
}

/// `parent * local` applies `local` first.
impl Mul<Transform> for Transform {
    type Output = Self;

    fn mul(self, rhs: Transform) -> Self::Output {
        Transform {
            matrix: self.matrix * rhs.matrix,
        }
    }
}

impl<'a, 'b> Mul<&'b Transform> for &'a Transform {
    type Output = Transform;

    fn mul(self, rhs: &'b Transform) -> Self::Output {
        Transform {
            matrix: self.matrix * rhs.matrix,
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, Rotation3};

    use super::*;

    #[test]
    fn trs_with_unit_values_is_identity() {
        let t = Transform::from_trs(
            Vector3::new(0.0, 0.0, 0.0),
            cgmath::Quaternion::from_angle_y(Deg(0.0)),
            Vector3::new(1.0, 1.0, 1.0),
        );
        assert_eq!(t, Transform::identity());
    }

    #[test]
    fn composition_applies_rotation_to_child_translation() {
        let parent = Transform::from_trs(
            Vector3::new(0.0, 0.0, 0.0),
            cgmath::Quaternion::from_angle_z(Deg(90.0)),
            Vector3::new(1.0, 1.0, 1.0),
        );
        let child = Transform::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let world = &parent * &child;
        let t = world.translation();
        assert!(t.x.abs() < 1e-5);
        assert!((t.y - 1.0).abs() < 1e-5);
    }
}
