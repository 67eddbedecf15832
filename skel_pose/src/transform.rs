use std::ops::Mul;

use glam::{Mat3, Mat4, Quat, Vec3};

/// A rigid transform applying rotation followed by translation.
///
/// Bones in a pose never carry scale, so composing two [RigidTransform]
/// is exact and stays orthonormal up to float rounding.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    pub rotation: Quat,
    pub translation: Vec3,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RigidTransform {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
    };

    pub fn new(rotation: Quat, translation: Vec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn to_matrix(self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.translation)
    }

    /// Decompose `value` into a rotation and translation.
    ///
    /// Scale and shear are removed by orthonormalizing the basis first,
    /// so matrices with accumulated drift still produce a unit quaternion.
    pub fn from_matrix(value: Mat4) -> Self {
        let value = orthonormalize(value);
        Self {
            rotation: Quat::from_mat4(&value).normalize(),
            translation: value.w_axis.truncate(),
        }
    }

    pub fn inverse(self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            rotation,
            translation: -(rotation * self.translation),
        }
    }

    pub fn transform_point(self, point: Vec3) -> Vec3 {
        self.rotation * point + self.translation
    }

    pub fn abs_diff_eq(self, other: Self, max_abs_diff: f32) -> bool {
        // q and -q describe the same rotation.
        let same_rotation = self.rotation.abs_diff_eq(other.rotation, max_abs_diff)
            || self.rotation.abs_diff_eq(-other.rotation, max_abs_diff);
        same_rotation && self.translation.abs_diff_eq(other.translation, max_abs_diff)
    }
}

impl Mul<RigidTransform> for RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: RigidTransform) -> Self::Output {
        RigidTransform {
            rotation: (self.rotation * rhs.rotation).normalize(),
            translation: self.rotation.mul_vec3(rhs.translation) + self.translation,
        }
    }
}

/// Rebuild the upper 3x3 of `m` as an orthonormal basis using Gram-Schmidt.
///
/// The translation is preserved and a mirrored basis stays mirrored.
pub fn orthonormalize(m: Mat4) -> Mat4 {
    let x_in = m.x_axis.truncate();
    let y_in = m.y_axis.truncate();
    let z_in = m.z_axis.truncate();

    let x = x_in.try_normalize().unwrap_or(Vec3::X);
    let y = (y_in - x * x.dot(y_in))
        .try_normalize()
        .unwrap_or_else(|| x.any_orthonormal_vector());
    let mut z = x.cross(y);
    if z.dot(z_in) < 0.0 {
        z = -z;
    }

    Mat4::from_cols(x.extend(0.0), y.extend(0.0), z.extend(0.0), m.w_axis)
}

/// Invert a rotation and translation matrix without a general 4x4 inverse.
pub fn rigid_inverse(m: Mat4) -> Mat4 {
    let m = orthonormalize(m);
    let rotation = Mat3::from_mat4(m).transpose();
    let translation = -(rotation * m.w_axis.truncate());
    let mut inverse = Mat4::from_mat3(rotation);
    inverse.w_axis = translation.extend(1.0);
    inverse
}

/// Replace the rotation of a rigid matrix while keeping its translation.
pub fn with_rotation(m: Mat4, rotation: Quat) -> Mat4 {
    Mat4::from_rotation_translation(rotation, m.w_axis.truncate())
}

/// Replace the translation of a matrix while keeping its basis.
pub fn with_translation(m: Mat4, translation: Vec3) -> Mat4 {
    let mut m = m;
    m.w_axis = translation.extend(1.0);
    m
}
