//! Transform component

use crate::foundation::math::{Mat4, Quat, Quaternion, Vec3};

/// Local position, rotation and uniform scale of a game object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformComponent {
    local_position: Vec3,
    local_rotation: Quat,
    local_scale: f32,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self {
            local_position: Vec3::zeros(),
            local_rotation: Quat::identity(),
            local_scale: 1.0,
        }
    }
}

impl TransformComponent {
    /// Identity transform
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform at `position`
    pub fn from_position(position: Vec3) -> Self {
        Self {
            local_position: position,
            ..Default::default()
        }
    }

    /// Position relative to the parent space
    pub fn local_position(&self) -> Vec3 {
        self.local_position
    }

    /// Move to `position`
    pub fn set_local_position(&mut self, position: Vec3) {
        self.local_position = position;
    }

    /// Rotation relative to the parent space
    pub fn local_rotation(&self) -> Quat {
        self.local_rotation
    }

    /// Rotate to `rotation`
    pub fn set_local_rotation(&mut self, rotation: Quat) {
        self.local_rotation = rotation;
    }

    /// Set the rotation from a vector part `(x, y, z)` and scalar part `s`.
    ///
    /// The quaternion is normalized; a zero quaternion becomes the identity.
    pub fn set_local_rotation_components(&mut self, x: f32, y: f32, z: f32, s: f32) {
        self.local_rotation = Quat::try_new(Quaternion::new(s, x, y, z), f32::EPSILON).unwrap_or_else(Quat::identity);
    }

    /// Rotation as `[x, y, z, s]`
    pub fn local_rotation_components(&self) -> [f32; 4] {
        let q = self.local_rotation.quaternion();
        [q.i, q.j, q.k, q.w]
    }

    /// Uniform scale
    pub fn local_scale(&self) -> f32 {
        self.local_scale
    }

    /// Set the uniform scale
    pub fn set_local_scale(&mut self, scale: f32) {
        self.local_scale = scale;
    }

    /// `translation * rotation * scale`
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.local_position)
            * self.local_rotation.to_homogeneous()
            * Mat4::new_scaling(self.local_scale)
    }

    /// Inverse rotation, used as the skybox view
    pub fn view_rotation(&self) -> Mat4 {
        self.local_rotation.inverse().to_homogeneous()
    }

    pub(crate) fn serialize(&self, out: &mut String) {
        let p = self.local_position;
        let [x, y, z, s] = self.local_rotation_components();
        out.push_str("transform\n");
        out.push_str(&format!("position {} {} {}\n", p.x, p.y, p.z));
        out.push_str(&format!("rotation {} {} {} {}\n", x, y, z, s));
        if self.local_scale != 1.0 {
            out.push_str(&format!("scale {}\n", self.local_scale));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use approx::assert_relative_eq;

    #[test]
    fn test_local_matrix_order() {
        let mut transform = TransformComponent::from_position(Vec3::new(10.0, 0.0, 0.0));
        transform.set_local_scale(2.0);
        transform.set_local_rotation_components(0.0, 0.0, (std::f32::consts::FRAC_PI_4).sin(), (std::f32::consts::FRAC_PI_4).cos());

        let p = transform.local_matrix() * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(p.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_zero_rotation_becomes_identity() {
        let mut transform = TransformComponent::new();
        transform.set_local_rotation_components(0.0, 0.0, 0.0, 0.0);
        assert_eq!(transform.local_rotation_components(), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_serialize_skips_unit_scale() {
        let mut out = String::new();
        TransformComponent::from_position(Vec3::new(1.0, 2.0, 3.0)).serialize(&mut out);
        assert_eq!(out, "transform\nposition 1 2 3\nrotation 0 0 0 1\n");

        let mut scaled = TransformComponent::new();
        scaled.set_local_scale(0.5);
        let mut out = String::new();
        scaled.serialize(&mut out);
        assert!(out.ends_with("scale 0.5\n"));
    }
}
