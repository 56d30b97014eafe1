//! Math utilities and types
//!
//! Thin aliases over `nalgebra` plus the projection builders the renderer uses.
//! Projections follow Vulkan conventions: right-handed view space looking down
//! -Z, normalized device Y pointing down and depth mapped to `[0, 1]`.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Orthographic projection over the view-space box `[left, right] x [bottom, top]`.
///
/// `top` maps to the top of the screen and `near` to depth 0.
pub fn ortho_projection(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let width = right - left;
    let height = top - bottom;
    let depth = far - near;

    Mat4::new(
        2.0 / width, 0.0, 0.0, -(right + left) / width,
        0.0, -2.0 / height, 0.0, (top + bottom) / height,
        0.0, 0.0, -1.0 / depth, -near / depth,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Perspective projection with a vertical field of view given in degrees.
pub fn perspective_projection(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let focal = 1.0 / (fov_y_degrees * constants::DEG_TO_RAD * 0.5).tan();

    Mat4::new(
        focal / aspect, 0.0, 0.0, 0.0,
        0.0, -focal, 0.0, 0.0,
        0.0, 0.0, far / (near - far), near * far / (near - far),
        0.0, 0.0, -1.0, 0.0,
    )
}

/// Flatten a matrix into the column-major 16-float layout shaders consume.
pub fn to_column_major(matrix: &Mat4) -> [f32; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(matrix.as_slice());
    out
}

/// Rebuild a matrix from a column-major 16-float array.
pub fn from_column_major(values: &[f32; 16]) -> Mat4 {
    Mat4::from_column_slice(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    fn project(matrix: &Mat4, point: Vec3) -> Vec3 {
        let clip = matrix * Vec4::new(point.x, point.y, point.z, 1.0);
        Vec3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w)
    }

    #[test]
    fn test_ortho_maps_corners() {
        let projection = ortho_projection(0.0, 800.0, 0.0, 600.0, 0.1, 100.0);

        let top_left_near = project(&projection, Vec3::new(0.0, 600.0, -0.1));
        assert_relative_eq!(top_left_near, Vec3::new(-1.0, -1.0, 0.0), epsilon = EPSILON);

        let bottom_right_far = project(&projection, Vec3::new(800.0, 0.0, -100.0));
        assert_relative_eq!(bottom_right_far, Vec3::new(1.0, 1.0, 1.0), epsilon = EPSILON);
    }

    #[test]
    fn test_perspective_depth_range() {
        let projection = perspective_projection(60.0, 1.5, 0.5, 50.0);

        assert_relative_eq!(project(&projection, Vec3::new(0.0, 0.0, -0.5)).z, 0.0, epsilon = EPSILON);
        assert_relative_eq!(project(&projection, Vec3::new(0.0, 0.0, -50.0)).z, 1.0, epsilon = EPSILON);

        // Up in view space is up on screen, which is negative NDC y.
        assert!(project(&projection, Vec3::new(0.0, 1.0, -5.0)).y < 0.0);
    }

    #[test]
    fn test_column_major_roundtrip() {
        let matrix = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let flat = to_column_major(&matrix);

        // Translation lives in the last column.
        assert_eq!(&flat[12..15], &[1.0, 2.0, 3.0]);
        assert_eq!(from_column_major(&flat), matrix);
    }
}
