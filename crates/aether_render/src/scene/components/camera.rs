//! Camera component

use crate::foundation::math::{ortho_projection, perspective_projection, Mat4, Vec3};
use crate::render::api::TextureId;

/// How a camera maps view space to clip space
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Box `[x, x + width] x [y, y + height]` between `near` and `far`
    Orthographic {
        /// Left edge
        x: f32,
        /// Bottom edge
        y: f32,
        /// Box width
        width: f32,
        /// Box height
        height: f32,
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },
    /// Vertical field of view in degrees
    Perspective {
        /// Vertical field of view in degrees
        fov_degrees: f32,
        /// Width over height
        aspect: f32,
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },
}

impl Projection {
    /// Clip-space matrix
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Self::Orthographic { x, y, width, height, near, far } => {
                ortho_projection(x, x + width, y, y + height, near, far)
            }
            Self::Perspective { fov_degrees, aspect, near, far } => perspective_projection(fov_degrees, aspect, near, far),
        }
    }
}

/// A view into the scene, rendered to the swapchain or to a texture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraComponent {
    projection: Projection,
    clear_color: Vec3,
    target_texture: Option<TextureId>,
    depth_normal_target: Option<TextureId>,
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self {
            projection: Projection::Orthographic {
                x: 0.0,
                y: 0.0,
                width: 1.0,
                height: 1.0,
                near: -1.0,
                far: 1.0,
            },
            clear_color: Vec3::zeros(),
            target_texture: None,
            depth_normal_target: None,
        }
    }
}

impl CameraComponent {
    /// Camera with a unit orthographic box and black clear color
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an orthographic projection
    pub fn set_projection_ortho(&mut self, x: f32, y: f32, width: f32, height: f32, near: f32, far: f32) {
        self.projection = Projection::Orthographic { x, y, width, height, near, far };
    }

    /// Use a perspective projection
    pub fn set_projection_perspective(&mut self, fov_degrees: f32, aspect: f32, near: f32, far: f32) {
        self.projection = Projection::Perspective { fov_degrees, aspect, near, far };
    }

    /// Current projection
    pub fn projection(&self) -> Projection {
        self.projection
    }

    /// Current projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    /// Color the target is cleared to
    pub fn clear_color(&self) -> Vec3 {
        self.clear_color
    }

    /// Set the clear color
    pub fn set_clear_color(&mut self, color: Vec3) {
        self.clear_color = color;
    }

    /// Render texture this camera draws into, or `None` for the swapchain
    pub fn target_texture(&self) -> Option<TextureId> {
        self.target_texture
    }

    /// Render into `texture`, or into the swapchain with `None`
    pub fn set_target_texture(&mut self, texture: Option<TextureId>) {
        self.target_texture = texture;
    }

    /// Depth/normal texture that bounds light culling per tile, if any
    pub fn depth_normal_target(&self) -> Option<TextureId> {
        self.depth_normal_target
    }

    /// Cull lights against the depth in `texture`, or against the full
    /// frustum with `None`
    pub fn set_depth_normal_target(&mut self, texture: Option<TextureId>) {
        self.depth_normal_target = texture;
    }

    pub(crate) fn serialize(&self, out: &mut String) {
        out.push_str("camera\n");
        match self.projection {
            Projection::Orthographic { x, y, width, height, near, far } => {
                out.push_str(&format!("ortho {} {} {} {} {} {}\n", x, y, width, height, near, far));
            }
            Projection::Perspective { fov_degrees, aspect, near, far } => {
                out.push_str(&format!("perspective {} {} {} {}\n", fov_degrees, aspect, near, far));
            }
        }
        let c = self.clear_color;
        out.push_str(&format!("clearcolor {} {} {}\n", c.x, c.y, c.z));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_ortho() {
        let mut camera = CameraComponent::new();
        camera.set_projection_ortho(0.0, 0.0, 800.0, 600.0, 0.1, 100.0);
        camera.set_clear_color(Vec3::new(0.2, 0.3, 0.4));

        let mut out = String::new();
        camera.serialize(&mut out);
        assert_eq!(out, "camera\northo 0 0 800 600 0.1 100\nclearcolor 0.2 0.3 0.4\n");
    }

    #[test]
    fn test_serialize_perspective() {
        let mut camera = CameraComponent::new();
        camera.set_projection_perspective(45.0, 1.5, 0.5, 200.0);

        let mut out = String::new();
        camera.serialize(&mut out);
        assert!(out.contains("perspective 45 1.5 0.5 200\n"));
    }

    #[test]
    fn test_target_texture_defaults_to_swapchain() {
        let mut camera = CameraComponent::new();
        assert_eq!(camera.target_texture(), None);
        camera.set_target_texture(Some(TextureId(3)));
        assert_eq!(camera.target_texture(), Some(TextureId(3)));
    }
}
