//! Light arrays and per-frame culling dispatch

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::api::{ComputeShaderId, LightBuffers, LightCullDispatch, TextureId};
use crate::render::device::GfxDevice;
use crate::render::RenderResult;

use super::{MAX_LIGHTS, MAX_LIGHTS_PER_TILE, TILE_RES};

/// Point and spot light storage plus the tile culling driver.
///
/// Indices are owned by the caller; writing index `i` makes the first `i + 1`
/// entries of that array active.
pub struct LightTiler {
    point_center_and_radius: Vec<[f32; 4]>,
    point_colors: Vec<[f32; 4]>,
    spot_center_and_radius: Vec<[f32; 4]>,
    spot_params: Vec<[f32; 4]>,
    spot_colors: Vec<[f32; 4]>,
    point_count: usize,
    spot_count: usize,
    dirty: bool,
}

impl Default for LightTiler {
    fn default() -> Self {
        Self::new()
    }
}

impl LightTiler {
    /// Create a tiler with no active lights
    pub fn new() -> Self {
        Self {
            point_center_and_radius: vec![[0.0; 4]; MAX_LIGHTS],
            point_colors: vec![[0.0; 4]; MAX_LIGHTS],
            spot_center_and_radius: vec![[0.0; 4]; MAX_LIGHTS],
            spot_params: vec![[0.0; 4]; MAX_LIGHTS],
            spot_colors: vec![[0.0; 4]; MAX_LIGHTS],
            point_count: 0,
            spot_count: 0,
            dirty: false,
        }
    }

    /// Write point light `index`.
    ///
    /// # Panics
    ///
    /// If `index >= MAX_LIGHTS`.
    pub fn set_point_light_parameters(&mut self, index: usize, position: Vec3, radius: f32, color: Vec4) {
        assert!(index < MAX_LIGHTS, "point light index {index} exceeds MAX_LIGHTS ({MAX_LIGHTS})");
        self.point_center_and_radius[index] = [position.x, position.y, position.z, radius];
        self.point_colors[index] = color.into();
        self.point_count = self.point_count.max(index + 1);
        self.dirty = true;
    }

    /// Write spot light `index`. `cone_angle_degrees` is the half-angle of the cone.
    ///
    /// # Panics
    ///
    /// If `index >= MAX_LIGHTS`.
    #[allow(clippy::too_many_arguments)]
    pub fn set_spot_light_parameters(
        &mut self,
        index: usize,
        position: Vec3,
        radius: f32,
        color: Vec3,
        direction: Vec3,
        cone_angle_degrees: f32,
        falloff_radius: f32,
    ) {
        assert!(index < MAX_LIGHTS, "spot light index {index} exceeds MAX_LIGHTS ({MAX_LIGHTS})");
        let direction = direction.try_normalize(f32::EPSILON).unwrap_or_else(|| Vec3::new(0.0, 0.0, -1.0));
        self.spot_center_and_radius[index] = [position.x, position.y, position.z, radius];
        self.spot_params[index] = [direction.x, direction.y, direction.z, cone_angle_degrees.to_radians().cos()];
        self.spot_colors[index] = [color.x, color.y, color.z, falloff_radius];
        self.spot_count = self.spot_count.max(index + 1);
        self.dirty = true;
    }

    /// Active prefix of every array
    pub fn light_buffers(&self) -> LightBuffers<'_> {
        LightBuffers {
            point_center_and_radius: &self.point_center_and_radius[..self.point_count],
            point_colors: &self.point_colors[..self.point_count],
            spot_center_and_radius: &self.spot_center_and_radius[..self.spot_count],
            spot_params: &self.spot_params[..self.spot_count],
            spot_colors: &self.spot_colors[..self.spot_count],
        }
    }

    /// Upload the active lights
    pub fn update_light_buffers(&mut self, device: &mut GfxDevice) -> RenderResult<()> {
        device.upload_lights(&self.light_buffers())?;
        log::trace!("Uploaded {} point and {} spot lights", self.point_count, self.spot_count);
        self.dirty = false;
        Ok(())
    }

    /// Cull the active lights against the tiles of the current render target.
    ///
    /// Uploads first if any light changed since the last upload.
    pub fn cull_lights(
        &mut self,
        device: &mut GfxDevice,
        shader: ComputeShaderId,
        projection: &Mat4,
        view: &Mat4,
        depth_normal_target: Option<TextureId>,
    ) -> RenderResult<()> {
        if self.dirty {
            self.update_light_buffers(device)?;
        }
        let (width, height) = device.target_extent();
        device.dispatch_light_culling(&LightCullDispatch {
            shader,
            projection: *projection,
            view: *view,
            depth_normal_target,
            width,
            height,
        })
    }

    /// Tile columns for a target `width` pixels wide
    pub fn num_tiles_x(width: u32) -> u32 {
        width.div_ceil(TILE_RES)
    }

    /// Tile rows for a target `height` pixels high
    pub fn num_tiles_y(height: u32) -> u32 {
        height.div_ceil(TILE_RES)
    }

    /// Per-tile cap shared by points and spots
    pub fn max_lights_per_tile(&self) -> usize {
        MAX_LIGHTS_PER_TILE
    }

    /// Active point lights
    pub fn point_light_count(&self) -> usize {
        self.point_count
    }

    /// Active spot lights
    pub fn spot_light_count(&self) -> usize {
        self.spot_count
    }

    /// Whether lights changed since the last upload
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::ortho_projection;
    use crate::render::api::ComputeShaderSource;
    use crate::render::backends::immediate::ImmediateBackend;
    use approx::assert_relative_eq;

    #[test]
    fn test_active_count_follows_highest_index() {
        let mut tiler = LightTiler::new();
        tiler.set_point_light_parameters(4, Vec3::zeros(), 1.0, Vec4::repeat(1.0));
        tiler.set_point_light_parameters(1, Vec3::zeros(), 1.0, Vec4::repeat(1.0));

        assert_eq!(tiler.point_light_count(), 5);
        assert_eq!(tiler.light_buffers().point_count(), 5);
        assert_eq!(tiler.spot_light_count(), 0);
    }

    #[test]
    fn test_spot_layout() {
        let mut tiler = LightTiler::new();
        tiler.set_spot_light_parameters(
            0,
            Vec3::new(1.0, 2.0, 3.0),
            5.0,
            Vec3::new(0.5, 0.6, 0.7),
            Vec3::new(0.0, -2.0, 0.0),
            60.0,
            4.0,
        );

        let buffers = tiler.light_buffers();
        assert_eq!(buffers.spot_center_and_radius[0], [1.0, 2.0, 3.0, 5.0]);
        assert_relative_eq!(buffers.spot_params[0][1], -1.0);
        assert_relative_eq!(buffers.spot_params[0][3], 0.5, epsilon = 1e-6);
        assert_eq!(buffers.spot_colors[0], [0.5, 0.6, 0.7, 4.0]);
    }

    #[test]
    #[should_panic(expected = "exceeds MAX_LIGHTS")]
    fn test_index_past_capacity_panics() {
        LightTiler::new().set_point_light_parameters(MAX_LIGHTS, Vec3::zeros(), 1.0, Vec4::zeros());
    }

    #[test]
    fn test_tile_counts_round_up() {
        assert_eq!(LightTiler::num_tiles_x(1920), 120);
        assert_eq!(LightTiler::num_tiles_y(1080), 68);
        assert_eq!(LightTiler::num_tiles_x(1), 1);
        assert_eq!(LightTiler::new().max_lights_per_tile(), 544);
    }

    #[test]
    fn test_cull_through_device_caps_tile() {
        let mut device = GfxDevice::new(Box::new(ImmediateBackend::new(64, 64)));
        let shader = device
            .create_compute_shader(&ComputeShaderSource { name: "light_cull".into(), spirv: Vec::new() })
            .unwrap();

        let mut tiler = LightTiler::new();
        for i in 0..600 {
            tiler.set_point_light_parameters(i, Vec3::new(8.0, 56.0, -10.0), 1.0, Vec4::repeat(1.0));
        }
        assert!(tiler.is_dirty());

        let projection = ortho_projection(0.0, 64.0, 0.0, 64.0, 0.1, 100.0);
        tiler.cull_lights(&mut device, shader, &projection, &Mat4::identity(), None).unwrap();
        assert!(!tiler.is_dirty());

        let backend = device.backend().as_any().downcast_ref::<ImmediateBackend>().unwrap();
        let lists = backend.tile_lights().unwrap();
        assert_eq!(lists.tile(0, 0).len(), MAX_LIGHTS_PER_TILE);
        assert!(lists.tile(3, 3).is_empty());
    }
}
