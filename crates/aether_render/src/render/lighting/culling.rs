//! CPU tile light culling
//!
//! Reference implementation of the culling compute pass. Each tile's frustum
//! is rebuilt in view space from the inverse projection of its pixel corners
//! at depth 0 and 1; a light survives when its bounding sphere is on the
//! inner side of all six planes.

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::api::LightBuffers;

use super::{MAX_LIGHTS_PER_TILE, SENTINEL, TILE_LIST_STRIDE, TILE_RES};

/// View-space depth range covered by the geometry of one tile.
///
/// Distances are positive along the view direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBounds {
    /// Closest surface
    pub min: f32,
    /// Farthest surface
    pub max: f32,
}

/// Camera and screen the tiles are built for
#[derive(Debug, Clone, Copy)]
pub struct CullParams<'a> {
    /// Camera projection
    pub projection: Mat4,
    /// Camera view
    pub view: Mat4,
    /// Screen width in pixels
    pub width: u32,
    /// Screen height in pixels
    pub height: u32,
    /// Optional per-tile depth bounds, row-major by tile
    pub depth_bounds: Option<&'a [DepthBounds]>,
}

/// Lights referenced by one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLights<'a> {
    /// Point light indices
    pub point: &'a [u32],
    /// Spot light indices
    pub spot: &'a [u32],
}

impl TileLights<'_> {
    /// Total lights in the tile
    pub fn len(&self) -> usize {
        self.point.len() + self.spot.len()
    }

    /// Whether no light touches the tile
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flattened per-tile light lists, laid out as the GPU buffer is
#[derive(Debug, Clone, PartialEq)]
pub struct TileLightLists {
    tiles_x: u32,
    tiles_y: u32,
    data: Vec<u32>,
}

impl TileLightLists {
    fn empty(tiles_x: u32, tiles_y: u32) -> Self {
        Self {
            tiles_x,
            tiles_y,
            data: vec![SENTINEL; tiles_x as usize * tiles_y as usize * TILE_LIST_STRIDE],
        }
    }

    /// Tile columns
    pub fn tiles_x(&self) -> u32 {
        self.tiles_x
    }

    /// Tile rows
    pub fn tiles_y(&self) -> u32 {
        self.tiles_y
    }

    /// Raw list buffer
    pub fn as_slice(&self) -> &[u32] {
        &self.data
    }

    /// Lights of tile `(x, y)`, counted from the top-left.
    ///
    /// # Panics
    ///
    /// If the tile is outside the grid.
    pub fn tile(&self, x: u32, y: u32) -> TileLights<'_> {
        assert!(x < self.tiles_x && y < self.tiles_y, "tile ({x}, {y}) outside {}x{} grid", self.tiles_x, self.tiles_y);
        let start = (y * self.tiles_x + x) as usize * TILE_LIST_STRIDE;
        let list = &self.data[start..start + TILE_LIST_STRIDE];

        let point_end = list.iter().position(|&i| i == SENTINEL).unwrap_or(list.len());
        let spots = &list[(point_end + 1).min(list.len())..];
        let spot_end = spots.iter().position(|&i| i == SENTINEL).unwrap_or(spots.len());

        TileLights {
            point: &list[..point_end],
            spot: &spots[..spot_end],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Plane {
    normal: Vec3,
    d: f32,
}

impl Plane {
    fn through(a: Vec3, b: Vec3, c: Vec3, inside: Vec3) -> Self {
        let normal = (b - a).cross(&(c - a));
        let normal = normal.try_normalize(f32::MIN_POSITIVE).unwrap_or(normal);
        let plane = Self { normal, d: -normal.dot(&a) };
        if plane.distance(inside) < 0.0 {
            Self { normal: -plane.normal, d: -plane.d }
        } else {
            plane
        }
    }

    fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.d
    }
}

fn unproject(inverse_projection: &Mat4, x: f32, y: f32, z: f32) -> Vec3 {
    let p = inverse_projection * Vec4::new(x, y, z, 1.0);
    Vec3::new(p.x / p.w, p.y / p.w, p.z / p.w)
}

fn tile_frustum(inverse_projection: &Mat4, x0: f32, y0: f32, x1: f32, y1: f32) -> [Plane; 6] {
    let near = [
        unproject(inverse_projection, x0, y0, 0.0),
        unproject(inverse_projection, x1, y0, 0.0),
        unproject(inverse_projection, x1, y1, 0.0),
        unproject(inverse_projection, x0, y1, 0.0),
    ];
    let far = [
        unproject(inverse_projection, x0, y0, 1.0),
        unproject(inverse_projection, x1, y0, 1.0),
        unproject(inverse_projection, x1, y1, 1.0),
        unproject(inverse_projection, x0, y1, 1.0),
    ];
    let centroid = near.iter().chain(far.iter()).fold(Vec3::zeros(), |acc, p| acc + p) / 8.0;

    [
        Plane::through(near[0], near[3], far[0], centroid),
        Plane::through(near[1], near[2], far[1], centroid),
        Plane::through(near[0], near[1], far[0], centroid),
        Plane::through(near[3], near[2], far[3], centroid),
        Plane::through(near[0], near[1], near[2], centroid),
        Plane::through(far[0], far[1], far[2], centroid),
    ]
}

fn sphere_visible(planes: &[Plane; 6], bounds: Option<DepthBounds>, center: Vec3, radius: f32) -> bool {
    if let Some(bounds) = bounds {
        let depth = -center.z;
        if depth + radius < bounds.min || depth - radius > bounds.max {
            return false;
        }
    }
    planes.iter().all(|plane| plane.distance(center) >= -radius)
}

/// Build the per-tile light lists for one camera.
pub fn cull_tiles(lights: &LightBuffers<'_>, params: &CullParams<'_>) -> TileLightLists {
    let tiles_x = params.width.div_ceil(TILE_RES);
    let tiles_y = params.height.div_ceil(TILE_RES);
    let mut lists = TileLightLists::empty(tiles_x, tiles_y);

    let inverse_projection = match params.projection.try_inverse() {
        Some(inverse) => inverse,
        None => {
            log::debug!("Projection is not invertible, every tile left empty");
            return lists;
        }
    };

    let to_view = |center_and_radius: &[f32; 4]| {
        let p = params.view * Vec4::new(center_and_radius[0], center_and_radius[1], center_and_radius[2], 1.0);
        (Vec3::new(p.x, p.y, p.z), center_and_radius[3])
    };
    let points: Vec<_> = lights.point_center_and_radius.iter().map(to_view).collect();
    let spots: Vec<_> = lights.spot_center_and_radius.iter().map(to_view).collect();

    let width = params.width as f32;
    let height = params.height as f32;
    let mut overflowed = 0u32;

    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let px0 = (tx * TILE_RES) as f32;
            let py0 = (ty * TILE_RES) as f32;
            let px1 = ((tx + 1) * TILE_RES).min(params.width) as f32;
            let py1 = ((ty + 1) * TILE_RES).min(params.height) as f32;
            let planes = tile_frustum(
                &inverse_projection,
                px0 / width * 2.0 - 1.0,
                py0 / height * 2.0 - 1.0,
                px1 / width * 2.0 - 1.0,
                py1 / height * 2.0 - 1.0,
            );
            let tile_index = (ty * tiles_x + tx) as usize;
            let bounds = params.depth_bounds.and_then(|all| all.get(tile_index).copied());

            let list = &mut lists.data[tile_index * TILE_LIST_STRIDE..(tile_index + 1) * TILE_LIST_STRIDE];
            let mut cursor = 0;
            let mut count = 0;
            let mut truncated = false;

            for (i, &(center, radius)) in points.iter().enumerate() {
                if sphere_visible(&planes, bounds, center, radius) {
                    if count == MAX_LIGHTS_PER_TILE {
                        truncated = true;
                        break;
                    }
                    list[cursor] = i as u32;
                    cursor += 1;
                    count += 1;
                }
            }
            list[cursor] = SENTINEL;
            cursor += 1;

            for (i, &(center, radius)) in spots.iter().enumerate() {
                if sphere_visible(&planes, bounds, center, radius) {
                    if count == MAX_LIGHTS_PER_TILE {
                        truncated = true;
                        break;
                    }
                    list[cursor] = i as u32;
                    cursor += 1;
                    count += 1;
                }
            }
            list[cursor] = SENTINEL;

            if truncated {
                overflowed += 1;
            }
        }
    }

    if overflowed > 0 {
        log::debug!("{} tiles hit the {} light cap", overflowed, MAX_LIGHTS_PER_TILE);
    }
    lists
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{ortho_projection, perspective_projection};

    fn ortho_params(width: u32, height: u32) -> CullParams<'static> {
        CullParams {
            projection: ortho_projection(0.0, width as f32, 0.0, height as f32, 0.1, 100.0),
            view: Mat4::identity(),
            width,
            height,
            depth_bounds: None,
        }
    }

    fn points(lights: &[[f32; 4]]) -> LightBuffers<'_> {
        LightBuffers {
            point_center_and_radius: lights,
            ..Default::default()
        }
    }

    #[test]
    fn test_light_lands_in_top_left_tile() {
        let lights = [[8.0, 56.0, -10.0, 1.0]];
        let lists = cull_tiles(&points(&lights), &ortho_params(64, 64));

        assert_eq!(lists.tiles_x(), 4);
        assert_eq!(lists.tiles_y(), 4);
        assert_eq!(lists.tile(0, 0).point, &[0]);
        assert!(lists.tile(1, 0).is_empty());
        assert!(lists.tile(0, 3).is_empty());
    }

    #[test]
    fn test_tile_cap_truncates_exactly() {
        let lights = vec![[8.0, 56.0, -10.0, 1.0]; MAX_LIGHTS_PER_TILE + 100];
        let spots = vec![[8.0, 56.0, -10.0, 1.0]; 10];
        let buffers = LightBuffers {
            point_center_and_radius: &lights,
            spot_center_and_radius: &spots,
            ..Default::default()
        };

        let lists = cull_tiles(&buffers, &ortho_params(64, 64));
        let tile = lists.tile(0, 0);

        assert_eq!(tile.point.len(), MAX_LIGHTS_PER_TILE);
        assert!(tile.spot.is_empty());
        assert_eq!(tile.len(), MAX_LIGHTS_PER_TILE);
    }

    #[test]
    fn test_points_and_spots_share_cap() {
        let lights = vec![[8.0, 56.0, -10.0, 1.0]; MAX_LIGHTS_PER_TILE - 4];
        let spots = vec![[8.0, 56.0, -10.0, 1.0]; 10];
        let buffers = LightBuffers {
            point_center_and_radius: &lights,
            spot_center_and_radius: &spots,
            ..Default::default()
        };

        let tile_lists = cull_tiles(&buffers, &ortho_params(64, 64));
        let tile = tile_lists.tile(0, 0);

        assert_eq!(tile.point.len(), MAX_LIGHTS_PER_TILE - 4);
        assert_eq!(tile.spot, &[0, 1, 2, 3]);
    }

    #[test]
    fn test_light_outside_frustum_is_culled() {
        let lights = [[32.0, 32.0, 10.0, 1.0], [-50.0, 32.0, -10.0, 2.0], [32.0, 32.0, -500.0, 5.0]];
        let lists = cull_tiles(&points(&lights), &ortho_params(64, 64));

        for y in 0..lists.tiles_y() {
            for x in 0..lists.tiles_x() {
                assert!(lists.tile(x, y).is_empty(), "tile ({x}, {y}) not empty");
            }
        }
    }

    #[test]
    fn test_large_light_covers_every_tile() {
        let lights = [[32.0, 32.0, -10.0, 100.0]];
        let lists = cull_tiles(&points(&lights), &ortho_params(64, 64));

        for y in 0..lists.tiles_y() {
            for x in 0..lists.tiles_x() {
                assert_eq!(lists.tile(x, y).point, &[0]);
            }
        }
    }

    #[test]
    fn test_perspective_center_tile() {
        let params = CullParams {
            projection: perspective_projection(60.0, 1.0, 0.1, 100.0),
            view: Mat4::identity(),
            width: 64,
            height: 64,
            depth_bounds: None,
        };
        let lights = [[0.0, 0.0, -10.0, 0.1]];
        let lists = cull_tiles(&points(&lights), &params);

        assert_eq!(lists.tile(1, 1).point, &[0]);
        assert_eq!(lists.tile(2, 2).point, &[0]);
        assert!(lists.tile(0, 0).is_empty());
    }

    #[test]
    fn test_depth_bounds_reject_light_behind_geometry() {
        let bounds = vec![DepthBounds { min: 1.0, max: 5.0 }; 16];
        let mut params = ortho_params(64, 64);
        params.depth_bounds = Some(&bounds);

        let lights = [[8.0, 56.0, -50.0, 1.0], [8.0, 56.0, -3.0, 1.0]];
        let lists = cull_tiles(&points(&lights), &params);

        assert_eq!(lists.tile(0, 0).point, &[1]);
    }

    #[test]
    fn test_partial_tiles_round_up() {
        let lists = cull_tiles(&LightBuffers::default(), &ortho_params(100, 33));
        assert_eq!(lists.tiles_x(), 7);
        assert_eq!(lists.tiles_y(), 3);
        assert_eq!(lists.as_slice().len(), 21 * TILE_LIST_STRIDE);
    }
}
