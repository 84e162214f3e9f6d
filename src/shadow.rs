//! Depth-only shadow map rendered once from the point light.

use std::time::Instant;

use glam::{Mat4, Vec3, Vec4};
use log::info;
use rayon::prelude::*;

use crate::config::ShadowConfig;
use crate::lighting::Light;
use crate::raster::{self, ScreenTriangle, Viewport};
use crate::scene::Scene;

const ROWS_PER_BAND: usize = 16;
/// Extra field of view so geometry on the bounding sphere stays inside the map.
const FOV_MARGIN: f32 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowProjection {
    Perspective,
    Orthographic,
}

#[derive(Debug, Clone)]
pub struct ShadowMap {
    resolution: u32,
    /// Linear light-view depth per texel, `INFINITY` where nothing was drawn.
    depths: Vec<f32>,
    view: Mat4,
    projection: Mat4,
    light_space: Mat4,
    kind: ShadowProjection,
    bias_min: f32,
    bias_slope: f32,
    scene_size: f32,
}

impl ShadowMap {
    /// Fits a light projection around the scene and rasterizes its depth.
    pub fn render(light: &Light, scene: &Scene, config: &ShadowConfig) -> Self {
        let started = Instant::now();
        let resolution = config.resolution.max(1);
        let bounds = scene.bounds();
        let (view, projection, kind) =
            fit_projection(light.position, bounds.center(), bounds.radius());
        let light_space = projection * view;
        let viewport = Viewport::new(resolution, resolution);

        let triangles: Vec<(ScreenTriangle, Vec3)> = scene
            .batches()
            .par_iter()
            .flat_map_iter(|batch| {
                let mut out = Vec::new();
                let mut screen = Vec::with_capacity(2);
                for triangle in batch.triangles() {
                    let world = [triangle[0].position, triangle[1].position, triangle[2].position];
                    let depth = Vec3::from_array(world.map(|p| -(view * p.extend(1.0)).z));
                    screen.clear();
                    let clip = world.map(|p| light_space * p.extend(1.0));
                    raster::setup_triangle(clip, viewport, &mut screen);
                    out.extend(screen.iter().map(|s| (*s, depth)));
                }
                out
            })
            .collect();

        let mut depths = vec![f32::INFINITY; viewport.pixel_count()];
        let row_len = resolution as usize;
        depths
            .par_chunks_mut(row_len * ROWS_PER_BAND)
            .enumerate()
            .for_each(|(band, texels)| {
                let first = (band * ROWS_PER_BAND) as u32;
                let rows = first..first + (texels.len() / row_len) as u32;
                for (triangle, depth) in &triangles {
                    let own = triangle.rows(viewport);
                    if own.end <= rows.start || own.start >= rows.end {
                        continue;
                    }
                    triangle.rasterize(viewport, rows.clone(), |x, y, fragment| {
                        let linear = fragment.bary.dot(*depth);
                        let texel = &mut texels[(y - first) as usize * row_len + x as usize];
                        if linear < *texel {
                            *texel = linear;
                        }
                    });
                }
            });

        info!(
            "Shadow map: {resolution}x{resolution} {kind:?}, {} triangles in {:.2?}",
            triangles.len(),
            started.elapsed()
        );

        Self {
            resolution,
            depths,
            view,
            projection,
            light_space,
            kind,
            bias_min: config.bias_min,
            bias_slope: config.bias_slope,
            scene_size: bounds.size(),
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn kind(&self) -> ShadowProjection {
        self.kind
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn light_space(&self) -> Mat4 {
        self.light_space
    }

    /// Stored depth of a texel, `None` outside the map.
    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        (x < self.resolution && y < self.resolution)
            .then(|| self.depths[(y * self.resolution + x) as usize])
    }

    /// Fraction of the 3x3 texel neighbourhood that sees `world` from the light.
    ///
    /// Points that fall outside the light frustum count as lit.
    pub fn visibility(&self, world: Vec3, normal: Vec3, light_pos: Vec3) -> f32 {
        let clip: Vec4 = self.light_space * world.extend(1.0);
        if !(clip.w > 0.0) {
            return 1.0;
        }
        let ndc = clip.truncate() / clip.w;
        if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 || !(0.0..=1.0).contains(&ndc.z) {
            return 1.0;
        }

        let depth = -(self.view * world.extend(1.0)).z;
        let n_dot_l = normal.dot((light_pos - world).normalize_or_zero());
        let bias = (self.bias_slope * (1.0 - n_dot_l)).max(self.bias_min) * self.scene_size;

        let res = self.resolution as f32;
        let cx = ((ndc.x * 0.5 + 0.5) * res).floor() as i64;
        let cy = ((0.5 - ndc.y * 0.5) * res).floor() as i64;
        let max = self.resolution as i64 - 1;

        let mut lit = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let x = (cx + dx).clamp(0, max) as u32;
                let y = (cy + dy).clamp(0, max) as u32;
                if depth - bias <= self.depths[(y * self.resolution + x) as usize] {
                    lit += 1;
                }
            }
        }
        lit as f32 / 9.0
    }
}

/// Light view and projection that enclose the sphere `(center, radius)`.
fn fit_projection(light: Vec3, center: Vec3, radius: f32) -> (Mat4, Mat4, ShadowProjection) {
    let offset = center - light;
    let distance = offset.length();
    let direction = if distance > f32::EPSILON {
        offset / distance
    } else {
        Vec3::NEG_Y
    };
    let up = if direction.dot(Vec3::Y).abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let view = Mat4::look_at_rh(light, light + direction, up);
    let radius = radius.max(f32::EPSILON);

    if distance > radius {
        let half_angle = (radius / distance).asin() * FOV_MARGIN;
        let fov = (2.0 * half_angle).min(std::f32::consts::PI - 0.01);
        let near = (distance - radius).max(1e-3 * radius);
        let far = distance + radius;
        let projection = Mat4::perspective_rh(fov, 1.0, near, far);
        (view, projection, ShadowProjection::Perspective)
    } else {
        // Nothing behind a point light can occlude it.
        let (near, far) = ((distance - radius).max(0.0), distance + radius);
        let projection = Mat4::orthographic_rh(-radius, radius, -radius, radius, near, far);
        (view, projection, ShadowProjection::Orthographic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Material, TextureArena, TriangleBatch};

    fn occluded_floor() -> Scene {
        let floor = TriangleBatch::quad("floor", 0, Vec3::ZERO, Vec3::X * 10.0, Vec3::NEG_Z * 10.0);
        let blocker = TriangleBatch::quad(
            "blocker",
            0,
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::X * 2.0,
            Vec3::NEG_Z * 2.0,
        );
        Scene::from_parts(vec![floor, blocker], vec![Material::default()], TextureArena::new())
            .unwrap()
    }

    fn config() -> ShadowConfig {
        ShadowConfig {
            resolution: 256,
            ..ShadowConfig::default()
        }
    }

    #[test]
    fn distant_light_uses_perspective() {
        let light = Light {
            position: Vec3::new(0.0, 50.0, 0.0),
            color: Vec3::ONE,
        };
        let map = ShadowMap::render(&light, &occluded_floor(), &config());
        assert_eq!(map.kind(), ShadowProjection::Perspective);
    }

    #[test]
    fn blocker_casts_a_shadow_on_the_floor() {
        let light = Light {
            position: Vec3::new(0.0, 50.0, 0.0),
            color: Vec3::ONE,
        };
        let map = ShadowMap::render(&light, &occluded_floor(), &config());

        assert_eq!(map.visibility(Vec3::ZERO, Vec3::Y, light.position), 0.0);
        assert_eq!(map.visibility(Vec3::new(8.0, 0.0, 8.0), Vec3::Y, light.position), 1.0);
        assert_eq!(map.visibility(Vec3::new(0.0, 5.0, 0.0), Vec3::Y, light.position), 1.0);
    }

    #[test]
    fn light_inside_the_scene_uses_orthographic() {
        let light = Light {
            position: Vec3::new(0.0, 2.0, 0.0),
            color: Vec3::ONE,
        };
        let map = ShadowMap::render(&light, &occluded_floor(), &config());
        assert_eq!(map.kind(), ShadowProjection::Orthographic);
        assert!(map.depths.iter().any(|d| d.is_finite()));
    }

    fn room(extra: Vec<TriangleBatch>) -> Scene {
        let mut batches = vec![
            TriangleBatch::quad("floor", 0, Vec3::ZERO, Vec3::X * 10.0, Vec3::NEG_Z * 10.0),
            TriangleBatch::quad(
                "ceiling",
                0,
                Vec3::new(0.0, 5.0, 0.0),
                Vec3::X * 10.0,
                Vec3::Z * 10.0,
            ),
        ];
        batches.extend(extra);
        Scene::from_parts(batches, vec![Material::default()], TextureArena::new()).unwrap()
    }

    #[test]
    fn light_inside_the_scene_ignores_geometry_behind_it() {
        let light = Light {
            position: Vec3::new(0.0, 2.0, 0.0),
            color: Vec3::ONE,
        };
        let map = ShadowMap::render(&light, &room(Vec::new()), &config());
        assert_eq!(map.kind(), ShadowProjection::Orthographic);

        let ceiling = Vec3::new(1.0, 5.0, 1.0);
        assert_eq!(map.visibility(ceiling, Vec3::NEG_Y, light.position), 1.0);
        let floor = Vec3::new(1.0, 0.0, 1.0);
        assert_eq!(map.visibility(floor, Vec3::Y, light.position), 1.0);
    }

    #[test]
    fn light_inside_the_scene_still_casts_shadows() {
        let light = Light {
            position: Vec3::new(0.0, 2.0, 0.0),
            color: Vec3::ONE,
        };
        let blocker = TriangleBatch::quad("blocker", 0, Vec3::new(3.0, 4.0, 3.0), Vec3::X, Vec3::Z);
        let map = ShadowMap::render(&light, &room(vec![blocker]), &config());
        assert_eq!(map.kind(), ShadowProjection::Orthographic);

        let hidden = Vec3::new(3.0, 5.0, 3.0);
        assert_eq!(map.visibility(hidden, Vec3::NEG_Y, light.position), 0.0);
        let open = Vec3::new(-6.0, 5.0, -6.0);
        assert_eq!(map.visibility(open, Vec3::NEG_Y, light.position), 1.0);
    }

    #[test]
    fn points_outside_the_map_are_lit() {
        let light = Light {
            position: Vec3::new(0.0, 50.0, 0.0),
            color: Vec3::ONE,
        };
        let map = ShadowMap::render(&light, &occluded_floor(), &config());
        let far_away = Vec3::new(500.0, 0.0, 0.0);
        assert_eq!(map.visibility(far_away, Vec3::Y, light.position), 1.0);
    }
}
