use std::time::Instant;

use glam::{Vec2, Vec3};
use log::info;
use rayon::prelude::*;

use super::{VoxelAccumulator, VoxelDim, VoxelGrid};
use crate::lighting::{direct_radiance, Light};
use crate::scene::{Material, Scene, Vertex, WorldMapping};
use crate::shadow::ShadowMap;

/// Everything a worker needs to light and store one triangle's fragments.
struct VoxelizeContext<'a> {
    scene: &'a Scene,
    shadow: &'a ShadowMap,
    mapping: WorldMapping,
    light: &'a Light,
    accum: &'a VoxelAccumulator,
}

/// Voxelizes the lit scene into a mip-mapped radiance grid.
pub fn voxelize(
    scene: &Scene,
    shadow: &ShadowMap,
    mapping: WorldMapping,
    light: &Light,
    dim: VoxelDim,
) -> VoxelGrid {
    let started = Instant::now();
    let accum = VoxelAccumulator::new(dim);
    let ctx = VoxelizeContext {
        scene,
        shadow,
        mapping,
        light,
        accum: &accum,
    };

    scene.batches().par_iter().for_each(|batch| {
        let material = scene.material(batch.material);
        batch
            .vertices
            .par_chunks_exact(3)
            .for_each(|triangle| ctx.triangle(material, triangle));
    });

    let base = accum.resolve();
    info!(
        "Voxelized {} triangles into {}³ grid: {} occupied cells in {:.2?}",
        scene.triangle_count(),
        dim.get(),
        base.occupied_count(),
        started.elapsed()
    );

    let started = Instant::now();
    let grid = VoxelGrid::from_base(dim, base);
    info!(
        "Built {} mip levels in {:.2?}",
        grid.level_count(),
        started.elapsed()
    );
    grid
}

impl VoxelizeContext<'_> {
    /// Conservative rasterization along the dominant axis of the face normal.
    fn triangle(&self, material: &Material, triangle: &[Vertex]) {
        let dim = self.accum.dim().get();
        let g = [0, 1, 2].map(|i| self.mapping.to_voxel(triangle[i].position, dim));
        let normal = (g[1] - g[0]).cross(g[2] - g[0]);
        if !normal.is_finite() || normal == Vec3::ZERO {
            return;
        }

        let abs = normal.abs();
        let axis = if abs.x >= abs.y && abs.x >= abs.z {
            0
        } else if abs.y >= abs.z {
            1
        } else {
            2
        };
        let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
        let q = g.map(|p| Vec2::new(p[u], p[v]));

        let area = cross2(q[1] - q[0], q[2] - q[0]);
        if area == 0.0 {
            return;
        }
        let orientation = area.signum();
        let edges = [(q[0], q[1]), (q[1], q[2]), (q[2], q[0])];
        let footprint = edges.map(|(a, b)| {
            let d = b - a;
            0.5 * (d.x.abs() + d.y.abs())
        });

        let min = q[0].min(q[1]).min(q[2]) - Vec2::splat(0.5);
        let max = q[0].max(q[1]).max(q[2]) + Vec2::splat(0.5);
        let start_u = min.x.floor().max(0.0) as u32;
        let end_u = (max.x.ceil().max(0.0) as u32).min(dim);
        let start_v = min.y.floor().max(0.0) as u32;
        let end_v = (max.y.ceil().max(0.0) as u32).min(dim);

        for cv in start_v..end_v {
            for cu in start_u..end_u {
                let centre = Vec2::new(cu as f32 + 0.5, cv as f32 + 0.5);
                if centre.cmplt(min).any() || centre.cmpgt(max).any() {
                    continue;
                }
                let covered = edges.iter().zip(footprint).all(|(&(a, b), half)| {
                    orientation * cross2(b - a, centre - a) + half >= 0.0
                });
                if !covered {
                    continue;
                }

                // Depth along the dominant axis from the plane equation.
                let depth = g[0][axis]
                    - (normal[u] * (centre.x - g[0][u]) + normal[v] * (centre.y - g[0][v]))
                        / normal[axis];
                let w = depth.floor().clamp(0.0, (dim - 1) as f32) as u32;

                let mut cell = [0u32; 3];
                cell[axis] = w;
                cell[u] = cu;
                cell[v] = cv;

                let bary = clamped_barycentrics(q, area, centre);
                self.fragment(material, triangle, bary, cell);
            }
        }
    }

    fn fragment(&self, material: &Material, triangle: &[Vertex], bary: Vec3, cell: [u32; 3]) {
        let interpolate = |f: fn(&Vertex) -> Vec3| {
            f(&triangle[0]) * bary.x + f(&triangle[1]) * bary.y + f(&triangle[2]) * bary.z
        };
        let position = interpolate(|v| v.position);
        let face_normal = (triangle[1].position - triangle[0].position)
            .cross(triangle[2].position - triangle[0].position)
            .normalize_or_zero();
        let normal = interpolate(|v| v.normal).try_normalize().unwrap_or(face_normal);
        let uv = triangle[0].uv * bary.x + triangle[1].uv * bary.y + triangle[2].uv * bary.z;

        let scene = self.scene;
        let normal = scene.shading_normal(material, uv, normal, triangle[0].tangent_frame);
        let kd = scene.diffuse(material, uv);
        let visibility = self.shadow.visibility(position, normal, self.light.position);
        let radiance = direct_radiance(
            kd,
            material.ke,
            normal,
            self.light.direction_from(position),
            visibility,
            self.light.color,
        );
        self.accum.add(cell, radiance);
    }
}

fn cross2(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Barycentrics of `p`, clamped onto the triangle and renormalized.
///
/// Conservative coverage reaches cells whose centre lies slightly outside
/// the triangle; clamping keeps the interpolated attributes on the surface.
fn clamped_barycentrics(q: [Vec2; 3], area: f32, p: Vec2) -> Vec3 {
    let l = Vec3::new(
        cross2(q[2] - q[1], p - q[1]),
        cross2(q[0] - q[2], p - q[2]),
        cross2(q[1] - q[0], p - q[0]),
    ) / area;
    let l = l.max(Vec3::ZERO);
    let sum = l.element_sum();
    if sum > 0.0 {
        l / sum
    } else {
        Vec3::splat(1.0 / 3.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShadowConfig;
    use crate::scene::{TextureArena, TriangleBatch};

    const DIM: u32 = 32;

    fn overhead_light() -> Light {
        Light {
            position: Vec3::new(0.0, 50.0, 0.0),
            color: Vec3::ONE,
        }
    }

    fn build(batches: Vec<TriangleBatch>, materials: Vec<Material>) -> (Scene, VoxelGrid) {
        let scene = Scene::from_parts(batches, materials, TextureArena::new()).unwrap();
        let light = overhead_light();
        let shadow = ShadowMap::render(
            &light,
            &scene,
            &ShadowConfig {
                resolution: 256,
                ..ShadowConfig::default()
            },
        );
        let grid = voxelize(
            &scene,
            &shadow,
            scene.world_mapping(),
            &light,
            VoxelDim::new(DIM).unwrap(),
        );
        (scene, grid)
    }

    fn floor() -> TriangleBatch {
        TriangleBatch::quad("floor", 0, Vec3::ZERO, Vec3::X * 10.0, Vec3::NEG_Z * 10.0)
    }

    #[test]
    fn lit_quad_fills_exactly_its_layer() {
        let (scene, grid) = build(vec![floor()], vec![Material::default()]);
        let layer = scene.world_mapping().voxel_cell(Vec3::ZERO, DIM)[1];
        let base = grid.level(0);

        for z in 0..DIM {
            for y in 0..DIM {
                for x in 0..DIM {
                    let texel = base.texel(x, y, z);
                    if y == layer {
                        assert_eq!(texel[3], 255, "hole at {x},{y},{z}");
                        assert!(texel[0] > 200, "dim voxel {texel:?}");
                    } else {
                        assert_eq!(texel, [0; 4], "stray voxel at {x},{y},{z}");
                    }
                }
            }
        }
        assert_eq!(grid.occupied_count(), (DIM * DIM) as usize);
    }

    #[test]
    fn occluded_quad_is_dark_for_any_albedo() {
        for albedo in [0.2, 0.6, 1.0] {
            let blocker = TriangleBatch::quad(
                "blocker",
                1,
                Vec3::new(0.0, 5.0, 0.0),
                Vec3::X * 2.0,
                Vec3::NEG_Z * 2.0,
            );
            let floor_material = Material {
                kd: Vec3::splat(albedo),
                ..Material::default()
            };
            let (scene, grid) =
                build(vec![floor(), blocker], vec![floor_material, Material::default()]);

            let [x, y, z] = scene.world_mapping().voxel_cell(Vec3::new(0.1, 0.0, 0.1), DIM);
            let under = grid.level(0).texel(x, y, z);
            assert_eq!(under[3], 255);
            assert!(under[..3].iter().all(|&c| c <= 2), "shadowed voxel lit: {under:?}");

            let [x, y, z] = scene.world_mapping().voxel_cell(Vec3::new(8.0, 0.0, 8.0), DIM);
            let open = grid.level(0).texel(x, y, z);
            assert!(open[0] as f32 > 200.0 * albedo, "open voxel too dark: {open:?}");
        }
    }

    #[test]
    fn emissive_surfaces_glow_in_shadow() {
        let glow = Material {
            kd: Vec3::ZERO,
            ke: Vec3::new(0.0, 1.0, 0.0),
            ..Material::default()
        };
        let (scene, grid) = build(vec![floor()], vec![glow]);
        let [x, y, z] = scene.world_mapping().voxel_cell(Vec3::ZERO, DIM);
        assert_eq!(grid.level(0).texel(x, y, z), [0, 255, 0, 255]);
    }

    #[test]
    fn thin_sliver_still_marks_a_voxel() {
        let sliver = TriangleBatch::new(
            "sliver",
            0,
            vec![
                Vertex::new(Vec3::new(-10.0, 0.0, 0.0), Vec3::Y, Vec2::ZERO),
                Vertex::new(Vec3::new(10.0, 0.0, 0.0), Vec3::Y, Vec2::ZERO),
                Vertex::new(Vec3::new(10.0, 0.0, 0.01), Vec3::Y, Vec2::ZERO),
            ],
        );
        // No cell centre lies inside the sliver; only conservative coverage
        // produces a continuous row of voxels along it.
        let (scene, grid) = build(vec![sliver], vec![Material::default()]);
        let [_, y, z] = scene.world_mapping().voxel_cell(Vec3::ZERO, DIM);
        for x in 0..DIM {
            assert_eq!(grid.level(0).texel(x, y, z)[3], 255, "gap at x = {x}");
        }
    }

    #[test]
    fn coarse_levels_average_their_children() {
        let (_, grid) = build(vec![floor()], vec![Material::default()]);
        for level in 1..grid.level_count() {
            let fine = grid.level(level - 1);
            let coarse = grid.level(level);
            for z in 0..coarse.dim() {
                for y in 0..coarse.dim() {
                    for x in 0..coarse.dim() {
                        let mut sum = 0u32;
                        for (dx, dy, dz) in [
                            (0, 0, 0),
                            (1, 0, 0),
                            (0, 1, 0),
                            (1, 1, 0),
                            (0, 0, 1),
                            (1, 0, 1),
                            (0, 1, 1),
                            (1, 1, 1),
                        ] {
                            sum += fine.texel(2 * x + dx, 2 * y + dy, 2 * z + dz)[3] as u32;
                        }
                        assert_eq!(coarse.texel(x, y, z)[3] as u32, (sum + 4) / 8);
                    }
                }
            }
        }
    }
}
