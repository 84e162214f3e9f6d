use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned box grown one point at a time while geometry loads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Bounds {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn center(&self) -> Vec3 {
        0.5 * (self.min + self.max)
    }

    /// Largest extent along any axis.
    pub fn size(&self) -> f32 {
        (self.max - self.min).max_element()
    }

    /// Radius of the sphere through the box corners.
    pub fn radius(&self) -> f32 {
        0.5 * (self.max - self.min).length()
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    pub fn mapping(&self) -> Option<WorldMapping> {
        if self.is_empty() {
            return None;
        }
        let half_size = 0.5 * self.size();
        (half_size.is_finite() && half_size > 0.0).then(|| WorldMapping {
            center: self.center(),
            half_size,
        })
    }
}

/// Affine map from world space onto the normalized voxel cube `[-1, 1]³`.
///
/// Computed once from the finalized bounds and handed unchanged to both the
/// voxelization and the shading stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldMapping {
    pub center: Vec3,
    pub half_size: f32,
}

impl WorldMapping {
    pub fn to_normalized(&self, world: Vec3) -> Vec3 {
        (world - self.center) / self.half_size
    }

    pub fn from_normalized(&self, normalized: Vec3) -> Vec3 {
        normalized * self.half_size + self.center
    }

    /// Continuous grid coordinates in `[0, dim]` on each axis.
    pub fn to_voxel(&self, world: Vec3, dim: u32) -> Vec3 {
        (self.to_normalized(world) * 0.5 + 0.5) * dim as f32
    }

    /// Integer cell containing `world`, clamped to the grid.
    pub fn voxel_cell(&self, world: Vec3, dim: u32) -> [u32; 3] {
        let v = self.to_voxel(world, dim);
        let max = (dim - 1) as f32;
        [
            v.x.floor().clamp(0.0, max) as u32,
            v.y.floor().clamp(0.0, max) as u32,
            v.z.floor().clamp(0.0, max) as u32,
        ]
    }

    /// Full scene size in world units (the normalized cube is 2 units wide).
    pub fn world_size(&self) -> f32 {
        2.0 * self.half_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bounds() -> Bounds {
        let mut bounds = Bounds::EMPTY;
        bounds.expand(Vec3::new(-120.0, 0.0, -40.0));
        bounds.expand(Vec3::new(80.0, 60.0, 30.0));
        bounds
    }

    #[test]
    fn empty_bounds_have_no_mapping() {
        assert!(Bounds::EMPTY.is_empty());
        assert!(Bounds::EMPTY.mapping().is_none());
    }

    #[test]
    fn single_point_has_no_mapping() {
        let mut bounds = Bounds::EMPTY;
        bounds.expand(Vec3::ONE);
        assert!(!bounds.is_empty());
        assert!(bounds.mapping().is_none());
    }

    #[test]
    fn interior_points_map_inside_unit_cube_and_round_trip() {
        let bounds = sample_bounds();
        let mapping = bounds.mapping().unwrap();
        assert_eq!(mapping.half_size, 100.0);

        let steps = 7;
        for i in 1..steps {
            for j in 1..steps {
                for k in 1..steps {
                    let t = Vec3::new(i as f32, j as f32, k as f32) / steps as f32;
                    let p = bounds.min + (bounds.max - bounds.min) * t;
                    let n = mapping.to_normalized(p);
                    assert!(n.abs().max_element() <= 1.0, "{p} mapped to {n}");
                    let back = mapping.from_normalized(n);
                    assert!((back - p).length() < 1e-3, "{p} came back as {back}");
                }
            }
        }
    }

    #[test]
    fn voxel_cells_clamp_to_grid() {
        let mapping = sample_bounds().mapping().unwrap();
        assert_eq!(mapping.voxel_cell(mapping.center, 64), [32, 32, 32]);
        let far_corner = mapping.from_normalized(Vec3::ONE);
        assert_eq!(mapping.voxel_cell(far_corner, 64), [63, 63, 63]);
        let near_corner = mapping.from_normalized(-Vec3::ONE);
        assert_eq!(mapping.voxel_cell(near_corner, 64), [0, 0, 0]);
    }
}
