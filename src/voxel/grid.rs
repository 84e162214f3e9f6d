use glam::{Vec3, Vec4};

use super::{mipmap, VoxelDim};

/// One level of the pyramid: `dim³` RGBA8 texels, x fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoxelLevel {
    dim: u32,
    texels: Vec<[u8; 4]>,
}

impl VoxelLevel {
    pub fn empty(dim: u32) -> Self {
        Self {
            dim,
            texels: vec![[0; 4]; (dim as usize).pow(3)],
        }
    }

    pub(crate) fn from_texels(dim: u32, texels: Vec<[u8; 4]>) -> Self {
        debug_assert_eq!(texels.len(), (dim as usize).pow(3));
        Self { dim, texels }
    }

    pub(crate) fn index_for(dim: u32, x: u32, y: u32, z: u32) -> usize {
        let dim = dim as usize;
        x as usize + y as usize * dim + z as usize * dim * dim
    }

    pub fn dim(&self) -> u32 {
        self.dim
    }

    pub fn texels(&self) -> &[[u8; 4]] {
        &self.texels
    }

    pub fn texel(&self, x: u32, y: u32, z: u32) -> [u8; 4] {
        self.texels[Self::index_for(self.dim, x, y, z)]
    }

    pub fn set(&mut self, x: u32, y: u32, z: u32, value: [u8; 4]) {
        let index = Self::index_for(self.dim, x, y, z);
        self.texels[index] = value;
    }

    pub fn occupied_count(&self) -> usize {
        self.texels.iter().filter(|t| t[3] > 0).count()
    }

    fn fetch(&self, x: i64, y: i64, z: i64) -> Vec4 {
        let dim = self.dim as i64;
        if x < 0 || y < 0 || z < 0 || x >= dim || y >= dim || z >= dim {
            return Vec4::ZERO;
        }
        let [r, g, b, a] = self.texel(x as u32, y as u32, z as u32);
        Vec4::new(r as f32, g as f32, b as f32, a as f32) / 255.0
    }

    /// Trilinear filtered read at a point of the normalized cube.
    ///
    /// Texels beyond the grid read as transparent black.
    pub fn sample(&self, p: Vec3) -> Vec4 {
        let g = (p * 0.5 + 0.5) * self.dim as f32 - 0.5;
        let base = g.floor();
        let f = g - base;
        let (x, y, z) = (base.x as i64, base.y as i64, base.z as i64);

        let c00 = self.fetch(x, y, z).lerp(self.fetch(x + 1, y, z), f.x);
        let c10 = self.fetch(x, y + 1, z).lerp(self.fetch(x + 1, y + 1, z), f.x);
        let c01 = self.fetch(x, y, z + 1).lerp(self.fetch(x + 1, y, z + 1), f.x);
        let c11 = self
            .fetch(x, y + 1, z + 1)
            .lerp(self.fetch(x + 1, y + 1, z + 1), f.x);
        let c0 = c00.lerp(c10, f.y);
        let c1 = c01.lerp(c11, f.y);
        c0.lerp(c1, f.z)
    }
}

/// Immutable mip-mapped radiance and occupancy grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoxelGrid {
    dim: VoxelDim,
    levels: Vec<VoxelLevel>,
}

impl VoxelGrid {
    /// Builds the full mip chain on top of a resolved base level.
    pub fn from_base(dim: VoxelDim, base: VoxelLevel) -> Self {
        assert_eq!(base.dim(), dim.get(), "base level does not match grid size");
        Self {
            dim,
            levels: mipmap::build_chain(base),
        }
    }

    pub fn dim(&self) -> VoxelDim {
        self.dim
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> &VoxelLevel {
        &self.levels[index]
    }

    pub fn levels(&self) -> &[VoxelLevel] {
        &self.levels
    }

    pub fn voxel_size(&self) -> f32 {
        self.dim.voxel_size()
    }

    pub fn max_lod(&self) -> f32 {
        (self.levels.len() - 1) as f32
    }

    pub fn occupied_count(&self) -> usize {
        self.levels[0].occupied_count()
    }

    /// Quadrilinear read: trilinear inside the two nearest levels, blended by `lod`.
    pub fn sample_lod(&self, p: Vec3, lod: f32) -> Vec4 {
        let lod = lod.clamp(0.0, self.max_lod());
        let lower = lod.floor() as usize;
        let upper = (lower + 1).min(self.levels.len() - 1);
        let t = lod - lower as f32;
        let fine = self.levels[lower].sample(p);
        if upper == lower || t == 0.0 {
            return fine;
        }
        fine.lerp(self.levels[upper].sample(p), t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_voxel_grid() -> VoxelGrid {
        let dim = VoxelDim::new(4).unwrap();
        let mut base = VoxelLevel::empty(4);
        base.set(1, 1, 1, [255, 0, 0, 255]);
        VoxelGrid::from_base(dim, base)
    }

    #[test]
    fn sampling_a_texel_centre_returns_the_texel() {
        let grid = single_voxel_grid();
        // Centre of voxel (1,1,1) in a 4³ grid.
        let p = Vec3::splat((1.5 / 4.0) * 2.0 - 1.0);
        assert_eq!(grid.level(0).sample(p), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(grid.sample_lod(p, 0.0), Vec4::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn halfway_between_texels_blends_evenly() {
        let grid = single_voxel_grid();
        let p = Vec3::new(0.0, (1.5 / 4.0) * 2.0 - 1.0, (1.5 / 4.0) * 2.0 - 1.0);
        let sample = grid.level(0).sample(p);
        assert!((sample.w - 0.5).abs() < 1e-6);
    }

    #[test]
    fn lod_blends_between_levels() {
        let grid = single_voxel_grid();
        let p = Vec3::splat((1.5 / 4.0) * 2.0 - 1.0);
        let level0 = grid.sample_lod(p, 0.0);
        let level1 = grid.sample_lod(p, 1.0);
        let mid = grid.sample_lod(p, 0.5);
        assert!((mid - (level0 + level1) * 0.5).length() < 1e-6);
        // Clamped to the coarsest level.
        assert_eq!(grid.sample_lod(p, 99.0), grid.level(2).sample(p));
    }

    #[test]
    fn outside_reads_are_transparent() {
        let grid = single_voxel_grid();
        assert_eq!(grid.level(0).sample(Vec3::splat(3.0)), Vec4::ZERO);
        assert_eq!(grid.occupied_count(), 1);
        assert_eq!(grid.level_count(), 3);
    }
}
