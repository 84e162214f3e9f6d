use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;
use rayon::prelude::*;

use super::{VoxelDim, VoxelLevel};

#[derive(Debug, Default)]
struct Cell {
    r: AtomicU32,
    g: AtomicU32,
    b: AtomicU32,
    count: AtomicU32,
}

/// Write side of the voxel grid.
///
/// Each fragment adds its quantized colour and bumps a counter, so the
/// result does not depend on the order in which workers arrive.
#[derive(Debug)]
pub struct VoxelAccumulator {
    dim: VoxelDim,
    cells: Vec<Cell>,
}

impl VoxelAccumulator {
    pub fn new(dim: VoxelDim) -> Self {
        let mut cells = Vec::with_capacity(dim.cell_count());
        cells.resize_with(dim.cell_count(), Cell::default);
        Self { dim, cells }
    }

    pub fn dim(&self) -> VoxelDim {
        self.dim
    }

    /// Adds one fragment of radiance, clamped to `[0, 1]`, to a cell.
    pub fn add(&self, [x, y, z]: [u32; 3], radiance: Vec3) {
        let dim = self.dim.get();
        debug_assert!(x < dim && y < dim && z < dim);
        let cell = &self.cells[VoxelLevel::index_for(dim, x, y, z)];
        let [r, g, b] = quantize(radiance);
        cell.r.fetch_add(r, Ordering::Relaxed);
        cell.g.fetch_add(g, Ordering::Relaxed);
        cell.b.fetch_add(b, Ordering::Relaxed);
        cell.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Averages every occupied cell into an RGBA8 level with full alpha.
    ///
    /// Taking `self` by value guarantees no writer is still running.
    pub fn resolve(self) -> VoxelLevel {
        let texels = self
            .cells
            .into_par_iter()
            .map(|cell| {
                let count = cell.count.into_inner();
                if count == 0 {
                    return [0; 4];
                }
                let average = |sum: u32| ((sum + count / 2) / count).min(255) as u8;
                [
                    average(cell.r.into_inner()),
                    average(cell.g.into_inner()),
                    average(cell.b.into_inner()),
                    255,
                ]
            })
            .collect();
        VoxelLevel::from_texels(self.dim.get(), texels)
    }
}

fn quantize(radiance: Vec3) -> [u32; 3] {
    let q = |v: f32| {
        if v.is_finite() {
            (v.clamp(0.0, 1.0) * 255.0).round() as u32
        } else {
            0
        }
    };
    [q(radiance.x), q(radiance.y), q(radiance.z)]
}
