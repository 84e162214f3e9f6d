//! Voxel radiance grid: conservative voxelization and its mip pyramid.
//!
//! Voxelization writes into a [`VoxelAccumulator`] from many rayon workers at
//! once. [`VoxelAccumulator::resolve`] consumes it, which is the point where
//! every writer is known to have finished, and yields the immutable base
//! level. The mip chain is built from that level and the finished
//! [`VoxelGrid`] is shared read-only with the shading stage.

mod accum;
mod grid;
mod mipmap;
mod voxelize;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VctError};

pub use accum::VoxelAccumulator;
pub use grid::{VoxelGrid, VoxelLevel};
pub use mipmap::downsample;
pub use voxelize::voxelize;

pub const MIN_VOXEL_DIM: u32 = 2;
pub const MAX_VOXEL_DIM: u32 = 512;

/// Side length of the voxel cube, a power of two in `2..=512`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct VoxelDim(u32);

impl VoxelDim {
    pub fn new(dim: u32) -> Result<Self> {
        if !dim.is_power_of_two() || !(MIN_VOXEL_DIM..=MAX_VOXEL_DIM).contains(&dim) {
            return Err(VctError::config(format!(
                "voxel dimension {dim} must be a power of two in {MIN_VOXEL_DIM}..={MAX_VOXEL_DIM}"
            )));
        }
        Ok(Self(dim))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Number of mip levels down to and including the 1x1x1 level.
    pub fn level_count(self) -> usize {
        self.0.trailing_zeros() as usize + 1
    }

    /// Edge length of a level-0 voxel in normalized cube units.
    pub fn voxel_size(self) -> f32 {
        2.0 / self.0 as f32
    }

    pub fn cell_count(self) -> usize {
        (self.0 as usize).pow(3)
    }
}

impl TryFrom<u32> for VoxelDim {
    type Error = VctError;

    fn try_from(dim: u32) -> Result<Self> {
        Self::new(dim)
    }
}

impl From<VoxelDim> for u32 {
    fn from(dim: VoxelDim) -> Self {
        dim.0
    }
}
