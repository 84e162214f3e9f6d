use glam::Vec3;

use crate::config::ConeConfig;
use crate::voxel::VoxelGrid;

/// Hard cap on samples per cone.
pub const MAX_STEPS: u32 = 1024;
/// Accumulated opacity at which a cone counts as blocked.
pub const SATURATION: f32 = 0.95;

/// Why a cone march stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConeTermination {
    Saturated,
    LeftVolume,
    MaxDistance,
    StepLimit,
    /// The direction was zero or not finite; nothing was sampled.
    InvalidDirection,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConeResult {
    pub radiance: Vec3,
    pub occlusion: f32,
    pub steps: u32,
    pub termination: ConeTermination,
}

impl ConeResult {
    fn empty(termination: ConeTermination) -> Self {
        Self {
            radiance: Vec3::ZERO,
            occlusion: 0.0,
            steps: 0,
            termination,
        }
    }
}

/// Mip level sampled at `distance` along a cone of half-angle `aperture`.
///
/// The cone's radius at that distance is compared with the level-0 voxel
/// size; anything narrower than one voxel reads level 0.
pub fn mip_level(distance: f32, aperture: f32, voxel_size: f32) -> f32 {
    (distance * aperture.tan() / voxel_size).max(1.0).log2()
}

/// Marches cones through a voxel pyramid in normalized cube units.
#[derive(Debug, Clone, Copy)]
pub struct ConeTracer<'a> {
    grid: &'a VoxelGrid,
    surface_offset: f32,
    start_distance: f32,
    step_multiplier: f32,
    max_distance: f32,
}

impl<'a> ConeTracer<'a> {
    pub fn new(grid: &'a VoxelGrid, config: &ConeConfig) -> Self {
        Self {
            grid,
            surface_offset: config.surface_offset,
            start_distance: config.start_distance,
            step_multiplier: config.step_multiplier,
            max_distance: config.max_distance,
        }
    }

    pub fn grid(&self) -> &'a VoxelGrid {
        self.grid
    }

    /// Front-to-back accumulation along one cone.
    ///
    /// `origin` and `normal` describe the surface point in the normalized
    /// cube; the march starts a few voxels off the surface so it does not
    /// sample the surface's own voxels.
    pub fn trace(&self, origin: Vec3, normal: Vec3, direction: Vec3, aperture: f32) -> ConeResult {
        let Some(direction) = direction.try_normalize() else {
            return ConeResult::empty(ConeTermination::InvalidDirection);
        };
        let voxel_size = self.grid.voxel_size();
        let tan = aperture.tan();
        let start = origin + normal.normalize_or_zero() * self.surface_offset * voxel_size;

        let mut distance = self.start_distance * voxel_size;
        let mut color = Vec3::ZERO;
        let mut alpha = 0.0f32;

        for step in 0..MAX_STEPS {
            if alpha >= SATURATION {
                return finish(color, alpha, step, ConeTermination::Saturated);
            }
            if distance > self.max_distance {
                return finish(color, alpha, step, ConeTermination::MaxDistance);
            }
            let position = start + direction * distance;
            if position.abs().max_element() > 1.0 {
                return finish(color, alpha, step, ConeTermination::LeftVolume);
            }

            let lod = mip_level(distance, aperture, voxel_size);
            let sample = self.grid.sample_lod(position, lod);
            color += (1.0 - alpha) * sample.truncate();
            alpha += (1.0 - alpha) * sample.w;

            distance += voxel_size.max(2.0 * distance * tan) * self.step_multiplier;
        }
        let termination = if alpha >= SATURATION {
            ConeTermination::Saturated
        } else {
            ConeTermination::StepLimit
        };
        finish(color, alpha, MAX_STEPS, termination)
    }
}

fn finish(color: Vec3, alpha: f32, steps: u32, termination: ConeTermination) -> ConeResult {
    ConeResult {
        radiance: color,
        occlusion: alpha,
        steps,
        termination,
    }
}
