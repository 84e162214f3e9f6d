use std::time::Instant;

use glam::Vec3;
use log::debug;
use rayon::prelude::*;

use super::surface::VisibilityBuffer;
use crate::app::PreparedScene;
use crate::camera::Camera;
use crate::config::ConeConfig;
use crate::raster::Viewport;
use crate::trace::{ConeSet, FrameShader};

/// Background for pixels no triangle covers.
pub const CLEAR_COLOR: Vec3 = Vec3::new(0.2, 0.3, 0.3);

/// A finished RGBA8 frame, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 4]>,
    covered: usize,
}

impl FrameBuffer {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[[u8; 4]] {
        &self.pixels
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Pixels that show geometry rather than the clear colour.
    pub fn covered_pixels(&self) -> usize {
        self.covered
    }

    /// Mean Rec. 709 luma over the whole frame, in `[0, 1]`.
    pub fn mean_luminance(&self) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .pixels
            .iter()
            .map(|[r, g, b, _]| 0.2126 * *r as f64 + 0.7152 * *g as f64 + 0.0722 * *b as f64)
            .sum();
        (total / (self.pixels.len() as f64 * 255.0)) as f32
    }
}

fn to_rgba8(color: Vec3) -> [u8; 4] {
    let c = (color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round();
    if !c.is_finite() {
        return [0, 0, 0, 255];
    }
    [c.x as u8, c.y as u8, c.z as u8, 255]
}

/// Camera pass plus per-pixel cone-traced shading.
#[derive(Debug, Clone)]
pub struct FrameRenderer {
    cones: ConeSet,
    config: ConeConfig,
}

impl FrameRenderer {
    pub fn new(config: &ConeConfig) -> Self {
        Self {
            cones: ConeSet::cosine_hemisphere(config.diffuse_count, config.diffuse_aperture),
            config: config.clone(),
        }
    }

    pub fn cones(&self) -> &ConeSet {
        &self.cones
    }

    pub fn render(
        &self,
        prepared: &PreparedScene,
        camera: &Camera,
        width: u32,
        height: u32,
    ) -> FrameBuffer {
        let started = Instant::now();
        let viewport = Viewport::new(width.max(1), height.max(1));
        let aspect = viewport.width as f32 / viewport.height as f32;
        let visibility =
            VisibilityBuffer::render(&prepared.scene, camera.view_projection(aspect), viewport);

        let shader = FrameShader::new(
            &prepared.scene,
            &prepared.grid,
            &prepared.shadow,
            &prepared.light,
            &self.cones,
            &self.config,
            camera.position,
        );
        let clear = to_rgba8(CLEAR_COLOR);
        let pixels: Vec<[u8; 4]> = visibility
            .samples()
            .par_iter()
            .map(|sample| match sample {
                Some(sample) => to_rgba8(shader.shade(sample)),
                None => clear,
            })
            .collect();

        let covered = visibility.covered_count();
        debug!(
            "Frame {}x{}: {covered} covered pixels in {:.2?}",
            viewport.width,
            viewport.height,
            started.elapsed()
        );
        FrameBuffer {
            width: viewport.width,
            height: viewport.height,
            pixels,
            covered,
        }
    }
}
