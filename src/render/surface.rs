use glam::Mat4;
use rayon::prelude::*;

use crate::raster::{self, ScreenTriangle, Viewport};
use crate::scene::Scene;
use crate::trace::SurfaceSample;

const ROWS_PER_BAND: usize = 8;

/// Nearest surface per pixel, as seen from the camera.
#[derive(Debug, Clone)]
pub struct VisibilityBuffer {
    viewport: Viewport,
    samples: Vec<Option<SurfaceSample>>,
}

impl VisibilityBuffer {
    /// Rasterizes every scene triangle with a depth test.
    ///
    /// Clip-space setup runs in parallel over batches, scan conversion in
    /// parallel over bands of rows that each own their pixels.
    pub fn render(scene: &Scene, view_proj: Mat4, viewport: Viewport) -> Self {
        let triangles: Vec<(u32, u32, ScreenTriangle)> = scene
            .batches()
            .par_iter()
            .enumerate()
            .flat_map_iter(|(batch_index, batch)| {
                let mut out = Vec::new();
                let mut screen = Vec::with_capacity(2);
                for (triangle_index, triangle) in batch.triangles().enumerate() {
                    let clip = [0, 1, 2].map(|i| view_proj * triangle[i].position.extend(1.0));
                    screen.clear();
                    raster::setup_triangle(clip, viewport, &mut screen);
                    out.extend(
                        screen
                            .iter()
                            .map(|s| (batch_index as u32, triangle_index as u32, *s)),
                    );
                }
                out
            })
            .collect();

        let mut samples = vec![None; viewport.pixel_count()];
        let row_len = viewport.width as usize;
        if row_len == 0 {
            return Self { viewport, samples };
        }
        samples
            .par_chunks_mut(row_len * ROWS_PER_BAND)
            .enumerate()
            .for_each(|(band, pixels)| {
                let first = (band * ROWS_PER_BAND) as u32;
                let rows = first..first + (pixels.len() / row_len) as u32;
                for (batch, triangle, screen) in &triangles {
                    let own = screen.rows(viewport);
                    if own.end <= rows.start || own.start >= rows.end {
                        continue;
                    }
                    screen.rasterize(viewport, rows.clone(), |x, y, fragment| {
                        let pixel = &mut pixels[(y - first) as usize * row_len + x as usize];
                        if pixel.map_or(true, |existing| fragment.depth < existing.depth) {
                            *pixel = Some(SurfaceSample {
                                batch: *batch,
                                triangle: *triangle,
                                bary: fragment.bary,
                                depth: fragment.depth,
                            });
                        }
                    });
                }
            });

        Self { viewport, samples }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn samples(&self) -> &[Option<SurfaceSample>] {
        &self.samples
    }

    pub fn get(&self, x: u32, y: u32) -> Option<&SurfaceSample> {
        if x >= self.viewport.width || y >= self.viewport.height {
            return None;
        }
        self.samples[(y * self.viewport.width + x) as usize].as_ref()
    }

    pub fn covered_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::config::CameraConfig;
    use crate::scene::{Material, TextureArena, TriangleBatch};
    use glam::Vec3;

    fn two_planes() -> Scene {
        let back_center = Vec3::new(0.0, 0.0, -10.0);
        let back = TriangleBatch::quad("back", 0, back_center, Vec3::X * 50.0, Vec3::Y * 50.0);
        let front = TriangleBatch::quad("front", 0, Vec3::new(0.0, 0.0, -5.0), Vec3::X, Vec3::Y);
        let materials = vec![Material::default()];
        Scene::from_parts(vec![back, front], materials, TextureArena::new()).unwrap()
    }

    fn camera() -> Camera {
        Camera::from(&CameraConfig {
            position: Vec3::ZERO,
            ..CameraConfig::default()
        })
    }

    #[test]
    fn nearest_surface_wins_regardless_of_order() {
        let scene = two_planes();
        let viewport = Viewport::new(64, 64);
        let buffer = VisibilityBuffer::render(&scene, camera().view_projection(1.0), viewport);

        let centre = buffer.get(32, 32).unwrap();
        assert_eq!(centre.batch, 1);
        let corner = buffer.get(1, 1).unwrap();
        assert_eq!(corner.batch, 0);
        assert_eq!(buffer.covered_count(), viewport.pixel_count());
    }

    #[test]
    fn looking_away_covers_nothing() {
        let scene = two_planes();
        let mut camera = camera();
        camera.process_pointer(1800.0, 0.0);
        let viewport = Viewport::new(16, 16);
        let buffer = VisibilityBuffer::render(&scene, camera.view_projection(1.0), viewport);
        assert_eq!(buffer.covered_count(), 0);
        assert!(buffer.get(99, 0).is_none());
    }
}
