//! Triangle setup and scan conversion shared by the shadow and camera passes.
//!
//! Triangles enter in clip space (glam's right-handed projections, depth in
//! `0..=1`), are clipped against the near plane, mapped to pixels with the
//! y axis pointing down, and rasterized at pixel centres. Fragments report
//! barycentrics relative to the *source* triangle, corrected for
//! perspective, so callers can interpolate any vertex attribute.

use std::ops::Range;

use glam::{Vec2, Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ClipVertex {
    clip: Vec4,
    bary: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScreenVertex {
    pos: Vec2,
    depth: f32,
    inv_w: f32,
    bary_over_w: Vec3,
}

/// A covered pixel centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment {
    /// Normalized device depth in `0..=1`.
    pub depth: f32,
    /// Perspective-correct barycentrics of the source triangle.
    pub bary: Vec3,
}

/// A clipped, projected triangle ready for scan conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenTriangle {
    v: [ScreenVertex; 3],
    min: Vec2,
    max: Vec2,
    inv_area: f32,
}

/// Clips a triangle against the near plane (`z >= 0`) and appends the
/// resulting screen triangles, zero to two of them, to `out`.
pub fn setup_triangle(clip: [Vec4; 3], viewport: Viewport, out: &mut Vec<ScreenTriangle>) {
    let source = [
        ClipVertex {
            clip: clip[0],
            bary: Vec3::X,
        },
        ClipVertex {
            clip: clip[1],
            bary: Vec3::Y,
        },
        ClipVertex {
            clip: clip[2],
            bary: Vec3::Z,
        },
    ];
    if source.iter().any(|v| !v.clip.is_finite()) {
        return;
    }

    let (polygon, len) = clip_near(source);
    for i in 1..len.saturating_sub(1) {
        let corners = [polygon[0], polygon[i], polygon[i + 1]];
        if let Some(triangle) = ScreenTriangle::new(corners, viewport) {
            out.push(triangle);
        }
    }
}

/// Sutherland-Hodgman against a single plane: a triangle becomes at most a quad.
fn clip_near(triangle: [ClipVertex; 3]) -> ([ClipVertex; 4], usize) {
    let mut polygon = [triangle[0]; 4];
    let mut len = 0;
    for i in 0..3 {
        let a = triangle[i];
        let b = triangle[(i + 1) % 3];
        let a_inside = a.clip.z >= 0.0;
        let b_inside = b.clip.z >= 0.0;
        if a_inside {
            polygon[len] = a;
            len += 1;
        }
        if a_inside != b_inside {
            let t = a.clip.z / (a.clip.z - b.clip.z);
            polygon[len] = ClipVertex {
                clip: a.clip.lerp(b.clip, t),
                bary: a.bary.lerp(b.bary, t),
            };
            len += 1;
        }
    }
    (polygon, len)
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

impl ScreenTriangle {
    fn new(corners: [ClipVertex; 3], viewport: Viewport) -> Option<Self> {
        let (w, h) = (viewport.width as f32, viewport.height as f32);
        let v = corners.map(|c| {
            let inv_w = 1.0 / c.clip.w;
            let ndc = c.clip.truncate() * inv_w;
            ScreenVertex {
                pos: Vec2::new((ndc.x * 0.5 + 0.5) * w, (0.5 - ndc.y * 0.5) * h),
                depth: ndc.z,
                inv_w,
                bary_over_w: c.bary * inv_w,
            }
        });
        let area = edge(v[0].pos, v[1].pos, v[2].pos);
        if !area.is_finite() || area == 0.0 {
            return None;
        }
        let min = v[0].pos.min(v[1].pos).min(v[2].pos);
        let max = v[0].pos.max(v[1].pos).max(v[2].pos);
        if max.x < 0.0 || max.y < 0.0 || min.x > w || min.y > h {
            return None;
        }
        Some(Self {
            v,
            min,
            max,
            inv_area: 1.0 / area,
        })
    }

    /// Pixel rows the triangle may touch, clamped to the viewport.
    pub fn rows(&self, viewport: Viewport) -> Range<u32> {
        let start = self.min.y.floor().max(0.0) as u32;
        let end = (self.max.y.ceil().max(0.0) as u32).min(viewport.height);
        start..end.max(start)
    }

    /// Visits every covered pixel centre whose row lies in `rows`.
    ///
    /// Both windings are accepted; the sign of the area normalizes the edge
    /// functions.
    pub fn rasterize(
        &self,
        viewport: Viewport,
        rows: Range<u32>,
        mut visit: impl FnMut(u32, u32, Fragment),
    ) {
        let own = self.rows(viewport);
        let y_range = rows.start.max(own.start)..rows.end.min(own.end);
        let x_start = self.min.x.floor().max(0.0) as u32;
        let x_end = (self.max.x.ceil().max(0.0) as u32).min(viewport.width);
        let [a, b, c] = self.v;

        for y in y_range {
            let py = y as f32 + 0.5;
            for x in x_start..x_end {
                let p = Vec2::new(x as f32 + 0.5, py);
                let l0 = edge(b.pos, c.pos, p) * self.inv_area;
                let l1 = edge(c.pos, a.pos, p) * self.inv_area;
                let l2 = edge(a.pos, b.pos, p) * self.inv_area;
                if l0 < 0.0 || l1 < 0.0 || l2 < 0.0 {
                    continue;
                }
                let inv_w = l0 * a.inv_w + l1 * b.inv_w + l2 * c.inv_w;
                if !(inv_w > 0.0) {
                    continue;
                }
                let bary = (l0 * a.bary_over_w + l1 * b.bary_over_w + l2 * c.bary_over_w) / inv_w;
                let depth = l0 * a.depth + l1 * b.depth + l2 * c.depth;
                visit(x, y, Fragment { depth, bary });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    const VIEWPORT: Viewport = Viewport {
        width: 32,
        height: 32,
    };

    fn collect(triangles: &[ScreenTriangle]) -> Vec<(u32, u32, Fragment)> {
        let mut fragments = Vec::new();
        for triangle in triangles {
            triangle.rasterize(VIEWPORT, 0..VIEWPORT.height, |x, y, f| fragments.push((x, y, f)));
        }
        fragments
    }

    #[test]
    fn fullscreen_pair_covers_every_pixel_once_or_more() {
        let corners = [
            Vec4::new(-1.0, -1.0, 0.5, 1.0),
            Vec4::new(1.0, -1.0, 0.5, 1.0),
            Vec4::new(1.0, 1.0, 0.5, 1.0),
            Vec4::new(-1.0, 1.0, 0.5, 1.0),
        ];
        let mut triangles = Vec::new();
        setup_triangle([corners[0], corners[1], corners[2]], VIEWPORT, &mut triangles);
        // Opposite winding on purpose.
        setup_triangle([corners[0], corners[3], corners[2]], VIEWPORT, &mut triangles);
        assert_eq!(triangles.len(), 2);

        let mut covered = vec![false; VIEWPORT.pixel_count()];
        for (x, y, fragment) in collect(&triangles) {
            covered[(y * VIEWPORT.width + x) as usize] = true;
            assert!((fragment.bary.element_sum() - 1.0).abs() < 1e-5);
            assert!((fragment.depth - 0.5).abs() < 1e-6);
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn screen_y_points_down() {
        // Small triangle in the upper half of NDC space.
        let clip = [
            Vec4::new(-0.5, 0.5, 0.5, 1.0),
            Vec4::new(0.5, 0.5, 0.5, 1.0),
            Vec4::new(0.0, 0.9, 0.5, 1.0),
        ];
        let mut triangles = Vec::new();
        setup_triangle(clip, VIEWPORT, &mut triangles);
        let fragments = collect(&triangles);
        assert!(!fragments.is_empty());
        assert!(fragments.iter().all(|(_, y, _)| *y < VIEWPORT.height / 2));
    }

    #[test]
    fn triangle_behind_near_plane_is_dropped() {
        let clip = [
            Vec4::new(0.0, 0.0, -0.1, 1.0),
            Vec4::new(1.0, 0.0, -0.2, 1.0),
            Vec4::new(0.0, 1.0, -0.3, 1.0),
        ];
        let mut triangles = Vec::new();
        setup_triangle(clip, VIEWPORT, &mut triangles);
        assert!(triangles.is_empty());
    }

    #[test]
    fn straddling_triangle_is_clipped_into_two() {
        let projection = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let world = [
            Vec3::new(-1.0, -1.0, -5.0),
            Vec3::new(1.0, -1.0, -5.0),
            Vec3::new(0.0, -1.0, 5.0),
        ];
        let clip = world.map(|p| projection * p.extend(1.0));
        assert!(clip[2].z < 0.0);

        let (polygon, len) = clip_near([
            ClipVertex {
                clip: clip[0],
                bary: Vec3::X,
            },
            ClipVertex {
                clip: clip[1],
                bary: Vec3::Y,
            },
            ClipVertex {
                clip: clip[2],
                bary: Vec3::Z,
            },
        ]);
        assert_eq!(len, 4);
        for vertex in &polygon[..len] {
            assert!(vertex.clip.z >= -1e-5);
            assert!((vertex.bary.element_sum() - 1.0).abs() < 1e-5);
        }

        let mut triangles = Vec::new();
        setup_triangle(clip, VIEWPORT, &mut triangles);
        assert_eq!(triangles.len(), 2);
        for (_, _, fragment) in collect(&triangles) {
            assert!(fragment.depth >= -1e-5 && fragment.depth <= 1.0);
        }
    }

    #[test]
    fn barycentrics_are_perspective_correct() {
        let projection = Mat4::perspective_rh(1.2, 1.0, 0.1, 100.0);
        // A floor receding into the distance.
        let world = [
            Vec3::new(-4.0, -1.0, -1.5),
            Vec3::new(4.0, -1.0, -1.5),
            Vec3::new(0.0, -1.0, -60.0),
        ];
        let clip = world.map(|p| projection * p.extend(1.0));
        let mut triangles = Vec::new();
        setup_triangle(clip, VIEWPORT, &mut triangles);
        for (_, _, fragment) in collect(&triangles) {
            let point = world[0] * fragment.bary.x
                + world[1] * fragment.bary.y
                + world[2] * fragment.bary.z;
            // Reconstructed points must stay on the floor plane and reproject
            // onto the fragment's depth.
            assert!((point.y + 1.0).abs() < 1e-3);
            let reprojected = projection * point.extend(1.0);
            let depth = reprojected.z / reprojected.w;
            assert!((depth - fragment.depth).abs() < 1e-3);
        }
    }

    #[test]
    fn row_bands_partition_coverage() {
        let clip = [
            Vec4::new(-0.9, -0.9, 0.2, 1.0),
            Vec4::new(0.9, -0.7, 0.2, 1.0),
            Vec4::new(0.1, 0.95, 0.2, 1.0),
        ];
        let mut triangles = Vec::new();
        setup_triangle(clip, VIEWPORT, &mut triangles);
        let whole = collect(&triangles).len();
        let mut banded = 0;
        for band in 0..4 {
            triangles[0].rasterize(VIEWPORT, band * 8..band * 8 + 8, |_, _, _| banded += 1);
        }
        assert_eq!(whole, banded);
    }
}
