use glam::Vec3;

const GOLDEN_ANGLE: f32 = 2.399_963_2;
const MIN_DIFFUSE_APERTURE: f32 = 0.05;
const MAX_DIFFUSE_APERTURE: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cone {
    /// Unit direction in tangent space, +Z along the surface normal.
    pub direction: Vec3,
    pub weight: f32,
}

/// Diffuse cone table, built once from the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConeSet {
    cones: Vec<Cone>,
    aperture: f32,
}

impl ConeSet {
    /// Golden-angle spiral over the hemisphere with cosine-weighted density.
    ///
    /// Every cone gets the same weight; the density of directions already
    /// follows the cosine lobe. A single cone points straight along the normal.
    pub fn cosine_hemisphere(count: u32, aperture: Option<f32>) -> Self {
        let count = count.max(1);
        let aperture = aperture.unwrap_or_else(|| Self::default_aperture(count));
        let weight = 1.0 / count as f32;
        let cones = (0..count)
            .map(|i| {
                if count == 1 {
                    return Cone {
                        direction: Vec3::Z,
                        weight,
                    };
                }
                let u = (i as f32 + 0.5) / count as f32;
                let radius = u.sqrt();
                let phi = i as f32 * GOLDEN_ANGLE;
                Cone {
                    direction: Vec3::new(radius * phi.cos(), radius * phi.sin(), (1.0 - u).sqrt())
                        .normalize(),
                    weight,
                }
            })
            .collect();
        Self { cones, aperture }
    }

    /// Half-angle at which `count` cones roughly tile the hemisphere.
    pub fn default_aperture(count: u32) -> f32 {
        let count = count.max(1) as f32;
        (1.0 - 1.0 / count)
            .acos()
            .clamp(MIN_DIFFUSE_APERTURE, MAX_DIFFUSE_APERTURE)
    }

    pub fn cones(&self) -> &[Cone] {
        &self.cones
    }

    pub fn aperture(&self) -> f32 {
        self.aperture
    }

    pub fn len(&self) -> usize {
        self.cones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cones.is_empty()
    }
}

/// Specular cone half-angle: narrower for shinier materials.
pub fn specular_aperture(shininess: f32, min: f32, max: f32) -> f32 {
    (1.0 / (1.0 + shininess.max(0.0))).sqrt().clamp(min, max)
}
