use glam::{Vec2, Vec3};

use super::cones::{specular_aperture, ConeSet};
use super::march::ConeTracer;
use crate::config::ConeConfig;
use crate::lighting::{direct_radiance, Light};
use crate::scene::{orthonormal_basis, Scene, Vertex, WorldMapping};
use crate::shadow::ShadowMap;
use crate::voxel::VoxelGrid;

/// What the camera pass saw at one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSample {
    pub batch: u32,
    pub triangle: u32,
    /// Perspective-correct barycentrics within the triangle.
    pub bary: Vec3,
    /// Normalized device depth, used only for the depth test.
    pub depth: f32,
}

/// Surface attributes rebuilt from a [`SurfaceSample`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    pub position: Vec3,
    pub normal: Vec3,
    pub kd: Vec3,
    pub ks: Vec3,
    pub ke: Vec3,
    pub shininess: f32,
}

/// Per-frame shading context; [`FrameShader::shade`] is called once per
/// covered pixel and each call is independent.
#[derive(Debug, Clone, Copy)]
pub struct FrameShader<'a> {
    scene: &'a Scene,
    shadow: &'a ShadowMap,
    light: &'a Light,
    mapping: WorldMapping,
    tracer: ConeTracer<'a>,
    diffuse_cones: &'a ConeSet,
    specular_min: f32,
    specular_max: f32,
    eye: Vec3,
}

impl<'a> FrameShader<'a> {
    pub fn new(
        scene: &'a Scene,
        grid: &'a VoxelGrid,
        shadow: &'a ShadowMap,
        light: &'a Light,
        diffuse_cones: &'a ConeSet,
        config: &ConeConfig,
        eye: Vec3,
    ) -> Self {
        Self {
            scene,
            shadow,
            light,
            mapping: scene.world_mapping(),
            tracer: ConeTracer::new(grid, config),
            diffuse_cones,
            specular_min: config.specular_min_aperture,
            specular_max: config.specular_max_aperture,
            eye,
        }
    }

    /// Interpolates the sampled triangle and evaluates its material.
    pub fn surface(&self, sample: &SurfaceSample) -> SurfacePoint {
        let scene = self.scene;
        let batch = &scene.batches()[sample.batch as usize];
        let material = scene.material(batch.material);
        let vertices = batch.triangle(sample.triangle as usize);
        let b = sample.bary;
        let lerp3 = |f: fn(&Vertex) -> Vec3| {
            f(&vertices[0]) * b.x + f(&vertices[1]) * b.y + f(&vertices[2]) * b.z
        };
        let lerp2 = |f: fn(&Vertex) -> Vec2| {
            f(&vertices[0]) * b.x + f(&vertices[1]) * b.y + f(&vertices[2]) * b.z
        };

        let position = lerp3(|v| v.position);
        let uv = lerp2(|v| v.uv);
        let face_normal = (vertices[1].position - vertices[0].position)
            .cross(vertices[2].position - vertices[0].position)
            .normalize_or_zero();
        let normal = lerp3(|v| v.normal).try_normalize().unwrap_or(face_normal);
        let normal = scene.shading_normal(material, uv, normal, vertices[0].tangent_frame);

        SurfacePoint {
            position,
            normal,
            kd: scene.diffuse(material, uv),
            ks: scene.specular(material, uv),
            ke: material.ke,
            shininess: material.shininess,
        }
    }

    /// Direct light plus cone-traced indirect diffuse and specular.
    pub fn shade(&self, sample: &SurfaceSample) -> Vec3 {
        let surface = self.surface(sample);
        let direct = self.direct(&surface);
        direct
            + self.indirect_diffuse(&surface) * surface.kd
            + self.indirect_specular(&surface) * surface.ks
    }

    pub fn direct(&self, surface: &SurfacePoint) -> Vec3 {
        let visibility = self
            .shadow
            .visibility(surface.position, surface.normal, self.light.position);
        direct_radiance(
            surface.kd,
            surface.ke,
            surface.normal,
            self.light.direction_from(surface.position),
            visibility,
            self.light.color,
        )
    }

    pub fn indirect_diffuse(&self, surface: &SurfacePoint) -> Vec3 {
        let origin = self.mapping.to_normalized(surface.position);
        let (tangent, bitangent) = orthonormal_basis(surface.normal);
        let aperture = self.diffuse_cones.aperture();
        self.diffuse_cones
            .cones()
            .iter()
            .map(|cone| {
                let d = cone.direction;
                let direction = tangent * d.x + bitangent * d.y + surface.normal * d.z;
                self.tracer
                    .trace(origin, surface.normal, direction, aperture)
                    .radiance
                    * cone.weight
            })
            .sum()
    }

    /// Zero without tracing when the material has no specular colour.
    pub fn indirect_specular(&self, surface: &SurfacePoint) -> Vec3 {
        if surface.ks == Vec3::ZERO {
            return Vec3::ZERO;
        }
        let to_eye = (self.eye - surface.position).normalize_or_zero();
        let incident = -to_eye;
        let reflected = incident - 2.0 * incident.dot(surface.normal) * surface.normal;
        let aperture = specular_aperture(surface.shininess, self.specular_min, self.specular_max);
        let origin = self.mapping.to_normalized(surface.position);
        self.tracer
            .trace(origin, surface.normal, reflected, aperture)
            .radiance
    }
}
