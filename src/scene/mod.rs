//! Scene store: triangle batches, materials, textures and the world bounds.
//!
//! A [`Scene`] is built once, either from a Wavefront OBJ file or from
//! in-memory parts, and is immutable afterwards. Every later stage reads it
//! through shared references.

mod bounds;
pub mod obj;
mod tangent;
mod texture;

use std::path::Path;

use glam::{Vec2, Vec3};
use log::info;

use crate::error::{Result, VctError};

pub use bounds::{Bounds, WorldMapping};
pub use tangent::{compute_tangent_frame, orthonormal_basis, TangentFrame};
pub use texture::{Texture, TextureArena, TextureHandle};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    /// Present only when the owning material carries a normal map.
    pub tangent_frame: Option<TangentFrame>,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal,
            uv,
            tangent_frame: None,
        }
    }
}

/// Unindexed triangles sharing one material, three vertices per triangle.
#[derive(Debug, Clone)]
pub struct TriangleBatch {
    pub name: String,
    pub material: usize,
    pub vertices: Vec<Vertex>,
}

impl TriangleBatch {
    pub fn new(name: impl Into<String>, material: usize, vertices: Vec<Vertex>) -> Self {
        Self {
            name: name.into(),
            material,
            vertices,
        }
    }

    /// Two triangles spanning `center ± u ± v`, facing along `u × v`.
    pub fn quad(name: impl Into<String>, material: usize, center: Vec3, u: Vec3, v: Vec3) -> Self {
        let normal = u.cross(v).normalize_or_zero();
        let corner = |su: f32, sv: f32| {
            Vertex::new(
                center + su * u + sv * v,
                normal,
                Vec2::new(0.5 + 0.5 * su, 0.5 + 0.5 * sv),
            )
        };
        let (a, b, c, d) = (
            corner(-1.0, -1.0),
            corner(1.0, -1.0),
            corner(1.0, 1.0),
            corner(-1.0, 1.0),
        );
        Self::new(name, material, vec![a, b, c, a, c, d])
    }

    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn triangle(&self, index: usize) -> &[Vertex] {
        &self.vertices[3 * index..3 * index + 3]
    }

    pub fn triangles(&self) -> impl Iterator<Item = &[Vertex]> + '_ {
        self.vertices.chunks_exact(3)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub kd: Vec3,
    pub ks: Vec3,
    pub ke: Vec3,
    pub shininess: f32,
    pub diffuse_map: Option<TextureHandle>,
    pub specular_map: Option<TextureHandle>,
    pub normal_map: Option<TextureHandle>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            kd: Vec3::ONE,
            ks: Vec3::ZERO,
            ke: Vec3::ZERO,
            shininess: 1.0,
            diffuse_map: None,
            specular_map: None,
            normal_map: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneStats {
    pub batches: usize,
    pub triangles: usize,
    pub materials: usize,
    pub textures: usize,
}

#[derive(Debug)]
pub struct Scene {
    batches: Vec<TriangleBatch>,
    materials: Vec<Material>,
    textures: TextureArena,
    bounds: Bounds,
    mapping: WorldMapping,
}

impl Scene {
    /// Loads an OBJ file, resolving texture names against `texture_dir`.
    pub fn load(geometry: &Path, texture_dir: &Path) -> Result<Self> {
        let data = obj::read_obj(geometry)?;
        let mut textures = TextureArena::new();
        let (batches, materials) = obj::convert(&data, texture_dir, &mut textures, geometry)?;
        Self::build(batches, materials, textures, geometry)
    }

    /// Builds a scene from in-memory geometry.
    pub fn from_parts(
        batches: Vec<TriangleBatch>,
        materials: Vec<Material>,
        textures: TextureArena,
    ) -> Result<Self> {
        Self::build(batches, materials, textures, Path::new("<memory>"))
    }

    fn build(
        mut batches: Vec<TriangleBatch>,
        materials: Vec<Material>,
        textures: TextureArena,
        source: &Path,
    ) -> Result<Self> {
        batches.retain(|batch| !batch.vertices.is_empty());
        if batches.is_empty() {
            return Err(VctError::asset(source, "scene contains no triangles"));
        }

        let mut bounds = Bounds::EMPTY;
        for batch in &mut batches {
            if batch.vertices.len() % 3 != 0 {
                return Err(VctError::asset(
                    source,
                    format!("batch {:?} has a partial triangle", batch.name),
                ));
            }
            let material = materials.get(batch.material).ok_or_else(|| {
                VctError::asset(
                    source,
                    format!(
                        "batch {:?} references missing material {}",
                        batch.name, batch.material
                    ),
                )
            })?;
            if material.normal_map.is_some() {
                assign_tangent_frames(batch);
            }
            for vertex in &batch.vertices {
                bounds.expand(vertex.position);
            }
        }

        let mapping = bounds
            .mapping()
            .ok_or_else(|| VctError::asset(source, "scene bounds are degenerate"))?;

        let scene = Self {
            batches,
            materials,
            textures,
            bounds,
            mapping,
        };
        let stats = scene.stats();
        info!(
            "Scene: {} batches, {} triangles, {} materials, {} textures, size {:.3}",
            stats.batches,
            stats.triangles,
            stats.materials,
            stats.textures,
            bounds.size()
        );
        Ok(scene)
    }

    pub fn batches(&self) -> &[TriangleBatch] {
        &self.batches
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn material(&self, index: usize) -> &Material {
        &self.materials[index]
    }

    pub fn textures(&self) -> &TextureArena {
        &self.textures
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn world_mapping(&self) -> WorldMapping {
        self.mapping
    }

    pub fn triangle_count(&self) -> usize {
        self.batches.iter().map(TriangleBatch::triangle_count).sum()
    }

    pub fn stats(&self) -> SceneStats {
        SceneStats {
            batches: self.batches.len(),
            triangles: self.triangle_count(),
            materials: self.materials.len(),
            textures: self.textures.len(),
        }
    }

    /// Diffuse reflectance at `uv`: the solid colour times the diffuse map.
    pub fn diffuse(&self, material: &Material, uv: Vec2) -> Vec3 {
        material.kd * self.map_rgb(material.diffuse_map, uv)
    }

    pub fn specular(&self, material: &Material, uv: Vec2) -> Vec3 {
        material.ks * self.map_rgb(material.specular_map, uv)
    }

    /// Applies the material's normal map to an interpolated normal.
    pub fn shading_normal(
        &self,
        material: &Material,
        uv: Vec2,
        normal: Vec3,
        frame: Option<TangentFrame>,
    ) -> Vec3 {
        let texture = material.normal_map.and_then(|handle| self.textures.get(handle));
        let (Some(texture), Some(frame)) = (texture, frame) else {
            return normal;
        };
        let texel = texture.sample(uv).truncate() * 2.0 - Vec3::ONE;
        let perturbed = frame.tangent * texel.x + frame.bitangent * texel.y + normal * texel.z;
        perturbed.try_normalize().unwrap_or(normal)
    }

    fn map_rgb(&self, handle: Option<TextureHandle>, uv: Vec2) -> Vec3 {
        handle
            .and_then(|handle| self.textures.get(handle))
            .map_or(Vec3::ONE, |texture| texture.sample(uv).truncate())
    }
}

fn assign_tangent_frames(batch: &mut TriangleBatch) {
    for triangle in batch.vertices.chunks_exact_mut(3) {
        if triangle.iter().all(|v| v.tangent_frame.is_some()) {
            continue;
        }
        let frame = compute_tangent_frame(
            [triangle[0].position, triangle[1].position, triangle[2].position],
            [triangle[0].uv, triangle[1].uv, triangle[2].uv],
        );
        for vertex in triangle {
            vertex.tangent_frame = Some(frame);
        }
    }
}
