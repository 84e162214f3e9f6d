use std::path::Path;

use glam::{Vec2, Vec3};
use log::warn;

use super::texture::TextureArena;
use super::{Material, TriangleBatch, Vertex};
use crate::error::{Result, VctError};

/// Parsed but not yet converted Wavefront data.
#[derive(Debug, Clone)]
pub struct ObjData {
    pub models: Vec<tobj::Model>,
    pub materials: Vec<tobj::Material>,
}

/// Reads an OBJ file and its material library.
///
/// A broken or missing MTL file only produces a warning; the meshes then
/// fall back to the default material.
pub fn read_obj(path: &Path) -> Result<ObjData> {
    let (models, materials) =
        tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS).map_err(|err| VctError::asset(path, err))?;
    Ok(ObjData {
        models,
        materials: materials_or_warn(materials),
    })
}

/// Parses OBJ text from memory, resolving `mtllib` statements to `mtl`.
pub fn read_obj_from_str(obj: &str, mtl: Option<&str>) -> Result<ObjData> {
    let mut reader = obj.as_bytes();
    let (models, materials) =
        tobj::load_obj_buf(&mut reader, &tobj::GPU_LOAD_OPTIONS, |_| match mtl {
            Some(text) => {
                let mut bytes = text.as_bytes();
                tobj::load_mtl_buf(&mut bytes)
            }
            None => Err(tobj::LoadError::OpenFileFailed),
        })
        .map_err(|err| VctError::asset("<memory>", err))?;
    Ok(ObjData {
        models,
        materials: materials_or_warn(materials),
    })
}

fn materials_or_warn(
    materials: std::result::Result<Vec<tobj::Material>, tobj::LoadError>,
) -> Vec<tobj::Material> {
    materials.unwrap_or_else(|err| {
        warn!("Material library unavailable ({err}); using default materials");
        Vec::new()
    })
}

/// Converts parsed OBJ data into triangle batches and materials.
///
/// Textures referenced by the materials are decoded into `textures` and
/// resolved against `texture_dir`; any texture failure aborts the load.
pub fn convert(
    data: &ObjData,
    texture_dir: &Path,
    textures: &mut TextureArena,
    source: &Path,
) -> Result<(Vec<TriangleBatch>, Vec<Material>)> {
    let mut materials = data
        .materials
        .iter()
        .map(|raw| convert_material(raw, texture_dir, textures))
        .collect::<Result<Vec<_>>>()?;

    let mut default_material = None;
    let mut batches = Vec::with_capacity(data.models.len());
    for model in &data.models {
        let material = match model.mesh.material_id {
            Some(id) if id < materials.len() => id,
            _ => *default_material.get_or_insert_with(|| {
                materials.push(Material::default());
                materials.len() - 1
            }),
        };
        let vertices = build_vertices(&model.mesh).map_err(|message| {
            VctError::asset(source, format!("mesh {:?}: {message}", model.name))
        })?;
        if vertices.is_empty() {
            continue;
        }
        batches.push(TriangleBatch {
            name: model.name.clone(),
            material,
            vertices,
        });
    }
    Ok((batches, materials))
}

fn convert_material(
    raw: &tobj::Material,
    texture_dir: &Path,
    textures: &mut TextureArena,
) -> Result<Material> {
    let mut load = |name: Option<&String>| -> Result<_> {
        match name.map(|n| n.trim()).filter(|n| !n.is_empty()) {
            Some(name) => textures.load_or_get(texture_dir, name).map(Some),
            None => Ok(None),
        }
    };
    let normal_name = raw.normal_texture.as_ref().or_else(|| {
        ["map_bump", "map_Bump", "bump", "norm"]
            .iter()
            .find_map(|key| raw.unknown_param.get(*key))
    });

    Ok(Material {
        name: raw.name.clone(),
        kd: raw.diffuse.map(Vec3::from_array).unwrap_or(Vec3::ONE),
        ks: raw.specular.map(Vec3::from_array).unwrap_or(Vec3::ZERO),
        ke: raw
            .unknown_param
            .get("Ke")
            .and_then(|value| parse_vec3(value))
            .unwrap_or(Vec3::ZERO),
        shininess: raw.shininess.unwrap_or(1.0),
        diffuse_map: load(raw.diffuse_texture.as_ref())?,
        specular_map: load(raw.specular_texture.as_ref())?,
        normal_map: load(normal_name)?,
    })
}

fn parse_vec3(value: &str) -> Option<Vec3> {
    let mut numbers = value.split_whitespace().map(str::parse::<f32>);
    let x = numbers.next()?.ok()?;
    let y = numbers.next()?.ok()?;
    let z = numbers.next()?.ok()?;
    Some(Vec3::new(x, y, z))
}

/// Expands an indexed tobj mesh into three vertices per triangle.
fn build_vertices(mesh: &tobj::Mesh) -> std::result::Result<Vec<Vertex>, String> {
    let vertex_count = mesh.positions.len() / 3;
    let position = |i: usize| Vec3::from_slice(&mesh.positions[3 * i..3 * i + 3]);

    let normals: Vec<Vec3> = if mesh.normals.len() == mesh.positions.len() {
        mesh.normals.chunks_exact(3).map(Vec3::from_slice).collect()
    } else {
        compute_normals(mesh)?
    };
    let has_texcoords = mesh.texcoords.len() / 2 == vertex_count;

    let mut vertices = Vec::with_capacity(mesh.indices.len());
    for triangle in mesh.indices.chunks_exact(3) {
        for &index in triangle {
            let i = index as usize;
            if i >= vertex_count {
                return Err(format!("invalid vertex index {index}"));
            }
            let uv = if has_texcoords {
                Vec2::new(mesh.texcoords[2 * i], mesh.texcoords[2 * i + 1])
            } else {
                Vec2::ZERO
            };
            vertices.push(Vertex {
                position: position(i),
                normal: normals[i],
                uv,
                tangent_frame: None,
            });
        }
    }
    Ok(vertices)
}

/// Area-weighted smooth normals for meshes that ship without `vn` records.
fn compute_normals(mesh: &tobj::Mesh) -> std::result::Result<Vec<Vec3>, String> {
    let vertex_count = mesh.positions.len() / 3;
    let mut accum = vec![Vec3::ZERO; vertex_count];
    let position = |i: usize| Vec3::from_slice(&mesh.positions[3 * i..3 * i + 3]);

    for triangle in mesh.indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        if i0.max(i1).max(i2) >= vertex_count {
            return Err("invalid vertex index".to_string());
        }
        let normal = (position(i1) - position(i0)).cross(position(i2) - position(i0));
        accum[i0] += normal;
        accum[i1] += normal;
        accum[i2] += normal;
    }

    Ok(accum
        .into_iter()
        .map(|normal| normal.try_normalize().unwrap_or(Vec3::Y))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "
mtllib scene.mtl
v 0 0 0
v 1 0 0
v 1 0 1
v 0 0 1
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 1 0
usemtl floor
f 1/1/1 4/4/1 3/3/1 2/2/1
";

    const MTL: &str = "
newmtl floor
Kd 0.5 0.25 1.0
Ks 0.1 0.1 0.1
Ke 0.0 0.2 0.0
Ns 32
";

    #[test]
    fn converts_quad_into_two_triangles_with_material() {
        let data = read_obj_from_str(QUAD, Some(MTL)).unwrap();
        let mut textures = TextureArena::new();
        let (batches, materials) =
            convert(&data, Path::new("."), &mut textures, Path::new("quad.obj")).unwrap();

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].vertices.len(), 6);
        let material = &materials[batches[0].material];
        assert_eq!(material.kd, Vec3::new(0.5, 0.25, 1.0));
        assert_eq!(material.ke, Vec3::new(0.0, 0.2, 0.0));
        assert_eq!(material.shininess, 32.0);
        assert!(material.diffuse_map.is_none());
        for vertex in &batches[0].vertices {
            assert_eq!(vertex.normal, Vec3::Y);
        }
    }

    #[test]
    fn missing_mtl_falls_back_to_default_material() {
        let data = read_obj_from_str(QUAD, None).unwrap();
        let mut textures = TextureArena::new();
        let (batches, materials) =
            convert(&data, Path::new("."), &mut textures, Path::new("quad.obj")).unwrap();
        assert_eq!(materials.len(), 1);
        assert_eq!(materials[batches[0].material].kd, Vec3::ONE);
    }

    #[test]
    fn computes_missing_normals() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let data = read_obj_from_str(obj, None).unwrap();
        let mut textures = TextureArena::new();
        let (batches, _) =
            convert(&data, Path::new("."), &mut textures, Path::new("tri.obj")).unwrap();
        for vertex in &batches[0].vertices {
            assert!((vertex.normal - Vec3::Z).length() < 1e-5);
            assert_eq!(vertex.uv, Vec2::ZERO);
        }
    }

    #[test]
    fn missing_texture_is_fatal() {
        let mtl = "newmtl wall\nKd 1 1 1\nmap_Kd does_not_exist.png\n";
        let obj = "mtllib wall.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl wall\nf 1 2 3\n";
        let data = read_obj_from_str(obj, Some(mtl)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut textures = TextureArena::new();
        let result = convert(&data, dir.path(), &mut textures, Path::new("wall.obj"));
        assert!(matches!(result, Err(VctError::TextureDecode { .. })));
    }

    #[test]
    fn unreadable_file_is_an_asset_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_obj(&dir.path().join("nope.obj"));
        assert!(matches!(result, Err(VctError::AssetLoad { .. })));
    }
}
