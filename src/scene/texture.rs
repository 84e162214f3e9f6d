//! Texture storage: decoded images owned by an arena and referenced by handle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use glam::{Vec2, Vec4};
use image::{DynamicImage, RgbaImage};
use log::info;

use crate::error::{Result, VctError};

/// Stable reference to a texture inside a [`TextureArena`].
///
/// Handles carry the generation of their slot, so a handle that outlives a
/// [`TextureArena::release`] resolves to `None` instead of aliasing a newer
/// texture stored in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle {
    index: u32,
    generation: u32,
}

/// A decoded RGBA8 image, stored bottom row first to match OBJ texture coordinates.
#[derive(Debug, Clone)]
pub struct Texture {
    name: String,
    image: RgbaImage,
}

impl Texture {
    /// Wraps a decoded image. One, three and four channel images are accepted.
    pub fn from_image(name: impl Into<String>, image: DynamicImage) -> Result<Self> {
        let name = name.into();
        let channels = image.color().channel_count();
        if !matches!(channels, 1 | 3 | 4) {
            return Err(VctError::texture(
                name,
                format!("unsupported channel count {channels}"),
            ));
        }
        Ok(Self {
            name,
            image: image.flipv().to_rgba8(),
        })
    }

    /// Builds a texture from raw RGBA8 rows, bottom row first.
    pub fn from_rgba8(
        name: impl Into<String>,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    ) -> Result<Self> {
        let name = name.into();
        let image = RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            VctError::texture(name.clone(), "pixel buffer does not match dimensions")
        })?;
        Ok(Self { name, image })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Bilinear lookup with repeat wrapping; returns channels in `[0, 1]`.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let (width, height) = self.image.dimensions();
        if width == 0 || height == 0 {
            return Vec4::ONE;
        }
        let x = uv.x.rem_euclid(1.0) * width as f32 - 0.5;
        let y = uv.y.rem_euclid(1.0) * height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let texel = |tx: f32, ty: f32| {
            let px = (tx as i64).rem_euclid(width as i64) as u32;
            let py = (ty as i64).rem_euclid(height as i64) as u32;
            let [r, g, b, a] = self.image.get_pixel(px, py).0;
            Vec4::new(r as f32, g as f32, b as f32, a as f32) / 255.0
        };

        let top = texel(x0, y0).lerp(texel(x0 + 1.0, y0), fx);
        let bottom = texel(x0, y0 + 1.0).lerp(texel(x0 + 1.0, y0 + 1.0), fx);
        top.lerp(bottom, fy)
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    texture: Option<Texture>,
}

/// Owns every texture of a scene; materials hold [`TextureHandle`]s into it.
#[derive(Debug, Default)]
pub struct TextureArena {
    slots: Vec<Slot>,
    by_name: HashMap<String, TextureHandle>,
}

impl TextureArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle of an already loaded texture or decodes it from `dir`.
    pub fn load_or_get(&mut self, dir: &Path, name: &str) -> Result<TextureHandle> {
        if let Some(handle) = self.by_name.get(name) {
            if self.get(*handle).is_some() {
                return Ok(*handle);
            }
        }
        let path = texture_path(dir, name);
        let image = image::open(&path)
            .map_err(|err| VctError::texture(name, format!("{}: {err}", path.display())))?;
        info!(
            "Loaded texture: {name}, w = {}, h = {}, comp = {}",
            image.width(),
            image.height(),
            image.color().channel_count()
        );
        let handle = self.insert(Texture::from_image(name, image)?);
        self.by_name.insert(name.to_string(), handle);
        Ok(handle)
    }

    pub fn insert(&mut self, texture: Texture) -> TextureHandle {
        if let Some(index) = self.slots.iter().position(|slot| slot.texture.is_none()) {
            let slot = &mut self.slots[index];
            slot.texture = Some(texture);
            return TextureHandle {
                index: index as u32,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            texture: Some(texture),
        });
        TextureHandle {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&Texture> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.texture.as_ref())
    }

    /// Drops a texture; every outstanding handle to it becomes stale.
    pub fn release(&mut self, handle: TextureHandle) -> Option<Texture> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let texture = slot.texture.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.by_name.retain(|_, h| *h != handle);
        Some(texture)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.texture.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// MTL files written on Windows use backslash separators.
fn texture_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name.replace('\\', "/"))
}
