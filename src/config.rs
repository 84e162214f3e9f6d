//! Renderer configuration: voxel grid, light, window, shadow, cone and camera settings.
//!
//! Every section has defaults, so an empty TOML file (or no file at all) is
//! a valid configuration. [`VctConfig::validate`] is the single place where
//! invalid combinations are rejected before any stage runs.

use std::fs;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VctError};
use crate::input::KeyCode;
use crate::voxel::VoxelDim;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VctConfig {
    pub voxel: VoxelConfig,
    pub light: LightConfig,
    pub window: WindowConfig,
    pub shadow: ShadowConfig,
    pub cones: ConeConfig,
    pub camera: CameraConfig,
    pub keys: KeyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelConfig {
    /// Side length of the voxel cube; must be a power of two.
    pub dim: u32,
}

impl Default for VoxelConfig {
    fn default() -> Self {
        Self { dim: 128 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub position: Vec3,
    pub color: Vec3,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(200.0, 2000.0, 350.0),
            color: Vec3::ONE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    /// Internal shading resolution relative to the window size.
    pub render_scale: f32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            render_scale: 0.5,
        }
    }
}

impl WindowConfig {
    /// Size of the image the shading stage produces each frame.
    pub fn render_size(&self) -> (u32, u32) {
        self.scaled(self.width, self.height)
    }

    /// Applies `render_scale` to an actual window size.
    pub fn scaled(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = |v: u32| ((v as f32 * self.render_scale).round() as u32).max(1);
        (scale(width), scale(height))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub resolution: u32,
    /// Minimum depth bias as a fraction of the scene size.
    pub bias_min: f32,
    /// Bias added at grazing angles as a fraction of the scene size.
    pub bias_slope: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            resolution: 2048,
            bias_min: 0.0005,
            bias_slope: 0.005,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConeConfig {
    /// Number of diffuse cones distributed over the hemisphere.
    pub diffuse_count: u32,
    /// Diffuse cone half-angle in radians; derived from the count when unset.
    pub diffuse_aperture: Option<f32>,
    /// Offset along the normal before marching, in level-0 voxels.
    pub surface_offset: f32,
    /// First sample distance along the cone, in level-0 voxels.
    pub start_distance: f32,
    pub step_multiplier: f32,
    /// Longest march in normalized cube units (the cube is 2 units wide).
    pub max_distance: f32,
    pub specular_min_aperture: f32,
    pub specular_max_aperture: f32,
}

impl Default for ConeConfig {
    fn default() -> Self {
        Self {
            diffuse_count: 6,
            diffuse_aperture: None,
            surface_offset: 1.5,
            start_distance: 1.0,
            step_multiplier: 1.0,
            max_distance: 2.0 * 3f32.sqrt(),
            specular_min_aperture: 0.02,
            specular_max_aperture: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: Vec3,
    /// Degrees; -90 looks down -Z.
    pub yaw: f32,
    pub pitch: f32,
    /// Vertical field of view in degrees.
    pub zoom: f32,
    /// World units per second.
    pub speed: f32,
    pub sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(100.0, 100.0, 100.0),
            yaw: -90.0,
            pitch: 0.0,
            zoom: 45.0,
            speed: 250.0,
            sensitivity: 0.1,
        }
    }
}

/// Key names as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub forward: String,
    pub backward: String,
    pub left: String,
    pub right: String,
    pub up: String,
    pub down: String,
    pub quit: String,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            forward: "W".into(),
            backward: "S".into(),
            left: "A".into(),
            right: "D".into(),
            up: "Up".into(),
            down: "Down".into(),
            quit: "Escape".into(),
        }
    }
}

/// Parsed key bindings used by the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBindings {
    pub forward: KeyCode,
    pub backward: KeyCode,
    pub left: KeyCode,
    pub right: KeyCode,
    pub up: KeyCode,
    pub down: KeyCode,
    pub quit: KeyCode,
}

impl KeyConfig {
    pub fn bindings(&self) -> Result<KeyBindings> {
        let parse = |action: &str, name: &str| {
            KeyCode::from_name(name)
                .ok_or_else(|| VctError::config(format!("unknown key {name:?} bound to {action}")))
        };
        Ok(KeyBindings {
            forward: parse("forward", &self.forward)?,
            backward: parse("backward", &self.backward)?,
            left: parse("left", &self.left)?,
            right: parse("right", &self.right)?,
            up: parse("up", &self.up)?,
            down: parse("down", &self.down)?,
            quit: parse("quit", &self.quit)?,
        })
    }
}

impl VctConfig {
    /// Reads a TOML configuration file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| {
            VctError::config(format!("unable to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| VctError::config(format!("invalid config: {err}")))
    }

    pub fn voxel_dim(&self) -> Result<VoxelDim> {
        VoxelDim::new(self.voxel.dim)
    }

    /// Checks every invariant the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        self.voxel_dim()?;
        if self.shadow.resolution == 0 || self.shadow.resolution > 16_384 {
            return Err(VctError::config(format!(
                "shadow resolution {} must be in 1..=16384",
                self.shadow.resolution
            )));
        }
        if self.shadow.bias_min < 0.0 || self.shadow.bias_slope < 0.0 {
            return Err(VctError::config("shadow bias must not be negative"));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(VctError::config("window size must be non-zero"));
        }
        if !(self.window.render_scale > 0.0 && self.window.render_scale <= 4.0) {
            return Err(VctError::config(format!(
                "render scale {} must be in (0, 4]",
                self.window.render_scale
            )));
        }
        let cones = &self.cones;
        if cones.diffuse_count == 0 || cones.diffuse_count > 64 {
            return Err(VctError::config(format!(
                "diffuse cone count {} must be in 1..=64",
                cones.diffuse_count
            )));
        }
        if let Some(aperture) = cones.diffuse_aperture {
            if !(aperture > 0.0 && aperture < std::f32::consts::FRAC_PI_2) {
                return Err(VctError::config("diffuse aperture must be in (0, pi/2)"));
            }
        }
        if !(cones.step_multiplier > 0.0) || !(cones.max_distance > 0.0) {
            return Err(VctError::config(
                "cone step multiplier and max distance must be positive",
            ));
        }
        if !(cones.specular_min_aperture > 0.0
            && cones.specular_min_aperture <= cones.specular_max_aperture
            && cones.specular_max_aperture < std::f32::consts::FRAC_PI_2)
        {
            return Err(VctError::config(
                "specular apertures must satisfy 0 < min <= max < pi/2",
            ));
        }
        self.keys.bindings()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = VctConfig::from_toml_str("").unwrap();
        assert_eq!(config, VctConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = VctConfig::from_toml_str(
            r#"
            [voxel]
            dim = 64

            [light]
            position = [0.0, 10.0, 0.0]

            [keys]
            quit = "Q"
            "#,
        )
        .unwrap();
        assert_eq!(config.voxel.dim, 64);
        assert_eq!(config.light.position, Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(config.light.color, Vec3::ONE);
        assert_eq!(config.keys.bindings().unwrap().quit, KeyCode::Character('Q'));
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn rejects_bad_voxel_dimensions() {
        for dim in [0, 3, 100, 1024] {
            let mut config = VctConfig::default();
            config.voxel.dim = dim;
            assert!(
                matches!(config.validate(), Err(VctError::Configuration(_))),
                "dim {dim} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_unknown_key_names() {
        let mut config = VctConfig::default();
        config.keys.forward = "Banana".into();
        assert!(matches!(config.validate(), Err(VctError::Configuration(_))));
    }

    #[test]
    fn malformed_toml_is_a_configuration_error() {
        assert!(matches!(
            VctConfig::from_toml_str("[voxel\ndim = 4"),
            Err(VctError::Configuration(_))
        ));
    }

    #[test]
    fn render_size_never_collapses_to_zero() {
        let window = WindowConfig {
            width: 3,
            height: 1,
            render_scale: 0.1,
        };
        assert_eq!(window.render_size(), (1, 1));
    }
}
