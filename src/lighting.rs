use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::config::LightConfig;

/// The single point light of the scene, constant for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub position: Vec3,
    pub color: Vec3,
}

impl Default for Light {
    fn default() -> Self {
        Self::from(&LightConfig::default())
    }
}

impl From<&LightConfig> for Light {
    fn from(config: &LightConfig) -> Self {
        Self {
            position: config.position,
            color: config.color,
        }
    }
}

impl Light {
    /// Unit vector from `point` towards the light, zero if they coincide.
    pub fn direction_from(&self, point: Vec3) -> Vec3 {
        (self.position - point).normalize_or_zero()
    }
}

/// Outgoing direct radiance `kd·max(0, N·L)·visibility·light + ke`.
///
/// Used both when voxels are lit and when camera pixels are shaded, so the
/// two stages agree on what "directly lit" means.
pub fn direct_radiance(
    kd: Vec3,
    ke: Vec3,
    normal: Vec3,
    to_light: Vec3,
    visibility: f32,
    light_color: Vec3,
) -> Vec3 {
    let n_dot_l = normal.dot(to_light).max(0.0);
    kd * n_dot_l * visibility.clamp(0.0, 1.0) * light_color + ke
}
