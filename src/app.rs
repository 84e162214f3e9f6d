use std::path::Path;
use std::time::Instant;

use log::info;

use crate::camera::{Camera, Movement};
use crate::config::{KeyBindings, VctConfig};
use crate::error::Result;
use crate::input::FrameInput;
use crate::lighting::Light;
use crate::scene::{Scene, WorldMapping};
use crate::shadow::ShadowMap;
use crate::voxel::{voxelize, VoxelGrid};

/// Upper bound on a single frame's delta so a stall does not teleport the camera.
const MAX_FRAME_DELTA: f32 = 0.25;

/// Everything the per-frame loop reads. Built once, never mutated.
#[derive(Debug)]
pub struct PreparedScene {
    pub config: VctConfig,
    pub scene: Scene,
    pub light: Light,
    pub shadow: ShadowMap,
    pub grid: VoxelGrid,
    pub mapping: WorldMapping,
}

/// The one-shot stages that run before the first frame.
pub struct Pipeline;

impl Pipeline {
    /// Loads `geometry`, renders the shadow map, and voxelizes the lit scene.
    pub fn prepare(
        config: &VctConfig,
        geometry: &Path,
        texture_dir: &Path,
    ) -> Result<PreparedScene> {
        config.validate()?;
        let started = Instant::now();
        let scene = Scene::load(geometry, texture_dir)?;
        info!("Loaded {} in {:.2?}", geometry.display(), started.elapsed());
        Self::prepare_scene(config, scene)
    }

    /// Runs the shadow and voxelization stages on an already loaded scene.
    pub fn prepare_scene(config: &VctConfig, scene: Scene) -> Result<PreparedScene> {
        config.validate()?;
        let dim = config.voxel_dim()?;
        let mapping = scene.world_mapping();
        let light = Light::from(&config.light);

        let started = Instant::now();
        let shadow = ShadowMap::render(&light, &scene, &config.shadow);
        info!("Shadow stage finished in {:.2?}", started.elapsed());

        let started = Instant::now();
        let grid = voxelize(&scene, &shadow, mapping, &light, dim);
        info!("Voxelization stage finished in {:.2?}", started.elapsed());

        Ok(PreparedScene {
            config: config.clone(),
            scene,
            light,
            shadow,
            grid,
            mapping,
        })
    }
}

/// Measures the time between frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    last: Instant,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Seconds since the previous tick, capped at [`MAX_FRAME_DELTA`].
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let delta = now.duration_since(self.last).as_secs_f32();
        self.last = now;
        delta.min(MAX_FRAME_DELTA)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    Continue,
    Quit,
}

/// Mutable per-session state: the camera and how input drives it.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub camera: Camera,
    pub clock: FrameClock,
    pub bindings: KeyBindings,
}

impl AppContext {
    pub fn new(config: &VctConfig) -> Result<Self> {
        Ok(Self {
            camera: Camera::from(&config.camera),
            clock: FrameClock::new(),
            bindings: config.keys.bindings()?,
        })
    }

    /// Applies one frame of input to the camera.
    pub fn process_input(&mut self, input: &FrameInput, dt: f32) -> FrameAction {
        if input.close_requested || input.is_held(self.bindings.quit) {
            return FrameAction::Quit;
        }

        let moves = [
            (self.bindings.forward, Movement::Forward),
            (self.bindings.backward, Movement::Backward),
            (self.bindings.left, Movement::Left),
            (self.bindings.right, Movement::Right),
            (self.bindings.up, Movement::Up),
            (self.bindings.down, Movement::Down),
        ];
        for (key, movement) in moves {
            if input.is_held(key) {
                self.camera.process_movement(movement, dt);
            }
        }

        if input.pointer_delta != glam::Vec2::ZERO {
            self.camera
                .process_pointer(input.pointer_delta.x, input.pointer_delta.y);
        }
        if input.scroll != 0.0 {
            self.camera.process_scroll(input.scroll);
        }
        FrameAction::Continue
    }
}
