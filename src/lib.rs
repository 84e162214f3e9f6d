//! CPU voxel cone tracing renderer.
//!
//! A static OBJ scene is lit once from a point light through a shadow map,
//! voxelized into a mip-mapped radiance grid, and then shaded every frame by
//! marching cones through that grid for indirect diffuse and specular light.
//! All stages are data parallel on the rayon pool; the finished frame is
//! handed to a small wgpu presenter or inspected headlessly.

pub mod app;
pub mod camera;
pub mod config;
pub mod error;
pub mod input;
pub mod lighting;
pub mod raster;
pub mod render;
pub mod scene;
pub mod shadow;
pub mod trace;
pub mod voxel;

pub use app::{AppContext, FrameAction, FrameClock, Pipeline, PreparedScene};
pub use camera::{Camera, Movement};
pub use config::{KeyBindings, VctConfig};
pub use error::{Result, VctError};
pub use input::{FrameInput, InputState, KeyCode, NamedKey};
pub use lighting::Light;
pub use render::{FrameBuffer, FrameRenderer, Presenter};
pub use scene::{Material, Scene, TriangleBatch};
pub use shadow::ShadowMap;
pub use voxel::{VoxelDim, VoxelGrid};
