//! Cone tracing through the voxel pyramid.
//!
//! [`ConeSet`] is built once from the configuration, [`ConeTracer`] marches
//! a single cone, and [`FrameShader`] combines direct light with the traced
//! diffuse and specular cones for one camera pixel.

mod cones;
mod march;
mod shade;

pub use cones::{specular_aperture, Cone, ConeSet};
pub use march::{mip_level, ConeResult, ConeTermination, ConeTracer, MAX_STEPS, SATURATION};
pub use shade::{FrameShader, SurfacePoint, SurfaceSample};
