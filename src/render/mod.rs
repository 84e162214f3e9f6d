//! Camera-facing stages: the visibility pass, per-pixel shading, and the
//! window presenter.

mod frame;
mod present;
mod surface;

pub use frame::{FrameBuffer, FrameRenderer, CLEAR_COLOR};
pub use present::Presenter;
pub use surface::VisibilityBuffer;
