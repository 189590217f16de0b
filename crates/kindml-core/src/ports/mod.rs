//! Port definitions for hexagonal architecture.
//!
//! These traits are the seams to collaborators kindml never implements
//! itself: the ML runtime, live frame sources and an optional renderer.

mod drawing;
mod frame_provider;
mod runtime;

pub use drawing::DrawingSink;
pub use frame_provider::FrameProvider;
pub use runtime::ModelRuntime;
