//! Scoped ownership of transient inference resources.

mod scope;
mod tensor;

pub use scope::ResourceScope;
pub use tensor::{ResourcePool, Tensor};
