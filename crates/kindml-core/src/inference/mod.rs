//! Model instances and result normalization.
//!
//! A [`Model`] drives the runtime port through its lifecycle
//! (`Uninitialized → Loading → Ready ⇄ Predicting`, with `Error` on a failed
//! load) and hands every raw prediction to a [`ResultAdapter`].

mod adapter;
mod model;

pub use adapter::{mask_to_image, ResultAdapter};
pub use model::{Model, ModelBuilder};
