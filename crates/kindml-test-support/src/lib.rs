//! Test support utilities for kindml.
//!
//! Provides mocks of every port and synthetic media builders for testing
//! model wrappers without a real ML runtime.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use kindml_test_support::{MediaBuilder, MockRuntime};
//!
//! // A runtime that takes a while to load and leaks nothing
//! let runtime = Arc::new(MockRuntime::new().with_load_delay(Duration::from_millis(10)));
//!
//! // Media in each flavor
//! let still = MediaBuilder::still(64, 48);
//! let (video, first_frame) = MediaBuilder::pending_video(64, 48);
//! first_frame.notify();
//! assert!(video.is_ready());
//! ```

mod builders;
mod mocks;

pub use builders::{MaskBuilder, MediaBuilder};
pub use mocks::{MockDrawingSink, MockFrameProvider, MockHandle, MockRuntime, RecordedPredict};
