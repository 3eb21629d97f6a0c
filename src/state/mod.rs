//! State management module
//!
//! This module holds everything that is plain data rather than processing:
//! - Shared data structures (data.rs)
//! - Edit parameters and non-destructive editing (edit.rs)
//! - Persistent edit storage (store.rs)

pub mod data;
pub mod edit;
pub mod store;

pub use data::{CameraMetadata, ImageBuffer};
pub use edit::{Adjustment, AdjustmentParameters, OutputMode};
pub use store::EditStore;
