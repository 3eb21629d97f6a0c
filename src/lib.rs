//! Non-destructive color pipeline for RAW photographs
//!
//! A decoded linear RGB16 image is re-rendered under a set of adjustment
//! parameters and one of four output transforms (SDR, HDR PQ, HDR HLG and a
//! filmic ACES-style mode). [`PipelineController`] is the entry point:
//!
//! ```no_run
//! # async fn run() -> raw_pipeline::Result<()> {
//! use raw_pipeline::{PipelineConfig, PipelineController};
//!
//! let decoded = raw_pipeline::raw::load_raw("photo.nef".into()).await?;
//! let mut pipeline = PipelineController::new(PipelineConfig::load()?);
//! pipeline.initialize().await?;
//! pipeline.upload_image(decoded.buffer)?;
//! pipeline.parameters_mut().set_exposure(0.5);
//! pipeline.process()?;
//! raw_pipeline::export::save(&pipeline.download()?, "photo.tiff")?;
//! # Ok(())
//! # }
//! ```

pub mod color;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod gpu;
pub mod raw;
pub mod state;
pub mod transform;

pub use config::{BackendPreference, PipelineConfig, PowerPreference};
pub use controller::{PipelineController, PipelineState};
pub use error::{ErrorKind, PipelineError, Result};
pub use gpu::{DisplayTarget, SurfaceHandle};
pub use state::{Adjustment, AdjustmentParameters, CameraMetadata, EditStore, ImageBuffer, OutputMode};
