//! Error types for the color pipeline
//!
//! Every fallible operation in the crate returns [`Result`]. The variants are
//! detailed enough to log, and [`PipelineError::kind`] folds them back into
//! the three failure classes the controller reports to callers.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Coarse failure classes reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rendering backend, program compilation or surface allocation failed
    BackendInitializationFailure,
    /// The caller handed us something unusable (e.g. a zero-sized image)
    InvalidInput,
    /// An operation was requested before the pipeline could serve it
    NotReady,
    /// A collaborator (decoder, storage, export, config file) failed
    Io,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("rendering backend unavailable: {0}")]
    BackendInitialization(String),

    #[error("transform program failed to compile: {0}")]
    ProgramCompilation(String),

    #[error("failed to allocate {width}x{height} surface: {reason}")]
    SurfaceAllocation {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("pipeline not ready: {0}")]
    NotReady(&'static str),

    #[error("surface read-back failed: {0}")]
    Readback(String),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("edit storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("edit parameters could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("export failed: {0}")]
    Export(#[from] image::ImageError),
}

impl PipelineError {
    /// Map a detailed error onto the failure class callers act on
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BackendInitialization(_)
            | Self::ProgramCompilation(_)
            | Self::SurfaceAllocation { .. } => ErrorKind::BackendInitializationFailure,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotReady(_) => ErrorKind::NotReady,
            Self::Readback(_)
            | Self::Decode(_)
            | Self::Storage(_)
            | Self::Serialization(_)
            | Self::Config(_)
            | Self::Export(_) => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = PipelineError::SurfaceAllocation {
            width: 10,
            height: 10,
            reason: "out of memory".into(),
        };
        assert_eq!(err.kind(), ErrorKind::BackendInitializationFailure);
        assert_eq!(
            PipelineError::NotReady("no image uploaded").kind(),
            ErrorKind::NotReady
        );
        assert_eq!(
            PipelineError::InvalidInput("zero width".into()).kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_display_includes_dimensions() {
        let err = PipelineError::SurfaceAllocation {
            width: 640,
            height: 480,
            reason: "too large".into(),
        };
        assert_eq!(err.to_string(), "failed to allocate 640x480 surface: too large");
    }
}
