//! Pipeline configuration
//!
//! Stored as JSON in `<config_dir>/raw-pipeline/pipeline.json`. Every field
//! has a default, so a partial (or missing) file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

const APP_DIR: &str = "raw-pipeline";
const CONFIG_FILE: &str = "pipeline.json";

/// Which rendering backend to bring up
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// wgpu, falling back to the CPU renderer
    #[default]
    Auto,
    /// wgpu only
    Gpu,
    /// rayon renderer, no GPU needed
    Cpu,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    #[default]
    HighPerformance,
    LowPower,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    pub backend: BackendPreference,
    pub power_preference: PowerPreference,
    /// Ask wgpu for its software adapter
    pub force_fallback_adapter: bool,
    /// Capture the neutral reference right after every upload
    pub capture_reference_on_upload: bool,
    /// Compute tile edge, clamped to 1..=32 when the program is built
    pub workgroup_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            power_preference: PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            capture_reference_on_upload: true,
            workgroup_size: 16,
        }
    }
}

impl PipelineConfig {
    /// Default location of the config file, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location; defaults when there is no file
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(path),
            None => {
                log::warn!("no config directory on this platform, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("{} not found, using default config", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PipelineError::Config(format!("{}: {}", parent.display(), e)))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::load_from(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert!(config.capture_reference_on_upload);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pipeline.json");
        let config = PipelineConfig {
            backend: BackendPreference::Cpu,
            power_preference: PowerPreference::LowPower,
            workgroup_size: 8,
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(PipelineConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{ "backend": "gpu" }"#).unwrap();

        let config = PipelineConfig::load_from(&path).unwrap();
        assert_eq!(config.backend, BackendPreference::Gpu);
        assert_eq!(config.workgroup_size, 16);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, "{ backend: ").unwrap();
        assert!(matches!(
            PipelineConfig::load_from(&path),
            Err(PipelineError::Config(_))
        ));
    }
}
