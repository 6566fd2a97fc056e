//! Application Configuration
//!
//! User settings and preferences stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::StabilityConfig;
use crate::vision::Accelerator;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// OCR engine settings
    pub engine: EngineSettings,
    /// Live frame stability settings
    pub stability: StabilitySettings,
    /// Gallery storage settings
    pub gallery: GallerySettings,
    /// Background processing settings
    pub processing: ProcessingSettings,
}

/// OCR engine settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Preferred accelerator. Rewritten when the engine falls back.
    pub accelerator: Accelerator,
}

/// Frame stability gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilitySettings {
    /// Maximum fingerprint difference between consecutive frames
    pub threshold: u64,
    /// In-threshold frames required before a frame is sent to OCR
    pub min_stable_frames: u32,
    /// Downsample grid size used for fingerprinting
    pub grid_size: u32,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        let gate = StabilityConfig::default();
        Self {
            threshold: gate.threshold,
            min_stable_frames: gate.min_stable_frames,
            grid_size: gate.grid_size,
        }
    }
}

impl StabilitySettings {
    /// Convert to the gate's runtime configuration
    pub fn to_gate_config(&self) -> StabilityConfig {
        StabilityConfig {
            threshold: self.threshold,
            min_stable_frames: self.min_stable_frames.max(1),
            grid_size: self.grid_size.max(1),
        }
    }
}

/// Gallery storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GallerySettings {
    /// Gallery directory, or the platform data directory when unset
    pub directory: Option<PathBuf>,
    /// JPEG quality for saved captures (1 - 100)
    pub jpeg_quality: u8,
}

impl Default for GallerySettings {
    fn default() -> Self {
        Self {
            directory: None,
            jpeg_quality: 95,
        }
    }
}

/// Background processing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// How long the CLI waits for the queue to drain
    pub wait_timeout_secs: u64,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 120,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.engine.accelerator, Accelerator::Gpu);

        assert_eq!(config.stability.threshold, 3000);
        assert_eq!(config.stability.min_stable_frames, 1);
        assert_eq!(config.stability.grid_size, 8);

        assert!(config.gallery.directory.is_none());
        assert_eq!(config.gallery.jpeg_quality, 95);

        assert_eq!(config.processing.wait_timeout_secs, 120);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.engine.accelerator, parsed.engine.accelerator);
        assert_eq!(config.stability.threshold, parsed.stability.threshold);
        assert_eq!(config.gallery.jpeg_quality, parsed.gallery.jpeg_quality);
    }

    #[test]
    fn test_config_with_custom_values() {
        let mut config = AppConfig::default();
        config.engine.accelerator = Accelerator::Cpu;
        config.gallery.directory = Some(PathBuf::from("/srv/gallery"));
        config.stability.threshold = 1500;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("accelerator = \"cpu\""));
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.engine.accelerator, Accelerator::Cpu);
        assert_eq!(parsed.gallery.directory, Some(PathBuf::from("/srv/gallery")));
        assert_eq!(parsed.stability.threshold, 1500);
    }

    #[test]
    fn test_gate_config_clamps_zero() {
        let settings = StabilitySettings {
            threshold: 10,
            min_stable_frames: 0,
            grid_size: 0,
        };
        let gate = settings.to_gate_config();
        assert_eq!(gate.min_stable_frames, 1);
        assert_eq!(gate.grid_size, 1);
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();
        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(config.engine.accelerator, loaded.engine.accelerator);
        assert_eq!(config.stability.grid_size, loaded.stability.grid_size);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
