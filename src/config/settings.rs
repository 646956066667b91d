//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::path::PathBuf;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::bundle::{supported_formats, BundleFormat};
use crate::error::ConfigError;

/// Camera sides accepted by `kicad-cli pcb render`.
pub const RENDER_SIDES: [&str; 6] = ["top", "bottom", "left", "right", "front", "back"];

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// KiCad tool locations.
    #[serde(default)]
    pub kicad: KicadConfig,

    /// Output selection and packaging.
    #[serde(default)]
    pub outputs: OutputsConfig,

    /// Turntable animation settings.
    #[serde(default)]
    pub animation: AnimationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if BundleFormat::from_name(&self.outputs.bundle_format).is_none() {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid bundle format '{}'. Must be one of: {}",
                    self.outputs.bundle_format,
                    supported_formats().join(", ")
                ),
            });
        }

        let animation = &self.animation;
        if animation.framerate == 0 {
            return Err(ConfigError::ValidationError {
                message: "Animation framerate must be at least 1".to_string(),
            });
        }
        if animation.frames == 0 {
            return Err(ConfigError::ValidationError {
                message: "Animation frame count must be at least 1".to_string(),
            });
        }
        if animation.width == 0 || animation.height == 0 {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid render size {}x{}",
                    animation.width, animation.height
                ),
            });
        }
        if !RENDER_SIDES.contains(&animation.side.as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid render side '{}'. Must be one of: {}",
                    animation.side,
                    RENDER_SIDES.join(", ")
                ),
            });
        }
        Ok(())
    }
}

/// Locations of KiCad executables and plugins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KicadConfig {
    /// Path to `kicad-cli`. Located automatically when absent.
    #[serde(default)]
    pub cli_path: Option<PathBuf>,

    /// Python interpreter bundled with KiCad (for the interactive BOM).
    #[serde(default)]
    pub python_path: Option<PathBuf>,

    /// Path to `generate_interactive_bom.py`. The interactive BOM is
    /// skipped when absent.
    #[serde(default)]
    pub ibom_script: Option<PathBuf>,
}

bitflags! {
    /// Deliverables produced by a build.
    ///
    /// Serialised as a `|`-separated list, e.g. `"SCHEMATIC | BOM | GERBERS"`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Deliverables: u32 {
        /// Schematic PDF (with assembly drawings when merging is possible).
        const SCHEMATIC = 1 << 0;
        /// Grouped BOM table.
        const BOM = 1 << 1;
        /// Interactive HTML BOM.
        const IBOM = 1 << 2;
        /// Gerber plots.
        const GERBERS = 1 << 3;
        /// Drill files and map.
        const DRILL = 1 << 4;
        /// Pick-and-place position file.
        const POSITION = 1 << 5;
        /// Cropped board render.
        const RENDER = 1 << 6;
        /// Turntable GIF.
        const ANIMATION = 1 << 7;
        /// STEP model.
        const STEP = 1 << 8;
        /// Release archive of everything else.
        const BUNDLE = 1 << 9;
    }
}

impl Default for Deliverables {
    fn default() -> Self {
        Self::all()
    }
}

/// Output selection and packaging.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputsConfig {
    /// Directory the deliverables are written to. Recreated on every build.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Release archive format: "zip" or "tar.gz".
    #[serde(default = "default_bundle_format")]
    pub bundle_format: String,

    /// Deliverables to produce.
    #[serde(default)]
    pub deliverables: Deliverables,

    /// Merge the schematic and assembly drawings into one PDF.
    #[serde(default = "default_true")]
    pub merge_pdfs: bool,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            bundle_format: default_bundle_format(),
            deliverables: Deliverables::default(),
            merge_pdfs: default_true(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_bundle_format() -> String {
    "zip".to_string()
}

const fn default_true() -> bool {
    true
}

/// Turntable animation and board render settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnimationConfig {
    /// Number of frames in one full rotation.
    #[serde(default = "default_frames")]
    pub frames: u32,

    /// Playback rate in frames per second.
    #[serde(default = "default_framerate")]
    pub framerate: u32,

    /// Render width in pixels (before cropping).
    #[serde(default = "default_width")]
    pub width: u32,

    /// Render height in pixels (before cropping).
    #[serde(default = "default_height")]
    pub height: u32,

    /// Camera side.
    #[serde(default = "default_side")]
    pub side: String,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            frames: default_frames(),
            framerate: default_framerate(),
            width: default_width(),
            height: default_height(),
            side: default_side(),
        }
    }
}

const fn default_frames() -> u32 {
    36
}

const fn default_framerate() -> u32 {
    10
}

const fn default_width() -> u32 {
    1600
}

const fn default_height() -> u32 {
    900
}

fn default_side() -> String {
    "top".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.outputs.deliverables, Deliverables::all());
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "kicad": {
                "cli_path": "/opt/kicad/bin/kicad-cli",
                "python_path": "/opt/kicad/bin/python3",
                "ibom_script": "/plugins/ibom/generate_interactive_bom.py"
            },
            "outputs": {
                "output_dir": "release",
                "bundle_format": "tar.gz",
                "deliverables": "SCHEMATIC | BOM | GERBERS",
                "merge_pdfs": false
            },
            "animation": {
                "frames": 24,
                "framerate": 12,
                "width": 800,
                "height": 600,
                "side": "front"
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.kicad.cli_path,
            Some(PathBuf::from("/opt/kicad/bin/kicad-cli"))
        );
        assert_eq!(config.outputs.output_dir, PathBuf::from("release"));
        assert_eq!(config.outputs.bundle_format, "tar.gz");
        assert_eq!(
            config.outputs.deliverables,
            Deliverables::SCHEMATIC | Deliverables::BOM | Deliverables::GERBERS
        );
        assert!(!config.outputs.merge_pdfs);
        assert_eq!(config.animation.frames, 24);
        assert_eq!(config.animation.framerate, 12);
        assert_eq!(config.animation.side, "front");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn outputs_config_defaults() {
        let config = OutputsConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("outputs"));
        assert_eq!(config.bundle_format, "zip");
        assert!(config.merge_pdfs);
    }

    #[test]
    fn animation_config_defaults() {
        let config = AnimationConfig::default();
        assert_eq!(config.frames, 36);
        assert_eq!(config.framerate, 10);
        assert_eq!((config.width, config.height), (1600, 900));
        assert_eq!(config.side, "top");
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_unknown_bundle_format() {
        let json = r#"{ "outputs": { "bundle_format": "rar" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_zero_framerate() {
        let json = r#"{ "animation": { "framerate": 0 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_invalid_side() {
        let json = r#"{ "animation": { "side": "diagonal" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
