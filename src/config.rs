use crate::barcode::{BarcodeFormat, LensFacing, Resolution};
use crate::geometry::Size;
use crate::stabilizer::{EmitPolicy, DEFAULT_VOTE_THRESHOLD};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct ScannerConfig {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub stabilizer: StabilizerConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

/// Defaults applied when a start-scan request leaves a field out
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScanConfig {
    /// Formats to detect; empty means all formats
    #[serde(default)]
    pub formats: Vec<BarcodeFormat>,

    #[serde(default)]
    pub lens_facing: LensFacing,

    /// Target analysis resolution
    #[serde(default)]
    pub resolution: Resolution,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StabilizerConfig {
    /// Votes a raw value needs before it is emitted
    #[serde(default = "default_vote_threshold")]
    pub vote_threshold: u32,

    #[serde(default)]
    pub emit_policy: EmitPolicy,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct DisplayConfig {
    /// Screen size (width, height) used when the platform reports none
    #[serde(default)]
    pub screen_size: Option<(u32, u32)>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity (number of events to buffer)
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Log every published event at debug level
    #[serde(default)]
    pub debug_events: bool,

    /// Session controller mailbox depth
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            formats: Vec::new(),
            lens_facing: LensFacing::default(),
            resolution: Resolution::default(),
        }
    }
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            vote_threshold: default_vote_threshold(),
            emit_policy: EmitPolicy::default(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
            debug_events: false,
            command_capacity: default_command_capacity(),
        }
    }
}

impl ScannerConfig {
    /// Load configuration from a specific file, then apply `CODESCAN_*`
    /// environment overrides (`CODESCAN_STABILIZER__VOTE_THRESHOLD=5`).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("scan.formats", Vec::<String>::new())?
            .set_default("scan.lens_facing", LensFacing::default().to_string())?
            .set_default("scan.resolution", default_resolution_name())?
            .set_default("stabilizer.vote_threshold", default_vote_threshold() as i64)?
            .set_default("stabilizer.emit_policy", "every_frame")?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("system.debug_events", false)?
            .set_default("system.command_capacity", default_command_capacity() as i64)?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(
                Environment::with_prefix("CODESCAN")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: ScannerConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stabilizer.vote_threshold == 0 {
            return Err(ConfigError::Message(
                "Stabilizer vote_threshold must be greater than 0".to_string(),
            ));
        }

        if let Some((width, height)) = self.display.screen_size {
            if width == 0 || height == 0 {
                return Err(ConfigError::Message(
                    "Display screen_size must be greater than 0".to_string(),
                ));
            }
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.command_capacity == 0 {
            return Err(ConfigError::Message(
                "Command capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn screen_size(&self) -> Option<Size> {
        self.display.screen_size.map(Size::from)
    }
}

fn default_resolution_name() -> String {
    let (width, height) = Resolution::default().dimensions();
    format!("{}x{}", width, height)
}
fn default_vote_threshold() -> u32 {
    DEFAULT_VOTE_THRESHOLD
}
fn default_event_bus_capacity() -> usize {
    64
}
fn default_command_capacity() -> usize {
    32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ScannerConfig::default();

        assert!(config.validate().is_ok());
        assert!(config.scan.formats.is_empty());
        assert_eq!(config.scan.lens_facing, LensFacing::Back);
        assert_eq!(config.scan.resolution, Resolution::Hd720);
        assert_eq!(config.stabilizer.vote_threshold, 10);
        assert_eq!(config.stabilizer.emit_policy, EmitPolicy::EveryFrame);
        assert!(config.screen_size().is_none());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScannerConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ScannerConfig::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[scan]
formats = ["QR_CODE", "EAN_13"]
lens_facing = "FRONT"
resolution = "1920x1080"

[stabilizer]
vote_threshold = 3
emit_policy = "once"

[display]
screen_size = [1080, 2400]
"#
        )
        .unwrap();

        let config = ScannerConfig::load_from_file(file.path()).unwrap();

        assert_eq!(
            config.scan.formats,
            vec![BarcodeFormat::QrCode, BarcodeFormat::Ean13]
        );
        assert_eq!(config.scan.lens_facing, LensFacing::Front);
        assert_eq!(config.scan.resolution, Resolution::Hd1080);
        assert_eq!(config.stabilizer.vote_threshold, 3);
        assert_eq!(config.stabilizer.emit_policy, EmitPolicy::Once);
        assert_eq!(config.screen_size(), Some(Size::new(1080, 2400)));
        assert_eq!(config.system.event_bus_capacity, 64);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ScannerConfig::default();

        config.stabilizer.vote_threshold = 0;
        assert!(config.validate().is_err());
        config.stabilizer.vote_threshold = 10;

        config.display.screen_size = Some((0, 2400));
        assert!(config.validate().is_err());
        config.display.screen_size = Some((1080, 2400));

        config.system.event_bus_capacity = 0;
        assert!(config.validate().is_err());
        config.system.event_bus_capacity = 16;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_serialize_to_toml() {
        let rendered = toml::to_string_pretty(&ScannerConfig::default()).unwrap();
        assert!(rendered.contains("vote_threshold = 10"));
        assert!(rendered.contains("lens_facing = \"BACK\""));
        assert!(rendered.contains("resolution = \"1280x720\""));
    }
}
