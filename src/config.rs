use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    encoder::{ConversionOptions, OutputFormat, MAX_CRF},
    error::{ConfigError, Result},
};

/// Main configuration for imgseq
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Encoder executable and process handling
    pub encoder: EncoderConfig,

    /// Conversion settings used when the host does not override them
    pub defaults: DefaultsConfig,

    /// Staging workspace settings
    pub staging: StagingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.encoder.validate()?;
        self.defaults.validate()?;
        self.staging.validate()?;
        Ok(())
    }
}

/// Encoder process configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Explicit encoder executable; unset means bundled-then-PATH lookup
    pub executable: Option<PathBuf>,

    /// Milliseconds a cancelled encoder gets to quit before being killed
    pub terminate_grace_ms: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            executable: None,
            terminate_grace_ms: 3_000,
        }
    }
}

impl EncoderConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.terminate_grace_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "encoder.terminate_grace_ms".to_string(),
                value: self.terminate_grace_ms.to_string()
            }.into());
        }

        if let Some(executable) = &self.executable {
            if executable.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "encoder.executable".to_string(),
                    value: String::new()
                }.into());
            }
        }

        Ok(())
    }
}

/// Default conversion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Frames per second
    pub frame_rate: u32,

    /// Output container
    pub format: OutputFormat,

    /// MP4 codec
    pub codec: String,

    /// MP4 constant rate factor (0-51, lower is better)
    pub crf: u8,

    /// GIF output width; unset keeps the source size
    pub scale_width: Option<u32>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            frame_rate: 25,
            format: OutputFormat::Mp4,
            codec: "libx264".to_string(),
            crf: 18,
            scale_width: None,
        }
    }
}

impl DefaultsConfig {
    /// Conversion options for the configured format
    pub fn options(&self) -> ConversionOptions {
        match self.format {
            OutputFormat::Mp4 => ConversionOptions::mp4(self.frame_rate, self.codec.clone(), self.crf),
            OutputFormat::Gif => ConversionOptions::gif(self.frame_rate, self.scale_width),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.frame_rate == 0 {
            return Err(ConfigError::InvalidValue {
                key: "defaults.frame_rate".to_string(),
                value: self.frame_rate.to_string()
            }.into());
        }

        if self.codec.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "defaults.codec".to_string(),
                value: self.codec.clone()
            }.into());
        }

        if self.crf > MAX_CRF {
            return Err(ConfigError::InvalidValue {
                key: "defaults.crf".to_string(),
                value: self.crf.to_string()
            }.into());
        }

        if self.scale_width == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "defaults.scale_width".to_string(),
                value: "0".to_string()
            }.into());
        }

        Ok(())
    }
}

/// Staging workspace configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Parent directory for workspaces; unset means the system temp dir
    pub temp_root: Option<PathBuf>,

    /// Workspace directory name prefix
    pub prefix: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            temp_root: None,
            prefix: "imgseq_".to_string(),
        }
    }
}

impl StagingConfig {
    fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() || self.prefix.contains(['/', '\\']) {
            return Err(ConfigError::InvalidValue {
                key: "staging.prefix".to_string(),
                value: self.prefix.clone()
            }.into());
        }

        Ok(())
    }
}
