use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OptionError;

/// Highest (worst) value the quality parameter accepts
pub const MAX_CRF: u8 = 51;

/// Codecs offered to users for MP4 output; any other encoder name is accepted too
pub const RECOMMENDED_CODECS: &[&str] = &["libx264", "libx265", "mpeg4"];

/// Output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Gif,
}

impl OutputFormat {
    /// File extension without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Gif => "gif",
        }
    }

    /// File name used when the user has not picked one
    pub fn default_file_name(&self) -> PathBuf {
        PathBuf::from(format!("output.{}", self.extension()))
    }

    /// Suggest an output path after switching to this format
    ///
    /// An empty path, or one still carrying the other format's extension,
    /// is replaced by [`OutputFormat::default_file_name`]. Anything else is
    /// the user's choice and is returned unchanged.
    pub fn suggest_output(&self, current: &Path) -> PathBuf {
        let other = match self {
            Self::Mp4 => Self::Gif,
            Self::Gif => Self::Mp4,
        };

        let has_other_extension = current
            .to_str()
            .map(|s| s.ends_with(&format!(".{}", other.extension())))
            .unwrap_or(false);

        if current.as_os_str().is_empty() || has_other_extension {
            self.default_file_name()
        } else {
            current.to_path_buf()
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mp4 => write!(f, "MP4"),
            Self::Gif => write!(f, "GIF"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "gif" => Ok(Self::Gif),
            _ => Err(OptionError::invalid("format", s, "expected MP4 or GIF")),
        }
    }
}

/// Settings that only apply to one output container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatOptions {
    Mp4 {
        /// Encoder codec name, e.g. `libx264`
        codec: String,
        /// Constant rate factor, 0 (best) to 51 (worst)
        crf: u8,
    },
    Gif {
        /// Rescale to this width keeping aspect ratio; `None` keeps the source size
        scale_width: Option<u32>,
    },
}

/// Immutable settings for one conversion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Frames per second of the output
    pub frame_rate: u32,

    /// Container and container-specific settings
    pub format: FormatOptions,
}

impl ConversionOptions {
    pub fn mp4<S: Into<String>>(frame_rate: u32, codec: S, crf: u8) -> Self {
        Self {
            frame_rate,
            format: FormatOptions::Mp4 {
                codec: codec.into(),
                crf,
            },
        }
    }

    pub fn gif(frame_rate: u32, scale_width: Option<u32>) -> Self {
        Self {
            frame_rate,
            format: FormatOptions::Gif { scale_width },
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        match self.format {
            FormatOptions::Mp4 { .. } => OutputFormat::Mp4,
            FormatOptions::Gif { .. } => OutputFormat::Gif,
        }
    }

    /// Whether the MP4 codec is one of [`RECOMMENDED_CODECS`]; always true for GIF
    pub fn uses_recommended_codec(&self) -> bool {
        match &self.format {
            FormatOptions::Mp4 { codec, .. } => RECOMMENDED_CODECS.contains(&codec.as_str()),
            FormatOptions::Gif { .. } => true,
        }
    }

    /// Check every field against the encoder's accepted ranges
    pub fn validate(&self) -> Result<(), OptionError> {
        if self.frame_rate == 0 {
            return Err(OptionError::invalid(
                "frame_rate",
                self.frame_rate,
                "must be at least 1",
            ));
        }

        match &self.format {
            FormatOptions::Mp4 { codec, crf } => {
                if codec.trim().is_empty() {
                    return Err(OptionError::invalid("codec", codec, "must not be empty"));
                }
                if *crf > MAX_CRF {
                    return Err(OptionError::invalid(
                        "crf",
                        crf,
                        format!("must be between 0 and {MAX_CRF}"),
                    ));
                }
            }
            FormatOptions::Gif { scale_width } => {
                if *scale_width == Some(0) {
                    return Err(OptionError::invalid(
                        "scale_width",
                        0,
                        "must be a positive number of pixels",
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Parse a free-text scale width; blank means "keep the source size"
pub fn parse_scale_width(text: &str) -> Result<Option<u32>, OptionError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    match text.parse::<u32>() {
        Ok(0) | Err(_) => Err(OptionError::invalid(
            "scale_width",
            text,
            "must be a positive number of pixels",
        )),
        Ok(width) => Ok(Some(width)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommended_codecs() {
        assert!(ConversionOptions::mp4(25, "libx265", 18).uses_recommended_codec());
        assert!(!ConversionOptions::mp4(25, "libvpx-vp9", 18).uses_recommended_codec());
        assert!(ConversionOptions::gif(10, None).uses_recommended_codec());
        assert!(ConversionOptions::mp4(25, "libvpx-vp9", 18).validate().is_ok());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("MP4".parse::<OutputFormat>().unwrap(), OutputFormat::Mp4);
        assert_eq!(" gif ".parse::<OutputFormat>().unwrap(), OutputFormat::Gif);
        assert!("webm".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_suggest_output() {
        let gif = OutputFormat::Gif;
        assert_eq!(gif.suggest_output(Path::new("")), PathBuf::from("output.gif"));
        assert_eq!(gif.suggest_output(Path::new("clips/run.mp4")), PathBuf::from("output.gif"));
        assert_eq!(gif.suggest_output(Path::new("clips/run.mov")), PathBuf::from("clips/run.mov"));

        let mp4 = OutputFormat::Mp4;
        assert_eq!(mp4.suggest_output(Path::new("loop.gif")), PathBuf::from("output.mp4"));
        assert_eq!(mp4.suggest_output(Path::new("final.mp4")), PathBuf::from("final.mp4"));
    }

    #[test]
    fn test_valid_options() {
        assert!(ConversionOptions::mp4(25, "libx264", 18).validate().is_ok());
        assert!(ConversionOptions::mp4(1, "libx265", 0).validate().is_ok());
        assert!(ConversionOptions::mp4(60, "mpeg4", MAX_CRF).validate().is_ok());
        assert!(ConversionOptions::gif(10, None).validate().is_ok());
        assert!(ConversionOptions::gif(10, Some(480)).validate().is_ok());
    }

    #[test]
    fn test_invalid_options() {
        assert!(ConversionOptions::mp4(0, "libx264", 18).validate().is_err());
        assert!(ConversionOptions::mp4(25, "  ", 18).validate().is_err());
        assert!(ConversionOptions::gif(25, Some(0)).validate().is_err());

        let err = ConversionOptions::mp4(25, "libx264", 52).validate().unwrap_err();
        let OptionError::InvalidOption { key, value, .. } = err;
        assert_eq!(key, "crf");
        assert_eq!(value, "52");
    }

    #[test]
    fn test_parse_scale_width() {
        assert_eq!(parse_scale_width("").unwrap(), None);
        assert_eq!(parse_scale_width("  ").unwrap(), None);
        assert_eq!(parse_scale_width("480").unwrap(), Some(480));
        assert!(parse_scale_width("0").is_err());
        assert!(parse_scale_width("-1").is_err());
        assert!(parse_scale_width("wide").is_err());
    }

    #[test]
    fn test_output_format_of_options() {
        assert_eq!(ConversionOptions::mp4(25, "libx264", 18).output_format(), OutputFormat::Mp4);
        assert_eq!(ConversionOptions::gif(25, None).output_format(), OutputFormat::Gif);
    }
}
