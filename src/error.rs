use thiserror::Error;

/// Main error type for the imgseq library
#[derive(Error, Debug)]
pub enum ConverterError {
    #[error("Image list error: {0}")]
    Sequence(#[from] SequenceError),

    #[error("Staging error: {0}")]
    Stage(#[from] StageError),

    #[error("Option error: {0}")]
    Options(#[from] OptionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("A conversion is already running")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while building or editing the ordered image list
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("Not a supported image file: {path}")]
    UnsupportedExtension { path: String },

    #[error("Image already in the sequence: {path}")]
    Duplicate { path: String },

    #[error("Index {index} out of range for a list of {len} images")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Failed to read folder {path}: {cause}")]
    ReadDirFailed { path: String, cause: String },
}

/// Errors raised while staging images into the numbered workspace
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("No images to convert")]
    EmptyInput,

    #[error("Too many frames: {count} exceeds the maximum of {max}")]
    TooManyFrames { count: usize, max: usize },

    #[error("Failed to create staging directory: {cause}")]
    WorkspaceFailed { cause: String },

    #[error("Failed to copy {path}: {cause}")]
    CopyFailed { path: String, cause: String },
}

/// Rejected conversion option
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    #[error("Invalid option {key} = {value}: {reason}")]
    InvalidOption {
        key: String,
        value: String,
        reason: String,
    },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using ConverterError
pub type Result<T> = std::result::Result<T, ConverterError>;

impl OptionError {
    pub fn invalid<K, V, R>(key: K, value: V, reason: R) -> Self
    where
        K: Into<String>,
        V: ToString,
        R: Into<String>,
    {
        Self::InvalidOption {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl ConverterError {
    /// Whether the caller can fix this by changing its input and trying again
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Sequence(_)
                | Self::Options(_)
                | Self::Stage(StageError::EmptyInput)
                | Self::Stage(StageError::TooManyFrames { .. })
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Stage(StageError::EmptyInput) => {
                "Please add images before starting.".to_string()
            }
            Self::Stage(StageError::CopyFailed { path, .. }) => {
                format!("Could not copy '{}'. Please check the file exists and is readable.", path)
            }
            Self::Options(OptionError::InvalidOption { key, value, reason }) => {
                format!("'{}' is not a valid value for {} ({}).", value, key, reason)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            Self::AlreadyRunning => {
                "A conversion is already in progress. Wait for it to finish or cancel it.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err: ConverterError = StageError::CopyFailed {
            path: "a.png".to_string(),
            cause: "permission denied".to_string(),
        }
        .into();

        let text = err.to_string();
        assert!(text.starts_with("Staging error:"));
        assert!(text.contains("a.png"));
        assert!(text.contains("permission denied"));
    }

    #[test]
    fn test_input_errors_are_classified() {
        assert!(ConverterError::from(StageError::EmptyInput).is_input_error());
        assert!(ConverterError::from(OptionError::invalid("crf", 60, "must be 0-51")).is_input_error());
        assert!(!ConverterError::AlreadyRunning.is_input_error());
        assert!(!ConverterError::from(StageError::WorkspaceFailed {
            cause: "disk full".to_string()
        })
        .is_input_error());
    }

    #[test]
    fn test_user_message_for_invalid_option() {
        let err = ConverterError::from(OptionError::invalid("crf", 60, "must be between 0 and 51"));
        let message = err.user_message();
        assert!(message.contains("'60'"));
        assert!(message.contains("crf"));
    }
}
