//! Error handling for the rack engine
//!
//! Parameter range violations never surface here: they are clamped at the
//! rack boundary. Module-id misses are no-ops. Everything else that can fail
//! is a variant of [`RackError`].

use thiserror::Error;

/// Result type alias for rack operations
pub type Result<T> = std::result::Result<T, RackError>;

/// Main error type for rack operations
#[derive(Error, Debug)]
pub enum RackError {
    // Rack Errors
    #[error("Unknown module type: {module_type}")]
    UnknownType { module_type: String },

    #[error("Unknown parameter '{param}' for module type {module_type}")]
    UnknownParameter { module_type: String, param: String },

    #[error("Index {index} out of range for rack of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    // Audio Errors
    #[error("Invalid audio: {reason}")]
    InvalidAudio { reason: String },

    #[error("Audio contains no samples")]
    EmptyAudio,

    #[error("No audio loaded")]
    NoAudioLoaded,

    // Provider Errors
    #[error("Provider error: {message}")]
    Provider { message: String },

    // Export Errors
    #[error("Export cancelled")]
    ExportCancelled,

    #[error("Worker channel closed: {what}")]
    ChannelClosed { what: &'static str },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RackError {
    /// Shorthand for a provider failure carrying a message
    pub fn provider(message: impl Into<String>) -> Self {
        RackError::Provider {
            message: message.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            RackError::UnknownType { .. } => "UNKNOWN_TYPE",
            RackError::UnknownParameter { .. } => "UNKNOWN_PARAMETER",
            RackError::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            RackError::InvalidAudio { .. } => "INVALID_AUDIO",
            RackError::EmptyAudio => "EMPTY_AUDIO",
            RackError::NoAudioLoaded => "NO_AUDIO_LOADED",
            RackError::Provider { .. } => "PROVIDER_ERROR",
            RackError::ExportCancelled => "EXPORT_CANCELLED",
            RackError::ChannelClosed { .. } => "CHANNEL_CLOSED",
            RackError::InvalidConfig { .. } => "INVALID_CONFIG",
            RackError::Io(_) => "IO_ERROR",
            RackError::Wav(_) => "WAV_ERROR",
            RackError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error leaves the session usable
    ///
    /// Rack and provider errors never touch rack or chain state, so the
    /// caller can simply report them and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RackError::UnknownType { .. }
                | RackError::UnknownParameter { .. }
                | RackError::IndexOutOfRange { .. }
                | RackError::Provider { .. }
                | RackError::ExportCancelled
                | RackError::NoAudioLoaded
                | RackError::InvalidAudio { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RackError::UnknownType { .. } => vec![
                "Run 'sonic-rack modules' to list the available module types",
            ],
            RackError::UnknownParameter { .. } => vec![
                "Check the module descriptor for valid parameter names",
                "Parameter names are case-sensitive (e.g. 'makeupGain')",
            ],
            RackError::Provider { .. } => vec![
                "The rack and loaded audio are unchanged",
                "Retry the operation or use a rack module instead",
            ],
            RackError::NoAudioLoaded => vec!["Load an audio file before exporting"],
            RackError::Wav(_) => vec![
                "Convert the file to PCM or float WAV first",
                "Check that the destination directory is writable",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = RackError::UnknownType {
            module_type: "reverb".to_string(),
        };
        assert_eq!(err.error_code(), "UNKNOWN_TYPE");
        assert_eq!(err.to_string(), "Unknown module type: reverb");
    }

    #[test]
    fn test_provider_errors_are_recoverable() {
        let err = RackError::provider("denoise failed");
        assert!(err.is_recoverable());
        assert!(!err.recovery_suggestions().is_empty());
        assert_eq!(err.to_string(), "Provider error: denoise failed");
    }

    #[test]
    fn test_io_errors_are_not_recoverable() {
        let err: RackError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.error_code(), "IO_ERROR");
        assert!(!err.is_recoverable());
    }
}
