/// Result alias that carries the custom [`SeeingSoundError`] type.
pub type Result<T> = std::result::Result<T, SeeingSoundError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SeeingSoundError {
    /// Free-form message for failures that do not fit a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// A key the current run depends on is absent from the configuration.
    #[error("missing required configuration key `{0}`")]
    MissingKey(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("audio device error: {0}")]
    Audio(String),
    /// No audio arrived within the read timeout. Transient.
    #[error("audio stream stalled: no samples for {0:?}")]
    StreamStalled(std::time::Duration),
    /// The frame source has ended and will never produce another frame.
    #[error("audio stream closed")]
    StreamClosed,
    #[error("light `{light}` rejected write: {reason}")]
    Light { light: String, reason: String },
    #[error("spectrum computation failed: {0}")]
    Fft(String),
}

impl SeeingSoundError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Builds an [`SeeingSoundError::InvalidConfig`] from anything printable.
    pub fn invalid_config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Returns true for errors the dispatch loop should log and ride out.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StreamStalled(_) | Self::Light { .. } | Self::Fft(_))
    }
}

impl From<realfft::FftError> for SeeingSoundError {
    fn from(value: realfft::FftError) -> Self {
        Self::Fft(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn messages_go_through_explicit_constructors() {
        let err = SeeingSoundError::msg("boom");
        assert!(matches!(&err, SeeingSoundError::Message(m) if m == "boom"));
        assert_eq!(
            SeeingSoundError::invalid_config("bad").to_string(),
            "invalid configuration: bad"
        );
    }

    #[test]
    fn only_loop_recoverable_errors_are_transient() {
        assert!(SeeingSoundError::StreamStalled(Duration::from_millis(40)).is_transient());
        assert!(SeeingSoundError::Fft("short".into()).is_transient());
        assert!(!SeeingSoundError::StreamClosed.is_transient());
        assert!(!SeeingSoundError::MissingKey("lights".into()).is_transient());
    }
}
