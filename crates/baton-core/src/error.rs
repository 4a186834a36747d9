use thiserror::Error;

/// Top-level error type for the baton bridge.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates construct
/// the matching variant directly so that the `?` operator works seamlessly
/// across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BatonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Recording error: {0}")]
    Recording(String),

    #[error("Grammar error: {0}")]
    Grammar(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for BatonError {
    fn from(err: toml::de::Error) -> Self {
        BatonError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for BatonError {
    fn from(err: toml::ser::Error) -> Self {
        BatonError::Config(err.to_string())
    }
}

/// A specialized `Result` type for baton operations.
pub type Result<T> = std::result::Result<T, BatonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BatonError::Grammar("swap failed".to_string());
        assert_eq!(err.to_string(), "Grammar error: swap failed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BatonError = io_err.into();
        assert!(matches!(err, BatonError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let bad_toml = "invalid = [[[";
        let parsed: std::result::Result<toml::Value, _> = toml::from_str(bad_toml);
        assert!(parsed.is_err());
        let err: BatonError = parsed.unwrap_err().into();
        assert!(matches!(err, BatonError::Config(_)));
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(BatonError, &str)> = vec![
            (
                BatonError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                BatonError::Protocol("short frame".to_string()),
                "Protocol error: short frame",
            ),
            (
                BatonError::Channel("connection reset".to_string()),
                "Channel error: connection reset",
            ),
            (
                BatonError::Playback("no device".to_string()),
                "Playback error: no device",
            ),
            (
                BatonError::Recording("file exists".to_string()),
                "Recording error: file exists",
            ),
            (
                BatonError::Grammar("load timed out".to_string()),
                "Grammar error: load timed out",
            ),
            (
                BatonError::Synthesis("busy".to_string()),
                "Synthesis error: busy",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let _value = io_result?;
            Ok("success".to_string())
        }

        assert_eq!(inner().unwrap(), "success");
    }

    #[test]
    fn test_error_debug_impl() {
        let err = BatonError::Playback("test debug".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Playback"));
        assert!(debug_str.contains("test debug"));
    }
}
