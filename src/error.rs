use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the calorimeter bookkeeping core.
///
/// Index and phase violations mean a collaborator broke its contract; they abort the
/// run instead of silently dropping a deposit, which would corrupt the lost-energy column.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid user or API parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Spectrum shape name with no registered constructor.
    #[error("unknown spectrum shape <{0}>")]
    UnknownShape(String),

    /// Module index outside `[0, len)`.
    #[error("module index {index} out of range (module count {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Lifecycle hook called in the wrong event phase.
    #[error("{operation} is not allowed while the event is {phase}")]
    PhaseViolation {
        operation: &'static str,
        phase: &'static str,
    },

    /// Output destination is missing, misconfigured or not writable.
    #[error("output error: {0}")]
    Output(String),

    /// Propagated I/O errors from the output destination or config files.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    /// Configuration could not be serialised.
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    /// Row encoding failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_informative() {
        let e = Error::InvalidParam("sigma must be >= 0".to_string());
        let msg = format!("{e}");
        assert!(msg.contains("invalid parameter"));
        assert!(msg.contains("sigma"));
    }

    #[test]
    fn index_error_names_both_bounds() {
        let e = Error::IndexOutOfRange { index: 9, len: 9 };
        let msg = e.to_string();
        assert!(msg.contains("index 9"));
        assert!(msg.contains("module count 9"));
    }

    #[test]
    fn phase_violation_names_operation() {
        let e = Error::PhaseViolation {
            operation: "accumulate",
            phase: "idle",
        };
        assert_eq!(e.to_string(), "accumulate is not allowed while the event is idle");
    }
}
