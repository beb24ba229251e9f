//! Unified error type for vidmorph.
//!
//! Library crates funnel their failures into [`Error`]. The CLI maps each
//! variant to a sysexits-style process exit code via [`Error::exit_code`].

/// Unified error type covering all failure modes that are surfaced to a
/// caller. Process-level outcomes (timeouts, non-zero exits) are reported via
/// the supervisor's execution result instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transformation parameter is out of range (e.g. `speed <= 0`).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration or request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to a process exit code (`sysexits.h` values).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidParameter(_) => 64,
            Error::Validation(_) => 78,
            Error::Io { .. } => 74,
            Error::Tool { .. } => 69,
            Error::Probe(_) => 65,
            Error::Internal(_) => 70,
        }
    }

    /// Convenience constructor for [`Error::InvalidParameter`].
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Error::InvalidParameter(message.into())
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameter_display() {
        let err = Error::invalid_parameter("speed must be > 0, got 0");
        assert_eq!(err.to_string(), "Invalid parameter: speed must be > 0, got 0");
        assert_eq!(err.exit_code(), 64);
    }

    #[test]
    fn validation_display() {
        let err = Error::Validation("config parse error".into());
        assert_eq!(err.to_string(), "Validation error: config parse error");
        assert_eq!(err.exit_code(), 78);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.exit_code(), 74);
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("ffmpeg", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [ffmpeg]: exit code 1");
        assert_eq!(err.exit_code(), 69);
    }

    #[test]
    fn probe_display() {
        let err = Error::Probe("no video stream".into());
        assert_eq!(err.to_string(), "Probe error: no video stream");
        assert_eq!(err.exit_code(), 65);
    }

    #[test]
    fn internal_display() {
        let err = Error::Internal("unexpected state".into());
        assert_eq!(err.to_string(), "Internal error: unexpected state");
        assert_eq!(err.exit_code(), 70);
    }
}
