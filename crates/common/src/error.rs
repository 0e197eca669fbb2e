//! Error types shared across Flowcam crates.

use std::path::PathBuf;

/// Top-level error type for Flowcam operations.
#[derive(Debug, thiserror::Error)]
pub enum FlowcamError {
    /// An operation was requested in a state that does not allow it
    /// (for example, starting an export while another one is running).
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// The source media cannot produce a frame at the requested time yet.
    #[error("Source not ready: {message}")]
    SourceNotReady { message: String },

    /// The frame sink could not be started, written to, or finished.
    #[error("Sink unavailable: {message}")]
    SinkUnavailable { message: String },

    /// Media bytes could not be extracted or materialized.
    #[error("Data extraction failed: {message}")]
    DataExtraction { message: String },

    #[error("Processing error: {message}")]
    Processing { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Project error: {message}")]
    Project { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FlowcamError.
pub type FlowcamResult<T> = Result<T, FlowcamError>;

impl FlowcamError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn source_not_ready(msg: impl Into<String>) -> Self {
        Self::SourceNotReady {
            message: msg.into(),
        }
    }

    pub fn sink_unavailable(msg: impl Into<String>) -> Self {
        Self::SinkUnavailable {
            message: msg.into(),
        }
    }

    pub fn data_extraction(msg: impl Into<String>) -> Self {
        Self::DataExtraction {
            message: msg.into(),
        }
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn project(msg: impl Into<String>) -> Self {
        Self::Project {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether the export loop may drop the current frame and continue.
    ///
    /// Only per-frame failures qualify. Sink, state and extraction errors
    /// end the export.
    pub fn is_frame_recoverable(&self) -> bool {
        matches!(self, Self::SourceNotReady { .. } | Self::Render { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_recoverable_classification() {
        assert!(FlowcamError::source_not_ready("seek pending").is_frame_recoverable());
        assert!(FlowcamError::render("draw failed").is_frame_recoverable());
        assert!(!FlowcamError::sink_unavailable("broken pipe").is_frame_recoverable());
        assert!(!FlowcamError::invalid_state("busy").is_frame_recoverable());
        assert!(!FlowcamError::data_extraction("no bytes").is_frame_recoverable());
    }

    #[test]
    fn test_display_includes_message() {
        let err = FlowcamError::invalid_state("export already running");
        assert_eq!(err.to_string(), "Invalid state: export already running");
    }
}
