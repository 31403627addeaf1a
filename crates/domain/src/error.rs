use std::path::PathBuf;

/// Shared error type used across all Clipforge crates.
///
/// Each variant corresponds to one failure class the system distinguishes at
/// the boundary: tools fold these into `ToolResult::fail`, the facade maps
/// them onto terminal stream events, and the CLI maps them onto exit codes.
/// Layers add context by wrapping messages; they never replace the kind.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("config: {0}")]
    Config(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("file not accessible: {path}: {reason}")]
    FileNotAccessible { path: PathBuf, reason: String },

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool {tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("subprocess exited with status {status}: {stderr_tail}")]
    Subprocess { status: i32, stderr_tail: String },

    #[error("{provider} API error (HTTP {status}): {message}")]
    RemoteApi {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("transcript extraction failed: {0}")]
    TranscriptExtraction(String),

    #[error("no credentials: {0}")]
    NoCredentials(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("insufficient coverage: {0}")]
    InsufficientCoverage(String),

    #[error("no suitable take: {0}")]
    NoSuitableTake(String),

    #[error("assembly failed: {0}")]
    Assembly(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("project in invalid state: expected {expected}, was {actual}")]
    ProjectInvalidState { expected: String, actual: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable machine-readable kind string, used in structured tool payloads
    /// and issue reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Http(_) => "http",
            Error::Config(_) => "config_invalid",
            Error::FileNotFound(_) => "file_not_found",
            Error::FileNotAccessible { .. } => "file_not_accessible",
            Error::SchemaViolation(_) => "schema_violation",
            Error::ToolNotFound(_) => "tool_not_found",
            Error::ToolFailed { .. } => "tool_failed",
            Error::Subprocess { .. } => "subprocess_failed",
            Error::RemoteApi { .. } => "remote_api_failed",
            Error::TranscriptExtraction(_) => "transcript_extraction_failed",
            Error::NoCredentials(_) => "no_credentials",
            Error::Cancelled => "cancelled",
            Error::Timeout(_) => "timeout",
            Error::InsufficientCoverage(_) => "insufficient_coverage",
            Error::NoSuitableTake(_) => "no_suitable_take",
            Error::Assembly(_) => "assembly_failed",
            Error::Export(_) => "export_failed",
            Error::ProjectNotFound(_) => "project_not_found",
            Error::ProjectInvalidState { .. } => "project_invalid_state",
            Error::Other(_) => "other",
        }
    }

    /// Wrap with a context prefix, preserving the kind for the variants that
    /// carry a plain message.
    pub fn context(self, ctx: &str) -> Error {
        match self {
            Error::Config(m) => Error::Config(format!("{ctx}: {m}")),
            Error::TranscriptExtraction(m) => Error::TranscriptExtraction(format!("{ctx}: {m}")),
            Error::Assembly(m) => Error::Assembly(format!("{ctx}: {m}")),
            Error::Export(m) => Error::Export(format!("{ctx}: {m}")),
            Error::Timeout(m) => Error::Timeout(format!("{ctx}: {m}")),
            Error::Other(m) => Error::Other(format!("{ctx}: {m}")),
            other => Error::Other(format!("{ctx}: {other}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(Error::Cancelled.kind(), "cancelled");
        assert_eq!(
            Error::Subprocess {
                status: 1,
                stderr_tail: String::new()
            }
            .kind(),
            "subprocess_failed"
        );
        assert_eq!(
            Error::FileNotFound(PathBuf::from("/x")).kind(),
            "file_not_found"
        );
    }

    #[test]
    fn context_preserves_kind_for_message_variants() {
        let e = Error::TranscriptExtraction("chunk 2 failed".into()).context("take b.mp4");
        assert_eq!(e.kind(), "transcript_extraction_failed");
        assert!(e.to_string().contains("take b.mp4"));
        assert!(e.to_string().contains("chunk 2 failed"));
    }
}
