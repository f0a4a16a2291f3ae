use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failure of a single page or attachment. None of these abort a run; the
/// reconciler records them and moves on to the next item.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error during {operation}: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },
    #[error("invalid page name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("unresolvable marker {}: {reason}", path.display())]
    MarkerParse { path: PathBuf, reason: String },
    #[error("filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SyncError {
    pub fn transport(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            operation,
            message: message.into(),
        }
    }

    pub fn filesystem(path: &Path, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn marker(path: &Path, reason: impl Into<String>) -> Self {
        Self::MarkerParse {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Short machine-friendly label used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::InvalidName { .. } => "invalid_name",
            Self::MarkerParse { .. } => "marker_parse",
            Self::Filesystem { .. } => "filesystem",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(SyncError::transport("list", "boom").kind(), "transport");
        assert_eq!(
            SyncError::InvalidName {
                name: String::new(),
                reason: "empty",
            }
            .kind(),
            "invalid_name"
        );
        assert_eq!(
            SyncError::marker(Path::new("memo.md"), "short").kind(),
            "marker_parse"
        );
    }

    #[test]
    fn display_includes_path_for_filesystem_errors() {
        let error = SyncError::filesystem(
            Path::new("Wiki/Dev/index.md"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = error.to_string();
        assert!(message.contains("Wiki/Dev/index.md"));
        assert!(message.contains("denied"));
    }
}
