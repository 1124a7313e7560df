//! Payloads and status codes shared by the HTTP client and server.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::NotebookError;

/// Path of the node collection below the notebook base URL.
pub const NODES_PATH: &str = "nodes";

/// Largest request body the server accepts.
pub const MAX_BODY: usize = 256 * 1024 * 1024;

/// Answer to `GET nodes/`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RootIds {
    pub rootids: Vec<String>,
}

/// Answer to `GET nodes/<nodeid>/<dir>/`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FileList {
    pub files: Vec<String>,
}

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl ErrorBody {
    pub fn from_error(err: &NotebookError) -> ErrorBody {
        let kind = match err {
            NotebookError::UnknownNode(_) => "unknown_node",
            NotebookError::NodeExists(_) => "node_exists",
            NotebookError::UnknownFile(_) => "unknown_file",
            NotebookError::File(_) => "file",
            NotebookError::InvalidNodeId(_) => "invalid_nodeid",
            NotebookError::Parse(_) | NotebookError::Serialization(_) => "parse",
            NotebookError::VersionMismatch { .. } => "version_mismatch",
            NotebookError::CorruptIndex(_) => "corrupt_index",
            NotebookError::Connection(_)
            | NotebookError::Io(_)
            | NotebookError::Database(_) => "connection",
        };
        ErrorBody {
            kind: kind.to_string(),
            message: detail(err),
        }
    }

    /// Rebuilds the error on the client side.
    pub fn into_error(self, status: StatusCode) -> NotebookError {
        let message = self.message;
        match self.kind.as_str() {
            "unknown_node" => NotebookError::UnknownNode(message),
            "node_exists" => NotebookError::NodeExists(message),
            "unknown_file" => NotebookError::UnknownFile(message),
            "file" => NotebookError::File(message),
            "invalid_nodeid" => NotebookError::InvalidNodeId(message),
            "parse" => NotebookError::Parse(message),
            "corrupt_index" => NotebookError::CorruptIndex(message),
            _ => error_for_status(status, message),
        }
    }
}

/// Status code the server answers `err` with.
pub fn status_for(err: &NotebookError) -> StatusCode {
    match err {
        NotebookError::UnknownNode(_) | NotebookError::UnknownFile(_) => StatusCode::NOT_FOUND,
        NotebookError::NodeExists(_) => StatusCode::FORBIDDEN,
        NotebookError::Parse(_) | NotebookError::Serialization(_) | NotebookError::InvalidNodeId(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Fallback when a response carries no usable [`ErrorBody`].
pub fn error_for_status(status: StatusCode, message: String) -> NotebookError {
    match status {
        StatusCode::NOT_FOUND => NotebookError::UnknownNode(message),
        StatusCode::FORBIDDEN => NotebookError::NodeExists(message),
        StatusCode::BAD_REQUEST => NotebookError::Parse(message),
        _ => NotebookError::Connection(format!("unexpected response {}: {}", status, message)),
    }
}

/// The variant's payload without the `Display` prefix, so the client can
/// rewrap it without doubling the prefix.
fn detail(err: &NotebookError) -> String {
    match err {
        NotebookError::UnknownNode(m)
        | NotebookError::NodeExists(m)
        | NotebookError::UnknownFile(m)
        | NotebookError::File(m)
        | NotebookError::InvalidNodeId(m)
        | NotebookError::Parse(m)
        | NotebookError::CorruptIndex(m)
        | NotebookError::Connection(m) => m.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&NotebookError::UnknownFile("f".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&NotebookError::NodeExists("n".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&NotebookError::Parse("p".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&NotebookError::Connection("c".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_survives_the_wire() {
        let err = NotebookError::UnknownFile("'n1' 'x.txt'".into());
        let body = ErrorBody::from_error(&err);
        match body.into_error(status_for(&err)) {
            NotebookError::UnknownFile(m) => assert_eq!(m, "'n1' 'x.txt'"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_status_fallback() {
        assert!(matches!(
            error_for_status(StatusCode::NOT_FOUND, "gone".into()),
            NotebookError::UnknownNode(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_GATEWAY, "x".into()),
            NotebookError::Connection(_)
        ));
    }
}
