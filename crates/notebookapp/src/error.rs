use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotebookError {
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("Unknown file: {0}")]
    UnknownFile(String),

    #[error("File error: {0}")]
    File(String),

    #[error("Invalid node id: {0:?}")]
    InvalidNodeId(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Notebook version {found} is newer than the supported version {supported}")]
    VersionMismatch { found: i64, supported: i64 },

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl NotebookError {
    /// Wraps an I/O failure on an attached file with the node and file it concerns.
    pub fn file(nodeid: &str, filename: &str, err: impl std::fmt::Display) -> Self {
        NotebookError::File(format!("'{}' '{}': {}", nodeid, filename, err))
    }

    /// True for the "not found" family (unknown node or unknown file).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            NotebookError::UnknownNode(_) | NotebookError::UnknownFile(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NotebookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_mismatch_message() {
        let err = NotebookError::VersionMismatch {
            found: 7,
            supported: 5,
        };
        assert_eq!(
            err.to_string(),
            "Notebook version 7 is newer than the supported version 5"
        );
    }

    #[test]
    fn test_io_converts() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(NotebookError::Io(_))));
    }

    #[test]
    fn test_not_found_family() {
        assert!(NotebookError::UnknownNode("n".into()).is_not_found());
        assert!(NotebookError::UnknownFile("f".into()).is_not_found());
        assert!(!NotebookError::NodeExists("n".into()).is_not_found());
    }
}
