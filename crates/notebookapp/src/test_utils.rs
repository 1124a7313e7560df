use std::path::PathBuf;

use tempfile::TempDir;

use crate::notebook::Notebook;

pub struct TestEnv {
    // Held so the directory outlives the notebook.
    pub _temp_dir: TempDir,
    pub notebook: Notebook,
    pub root: PathBuf,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    /// A fresh filesystem notebook titled "Test" in a temp directory.
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = temp_dir.path().join("notebook");
        let notebook = Notebook::create(&root.to_string_lossy(), "Test")
            .expect("failed to create notebook");
        Self {
            _temp_dir: temp_dir,
            notebook,
            root,
        }
    }

    pub fn url(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }

    /// Closes the notebook and loads it again from disk.
    pub fn reopen(self) -> Self {
        let TestEnv {
            _temp_dir,
            notebook,
            root,
        } = self;
        notebook.close().expect("failed to close notebook");
        let notebook = Notebook::load(&root.to_string_lossy()).expect("failed to reload notebook");
        Self {
            _temp_dir,
            notebook,
            root,
        }
    }
}
