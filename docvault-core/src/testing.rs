use crate::models::{Author, CommitId};
use crate::vcs::{GitPrimitives, VcsPrimitives};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A throwaway git repository with a configured identity.
pub(crate) struct TestRepo {
    pub dir: TempDir,
    pub vcs: Arc<GitPrimitives>,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Test User").unwrap();
            config.set_str("user.email", "test@example.com").unwrap();
        }
        drop(repo);
        let vcs = Arc::new(GitPrimitives::open(dir.path()).unwrap());
        Self { dir, vcs }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn author(&self) -> Author {
        Author::new("Test User", "test@example.com")
    }

    pub fn write(&self, path: &str, content: &str) {
        let full = self.dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }

    pub fn remove(&self, path: &str) {
        std::fs::remove_file(self.dir.path().join(path)).unwrap();
    }

    pub fn read(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(self.dir.path().join(path)).ok()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.dir.path().join(path).exists()
    }

    pub fn commit(&self, message: &str) -> CommitId {
        self.vcs.stage_all().unwrap();
        self.vcs.create_commit(message, &self.author()).unwrap()
    }

    pub fn commit_as(&self, message: &str, author: &Author) -> CommitId {
        self.vcs.stage_all().unwrap();
        self.vcs.create_commit(message, author).unwrap()
    }
}
