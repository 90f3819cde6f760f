//! Remote synchronization after a revert or reset.
//!
//! Nothing in here fails the caller. Local commits are already made by the
//! time this runs, so every transport problem becomes a warning string.

use crate::config::RemoteSettings;
use crate::models::CommitId;
use crate::vcs::VcsPrimitives;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub pushed: bool,
    pub warnings: Vec<String>,
}

impl SyncOutcome {
    fn warn(mut self, message: String) -> Self {
        warn!("{}", message);
        self.warnings.push(message);
        self
    }
}

/// Fetch, check for divergence, then push HEAD's branch.
///
/// With `force` the divergence check is skipped and the push overwrites the
/// remote branch; the reset path needs that because it rewinds history.
pub fn sync_and_push<V: VcsPrimitives + ?Sized>(
    vcs: &V,
    remote: &RemoteSettings,
    force: bool,
) -> SyncOutcome {
    let outcome = SyncOutcome::default();
    if !remote.enabled {
        return outcome;
    }

    match vcs.has_remote(&remote.name) {
        Ok(true) => {}
        Ok(false) => {
            debug!(remote = %remote.name, "no remote configured; skipping push");
            return outcome;
        }
        Err(e) => return outcome.warn(format!("could not read remote '{}': {}", remote.name, e)),
    }

    let branch = match &remote.branch {
        Some(branch) => branch.clone(),
        None => match vcs.current_branch() {
            Ok(Some(branch)) => branch,
            Ok(None) => return outcome.warn("HEAD is detached; not pushing".to_string()),
            Err(e) => return outcome.warn(format!("could not read current branch: {}", e)),
        },
    };

    let head = match vcs.head() {
        Ok(Some(head)) => head,
        Ok(None) => return outcome,
        Err(e) => return outcome.warn(format!("could not read HEAD: {}", e)),
    };

    if !force {
        match vcs.fetch(&remote.name, &branch) {
            Ok(Some(tip)) if tip == head => {
                debug!(remote = %remote.name, branch = %branch, "remote already up to date");
                return outcome;
            }
            Ok(Some(tip)) => match vcs.is_descendant_of(&head, &tip) {
                Ok(true) => {}
                Ok(false) => {
                    return outcome.warn(format!(
                        "local {} has diverged from {}/{} ({}); not pushing",
                        branch,
                        remote.name,
                        branch,
                        tip.short()
                    ))
                }
                Err(e) => {
                    return outcome.warn(format!("could not compare with remote tip: {}", e))
                }
            },
            Ok(None) => {}
            Err(e) => {
                return outcome.warn(format!(
                    "fetch from {} failed: {}; not pushing",
                    remote.name, e
                ))
            }
        }
    }

    push(vcs, &remote.name, &branch, &head, force, outcome)
}

fn push<V: VcsPrimitives + ?Sized>(
    vcs: &V,
    remote: &str,
    branch: &str,
    head: &CommitId,
    force: bool,
    mut outcome: SyncOutcome,
) -> SyncOutcome {
    match vcs.push(remote, branch, force) {
        Ok(()) => {
            info!(remote, branch, commit = %head, force, "pushed");
            outcome.pushed = true;
            outcome
        }
        Err(e) => {
            // Some transports report an error after the ref update landed.
            if let Ok(Some(tip)) = vcs.remote_branch_tip(remote, branch) {
                if &tip == head {
                    debug!(remote, branch, error = %e, "push reported an error but remote is current");
                    outcome.pushed = true;
                    return outcome;
                }
            }
            outcome.warn(format!("push to {}/{} failed: {}", remote, branch, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::facade::RepositoryFacade;
    use crate::models::{Author, CommitInfo, ObjectId, StatusEntry, TreeDelta, TreeFile};
    use crate::testing::TestRepo;
    use crate::vcs::GitPrimitives;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Real repository whose pushes always fail at the transport, while the
    /// remote reports `reported_tip` for every branch.
    struct FailingTransport {
        inner: Arc<GitPrimitives>,
        reported_tip: Option<CommitId>,
    }

    impl VcsPrimitives for FailingTransport {
        fn workdir(&self) -> &Path {
            self.inner.workdir()
        }
        fn metadata_dir(&self) -> PathBuf {
            self.inner.metadata_dir()
        }
        fn head(&self) -> Result<Option<CommitId>> {
            self.inner.head()
        }
        fn read_commit(&self, id: &CommitId) -> Result<Option<CommitInfo>> {
            self.inner.read_commit(id)
        }
        fn read_content_at(&self, commit: &CommitId, path: &str) -> Result<Option<Vec<u8>>> {
            self.inner.read_content_at(commit, path)
        }
        fn diff_trees(&self, old: Option<&ObjectId>, new: &ObjectId) -> Result<Vec<TreeDelta>> {
            self.inner.diff_trees(old, new)
        }
        fn list_tree(&self, tree: &ObjectId) -> Result<Vec<TreeFile>> {
            self.inner.list_tree(tree)
        }
        fn checkout(&self, commit: &CommitId, force: bool) -> Result<()> {
            self.inner.checkout(commit, force)
        }
        fn status_entries(&self) -> Result<Vec<StatusEntry>> {
            self.inner.status_entries()
        }
        fn stage_all(&self) -> Result<()> {
            self.inner.stage_all()
        }
        fn create_commit(&self, message: &str, author: &Author) -> Result<CommitId> {
            self.inner.create_commit(message, author)
        }
        fn set_branch_target(&self, branch: &str, commit: &CommitId) -> Result<()> {
            self.inner.set_branch_target(branch, commit)
        }
        fn current_branch(&self) -> Result<Option<String>> {
            self.inner.current_branch()
        }
        fn log(&self, depth: Option<usize>) -> Result<Vec<CommitInfo>> {
            self.inner.log(depth)
        }
        fn has_remote(&self, _name: &str) -> Result<bool> {
            Ok(true)
        }
        fn fetch(&self, _remote: &str, _branch: &str) -> Result<Option<CommitId>> {
            Ok(None)
        }
        fn remote_branch_tip(&self, _remote: &str, _branch: &str) -> Result<Option<CommitId>> {
            Ok(self.reported_tip.clone())
        }
        fn push(&self, _remote: &str, _branch: &str, _force: bool) -> Result<()> {
            Err(Error::Git(git2::Error::from_str("unexpected EOF after ref update")))
        }
        fn is_descendant_of(&self, commit: &CommitId, ancestor: &CommitId) -> Result<bool> {
            self.inner.is_descendant_of(commit, ancestor)
        }
    }

    fn add_bare_remote(repo: &TestRepo) -> (TempDir, git2::Repository) {
        let dir = TempDir::new().unwrap();
        let bare = git2::Repository::init_bare(dir.path()).unwrap();
        let local = git2::Repository::open(repo.path()).unwrap();
        local
            .remote("origin", dir.path().to_str().unwrap())
            .unwrap();
        (dir, bare)
    }

    fn remote_tip(bare: &git2::Repository, branch: &str) -> Option<String> {
        bare.refname_to_id(&format!("refs/heads/{branch}"))
            .ok()
            .map(|oid| oid.to_string())
    }

    #[test]
    fn test_no_remote_is_silent() {
        let repo = TestRepo::new();
        repo.write("a.txt", "a");
        repo.commit("init");

        let outcome = sync_and_push(repo.vcs.as_ref(), &RemoteSettings::default(), false);
        assert_eq!(outcome, SyncOutcome::default());
    }

    #[test]
    fn test_disabled_remote_is_skipped() {
        let repo = TestRepo::new();
        repo.write("a.txt", "a");
        repo.commit("init");
        let (_dir, bare) = add_bare_remote(&repo);

        let settings = RemoteSettings {
            enabled: false,
            ..RemoteSettings::default()
        };
        let outcome = sync_and_push(repo.vcs.as_ref(), &settings, false);
        assert!(!outcome.pushed);
        let branch = repo.vcs.current_branch().unwrap().unwrap();
        assert!(remote_tip(&bare, &branch).is_none());
    }

    #[test]
    fn test_push_to_new_and_existing_branch() {
        let repo = TestRepo::new();
        repo.write("a.txt", "a");
        repo.commit("init");
        let (_dir, bare) = add_bare_remote(&repo);
        let branch = repo.vcs.current_branch().unwrap().unwrap();

        let outcome = sync_and_push(repo.vcs.as_ref(), &RemoteSettings::default(), false);
        assert!(outcome.pushed, "{:?}", outcome.warnings);

        repo.write("b.txt", "b");
        let second = repo.commit("second");
        let outcome = sync_and_push(repo.vcs.as_ref(), &RemoteSettings::default(), false);
        assert!(outcome.pushed, "{:?}", outcome.warnings);
        assert!(outcome.warnings.is_empty());
        assert_eq!(remote_tip(&bare, &branch).unwrap(), second.as_str());
    }

    #[test]
    fn test_diverged_branch_needs_force() {
        let repo = TestRepo::new();
        repo.write("a.txt", "a");
        let root = repo.commit("init");
        repo.write("b.txt", "b");
        let pushed = repo.commit("second");
        let (_dir, bare) = add_bare_remote(&repo);
        let branch = repo.vcs.current_branch().unwrap().unwrap();
        assert!(sync_and_push(repo.vcs.as_ref(), &RemoteSettings::default(), false).pushed);

        let mut facade = RepositoryFacade::new(Arc::clone(&repo.vcs), repo.author());
        facade.rollback_working_tree_to(&root).unwrap();
        repo.write("c.txt", "c");
        let rewritten = repo.commit("rewritten");

        let outcome = sync_and_push(repo.vcs.as_ref(), &RemoteSettings::default(), false);
        assert!(!outcome.pushed);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("diverged"));
        assert_eq!(remote_tip(&bare, &branch).unwrap(), pushed.as_str());

        let outcome = sync_and_push(repo.vcs.as_ref(), &RemoteSettings::default(), true);
        assert!(outcome.pushed, "{:?}", outcome.warnings);
        assert_eq!(remote_tip(&bare, &branch).unwrap(), rewritten.as_str());
    }

    #[test]
    fn test_unreachable_remote_becomes_warning() {
        let repo = TestRepo::new();
        repo.write("a.txt", "a");
        repo.commit("init");
        let missing = repo.path().join("no-such-remote");
        git2::Repository::open(repo.path())
            .unwrap()
            .remote("origin", missing.to_str().unwrap())
            .unwrap();

        let outcome = sync_and_push(repo.vcs.as_ref(), &RemoteSettings::default(), false);
        assert!(!outcome.pushed);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_push_error_with_current_remote_counts_as_pushed() {
        let repo = TestRepo::new();
        repo.write("a.txt", "a");
        let head = repo.commit("init");
        let vcs = FailingTransport {
            inner: Arc::clone(&repo.vcs),
            reported_tip: Some(head),
        };

        let outcome = sync_and_push(&vcs, &RemoteSettings::default(), false);
        assert!(outcome.pushed);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_push_error_with_stale_remote_warns() {
        let repo = TestRepo::new();
        repo.write("a.txt", "a");
        let first = repo.commit("init");
        repo.write("a.txt", "b");
        repo.commit("second");
        let vcs = FailingTransport {
            inner: Arc::clone(&repo.vcs),
            reported_tip: Some(first),
        };

        let outcome = sync_and_push(&vcs, &RemoteSettings::default(), true);
        assert!(!outcome.pushed);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("unexpected EOF"));
    }
}
