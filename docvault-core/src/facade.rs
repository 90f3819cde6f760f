//! Repository facade: change classification, content at a revision,
//! single-commit revert and hard rollback.
//!
//! Everything here follows first parents only. Merge commits are diffed
//! against their first parent and nothing else.

use crate::error::{Error, Result};
use crate::models::{
    Author, ChangeClassification, CommitId, CommitInfo, CommitRef, PathChange, PathDiff, TreeFile,
    VerifiedCommit,
};
use crate::vcs::VcsPrimitives;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// A path the commit being reverted touched that a newer commit touched too.
/// Reverting anyway overwrites the newer change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertConflict {
    pub path: String,
    pub later_commit: CommitRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackReport {
    pub target: CommitRef,
    /// Branch moved to the target, `None` when HEAD was detached.
    pub branch: Option<String>,
    /// Untracked paths deleted from the working copy.
    pub removed: Vec<String>,
}

struct HistorySnapshot {
    head: CommitId,
    commits: Arc<Vec<CommitInfo>>,
}

pub struct RepositoryFacade<V: VcsPrimitives> {
    vcs: Arc<V>,
    author: Author,
    history: Mutex<Option<HistorySnapshot>>,
}

impl<V: VcsPrimitives> RepositoryFacade<V> {
    pub fn new(vcs: Arc<V>, author: Author) -> Self {
        Self {
            vcs,
            author,
            history: Mutex::new(None),
        }
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn workdir(&self) -> &Path {
        self.vcs.workdir()
    }

    pub fn head(&self) -> Result<Option<CommitId>> {
        self.vcs.head()
    }

    pub fn read_commit(&self, id: &CommitId) -> Result<Option<CommitInfo>> {
        self.vcs.read_commit(id)
    }

    pub fn require_commit(&self, id: &CommitId) -> Result<CommitInfo> {
        self.vcs
            .read_commit(id)?
            .ok_or_else(|| Error::CommitNotFound(id.clone()))
    }

    /// Confirm a commit exists, producing the proof the ledger asks for.
    pub fn verify_commit(&self, id: &CommitId) -> Result<VerifiedCommit> {
        let info = self.require_commit(id)?;
        Ok(VerifiedCommit::new_unchecked(info.to_ref()))
    }

    pub fn first_parent(&self, id: &CommitId) -> Result<Option<CommitRef>> {
        let info = self.require_commit(id)?;
        match info.first_parent() {
            Some(parent) => Ok(Some(self.require_commit(parent)?.to_ref())),
            None => Ok(None),
        }
    }

    /// Follow first parents down to the root commit.
    pub fn root_of(&self, id: &CommitId) -> Result<CommitInfo> {
        let mut current = self.require_commit(id)?;
        while let Some(parent) = current.first_parent().cloned() {
            current = self.require_commit(&parent)?;
        }
        Ok(current)
    }

    /// Paths changed by `commit` relative to its first parent, sorted by path.
    ///
    /// A root commit reports every path as added. Paths whose content is
    /// identical on both sides are omitted.
    pub fn classify_path_changes(&self, commit: &CommitId) -> Result<Vec<PathChange>> {
        let info = self.require_commit(commit)?;
        let parent_tree = match info.first_parent() {
            Some(parent) => Some(self.require_commit(parent)?.tree),
            None => None,
        };

        let mut changes: Vec<PathChange> = self
            .vcs
            .diff_trees(parent_tree.as_ref(), &info.tree)?
            .into_iter()
            .filter_map(|delta| {
                let classification = match (&delta.old, &delta.new) {
                    (None, Some(_)) => ChangeClassification::Added,
                    (Some(_), None) => ChangeClassification::Deleted,
                    (Some(old), Some(new)) if old != new => ChangeClassification::Modified,
                    _ => return None,
                };
                Some(PathChange::new(delta.path, classification))
            })
            .collect();

        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    /// Content of `path` at `commit`; `None` when it does not exist there.
    pub fn content_at_revision(&self, commit: &CommitId, path: &str) -> Result<Option<Vec<u8>>> {
        self.vcs.read_content_at(commit, path)
    }

    /// Content of `path` at `commit` and at its first parent.
    ///
    /// Returns `None` when the path exists on neither side.
    pub fn diff_for_path(&self, commit: &CommitId, path: &str) -> Result<Option<PathDiff>> {
        let info = self.require_commit(commit)?;
        let current = self.vcs.read_content_at(&info.id, path)?;
        let previous = match info.first_parent() {
            Some(parent) => self.vcs.read_content_at(parent, path)?,
            None => None,
        };

        let Some(classification) =
            ChangeClassification::from_presence(previous.is_some(), current.is_some())
        else {
            return Ok(None);
        };

        Ok(Some(PathDiff {
            path: path.to_string(),
            current,
            previous,
            classification,
        }))
    }

    pub fn tree_paths(&self, commit: &CommitId) -> Result<Vec<TreeFile>> {
        let info = self.require_commit(commit)?;
        self.vcs.list_tree(&info.tree)
    }

    /// First-parent history from HEAD, newest first.
    ///
    /// Cached against the HEAD it was read at, so any commit, checkout or
    /// branch move makes the next call re-read it.
    pub fn history(&self) -> Result<Arc<Vec<CommitInfo>>> {
        let Some(head) = self.vcs.head()? else {
            return Ok(Arc::new(Vec::new()));
        };

        let mut cache = self
            .history
            .lock()
            .map_err(|_| Error::Lock("history cache poisoned".into()))?;

        if let Some(snapshot) = cache.as_ref() {
            if snapshot.head == head {
                return Ok(Arc::clone(&snapshot.commits));
            }
        }

        let commits = Arc::new(self.vcs.log(None)?);
        *cache = Some(HistorySnapshot {
            head,
            commits: Arc::clone(&commits),
        });
        Ok(commits)
    }

    pub fn recent_commits(&self, depth: usize) -> Result<Vec<CommitInfo>> {
        Ok(self.history()?.iter().take(depth).cloned().collect())
    }

    pub fn is_in_history(&self, commit: &CommitId) -> Result<bool> {
        let Some(info) = self.read_commit(commit)? else {
            return Ok(false);
        };
        Ok(self.history()?.iter().any(|c| c.id == info.id))
    }

    fn invalidate_history(&self) {
        if let Ok(mut cache) = self.history.lock() {
            *cache = None;
        }
    }

    /// Paths `commit` touched that newer first-parent commits touched again.
    ///
    /// Reverting `commit` restores its parent's content for those paths and
    /// therefore discards the newer changes. Nothing is enforced here; the
    /// result is for callers to show before they revert.
    pub fn revert_conflicts(&self, commit: &CommitId) -> Result<Vec<RevertConflict>> {
        let info = self.require_commit(commit)?;
        let touched: HashSet<String> = self
            .classify_path_changes(&info.id)?
            .into_iter()
            .map(|change| change.path)
            .collect();

        let history = self.history()?;
        let position = history
            .iter()
            .position(|c| c.id == info.id)
            .ok_or_else(|| Error::NotInHistory(info.id.clone()))?;

        let mut conflicts = Vec::new();
        for later in history[..position].iter().rev() {
            for change in self.classify_path_changes(&later.id)? {
                if touched.contains(&change.path) {
                    conflicts.push(RevertConflict {
                        path: change.path,
                        later_commit: later.to_ref(),
                    });
                }
            }
        }
        Ok(conflicts)
    }

    /// Undo one commit by restoring its parent's content for every path it
    /// changed, then commit the result.
    ///
    /// This is content restoration, not a three-way revert: if a newer
    /// commit also changed one of those paths, that newer change is
    /// overwritten. Use [`revert_conflicts`](Self::revert_conflicts) first to
    /// find out.
    pub fn revert_single_commit(&mut self, commit: &CommitId) -> Result<CommitRef> {
        let info = self.require_commit(commit)?;
        let parent = info
            .first_parent()
            .cloned()
            .ok_or_else(|| Error::RootCommitRevert(info.id.clone()))?;

        let changes = self.classify_path_changes(&info.id)?;
        let head = self.head()?;

        let mut touched = Vec::new();
        let applied = self
            .restore_parent_content(&parent, &changes, &mut touched)
            .and_then(|_| {
                let message = format!(
                    "Revert \"{}\"\n\nThis reverts commit {}.\n",
                    info.summary(),
                    info.id
                );
                self.commit_all(&message)
            });
        let reverted = match applied {
            Ok(reverted) => reverted,
            Err(e) => {
                warn!(commit = %info.id, error = %e, "revert failed; discarding partial changes");
                self.discard_changes(head.as_ref(), &touched);
                return Err(e);
            }
        };

        info!(
            reverted = %info.id,
            commit = %reverted.id,
            paths = changes.len(),
            "reverted commit"
        );
        Ok(reverted)
    }

    /// Put every path `changes` names back to its `parent` state, recording
    /// each path once it has been written or removed.
    fn restore_parent_content(
        &self,
        parent: &CommitId,
        changes: &[PathChange],
        touched: &mut Vec<String>,
    ) -> Result<()> {
        let workdir = self.workdir().to_path_buf();
        for change in changes {
            match change.classification {
                ChangeClassification::Added => {
                    debug!(path = %change.path, "removing path added by reverted commit");
                    remove_path(&workdir, &change.path)?;
                }
                ChangeClassification::Deleted | ChangeClassification::Modified => {
                    match self.vcs.read_content_at(parent, &change.path)? {
                        Some(content) => {
                            debug!(path = %change.path, "restoring parent content");
                            write_path(&workdir, &change.path, &content)?;
                        }
                        None => {
                            warn!(
                                path = %change.path,
                                parent = %parent,
                                "parent revision has no content for changed path"
                            );
                            continue;
                        }
                    }
                }
            }
            touched.push(change.path.clone());
        }
        Ok(())
    }

    /// Return `paths` to their HEAD content so a failed revert leaves nothing
    /// behind for the next commit to pick up.
    fn discard_changes(&self, head: Option<&CommitId>, paths: &[String]) {
        let workdir = self.workdir();
        for path in paths {
            let content = match head {
                Some(head) => self.vcs.read_content_at(head, path),
                None => Ok(None),
            };
            let restored = match content {
                Ok(Some(content)) => write_path(workdir, path, &content),
                Ok(None) => remove_path(workdir, path),
                Err(e) => Err(e),
            };
            if let Err(e) = restored {
                warn!(path = %path, error = %e, "could not discard partial revert");
            }
        }
    }

    /// Force the working copy (and the current branch, if any) to `commit`,
    /// deleting every untracked file and directory.
    pub fn rollback_working_tree_to(&mut self, commit: &CommitId) -> Result<RollbackReport> {
        let target = self.require_commit(commit)?;
        let branch = self.vcs.current_branch()?;

        self.vcs.checkout(&target.id, true)?;
        if let Some(branch) = &branch {
            self.vcs.set_branch_target(branch, &target.id)?;
        }

        let workdir = self.workdir().to_path_buf();
        let mut removed = Vec::new();
        for entry in self.vcs.status_entries()? {
            if entry.is_untracked() {
                debug!(path = %entry.path, "removing untracked path");
                remove_untracked(&workdir, &entry.path)?;
                removed.push(entry.path);
            }
        }

        self.invalidate_history();
        info!(
            commit = %target.id,
            branch = branch.as_deref().unwrap_or("(detached)"),
            removed = removed.len(),
            "rolled working tree back"
        );

        Ok(RollbackReport {
            target: target.to_ref(),
            branch,
            removed,
        })
    }

    /// Stage everything in the working copy and commit it.
    pub fn commit_all(&mut self, message: &str) -> Result<CommitRef> {
        self.vcs.stage_all()?;
        let id = self.vcs.create_commit(message, &self.author)?;
        self.invalidate_history();
        Ok(CommitRef::new(id, message))
    }
}

fn full_path(workdir: &Path, path: &str) -> PathBuf {
    workdir.join(path.trim_end_matches('/'))
}

pub(crate) fn write_path(workdir: &Path, path: &str, content: &[u8]) -> Result<()> {
    let full = full_path(workdir, path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(full, content)?;
    Ok(())
}

/// Remove a file, then any directories it leaves empty.
pub(crate) fn remove_path(workdir: &Path, path: &str) -> Result<()> {
    let full = full_path(workdir, path);
    match fs::remove_file(&full) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    }
    prune_empty_dirs(workdir, full.parent());
    Ok(())
}

fn remove_untracked(workdir: &Path, path: &str) -> Result<()> {
    let full = full_path(workdir, path);
    match fs::symlink_metadata(&full) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(&full)?,
        Ok(_) => fs::remove_file(&full)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn prune_empty_dirs(workdir: &Path, mut dir: Option<&Path>) {
    while let Some(current) = dir {
        if current == workdir || !current.starts_with(workdir) {
            break;
        }
        if fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}
