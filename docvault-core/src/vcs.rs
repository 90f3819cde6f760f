//! Version-control primitives.
//!
//! [`VcsPrimitives`] is the narrow contract the rest of the crate is written
//! against. [`GitPrimitives`] implements it on top of libgit2. A handle is
//! constructed explicitly and injected into each
//! [`RepositoryFacade`](crate::facade::RepositoryFacade); nothing is cached
//! at module scope.

use crate::error::{Error, Result};
use crate::models::{Author, CommitId, CommitInfo, ObjectId, StatusEntry, TreeDelta, TreeFile};
use chrono::DateTime;
use git2::{
    build::CheckoutBuilder, Cred, CredentialType, Direction, ErrorCode, FetchOptions,
    IndexAddOption, ObjectType, Oid, PushOptions, RemoteCallbacks, Repository, Signature, Sort,
    StatusOptions, StatusShow, TreeWalkMode, TreeWalkResult,
};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Directory under the git metadata area that holds the ledger and config.
pub const METADATA_DIR: &str = "docvault";

pub trait VcsPrimitives: Send + Sync {
    /// Root of the working copy.
    fn workdir(&self) -> &Path;

    /// Directory for docvault's own files. Never part of the working copy.
    fn metadata_dir(&self) -> PathBuf;

    fn head(&self) -> Result<Option<CommitId>>;

    /// `None` when the id does not name a commit.
    fn read_commit(&self, id: &CommitId) -> Result<Option<CommitInfo>>;

    /// `None` when the commit or the path does not exist.
    fn read_content_at(&self, commit: &CommitId, path: &str) -> Result<Option<Vec<u8>>>;

    /// Diff two trees; `old = None` diffs against the empty tree.
    fn diff_trees(&self, old: Option<&ObjectId>, new: &ObjectId) -> Result<Vec<TreeDelta>>;

    /// Every file reachable from a tree.
    fn list_tree(&self, tree: &ObjectId) -> Result<Vec<TreeFile>>;

    /// Check out a commit and detach HEAD at it.
    fn checkout(&self, commit: &CommitId, force: bool) -> Result<()>;

    /// Paths whose state differs between HEAD, index and working copy.
    /// Untracked directories are reported once, with a trailing `/`.
    fn status_entries(&self) -> Result<Vec<StatusEntry>>;

    /// Stage every addition, modification and deletion in the working copy.
    fn stage_all(&self) -> Result<()>;

    /// Commit the index on top of HEAD.
    fn create_commit(&self, message: &str, author: &Author) -> Result<CommitId>;

    /// Point a branch at a commit and attach HEAD to it.
    fn set_branch_target(&self, branch: &str, commit: &CommitId) -> Result<()>;

    /// `None` when HEAD is detached or unborn.
    fn current_branch(&self) -> Result<Option<String>>;

    /// First-parent history from HEAD, newest first.
    fn log(&self, depth: Option<usize>) -> Result<Vec<CommitInfo>>;

    fn has_remote(&self, name: &str) -> Result<bool>;

    /// Fetch one branch; returns the remote-tracking tip, if any.
    fn fetch(&self, remote: &str, branch: &str) -> Result<Option<CommitId>>;

    /// Ask the remote where a branch points, without fetching objects.
    fn remote_branch_tip(&self, remote: &str, branch: &str) -> Result<Option<CommitId>>;

    fn push(&self, remote: &str, branch: &str, force: bool) -> Result<()>;

    /// True when `commit` strictly descends from `ancestor`.
    fn is_descendant_of(&self, commit: &CommitId, ancestor: &CommitId) -> Result<bool>;
}

/// libgit2-backed primitives for one repository.
pub struct GitPrimitives {
    repo: Mutex<Repository>,
    root: PathBuf,
    git_dir: PathBuf,
}

impl GitPrimitives {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_repository(Repository::open(path)?)
    }

    /// Open the repository at `path`, creating it if needed.
    pub fn init<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = match Repository::open(path.as_ref()) {
            Ok(repo) => repo,
            Err(e) if e.code() == ErrorCode::NotFound => Repository::init(path)?,
            Err(e) => return Err(e.into()),
        };
        Self::from_repository(repo)
    }

    fn from_repository(repo: Repository) -> Result<Self> {
        let root = repo
            .workdir()
            .ok_or_else(|| Error::InvalidOperation("bare repositories are not supported".into()))?
            .to_path_buf();
        let git_dir = repo.path().to_path_buf();
        Ok(Self {
            repo: Mutex::new(repo),
            root,
            git_dir,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Repository>> {
        self.repo
            .lock()
            .map_err(|_| Error::Lock("repository handle poisoned".into()))
    }
}

impl VcsPrimitives for GitPrimitives {
    fn workdir(&self) -> &Path {
        &self.root
    }

    fn metadata_dir(&self) -> PathBuf {
        self.git_dir.join(METADATA_DIR)
    }

    fn head(&self) -> Result<Option<CommitId>> {
        let repo = self.lock()?;
        Ok(head_oid(&repo)?.map(|oid| CommitId::new(oid.to_string())))
    }

    fn read_commit(&self, id: &CommitId) -> Result<Option<CommitInfo>> {
        let repo = self.lock()?;
        let info = find_commit(&repo, id)?.map(|commit| commit_info(&commit));
        Ok(info)
    }

    fn read_content_at(&self, commit: &CommitId, path: &str) -> Result<Option<Vec<u8>>> {
        let repo = self.lock()?;
        let Some(commit) = find_commit(&repo, commit)? else {
            return Ok(None);
        };
        let tree = commit.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }
        let blob = repo.find_blob(entry.id())?;
        Ok(Some(blob.content().to_vec()))
    }

    fn diff_trees(&self, old: Option<&ObjectId>, new: &ObjectId) -> Result<Vec<TreeDelta>> {
        let repo = self.lock()?;
        let old_tree = match old {
            Some(id) => Some(repo.find_tree(parse_oid(id.as_str())?)?),
            None => None,
        };
        let new_tree = repo.find_tree(parse_oid(new.as_str())?)?;
        let diff = repo.diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), None)?;

        let mut deltas = Vec::new();
        for delta in diff.deltas() {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(repo_path);
            let Some(path) = path else {
                continue;
            };
            deltas.push(TreeDelta {
                path,
                old: blob_side(&delta.old_file()),
                new: blob_side(&delta.new_file()),
            });
        }
        Ok(deltas)
    }

    fn list_tree(&self, tree: &ObjectId) -> Result<Vec<TreeFile>> {
        let repo = self.lock()?;
        let tree = repo.find_tree(parse_oid(tree.as_str())?)?;
        let mut files = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    files.push(TreeFile {
                        path: format!("{root}{name}"),
                        blob: ObjectId::new(entry.id().to_string()),
                    });
                }
            }
            TreeWalkResult::Ok
        })?;
        Ok(files)
    }

    fn checkout(&self, commit: &CommitId, force: bool) -> Result<()> {
        let repo = self.lock()?;
        let target = find_commit(&repo, commit)?.ok_or_else(|| Error::CommitNotFound(commit.clone()))?;

        let mut builder = CheckoutBuilder::new();
        if force {
            builder.force();
        } else {
            builder.safe();
        }
        repo.checkout_tree(target.as_object(), Some(&mut builder))?;
        repo.set_head_detached(target.id())?;
        Ok(())
    }

    fn status_entries(&self) -> Result<Vec<StatusEntry>> {
        let repo = self.lock()?;

        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(false)
            .include_ignored(false)
            .show(StatusShow::IndexAndWorkdir);

        let statuses = repo.statuses(Some(&mut opts))?;
        let mut result = Vec::with_capacity(statuses.len());

        for entry in statuses.iter() {
            let Some(path) = entry.path() else {
                continue;
            };
            let s = entry.status();
            if s.is_ignored() {
                continue;
            }
            result.push(StatusEntry {
                path: path.to_string(),
                head: !s.is_index_new() && (!s.is_wt_new() || s.is_index_deleted()),
                index: !s.is_index_deleted() && !s.is_wt_new(),
                workdir: !s.is_wt_deleted() && (!s.is_index_deleted() || s.is_wt_new()),
            });
        }

        Ok(result)
    }

    fn stage_all(&self) -> Result<()> {
        let repo = self.lock()?;
        let mut index = repo.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"], None)?;
        index.write()?;
        Ok(())
    }

    fn create_commit(&self, message: &str, author: &Author) -> Result<CommitId> {
        if message.trim().is_empty() {
            return Err(Error::InvalidOperation("commit message cannot be empty".into()));
        }

        let repo = self.lock()?;
        let mut index = repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = repo.find_tree(tree_oid)?;
        let sig = Signature::now(&author.name, &author.email)?;

        let parent = match head_oid(&repo)? {
            Some(oid) => Some(repo.find_commit(oid)?),
            None => None,
        };
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        Ok(CommitId::new(oid.to_string()))
    }

    fn set_branch_target(&self, branch: &str, commit: &CommitId) -> Result<()> {
        let repo = self.lock()?;
        let target = find_commit(&repo, commit)?.ok_or_else(|| Error::CommitNotFound(commit.clone()))?;
        let refname = format!("refs/heads/{branch}");
        repo.reference(
            &refname,
            target.id(),
            true,
            &format!("docvault: move {branch} to {}", target.id()),
        )?;
        repo.set_head(&refname)?;
        Ok(())
    }

    fn current_branch(&self) -> Result<Option<String>> {
        let repo = self.lock()?;

        let branch = match repo.head() {
            Ok(head) if head.is_branch() => head.shorthand().map(|s| s.to_string()),
            _ => None,
        };
        Ok(branch)
    }

    fn log(&self, depth: Option<usize>) -> Result<Vec<CommitInfo>> {
        let repo = self.lock()?;

        let Some(head) = head_oid(&repo)? else {
            return Ok(Vec::new());
        };

        let mut revwalk = repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL)?;
        revwalk.simplify_first_parent()?;
        revwalk.push(head)?;

        let limit = depth.unwrap_or(usize::MAX);
        let mut entries = Vec::new();

        for oid in revwalk.take(limit) {
            let commit = repo.find_commit(oid?)?;
            entries.push(commit_info(&commit));
        }

        Ok(entries)
    }

    fn has_remote(&self, name: &str) -> Result<bool> {
        let repo = self.lock()?;
        let found = match repo.find_remote(name) {
            Ok(_) => true,
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => false,
            Err(e) => return Err(e.into()),
        };
        Ok(found)
    }

    fn fetch(&self, remote_name: &str, branch: &str) -> Result<Option<CommitId>> {
        let repo = self.lock()?;
        let mut remote = repo.find_remote(remote_name)?;

        let refspec = format!("+refs/heads/{branch}:refs/remotes/{remote_name}/{branch}");
        let mut options = FetchOptions::new();
        options.remote_callbacks(remote_callbacks());
        remote.fetch(&[refspec.as_str()], Some(&mut options), None)?;

        match repo.refname_to_id(&format!("refs/remotes/{remote_name}/{branch}")) {
            Ok(oid) => Ok(Some(CommitId::new(oid.to_string()))),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remote_branch_tip(&self, remote_name: &str, branch: &str) -> Result<Option<CommitId>> {
        let repo = self.lock()?;
        let mut remote = repo.find_remote(remote_name)?;
        let connection = remote.connect_auth(Direction::Fetch, Some(remote_callbacks()), None)?;

        let refname = format!("refs/heads/{branch}");
        let tip = connection
            .list()?
            .iter()
            .find(|head| head.name() == refname)
            .map(|head| CommitId::new(head.oid().to_string()));
        Ok(tip)
    }

    fn push(&self, remote_name: &str, branch: &str, force: bool) -> Result<()> {
        let repo = self.lock()?;
        let mut remote = repo.find_remote(remote_name)?;

        let prefix = if force { "+" } else { "" };
        let refspec = format!("{prefix}refs/heads/{branch}:refs/heads/{branch}");

        let mut callbacks = remote_callbacks();
        callbacks.push_update_reference(|refname, status| match status {
            Some(message) => Err(git2::Error::from_str(&format!(
                "remote rejected {refname}: {message}"
            ))),
            None => Ok(()),
        });
        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);

        remote.push(&[refspec.as_str()], Some(&mut options))?;
        Ok(())
    }

    fn is_descendant_of(&self, commit: &CommitId, ancestor: &CommitId) -> Result<bool> {
        let repo = self.lock()?;
        Ok(repo.graph_descendant_of(parse_oid(commit.as_str())?, parse_oid(ancestor.as_str())?)?)
    }
}

fn head_oid(repo: &Repository) -> Result<Option<Oid>> {
    match repo.head() {
        Ok(head) => Ok(head.target()),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Resolve a full or abbreviated id (or any rev-spec) to a commit.
fn find_commit<'r>(repo: &'r Repository, id: &CommitId) -> Result<Option<git2::Commit<'r>>> {
    let object = match repo.revparse_single(id.as_str()) {
        Ok(object) => object,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) if matches!(e.code(), ErrorCode::InvalidSpec | ErrorCode::Ambiguous) => {
            return Err(Error::InvalidCommitId(id.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    match object.peel_to_commit() {
        Ok(commit) => Ok(Some(commit)),
        Err(_) => Err(Error::InvalidCommitId(id.to_string())),
    }
}

fn commit_info(commit: &git2::Commit<'_>) -> CommitInfo {
    let author = commit.author();
    CommitInfo {
        id: CommitId::new(commit.id().to_string()),
        message: commit.message().unwrap_or("").to_string(),
        author: Author::new(author.name().unwrap_or(""), author.email().unwrap_or("")),
        time: DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or_default(),
        parents: commit
            .parent_ids()
            .map(|id| CommitId::new(id.to_string()))
            .collect(),
        tree: ObjectId::new(commit.tree_id().to_string()),
    }
}

fn parse_oid(id: &str) -> Result<Oid> {
    Oid::from_str(id).map_err(|_| Error::InvalidCommitId(id.to_string()))
}

fn blob_side(file: &git2::DiffFile<'_>) -> Option<ObjectId> {
    let id = file.id();
    (!id.is_zero()).then(|| ObjectId::new(id.to_string()))
}

fn repo_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn remote_callbacks() -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|url, username, allowed| {
        if allowed.contains(CredentialType::SSH_KEY) {
            if let Some(user) = username {
                return Cred::ssh_key_from_agent(user);
            }
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            if let Ok(config) = git2::Config::open_default() {
                return Cred::credential_helper(&config, url, username);
            }
        }
        Cred::default()
    });
    callbacks
}
