use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Hex object id of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Seven character abbreviation used in messages and listings.
    pub fn short(&self) -> &str {
        &self.0[..7.min(self.0.len())]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Hex object id of a tree or blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub id: CommitId,
    pub message: String,
}

impl CommitRef {
    pub fn new(id: CommitId, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
        }
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// A commit reference the repository has confirmed exists.
///
/// Only [`RepositoryFacade::verify_commit`](crate::facade::RepositoryFacade::verify_commit)
/// hands these out, which is what lets the ledger refuse unverified commits
/// at the type level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCommit(CommitRef);

impl VerifiedCommit {
    pub(crate) fn new_unchecked(commit: CommitRef) -> Self {
        Self(commit)
    }

    pub fn commit(&self) -> &CommitRef {
        &self.0
    }

    pub fn id(&self) -> &CommitId {
        &self.0.id
    }

    pub fn into_inner(self) -> CommitRef {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Matches either the name or the email, case-insensitively.
    pub fn matches(&self, needle: &str) -> bool {
        self.name.eq_ignore_ascii_case(needle) || self.email.eq_ignore_ascii_case(needle)
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Metadata of one commit as read from the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: CommitId,
    pub message: String,
    pub author: Author,
    pub time: DateTime<Utc>,
    pub parents: Vec<CommitId>,
    pub tree: ObjectId,
}

impl CommitInfo {
    pub fn first_parent(&self) -> Option<&CommitId> {
        self.parents.first()
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    pub fn to_ref(&self) -> CommitRef {
        CommitRef::new(self.id.clone(), self.message.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeClassification {
    Added,
    Modified,
    Deleted,
}

impl ChangeClassification {
    pub fn as_str(&self) -> &str {
        match self {
            ChangeClassification::Added => "added",
            ChangeClassification::Modified => "modified",
            ChangeClassification::Deleted => "deleted",
        }
    }

    /// Classification implied by which side of a change has content.
    ///
    /// Returns `None` when neither side exists.
    pub fn from_presence(previous: bool, current: bool) -> Option<Self> {
        match (previous, current) {
            (false, true) => Some(ChangeClassification::Added),
            (true, false) => Some(ChangeClassification::Deleted),
            (true, true) => Some(ChangeClassification::Modified),
            (false, false) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathChange {
    pub path: String,
    pub classification: ChangeClassification,
}

impl PathChange {
    pub fn new(path: impl Into<String>, classification: ChangeClassification) -> Self {
        Self {
            path: path.into(),
            classification,
        }
    }
}

/// Content of one path at a commit and at its first parent.
#[derive(Debug, Clone)]
pub struct PathDiff {
    pub path: String,
    pub current: Option<Vec<u8>>,
    pub previous: Option<Vec<u8>>,
    pub classification: ChangeClassification,
}

impl PathDiff {
    pub fn current_digest(&self) -> Option<String> {
        self.current.as_deref().map(content_digest)
    }

    pub fn previous_digest(&self) -> Option<String> {
        self.previous.as_deref().map(content_digest)
    }
}

/// SHA-256 of some content, hex encoded.
pub fn content_digest(content: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// One entry of a tree-to-tree diff. A missing side means the path does not
/// exist in that tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeDelta {
    pub path: String,
    pub old: Option<ObjectId>,
    pub new: Option<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile {
    pub path: String,
    pub blob: ObjectId,
}

/// Presence of a path in HEAD, the index and the working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub path: String,
    pub head: bool,
    pub index: bool,
    pub workdir: bool,
}

impl StatusEntry {
    /// Present only in the working copy.
    pub fn is_untracked(&self) -> bool {
        self.workdir && !self.head && !self.index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Add,
    Update,
    Delete,
    Move,
    Organize,
    Prune,
}

impl OperationKind {
    pub fn as_str(&self) -> &str {
        match self {
            OperationKind::Add => "add",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Move => "move",
            OperationKind::Organize => "organize",
            OperationKind::Prune => "prune",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(OperationKind::Add),
            "update" => Some(OperationKind::Update),
            "delete" => Some(OperationKind::Delete),
            "move" => Some(OperationKind::Move),
            "organize" => Some(OperationKind::Organize),
            "prune" => Some(OperationKind::Prune),
            _ => None,
        }
    }

    /// Operations that feed the content-generation pipeline.
    pub fn produces_derived(&self) -> bool {
        matches!(self, OperationKind::Add | OperationKind::Update)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied description of an operation, before it is timestamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub operation: OperationKind,
    pub path: String,
    pub previous_path: Option<String>,
    pub title: Option<String>,
    pub user: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

impl EntryDraft {
    pub fn new(operation: OperationKind, path: impl Into<String>) -> Self {
        Self {
            operation,
            path: path.into(),
            previous_path: None,
            title: None,
            user: None,
            category: None,
            tags: Vec::new(),
        }
    }

    pub fn with_previous_path(mut self, path: impl Into<String>) -> Self {
        self.previous_path = Some(path.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// One recorded operation. Entries are append-only and never change after
/// they are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub operation: OperationKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub commit: Option<CommitRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_commit: Option<CommitRef>,
}

impl TimelineEntry {
    /// Final path component of `path`.
    pub fn file_name(&self) -> &str {
        file_name(&self.path)
    }
}

/// Final component of a `/`-separated repository path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
