//! Timeline ledger: the append-only record of operations and the commits
//! they produced.
//!
//! Writing is two-phase. [`TimelineLedger::prepare`] allocates an id and a
//! timestamp before the underlying commit exists; [`TimelineLedger::finalize`]
//! attaches the commit once it does and persists the entry. Only a
//! [`VerifiedCommit`] is accepted, so a persisted entry always points at a
//! commit the repository confirmed. A prepared entry that is never finalized
//! leaves no trace.
//!
//! The ledger is a single JSON document that is rewritten in full on every
//! finalize.

use crate::error::{Error, Result};
use crate::models::{EntryDraft, OperationKind, TimelineEntry, VerifiedCommit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const LEDGER_FILE: &str = "timeline.json";

const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct TimelineDocument {
    version: u32,
    entries: Vec<TimelineEntry>,
}

/// An entry with its id and timestamp allocated but no commit yet.
///
/// Not `Clone`: it can be finalized at most once.
#[derive(Debug)]
pub struct PreparedEntry {
    entry: TimelineEntry,
}

impl PreparedEntry {
    pub fn id(&self) -> Uuid {
        self.entry.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.entry.timestamp
    }

    pub fn operation(&self) -> OperationKind {
        self.entry.operation
    }

    pub fn path(&self) -> &str {
        &self.entry.path
    }

    /// Record the derived-artifact commit generated from this entry's
    /// source commit.
    pub fn link_derived(mut self, derived: VerifiedCommit) -> Self {
        self.entry.derived_commit = Some(derived.into_inner());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimelineQuery {
    pub operation: Option<OperationKind>,
    pub user: Option<String>,
    pub category: Option<String>,
    pub path: Option<String>,
    pub tag: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl TimelineQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation(mut self, operation: OperationKind) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &TimelineEntry) -> bool {
        if self.operation.is_some_and(|op| op != entry.operation) {
            return false;
        }
        if self.user.is_some() && self.user != entry.user {
            return false;
        }
        if self.category.is_some() && self.category != entry.category {
            return false;
        }
        if self.path.as_ref().is_some_and(|path| *path != entry.path) {
            return false;
        }
        if self.tag.as_ref().is_some_and(|tag| !entry.tags.contains(tag)) {
            return false;
        }
        if self.since.is_some_and(|since| entry.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| entry.timestamp > until) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct TimelinePage {
    /// Size of the filtered set before paging.
    pub total: usize,
    pub entries: Vec<TimelineEntry>,
}

pub struct TimelineLedger {
    path: Option<PathBuf>,
    entries: Vec<TimelineEntry>,
}

impl TimelineLedger {
    /// Load the ledger document at `path`. A missing file is an empty ledger.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read(&path) {
            Ok(bytes) => {
                let document: TimelineDocument = serde_json::from_slice(&bytes)?;
                if document.version > DOCUMENT_VERSION {
                    return Err(Error::InvalidOperation(format!(
                        "ledger version {} is newer than supported version {}",
                        document.version, DOCUMENT_VERSION
                    )));
                }
                document.entries
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = entries.len(), "loaded timeline ledger");
        Ok(Self {
            path: Some(path),
            entries,
        })
    }

    /// A ledger that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Vec::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn prepare(&self, draft: EntryDraft) -> PreparedEntry {
        self.prepare_at(draft, Utc::now())
    }

    pub fn prepare_at(&self, draft: EntryDraft, timestamp: DateTime<Utc>) -> PreparedEntry {
        PreparedEntry {
            entry: TimelineEntry {
                id: Uuid::new_v4(),
                timestamp,
                operation: draft.operation,
                path: draft.path,
                previous_path: draft.previous_path,
                title: draft.title,
                user: draft.user,
                category: draft.category,
                tags: draft.tags,
                commit: None,
                derived_commit: None,
            },
        }
    }

    /// Attach the commit, append the entry and rewrite the document.
    ///
    /// If the write fails the entry is not kept in memory either.
    pub fn finalize(
        &mut self,
        prepared: PreparedEntry,
        commit: VerifiedCommit,
    ) -> Result<TimelineEntry> {
        let mut entry = prepared.entry;
        if self.entries.iter().any(|e| e.id == entry.id) {
            return Err(Error::InvalidOperation(format!(
                "timeline entry {} already finalized",
                entry.id
            )));
        }
        entry.commit = Some(commit.into_inner());

        self.entries.push(entry.clone());
        if let Err(e) = self.persist() {
            self.entries.pop();
            return Err(e);
        }

        info!(
            entry = %entry.id,
            operation = %entry.operation,
            path = %entry.path,
            "timeline entry recorded"
        );
        Ok(entry)
    }

    /// Attach a derived commit to an entry that is already recorded,
    /// replacing any earlier link, and rewrite the document.
    pub fn link_derived(&mut self, id: &Uuid, derived: VerifiedCommit) -> Result<TimelineEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| &e.id == id)
            .ok_or(Error::EntryNotFound(*id))?;

        let previous = self.entries[index]
            .derived_commit
            .replace(derived.into_inner());
        if let Err(e) = self.persist() {
            self.entries[index].derived_commit = previous;
            return Err(e);
        }

        let entry = self.entries[index].clone();
        info!(
            entry = %entry.id,
            derived = %entry.derived_commit.as_ref().map(|c| c.id.as_str()).unwrap_or_default(),
            replaced = previous.is_some(),
            "derived commit linked"
        );
        Ok(entry)
    }

    pub fn query(&self, query: &TimelineQuery) -> TimelinePage {
        let filtered: Vec<&TimelineEntry> = self
            .newest_first()
            .into_iter()
            .filter(|entry| query.matches(entry))
            .collect();

        let total = filtered.len();
        let limit = query.limit.unwrap_or(usize::MAX);
        let entries = filtered
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .cloned()
            .collect();

        TimelinePage { total, entries }
    }

    pub fn get(&self, id: &Uuid) -> Option<&TimelineEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Entries in the order they were appended.
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by timestamp, newest first; later appends win ties.
    pub fn newest_first(&self) -> Vec<&TimelineEntry> {
        let mut entries: Vec<&TimelineEntry> = self.entries.iter().rev().collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    /// The `n` most recent entries that carry a commit.
    pub fn latest(&self, n: usize) -> Vec<&TimelineEntry> {
        self.newest_first()
            .into_iter()
            .filter(|e| e.commit.is_some())
            .take(n)
            .collect()
    }

    /// Most recent committed entry for `path` with one of `kinds`.
    pub fn latest_for_path(&self, path: &str, kinds: &[OperationKind]) -> Option<&TimelineEntry> {
        self.newest_first()
            .into_iter()
            .find(|e| e.commit.is_some() && e.path == path && kinds.contains(&e.operation))
    }

    pub fn oldest_committed(&self) -> Option<&TimelineEntry> {
        self.newest_first()
            .into_iter()
            .rev()
            .find(|e| e.commit.is_some())
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let document = TimelineDocument {
            version: DOCUMENT_VERSION,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_vec_pretty(&document)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
