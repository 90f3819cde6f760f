//! Lineage between a raw-input commit and the derived-artifact commit
//! generated from it.
//!
//! The ledger's explicit `derived_commit` link is authoritative. For entries
//! recorded without one, the resolver falls back to scanning recent commit
//! messages for the wording the generation pipeline uses. A heuristic miss
//! means "cannot auto-link", not "no derived commit exists".

use crate::error::Result;
use crate::facade::RepositoryFacade;
use crate::ledger::TimelineLedger;
use crate::models::{file_name, CommitId, CommitRef, OperationKind, TimelineEntry};
use crate::vcs::VcsPrimitives;
use tracing::{debug, info};

/// Message prefixes the generation pipeline writes, each followed by the
/// source file's name.
pub const DERIVED_MESSAGE_PREFIXES: &[&str] = &[
    "Knowledge Base Update: ",
    "Knowledge base update for ",
    "Generated knowledge from ",
    "Processed ",
    "Process ",
    "Derived from ",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub source: Option<CommitRef>,
    pub derived: Option<CommitRef>,
    /// The derived commit came from message matching, not a stored link.
    pub heuristic: bool,
}

pub struct LineageResolver<'a, V: VcsPrimitives> {
    facade: &'a RepositoryFacade<V>,
    ledger: &'a TimelineLedger,
    search_depth: usize,
}

impl<'a, V: VcsPrimitives> LineageResolver<'a, V> {
    pub fn new(
        facade: &'a RepositoryFacade<V>,
        ledger: &'a TimelineLedger,
        search_depth: usize,
    ) -> Self {
        Self {
            facade,
            ledger,
            search_depth,
        }
    }

    /// Commit of the most recent `Add` entry for `path`.
    pub fn find_upload_commit(&self, path: &str) -> Option<CommitRef> {
        self.ledger
            .latest_for_path(path, &[OperationKind::Add])
            .and_then(|entry| entry.commit.clone())
    }

    /// Scan the newest `depth` commits for a message naming `source_filename`.
    ///
    /// The scan stops at `near_commit` (the upload), since a derived commit
    /// cannot predate its source. `author` matches the commit author's name
    /// or email.
    pub fn find_derived_commit(
        &self,
        source_filename: &str,
        near_commit: Option<&CommitId>,
        author: Option<&str>,
        depth: usize,
    ) -> Result<Option<CommitRef>> {
        let name = file_name(source_filename);
        let stop_at = match near_commit {
            Some(id) => self.facade.read_commit(id)?.map(|info| info.id),
            None => None,
        };

        for commit in self.facade.recent_commits(depth)? {
            if stop_at.as_ref() == Some(&commit.id) {
                break;
            }
            if author.is_some_and(|author| !commit.author.matches(author)) {
                continue;
            }
            if message_names_source(&commit.message, name) {
                info!(
                    source = name,
                    commit = %commit.id,
                    heuristic = true,
                    "matched derived commit by message"
                );
                return Ok(Some(commit.to_ref()));
            }
        }

        debug!(source = name, depth, "no derived commit matched");
        Ok(None)
    }

    /// The commit the upload was made on top of; `None` for a root upload.
    pub fn find_commit_before_upload(&self, upload: &CommitId) -> Result<Option<CommitRef>> {
        self.facade.first_parent(upload)
    }

    /// Source and derived commits for one ledger entry.
    ///
    /// A stored link always wins; the message heuristic only runs for
    /// entries that feed generation and carry no link.
    pub fn resolve(&self, entry: &TimelineEntry) -> Result<Lineage> {
        if let Some(derived) = &entry.derived_commit {
            return Ok(Lineage {
                source: entry.commit.clone(),
                derived: Some(derived.clone()),
                heuristic: false,
            });
        }

        let Some(source) = &entry.commit else {
            return Ok(Lineage {
                source: None,
                derived: None,
                heuristic: false,
            });
        };

        if !entry.operation.produces_derived() {
            return Ok(Lineage {
                source: Some(source.clone()),
                derived: None,
                heuristic: false,
            });
        }

        let derived =
            self.find_derived_commit(&entry.path, Some(&source.id), None, self.search_depth)?;
        Ok(Lineage {
            source: Some(source.clone()),
            heuristic: derived.is_some(),
            derived,
        })
    }
}

/// True when a line of `message` is one of the known prefixes followed by
/// `name` and then nothing, whitespace or punctuation.
fn message_names_source(message: &str, name: &str) -> bool {
    let name = name.to_lowercase();
    message.lines().any(|line| {
        let line = line.trim().to_lowercase();
        DERIVED_MESSAGE_PREFIXES.iter().any(|prefix| {
            line.strip_prefix(&prefix.to_lowercase())
                .and_then(|rest| rest.strip_prefix(name.as_str()))
                .is_some_and(|rest| {
                    rest.chars()
                        .next()
                        .map_or(true, |c| c.is_whitespace() || matches!(c, '(' | ',' | ':' | ';'))
                })
        })
    })
}
