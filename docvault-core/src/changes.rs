//! Projection of ledger entries into revertible changes.
//!
//! One entry yields a source-upload change for its own commit and, when its
//! lineage resolves, a derived-generation change for the commit generated
//! from it.

use crate::error::Result;
use crate::facade::RepositoryFacade;
use crate::ledger::TimelineLedger;
use crate::lineage::LineageResolver;
use crate::models::{CommitId, CommitRef, PathChange, TimelineEntry};
use crate::vcs::VcsPrimitives;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeRole {
    SourceUpload,
    DerivedGeneration,
}

impl ChangeRole {
    /// Suffix used in change ids.
    pub fn as_str(&self) -> &str {
        match self {
            ChangeRole::SourceUpload => "source",
            ChangeRole::DerivedGeneration => "derived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "source" => Some(ChangeRole::SourceUpload),
            "derived" => Some(ChangeRole::DerivedGeneration),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<entry-uuid>:source` or `<entry-uuid>:derived`.
pub fn change_id(entry: &Uuid, role: ChangeRole) -> String {
    format!("{}:{}", entry, role.as_str())
}

/// Split a change id, or a bare entry uuid, into its parts.
pub fn parse_change_id(s: &str) -> Option<(Uuid, Option<ChangeRole>)> {
    match s.split_once(':') {
        Some((entry, role)) => Some((Uuid::parse_str(entry).ok()?, Some(ChangeRole::parse(role)?))),
        None => Some((Uuid::parse_str(s).ok()?, None)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedChange {
    pub id: String,
    pub entry_id: Uuid,
    pub role: ChangeRole,
    pub timestamp: DateTime<Utc>,
    /// Path of the ledger entry (the raw input), for both roles.
    pub path: String,
    pub title: Option<String>,
    pub commit: CommitRef,
    /// The other side of the lineage, when it is reachable from HEAD.
    pub related_commit: Option<CommitId>,
    pub files: Vec<PathChange>,
    /// In first-parent history and not a root commit.
    pub revertible: bool,
    /// The derived side was matched by commit message, not a stored link.
    pub heuristic_link: bool,
}

/// Changes for one entry, source first. Entries without a commit yield none.
pub fn project_entry<V: VcsPrimitives>(
    facade: &RepositoryFacade<V>,
    resolver: &LineageResolver<'_, V>,
    entry: &TimelineEntry,
) -> Result<Vec<DerivedChange>> {
    let lineage = resolver.resolve(entry)?;
    let Some(source) = lineage.source else {
        return Ok(Vec::new());
    };

    let source_reachable = facade.is_in_history(&source.id)?;
    let derived_reachable = match &lineage.derived {
        Some(derived) => facade.is_in_history(&derived.id)?,
        None => false,
    };

    let mut changes = vec![build_change(
        facade,
        entry,
        ChangeRole::SourceUpload,
        source.clone(),
        lineage
            .derived
            .as_ref()
            .filter(|_| derived_reachable)
            .map(|d| d.id.clone()),
        false,
    )?];

    if let Some(derived) = lineage.derived {
        changes.push(build_change(
            facade,
            entry,
            ChangeRole::DerivedGeneration,
            derived,
            Some(source.id).filter(|_| source_reachable),
            lineage.heuristic,
        )?);
    }

    Ok(changes)
}

/// Changes for the newest `limit` committed entries, newest entry first.
pub fn list_changes<V: VcsPrimitives>(
    facade: &RepositoryFacade<V>,
    ledger: &TimelineLedger,
    search_depth: usize,
    limit: usize,
) -> Result<Vec<DerivedChange>> {
    let resolver = LineageResolver::new(facade, ledger, search_depth);
    let mut changes = Vec::new();
    for entry in ledger.latest(limit) {
        changes.extend(project_entry(facade, &resolver, entry)?);
    }
    Ok(changes)
}

fn build_change<V: VcsPrimitives>(
    facade: &RepositoryFacade<V>,
    entry: &TimelineEntry,
    role: ChangeRole,
    commit: CommitRef,
    related_commit: Option<CommitId>,
    heuristic_link: bool,
) -> Result<DerivedChange> {
    let (files, revertible) = match facade.read_commit(&commit.id)? {
        Some(info) => {
            let revertible = !info.is_root() && facade.is_in_history(&info.id)?;
            (facade.classify_path_changes(&info.id)?, revertible)
        }
        None => (Vec::new(), false),
    };

    Ok(DerivedChange {
        id: change_id(&entry.id, role),
        entry_id: entry.id,
        role,
        timestamp: entry.timestamp,
        path: entry.path.clone(),
        title: entry.title.clone(),
        commit,
        related_commit,
        files,
        revertible,
        heuristic_link,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeClassification, EntryDraft, OperationKind};
    use crate::testing::TestRepo;
    use std::sync::Arc;

    #[test]
    fn test_change_id_parsing() {
        let id = Uuid::new_v4();
        assert_eq!(
            parse_change_id(&change_id(&id, ChangeRole::DerivedGeneration)),
            Some((id, Some(ChangeRole::DerivedGeneration)))
        );
        assert_eq!(parse_change_id(&id.to_string()), Some((id, None)));
        assert_eq!(parse_change_id(&format!("{id}:other")), None);
        assert_eq!(parse_change_id("not-a-uuid:source"), None);
    }

    #[test]
    fn test_projection_with_heuristic_lineage() {
        let repo = TestRepo::new();
        repo.write("README.md", "vault");
        repo.commit("init");
        repo.write("raw/doc.md", "raw");
        let upload = repo.commit("Upload doc.md");
        repo.write("knowledge/doc.md", "derived");
        let derived = repo.commit("Knowledge Base Update: doc.md");

        let facade = RepositoryFacade::new(Arc::clone(&repo.vcs), repo.author());
        let mut ledger = TimelineLedger::in_memory();
        let prepared = ledger.prepare(
            EntryDraft::new(OperationKind::Add, "raw/doc.md").with_title("Doc"),
        );
        let entry = ledger
            .finalize(prepared, facade.verify_commit(&upload).unwrap())
            .unwrap();

        let changes = list_changes(&facade, &ledger, 50, 10).unwrap();
        assert_eq!(changes.len(), 2);

        let source = &changes[0];
        assert_eq!(source.id, format!("{}:source", entry.id));
        assert_eq!(source.role, ChangeRole::SourceUpload);
        assert_eq!(source.commit.id, upload);
        assert_eq!(source.related_commit.as_ref(), Some(&derived));
        assert_eq!(
            source.files,
            vec![PathChange::new("raw/doc.md", ChangeClassification::Added)]
        );
        assert!(source.revertible);
        assert!(!source.heuristic_link);

        let generated = &changes[1];
        assert_eq!(generated.id, format!("{}:derived", entry.id));
        assert_eq!(generated.commit.id, derived);
        assert_eq!(generated.related_commit.as_ref(), Some(&upload));
        assert_eq!(generated.path, "raw/doc.md");
        assert_eq!(generated.title.as_deref(), Some("Doc"));
        assert!(generated.heuristic_link);
    }

    #[test]
    fn test_root_commit_is_not_revertible() {
        let repo = TestRepo::new();
        repo.write("raw/first.md", "first");
        let root = repo.commit("Upload first.md");

        let facade = RepositoryFacade::new(Arc::clone(&repo.vcs), repo.author());
        let mut ledger = TimelineLedger::in_memory();
        let prepared = ledger.prepare(EntryDraft::new(OperationKind::Add, "raw/first.md"));
        ledger
            .finalize(prepared, facade.verify_commit(&root).unwrap())
            .unwrap();

        let changes = list_changes(&facade, &ledger, 50, 10).unwrap();
        assert_eq!(changes.len(), 1);
        assert!(!changes[0].revertible);
    }

    #[test]
    fn test_commit_outside_history_is_not_revertible() {
        let repo = TestRepo::new();
        repo.write("README.md", "vault");
        let root = repo.commit("init");
        repo.write("raw/doc.md", "raw");
        let upload = repo.commit("Upload doc.md");

        let mut facade = RepositoryFacade::new(Arc::clone(&repo.vcs), repo.author());
        let mut ledger = TimelineLedger::in_memory();
        let prepared = ledger.prepare(EntryDraft::new(OperationKind::Update, "raw/doc.md"));
        ledger
            .finalize(prepared, facade.verify_commit(&upload).unwrap())
            .unwrap();

        facade.rollback_working_tree_to(&root).unwrap();

        let changes = list_changes(&facade, &ledger, 50, 10).unwrap();
        assert_eq!(changes.len(), 1);
        assert!(!changes[0].revertible);
        assert!(changes[0].related_commit.is_none());
    }
}
