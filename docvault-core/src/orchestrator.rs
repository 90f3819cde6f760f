//! Multi-commit reverts across the source/derived lineage.
//!
//! A request is resolved to [`DerivedChange`]s, split by role and executed
//! as two batches, derived generations before the source uploads that
//! produced them. Each batch reverts oldest-first and ends with one summary
//! commit. Large `LastN` requests skip all of that and reset the repository
//! to its initial commit instead.

use crate::changes::{change_id, parse_change_id, project_entry, ChangeRole, DerivedChange};
use crate::config::{RemoteSettings, RevertSettings};
use crate::error::{Error, Result};
use crate::facade::{remove_path, write_path, RepositoryFacade, RevertConflict};
use crate::ledger::TimelineLedger;
use crate::lineage::LineageResolver;
use crate::models::{CommitId, CommitInfo, CommitRef, TimelineEntry};
use crate::sync::sync_and_push;
use crate::vcs::VcsPrimitives;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Content-generation collaborator, asked to re-derive artifacts after a
/// derived-only revert.
pub trait RegenerationHook: Send + Sync {
    fn request_regeneration(&self, paths: &[String]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertSelector {
    /// Most recent entry whose path or file name equals this.
    Filename(String),
    /// An entry uuid (both roles) or a single `<uuid>:<role>` change id.
    ChangeId(String),
    /// The N most recent committed entries.
    LastN(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertScope {
    SourceOnly,
    DerivedOnly,
    Both,
}

impl RevertScope {
    pub fn includes(&self, role: ChangeRole) -> bool {
        match self {
            RevertScope::SourceOnly => role == ChangeRole::SourceUpload,
            RevertScope::DerivedOnly => role == ChangeRole::DerivedGeneration,
            RevertScope::Both => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertRequest {
    pub selector: RevertSelector,
    pub scope: RevertScope,
    #[serde(default)]
    pub regenerate_after_revert: bool,
}

impl RevertRequest {
    pub fn new(selector: RevertSelector, scope: RevertScope) -> Self {
        Self {
            selector,
            scope,
            regenerate_after_revert: false,
        }
    }

    pub fn with_regeneration(mut self) -> Self {
        self.regenerate_after_revert = true;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.regenerate_after_revert && self.scope != RevertScope::DerivedOnly {
            return Err(Error::InvalidRequest(
                "regeneration is only available when reverting derived changes only".into(),
            ));
        }
        match &self.selector {
            RevertSelector::LastN(0) => Err(Error::InvalidRequest(
                "last must be at least 1".into(),
            )),
            RevertSelector::Filename(name) if name.trim().is_empty() => {
                Err(Error::InvalidRequest("filename must not be empty".into()))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Sequential,
    ResetToInitial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedChange {
    pub change: DerivedChange,
    pub reason: String,
}

/// A newer commit that touched a path the planned revert will overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeConflict {
    pub change_id: String,
    pub conflict: RevertConflict,
}

/// What a request would do, computed without touching the working copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevertPlan {
    pub mode: PlanMode,
    /// Execution order: oldest first.
    pub derived: Vec<DerivedChange>,
    /// Execution order: oldest first.
    pub source: Vec<DerivedChange>,
    pub skipped: Vec<SkippedChange>,
    pub conflicts: Vec<ChangeConflict>,
}

impl RevertPlan {
    fn reset() -> Self {
        Self {
            mode: PlanMode::ResetToInitial,
            derived: Vec::new(),
            source: Vec::new(),
            skipped: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    /// True for a sequential plan with nothing to revert.
    pub fn is_empty(&self) -> bool {
        self.mode == PlanMode::Sequential && self.derived.is_empty() && self.source.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertStatus {
    Reverted,
    Reset,
    NothingMatched,
    PartialFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRevert {
    /// `None` when the batch-summary commit failed.
    pub change_id: Option<String>,
    pub commit: Option<CommitId>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevertResult {
    pub success: bool,
    pub status: RevertStatus,
    pub message: String,
    /// Commits created, in creation order.
    pub revert_commit_ids: Vec<CommitId>,
    pub changes_reverted: Vec<String>,
    pub failed: Option<FailedRevert>,
    pub warnings: Vec<String>,
    pub regeneration_triggered: Option<bool>,
}

pub struct RevertOrchestrator<'a, V: VcsPrimitives> {
    facade: &'a mut RepositoryFacade<V>,
    ledger: &'a TimelineLedger,
    settings: &'a RevertSettings,
    remote: &'a RemoteSettings,
    regenerator: Option<&'a dyn RegenerationHook>,
}

impl<'a, V: VcsPrimitives> RevertOrchestrator<'a, V> {
    pub fn new(
        facade: &'a mut RepositoryFacade<V>,
        ledger: &'a TimelineLedger,
        settings: &'a RevertSettings,
        remote: &'a RemoteSettings,
    ) -> Self {
        Self {
            facade,
            ledger,
            settings,
            remote,
            regenerator: None,
        }
    }

    pub fn with_regenerator(mut self, hook: &'a dyn RegenerationHook) -> Self {
        self.regenerator = Some(hook);
        self
    }

    /// Resolve and order the targets of `request` without mutating anything.
    pub fn plan(&self, request: &RevertRequest) -> Result<RevertPlan> {
        request.validate()?;

        if let RevertSelector::LastN(n) = request.selector {
            if n > self.settings.reset_threshold {
                info!(
                    last = n,
                    threshold = self.settings.reset_threshold,
                    "large revert takes the reset path"
                );
                return Ok(RevertPlan::reset());
            }
        }

        let targets = self.resolve_targets(request)?;
        self.partition(targets)
    }

    pub fn revert(&mut self, request: RevertRequest) -> Result<RevertResult> {
        let plan = self.plan(&request)?;
        if plan.mode == PlanMode::ResetToInitial {
            return self.reset_to_initial();
        }

        let mut warnings: Vec<String> = plan
            .skipped
            .iter()
            .map(|s| format!("skipped {}: {}", s.change.id, s.reason))
            .collect();

        if plan.is_empty() {
            debug!(selector = ?request.selector, "nothing to revert");
            return Ok(RevertResult {
                success: false,
                status: RevertStatus::NothingMatched,
                message: "No revertible changes matched the request".to_string(),
                revert_commit_ids: Vec::new(),
                changes_reverted: Vec::new(),
                failed: None,
                warnings,
                regeneration_triggered: None,
            });
        }

        let mut reverted = Vec::new();
        let mut commits = Vec::new();
        for (role, batch) in [
            (ChangeRole::DerivedGeneration, &plan.derived),
            (ChangeRole::SourceUpload, &plan.source),
        ] {
            if batch.is_empty() {
                continue;
            }
            if let Err(failed) = self.run_batch(role, batch, &mut reverted, &mut commits) {
                warn!(
                    change = failed.change_id.as_deref().unwrap_or("batch summary"),
                    error = %failed.error,
                    reverted = reverted.len(),
                    "revert batch aborted"
                );
                return Ok(RevertResult {
                    success: false,
                    status: RevertStatus::PartialFailure,
                    message: format!(
                        "Reverted {} change(s) before a failure: {}",
                        reverted.len(),
                        failed.error
                    ),
                    revert_commit_ids: commits,
                    changes_reverted: reverted,
                    failed: Some(failed),
                    warnings,
                    regeneration_triggered: None,
                });
            }
        }

        warnings.extend(sync_and_push(self.facade.vcs(), self.remote, false).warnings);

        let regeneration_triggered = if request.regenerate_after_revert && plan.source.is_empty() {
            Some(self.trigger_regeneration(&plan.derived, &mut warnings))
        } else {
            None
        };

        info!(
            changes = reverted.len(),
            commits = commits.len(),
            "revert finished"
        );
        Ok(RevertResult {
            success: true,
            status: RevertStatus::Reverted,
            message: format!("Reverted {} change(s)", reverted.len()),
            revert_commit_ids: commits,
            changes_reverted: reverted,
            failed: None,
            warnings,
            regeneration_triggered,
        })
    }

    pub fn revert_source_only(&mut self, selector: RevertSelector) -> Result<RevertResult> {
        self.revert(RevertRequest::new(selector, RevertScope::SourceOnly))
    }

    pub fn revert_both(&mut self, selector: RevertSelector) -> Result<RevertResult> {
        self.revert(RevertRequest::new(selector, RevertScope::Both))
    }

    pub fn revert_last(&mut self, n: usize, scope: RevertScope) -> Result<RevertResult> {
        self.revert(RevertRequest::new(RevertSelector::LastN(n), scope))
    }

    pub fn revert_and_regenerate(&mut self, selector: RevertSelector) -> Result<RevertResult> {
        self.revert(RevertRequest::new(selector, RevertScope::DerivedOnly).with_regeneration())
    }

    /// Hard-reset to the initial commit, reconcile the working copy against
    /// its tree, and force-push.
    pub fn reset_to_initial(&mut self) -> Result<RevertResult> {
        let initial = self.initial_commit()?;
        let undone = self.changes_after(&initial.id)?;

        self.facade.rollback_working_tree_to(&initial.id)?;
        let reconciled = self.reconcile(&initial.id)?;

        let mut commits = Vec::new();
        let dirty = !self.facade.vcs().status_entries()?.is_empty();
        if dirty {
            let message = format!(
                "Reset to initial state\n\nReconciled {} path(s) against {}.\n",
                reconciled, initial.id
            );
            commits.push(self.facade.commit_all(&message)?.id);
        }

        let warnings = sync_and_push(self.facade.vcs(), self.remote, true).warnings;

        info!(
            commit = %initial.id,
            undone = undone.len(),
            reconciled,
            "reset to initial commit"
        );
        Ok(RevertResult {
            success: true,
            status: RevertStatus::Reset,
            message: format!(
                "Reset to initial commit {} ({})",
                initial.id.short(),
                initial.summary()
            ),
            revert_commit_ids: commits,
            changes_reverted: undone,
            failed: None,
            warnings,
            regeneration_triggered: None,
        })
    }

    fn resolve_targets(&self, request: &RevertRequest) -> Result<Vec<DerivedChange>> {
        let (entries, role): (Vec<&TimelineEntry>, Option<ChangeRole>) = match &request.selector {
            RevertSelector::Filename(name) => {
                let name = name.trim();
                let entry = self.ledger.newest_first().into_iter().find(|e| {
                    e.commit.is_some() && (e.path == name || e.file_name() == name)
                });
                (entry.into_iter().collect(), None)
            }
            RevertSelector::ChangeId(id) => {
                let (entry_id, role) = parse_change_id(id.trim())
                    .ok_or_else(|| Error::InvalidRequest(format!("malformed change id '{}'", id)))?;
                (self.ledger.get(&entry_id).into_iter().collect(), role)
            }
            RevertSelector::LastN(n) => (self.ledger.latest(*n), None),
        };

        let resolver =
            LineageResolver::new(&*self.facade, self.ledger, self.settings.lineage_search_depth);
        let mut targets = Vec::new();
        for entry in entries {
            for change in project_entry(&*self.facade, &resolver, entry)? {
                if request.scope.includes(change.role) && role.map_or(true, |r| r == change.role) {
                    targets.push(change);
                }
            }
        }
        Ok(targets)
    }

    fn partition(&self, targets: Vec<DerivedChange>) -> Result<RevertPlan> {
        let history = self.facade.history()?;
        let position = |id: &CommitId| history.iter().position(|c| &c.id == id);

        let (derived_targets, source_targets): (Vec<_>, Vec<_>) = targets
            .into_iter()
            .partition(|c| c.role == ChangeRole::DerivedGeneration);

        let mut seen = HashSet::new();
        let mut derived = Vec::new();
        let mut source = Vec::new();
        let mut skipped = Vec::new();

        for change in derived_targets.into_iter().chain(source_targets) {
            if !change.revertible {
                let reason = self.skip_reason(&change.commit.id)?;
                warn!(change = %change.id, commit = %change.commit.id, reason = %reason, "skipping change");
                skipped.push(SkippedChange { change, reason });
                continue;
            }
            if !seen.insert(change.commit.id.clone()) {
                debug!(change = %change.id, commit = %change.commit.id, "commit already planned");
                continue;
            }
            match change.role {
                ChangeRole::DerivedGeneration => derived.push(change),
                ChangeRole::SourceUpload => source.push(change),
            }
        }

        // Larger history index means older.
        derived.sort_by_key(|c| Reverse(position(&c.commit.id)));
        source.sort_by_key(|c| Reverse(position(&c.commit.id)));

        let mut conflicts = Vec::new();
        for change in derived.iter().chain(source.iter()) {
            for conflict in self.facade.revert_conflicts(&change.commit.id)? {
                conflicts.push(ChangeConflict {
                    change_id: change.id.clone(),
                    conflict,
                });
            }
        }

        Ok(RevertPlan {
            mode: PlanMode::Sequential,
            derived,
            source,
            skipped,
            conflicts,
        })
    }

    fn skip_reason(&self, commit: &CommitId) -> Result<String> {
        Ok(match self.facade.read_commit(commit)? {
            None => "commit no longer exists".to_string(),
            Some(info) if info.is_root() => "root commit has no parent to revert to".to_string(),
            Some(_) => "commit is not reachable from HEAD".to_string(),
        })
    }

    fn run_batch(
        &mut self,
        role: ChangeRole,
        batch: &[DerivedChange],
        reverted: &mut Vec<String>,
        commits: &mut Vec<CommitId>,
    ) -> std::result::Result<(), FailedRevert> {
        for change in batch {
            match self.facade.revert_single_commit(&change.commit.id) {
                Ok(commit) => {
                    reverted.push(change.id.clone());
                    commits.push(commit.id);
                }
                Err(e) => {
                    return Err(FailedRevert {
                        change_id: Some(change.id.clone()),
                        commit: Some(change.commit.id.clone()),
                        error: e.to_string(),
                    })
                }
            }
        }

        let summary = batch_summary(role, batch.iter().map(|c| &c.commit));
        match self.facade.commit_all(&summary) {
            Ok(commit) => {
                commits.push(commit.id);
                Ok(())
            }
            Err(e) => Err(FailedRevert {
                change_id: None,
                commit: None,
                error: e.to_string(),
            }),
        }
    }

    fn trigger_regeneration(&self, derived: &[DerivedChange], warnings: &mut Vec<String>) -> bool {
        let mut paths: Vec<String> = Vec::new();
        for change in derived {
            if !paths.contains(&change.path) {
                paths.push(change.path.clone());
            }
        }

        let Some(hook) = self.regenerator else {
            let message = "regeneration requested but no regeneration hook is configured";
            warn!("{}", message);
            warnings.push(message.to_string());
            return false;
        };

        match hook.request_regeneration(&paths) {
            Ok(()) => {
                info!(paths = paths.len(), "regeneration requested");
                true
            }
            Err(e) => {
                let message = format!("regeneration request failed: {}", e);
                warn!("{}", message);
                warnings.push(message);
                false
            }
        }
    }

    /// Root of the oldest committed ledger entry, falling back to the last
    /// commit of the first-parent history.
    fn initial_commit(&self) -> Result<CommitInfo> {
        if let Some(commit) = self.ledger.oldest_committed().and_then(|e| e.commit.as_ref()) {
            if self.facade.read_commit(&commit.id)?.is_some() {
                let root = self.facade.root_of(&commit.id)?;
                if self.facade.is_in_history(&root.id)? {
                    return Ok(root);
                }
            }
            warn!(commit = %commit.id, "ledger does not lead to the current root; scanning history");
        }

        self.facade
            .history()?
            .last()
            .cloned()
            .ok_or(Error::EmptyHistory)
    }

    /// Change ids of ledger commits reachable from HEAD and newer than `initial`.
    fn changes_after(&self, initial: &CommitId) -> Result<Vec<String>> {
        let history = self.facade.history()?;
        let reachable: HashSet<&CommitId> = history
            .iter()
            .map(|c| &c.id)
            .filter(|id| *id != initial)
            .collect();

        let mut undone = Vec::new();
        for entry in self.ledger.newest_first() {
            if entry.commit.as_ref().is_some_and(|c| reachable.contains(&c.id)) {
                undone.push(change_id(&entry.id, ChangeRole::SourceUpload));
            }
            if entry
                .derived_commit
                .as_ref()
                .is_some_and(|c| reachable.contains(&c.id))
            {
                undone.push(change_id(&entry.id, ChangeRole::DerivedGeneration));
            }
        }
        Ok(undone)
    }

    /// Make the working copy hold exactly the files of `commit`'s tree,
    /// ignored files included. Returns how many paths had to be restored or
    /// deleted.
    fn reconcile(&self, commit: &CommitId) -> Result<usize> {
        let workdir = self.facade.workdir().to_path_buf();
        let tree = self.facade.tree_paths(commit)?;
        let expected: HashSet<&str> = tree.iter().map(|f| f.path.as_str()).collect();

        let mut changed = 0;
        for file in &tree {
            if workdir.join(&file.path).exists() {
                continue;
            }
            if let Some(content) = self.facade.content_at_revision(commit, &file.path)? {
                debug!(path = %file.path, "restoring missing path");
                write_path(&workdir, &file.path, &content)?;
                changed += 1;
            }
        }

        for path in working_files(&workdir)? {
            if !expected.contains(path.as_str()) {
                debug!(path = %path, "removing path absent from initial tree");
                remove_path(&workdir, &path)?;
                changed += 1;
            }
        }

        Ok(changed)
    }
}

fn batch_summary<'c>(role: ChangeRole, commits: impl Iterator<Item = &'c CommitRef>) -> String {
    let label = match role {
        ChangeRole::DerivedGeneration => "derived generation",
        ChangeRole::SourceUpload => "source upload",
    };
    let lines: Vec<String> = commits
        .map(|c| format!("- {} {}", c.id.short(), c.summary()))
        .collect();
    format!(
        "Revert {} {}(s)\n\nUndid commits:\n{}\n",
        lines.len(),
        label,
        lines.join("\n")
    )
}

/// Every file under `root` as a `/`-separated relative path, skipping `.git`.
fn working_files(root: &Path) -> Result<Vec<String>> {
    let git_dir = root.join(".git");
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !e.path().starts_with(&git_dir))
    {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            files.push(parts.join("/"));
        }
    }
    files.sort();
    Ok(files)
}
