//! A document vault: one git working copy plus its timeline ledger and
//! configuration.
//!
//! Every operation that mutates the working copy or the ledger holds the
//! repository's [`RepoLease`](crate::locks::RepoLease) for its whole chain.

use crate::changes::{list_changes, DerivedChange};
use crate::config::{VaultConfig, CONFIG_FILE};
use crate::error::Result;
use crate::facade::{RepositoryFacade, RevertConflict, RollbackReport};
use crate::ledger::{PreparedEntry, TimelineLedger, LEDGER_FILE};
use crate::locks::RepoLocks;
use crate::models::{CommitId, CommitRef, EntryDraft, StatusEntry, TimelineEntry};
use crate::orchestrator::{RegenerationHook, RevertOrchestrator, RevertPlan, RevertRequest, RevertResult};
use crate::vcs::{GitPrimitives, VcsPrimitives};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// A commit made for an operation whose ledger entry is not written yet.
///
/// Dropping it leaves the ledger untouched.
#[derive(Debug)]
pub struct PendingOperation {
    prepared: PreparedEntry,
    commit: CommitRef,
}

impl PendingOperation {
    pub fn commit(&self) -> &CommitRef {
        &self.commit
    }

    pub fn entry(&self) -> &PreparedEntry {
        &self.prepared
    }
}

pub struct Vault {
    facade: RepositoryFacade<GitPrimitives>,
    ledger: TimelineLedger,
    config: VaultConfig,
    locks: Arc<RepoLocks>,
    repo_id: String,
    regenerator: Option<Box<dyn RegenerationHook>>,
}

impl Vault {
    /// Create the repository (if needed), the metadata directory and a
    /// default config, then open the vault.
    pub fn init<P: AsRef<Path>>(path: P) -> Result<Self> {
        let vcs = GitPrimitives::init(path)?;
        let metadata = vcs.metadata_dir();
        fs::create_dir_all(&metadata)?;

        let config_path = metadata.join(CONFIG_FILE);
        if !config_path.exists() {
            VaultConfig::default().save(&config_path)?;
        }

        info!(path = %vcs.workdir().display(), "initialized vault");
        Self::from_vcs(vcs, RepoLocks::new())
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_locks(path, RepoLocks::new())
    }

    /// Open sharing a lock registry, so vaults for the same repository in
    /// one process exclude each other.
    pub fn open_with_locks<P: AsRef<Path>>(path: P, locks: Arc<RepoLocks>) -> Result<Self> {
        Self::from_vcs(GitPrimitives::open(path)?, locks)
    }

    fn from_vcs(vcs: GitPrimitives, locks: Arc<RepoLocks>) -> Result<Self> {
        let metadata = vcs.metadata_dir();
        let config = VaultConfig::load(metadata.join(CONFIG_FILE))?;
        let ledger = TimelineLedger::open(metadata.join(LEDGER_FILE))?;
        let repo_id = fs::canonicalize(vcs.workdir())
            .unwrap_or_else(|_| vcs.workdir().to_path_buf())
            .to_string_lossy()
            .into_owned();

        let facade = RepositoryFacade::new(Arc::new(vcs), config.author.to_author());
        Ok(Self {
            facade,
            ledger,
            config,
            locks,
            repo_id,
            regenerator: None,
        })
    }

    pub fn with_regenerator(mut self, hook: Box<dyn RegenerationHook>) -> Self {
        self.regenerator = Some(hook);
        self
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn facade(&self) -> &RepositoryFacade<GitPrimitives> {
        &self.facade
    }

    pub fn ledger(&self) -> &TimelineLedger {
        &self.ledger
    }

    pub fn workdir(&self) -> &Path {
        self.facade.workdir()
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.facade.vcs().metadata_dir()
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn locks(&self) -> &Arc<RepoLocks> {
        &self.locks
    }

    pub fn status(&self) -> Result<Vec<StatusEntry>> {
        self.facade.vcs().status_entries()
    }

    /// Allocate the ledger entry and commit the working copy for it.
    pub fn commit_operation(&mut self, draft: EntryDraft, message: &str) -> Result<PendingOperation> {
        let _lease = RepoLocks::acquire(&self.locks, &self.repo_id)?;
        self.commit_unlocked(draft, message)
    }

    /// Write the ledger entry for a committed operation, optionally linking
    /// the derived commit generated from it.
    pub fn finalize(
        &mut self,
        pending: PendingOperation,
        derived: Option<&CommitId>,
    ) -> Result<TimelineEntry> {
        let _lease = RepoLocks::acquire(&self.locks, &self.repo_id)?;
        self.finalize_unlocked(pending, derived)
    }

    /// Commit and record in one step.
    pub fn record(
        &mut self,
        draft: EntryDraft,
        message: &str,
        derived: Option<&CommitId>,
    ) -> Result<TimelineEntry> {
        let _lease = RepoLocks::acquire(&self.locks, &self.repo_id)?;
        if let Some(derived) = derived {
            self.facade.verify_commit(derived)?;
        }
        let pending = self.commit_unlocked(draft, message)?;
        self.finalize_unlocked(pending, derived)
    }

    /// Link a derived commit to an entry recorded earlier.
    pub fn link_derived(&mut self, entry: &Uuid, derived: &CommitId) -> Result<TimelineEntry> {
        let _lease = RepoLocks::acquire(&self.locks, &self.repo_id)?;
        let verified = self.facade.verify_commit(derived)?;
        self.ledger.link_derived(entry, verified)
    }

    fn commit_unlocked(&mut self, draft: EntryDraft, message: &str) -> Result<PendingOperation> {
        let prepared = self.ledger.prepare(draft);
        let commit = self.facade.commit_all(message)?;
        Ok(PendingOperation { prepared, commit })
    }

    fn finalize_unlocked(
        &mut self,
        pending: PendingOperation,
        derived: Option<&CommitId>,
    ) -> Result<TimelineEntry> {
        let verified = self.facade.verify_commit(&pending.commit.id)?;
        let mut prepared = pending.prepared;
        if let Some(derived) = derived {
            prepared = prepared.link_derived(self.facade.verify_commit(derived)?);
        }
        self.ledger.finalize(prepared, verified)
    }

    /// Changes for the newest `limit` ledger entries.
    pub fn changes(&self, limit: usize) -> Result<Vec<DerivedChange>> {
        list_changes(
            &self.facade,
            &self.ledger,
            self.config.revert.lineage_search_depth,
            limit,
        )
    }

    pub fn plan_revert(&mut self, request: &RevertRequest) -> Result<RevertPlan> {
        RevertOrchestrator::new(
            &mut self.facade,
            &self.ledger,
            &self.config.revert,
            &self.config.remote,
        )
        .plan(request)
    }

    pub fn revert(&mut self, request: RevertRequest) -> Result<RevertResult> {
        let _lease = RepoLocks::acquire(&self.locks, &self.repo_id)?;
        let mut orchestrator = RevertOrchestrator::new(
            &mut self.facade,
            &self.ledger,
            &self.config.revert,
            &self.config.remote,
        );
        if let Some(hook) = self.regenerator.as_deref() {
            orchestrator = orchestrator.with_regenerator(hook);
        }
        orchestrator.revert(request)
    }

    pub fn rollback_to(&mut self, commit: &CommitId) -> Result<RollbackReport> {
        let _lease = RepoLocks::acquire(&self.locks, &self.repo_id)?;
        self.facade.rollback_working_tree_to(commit)
    }

    pub fn revert_conflicts(&self, commit: &CommitId) -> Result<Vec<RevertConflict>> {
        self.facade.revert_conflicts(commit)
    }
}
