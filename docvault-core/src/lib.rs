//! # docvault-core
//!
//! Core library for docvault - revertible history for a document collection
//! kept in a git repository.
//!
//! Raw inputs ("source uploads") and the knowledge artifacts generated from
//! them ("derived generations") are committed separately. This crate records
//! which commit belongs to which operation, links derived commits back to
//! their source, and undoes either side (or both) on request.

pub mod changes;
pub mod config;
pub mod diff;
pub mod error;
pub mod facade;
pub mod ledger;
pub mod lineage;
pub mod locks;
pub mod models;
pub mod orchestrator;
pub mod sync;
pub mod vault;
pub mod vcs;

#[cfg(test)]
mod testing;

pub use changes::{ChangeRole, DerivedChange};
pub use config::VaultConfig;
pub use error::{Error, Result};
pub use facade::{RepositoryFacade, RevertConflict, RollbackReport};
pub use ledger::{TimelineLedger, TimelineQuery};
pub use lineage::LineageResolver;
pub use locks::RepoLocks;
pub use models::{
    ChangeClassification, CommitId, CommitRef, EntryDraft, OperationKind, PathChange,
    TimelineEntry,
};
pub use orchestrator::{
    RegenerationHook, RevertOrchestrator, RevertRequest, RevertResult, RevertScope,
    RevertSelector, RevertStatus,
};
pub use vault::Vault;
pub use vcs::{GitPrimitives, VcsPrimitives};
