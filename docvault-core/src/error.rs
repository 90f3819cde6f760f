use crate::models::CommitId;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Commit not found: {0}")]
    CommitNotFound(CommitId),

    #[error("Invalid commit id: {0}")]
    InvalidCommitId(String),

    #[error("Timeline entry not found: {0}")]
    EntryNotFound(Uuid),

    #[error("Cannot revert root commit {0}: it has no parent")]
    RootCommitRevert(CommitId),

    #[error("Commit {0} is not reachable from HEAD")]
    NotInHistory(CommitId),

    #[error("Repository has no commits")]
    EmptyHistory,

    #[error("Invalid revert request: {0}")]
    InvalidRequest(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Lock error: {0}")]
    Lock(String),
}
