use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use docvault_core::{CommitId, EntryDraft, OperationKind};
use std::path::Path;

#[derive(Args)]
pub struct RecordArgs {
    /// Operation kind: add, update, delete, move, organize or prune
    #[arg(value_parser = parse_kind)]
    kind: OperationKind,

    /// Path the operation applies to
    path: String,

    /// Commit message
    #[arg(short, long)]
    message: String,

    /// Existing commit holding artifacts derived from this input.
    /// Use `docvault link` when they are generated after the upload.
    #[arg(long)]
    derived: Option<String>,

    /// Previous path, for moves
    #[arg(long)]
    from: Option<String>,

    #[arg(long)]
    title: Option<String>,

    #[arg(short, long)]
    user: Option<String>,

    #[arg(short, long)]
    category: Option<String>,

    /// May be repeated
    #[arg(short, long = "tag")]
    tags: Vec<String>,
}

fn parse_kind(value: &str) -> Result<OperationKind> {
    OperationKind::parse(value).ok_or_else(|| anyhow!("unknown operation kind '{}'", value))
}

pub fn run(repo: &Path, args: RecordArgs) -> Result<()> {
    let mut vault = super::open_vault(repo)?;

    let mut draft = EntryDraft::new(args.kind, args.path);
    if let Some(from) = args.from {
        draft = draft.with_previous_path(from);
    }
    if let Some(title) = args.title {
        draft = draft.with_title(title);
    }
    if let Some(user) = args.user {
        draft = draft.with_user(user);
    }
    if let Some(category) = args.category {
        draft = draft.with_category(category);
    }
    for tag in args.tags {
        draft = draft.with_tag(tag);
    }

    let derived = args.derived.map(CommitId::new);
    let entry = vault.record(draft, &args.message, derived.as_ref())?;

    println!("{}", "✓ Operation recorded".green().bold());
    println!("  {}: {}", "Entry ID".bold(), entry.id);
    println!("  {}: {} {}", "Operation".bold(), entry.operation, entry.path);
    if let Some(commit) = &entry.commit {
        println!("  {}: {}", "Commit".bold(), commit.id.short().yellow());
    }
    if let Some(derived) = &entry.derived_commit {
        println!("  {}: {}", "Derived".bold(), derived.id.short().yellow());
    }

    Ok(())
}
