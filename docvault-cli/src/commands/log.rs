use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use docvault_core::{OperationKind, TimelineQuery};
use std::path::Path;

#[derive(Args)]
pub struct LogArgs {
    /// Number of entries to show
    #[arg(short, long)]
    limit: Option<usize>,

    /// Entries to skip
    #[arg(long, default_value = "0")]
    offset: usize,

    #[arg(long)]
    kind: Option<String>,

    #[arg(short, long)]
    user: Option<String>,

    #[arg(short, long)]
    category: Option<String>,

    #[arg(short, long)]
    path: Option<String>,

    #[arg(short, long)]
    tag: Option<String>,

    /// YYYY-MM-DD or RFC 3339
    #[arg(long)]
    since: Option<String>,

    /// YYYY-MM-DD or RFC 3339
    #[arg(long)]
    until: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

pub fn run(repo: &Path, args: LogArgs) -> Result<()> {
    let vault = super::open_vault(repo)?;

    let mut query = TimelineQuery::new();
    if let Some(kind) = &args.kind {
        let kind = OperationKind::parse(kind).ok_or_else(|| anyhow!("unknown operation kind '{}'", kind))?;
        query = query.operation(kind);
    }
    if let Some(user) = args.user {
        query = query.user(user);
    }
    if let Some(category) = args.category {
        query = query.category(category);
    }
    if let Some(path) = args.path {
        query = query.path(path);
    }
    if let Some(tag) = args.tag {
        query = query.tag(tag);
    }
    if let Some(since) = &args.since {
        query = query.since(super::parse_time(since, false)?);
    }
    if let Some(until) = &args.until {
        query = query.until(super::parse_time(until, true)?);
    }
    query = query.page(args.offset, args.limit.unwrap_or(usize::MAX));

    let page = vault.ledger().query(&query);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&page.entries)?);
        return Ok(());
    }

    if page.entries.is_empty() {
        println!("{}", "No timeline entries".yellow());
        return Ok(());
    }

    println!("{}", "Timeline".bold().cyan());
    println!();

    for entry in &page.entries {
        println!(
            "{} {}",
            "entry".yellow().bold(),
            entry.id.to_string().yellow()
        );
        println!("{}: {} {}", "Operation".bold(), entry.operation, entry.path);
        if let Some(previous) = &entry.previous_path {
            println!("{}: {}", "From".bold(), previous);
        }
        println!(
            "{}: {}",
            "Date".bold(),
            entry.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(user) = &entry.user {
            println!("{}: {}", "User".bold(), user);
        }
        if let Some(commit) = &entry.commit {
            println!();
            println!("    {} {}", commit.id.short().cyan(), commit.summary());
        }
        if let Some(derived) = &entry.derived_commit {
            println!(
                "    {} {} {}",
                derived.id.short().cyan(),
                derived.summary(),
                "(derived)".dimmed()
            );
        }
        if let Some(title) = &entry.title {
            println!("    {}", title.dimmed());
        }
        if !entry.tags.is_empty() {
            println!("    {}", entry.tags.join(", ").dimmed());
        }
        println!();
    }

    let shown = args.offset + page.entries.len();
    if page.total > shown {
        println!(
            "{}",
            format!("... and {} more entries", page.total - shown).dimmed()
        );
        println!("Use {} to see more", "--offset N".cyan());
    }

    Ok(())
}
