use anyhow::{bail, Result};
use colored::Colorize;
use dialoguer::Confirm;
use docvault_core::CommitId;
use std::path::Path;

pub fn run(repo: &Path, commit: String, execute: bool, yes: bool) -> Result<()> {
    let mut vault = super::open_vault(repo)?;
    let target = vault.facade().require_commit(&CommitId::new(commit))?;

    println!("{}", "Rollback Preview".bold().cyan());
    println!("  {}: {}", "Target Commit".bold(), target.id);
    println!("  {}: {}", "Message".bold(), target.summary());
    println!("  {}: {}", "Author".bold(), target.author);
    println!(
        "  {}: {}",
        "Date".bold(),
        target.time.format("%Y-%m-%d %H:%M:%S")
    );
    println!();

    let history = vault.facade().history()?;
    let Some(position) = history.iter().position(|c| c.id == target.id) else {
        bail!(
            "Commit {} is not in the current branch history",
            target.id.short()
        );
    };
    let discarded = &history[..position];

    if discarded.is_empty() {
        println!("{}", "Already at this commit".yellow());
    } else {
        println!("{}", "Commits to be discarded:".bold());
        for commit in discarded {
            println!("  {} {}", commit.id.short().red(), commit.summary());
        }
    }

    let untracked: Vec<_> = vault
        .status()?
        .into_iter()
        .filter(|entry| entry.is_untracked())
        .collect();
    if !untracked.is_empty() {
        println!();
        println!("{}", "Untracked files to be removed:".bold());
        for entry in &untracked {
            println!("  {} {}", "-".red(), entry.path);
        }
    }
    println!();

    if !execute {
        println!("{}", "This is a preview only.".yellow());
        println!(
            "Run with {} to actually perform the rollback",
            "--execute".cyan()
        );
        return Ok(());
    }

    if !yes
        && !Confirm::new()
            .with_prompt("Discard these changes?")
            .default(false)
            .interact()?
    {
        println!("{}", "Aborted".yellow());
        return Ok(());
    }

    let report = vault.rollback_to(&target.id)?;
    tracing::info!(commit = %report.target.id, removed = report.removed.len(), "rolled back");

    println!(
        "{}",
        format!("✓ Rolled back to {}", report.target.id.short())
            .green()
            .bold()
    );
    match &report.branch {
        Some(branch) => println!("  {}: {}", "Branch".bold(), branch),
        None => println!("  {}", "HEAD is detached".dimmed()),
    }
    if !report.removed.is_empty() {
        println!("  {} untracked path(s) removed", report.removed.len());
    }

    Ok(())
}
