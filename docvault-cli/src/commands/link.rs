use anyhow::{Context, Result};
use colored::Colorize;
use docvault_core::CommitId;
use std::path::Path;
use uuid::Uuid;

pub fn run(repo: &Path, entry: String, commit: String) -> Result<()> {
    let mut vault = super::open_vault(repo)?;
    let entry_id =
        Uuid::parse_str(&entry).with_context(|| format!("Invalid entry id '{}'", entry))?;

    let entry = vault.link_derived(&entry_id, &CommitId::new(commit))?;

    println!("{}", "✓ Derived commit linked".green().bold());
    println!("  {}: {}", "Entry ID".bold(), entry.id);
    println!("  {}: {} {}", "Operation".bold(), entry.operation, entry.path);
    if let Some(derived) = &entry.derived_commit {
        println!(
            "  {}: {} {}",
            "Derived".bold(),
            derived.id.short().yellow(),
            derived.summary()
        );
    }

    Ok(())
}
