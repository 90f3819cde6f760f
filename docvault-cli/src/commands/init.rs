use anyhow::Result;
use colored::Colorize;
use docvault_core::Vault;
use std::path::Path;

pub fn run(repo: &Path) -> Result<()> {
    let vault = Vault::init(repo)?;

    println!("{}", "✓ Vault initialized".green().bold());
    println!("  {}: {}", "Working copy".bold(), vault.workdir().display());
    println!("  {}: {}", "Metadata".bold(), vault.metadata_dir().display());
    println!("  {}: {}", "Timeline entries".bold(), vault.ledger().len());

    Ok(())
}
