use anyhow::Result;
use colored::Colorize;
use docvault_core::VcsPrimitives;
use std::path::Path;

pub fn run(repo: &Path) -> Result<()> {
    let vault = super::open_vault(repo)?;
    let facade = vault.facade();

    println!("{}", "Vault Status".bold().cyan());
    println!("  {}: {}", "Root".bold(), vault.workdir().display());
    let branch = facade.vcs().current_branch()?;
    println!(
        "  {}: {}",
        "Branch".bold(),
        branch.as_deref().unwrap_or("(detached)")
    );
    match facade.head()? {
        Some(head) => {
            let info = facade.require_commit(&head)?;
            println!(
                "  {}: {} {}",
                "HEAD".bold(),
                head.short().yellow(),
                info.summary()
            );
        }
        None => println!("  {}: {}", "HEAD".bold(), "(no commits)".dimmed()),
    }
    println!("  {}: {}", "Timeline entries".bold(), vault.ledger().len());
    if let Some(latest) = vault.ledger().newest_first().first() {
        println!(
            "  {}: {} {} ({})",
            "Latest".bold(),
            latest.operation,
            latest.path,
            latest.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();

    let entries = vault.status()?;
    if entries.is_empty() {
        println!("{}", "Working copy clean".green());
        return Ok(());
    }

    println!(
        "{} {}",
        "Uncommitted changes:".bold(),
        format!("({})", entries.len()).yellow()
    );
    println!();

    for entry in entries.iter().take(10) {
        let icon = if entry.is_untracked() {
            "?".bright_black()
        } else if !entry.head {
            "+".green()
        } else if !entry.workdir {
            "-".red()
        } else {
            "~".yellow()
        };
        println!("  {} {}", icon, entry.path);
    }

    if entries.len() > 10 {
        println!();
        println!(
            "  {} and {} more...",
            "...".dimmed(),
            (entries.len() - 10).to_string().yellow()
        );
    }

    println!();
    println!(
        "Run {} to commit these changes",
        "docvault record <kind> <path> -m \"message\"".cyan()
    );

    Ok(())
}
