use anyhow::Result;
use colored::Colorize;
use docvault_core::{ChangeClassification, ChangeRole};
use std::path::Path;

pub fn run(repo: &Path, limit: usize, json: bool) -> Result<()> {
    let vault = super::open_vault(repo)?;
    let changes = vault.changes(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }

    if changes.is_empty() {
        println!("{}", "No recorded changes".yellow());
        return Ok(());
    }

    println!("{}", "Changes".bold().cyan());
    println!();

    for change in &changes {
        let role = match change.role {
            ChangeRole::SourceUpload => "SOURCE ".blue(),
            ChangeRole::DerivedGeneration => "DERIVED".magenta(),
        };
        println!("{} {}", role, change.id.dimmed());
        println!(
            "  {} {} {}",
            change.commit.id.short().yellow(),
            change.commit.summary(),
            format!("({})", change.path).dimmed()
        );

        if let Some(related) = &change.related_commit {
            let label = match change.role {
                ChangeRole::SourceUpload => "derived",
                ChangeRole::DerivedGeneration => "from",
            };
            let mut line = format!("  {} {}", label, related.short());
            if change.heuristic_link {
                line.push_str(" (matched by message)");
            }
            println!("{}", line.dimmed());
        }

        for file in change.files.iter().take(5) {
            let icon = match file.classification {
                ChangeClassification::Added => "+".green(),
                ChangeClassification::Modified => "~".yellow(),
                ChangeClassification::Deleted => "-".red(),
            };
            println!("    {} {}", icon, file.path);
        }
        if change.files.len() > 5 {
            println!(
                "    {} and {} more...",
                "...".dimmed(),
                (change.files.len() - 5).to_string().dimmed()
            );
        }

        if !change.revertible {
            println!("  {}", "not revertible".red());
        }
        println!();
    }

    Ok(())
}
