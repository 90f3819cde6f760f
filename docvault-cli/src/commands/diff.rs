use anyhow::Result;
use colored::Colorize;
use docvault_core::diff::{short_digest, DiffLineType, FileDiff};
use docvault_core::{ChangeClassification, CommitId};
use std::path::Path;

pub fn run(repo: &Path, commit: String, path: Option<String>) -> Result<()> {
    let vault = super::open_vault(repo)?;
    let facade = vault.facade();
    let info = facade.require_commit(&CommitId::new(commit))?;

    println!("{}", format!("Diff for commit {}", info.id).bold().cyan());
    println!("{}: {}", "Author".bold(), info.author);
    println!("{}: {}", "Message".bold(), info.summary());
    println!();

    let paths: Vec<String> = match path {
        Some(path) => vec![path],
        None => facade
            .classify_path_changes(&info.id)?
            .into_iter()
            .map(|change| change.path)
            .collect(),
    };

    if paths.is_empty() {
        println!("{}", "No changes in this commit".yellow());
        return Ok(());
    }

    for path in paths {
        let Some(path_diff) = facade.diff_for_path(&info.id, &path)? else {
            println!("{} {}", path.white().bold(), "[not present on either side]".dimmed());
            continue;
        };

        println!("{}", "━".repeat(80).bright_black());

        let status = match path_diff.classification {
            ChangeClassification::Added => "NEW".green(),
            ChangeClassification::Modified => "MOD".yellow(),
            ChangeClassification::Deleted => "DEL".red(),
        };
        println!("{} {}", status, path.white().bold());
        println!();

        let diff = FileDiff::from_path_diff(&path_diff);
        if diff.binary {
            println!(
                "  {} {} -> {}",
                "[Binary file]".dimmed(),
                short_digest(diff.old_digest.as_deref()).red(),
                short_digest(diff.new_digest.as_deref()).green()
            );
        } else {
            for line in &diff.diff_lines {
                let (prefix, color): (&str, fn(&str) -> colored::ColoredString) =
                    match line.line_type {
                        DiffLineType::Addition => ("+", |s| s.green()),
                        DiffLineType::Deletion => ("-", |s| s.red()),
                        DiffLineType::Context => (" ", |s| s.normal()),
                    };
                print!("{}", color(&format!("{}{}", prefix, line.content)));
            }
        }
        println!();
    }

    Ok(())
}
