use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;
use dialoguer::Confirm;
use docvault_core::orchestrator::{PlanMode, RevertPlan};
use docvault_core::{
    DerivedChange, Error, RegenerationHook, RevertRequest, RevertResult, RevertScope,
    RevertSelector, RevertStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

#[derive(Args)]
pub struct RevertArgs {
    #[command(flatten)]
    selector: SelectorArgs,

    /// Which side of the lineage to revert
    #[arg(long, value_enum, default_value_t = ScopeArg::Both)]
    scope: ScopeArg,

    /// Ask for the derived artifacts to be regenerated afterwards
    /// (derived scope only)
    #[arg(long)]
    regenerate: bool,

    /// Actually perform the revert (without this, just shows the plan)
    #[arg(long)]
    execute: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SelectorArgs {
    /// Most recent entry for this path or file name
    #[arg(long)]
    file: Option<String>,

    /// Entry id, or `<entry-id>:source` / `<entry-id>:derived`
    #[arg(long)]
    change: Option<String>,

    /// The N most recent entries
    #[arg(long)]
    last: Option<usize>,
}

impl SelectorArgs {
    fn into_selector(self) -> RevertSelector {
        match (self.file, self.change, self.last) {
            (Some(file), _, _) => RevertSelector::Filename(file),
            (_, Some(change), _) => RevertSelector::ChangeId(change),
            (_, _, Some(n)) => RevertSelector::LastN(n),
            // clap enforces exactly one
            (None, None, None) => RevertSelector::LastN(1),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Source,
    Derived,
    Both,
}

impl From<ScopeArg> for RevertScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Source => RevertScope::SourceOnly,
            ScopeArg::Derived => RevertScope::DerivedOnly,
            ScopeArg::Both => RevertScope::Both,
        }
    }
}

/// Runs the configured command with the reverted source paths appended.
struct CommandRegenerator {
    program: String,
    args: Vec<String>,
    workdir: PathBuf,
}

impl RegenerationHook for CommandRegenerator {
    fn request_regeneration(&self, paths: &[String]) -> docvault_core::Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .args(paths)
            .current_dir(&self.workdir)
            .status()?;
        if !status.success() {
            return Err(Error::InvalidOperation(format!(
                "regeneration command '{}' exited with {}",
                self.program, status
            )));
        }
        Ok(())
    }
}

pub fn run(repo: &Path, args: RevertArgs) -> Result<()> {
    let mut vault = super::open_vault(repo)?;

    if let Some((program, rest)) = vault
        .config()
        .regenerate
        .command
        .as_ref()
        .and_then(|command| command.split_first())
    {
        let hook = CommandRegenerator {
            program: program.clone(),
            args: rest.to_vec(),
            workdir: vault.workdir().to_path_buf(),
        };
        vault = vault.with_regenerator(Box::new(hook));
    }

    let mut request = RevertRequest::new(args.selector.into_selector(), args.scope.into());
    if args.regenerate {
        request = request.with_regeneration();
    }

    let plan = vault.plan_revert(&request)?;
    if !args.json {
        print_plan(&plan);
    }

    if plan.is_empty() && plan.skipped.is_empty() {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        return Ok(());
    }

    if !args.execute {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            println!("{}", "This is a preview only.".yellow());
            println!("Run with {} to actually revert", "--execute".cyan());
        }
        return Ok(());
    }

    if !args.yes
        && !Confirm::new()
            .with_prompt("Proceed with the revert?")
            .default(false)
            .interact()?
    {
        println!("{}", "Aborted".yellow());
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message("Reverting...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = vault.revert(request);
    spinner.finish_and_clear();
    let result = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    Ok(())
}

fn print_plan(plan: &RevertPlan) {
    println!("{}", "Revert Plan".bold().cyan());

    if plan.mode == PlanMode::ResetToInitial {
        println!(
            "  {}",
            "Large request: the repository will be reset to its initial commit".yellow()
        );
        println!("  {}", "and force-pushed.".yellow());
        println!();
        return;
    }

    if plan.is_empty() {
        println!("  {}", "Nothing matched".yellow());
    }
    print_batch("Derived generations (reverted first)", &plan.derived);
    print_batch("Source uploads", &plan.source);

    if !plan.skipped.is_empty() {
        println!("  {}", "Skipped:".bold());
        for skipped in &plan.skipped {
            println!("    {} {}", skipped.change.id.dimmed(), skipped.reason.red());
        }
    }

    if !plan.conflicts.is_empty() {
        println!();
        println!(
            "  {}",
            "Newer changes to these paths will be overwritten:".red().bold()
        );
        for conflict in &plan.conflicts {
            println!(
                "    {} {} {}",
                conflict.conflict.path,
                conflict.conflict.later_commit.id.short().yellow(),
                conflict.conflict.later_commit.summary().dimmed()
            );
        }
    }
    println!();
}

fn print_batch(title: &str, batch: &[DerivedChange]) {
    if batch.is_empty() {
        return;
    }
    println!("  {}", title.bold());
    for change in batch {
        println!(
            "    {} {} {}",
            change.commit.id.short().yellow(),
            change.commit.summary(),
            format!("({})", change.path).dimmed()
        );
    }
}

fn print_result(result: &RevertResult) {
    let headline = match result.status {
        RevertStatus::Reverted | RevertStatus::Reset => {
            format!("✓ {}", result.message).green().bold()
        }
        RevertStatus::NothingMatched => result.message.yellow().bold(),
        RevertStatus::PartialFailure => format!("⚠ {}", result.message).red().bold(),
    };
    println!("{}", headline);

    for id in &result.revert_commit_ids {
        println!("  {} {}", "commit".bold(), id.short().yellow());
    }

    if let Some(failed) = &result.failed {
        println!();
        println!("{}", "Failed:".red().bold());
        if let Some(change) = &failed.change_id {
            println!("  {}: {}", "Change".bold(), change);
        }
        println!("  {}: {}", "Error".bold(), failed.error);
        println!(
            "  {}",
            "Reverts that already succeeded were kept and nothing was pushed.".dimmed()
        );
    }

    match result.regeneration_triggered {
        Some(true) => println!("{}", "Regeneration requested".cyan()),
        Some(false) => println!("{}", "Regeneration was not triggered".yellow()),
        None => {}
    }

    if !result.warnings.is_empty() {
        println!();
        println!("{}", "Warnings:".yellow().bold());
        for warning in &result.warnings {
            println!("  {}", warning);
        }
    }
}
