use anyhow::{Context, Result};
use artifact_patcher::config::{self, PatcherConfig};
use artifact_patcher::launcher::{Bootstrap, RunContext, RunOptions, Selection};
use artifact_patcher::patcher::{logical_name, ArtifactError, PatchOutcome};
use artifact_patcher::strategy::{PatchError, PatchResult};
use artifact_patcher::telemetry::init_tracing;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Parser)]
#[command(name = "artifact-patcher")]
#[command(about = "Patch downloaded client artifacts in place", long_about = None)]
#[command(version)]
struct Cli {
    /// Patcher config file (default: ~/.runelite/runenite/patcher.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage resources and patch every artifact of a bootstrap list
    Patch {
        /// Bootstrap JSON listing the artifacts to patch
        #[arg(short, long)]
        bootstrap: PathBuf,

        /// Patch artifacts whose hash differs from the declared one
        #[arg(long)]
        patch_anyway: bool,

        /// Continue when artifacts are missing
        #[arg(long)]
        ignore_missing_artifacts: bool,
    },

    /// Patch a single archive in place
    PatchFile {
        /// Archive to patch; its file name selects the strategies
        archive: PathBuf,
    },

    /// Unpack bundled resources without patching anything
    Stage {
        /// Bundle directory (overrides paths.bundle_dir)
        #[arg(short, long)]
        bundle: Option<PathBuf>,
    },

    /// Show staged resources and the active strategies
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(
        cli.json_logs,
        if cli.verbose { Level::DEBUG } else { Level::INFO },
    );

    let home = home::home_dir().context("could not determine the home directory")?;
    let config = config::load(cli.config.as_deref(), &home)?;

    match cli.command {
        Commands::Patch {
            bootstrap,
            patch_anyway,
            ignore_missing_artifacts,
        } => cmd_patch(
            &config,
            &home,
            &bootstrap,
            RunOptions {
                patch_anyway,
                ignore_missing_artifacts,
            },
        ),

        Commands::PatchFile { archive } => cmd_patch_file(&config, &home, &archive),

        Commands::Stage { bundle } => cmd_stage(&config, &home, bundle),

        Commands::Status => cmd_status(&config, &home),
    }
}

#[derive(Default)]
struct Totals {
    patched: usize,
    already_applied: usize,
    skipped: usize,
    failed: usize,
}

impl Totals {
    fn print(&self) {
        println!("{}", "Summary:".bold());
        println!("  {} patched", format!("{}", self.patched).green());
        println!(
            "  {} already applied",
            format!("{}", self.already_applied).yellow()
        );
        println!("  {} skipped", format!("{}", self.skipped).cyan());
        println!("  {} failed", format!("{}", self.failed).red());
    }
}

fn report(name: &str, result: &Result<PatchOutcome, ArtifactError>, totals: &mut Totals) {
    match result {
        Ok(PatchOutcome::NotApplicable) => {
            println!("{} {}: no applicable patches", "⊘".cyan(), name);
            totals.skipped += 1;
        }
        Ok(outcome @ PatchOutcome::Patched { strategies, .. }) => {
            let changed = strategies
                .iter()
                .any(|(_, result)| matches!(result, PatchResult::Applied { .. }));
            if changed {
                println!("{} {}: {}", "✓".green(), name, outcome);
                totals.patched += 1;
            } else {
                println!("{} {}: {}", "⊙".yellow(), name, outcome);
                totals.already_applied += 1;
            }
            for (strategy, result) in strategies {
                println!("    {}: {}", strategy, result.to_string().dimmed());
            }
        }
        Err(e) => {
            eprintln!("{} {}: {}", "✗".red(), name, e);
            totals.failed += 1;

            if let ArtifactError::Strategy { source, .. } = e {
                match source {
                    PatchError::PatternNotFound { .. } => {
                        eprintln!("  {}", "CONFLICT: patch target not found".red());
                        eprintln!("  The artifact may be a different build than this patcher supports.");
                    }
                    PatchError::CapacityViolation { .. } | PatchError::AmbiguousBoundary { .. } => {
                        eprintln!("  {}", "CONFLICT: embedded value has an unexpected shape".red());
                    }
                    _ => {}
                }
            }
            eprintln!("  Original artifact left unchanged.");
        }
    }
}

fn cmd_patch(config: &PatcherConfig, home: &Path, bootstrap: &Path, options: RunOptions) -> Result<()> {
    let context = RunContext::new(config, config.resolve(home), options);
    let artifacts = Bootstrap::load(bootstrap)?.artifacts;
    let known = context.known_artifacts()?;

    println!("Repository: {}", context.paths().repo_dir.display());
    println!("Artifacts: {}", artifacts.len());
    println!();

    let plan = context.plan(&artifacts, &known)?;
    let mut totals = Totals::default();

    for (artifact, selection) in &plan.entries {
        match selection {
            Selection::Skip { reason } => {
                println!("{} {}: skipped ({})", "⊘".cyan(), artifact.name, reason);
                totals.skipped += 1;
            }
            Selection::Missing => {
                println!("{} {}: missing", "⊘".yellow(), artifact.name);
                totals.skipped += 1;
            }
            Selection::Patch | Selection::Restore { .. } => {}
        }
    }

    for (name, result) in context.execute(&plan)? {
        report(&name, &result, &mut totals);
    }

    println!();
    totals.print();

    if totals.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_patch_file(config: &PatcherConfig, home: &Path, archive: &Path) -> Result<()> {
    let mut paths = config.resolve(home);
    if let Some(parent) = archive.parent().filter(|p| !p.as_os_str().is_empty()) {
        paths.repo_dir = parent.to_path_buf();
    }
    let context = RunContext::new(config, paths, RunOptions::default());
    context.stage()?;

    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", archive.display()))?;

    let mut totals = Totals::default();
    let result = context.patcher().patch_file(archive);
    report(&name, &result, &mut totals);

    if totals.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_stage(config: &PatcherConfig, home: &Path, bundle: Option<PathBuf>) -> Result<()> {
    let mut paths = config.resolve(home);
    if bundle.is_some() {
        paths.bundle_dir = bundle;
    }
    let context = RunContext::new(config, paths, RunOptions::default());

    let Some(report) = context.stage()? else {
        anyhow::bail!(
            "{}\n  {}",
            "No bundle directory configured.".red(),
            "Pass --bundle <dir> or set paths.bundle_dir in the config file."
        );
    };

    for path in &report.staged {
        println!("{} {}", "✓".green(), path.display());
    }
    for path in &report.existing {
        println!("{} {} (already staged)", "⊙".yellow(), path.display());
    }
    println!();
    println!(
        "{} staged, {} already present",
        format!("{}", report.staged.len()).green(),
        format!("{}", report.existing.len()).yellow()
    );
    Ok(())
}

fn cmd_status(config: &PatcherConfig, home: &Path) -> Result<()> {
    let context = RunContext::new(config, config.resolve(home), RunOptions::default());
    let layout = context.layout();
    let keystore = layout.keystore(&config.signing.keystore);

    println!("{}", "Patcher Status Report".bold());
    println!("Repository: {}", context.paths().repo_dir.display());
    println!("Resources: {}", layout.root().display());
    println!();

    println!("{}", "Staged resources:".bold());
    for (label, path) in [
        ("replacement key", layout.key_file()),
        ("replacement port", layout.port_file()),
        ("client files", layout.client_dir()),
        ("api additions", layout.api_dir()),
        ("signing keystore", keystore),
    ] {
        if path.exists() {
            println!("  {} {}", "✓".green(), label);
        } else {
            println!("  {} {} ({})", "✗".red(), label, path.display().to_string().dimmed());
        }
    }
    println!();

    let repo_dir = &context.paths().repo_dir;
    if !repo_dir.is_dir() {
        println!("{}", "Repository directory does not exist yet.".yellow());
        return Ok(());
    }

    println!("{}", "Artifacts:".bold());
    let mut names: Vec<String> = std::fs::read_dir(repo_dir)
        .with_context(|| format!("failed to list {}", repo_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    for file_name in names {
        let Some(name) = logical_name(&file_name) else {
            continue;
        };
        let active: Vec<&str> = context
            .patcher()
            .applicable(name)
            .into_iter()
            .map(|s| s.name())
            .collect();
        if active.is_empty() {
            continue;
        }
        println!("  - {} ({})", file_name, active.join(", ").dimmed());
    }

    Ok(())
}
