//! Admin CLI for inspecting and maintaining loopguard's on-disk state.
//! The hook binaries in `src/bin/` are the program most of the time;
//! this one is for a human poking at what they left behind.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use loopguard::config::Config;
use loopguard::memory::{manifest, store};
use loopguard::{autonomous, checkpoint, project};

#[derive(Parser)]
#[command(name = "loopguard")]
#[command(about = "Inspect and maintain loopguard's autonomous-mode and memory state")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory to operate on (defaults to the current directory)
    #[arg(short = 'C', long, value_name = "DIR")]
    workdir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evict memory events past the retention budget
    Gc,

    /// Reclaim expired autonomous-mode state
    Sweep,

    /// Rebuild the memory manifest from the event log on disk
    RebuildManifest,

    /// Print the active autonomous-mode state, if any
    ShowState,

    /// Print the current completion checkpoint
    ShowCheckpoint,
}

fn main() -> Result<()> {
    let _guard = loopguard::telemetry::init(&Config::from_env().debug_log_path);
    let cli = Cli::parse();

    let cwd = match cli.workdir {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolving current directory")?,
    };

    match cli.command {
        Commands::Gc => run_gc(&cwd),
        Commands::Sweep => run_sweep(&cwd),
        Commands::RebuildManifest => run_rebuild_manifest(&cwd),
        Commands::ShowState => run_show_state(&cwd),
        Commands::ShowCheckpoint => run_show_checkpoint(&cwd),
    }
}

fn memory_root(cwd: &std::path::Path) -> PathBuf {
    let id = project::ProjectId::resolve(cwd);
    project::memory_root(&loopguard::config::user_config_root(), &id)
}

fn run_gc(cwd: &std::path::Path) -> Result<()> {
    let removed = store::gc(&memory_root(cwd)).context("running memory gc")?;
    if removed.is_empty() {
        println!("{}", "nothing to evict".dimmed());
    } else {
        println!("{} {} event(s):", "evicted".red().bold(), removed.len());
        for id in &removed {
            println!("  {id}");
        }
    }
    Ok(())
}

fn run_sweep(cwd: &std::path::Path) -> Result<()> {
    let cfg = Config::from_env();
    let swept = autonomous::sweep_expired(cwd, &cfg).context("sweeping autonomous state")?;
    if swept {
        println!("{}", "expired autonomous state reclaimed".yellow());
    } else {
        println!("{}", "no expired state found".dimmed());
    }
    Ok(())
}

fn run_rebuild_manifest(cwd: &std::path::Path) -> Result<()> {
    let root = memory_root(cwd);
    let rebuilt = manifest::rebuild(&root).context("rebuilding manifest")?;
    println!(
        "{} manifest rebuilt: {} event(s), {} recent id(s)",
        "ok".green().bold(),
        rebuilt.total_count,
        rebuilt.recent_ids.len()
    );
    Ok(())
}

fn run_show_state(cwd: &std::path::Path) -> Result<()> {
    match autonomous::inspect(cwd) {
        Some(state) => {
            println!("{}: {}", "mode".cyan(), state.mode);
            println!("{}: {}", "session_id".cyan(), state.session_id);
            println!("{}: {}", "origin_project".cyan(), state.origin_project.display());
            println!("{}: {}", "started_at".cyan(), state.started_at);
            println!("{}: {}", "last_activity_at".cyan(), state.last_activity_at);
            println!("{}: {}", "iteration".cyan(), state.iteration);
            println!("{}: {}", "plan_mode_completed".cyan(), state.plan_mode_completed);
        }
        None => println!("{}", "no autonomous state active for this project".dimmed()),
    }
    Ok(())
}

fn run_show_checkpoint(cwd: &std::path::Path) -> Result<()> {
    let checkpoint = checkpoint::load(cwd).context("loading completion checkpoint")?;
    let text = serde_json::to_string_pretty(&checkpoint).context("serializing checkpoint")?;
    println!("{text}");

    match checkpoint::validate_structure(&checkpoint) {
        Ok(()) => println!("{}", "structurally valid".green()),
        Err(e) => println!("{} {e}", "invalid:".red().bold()),
    }
    Ok(())
}
