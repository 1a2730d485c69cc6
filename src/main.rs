use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use codescape::activity::EventLog;
use codescape::config::AppConfig;
use codescape::logging::init_logging;
use codescape::scanner::Scanner;
use codescape::snapshot::{CellView, Session};
use codescape::tree::Entry;

#[derive(Parser)]
#[command(name = "codescape", version, about = "Radial codebase layout with agent activity overlay")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved layout as JSON
    Layout {
        /// Base directory of the codebase
        root: PathBuf,
        /// Read entries from a JSON array instead of scanning ROOT
        #[arg(long)]
        entries: Option<PathBuf>,
        /// Newline-delimited JSON activity events to apply
        #[arg(long)]
        events: Option<PathBuf>,
        /// Lay out the subtree at this path instead of the whole tree
        #[arg(long)]
        view: Option<PathBuf>,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long)]
        pretty: bool,
    },
    /// List directories whose descendant count reaches the threshold
    LargeDirs {
        root: PathBuf,
        #[arg(long)]
        threshold: Option<usize>,
    },
}

#[derive(Serialize)]
struct LayoutOutput {
    base: PathBuf,
    view: PathBuf,
    cells: Vec<CellView>,
}

fn load_entries(root: &Path, entries_file: Option<&Path>, config: &AppConfig) -> Result<Vec<Entry>> {
    match entries_file {
        Some(file) => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("reading entries from {}", file.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", file.display()))
        }
        None => {
            let (entries, _) = Scanner::new()
                .scan(root, &config.scan)
                .with_context(|| format!("scanning {}", root.display()))?;
            Ok(entries)
        }
    }
}

/// Scanned paths are absolute so they match paths named by activity events.
fn resolve_root(root: PathBuf, from_entries_file: bool) -> Result<PathBuf> {
    if from_entries_file {
        return Ok(root);
    }
    root.canonicalize()
        .with_context(|| format!("resolving {}", root.display()))
}

fn run_layout(
    config: AppConfig,
    root: PathBuf,
    entries_file: Option<PathBuf>,
    events: Option<PathBuf>,
    view: Option<PathBuf>,
    pretty: bool,
) -> Result<()> {
    let root = resolve_root(root, entries_file.is_some())?;
    let entries = load_entries(&root, entries_file.as_deref(), &config)?;
    let mut session = Session::new(config.layout.clone(), config.large_directory_threshold);
    session.load(&entries, &root);

    if let Some(events_path) = events {
        let mut log = EventLog::new(&events_path);
        let batch = log
            .read_new()
            .with_context(|| format!("reading events from {}", events_path.display()))?;
        let matched = batch
            .iter()
            .filter(|event| session.apply_event(event).is_some())
            .count();
        tracing::info!(events = batch.len(), matched, "activity applied");
    }

    let snapshot = session
        .snapshot()
        .context("no snapshot loaded")?;
    let view = view.unwrap_or_else(|| root.clone());
    let cells = snapshot.layout_for_root(&view);
    let output = LayoutOutput {
        base: root,
        view,
        cells: snapshot.cell_views(&cells),
    };

    let json = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", json);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    init_logging(&config.logging)?;

    match cli.command {
        Command::Layout {
            root,
            entries,
            events,
            view,
            max_depth,
            pretty,
        } => {
            if let Some(depth) = max_depth {
                config.layout.max_depth = depth;
            }
            run_layout(config, root, entries, events, view, pretty)
        }
        Command::LargeDirs { root, threshold } => {
            if let Some(threshold) = threshold {
                config.large_directory_threshold = threshold;
            }
            let root = resolve_root(root, false)?;
            let entries = load_entries(&root, None, &config)?;
            let mut session = Session::new(config.layout.clone(), config.large_directory_threshold);
            session.load(&entries, &root);
            for path in session.large_directories() {
                println!("{}", path.display());
            }
            Ok(())
        }
    }
}
