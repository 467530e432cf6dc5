//! `tsplay` command line
//!
//! Single run: start once, print events until the run finishes and exit with
//! the program's code. Watch mode: re-run on every save, debounced like the
//! editor's auto-run, until Ctrl-C.

use anyhow::{bail, Context, Result};
use clap::Parser;
use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tsplay_core::{
    Debouncer, PlaygroundConfig, RunEvent, RunOptions, RunSupervisor, SourceDocument,
    SupervisorConfig,
};

use crate::node::NodeContainer;
use crate::render::{exit_code, print_event};

pub const DEFAULT_CONFIG_FILE: &str = "tsplay.toml";

/// Run a TypeScript file and map its console output back to source lines
#[derive(Parser, Debug)]
#[command(name = "tsplay")]
#[command(about = "Run a TypeScript file and map its console output back to source lines")]
pub struct Args {
    /// TypeScript file to run
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Re-run whenever the file changes
    #[arg(long)]
    pub watch: bool,

    /// Do not annotate console calls with their source line
    #[arg(long)]
    pub no_match_lines: bool,

    /// Extra environment variable for the program (repeatable)
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Print run events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Config file [default: ./tsplay.toml when present]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for the composed files [default: a fresh temporary directory]
    #[arg(long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Program that executes the composed entry file
    #[arg(long, value_name = "PROGRAM")]
    pub node: Option<String>,
}

pub fn parse_env(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))
}

/// Explicit config path, else `./tsplay.toml` if present, else defaults.
pub fn load_config(path: Option<&Path>) -> Result<PlaygroundConfig> {
    if let Some(path) = path {
        return PlaygroundConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()));
    }
    let implicit = Path::new(DEFAULT_CONFIG_FILE);
    if implicit.is_file() {
        return PlaygroundConfig::load(implicit).context("loading ./tsplay.toml");
    }
    Ok(PlaygroundConfig::default())
}

/// Combine file config and flags. Flags win.
pub fn resolve(args: &Args, config: &PlaygroundConfig) -> (SupervisorConfig, RunOptions) {
    let mut supervisor = SupervisorConfig::from(&config.run);
    if let Some(node) = &args.node {
        supervisor.program = node.clone();
    }

    let mut env = config.env.clone();
    env.extend(args.env.iter().cloned());
    let options = RunOptions {
        match_lines: config.run.match_lines && !args.no_match_lines,
        env,
    };
    (supervisor, options)
}

pub fn read_source(path: &Path) -> Result<SourceDocument> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(SourceDocument::new(path.display().to_string(), text))
}

/// Returns the process exit code for the CLI.
pub async fn run(args: Args) -> Result<i32> {
    let config = load_config(args.config.as_deref())?;
    let (supervisor_config, options) = resolve(&args, &config);

    // Keeps the temporary directory alive until the run is over
    let (_scratch, workdir) = match &args.workdir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
            (None, dir.clone())
        }
        None => {
            let scratch = tempfile::Builder::new()
                .prefix("tsplay-")
                .tempdir()
                .context("creating work directory")?;
            let path = scratch.path().to_path_buf();
            (Some(scratch), path)
        }
    };
    info!(workdir = %workdir.display(), program = %supervisor_config.program, "using node container");

    let container = Arc::new(NodeContainer::new(workdir));
    let supervisor = RunSupervisor::with_swc(container, supervisor_config);

    if args.watch {
        // Disabled auto-run still re-runs on save, just without the quiet period
        let delay = if config.auto_run.enabled {
            config.auto_run.delay()
        } else {
            Duration::ZERO
        };
        watch(&supervisor, &args.file, options, delay, args.json).await?;
        Ok(0)
    } else {
        run_once(&supervisor, &args.file, options, args.json).await
    }
}

async fn run_once(
    supervisor: &RunSupervisor,
    path: &Path,
    options: RunOptions,
    json: bool,
) -> Result<i32> {
    let mut events = supervisor.subscribe();
    let run_id = supervisor.start(read_source(path)?, options);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    bail!("supervisor stopped reporting events");
                };
                print_event(&event, json);
                if let RunEvent::Finished { run_id: id, outcome } = &event {
                    if *id == run_id {
                        return Ok(exit_code(outcome));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => supervisor.stop(),
        }
    }
}

async fn watch(
    supervisor: &RunSupervisor,
    path: &Path,
    options: RunOptions,
    delay: Duration,
    json: bool,
) -> Result<()> {
    let file_name = path
        .file_name()
        .with_context(|| format!("not a file: {}", path.display()))?
        .to_owned();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    // Editors often replace the file on save, so watch the directory
    let (tx, mut changes) = mpsc::channel(16);
    let mut watcher = notify::recommended_watcher(move |res: Result<NotifyEvent, _>| {
        if let Ok(event) = res {
            let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                && event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str()));
            if relevant {
                let _ = tx.blocking_send(());
            }
        }
    })?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("watching {}", dir.display()))?;
    if !json {
        eprintln!("-- watching {} (Ctrl-C to quit)", path.display());
    }

    let mut events = supervisor.subscribe();
    let mut debouncer = Debouncer::new(delay);
    start_from_file(supervisor, path, &options);

    loop {
        tokio::select! {
            Some(()) = changes.recv() => {
                let supervisor = supervisor.clone();
                let path = path.to_path_buf();
                let options = options.clone();
                debouncer.schedule(move || start_from_file(&supervisor, &path, &options));
            }
            Some(event) = events.recv() => print_event(&event, json),
            _ = tokio::signal::ctrl_c() => {
                debouncer.cancel();
                supervisor.stop();
                break;
            }
        }
    }

    while let Ok(event) = events.try_recv() {
        print_event(&event, json);
    }
    Ok(())
}

fn start_from_file(supervisor: &RunSupervisor, path: &Path, options: &RunOptions) {
    match read_source(path) {
        Ok(doc) => {
            supervisor.start(doc, options.clone());
        }
        Err(e) => warn!("skipping run: {:#}", e),
    }
}
