use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kwix::config::IndexConfig;
use kwix::index::stats::show_stats;
use kwix::index::{IndexRegistry, OwnerId};
use kwix::output;
use kwix::utils::load_entries;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kwix")]
#[command(about = "Substring search over per-owner text entries")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the app data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load entries and run one query
    Query {
        /// Tab-separated entry file (owner, id, content)
        #[arg(short, long)]
        data: PathBuf,

        /// Owner to search
        #[arg(short, long)]
        owner: OwnerId,

        /// Substring to look for
        keyword: String,

        /// Print matching ids only
        #[arg(long)]
        ids_only: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
    /// Load entries and show per-owner statistics
    Stats {
        /// Tab-separated entry file (owner, id, content)
        #[arg(short, long)]
        data: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive session with the background scheduler running
    Shell {
        /// Entry file to load first
        #[arg(short, long)]
        data: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => IndexConfig::load_from(path)?,
        None => IndexConfig::load()?,
    };

    match cli.command {
        Commands::Query {
            data,
            owner,
            keyword,
            ids_only,
            no_color,
        } => {
            let registry = open_registry(config, Some(&data))?;
            let entries = registry.query_entries(owner, &keyword)?;

            if ids_only {
                let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
                output::print_ids(&ids)?;
            } else {
                output::print_entries(&entries, &keyword, !no_color)?;
            }
        }
        Commands::Stats { data, json } => {
            let registry = open_registry(config, Some(&data))?;
            let stats = registry.stats();

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                show_stats(&stats);
            }
        }
        Commands::Shell { data } => {
            let registry = open_registry(config, data.as_deref())?;
            registry.start_scheduler()?;
            let result = run_shell(&registry);
            registry.shutdown();
            result?;
        }
    }

    Ok(())
}

fn open_registry(config: IndexConfig, data: Option<&Path>) -> Result<IndexRegistry> {
    let registry = IndexRegistry::new(config)?;

    if let Some(path) = data {
        let entries = load_entries(path, io::stderr().is_terminal())?;
        registry
            .load(entries)
            .with_context(|| format!("Failed to load {}", path.display()))?;
    }

    Ok(registry)
}

const SHELL_HELP: &str = "\
commands:
  push <owner> <id> <content>   insert or replace an entry
  query <owner> <keyword>       list matching entries
  reindex                       run one rebuild sweep now
  stats                         show per-owner statistics
  quit                          exit";

fn run_shell(registry: &IndexRegistry) -> Result<()> {
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();

    if interactive {
        println!("{}", SHELL_HELP);
    }

    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            print!("kwix> ");
            io::stdout().flush()?;
        }

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;

        match run_command(registry, line.trim()) {
            Ok(true) => {}
            Ok(false) => break,
            // A bad command must not end the session
            Err(e) => eprintln!("error: {:#}", e),
        }
    }

    Ok(())
}

/// Run one shell command; `false` ends the session
fn run_command(registry: &IndexRegistry, line: &str) -> Result<bool> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

    match command {
        "" => {}
        "push" => {
            let mut args = rest.splitn(3, ' ');
            let owner: OwnerId = args
                .next()
                .context("usage: push <owner> <id> <content>")?
                .parse()
                .context("invalid owner")?;
            let id = args
                .next()
                .context("usage: push <owner> <id> <content>")?
                .parse()
                .context("invalid entry id")?;
            let content = args.next().unwrap_or("");
            registry.push(owner, id, content)?;
        }
        "query" => {
            let (owner, keyword) = rest
                .split_once(' ')
                .context("usage: query <owner> <keyword>")?;
            let owner: OwnerId = owner.parse().context("invalid owner")?;

            let start = Instant::now();
            let entries = registry.query_entries(owner, keyword)?;
            output::print_entries(&entries, keyword, true)?;
            println!(
                "{} matches in {:.2}ms",
                entries.len(),
                start.elapsed().as_secs_f64() * 1000.0
            );
        }
        "reindex" => {
            let report = registry.reindex_all()?;
            println!(
                "rebuilt {}, skipped {}, failed {}",
                report.rebuilt, report.skipped, report.failed
            );
        }
        "stats" => show_stats(&registry.stats()),
        "help" => println!("{}", SHELL_HELP),
        "quit" | "exit" => return Ok(false),
        other => anyhow::bail!("unknown command {:?} (try help)", other),
    }

    Ok(true)
}
