// src/main.rs

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use gridfeed::config::Config;
use gridfeed::feed::{Feed, FeedManifest, Stage, list_feeds};
use gridfeed::observe::TracingObserver;
use gridfeed::transform::Transformer;
use std::io;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "gridfeed")]
#[command(author, version, about = "Energy-market XML feed ingestion into SQLite", long_about = None)]
struct Cli {
    /// Data root (default: the configured root)
    #[arg(short, long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the client configuration, or update it with --root
    Config {
        /// New data root to persist
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Scaffold a new feed directory under the data root
    Create {
        /// Feed name (also the directory name)
        feed: String,
        /// Download URL template with _START_ and _END_ placeholders
        #[arg(long)]
        url: String,
        /// First report date, YYYY-MM-DD
        #[arg(long)]
        start_date: String,
        /// Seconds to sleep between downloads
        #[arg(long, default_value = "5")]
        delay: u64,
        /// XML namespace stripped from element names
        #[arg(long, default_value = "")]
        namespace: String,
        /// Column excluded from inferred primary keys (repeatable)
        #[arg(long = "exclude", default_values_t = ["value".to_string()])]
        exclusions: Vec<String>,
    },
    /// List feeds under the data root
    List,
    /// Show per-stage progress counts
    Status {
        /// Feed name (all feeds if omitted)
        feed: Option<String>,
        #[arg(long, default_value = ",")]
        separator: String,
        /// Emit a header row first
        #[arg(long)]
        header: bool,
    },
    /// Run pipeline stages for a feed
    Run {
        feed: String,
        /// Comma-separated stages (default: download,unzip,parse,insert)
        #[arg(long, value_delimiter = ',')]
        stages: Vec<String>,
    },
    /// Remove and recreate one stage directory
    Reset { feed: String, stage: String },
    /// Pack a feed directory into <dir>/<feed>.tar.gz
    Archive {
        feed: String,
        #[arg(long, default_value = "archive")]
        dir: PathBuf,
    },
    /// Restore a feed directory from an archive
    Restore { feed: String, archive: PathBuf },
    /// Transform one XML file and print the SQL script
    Parse {
        file: PathBuf,
        /// XML namespace stripped from element names
        #[arg(long, default_value = "")]
        namespace: String,
        /// Column excluded from inferred primary keys (repeatable)
        #[arg(long = "exclude", default_values_t = ["value".to_string()])]
        exclusions: Vec<String>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// CLI override wins, then the persisted configuration.
fn resolve_root(cli_root: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(root) = cli_root {
        return Ok(root);
    }
    let config = Config::load(&Config::default_path()?)?;
    Ok(config.root)
}

fn print_status(feed: &Feed, separator: &str) -> Result<()> {
    let counts = feed.status()?;
    let mut row = vec![feed.name().to_string()];
    row.extend(counts.iter().map(|c| c.to_string()));
    println!("{}", row.join(separator));
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { root } => {
            let path = Config::default_path()?;
            let mut config = Config::load(&path)?;
            if let Some(root) = root {
                config.root = root;
                config.save(&path)?;
                info!(path = %path.display(), "configuration updated");
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Create {
            feed,
            url,
            start_date,
            delay,
            namespace,
            exclusions,
        } => {
            let root = resolve_root(cli.root)?;
            let date = NaiveDate::parse_from_str(&start_date, "%Y-%m-%d")
                .with_context(|| format!("bad --start-date '{start_date}', expected YYYY-MM-DD"))?;
            let manifest = FeedManifest {
                name: feed.clone(),
                url,
                start_date: [date.year(), date.month() as i32, date.day() as i32],
                download_delay_secs: delay,
                xml_namespace: namespace,
                pk_exclusions: exclusions,
            };
            let handle = Feed::new(&root, &feed);
            handle.create(&manifest)?;
            println!("Created feed at: {}", handle.dir().display());
            Ok(())
        }
        Commands::List => {
            let root = resolve_root(cli.root)?;
            for name in list_feeds(&root)? {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Status {
            feed,
            separator,
            header,
        } => {
            let root = resolve_root(cli.root)?;
            if header {
                println!(
                    "{}",
                    ["feed name", "downloaded", "unzipped", "parsed", "inserted"]
                        .join(separator.as_str())
                );
            }
            match feed {
                Some(name) => print_status(&Feed::new(&root, &name), &separator)?,
                None => {
                    for name in list_feeds(&root)? {
                        print_status(&Feed::new(&root, &name), &separator)?;
                    }
                }
            }
            Ok(())
        }
        Commands::Run { feed, stages } => {
            let root = resolve_root(cli.root)?;
            let stages = if stages.is_empty() {
                Stage::ALL.to_vec()
            } else {
                stages
                    .iter()
                    .map(|s| s.parse::<Stage>())
                    .collect::<gridfeed::Result<Vec<_>>>()?
            };
            let handle = Feed::new(&root, &feed);
            let outcomes = handle.run(&stages, &TracingObserver)?;
            for (stage, outcome) in outcomes {
                println!(
                    "{}: {} processed, {} failed, {} previously done",
                    stage.as_str(),
                    outcome.processed,
                    outcome.failed,
                    outcome.skipped
                );
            }
            Ok(())
        }
        Commands::Reset { feed, stage } => {
            let root = resolve_root(cli.root)?;
            let stage = stage.parse::<Stage>()?;
            let dir = Feed::new(&root, &feed).reset(stage)?;
            println!("Reset stage directory: {}", dir.display());
            Ok(())
        }
        Commands::Archive { feed, dir } => {
            let root = resolve_root(cli.root)?;
            let archive = Feed::new(&root, &feed).archive(&dir)?;
            println!("Archived to: {}", archive.display());
            Ok(())
        }
        Commands::Restore { feed, archive } => {
            let root = resolve_root(cli.root)?;
            let dir = Feed::new(&root, &feed).restore(&archive)?;
            println!("Restored to: {}", dir.display());
            Ok(())
        }
        Commands::Parse {
            file,
            namespace,
            exclusions,
        } => {
            let transformer = Transformer::from_file(&file, &namespace, &exclusions)?;
            print!("{}", transformer.script()?);
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "gridfeed", &mut io::stdout());
            Ok(())
        }
    }
}
