//! Tagline CLI - tag registry sync for note collections.

use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tagline_core::{ConfirmRequest, ConfirmationSurface, TagService};
use tagline_http::HttpTagService;
use tagline_sqlite::SqliteTagService;
use tagline_store::{SessionConfig, TagSession};

const TAGLINE_DIR: &str = ".tagline";
const DB_FILE: &str = "db.sqlite";

#[derive(Parser)]
#[command(
    name = "tagline",
    about = "Tag registry sync for note collections",
    version
)]
struct Cli {
    /// Remote notes server URL (uses the local database when unset)
    #[arg(long, env = "TAGLINE_SERVER", global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new tagline database in the current directory
    Init {
        /// Delete existing database and reinitialize
        #[arg(long)]
        reinitialize: bool,
    },
    /// Add a note (tags are derived from #hashtags in the body)
    Add {
        /// Note body (reads from stdin if not provided)
        #[arg(long)]
        body: Option<String>,
    },
    /// Remove one or more notes
    RmNote {
        /// Comma-separated note IDs
        ids: String,
    },
    /// List all tags, most used first
    Tags {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a tag
    Rm {
        tag: String,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Rename a tag across all notes
    Mv {
        old: String,
        new: String,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Rebuild the tag index from note content
    Rebuild {
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

/// Terminal confirmation prompt. `assume_yes` approves without asking; a
/// non-interactive stdin declines rather than hanging.
struct TermConfirm {
    assume_yes: bool,
}

#[async_trait::async_trait]
impl ConfirmationSurface for TermConfirm {
    async fn confirm(&self, request: ConfirmRequest) -> bool {
        if self.assume_yes {
            return true;
        }
        if !atty::is(atty::Stream::Stdin) {
            eprintln!("Refusing to proceed without confirmation; pass --yes.");
            return false;
        }
        let prompt = match request {
            ConfirmRequest::RebuildAll => "Rebuild tags for all notes?".to_string(),
            ConfirmRequest::DeleteTag { tag } => {
                format!("Delete tag \"{}\" from all notes?", tag)
            }
            ConfirmRequest::RenameTag { old, new } => {
                format!("Rename tag \"{}\" to \"{}\" across all notes?", old, new)
            }
        };
        eprint!("{} [y/N] ", prompt);
        let _ = io::stderr().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim(), "y" | "Y" | "yes")
    }
}

/// Find the .tagline directory by searching up from current directory
fn find_tagline_dir() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;
    loop {
        let tagline_path = current.join(TAGLINE_DIR);
        if tagline_path.is_dir() {
            return Some(tagline_path);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Get the database path, or error if not initialized
fn get_db_path() -> Result<PathBuf> {
    match find_tagline_dir() {
        Some(dir) => Ok(dir.join(DB_FILE)),
        None => {
            bail!("No .tagline directory found. Run 'tagline init' to initialize a new database.")
        }
    }
}

fn open_local() -> Result<SqliteTagService> {
    let path = get_db_path()?;
    if !path.exists() {
        bail!(
            "Database file not found at {}. Run 'tagline init' to create a new database.",
            path.display()
        );
    }
    SqliteTagService::open(&path).context("Failed to open database")
}

fn backend(server: Option<&str>) -> Result<Arc<dyn TagService>> {
    match server {
        Some(url) => Ok(Arc::new(HttpTagService::new(url)?)),
        None => Ok(Arc::new(open_local()?)),
    }
}

fn parse_ids(ids: &str) -> Result<Vec<i64>> {
    ids.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().context(format!("Invalid note ID: {}", s)))
        .collect()
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read from stdin")?;
    Ok(buf)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Init { reinitialize } = cli.command {
        let dir = PathBuf::from(TAGLINE_DIR);
        let db_path = dir.join(DB_FILE);

        if dir.exists() {
            if db_path.exists() {
                if reinitialize {
                    std::fs::remove_file(&db_path).context("Failed to remove existing database")?;
                } else {
                    bail!("Tagline is already initialized in this directory. Use --reinitialize to delete and recreate.");
                }
            }
        } else {
            std::fs::create_dir_all(&dir).context("Failed to create .tagline directory")?;
        }

        let db = SqliteTagService::open(&db_path).context("Failed to create database")?;
        db.run_migrations()
            .context("Failed to initialize database schema")?;

        if reinitialize {
            println!("Reinitialized tagline database in {}", db_path.display());
        } else {
            println!("Initialized tagline database in {}", db_path.display());
        }
        return Ok(());
    }

    // Note editing always works against the local database.
    match &cli.command {
        Commands::Add { .. } | Commands::RmNote { .. } if cli.server.is_some() => {
            bail!("Note editing requires a local database; drop --server.");
        }
        _ => {}
    }

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Add { body } => {
            let db = open_local()?;
            let body = match body {
                Some(b) => b,
                None => read_stdin()?,
            };
            let id = db.add_note(&body)?;
            println!("Added note {}", id);
        }

        Commands::RmNote { ids } => {
            let db = open_local()?;
            let ids = parse_ids(&ids)?;
            if ids.is_empty() {
                eprintln!("No note IDs provided");
                std::process::exit(1);
            }

            let mut not_found = Vec::new();
            for id in &ids {
                if db.remove_note(*id)? {
                    println!("Removed note {}", id);
                } else {
                    not_found.push(*id);
                }
            }
            if !not_found.is_empty() {
                for id in &not_found {
                    eprintln!("Note {} not found", id);
                }
                std::process::exit(1);
            }
        }

        command => {
            let service = backend(cli.server.as_deref())?;
            let session = TagSession::new(service, SessionConfig::from_env());
            run_tag_command(command, &session).await?;
        }
    }

    Ok(())
}

async fn run_tag_command(command: Commands, session: &TagSession) -> Result<()> {
    match command {
        Commands::Tags { json } => {
            session.store().fetch(true).await?;
            let tags = session.store().ordered_tags();
            if json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
            } else if tags.is_empty() {
                println!("No tags yet. Add notes with #hashtags to create some.");
            } else {
                for tag in tags {
                    let noun = if tag.count == 1 { "note" } else { "notes" };
                    println!("{} ({} {})", tag.name, tag.count, noun);
                }
            }
        }

        Commands::Rm { tag, yes } => {
            let confirm = TermConfirm { assume_yes: yes };
            if session.delete_tag(&tag, &confirm).await? {
                println!("Deleted tag {}", tag);
            } else {
                eprintln!("Aborted.");
                std::process::exit(1);
            }
        }

        Commands::Mv { old, new, yes } => {
            let confirm = TermConfirm { assume_yes: yes };
            if session.rename_tag(&old, &new, &confirm).await? {
                println!("Renamed tag {} to {}", old, new);
            } else {
                eprintln!("Aborted.");
                std::process::exit(1);
            }
        }

        Commands::Rebuild { yes } => {
            let confirm = TermConfirm { assume_yes: yes };
            if session.rebuild_all(&confirm).await? {
                println!("Rebuilt tag index ({} tags)", session.store().len());
            } else {
                eprintln!("Aborted.");
                std::process::exit(1);
            }
        }

        Commands::Init { .. } | Commands::Add { .. } | Commands::RmNote { .. } => unreachable!(),
    }

    Ok(())
}
