//! # Testimony Connections CLI (`tconn`)
//!
//! ## Usage
//!
//! ```bash
//! tconn --config ./config/tconn.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tconn init` | Create the SQLite database and run schema migrations |
//! | `tconn import <file>` | Import testimonies from a JSON file |
//! | `tconn approve <id>` | Approve a testimony and run transcribe, embed, discover |
//! | `tconn transcribe <id>` | Transcribe an audio/video testimony |
//! | `tconn embed pending` | Embed approved testimonies with missing or stale vectors |
//! | `tconn embed testimony <id>` | Embed one testimony |
//! | `tconn discover <id>` | Recompute connections for one testimony (`--all` for every one) |
//! | `tconn connections <id>` | Show connections for a testimony (`--all` for the archive) |
//! | `tconn serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use testimony_connections::{
    config, discover, embed_cmd, logging, migrate, server, testimonies,
};

/// Testimony Connections CLI: embeddings and connection discovery for a
/// testimony archive.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tconn.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tconn",
    about = "Testimony Connections: embeddings and connection discovery for a testimony archive",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tconn.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Import testimonies from a JSON file (one object or an array).
    ///
    /// Testimonies without an `id` get a generated one. Existing ids are
    /// replaced.
    Import {
        /// Path to the JSON file.
        file: PathBuf,
    },

    /// Approve a testimony, then transcribe, embed and discover in the
    /// foreground.
    Approve {
        /// Testimony id.
        id: String,
    },

    /// Transcribe an audio or video testimony that has no transcript yet.
    Transcribe {
        /// Testimony id.
        id: String,
    },

    /// Embedding management.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Recompute connections.
    Discover {
        /// Testimony id.
        id: Option<String>,

        /// Run for every approved testimony.
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },

    /// Show stored connections, best first.
    Connections {
        /// Testimony id.
        id: Option<String>,

        /// Show the best connections across the archive.
        #[arg(long, conflicts_with = "id")]
        all: bool,

        /// Maximum results (default 10, capped at 50).
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed approved testimonies whose sections lack an up-to-date vector.
    Pending,

    /// Embed one testimony.
    Testimony {
        /// Testimony id.
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file } => {
            testimonies::run_import(&cfg, &file).await?;
        }
        Commands::Approve { id } => {
            testimonies::run_approve(&cfg, &id).await?;
        }
        Commands::Transcribe { id } => {
            testimonies::run_transcribe(&cfg, &id).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending => {
                embed_cmd::run_embed_pending(&cfg).await?;
            }
            EmbedAction::Testimony { id } => {
                embed_cmd::run_embed_testimony(&cfg, &id).await?;
            }
        },
        Commands::Discover { id, all } => {
            discover::run_discover(&cfg, id.as_deref(), all).await?;
        }
        Commands::Connections { id, all, limit } => {
            testimonies::run_connections(&cfg, id.as_deref(), all, limit).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
