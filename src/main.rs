//! # Spec Registry CLI (`specreg`)
//!
//! The `specreg` binary is the primary interface for the registry. It
//! provides commands for database initialization, document registration and
//! retrieval, slug management, refresh, aggregation, backup, and starting
//! the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! specreg --config ./config/specreg.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `specreg init` | Create the SQLite database and run schema migrations |
//! | `specreg validate --file <path>` | Validate a document without registering it |
//! | `specreg register --url <url> --user <name>` | Register a document from its source URL |
//! | `specreg get <token>` | Retrieve a document by id or slug (`all` lists) |
//! | `specreg search "<query>"` | Full-text search over registered documents |
//! | `specreg slug <id> --user <name> --set <slug>` | Assign or clear a slug |
//! | `specreg refresh <id>` | Re-fetch a document from its source URL |
//! | `specreg delete <id> --user <name>` | Delete a document (owner only) |
//! | `specreg tags <field>` | Distinct values of a field with counts |
//! | `specreg export` | Write every document to a JSON backup file |
//! | `specreg restore <file>` | Restore a backup into an empty database |
//! | `specreg serve` | Start the HTTP API server |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use spec_registry::config::{self, Config};
use spec_registry::db;
use spec_registry::export;
use spec_registry::fetch::{Fetcher, HttpFetcher};
use spec_registry::migrate;
use spec_registry::notify::{Notifier, NullNotifier, WebhookNotifier};
use spec_registry::registry::{GetOptions, GetResult, RegisterOptions, Registry};
use spec_registry::server;
use spec_registry::store::DocStore;

/// Spec Registry CLI — a registry for OpenAPI and Swagger API description
/// documents with content-addressable identity and refresh reconciliation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/specreg.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "specreg",
    about = "Spec Registry — a registry for OpenAPI/Swagger API description documents",
    version,
    long_about = "Spec Registry stores API description documents verbatim, derives a \
    content-addressable identity from their metadata for deduplication, gates mutations \
    on ownership, and reconciles stored copies against their source URLs."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/specreg.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (documents,
    /// documents_fts). Idempotent — running it multiple times is safe.
    Init,

    /// Validate a document without registering it.
    ///
    /// Prints the structured violation report as JSON. Exits nonzero when
    /// the document is invalid.
    Validate {
        /// Path to the document (JSON).
        #[arg(long)]
        file: PathBuf,
    },

    /// Register a document.
    ///
    /// Reads the document from `--file` or fetches it from `--url`; the URL
    /// is always recorded as the refresh source. Registration is rejected
    /// when a document with the same identity already exists, unless
    /// `--overwrite` is given and the caller owns the existing record.
    Register {
        /// Source URL of the document, recorded for refresh.
        #[arg(long)]
        url: String,

        /// Read document bytes from this file instead of fetching the URL.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Caller identity; becomes the document owner.
        #[arg(long)]
        user: String,

        /// Overwrite an existing document with the same identity.
        #[arg(long)]
        overwrite: bool,

        /// On overwrite, clear the slug and refresh status instead of
        /// preserving them.
        #[arg(long)]
        reset_meta: bool,

        /// Run every gate without persisting anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Retrieve a document by id or slug.
    ///
    /// The token `all` lists documents instead. Archived documents are
    /// hidden unless `--include-archived` is given.
    Get {
        /// Document id, slug, or `all`.
        token: String,

        /// Comma-separated top-level fields to print.
        #[arg(long)]
        fields: Option<String>,

        /// Page size when listing.
        #[arg(long)]
        size: Option<i64>,

        /// Offset when listing.
        #[arg(long, default_value_t = 0)]
        from: i64,

        /// Include archived documents.
        #[arg(long)]
        include_archived: bool,
    },

    /// Full-text search over the indexed projection.
    Search {
        /// The search query string.
        query: String,

        /// Comma-separated top-level fields to print.
        #[arg(long)]
        fields: Option<String>,

        /// Maximum number of results.
        #[arg(long)]
        size: Option<i64>,

        /// Result offset.
        #[arg(long, default_value_t = 0)]
        from: i64,
    },

    /// Assign or clear a document's slug.
    ///
    /// Exactly one of `--set` or `--remove` must be given. Owner only.
    Slug {
        /// Document id.
        id: String,

        /// Caller identity.
        #[arg(long)]
        user: String,

        /// The slug to assign.
        #[arg(long)]
        set: Option<String>,

        /// Remove the slug, requiring it to currently equal this value.
        #[arg(long)]
        remove: Option<String>,
    },

    /// Re-fetch a document from its source URL and reconcile the stored
    /// copy. Prints the resulting refresh status.
    Refresh {
        /// Document id.
        id: String,
    },

    /// Delete a document. Owner only.
    Delete {
        /// Document id.
        id: String,

        /// Caller identity.
        #[arg(long)]
        user: String,
    },

    /// Distinct existing values of a field with their counts.
    Tags {
        /// Field name (e.g. `info.contact.name`, `tags.name`).
        field: String,

        /// Maximum number of values.
        #[arg(long, default_value_t = 100)]
        size: usize,
    },

    /// Write every document to a JSON backup file.
    Export {
        /// Output path. Defaults to a datestamped file in the current
        /// directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Restore a backup into an empty database.
    Restore {
        /// Path to a backup file produced by `export`.
        file: PathBuf,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// registry API endpoints.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // Validation needs no database or config.
    if let Commands::Validate { file } = &cli.command {
        let raw = std::fs::read(file)
            .with_context(|| format!("Failed to read document file: {}", file.display()))?;
        let report = spec_registry::metadata::validate(&raw);
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.valid {
            std::process::exit(1);
        }
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Validate { .. } => unreachable!(),
        Commands::Register {
            url,
            file,
            user,
            overwrite,
            reset_meta,
            dry_run,
        } => {
            let registry = build_registry(&cfg).await?;
            let raw = match file {
                Some(path) => std::fs::read(&path)
                    .with_context(|| format!("Failed to read document file: {}", path.display()))?,
                None => {
                    let fetcher = HttpFetcher::new(cfg.fetch.timeout_secs);
                    let outcome = fetcher
                        .fetch(&url)
                        .await
                        .map_err(|e| anyhow::anyhow!("failed to fetch '{}': {}", url, e))?;
                    if !outcome.is_success() {
                        bail!("'{}' returned HTTP {}", url, outcome.status);
                    }
                    outcome.body
                }
            };
            let opts = RegisterOptions {
                source_url: url,
                allow_overwrite: overwrite,
                require_same_owner: true,
                reset_meta,
                dry_run,
            };
            let registration = registry.register(&raw, &user, &opts).await?;
            if dry_run {
                println!("Dry run passed; would register as {}", registration.id);
            } else if registration.created {
                println!("Registered new document {}", registration.id);
            } else {
                println!("Overwrote document {}", registration.id);
            }
        }
        Commands::Get {
            token,
            fields,
            size,
            from,
            include_archived,
        } => {
            let registry = build_registry(&cfg).await?;
            let opts = GetOptions {
                fields: fields.map(split_fields),
                include_archived,
                page_size: size,
                offset: from,
            };
            let result = registry.get(&token, &opts).await?;
            let value = match result {
                GetResult::One(v) => v,
                GetResult::Many(vs) => serde_json::Value::Array(vs),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Search {
            query,
            fields,
            size,
            from,
        } => {
            let registry = build_registry(&cfg).await?;
            let opts = GetOptions {
                fields: fields.map(split_fields),
                include_archived: false,
                page_size: size,
                offset: from,
            };
            let results = registry.search(&query, &opts).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Slug {
            id,
            user,
            set,
            remove,
        } => {
            let registry = build_registry(&cfg).await?;
            match (set, remove) {
                (Some(slug), None) => {
                    registry.set_alias(&id, &user, Some(&slug)).await?;
                    println!("Slug '{}' assigned to {}", slug.to_lowercase(), id);
                }
                (None, Some(expected)) => {
                    registry.remove_alias(&id, &user, &expected).await?;
                    println!("Slug removed from {}", id);
                }
                _ => bail!("exactly one of --set or --remove must be given"),
            }
        }
        Commands::Refresh { id } => {
            let registry = build_registry(&cfg).await?;
            let report = registry.refresh(&id).await?;
            println!("Refresh status: {}", report.status.as_str());
            if !report.success {
                std::process::exit(1);
            }
        }
        Commands::Delete { id, user } => {
            let registry = build_registry(&cfg).await?;
            registry.delete(&id, &user).await?;
            println!("Deleted {}", id);
        }
        Commands::Tags { field, size } => {
            let registry = build_registry(&cfg).await?;
            let buckets = registry.get_tag_values(&field, size).await?;
            for (value, count) in &buckets {
                println!("{:>6}  {}", count, value);
            }
        }
        Commands::Export { out } => {
            let registry = build_registry(&cfg).await?;
            let (path, count) = export::backup_all(registry.store(), out).await?;
            println!("Exported {} document(s) to {}", count, path.display());
        }
        Commands::Restore { file } => {
            let registry = build_registry(&cfg).await?;
            let count = export::restore_all(registry.store(), &file).await?;
            println!("Restored {} document(s)", count);
        }
        Commands::Serve => {
            let registry = Arc::new(build_registry(&cfg).await?);
            server::run_server(&cfg, registry).await?;
        }
    }

    Ok(())
}

fn split_fields(csv: String) -> Vec<String> {
    csv.split(',').map(|s| s.trim().to_string()).collect()
}

/// Wire the controller from config: SQLite store, HTTP fetcher, and webhook
/// notifier (or a no-op one when no webhooks are configured).
async fn build_registry(cfg: &Config) -> anyhow::Result<Registry> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::run_migrations(&pool).await?;
    let store = DocStore::new(pool);

    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(cfg.fetch.timeout_secs));
    let notifier: Arc<dyn Notifier> = if cfg.notify.webhooks.is_empty() {
        Arc::new(NullNotifier)
    } else {
        Arc::new(WebhookNotifier::new(cfg.notify.webhooks.clone()))
    };

    Ok(Registry::new(store, fetcher, notifier))
}
