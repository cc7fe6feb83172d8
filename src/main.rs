//! smt CLI - Command line interface for smt_db
//!
//! Operates one named sparse Merkle tree inside a database file. Results go
//! to stdout as JSON; logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use smt_db::{Config, FileStore, HasherKind, NodeStore, Proof, SparseMerkleTree};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "smt")]
#[command(about = "A persistent sparse Merkle tree with membership proofs")]
#[command(version)]
struct Cli {
    /// Path to the database file
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Tree to operate on
    #[arg(short, long)]
    tree: Option<String>,

    /// Node hash function (blake3 or sha256-concat)
    #[arg(long)]
    hasher: Option<HasherKind>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Config file (defaults to the per-user config if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log debug events to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new database
    Init {
        /// Overwrite an existing database
        #[arg(long)]
        force: bool,
    },

    // === Entry Commands ===
    /// Get the value stored under a key
    Get {
        /// Hex key
        key: String,
    },

    /// Add a new entry
    Add {
        /// Hex key
        key: String,
        /// Hex value
        value: String,
    },

    /// Replace the value of an existing entry
    Update {
        /// Hex key
        key: String,
        /// Hex value
        value: String,
    },

    /// Delete an entry
    Delete {
        /// Hex key
        key: String,
    },

    /// List all entries
    Entries {
        /// Maximum number of entries to return
        #[arg(short, long)]
        limit: Option<usize>,
    },

    // === Proof Commands ===
    /// Build a membership or non-membership proof
    Prove {
        /// Hex key
        key: String,
        /// Write the proof to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify a proof read from a file ("-" for stdin)
    Verify {
        /// Proof file
        proof: String,
    },

    // === Maintenance Commands ===
    /// Show the current root
    Root,

    /// Re-hash every node reachable from the root
    Check,

    /// Rewrite the database log as a single snapshot
    Compact,

    /// List trees stored in the database
    Trees,

    /// Show the resolved configuration
    Config {
        /// Write it to the --config path (or the per-user file)
        #[arg(long)]
        save: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    if let Some(tree) = &cli.tree {
        config.tree = tree.clone();
    }
    if let Some(hasher) = cli.hasher {
        config.hasher = hasher;
    }
    config.validate()?;

    match cli.command {
        Commands::Init { force } => {
            if config.database.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    config.database.display()
                );
            }
            let store = FileStore::create(&config.database, config.store.clone())?;
            store.sync()?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "message": format!("Created database at {}", config.database.display())
                }),
            )?;
        }

        Commands::Get { key } => {
            let store = open_existing(&config)?;
            let tree = open_tree(&store, &config)?;
            match tree.get(&key)? {
                Some(value) => {
                    output(
                        cli.format,
                        &serde_json::json!({
                            "key": key,
                            "value": value.as_str(),
                            "found": true
                        }),
                    )?;
                }
                None => {
                    output(
                        cli.format,
                        &serde_json::json!({
                            "key": key,
                            "found": false
                        }),
                    )?;
                    std::process::exit(1);
                }
            }
        }

        Commands::Add { key, value } => {
            let store = open_store(&config)?;
            let mut tree = open_tree(&store, &config)?;
            let root = tree.add(&key, &value)?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "key": key,
                    "root": root.to_hex()
                }),
            )?;
        }

        Commands::Update { key, value } => {
            let store = open_store(&config)?;
            let mut tree = open_tree(&store, &config)?;
            let root = tree.update(&key, &value)?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "key": key,
                    "root": root.to_hex()
                }),
            )?;
        }

        Commands::Delete { key } => {
            let store = open_store(&config)?;
            let mut tree = open_tree(&store, &config)?;
            let root = tree.delete(&key)?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "key": key,
                    "root": root.to_hex()
                }),
            )?;
        }

        Commands::Entries { limit } => {
            let store = open_existing(&config)?;
            let tree = open_tree(&store, &config)?;
            let mut entries = tree.entries()?;
            if let Some(limit) = limit {
                entries.truncate(limit);
            }
            let items: Vec<_> = entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "key": e.key.as_str(),
                        "value": e.value.as_str()
                    })
                })
                .collect();
            output(
                cli.format,
                &serde_json::json!({
                    "tree": tree.name(),
                    "count": items.len(),
                    "entries": items
                }),
            )?;
        }

        Commands::Prove { key, output: path } => {
            let store = open_existing(&config)?;
            let tree = open_tree(&store, &config)?;
            let proof = tree.create_proof(&key)?;
            match path {
                Some(path) => {
                    std::fs::write(&path, proof.to_json()?)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    output(
                        cli.format,
                        &serde_json::json!({
                            "status": "ok",
                            "membership": proof.membership,
                            "root": proof.root.to_hex(),
                            "path": path.display().to_string()
                        }),
                    )?;
                }
                None => output(cli.format, &serde_json::to_value(&proof)?)?,
            }
        }

        Commands::Verify { proof } => {
            let json = read_input(&proof)?;
            let proof = Proof::from_json(&json)?;
            let valid = proof.verify(&config.hasher);
            output(
                cli.format,
                &serde_json::json!({
                    "valid": valid,
                    "membership": proof.membership,
                    "key": proof.entry.key.as_str(),
                    "root": proof.root.to_hex()
                }),
            )?;
            if !valid {
                std::process::exit(1);
            }
        }

        Commands::Root => {
            let store = open_existing(&config)?;
            let tree = open_tree(&store, &config)?;
            output(
                cli.format,
                &serde_json::json!({
                    "tree": tree.name(),
                    "hasher": tree.hasher().as_str(),
                    "root": tree.root().to_hex(),
                    "empty": tree.root().is_zero()
                }),
            )?;
        }

        Commands::Check => {
            let store = open_existing(&config)?;
            let tree = open_tree(&store, &config)?;
            let report = tree.check_integrity()?;
            output(
                cli.format,
                &serde_json::json!({
                    "tree": tree.name(),
                    "clean": report.is_clean(),
                    "leaves": report.leaves,
                    "internal_nodes": report.internal_nodes,
                    "max_depth": report.max_depth,
                    "unreachable": report.unreachable.iter().map(|h| h.to_hex()).collect::<Vec<_>>()
                }),
            )?;
        }

        Commands::Compact => {
            let store = open_existing(&config)?;
            let reclaimed = store.compact()?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "reclaimed_bytes": reclaimed,
                    "size": store.log_size()
                }),
            )?;
        }

        Commands::Trees => {
            let store = open_existing(&config)?;
            let trees = store.trees()?;
            output(
                cli.format,
                &serde_json::json!({
                    "count": trees.len(),
                    "trees": trees
                }),
            )?;
        }

        Commands::Config { save } => {
            let mut saved_to = None;
            if save {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => Config::default_path()?,
                };
                config.save(&path)?;
                saved_to = Some(path.display().to_string());
            }
            output(
                cli.format,
                &serde_json::json!({
                    "config": config,
                    "saved_to": saved_to
                }),
            )?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if verbose {
        EnvFilter::new("smt_db=debug,smt=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("smt_db=warn"))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .init();
}

fn open_store(config: &Config) -> anyhow::Result<FileStore> {
    let store = FileStore::open_or_create(&config.database, config.store.clone())?;
    Ok(store)
}

/// Open a database that must already exist; read-only commands never create one
fn open_existing(config: &Config) -> anyhow::Result<FileStore> {
    if !config.database.exists() {
        anyhow::bail!(
            "{} does not exist (run `smt init` or add an entry first)",
            config.database.display()
        );
    }
    let store = FileStore::open(&config.database, config.store.clone())
        .with_context(|| format!("Failed to open {}", config.database.display()))?;
    Ok(store)
}

fn open_tree<'a>(
    store: &'a FileStore,
    config: &Config,
) -> anyhow::Result<SparseMerkleTree<'a, HasherKind>> {
    let tree = SparseMerkleTree::open(store, config.tree.as_str(), config.hasher)
        .with_context(|| format!("Failed to open tree '{}'", config.tree))?;
    Ok(tree)
}

fn read_input(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))
}

fn output(format: OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
