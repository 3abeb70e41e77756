//! keepsake - inspect and delete stored versions in a keepsake database.
//!
//! # Configuration
//!
//! - `KEEPSAKE_DB_PATH` - database file, defaults to `~/.keepsake/versions.db`
//! - `KEEPSAKE_VERSIONS_TABLE` - versions table name, defaults to `versions`
//!
//! `--db` overrides `KEEPSAKE_DB_PATH`. A `.env` file in the working
//! directory is loaded first.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keepsake_core::{KeepsakeConfig, RecordKey, TypeRegistry, Version, VersionHistory};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "keepsake")]
#[command(about = "Inspect record version history", long_about = None)]
struct Cli {
    /// Database file (overrides KEEPSAKE_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List versions of a record, newest first
    List {
        /// Record type tag
        object_type: String,
        /// Record id
        object_id: i64,
    },

    /// Count versions of a record
    Count { object_type: String, object_id: i64 },

    /// Show the most recently captured version of a record
    Latest { object_type: String, object_id: i64 },

    /// Summarize a record's history
    Summary { object_type: String, object_id: i64 },

    /// Print one version's payload
    Show {
        /// Version id
        version_id: i64,
    },

    /// Delete one version
    Remove { version_id: i64 },

    /// Delete every version of a record
    Purge { object_type: String, object_id: i64 },

    /// Delete all but the newest versions of a record
    Prune {
        object_type: String,
        object_id: i64,

        /// Number of versions to keep
        #[arg(long, default_value = "10")]
        keep: usize,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let mut config = KeepsakeConfig::from_env();
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    config.validate().context("invalid configuration")?;

    let history = open_history(&config)?;

    match cli.command {
        Commands::List {
            object_type,
            object_id,
        } => {
            let versions = history.get_all_versions(&RecordKey::new(object_id, object_type))?;
            for version in &versions {
                print_row(version);
            }
        }
        Commands::Count {
            object_type,
            object_id,
        } => {
            let count = history.count_versions(&RecordKey::new(object_id, object_type))?;
            println!("{}", count);
        }
        Commands::Latest {
            object_type,
            object_id,
        } => {
            let key = RecordKey::new(object_id, object_type);
            match history.latest_version(&key)? {
                Some(version) => print_row(&version),
                None => eprintln!("no versions for {}", key),
            }
        }
        Commands::Summary {
            object_type,
            object_id,
        } => {
            let key = RecordKey::new(object_id, object_type);
            match history.summary(&key)? {
                Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
                None => eprintln!("no versions for {}", key),
            }
        }
        Commands::Show { version_id } => {
            let version = history
                .find_version(version_id)?
                .with_context(|| format!("version {} not found", version_id))?;
            // Payloads that fail to parse are printed as stored.
            match serde_json::from_str::<serde_json::Value>(&version.data) {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Err(_) => println!("{}", version.data),
            }
        }
        Commands::Remove { version_id } => {
            if history.remove_version(version_id)? {
                println!("removed version {}", version_id);
            } else {
                anyhow::bail!("version {} not found", version_id);
            }
        }
        Commands::Purge {
            object_type,
            object_id,
        } => {
            let removed = history.remove_all_versions(&RecordKey::new(object_id, object_type))?;
            println!("removed {} versions", removed);
        }
        Commands::Prune {
            object_type,
            object_id,
            keep,
        } => {
            let removed =
                history.prune_versions(&RecordKey::new(object_id, object_type), keep)?;
            println!("removed {} versions, kept at most {}", removed, keep);
        }
    }

    Ok(())
}

/// Open an existing version database; every command needs stored history.
fn open_history(config: &KeepsakeConfig) -> Result<VersionHistory> {
    let path = &config.database_path;
    if !path.is_file() {
        anyhow::bail!("no version database at {}", path.display());
    }

    tracing::debug!(path = %path.display(), "opening version database");
    VersionHistory::open(config, TypeRegistry::default())
        .with_context(|| format!("failed to open {}", path.display()))
}

fn print_row(version: &Version) {
    println!(
        "{}\t{}\t{}\t{}",
        version.id,
        version.hash,
        version.created_at.to_rfc3339(),
        version.name
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_at(path: PathBuf) -> KeepsakeConfig {
        KeepsakeConfig::builder().database_path(path).build().unwrap()
    }

    #[test]
    fn test_missing_database_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typo").join("versions.db");

        let err = open_history(&config_at(path.clone())).err().unwrap();
        assert!(err.to_string().contains("no version database"));
        assert!(!path.exists());
        assert!(!dir.path().join("typo").exists());
    }

    #[test]
    fn test_existing_database_opens() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_at(dir.path().join("versions.db"));
        VersionHistory::open(&config, TypeRegistry::default()).unwrap();

        let history = open_history(&config).unwrap();
        assert_eq!(history.count_all().unwrap(), 0);
    }
}
