// Copyright 2025 Wikiver Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Wikiver CLI
//!
//! Operator interface over a file-backed article version store.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wikiver_core::config::read_toml;
use wikiver_core::{ArticleId, EngineConfig, SystemClock};
use wikiver_storage::VersionStore;

const DEFAULT_DATA_FILE: &str = "wikiver.db";
const DEFAULT_CONFIG_FILE: &str = "wikiver.toml";

#[derive(Parser)]
#[command(name = "wikiver")]
#[command(about = "Wikiver - article version history store", long_about = None)]
struct Cli {
    /// Snapshot file holding all versions
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Configuration file (defaults to ./wikiver.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record new article content
    Commit {
        /// Article ID
        article: u64,

        /// Author of the change
        #[arg(long)]
        author: String,

        /// Read content from a file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Print the content of a version
    Show {
        /// Article ID
        article: u64,

        /// Version number (latest when omitted)
        #[arg(long)]
        version: Option<u32>,
    },

    /// List version history, newest first
    Log {
        /// Article ID
        article: u64,

        /// Zero-based page
        #[arg(long, default_value = "0")]
        page: usize,

        /// Page size
        #[arg(long, default_value = "20")]
        size: usize,
    },

    /// Show version statistics of an article
    Stats {
        /// Article ID
        article: u64,
    },

    /// Create a new version carrying an older version's content
    Restore {
        /// Article ID
        article: u64,

        /// Version number to restore
        version: u32,

        /// Author of the restore
        #[arg(long)]
        author: String,
    },

    /// Consolidate long diff chains
    Optimize,

    /// Recompress and mark cold versions
    Archive,
}

/// Contents of `wikiver.toml`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CliConfig {
    data_file: Option<PathBuf>,
    engine: EngineConfig,
}

impl CliConfig {
    fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let config: CliConfig = read_toml(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        config
            .engine
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Serialize)]
struct ShowOutput {
    article_id: ArticleId,
    version_number: u32,
    content: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over the default level
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = CliConfig::load(cli.config.as_deref())?;
    let data_path = cli
        .data
        .or(config.data_file)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE));

    let store = VersionStore::open(&data_path, config.engine, Arc::new(SystemClock))
        .with_context(|| format!("Failed to open store at {}", data_path.display()))?;

    match cli.command {
        Commands::Commit {
            article,
            author,
            file,
        } => {
            let content = read_content(file.as_deref())?;
            let version = store
                .create_version(ArticleId(article), &content, &author)
                .context("Failed to create version")?;
            store.persist(&data_path).context("Failed to save store")?;
            info!(article, version_number = version.version_number, "Committed");
            print_json(&version.summary())?;
        }

        Commands::Show { article, version } => {
            print_json(&show(&store, ArticleId(article), version)?)?;
        }

        Commands::Log {
            article,
            page,
            size,
        } => {
            print_json(&store.get_version_history(ArticleId(article), page, size))?;
        }

        Commands::Stats { article } => {
            print_json(&store.get_version_stats(ArticleId(article)))?;
        }

        Commands::Restore {
            article,
            version,
            author,
        } => {
            let restored = store
                .restore_to_version(ArticleId(article), version, &author)
                .context("Failed to restore version")?;
            store.persist(&data_path).context("Failed to save store")?;
            print_json(&restored.summary())?;
        }

        Commands::Optimize => {
            let report = store.run_optimization_sweep();
            store.persist(&data_path).context("Failed to save store")?;
            print_json(&report)?;
        }

        Commands::Archive => {
            let report = store.run_archival_sweep();
            store.persist(&data_path).context("Failed to save store")?;
            print_json(&report)?;
        }
    }

    Ok(())
}

fn show(store: &VersionStore, article_id: ArticleId, version: Option<u32>) -> Result<ShowOutput> {
    let (version_number, content) = match version {
        Some(n) => {
            let content = store
                .get_version_content(article_id, n)
                .context("Failed to read version")?;
            (n, content)
        }
        None => {
            let content = store
                .get_latest_version_content(article_id)
                .context("Failed to read latest version")?;
            let latest = store
                .get_version_history(article_id, 0, 1)
                .versions
                .first()
                .map(|v| v.version_number)
                .with_context(|| format!("Article {article_id} has no versions"))?;
            (latest, content)
        }
    };
    Ok(ShowOutput {
        article_id,
        version_number,
        content,
    })
}

fn read_content(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read content from stdin")?;
            if content.is_empty() {
                bail!("No content on stdin; pass --file or pipe the article text");
            }
            Ok(content)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_file(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{body}").unwrap();
        file
    }

    #[test]
    fn test_cli_config_load() {
        let file = config_file(
            r#"
            data_file = "/var/lib/wikiver/articles.db"

            [engine]
            diff_threshold = 0.5
            content_cache_capacity = 0
            "#,
        );
        let config = CliConfig::load(Some(file.path())).unwrap();
        assert_eq!(
            config.data_file,
            Some(PathBuf::from("/var/lib/wikiver/articles.db"))
        );
        assert_eq!(config.engine.diff_threshold, 0.5);
        assert_eq!(config.engine.content_cache_capacity, 0);
        assert_eq!(config.engine.archive_after_days, 90);
    }

    #[test]
    fn test_cli_config_rejects_invalid_engine() {
        let file = config_file("[engine]\nlookahead_window = 0");
        assert!(CliConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_explicit_config_must_exist() {
        assert!(CliConfig::load(Some(Path::new("/nonexistent/wikiver.toml"))).is_err());
    }

    #[test]
    fn test_read_content_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "Article body\nsecond line").unwrap();
        assert_eq!(
            read_content(Some(file.path())).unwrap(),
            "Article body\nsecond line"
        );
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "wikiver", "--data", "x.db", "restore", "4", "2", "--author", "alice",
        ])
        .unwrap();
        assert_eq!(cli.data, Some(PathBuf::from("x.db")));
        match cli.command {
            Commands::Restore {
                article,
                version,
                author,
            } => {
                assert_eq!((article, version, author.as_str()), (4, 2, "alice"));
            }
            _ => panic!("expected restore"),
        }
    }

    #[test]
    fn test_show_defaults_to_latest_version() {
        let store = VersionStore::with_defaults();
        let article = ArticleId(3);
        assert!(show(&store, article, None).is_err());

        store.create_version(article, "first draft", "alice").unwrap();
        store.create_version(article, "second draft", "bob").unwrap();

        let latest = show(&store, article, None).unwrap();
        assert_eq!(latest.version_number, 2);
        assert_eq!(latest.content, "second draft");
        assert_eq!(store.get_version_stats(article).access_frequency, 1);

        let first = show(&store, article, Some(1)).unwrap();
        assert_eq!((first.version_number, first.content.as_str()), (1, "first draft"));
        assert!(show(&store, article, Some(7)).is_err());
    }
}
