//! Server configuration
//!
//! Priority order: CLI/env -> `{data_dir}/config.toml` -> defaults

use crate::agents::path_resolver::CliPathResolver;
use crate::file_storage::default_data_dir;
use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Claudito - web backend for managing Claude agents across projects
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "claudito")]
#[command(author, version, about, long_about = None)]
pub struct ServerArgs {
    /// Port to bind the server to
    #[arg(long, env = "CLAUDITO_PORT")]
    pub port: Option<u16>,

    /// Address to bind the server to (IP literal or host name)
    #[arg(long, env = "CLAUDITO_BIND")]
    pub bind: Option<String>,

    /// Directory holding projects, conversations and loop state
    #[arg(long, env = "CLAUDITO_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Bearer token required on the API. Auth is disabled when unset.
    #[arg(long, env = "CLAUDITO_TOKEN")]
    pub token: Option<String>,

    /// Path to the claude CLI binary
    #[arg(long, env = "CLAUDITO_CLAUDE_PATH")]
    pub claude_path: Option<PathBuf>,

    /// Allowed CORS origin (repeatable). Any origin is allowed when unset.
    #[arg(long = "cors-origin")]
    pub cors_origins: Vec<String>,
}

/// Optional `config.toml` contents. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub token: Option<String>,
    pub claude_path: Option<PathBuf>,
    pub cors_origins: Option<Vec<String>>,
}

impl FileConfig {
    /// Read `config.toml` from the data dir, `None` when absent
    pub fn load(data_dir: &Path) -> anyhow::Result<Option<FileConfig>> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(config))
    }
}

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub claude_path: Option<PathBuf>,
    pub auth_token: Option<String>,
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Merge CLI/env arguments with the config file found in the data dir
    pub fn load(args: &ServerArgs) -> anyhow::Result<ServerConfig> {
        let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
        let file = FileConfig::load(&data_dir)?.unwrap_or_default();
        let mut config = Self::merge(args, file, data_dir);
        config.claude_path = resolve_claude_path(config.claude_path.as_deref());
        Ok(config)
    }

    fn merge(args: &ServerArgs, file: FileConfig, data_dir: PathBuf) -> ServerConfig {
        let cors_origins = if args.cors_origins.is_empty() {
            file.cors_origins.unwrap_or_default()
        } else {
            args.cors_origins.clone()
        };

        ServerConfig {
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            bind: args
                .bind
                .clone()
                .or(file.bind)
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
            data_dir,
            claude_path: args.claude_path.clone().or(file.claude_path),
            auth_token: args
                .token
                .clone()
                .or(file.token)
                .filter(|t| !t.trim().is_empty()),
            cors_origins,
        }
    }

    /// Configuration for tests: everything default, rooted at `data_dir`
    pub fn for_data_dir(data_dir: PathBuf) -> ServerConfig {
        Self::merge(&ServerArgs::default(), FileConfig::default(), data_dir)
    }
}

/// Resolve the claude binary: the configured path if it exists, otherwise
/// the usual install locations and `PATH`.
pub fn resolve_claude_path(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        log::warn!(
            "[Config] Configured claude path {:?} does not exist, searching PATH",
            path
        );
    }
    CliPathResolver::resolve_claude()
}
