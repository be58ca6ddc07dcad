//! Server configuration parsing.

use crate::nodes::{get_first_string_arg, positive_integer, required_string};
use crate::repository::parse_repository;
use crate::{ConfigError, ConfigResult};
use gantry_core::{NotificationTarget, Repository, normalize_url};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Complete configuration for a Gantry server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    /// Chat service used by `notify "chat"` targets.
    pub chat: Option<ChatConfig>,
    pub repositories: Vec<Repository>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Public base URL; job links are `{url}/{id}`.
    pub url: String,
    /// Address the HTTP server binds to.
    pub listen: String,
    /// Number of concurrent workers.
    pub workers: usize,
    /// Bound of the admission queue.
    pub queue_capacity: usize,
    /// Working directory for commands.
    pub workspace: Option<PathBuf>,
    /// Per-command time limit.
    pub command_timeout: Option<Duration>,
    /// PostgreSQL connection string. Jobs are kept in memory when unset.
    pub database_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            listen: "0.0.0.0:3000".to_string(),
            workers: 2,
            queue_capacity: 64,
            workspace: None,
            command_timeout: None,
            database_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Message endpoint of the chat service.
    pub endpoint: String,
    pub api_key: String,
    /// Sender name shown in the room.
    pub from: String,
}

/// Read and parse a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading configuration");
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

/// Parse a configuration from KDL text.
pub fn parse_config(kdl: &str) -> ConfigResult<Config> {
    let doc: KdlDocument = kdl.parse()?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "server" => config.server = parse_server(node)?,
            "chat" => config.chat = Some(parse_chat(node)?),
            "repository" => config.repositories.push(parse_repository(node)?),
            _ => {} // Ignore unknown nodes
        }
    }

    validate(&config)?;
    Ok(config)
}

fn parse_server(node: &KdlNode) -> ConfigResult<ServerConfig> {
    let mut server = ServerConfig::default();

    let Some(children) = node.children() else {
        return Ok(server);
    };

    for child in children.nodes() {
        match child.name().value() {
            "url" => {
                server.url = required_string(child, "server url")?
                    .trim_end_matches('/')
                    .to_string();
            }
            "listen" => server.listen = required_string(child, "server listen")?,
            "workers" => server.workers = positive_integer(child, "workers")? as usize,
            "queue-capacity" => {
                server.queue_capacity = positive_integer(child, "queue-capacity")? as usize;
            }
            "workspace" => {
                server.workspace = Some(PathBuf::from(required_string(child, "workspace")?));
            }
            "command-timeout" => {
                let secs = positive_integer(child, "command-timeout")?;
                server.command_timeout = Some(Duration::from_secs(secs));
            }
            "database-url" => server.database_url = get_first_string_arg(child),
            _ => {}
        }
    }

    Ok(server)
}

fn parse_chat(node: &KdlNode) -> ConfigResult<ChatConfig> {
    let mut endpoint = None;
    let mut api_key = None;
    let mut from = "Gantry".to_string();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "endpoint" => endpoint = Some(required_string(child, "chat endpoint")?),
                "api-key" => api_key = Some(required_string(child, "chat api-key")?),
                "from" => from = required_string(child, "chat from")?,
                _ => {}
            }
        }
    }

    Ok(ChatConfig {
        endpoint: endpoint.ok_or_else(|| ConfigError::MissingField("chat endpoint".to_string()))?,
        api_key: api_key.ok_or_else(|| ConfigError::MissingField("chat api-key".to_string()))?,
        from,
    })
}

fn validate(config: &Config) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for repo in &config.repositories {
        if !seen.insert(normalize_url(&repo.url)) {
            return Err(ConfigError::Duplicate(format!("repository '{}'", repo.url)));
        }

        let wants_chat = repo
            .notifications
            .iter()
            .any(|n| matches!(n, NotificationTarget::Chat { .. }));
        if wants_chat && config.chat.is_none() {
            return Err(ConfigError::InvalidReference(format!(
                "repository '{}' notifies a chat room but no chat service is configured",
                repo.name
            )));
        }
    }
    Ok(())
}
