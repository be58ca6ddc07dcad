//! Repository types and per-branch command pipelines.

use serde::{Deserialize, Serialize};
use url::Url;

/// Pipeline stage a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Build,
    Deploy,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandKind::Build => write!(f, "build"),
            CommandKind::Deploy => write!(f, "deploy"),
        }
    }
}

impl std::str::FromStr for CommandKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "build" => Ok(CommandKind::Build),
            "deploy" => Ok(CommandKind::Deploy),
            _ => Err(format!("Unknown command kind: {}", s)),
        }
    }
}

/// A single shell command configured for a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    /// Branch pattern. Empty or `*` matches every branch.
    pub branch: String,
    /// Shell command line.
    pub execute: String,
}

impl Command {
    pub fn new(kind: CommandKind, branch: impl Into<String>, execute: impl Into<String>) -> Self {
        Self {
            kind,
            branch: branch.into(),
            execute: execute.into(),
        }
    }

    /// Whether this command runs for `branch`.
    pub fn applies_to(&self, branch: &str) -> bool {
        branch_matches(&self.branch, branch)
    }
}

/// Where the outcome of a finished job is announced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sink", rename_all = "snake_case")]
pub enum NotificationTarget {
    /// Room on the configured chat service.
    Chat { room: String },
    /// Slack incoming webhook.
    Slack {
        webhook_url: String,
        channel: Option<String>,
    },
}

/// A repository registered for building.
///
/// Jobs keep a copy of the repository as it was when they were created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub url: String,
    /// Provider access token, used for pull request comments.
    pub access_key: Option<String>,
    /// Shared secret for authenticating webhook deliveries.
    pub webhook_secret: Option<String>,
    /// Comment on pull requests when a PR-linked job finishes.
    pub comment_pr: bool,
    /// All commands in declaration order.
    pub commands: Vec<Command>,
    pub notifications: Vec<NotificationTarget>,
}

impl Repository {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            access_key: None,
            webhook_secret: None,
            comment_pr: false,
            commands: Vec::new(),
            notifications: Vec::new(),
        }
    }

    /// Commands of `kind` that apply to `branch`, in declaration order.
    pub fn get_commands(&self, branch: &str, kind: CommandKind) -> Vec<&Command> {
        self.commands
            .iter()
            .filter(|c| c.kind == kind && c.applies_to(branch))
            .collect()
    }

    /// Whether `url` refers to this repository.
    pub fn matches_url(&self, url: &str) -> bool {
        normalize_url(&self.url) == normalize_url(url)
    }
}

/// Lookup of configured repositories by source URL.
pub trait RepositoryRegistry: Send + Sync {
    /// Snapshot of the repository registered for `url`, if any.
    fn repository_for_url(&self, url: &str) -> Option<Repository>;
}

/// Canonical form of a repository URL used for matching.
///
/// Credentials, query, fragment, a trailing slash and a `.git` suffix are
/// dropped and the result is lowercased. Strings that are not URLs
/// (e.g. `git@host:owner/repo.git`) get the same suffix trimming.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let normalized = match Url::parse(trimmed) {
        Ok(mut parsed) if parsed.has_host() => {
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        _ => trimmed.to_string(),
    };

    let normalized = normalized.trim_end_matches('/');
    let normalized = normalized.strip_suffix(".git").unwrap_or(normalized);
    normalized.trim_end_matches('/').to_lowercase()
}

/// Match a branch against a pattern with `*` wildcards.
///
/// An empty pattern or `*` matches everything.
pub fn branch_matches(pattern: &str, branch: &str) -> bool {
    let pattern = pattern.trim();
    if pattern.is_empty() || pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == branch;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return false,
    };
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return false,
    };

    if !branch.starts_with(first) {
        return false;
    }
    let mut remaining = &branch[first.len()..];
    for part in middle {
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_repo() -> Repository {
        let mut repo = Repository::new("widget", "https://github.com/acme/widget");
        repo.commands = vec![
            Command::new(CommandKind::Build, "", "make lint"),
            Command::new(CommandKind::Deploy, "main", "make deploy"),
            Command::new(CommandKind::Build, "release/*", "make package"),
            Command::new(CommandKind::Build, "*", "make test"),
        ];
        repo
    }

    #[test]
    fn test_get_commands_keeps_declaration_order() {
        let repo = make_repo();

        let build: Vec<&str> = repo
            .get_commands("release/1.0", CommandKind::Build)
            .iter()
            .map(|c| c.execute.as_str())
            .collect();
        assert_eq!(build, vec!["make lint", "make package", "make test"]);

        let build: Vec<&str> = repo
            .get_commands("main", CommandKind::Build)
            .iter()
            .map(|c| c.execute.as_str())
            .collect();
        assert_eq!(build, vec!["make lint", "make test"]);
    }

    #[test]
    fn test_deploy_commands_only_for_matching_branch() {
        let repo = make_repo();
        assert_eq!(repo.get_commands("main", CommandKind::Deploy).len(), 1);
        assert!(repo.get_commands("feature/x", CommandKind::Deploy).is_empty());
    }

    #[test]
    fn test_branch_matches() {
        assert!(branch_matches("", "anything"));
        assert!(branch_matches("*", "feature/x"));
        assert!(branch_matches("main", "main"));
        assert!(!branch_matches("main", "main2"));
        assert!(branch_matches("feature/*", "feature/x"));
        assert!(!branch_matches("feature/*", "bugfix/x"));
        assert!(branch_matches("*-hotfix", "prod-hotfix"));
        assert!(branch_matches("release/*/rc*", "release/2.0/rc1"));
        assert!(!branch_matches("release/*/rc*", "release/2.0/final"));
        assert!(!branch_matches("ab*ba", "aba"));
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("https://GitHub.com/Acme/Widget.git"),
            "https://github.com/acme/widget"
        );
        assert_eq!(
            normalize_url("https://token@github.com/acme/widget/"),
            "https://github.com/acme/widget"
        );
        assert_eq!(
            normalize_url("git@github.com:acme/widget.git"),
            "git@github.com:acme/widget"
        );
    }

    #[test]
    fn test_matches_url() {
        let repo = make_repo();
        assert!(repo.matches_url("https://github.com/acme/widget.git"));
        assert!(!repo.matches_url("https://github.com/acme/gadget"));
    }

    #[test]
    fn test_command_kind_round_trip_from_str() {
        assert_eq!("Build".parse::<CommandKind>().unwrap(), CommandKind::Build);
        assert_eq!(CommandKind::Deploy.to_string(), "deploy");
        assert!("test".parse::<CommandKind>().is_err());
    }
}
