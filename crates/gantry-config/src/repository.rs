//! Repository configuration parsing.

use crate::nodes::{get_first_bool_arg, get_first_string_arg, get_string_prop, required_string};
use crate::{ConfigError, ConfigResult};
use gantry_core::{Command, CommandKind, NotificationTarget, Repository};
use kdl::KdlNode;

/// Parse a `repository "<url>" { ... }` node.
pub(crate) fn parse_repository(node: &KdlNode) -> ConfigResult<Repository> {
    let url = required_string(node, "repository url")?;
    let mut repo = Repository::new(default_name(&url), url);

    let Some(children) = node.children() else {
        return Ok(repo);
    };

    for child in children.nodes() {
        match child.name().value() {
            "name" => repo.name = required_string(child, "repository name")?,
            "access-key" => repo.access_key = get_first_string_arg(child),
            "webhook-secret" => repo.webhook_secret = get_first_string_arg(child),
            "comment-pr" => repo.comment_pr = get_first_bool_arg(child).unwrap_or(true),
            "build" => repo
                .commands
                .extend(parse_commands(child, CommandKind::Build, &repo.name)?),
            "deploy" => repo
                .commands
                .extend(parse_commands(child, CommandKind::Deploy, &repo.name)?),
            "notify" => repo.notifications.push(parse_notify(child, &repo.name)?),
            _ => {}
        }
    }

    Ok(repo)
}

/// Each `run` child of a `build`/`deploy` block is one command sharing the
/// block's branch pattern.
fn parse_commands(node: &KdlNode, kind: CommandKind, repo: &str) -> ConfigResult<Vec<Command>> {
    let branch = get_string_prop(node, "branch").unwrap_or_default();

    let mut commands = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "run" {
                let execute = required_string(child, &format!("run command in {} block", kind))?;
                commands.push(Command::new(kind, branch.clone(), execute));
            }
        }
    }

    if commands.is_empty() {
        return Err(ConfigError::MissingField(format!(
            "run command in {} block of repository '{}'",
            kind, repo
        )));
    }
    Ok(commands)
}

fn parse_notify(node: &KdlNode, repo: &str) -> ConfigResult<NotificationTarget> {
    let sink = get_first_string_arg(node).unwrap_or_default();

    match sink.as_str() {
        "chat" => {
            let room = get_string_prop(node, "room").ok_or_else(|| {
                ConfigError::MissingField(format!("chat room for repository '{}'", repo))
            })?;
            Ok(NotificationTarget::Chat { room })
        }
        "slack" => {
            let webhook_url = get_string_prop(node, "webhook").ok_or_else(|| {
                ConfigError::MissingField(format!("slack webhook for repository '{}'", repo))
            })?;
            Ok(NotificationTarget::Slack {
                webhook_url,
                channel: get_string_prop(node, "channel"),
            })
        }
        _ => Err(ConfigError::InvalidValue {
            field: "notify".to_string(),
            message: format!("unknown notification sink: {}", sink),
        }),
    }
}

/// Last path segment of the URL without a `.git` suffix.
fn default_name(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed)
        .to_string()
}
