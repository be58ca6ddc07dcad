//! CLI command implementations.

pub mod jobs;

use anyhow::{Context, Result};
use gantry_config::Config;
use gantry_core::CommandKind;

pub fn validate(path: &str) -> Result<()> {
    let config = gantry_config::load_config(path)
        .with_context(|| format!("Configuration error in {}", path))?;
    print!("{}", summary(&config));
    println!("Configuration is valid");
    Ok(())
}

fn summary(config: &Config) -> String {
    let mut out = format!(
        "server {} ({} workers, queue {})\n",
        config.server.url, config.server.workers, config.server.queue_capacity
    );
    for repo in &config.repositories {
        let count = |kind: CommandKind| repo.commands.iter().filter(|c| c.kind == kind).count();
        out.push_str(&format!(
            "  {} {}: {} build, {} deploy, {} notify\n",
            repo.name,
            repo.url,
            count(CommandKind::Build),
            count(CommandKind::Deploy),
            repo.notifications.len()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let config = gantry_config::parse_config(
            r#"
            repository "https://github.com/acme/widget" {
                build {
                    run "make lint"
                    run "make test"
                }
                deploy branch="main" {
                    run "make deploy"
                }
            }
            "#,
        )
        .unwrap();

        assert_eq!(
            summary(&config),
            "server http://localhost:3000 (2 workers, queue 64)\n  \
             widget https://github.com/acme/widget: 2 build, 1 deploy, 0 notify\n"
        );
    }
}
