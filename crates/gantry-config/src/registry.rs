//! Repository registry backed by the loaded configuration.

use gantry_core::{Repository, RepositoryRegistry, normalize_url};
use std::collections::HashMap;

/// Fixed set of repositories keyed by normalized URL.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    repositories: HashMap<String, Repository>,
}

impl StaticRegistry {
    pub fn new(repositories: impl IntoIterator<Item = Repository>) -> Self {
        let repositories = repositories
            .into_iter()
            .map(|repo| (normalize_url(&repo.url), repo))
            .collect();
        Self { repositories }
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    pub fn repositories(&self) -> impl Iterator<Item = &Repository> {
        self.repositories.values()
    }
}

impl RepositoryRegistry for StaticRegistry {
    fn repository_for_url(&self, url: &str) -> Option<Repository> {
        self.repositories.get(&normalize_url(url)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_config;

    #[test]
    fn test_lookup_ignores_url_spelling() {
        let config = parse_config(
            r#"
            repository "https://github.com/acme/widget" {
                build { run "make" }
            }
            "#,
        )
        .unwrap();
        let registry = StaticRegistry::new(config.repositories);

        assert_eq!(registry.len(), 1);
        let repo = registry
            .repository_for_url("https://github.com/Acme/Widget.git")
            .unwrap();
        assert_eq!(repo.name, "widget");
        assert!(registry
            .repository_for_url("https://github.com/acme/other")
            .is_none());
    }

    #[test]
    fn test_lookup_returns_snapshot() {
        let registry = StaticRegistry::new(vec![Repository::new(
            "widget",
            "https://github.com/acme/widget",
        )]);
        let mut snapshot = registry
            .repository_for_url("https://github.com/acme/widget")
            .unwrap();
        snapshot.name = "renamed".to_string();

        let again = registry
            .repository_for_url("https://github.com/acme/widget")
            .unwrap();
        assert_eq!(again.name, "widget");
    }
}
