//! Visibility scope keys.
//!
//! A [`ScopeKey`] names exactly one delta cache. Two clients share a cache
//! only when they see the same environment and the same set of projects.

use std::collections::BTreeSet;
use std::fmt;

pub const ALL_PROJECTS: &str = "*";
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Environment plus the normalized set of projects a client may see.
///
/// Project lists are sorted and de-duplicated; a list containing `*`
/// collapses to `*` alone. Construction order therefore never produces
/// distinct keys for the same visibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey {
    environment: String,
    projects: Vec<String>,
}

impl ScopeKey {
    pub fn new<I, S>(environment: impl Into<String>, projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = projects
            .into_iter()
            .map(|project| {
                let project: String = project.into();
                project.trim().to_string()
            })
            .filter(|p| !p.is_empty())
            .collect();

        let projects = if set.is_empty() || set.contains(ALL_PROJECTS) {
            vec![ALL_PROJECTS.to_string()]
        } else {
            set.into_iter().collect()
        };

        Self {
            environment: environment.into(),
            projects,
        }
    }

    /// Every project in one environment.
    pub fn environment_wide(environment: impl Into<String>) -> Self {
        Self::new(environment, [ALL_PROJECTS])
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn projects(&self) -> &[String] {
        &self.projects
    }

    pub fn all_projects(&self) -> bool {
        self.projects.len() == 1 && self.projects[0] == ALL_PROJECTS
    }

    pub fn includes_project(&self, project: &str) -> bool {
        self.all_projects()
            || self
                .projects
                .binary_search_by(|p| p.as_str().cmp(project))
                .is_ok()
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:[{}]", self.environment, self.projects.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_order_does_not_matter() {
        let left = ScopeKey::new("production", ["web", "mobile", "web"]);
        let right = ScopeKey::new("production", ["mobile", "web"]);
        assert_eq!(left, right);
        assert_eq!(left.to_string(), "production:[mobile,web]");
    }

    #[test]
    fn wildcard_collapses_list() {
        let key = ScopeKey::new("dev", ["web", "*"]);
        assert!(key.all_projects());
        assert_eq!(key, ScopeKey::environment_wide("dev"));
        assert!(key.includes_project("anything"));
    }

    #[test]
    fn empty_list_means_all_projects() {
        let key = ScopeKey::new("dev", Vec::<String>::new());
        assert!(key.all_projects());
    }

    #[test]
    fn narrow_scope_only_includes_listed_projects() {
        let key = ScopeKey::new("dev", ["web", "billing"]);
        assert!(key.includes_project("web"));
        assert!(key.includes_project("billing"));
        assert!(!key.includes_project("mobile"));
    }

    #[test]
    fn environments_are_distinct() {
        assert_ne!(
            ScopeKey::environment_wide("dev"),
            ScopeKey::environment_wide("production")
        );
    }
}
