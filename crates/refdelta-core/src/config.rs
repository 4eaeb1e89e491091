use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DeltaError;

/// Environment variable that overrides `gitlab.private_token`.
pub const TOKEN_ENV: &str = "GITLAB_TOKEN";

/// Environment variable that overrides `gitlab.base_url`.
pub const URL_ENV: &str = "GITLAB_URL";

/// Top-level configuration loaded from `.refdelta.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use refdelta_core::DeltaConfig;
///
/// let config = DeltaConfig::default();
/// assert_eq!(config.delta.concurrency, 4);
/// assert_eq!(config.gitlab.timeout_seconds, 15);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaConfig {
    /// Connection settings.
    #[serde(default)]
    pub gitlab: GitLabConfig,
    /// How projects are discovered.
    #[serde(default)]
    pub scan: ScanConfig,
    /// Explicitly listed projects.
    #[serde(default)]
    pub projects: ProjectsConfig,
    /// Groups to discover projects from.
    #[serde(default)]
    pub groups: GroupsConfig,
    /// Include/exclude filters on project paths.
    #[serde(default)]
    pub filters: FiltersConfig,
    /// Delta run tuning.
    #[serde(default)]
    pub delta: DeltaRunConfig,
}

impl DeltaConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError::FileNotFound`] if the file does not exist,
    /// [`DeltaError::Io`] if it cannot be read, or [`DeltaError::Toml`] if
    /// the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, DeltaError> {
        if !path.exists() {
            return Err(DeltaError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use refdelta_core::{DeltaConfig, ScanMode};
    ///
    /// let toml = r#"
    /// [scan]
    /// mode = "explicit"
    ///
    /// [projects]
    /// by_path = ["platform/api"]
    /// "#;
    /// let config = DeltaConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.scan.mode, ScanMode::Explicit);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, DeltaError> {
        let mut config: Self = toml::from_str(content)?;
        config.gitlab.base_url = config.gitlab.base_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    /// Override connection fields with `GITLAB_URL` / `GITLAB_TOKEN` when set.
    ///
    /// Empty variables are ignored, so an exported-but-blank token does not
    /// erase the one from the file.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Like [`apply_env`](Self::apply_env) with an injectable lookup.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.gitlab.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.gitlab.private_token = Some(token);
        }
    }

    /// Check that the configuration can drive a run.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError::Config`] describing the first problem found.
    ///
    /// # Examples
    ///
    /// ```
    /// use refdelta_core::DeltaConfig;
    ///
    /// let err = DeltaConfig::default().validate().unwrap_err();
    /// assert!(err.to_string().contains("base_url"));
    /// ```
    pub fn validate(&self) -> Result<(), DeltaError> {
        self.validate_connection()?;
        match self.scan.mode {
            ScanMode::AutoDiscover => {
                if self.groups.by_id.is_empty() && self.groups.by_path.is_empty() {
                    return Err(DeltaError::Config(
                        "in auto_discover mode, at least one group must be configured \
                         in groups.by_id or groups.by_path"
                            .into(),
                    ));
                }
            }
            ScanMode::Explicit => {
                if self.projects.is_empty() {
                    return Err(DeltaError::Config(
                        "in explicit mode, at least one project must be configured \
                         in projects.by_id or projects.by_path"
                            .into(),
                    ));
                }
            }
        }
        if self.delta.concurrency == 0 {
            return Err(DeltaError::Config(
                "delta.concurrency must be at least 1".into(),
            ));
        }
        if !(1..=100).contains(&self.delta.page_size) {
            return Err(DeltaError::Config(format!(
                "delta.page_size must be between 1 and 100, got {}",
                self.delta.page_size
            )));
        }
        Ok(())
    }

    /// Check only what is needed to talk to the instance: a base URL and
    /// a token.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError::Config`] naming the missing setting.
    pub fn validate_connection(&self) -> Result<(), DeltaError> {
        if self.gitlab.base_url.is_empty() {
            return Err(DeltaError::Config(format!(
                "gitlab.base_url is required (or set {URL_ENV})"
            )));
        }
        let token = self.gitlab.private_token.as_deref().unwrap_or_default();
        if token.is_empty() {
            return Err(DeltaError::Config(format!(
                "gitlab.private_token is required (or set {TOKEN_ENV})"
            )));
        }
        Ok(())
    }
}

/// GitLab connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabConfig {
    /// Instance base URL, e.g. `https://gitlab.example.com`.
    #[serde(default)]
    pub base_url: String,
    /// Personal access token.
    pub private_token: Option<String>,
    /// API version segment (default: `v4`).
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Verify TLS certificates (default: true).
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    /// Per-request timeout in seconds (default: 15).
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Retries for transient failures (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_api_version() -> String {
    "v4".into()
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            private_token: None,
            api_version: default_api_version(),
            verify_ssl: true,
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
        }
    }
}

/// Project discovery mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// List every project in the configured groups, plus explicit projects.
    #[default]
    AutoDiscover,
    /// Use only the explicitly configured projects.
    Explicit,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::AutoDiscover => write!(f, "auto_discover"),
            ScanMode::Explicit => write!(f, "explicit"),
        }
    }
}

/// Scan configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Discovery mode (default: `auto_discover`).
    #[serde(default)]
    pub mode: ScanMode,
}

/// Explicitly configured projects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectsConfig {
    /// Project ids.
    #[serde(default)]
    pub by_id: Vec<u64>,
    /// Namespaced project paths.
    #[serde(default)]
    pub by_path: Vec<String>,
}

impl ProjectsConfig {
    /// `true` when no project is listed.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty() && self.by_path.is_empty()
    }
}

/// Groups to discover projects from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupsConfig {
    /// Descend into subgroups (default: true).
    #[serde(default = "default_true")]
    pub include_subgroups: bool,
    /// Group ids.
    #[serde(default)]
    pub by_id: Vec<u64>,
    /// Group paths.
    #[serde(default)]
    pub by_path: Vec<String>,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            include_subgroups: true,
            by_id: Vec::new(),
            by_path: Vec::new(),
        }
    }
}

/// Project path filters, applied after discovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiltersConfig {
    /// If non-empty, keep only these paths.
    #[serde(default)]
    pub include_project_paths: Vec<String>,
    /// Drop these paths.
    #[serde(default)]
    pub exclude_project_paths: Vec<String>,
}

/// Delta run tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaRunConfig {
    /// Projects compared at the same time (default: 4).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Commits requested per page, 1..=100 (default: 100).
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_concurrency() -> usize {
    4
}

fn default_page_size() -> u32 {
    100
}

impl Default for DeltaRunConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            page_size: default_page_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> DeltaConfig {
        DeltaConfig::from_toml(
            r#"
[gitlab]
base_url = "https://gitlab.example.com/"
private_token = "glpat-test"

[groups]
by_path = ["platform"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = DeltaConfig::default();
        assert_eq!(config.gitlab.api_version, "v4");
        assert!(config.gitlab.verify_ssl);
        assert_eq!(config.gitlab.timeout_seconds, 15);
        assert_eq!(config.gitlab.max_retries, 3);
        assert_eq!(config.scan.mode, ScanMode::AutoDiscover);
        assert!(config.groups.include_subgroups);
        assert_eq!(config.delta.concurrency, 4);
        assert_eq!(config.delta.page_size, 100);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = DeltaConfig::from_toml("").unwrap();
        assert_eq!(config.delta.page_size, 100);
        assert!(config.projects.is_empty());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(valid().gitlab.base_url, "https://gitlab.example.com");
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[gitlab]
base_url = "https://gitlab.example.com"
private_token = "glpat-test"
verify_ssl = false
timeout_seconds = 30

[scan]
mode = "explicit"

[projects]
by_id = [12, 34]
by_path = ["platform/api"]

[filters]
exclude_project_paths = ["platform/sandbox"]

[delta]
concurrency = 8
page_size = 50
"#;
        let config = DeltaConfig::from_toml(toml).unwrap();
        assert!(!config.gitlab.verify_ssl);
        assert_eq!(config.gitlab.timeout_seconds, 30);
        assert_eq!(config.scan.mode, ScanMode::Explicit);
        assert_eq!(config.projects.by_id, vec![12, 34]);
        assert_eq!(
            config.filters.exclude_project_paths,
            vec!["platform/sandbox"]
        );
        assert_eq!(config.delta.concurrency, 8);
        config.validate().unwrap();
    }

    #[test]
    fn invalid_scan_mode_is_rejected() {
        let result = DeltaConfig::from_toml("[scan]\nmode = \"everything\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_toml_returns_error() {
        assert!(DeltaConfig::from_toml("{{invalid}}").is_err());
    }

    #[test]
    fn validate_accepts_minimal_auto_discover() {
        valid().validate().unwrap();
    }

    #[test]
    fn validate_requires_token() {
        let mut config = valid();
        config.gitlab.private_token = None;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("private_token"));
    }

    #[test]
    fn validate_requires_a_source_per_mode() {
        let mut config = valid();
        config.groups.by_path.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("group"));

        config.scan.mode = ScanMode::Explicit;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("project"));

        config.projects.by_id.push(1);
        config.validate().unwrap();
    }

    #[test]
    fn connection_check_ignores_project_sources() {
        let mut config = valid();
        config.groups.by_path.clear();
        config.validate_connection().unwrap();

        config.gitlab.base_url.clear();
        let err = config.validate_connection().unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn validate_bounds_run_tuning() {
        let mut config = valid();
        config.delta.concurrency = 0;
        assert!(config.validate().is_err());

        config.delta.concurrency = 2;
        config.delta.page_size = 500;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn env_fills_unset_fields() {
        let mut config = DeltaConfig::default();
        config.apply_env_with(|key| match key {
            URL_ENV => Some("https://env.example.com/".into()),
            TOKEN_ENV => Some("from-env".into()),
            _ => None,
        });
        assert_eq!(config.gitlab.base_url, "https://env.example.com");
        assert_eq!(config.gitlab.private_token.as_deref(), Some("from-env"));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = valid();
        config.gitlab.private_token = Some("from-file".into());
        config.apply_env_with(|key| match key {
            URL_ENV => Some("https://override.example.com".into()),
            TOKEN_ENV => Some("from-env".into()),
            _ => None,
        });
        assert_eq!(config.gitlab.base_url, "https://override.example.com");
        assert_eq!(config.gitlab.private_token.as_deref(), Some("from-env"));
    }

    #[test]
    fn blank_or_missing_env_keeps_file_values() {
        let mut config = valid();
        config.apply_env_with(|_| None);
        assert_eq!(config.gitlab.base_url, "https://gitlab.example.com");
        assert_eq!(config.gitlab.private_token.as_deref(), Some("glpat-test"));

        config.apply_env_with(|_| Some(String::new()));
        assert_eq!(config.gitlab.base_url, "https://gitlab.example.com");
        assert_eq!(config.gitlab.private_token.as_deref(), Some("glpat-test"));
    }
}
