use crate::models::UpdateError;
use crate::notifications::WebhookConfig;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_UPSTREAM_REPO_URL: &str = "https://github.com/bitnami/charts.git";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_AUTHOR_NAME: &str = "Crosswind Bot";
pub const DEFAULT_AUTHOR_EMAIL: &str = "crosswind-bot@users.noreply.github.com";
pub const DEFAULT_MANIFEST: &str = "containers.yaml";
pub const DEFAULT_MAINTAINERS_FILE: &str = "MAINTAINERS";
pub const DEFAULT_PR_LABEL: &str = "needs-review";

/// Environment keys read by [`BotConfig::from_env`]
pub mod keys {
    pub const UPSTREAM_REPO_URL: &str = "UPSTREAM_REPO_URL";
    pub const DEVELOPMENT_REPO_URL: &str = "DEVELOPMENT_REPO_URL";
    pub const GIT_AUTHOR_NAME: &str = "GIT_AUTHOR_NAME";
    pub const GIT_AUTHOR_EMAIL: &str = "GIT_AUTHOR_EMAIL";
    pub const GITHUB_USER: &str = "GITHUB_USER";
    pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
    pub const GITHUB_API_URL: &str = "GITHUB_API_URL";
    pub const WORKDIR: &str = "CROSSWIND_WORKDIR";
    pub const MANIFEST: &str = "CROSSWIND_MANIFEST";
    pub const MAINTAINERS_FILE: &str = "CROSSWIND_MAINTAINERS_FILE";
    pub const PR_LABEL: &str = "CROSSWIND_PR_LABEL";
    pub const METRICS_TEXTFILE: &str = "CROSSWIND_METRICS_TEXTFILE";
    pub const LOG_JSON: &str = "CROSSWIND_LOG_JSON";
    pub const NOTIFY_WEBHOOK_URL: &str = "CROSSWIND_NOTIFY_WEBHOOK_URL";
    pub const NOTIFY_WEBHOOK_SECRET: &str = "CROSSWIND_NOTIFY_WEBHOOK_SECRET";
    pub const NOTIFY_WEBHOOK_TIMEOUT: &str = "CROSSWIND_NOTIFY_WEBHOOK_TIMEOUT";
    pub const NOTIFY_WEBHOOK_MAX_RETRIES: &str = "CROSSWIND_NOTIFY_WEBHOOK_MAX_RETRIES";
    pub const DOCKER_CONFIG: &str = "DOCKER_CONFIG";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct GithubSettings {
    pub user: Option<String>,
    pub token: Option<String>,
    pub api_url: String,
}

impl std::fmt::Debug for GithubSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubSettings")
            .field("user", &self.user)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Crosswind configuration, built once at start-up and passed down explicitly
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub upstream_repo_url: String,
    pub development_repo_url: String,
    pub author: GitIdentity,
    pub github: GithubSettings,
    /// Scratch clone owned exclusively by this process for the duration of a run
    pub workdir: PathBuf,
    /// Manifest path, relative to the clone
    pub manifest: PathBuf,
    /// Maintainers list, relative to the clone
    pub maintainers_file: PathBuf,
    pub pr_label: String,
    pub metrics_textfile: Option<PathBuf>,
    pub log_json: bool,
    pub docker_config: Option<PathBuf>,
    pub notifications: WebhookConfig,
}

impl BotConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Self {
        let vars: BTreeMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    /// Load configuration from a snapshot of environment-style key/value pairs
    pub fn from_map(data: &BTreeMap<String, String>) -> Self {
        let upstream_repo_url = parse_string(data, keys::UPSTREAM_REPO_URL, DEFAULT_UPSTREAM_REPO_URL);
        let development_repo_url = parse_optional_string(data, keys::DEVELOPMENT_REPO_URL)
            .unwrap_or_else(|| upstream_repo_url.clone());

        let notification_url = parse_optional_string(data, keys::NOTIFY_WEBHOOK_URL);

        let config = Self {
            upstream_repo_url,
            development_repo_url,
            author: GitIdentity {
                name: parse_string(data, keys::GIT_AUTHOR_NAME, DEFAULT_AUTHOR_NAME),
                email: parse_string(data, keys::GIT_AUTHOR_EMAIL, DEFAULT_AUTHOR_EMAIL),
            },
            github: GithubSettings {
                user: parse_optional_string(data, keys::GITHUB_USER),
                token: parse_optional_string(data, keys::GITHUB_TOKEN),
                api_url: parse_string(data, keys::GITHUB_API_URL, DEFAULT_GITHUB_API_URL)
                    .trim_end_matches('/')
                    .to_string(),
            },
            workdir: PathBuf::from(parse_string(data, keys::WORKDIR, "workspace")),
            manifest: PathBuf::from(parse_string(data, keys::MANIFEST, DEFAULT_MANIFEST)),
            maintainers_file: PathBuf::from(parse_string(
                data,
                keys::MAINTAINERS_FILE,
                DEFAULT_MAINTAINERS_FILE,
            )),
            pr_label: parse_string(data, keys::PR_LABEL, DEFAULT_PR_LABEL),
            metrics_textfile: parse_optional_string(data, keys::METRICS_TEXTFILE).map(PathBuf::from),
            log_json: parse_bool(data, keys::LOG_JSON, false),
            docker_config: parse_optional_string(data, keys::DOCKER_CONFIG).map(PathBuf::from),
            notifications: WebhookConfig {
                enabled: notification_url.is_some(),
                url: notification_url,
                secret: parse_optional_string(data, keys::NOTIFY_WEBHOOK_SECRET),
                timeout_seconds: parse_u64(data, keys::NOTIFY_WEBHOOK_TIMEOUT, 10),
                max_retries: parse_u64(data, keys::NOTIFY_WEBHOOK_MAX_RETRIES, 3) as u32,
            },
        };

        debug!("Loaded configuration: {:?}", config);
        config
    }

    /// Fail before any mutation when a credential or a required tool is missing
    pub fn validate(&self) -> Result<(), UpdateError> {
        self.validate_credentials()?;
        which::which("git").map_err(|e| {
            UpdateError::Configuration(format!("required tool 'git' not found: {}", e))
        })?;
        Ok(())
    }

    fn validate_credentials(&self) -> Result<(), UpdateError> {
        let missing: Vec<&str> = [
            (keys::GITHUB_USER, &self.github.user),
            (keys::GITHUB_TOKEN, &self.github.token),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(key, _)| key)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(UpdateError::Configuration(format!(
                "missing required credential(s): {}",
                missing.join(", ")
            )))
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.workdir.join(&self.manifest)
    }

    pub fn maintainers_path(&self) -> PathBuf {
        self.workdir.join(&self.maintainers_file)
    }

    /// HTTPS URLs get the GitHub credentials embedded; other URLs are returned as-is
    pub fn authenticated_url(&self, url: &str) -> String {
        match (&self.github.user, &self.github.token, url.strip_prefix("https://")) {
            (Some(user), Some(token), Some(rest)) => format!("https://{}:{}@{}", user, token, rest),
            _ => url.to_string(),
        }
    }
}

// Helper functions for parsing configuration values
fn parse_bool(data: &BTreeMap<String, String>, key: &str, default: bool) -> bool {
    data.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_u64(data: &BTreeMap<String, String>, key: &str, default: u64) -> u64 {
    data.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_string(data: &BTreeMap<String, String>, key: &str, default: &str) -> String {
    parse_optional_string(data, key).unwrap_or_else(|| default.to_string())
}

fn parse_optional_string(data: &BTreeMap<String, String>, key: &str) -> Option<String> {
    data.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}
