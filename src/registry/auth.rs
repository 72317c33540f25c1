use anyhow::{Context, Result};
use base64::prelude::*;
use oci_distribution::secrets::RegistryAuth;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Docker config.json structure
#[derive(Debug, Default, Deserialize)]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

/// Auth entry in docker config
#[derive(Debug, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    auth: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Credentials for a specific registry
#[derive(Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Registry credentials read from a Docker `config.json`
#[derive(Debug, Default)]
pub struct DockerAuth {
    config: DockerConfig,
}

impl DockerAuth {
    /// Load `config.json` from `dir`, or from `$HOME/.docker` when no directory is given.
    /// A missing file means anonymous access everywhere.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let path = match dir {
            Some(dir) => dir.join("config.json"),
            None => match std::env::var_os("HOME") {
                Some(home) => PathBuf::from(home).join(".docker").join("config.json"),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            debug!("No docker config at {}, using anonymous access", path.display());
            return Ok(Self::default());
        }

        let data = std::fs::read(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&data).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let config: DockerConfig = serde_json::from_slice(data)?;
        Ok(Self { config })
    }

    /// Authentication for a specific image, falling back to anonymous
    pub fn auth_for_image(&self, image: &str) -> RegistryAuth {
        let registry = extract_registry_from_image(image);
        debug!("Getting auth for registry: {} (image: {})", registry, image);

        match self.credentials_for(&registry) {
            Ok(Some(creds)) => RegistryAuth::Basic(creds.username, creds.password),
            Ok(None) => RegistryAuth::Anonymous,
            Err(e) => {
                warn!("Ignoring unusable credentials for {}: {}", registry, e);
                RegistryAuth::Anonymous
            },
        }
    }

    fn credentials_for(&self, registry: &str) -> Result<Option<RegistryCredentials>> {
        let entry = self
            .config
            .auths
            .get(registry)
            .or_else(|| self.config.auths.get(&format!("https://{}", registry)))
            .or_else(|| {
                self.config
                    .auths
                    .iter()
                    .find(|(key, _)| registry_matches(key, registry))
                    .map(|(_, entry)| entry)
            });

        match entry {
            Some(entry) => parse_auth_entry(entry),
            None => Ok(None),
        }
    }
}

/// Parse an auth entry and extract credentials
fn parse_auth_entry(entry: &DockerAuthEntry) -> Result<Option<RegistryCredentials>> {
    if !entry.username.is_empty() && !entry.password.is_empty() {
        return Ok(Some(RegistryCredentials {
            username: entry.username.clone(),
            password: entry.password.clone(),
        }));
    }

    // base64("username:password")
    if !entry.auth.is_empty() {
        let decoded = BASE64_STANDARD
            .decode(entry.auth.as_bytes())
            .context("Failed to decode auth token")?;
        let auth_str = String::from_utf8(decoded).context("Auth token is not valid UTF-8")?;

        if let Some((username, password)) = auth_str.split_once(':') {
            return Ok(Some(RegistryCredentials {
                username: username.to_string(),
                password: password.to_string(),
            }));
        }
    }

    Ok(None)
}

/// Extract registry hostname from image reference
pub fn extract_registry_from_image(image: &str) -> String {
    let parts: Vec<&str> = image.split('/').collect();

    if parts.len() > 1 {
        let first_part = parts[0];
        // If first part contains '.', ':', or is 'localhost', it's a registry
        if first_part.contains('.') || first_part.contains(':') || first_part == "localhost" {
            return first_part.to_string();
        }
    }

    "docker.io".to_string()
}

/// Check if a registry key matches the target registry
fn registry_matches(key: &str, target: &str) -> bool {
    let key_clean = key
        .trim_start_matches("https://")
        .trim_start_matches("http://");

    if key_clean == target {
        return true;
    }

    // Docker Hub aliases
    if target == "docker.io" {
        return key_clean == "index.docker.io"
            || key_clean == "registry-1.docker.io"
            || key_clean == "index.docker.io/v1/"
            || key_clean == "registry-1.docker.io/v1/";
    }

    false
}
