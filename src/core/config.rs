//! Configuration management with layered hierarchy
//!
//! Defaults, then a global config file, then a project-local file, then
//! environment variables. The INVENTREE_* variable names match the backend
//! deployments this tool is pointed at.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// partsync configuration with layered hierarchy
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend API base URL (e.g. http://inventree.localhost/api)
    pub api_url: Option<String>,

    /// Site URL used for part links and attachments; derived from api_url
    /// when not set explicitly
    pub site_url: Option<String>,

    /// API username (used to fetch a token when no token is configured)
    pub username: Option<String>,

    /// API password
    pub password: Option<String>,

    /// Pre-issued API token; takes precedence over username/password
    pub token: Option<String>,

    /// Listing page size for collection fetches
    pub page_size: Option<usize>,

    /// Output directory for shadow-database flat files
    pub shadow_output: Option<PathBuf>,
}

const LOCAL_CONFIG_FILE: &str = "partsync.yaml";

impl Config {
    /// Load configuration from all sources, merging in priority order.
    pub fn load() -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/partsync/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            config.merge_file(&global_path);
        }

        // 3. Working-directory config (./partsync.yaml)
        config.merge_file(Path::new(LOCAL_CONFIG_FILE));

        // 4. Environment variables
        if let Ok(url) = std::env::var("INVENTREE_API_URL") {
            config.api_url = Some(url);
        }
        if let Ok(url) = std::env::var("INVENTREE_SITE_URL") {
            config.site_url = Some(url);
        }
        if let Ok(username) = std::env::var("INVENTREE_USERNAME") {
            config.username = Some(username);
        }
        if let Ok(password) = std::env::var("INVENTREE_PASSWORD") {
            config.password = Some(password);
        }
        if let Ok(token) = std::env::var("INVENTREE_TOKEN") {
            config.token = Some(token);
        }

        config
    }

    /// Names of required settings that are missing.
    ///
    /// Checked before any I/O: an import or purge without credentials must
    /// fail fast with a non-zero exit.
    pub fn validate_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_url.is_none() {
            missing.push("INVENTREE_API_URL");
        }
        if self.token.is_none() {
            if self.username.is_none() {
                missing.push("INVENTREE_USERNAME");
            }
            if self.password.is_none() {
                missing.push("INVENTREE_PASSWORD");
            }
        }
        missing
    }

    /// Site URL for part links, falling back to the API URL with its
    /// trailing `/api` stripped.
    pub fn site_url(&self) -> String {
        if let Some(ref site) = self.site_url {
            return site.trim_end_matches('/').to_string();
        }
        self.api_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').trim_end_matches("/api"))
            .unwrap_or("http://inventree.localhost")
            .trim_end_matches('/')
            .to_string()
    }

    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "partsync")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    fn merge_file(&mut self, path: &Path) {
        if !path.exists() {
            return;
        }
        if let Ok(contents) = std::fs::read_to_string(path) {
            if let Ok(other) = serde_yml::from_str::<Config>(&contents) {
                self.merge(other);
            }
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Config) {
        if other.api_url.is_some() {
            self.api_url = other.api_url;
        }
        if other.site_url.is_some() {
            self.site_url = other.site_url;
        }
        if other.username.is_some() {
            self.username = other.username;
        }
        if other.password.is_some() {
            self.password = other.password;
        }
        if other.token.is_some() {
            self.token = other.token;
        }
        if other.page_size.is_some() {
            self.page_size = other.page_size;
        }
        if other.shadow_output.is_some() {
            self.shadow_output = other.shadow_output;
        }
    }
}
