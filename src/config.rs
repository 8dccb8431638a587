use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

use crate::platform::UserId;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// The single sender allowed to trigger pipelines. Numbers and strings are
    /// both accepted and compared in their decimal string form.
    #[serde(default)]
    pub allowed_user_id: Option<UserId>,
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    /// Target repository as `owner/name`.
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            allowed_user_id: None,
            api_url: default_telegram_api_url(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            token: String::new(),
            api_url: default_github_api_url(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Config {
    /// Load the TOML file at `path`, overlay the environment and validate.
    ///
    /// When `must_exist` is false a missing file is not an error and every
    /// value may come from the environment instead.
    pub fn load(path: &Path, must_exist: bool) -> Result<Self> {
        Self::load_with(path, must_exist, |key| std::env::var(key).ok())
    }

    /// [`Config::load`] with the environment supplied by `lookup`.
    pub fn load_with<F>(path: &Path, must_exist: bool, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if path.exists() || must_exist {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(lookup);
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay non-empty values from the environment on top of the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(id) = lookup("ALLOWED_TELEGRAM_USER_ID") {
            self.telegram.allowed_user_id = Some(UserId::from(id.trim()));
        }
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(repo) = lookup("GITHUB_REPO") {
            self.github.repo = repo;
        }
        if let Some(token) = lookup("GH_PAT") {
            self.github.token = token;
        }
        if let Some(bind) = lookup("RELAY_BIND") {
            self.server.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.is_empty() {
            anyhow::bail!("telegram.bot_token is not set (or TELEGRAM_BOT_TOKEN)");
        }
        if self.telegram.allowed_user_id.is_none() {
            anyhow::bail!("telegram.allowed_user_id is not set (or ALLOWED_TELEGRAM_USER_ID)");
        }
        if self.github.token.is_empty() {
            anyhow::bail!("github.token is not set (or GH_PAT)");
        }
        match self.github.repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {}
            _ => anyhow::bail!(
                "github.repo must look like owner/name, got '{}'",
                self.github.repo
            ),
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.server.bind))
    }

    /// Normalized allowed sender id; empty until validated.
    pub fn allowed_user_id(&self) -> &str {
        self.telegram
            .allowed_user_id
            .as_ref()
            .map(UserId::as_str)
            .unwrap_or_default()
    }
}
