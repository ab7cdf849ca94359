//! Environment selection: `environments/<env>.toml` plus variable overrides.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use record_store_api::ClientConfig;
use serde::Deserialize;

/// Overrides `base_url` from the environment file.
pub const URL_VAR: &str = "RECORD_STORE_URL";
/// Overrides `token` from the environment file.
pub const TOKEN_VAR: &str = "RECORD_STORE_TOKEN";

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Contents of an environment file.
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct EnvFile {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl EnvFile {
    /// Reads `<dir>/<name>.toml`.
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(format!("{name}.toml"));
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("environment '{name}' not found at {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid environment file {}", path.display()))
    }

    /// Applies overrides and produces the client config.
    ///
    /// `url` and `token` are the values of [`URL_VAR`] and [`TOKEN_VAR`];
    /// empty values count as unset.
    pub fn into_client_config(
        self,
        name: &str,
        url: Option<String>,
        token: Option<String>,
    ) -> Result<ClientConfig> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let Some(base_url) = non_empty(url).or(non_empty(self.base_url)) else {
            bail!("environment '{name}' has no base_url (set it in the file or via {URL_VAR})");
        };

        let mut config = ClientConfig::new(base_url);
        config.token = non_empty(token).or(non_empty(self.token));
        config.timeout = Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
        Ok(config)
    }
}

/// Resolves the client config for environment `name`.
///
/// When the file is missing but [`URL_VAR`] is set, the variables alone are
/// enough.
pub fn client_config(dir: &Path, name: &str) -> Result<ClientConfig> {
    let url = std::env::var(URL_VAR).ok();
    let token = std::env::var(TOKEN_VAR).ok();
    let file = match EnvFile::load(dir, name) {
        Ok(file) => file,
        Err(_) if url.is_some() => EnvFile::default(),
        Err(e) => return Err(e),
    };
    file.into_client_config(name, url, token)
}
