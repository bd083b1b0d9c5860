// src/config.rs

use std::path::PathBuf;

use color_eyre::eyre::{Result, WrapErr, eyre};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

fn default_wordlist() -> String {
    "/usr/share/wordlists/dirbuster/directory-list-2.3-small.txt".to_string()
}

/// Console configuration, persisted as JSON in the platform config directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the lab API, e.g. `https://lab.example.com/api/v4/`.
    pub api_url: String,
    pub api_token: String,
    #[serde(default = "default_wordlist")]
    pub gobuster_wordlist: String,
    /// Where scan tools write their artifact files. Defaults to `scans/`
    /// under the data directory.
    #[serde(default)]
    pub scans_dir: Option<PathBuf>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("com", "foothold", env!("CARGO_PKG_NAME"))
            .map(|dirs| dirs.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("foothold.json"))
    }

    /// Load the configuration, from `path` when given. A missing or
    /// malformed file is a startup error naming the offending path.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.unwrap_or_else(Self::default_path);
        let raw = std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("{}: unable to read configuration", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("{}: malformed configuration", path.display()))?;
        if config.api_token.is_empty() {
            return Err(eyre!("no api token provided"));
        }
        Ok(config)
    }

    pub fn scan_output_dir(&self) -> PathBuf {
        self.scans_dir
            .clone()
            .unwrap_or_else(|| crate::logging::data_dir().join("scans"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_configuration_parses_with_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"api_url": "https://lab.example.com/api/", "api_token": "tok"}"#,
        )
        .unwrap();
        assert!(config.gobuster_wordlist.contains("wordlists"));
        assert!(config.scans_dir.is_none());
    }
}
