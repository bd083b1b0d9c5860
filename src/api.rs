// src/api.rs

// Thin client for the lab REST API. Everything here is request/response glue;
// no orchestration state lives in this module.

use color_eyre::eyre::{Result, WrapErr};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use strum::Display;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::core::models::Service;

/// A lab machine as reported by the catalogue endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetRecord {
    pub id: u64,
    pub name: String,
    pub ip: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub services: Vec<Service>,
}

/// Connection status of the operator's lab session.
#[derive(Debug, Clone, Deserialize)]
pub struct LabStatus {
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub connected: bool,
    #[serde(default)]
    pub ipv4: Option<String>,
    #[serde(default)]
    pub ipv6: Option<String>,
}

/// Target state transitions owned by the lab service, not by this console.
#[derive(Debug, Clone, Copy, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TargetAction {
    Start,
    Stop,
    Reset,
}

pub struct LabClient {
    http: reqwest::Client,
    base: Url,
}

impl LabClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut base =
            Url::parse(&config.api_url).wrap_err("invalid api_url in configuration")?;
        // Url::join treats a path without a trailing slash as a file name.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut token = HeaderValue::from_str(&format!("Bearer {}", config.api_token))
            .wrap_err("api_token is not a valid header value")?;
        token.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, token);

        let http = reqwest::Client::builder()
            .user_agent(concat!("foothold/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    pub async fn targets(&self) -> Result<Vec<TargetRecord>> {
        let url = self.endpoint("targets")?;
        debug!(%url, "Fetching target catalogue.");
        Ok(self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    pub async fn set_target_state(&self, id: u64, action: TargetAction) -> Result<()> {
        let url = self.endpoint(&format!("targets/{id}/{action}"))?;
        debug!(%url, "Requesting target state change.");
        self.http.post(url).send().await?.error_for_status()?;
        Ok(())
    }

    pub async fn lab_status(&self) -> Result<LabStatus> {
        let url = self.endpoint("lab")?;
        Ok(self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// Download the OpenVPN profile text. Importing or activating it is the
    /// operator's business.
    pub async fn vpn_config(&self) -> Result<String> {
        let url = self.endpoint("lab/config")?;
        Ok(self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?)
    }
}
