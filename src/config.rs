//! Connection and credential settings, loadable from TOML.
//!
//! ```toml
//! host = "mail.corp.example"
//! port = 587
//! domain = "CORP"
//! hostname = "WS01"
//! username = "jdoe"
//! password = "..."
//! ```


use std::path::Path;

use serde::Deserialize;

use crate::handshake::Credentials;
use crate::transport::SMTP_PORT;


const DEFAULT_HOST: &str = "127.0.0.1";


/// Settings for an NTLM-authenticated SMTP connection. Every field is optional.
#[derive(Clone, Default, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NtlmConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for NtlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtlmConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("domain", &self.domain)
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing setting: {0}")]
    Missing(&'static str),
}

impl NtlmConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load TOML config from path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Merges `other` on top of `self`; settings present in `other` win.
    pub fn overlay(self, other: NtlmConfig) -> NtlmConfig {
        NtlmConfig {
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            domain: other.domain.or(self.domain),
            hostname: other.hostname.or(self.hostname),
            username: other.username.or(self.username),
            password: other.password.or(self.password),
        }
    }

    /// The server to connect to, with defaults filled in.
    pub fn address(&self) -> (String, u16) {
        let host = self.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_owned());
        (host, self.port.unwrap_or(SMTP_PORT))
    }

    /// Builds the credentials; username and password are required.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let username = self.username.as_deref().ok_or(ConfigError::Missing("username"))?;
        let password = self.password.as_deref().ok_or(ConfigError::Missing("password"))?;

        Ok(Credentials::new(username, password)
            .with_domain(self.domain.clone().unwrap_or_default())
            .with_hostname(self.hostname.clone().unwrap_or_default()))
    }
}
