use std::collections::HashMap;

use crate::error::ConfigError;
use crate::parse::parse_bool;

pub const DEFAULT_NNTP_PORT: u16 = 119;
pub const DEFAULT_NNTPS_PORT: u16 = 563;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub encryption: bool,
    pub cert_verification: bool,
    pub compress_overview: bool,
    pub log_level: String,
    raw: HashMap<String, String>,
}

impl Config {
    pub fn from_raw(raw: HashMap<String, String>) -> Result<Self, ConfigError> {
        let host = raw
            .get("Host")
            .filter(|h| !h.is_empty())
            .cloned()
            .ok_or_else(|| ConfigError::MissingRequired("Host".into()))?;
        let encryption = parse_bool(raw.get("Encryption"), false);
        let port = match raw.get("Port").filter(|p| !p.is_empty()) {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                option: "Port".into(),
                value: value.clone(),
            })?,
            None if encryption => DEFAULT_NNTPS_PORT,
            None => DEFAULT_NNTP_PORT,
        };
        let non_empty = |key: &str| raw.get(key).filter(|v| !v.is_empty()).cloned();

        Ok(Self {
            host,
            port,
            username: non_empty("Username"),
            password: non_empty("Password"),
            encryption,
            cert_verification: parse_bool(raw.get("CertVerification"), true),
            compress_overview: parse_bool(raw.get("CompressOverview"), false),
            log_level: non_empty("LogLevel").unwrap_or_else(|| "info".to_string()),
            raw,
        })
    }

    /// `Some((user, pass))` when a username is configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let user = self.username.as_deref()?;
        Some((user, self.password.as_deref().unwrap_or("")))
    }

    pub fn raw(&self) -> &HashMap<String, String> {
        &self.raw
    }
}
