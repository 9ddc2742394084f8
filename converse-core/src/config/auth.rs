//! Authorization configuration
//!
//! An [`Auth`] is an explicit configuration object constructed once and
//! passed by reference into the request engine. Its setters are not
//! synchronized: configure it before concurrent use begins, then share it
//! read-only across requests.

use crate::config::{ConfigError, SecretString};
use crate::http::{Proxies, ProxyAuthentication};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials, proxy configuration and the per-request timeout.
#[derive(Debug, Clone)]
pub struct Auth {
    key: SecretString,
    organization: Option<String>,
    proxies: Proxies,
    proxy_auth: ProxyAuthentication,
    timeout: Duration,
}

impl Auth {
    /// Build from an API key. Fails on an empty key.
    pub fn new(key: impl Into<SecretString>) -> Result<Self, ConfigError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ConfigError::EmptyKey);
        }
        Ok(Self {
            key,
            organization: None,
            proxies: Proxies::new(),
            proxy_auth: ProxyAuthentication::new(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Read the key from an environment variable.
    pub fn from_env(var: &str) -> Result<Self, ConfigError> {
        let key = std::env::var(var).map_err(|_| ConfigError::MissingEnv {
            var: var.to_string(),
        })?;
        Self::new(key)
    }

    /// Read the key from the first line of a file. The file must exist, be
    /// a regular file, and be non-empty.
    pub fn from_key_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(ConfigError::InvalidKeyFile {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let key = content.lines().next().unwrap_or_default().trim();
        Self::new(key)
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_proxies(mut self, proxies: Proxies) -> Self {
        self.proxies = proxies;
        self
    }

    pub fn with_proxy_authentication(mut self, proxy_auth: ProxyAuthentication) -> Self {
        self.proxy_auth = proxy_auth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Headers attached to every authenticated request.
    pub fn authorization_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.key.expose_secret()),
        );
        if let Some(organization) = &self.organization {
            headers.insert("OpenAI-Organization".to_string(), organization.clone());
        }
        headers
    }

    pub fn proxies(&self) -> &Proxies {
        &self.proxies
    }

    pub fn proxy_authentication(&self) -> &ProxyAuthentication {
        &self.proxy_auth
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
