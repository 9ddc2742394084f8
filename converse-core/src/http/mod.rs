//! HTTP layer: transport primitives, the one-shot session engine, and the
//! response classifier.
//!
//! Every endpoint call goes through the same machinery: a [`Session`] is
//! configured with typed options (URL, headers, body or multipart form,
//! timeout, proxies, an optional streaming sink), performs exactly one
//! exchange, and yields a raw [`Transfer`]. [`Response::from_transfer`]
//! then classifies the outcome into the [`Error`] taxonomy or an immutable,
//! JSON-decoded response value.

pub mod error;
pub mod multipart;
pub mod network;
pub mod response;
pub mod session;

pub use error::{Error, Result};
pub use multipart::{Multipart, Part};
pub use network::{Network, Request};
pub use response::Response;
pub use session::{Session, Transfer};

use std::collections::BTreeMap;
use std::fmt;

/// HTTP method for a session exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Default for Method {
    fn default() -> Self {
        Method::Get
    }
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// Scheme-keyed proxy map (`"http"` / `"https"` to proxy URL).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proxies {
    hosts: BTreeMap<String, String>,
}

impl Proxies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a proxy URL for a scheme, replacing any previous entry.
    pub fn insert(&mut self, scheme: impl Into<String>, url: impl Into<String>) {
        self.hosts.insert(scheme.into(), url.into());
    }

    pub fn has(&self, scheme: &str) -> bool {
        self.hosts.contains_key(scheme)
    }

    pub fn get(&self, scheme: &str) -> Option<&str> {
        self.hosts.get(scheme).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl<S, U> FromIterator<(S, U)> for Proxies
where
    S: Into<String>,
    U: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (S, U)>>(iter: T) -> Self {
        let mut proxies = Proxies::new();
        for (scheme, url) in iter {
            proxies.insert(scheme, url);
        }
        proxies
    }
}

/// Per-scheme proxy credentials, attached only when a proxy exists for that
/// scheme.
#[derive(Clone, Default)]
pub struct ProxyAuthentication {
    credentials: BTreeMap<String, (String, String)>,
}

impl ProxyAuthentication {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        scheme: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) {
        self.credentials
            .insert(scheme.into(), (username.into(), password.into()));
    }

    pub fn has(&self, scheme: &str) -> bool {
        self.credentials.contains_key(scheme)
    }

    pub(crate) fn get(&self, scheme: &str) -> Option<(&str, &str)> {
        self.credentials
            .get(scheme)
            .map(|(u, p)| (u.as_str(), p.as_str()))
    }
}

impl fmt::Debug for ProxyAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyAuthentication")
            .field("schemes", &self.credentials.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Streaming sink for response bytes.
///
/// When attached to a session, response chunks bypass the internal content
/// buffer and are handed to the callback as they arrive; returning `false`
/// abandons the remainder of the transfer. This is the chat streaming path.
pub struct WriteCallback<'a> {
    callback: Box<dyn FnMut(&str) -> bool + Send + 'a>,
}

impl<'a> WriteCallback<'a> {
    pub fn new(callback: impl FnMut(&str) -> bool + Send + 'a) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    pub(crate) fn write(&mut self, data: &str) -> bool {
        (self.callback)(data)
    }
}

impl fmt::Debug for WriteCallback<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WriteCallback")
    }
}
