//! One-shot HTTP session engine
//!
//! A [`Session`] performs exactly one exchange. Options are applied through
//! setter methods before invoking one of [`Session::get`], [`Session::post`],
//! [`Session::delete`] or [`Session::download`]; the session is consumed by
//! the perform step, so every request-scoped resource is released on every
//! exit path.

use crate::http::{Error, Method, Multipart, Proxies, ProxyAuthentication, Result, WriteCallback};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("converse-core/", env!("CARGO_PKG_VERSION"));

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw output of one performed exchange, read from transport introspection.
#[derive(Debug, Clone, Default)]
pub struct Transfer {
    pub status_code: u16,
    pub status_line: String,
    pub reason: String,
    pub headers: HashMap<String, String>,
    pub content: String,
    /// Elapsed wall time of the perform step, in seconds
    pub elapsed: f64,
    /// Effective URL after redirects
    pub url: String,
}

/// A single-use HTTP exchange.
///
/// The lifetime parameter covers an optional [`WriteCallback`] sink that may
/// borrow caller state (the chat streaming path mutates a conversation in
/// place from inside the callback).
pub struct Session<'a> {
    url: String,
    headers: HashMap<String, String>,
    body: Option<String>,
    multipart: Option<Multipart>,
    timeout: Duration,
    proxies: Proxies,
    proxy_auth: ProxyAuthentication,
    write_callback: Option<WriteCallback<'a>>,
}

impl<'a> Session<'a> {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            multipart: None,
            timeout: DEFAULT_TIMEOUT,
            proxies: Proxies::new(),
            proxy_auth: ProxyAuthentication::new(),
            write_callback: None,
        }
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn set_headers(&mut self, headers: HashMap<String, String>) {
        self.headers.extend(headers);
    }

    /// Attach a raw body; mutually configured with `set_multipart`.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = Some(body.into());
    }

    /// Attach a multipart form; mutually configured with `set_body`.
    pub fn set_multipart(&mut self, multipart: Multipart) {
        self.multipart = Some(multipart);
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn set_proxies(&mut self, proxies: Proxies) {
        self.proxies = proxies;
    }

    pub fn set_proxy_authentication(&mut self, proxy_auth: ProxyAuthentication) {
        self.proxy_auth = proxy_auth;
    }

    /// Redirect response bytes from the internal buffer to a streaming sink.
    /// Only one of the two sinks is active per request.
    pub fn set_write_callback(&mut self, callback: WriteCallback<'a>) {
        self.write_callback = Some(callback);
    }

    pub async fn get(self) -> Result<Transfer> {
        self.perform(Method::Get, None).await
    }

    pub async fn post(self) -> Result<Transfer> {
        self.perform(Method::Post, None).await
    }

    pub async fn delete(self) -> Result<Transfer> {
        self.perform(Method::Delete, None).await
    }

    /// Perform a GET and write the response body to `file` chunk-wise.
    pub async fn download(self, file: &mut tokio::fs::File) -> Result<Transfer> {
        self.perform(Method::Get, Some(file)).await
    }

    fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(self.timeout);

        for scheme in ["http", "https"] {
            let Some(proxy_url) = self.proxies.get(scheme) else {
                continue;
            };
            let proxy = match scheme {
                "http" => reqwest::Proxy::http(proxy_url),
                _ => reqwest::Proxy::https(proxy_url),
            }
            .map_err(|e| Error::connection("Session::build_client", e))?;
            let proxy = match self.proxy_auth.get(scheme) {
                Some((username, password)) => proxy.basic_auth(username, password),
                None => proxy,
            };
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| Error::connection("Session::build_client", e))
    }

    async fn perform(
        mut self,
        method: Method,
        mut download: Option<&mut tokio::fs::File>,
    ) -> Result<Transfer> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| Error::connection("Session::perform", format!("{}: {e}", self.url)))?;
        let client = self.build_client()?;

        let reqwest_method = match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut request = client.request(reqwest_method, url);

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        if let Some(body) = self.body.take() {
            request = request.body(body);
        }
        if let Some(multipart) = self.multipart.take() {
            request = request.multipart(multipart.into_form().await?);
        }

        debug!(method = method.as_str(), url = %self.url, "performing request");
        let start = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| Error::connection("Session::perform", e))?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let status_line = format!("{:?} {} {}", response.version(), status.as_u16(), reason);
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().trim().to_string(),
                )
            })
            .collect();
        let effective_url = response.url().to_string();
        if !status.is_success() {
            warn!(status = status.as_u16(), url = %effective_url, "non-success status");
        }

        let content = if let Some(file) = download.as_deref_mut() {
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| Error::connection("Session::download", e))?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| Error::file("Session::download", e))?;
            }
            file.flush()
                .await
                .map_err(|e| Error::file("Session::download", e))?;
            String::new()
        } else if let Some(mut callback) = self.write_callback.take() {
            let mut stream = response.bytes_stream();
            let mut pending: Vec<u8> = Vec::new();
            let mut aborted = false;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| Error::connection("Session::perform", e))?;
                pending.extend_from_slice(&chunk);
                if let Some(text) = drain_utf8_prefix(&mut pending) {
                    if !callback.write(&text) {
                        debug!("write callback aborted the transfer");
                        aborted = true;
                        break;
                    }
                }
            }
            if !aborted && !pending.is_empty() {
                // Stream ended mid-character; flush what remains.
                let _ = callback.write(&String::from_utf8_lossy(&pending));
            }
            String::new()
        } else {
            response
                .text()
                .await
                .map_err(|e| Error::connection("Session::perform", e))?
        };

        Ok(Transfer {
            status_code: status.as_u16(),
            status_line,
            reason,
            headers,
            content,
            elapsed: start.elapsed().as_secs_f64(),
            url: effective_url,
        })
    }
}

/// Drain the longest decodable prefix of `pending` as text.
///
/// A multi-byte character split across transport chunks is held back until
/// its remaining bytes arrive; genuinely invalid sequences are replaced and
/// drained so the stream cannot stall on them.
fn drain_utf8_prefix(pending: &mut Vec<u8>) -> Option<String> {
    let flush_len = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        // error_len of None means the bytes end mid-character
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => pending.len(),
    };
    if flush_len == 0 {
        return None;
    }
    let bytes: Vec<u8> = pending.drain(..flush_len).collect();
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.url)
            .field("has_body", &(self.body.is_some() || self.multipart.is_some()))
            .field("timeout", &self.timeout)
            .finish()
    }
}
