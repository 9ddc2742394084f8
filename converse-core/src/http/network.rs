//! Uniform request façade consumed by endpoint methods
//!
//! [`Network::request`] is the single call contract every endpoint goes
//! through: it stitches authorization headers, proxy configuration and the
//! per-request timeout from an [`Auth`] onto a one-shot [`Session`], performs
//! the exchange, and classifies the result. Concurrency is one task per
//! call: [`Network::request_spawned`] runs the same contract on its own
//! tokio task.

use crate::config::Auth;
use crate::http::{
    Method, Multipart, Response, Result, Session, WriteCallback,
};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// A fully-formed request handed to the façade by an endpoint method.
#[derive(Debug, Default)]
pub struct Request<'a> {
    pub method: Method,
    /// Path relative to the API root, e.g. `/chat/completions`
    pub path: String,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
    /// JSON-encoded payload; mutually configured with `multipart`
    pub body: Option<String>,
    pub multipart: Option<Multipart>,
    /// Streaming sink; when present the response body bypasses buffering
    pub write_callback: Option<WriteCallback<'a>>,
}

impl<'a> Request<'a> {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_multipart(mut self, multipart: Multipart) -> Self {
        self.multipart = Some(multipart);
        self
    }

    pub fn with_write_callback(mut self, callback: WriteCallback<'a>) -> Self {
        self.write_callback = Some(callback);
        self
    }
}

/// Request engine bound to an API root URL.
#[derive(Debug, Clone)]
pub struct Network {
    root: String,
}

impl Network {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Perform one authenticated exchange and classify the outcome.
    pub async fn request(&self, auth: &Auth, request: Request<'_>) -> Result<Response> {
        let request_id = Uuid::new_v4();
        debug!(
            %request_id,
            method = request.method.as_str(),
            path = %request.path,
            "dispatching request"
        );

        let mut session = Session::new(format!("{}{}", self.root, request.path));
        session.set_headers(auth.authorization_headers());
        session.set_headers(request.headers);
        if let Some(content_type) = request.content_type {
            session.set_header("Content-Type", content_type);
        }
        if let Some(body) = request.body {
            session.set_body(body);
        }
        if let Some(multipart) = request.multipart {
            session.set_multipart(multipart);
        }
        if let Some(callback) = request.write_callback {
            session.set_write_callback(callback);
        }
        session.set_timeout(auth.timeout());
        session.set_proxies(auth.proxies().clone());
        session.set_proxy_authentication(auth.proxy_authentication().clone());

        let transfer = match request.method {
            Method::Get => session.get().await?,
            Method::Post => session.post().await?,
            Method::Delete => session.delete().await?,
        };
        debug!(%request_id, status = transfer.status_code, "request completed");
        Response::from_transfer(transfer)
    }

    /// Asynchronous variant: run the request on its own task. The request
    /// must own its data (`'static`), so streaming sinks that borrow caller
    /// state go through [`Network::request`] instead.
    pub fn request_spawned(
        &self,
        auth: Auth,
        request: Request<'static>,
    ) -> tokio::task::JoinHandle<Result<Response>> {
        let network = self.clone();
        tokio::spawn(async move { network.request(&auth, request).await })
    }
}
