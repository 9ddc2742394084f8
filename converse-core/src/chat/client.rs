//! Chat completions endpoint
//!
//! [`ChatCompletion`] is a thin façade over the request engine: it
//! serializes a [`Conversation`]'s message log together with typed model
//! parameters, posts to `/chat/completions`, and hands the classified
//! [`Response`] back so the caller can feed it into
//! [`Conversation::update_from`]. Streaming requests thread server bytes
//! through [`Conversation::append_stream_data`] as they arrive.

use crate::chat::conversation::Conversation;
use crate::chat::types::StreamDelta;
use crate::config::Auth;
use crate::http::{Method, Network, Request, Response, Result, WriteCallback};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

pub const DEFAULT_API_ROOT: &str = "https://api.openai.com/v1";

/// Sampling and output-shaping parameters for one completion call.
///
/// Absent fields are omitted from the request body so the server applies
/// its own defaults.
#[derive(Debug, Clone, Serialize)]
pub struct ChatParams {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<HashMap<String, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ChatParams {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            top_p: None,
            n: None,
            stop: None,
            max_tokens: None,
            presence_penalty: None,
            frequency_penalty: None,
            logit_bias: None,
            user: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_n(mut self, n: u32) -> Self {
        self.n = Some(n);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_presence_penalty(mut self, presence_penalty: f64) -> Self {
        self.presence_penalty = Some(presence_penalty);
        self
    }

    pub fn with_frequency_penalty(mut self, frequency_penalty: f64) -> Self {
        self.frequency_penalty = Some(frequency_penalty);
        self
    }

    pub fn with_logit_bias(mut self, logit_bias: HashMap<String, f64>) -> Self {
        self.logit_bias = Some(logit_bias);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Chat completions client bound to an API root.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    network: Network,
}

impl Default for ChatCompletion {
    fn default() -> Self {
        Self::new(DEFAULT_API_ROOT)
    }
}

impl ChatCompletion {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            network: Network::new(root),
        }
    }

    /// One complete (non-streamed) completion call.
    ///
    /// The returned [`Response`] is not applied to the conversation; pass
    /// it to [`Conversation::update_from`] once the caller has inspected
    /// it.
    pub async fn create(
        &self,
        auth: &Auth,
        params: &ChatParams,
        conversation: &Conversation,
    ) -> Result<Response> {
        let body = build_body(params, conversation, false)?;
        let request = Request::new(Method::Post, "/chat/completions")
            .with_content_type("application/json")
            .with_body(body);
        self.network.request(auth, request).await
    }

    /// [`ChatCompletion::create`] on its own tokio task. The conversation
    /// is serialized up front so the handle owns all request data.
    pub fn create_spawned(
        &self,
        auth: Auth,
        params: &ChatParams,
        conversation: &Conversation,
    ) -> Result<tokio::task::JoinHandle<Result<Response>>> {
        let body = build_body(params, conversation, false)?;
        let request = Request::new(Method::Post, "/chat/completions")
            .with_content_type("application/json")
            .with_body(body);
        Ok(self.network.request_spawned(auth, request))
    }

    /// Streamed completion call. Server-sent-event chunks are reassembled
    /// into `conversation` as they arrive and each aggregated delta is
    /// handed to `on_delta`; returning `false` from it aborts the transfer.
    ///
    /// On success the conversation already contains the full assistant
    /// message, so the returned [`Response`] body is the raw event stream,
    /// kept only for diagnostics.
    pub async fn create_stream<F>(
        &self,
        auth: &Auth,
        params: &ChatParams,
        conversation: &mut Conversation,
        mut on_delta: F,
    ) -> Result<Response>
    where
        F: FnMut(&StreamDelta, &Conversation) -> bool + Send,
    {
        let body = build_body(params, conversation, true)?;
        let callback = WriteCallback::new(move |chunk: &str| {
            match conversation.append_stream_data(chunk) {
                Some(delta) => on_delta(&delta, conversation),
                None => true,
            }
        });
        let request = Request::new(Method::Post, "/chat/completions")
            .with_content_type("application/json")
            .with_body(body)
            .with_write_callback(callback);
        self.network.request(auth, request).await
    }
}

fn build_body(params: &ChatParams, conversation: &Conversation, stream: bool) -> Result<String> {
    let mut body = match serde_json::to_value(params) {
        Ok(Value::Object(map)) => map,
        _ => {
            return Err(crate::http::Error::failure_to_parse(
                "chat",
                "parameters did not serialize to an object",
            ))
        }
    };
    body.insert(
        "messages".to_string(),
        serde_json::to_value(conversation.messages())
            .map_err(|e| crate::http::Error::failure_to_parse("chat", e.to_string()))?,
    );
    if let Some(functions) = conversation.functions() {
        body.insert("functions".to_string(), functions.to_json());
        body.insert("function_call".to_string(), json!("auto"));
    }
    if stream {
        body.insert("stream".to_string(), json!(true));
    }
    Ok(Value::Object(body).to_string())
}
