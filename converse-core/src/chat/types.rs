//! Message and wire-shape types for chat exchanges

use serde::{Deserialize, Serialize};

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions that guide the model's behavior
    System,
    /// User input message
    User,
    /// Assistant (model) response
    Assistant,
    /// Function call result
    Function,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        }
    }
}

/// One entry of the conversation log.
///
/// Matches the wire shape exactly: `content` is serialized even when null,
/// `name` only when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A captured function invocation request from the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Raw argument text; the server streams it as JSON-encoded fragments
    pub arguments: String,
}

/// Aggregated output of one `append_stream_data` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDelta {
    /// Content appended to the in-progress message by this chunk
    pub content: String,
    /// True once the `[DONE]` sentinel has been seen
    pub completed: bool,
}

// Wire shapes for streamed chunks: `data: {"choices":[{"delta":{...}}]}`.
// Absent fields genuinely mean "not in this delta", so plain Options fit.

#[derive(Debug, Deserialize)]
pub(crate) struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamChoice {
    #[serde(default)]
    pub delta: MessageDelta,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MessageDelta {
    pub role: Option<Role>,
    pub content: Option<String>,
    pub function_call: Option<FunctionCallDelta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FunctionCallDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}
