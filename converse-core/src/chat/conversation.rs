//! Conversation state machine
//!
//! A [`Conversation`] keeps the authoritative, replayable log of a
//! multi-turn exchange and reconciles it against both complete and
//! incrementally-streamed server output. Structural failures (empty input,
//! role mismatch, missing keys) are reported through boolean returns;
//! only malformed input JSON handed to [`Conversation::update`] or
//! [`Conversation::import`] propagates as an error. Mid-stream truncation
//! is an expected condition and is recovered locally, never surfaced.

use crate::chat::functions::Functions;
use crate::chat::types::{FunctionCall, Message, Role, StreamChunk, StreamDelta};
use crate::http::Response;
use serde_json::{json, Value};
use tracing::warn;

/// Cap on the buffered unterminated stream fragment. A genuinely malformed
/// event would otherwise be re-buffered forever and grow without bound.
const MAX_INCOMPLETE_BUFFER: usize = 64 * 1024;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Ordered message log with function-call bookkeeping and streaming
/// reassembly.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    functions: Option<Functions>,
    /// Pending function invocation captured from the last response;
    /// `Some` exactly when the last response was a function call.
    function_call: Option<FunctionCall>,
    /// Unterminated partial event from the previous streaming call
    last_incomplete_buffer: String,
    /// True while a streamed assistant message is still accumulating
    stream_pending: bool,
    max_history_size: Option<usize>,
}

impl Conversation {
    /// Create an empty conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation seeded with a system message.
    pub fn with_system(system_data: &str) -> Self {
        let mut conversation = Self::new();
        let _ = conversation.set_system_data(system_data);
        conversation
    }

    /// Create a conversation seeded with user turns only.
    pub fn with_user<'d>(user_data: impl IntoIterator<Item = &'d str>) -> Self {
        let mut conversation = Self::new();
        for data in user_data {
            let _ = conversation.add_user_data(data);
        }
        conversation
    }

    /// Create a conversation seeded with a system message and user turns.
    pub fn with_system_and_user<'d>(
        system_data: &str,
        user_data: impl IntoIterator<Item = &'d str>,
    ) -> Self {
        let mut conversation = Self::with_system(system_data);
        for data in user_data {
            let _ = conversation.add_user_data(data);
        }
        conversation
    }

    /// Set the system data. Fails on empty text or if a system message
    /// already exists anywhere in the log; call it before user turns.
    #[must_use]
    pub fn set_system_data(&mut self, data: &str) -> bool {
        if data.is_empty() || self.messages.iter().any(|m| m.role == Role::System) {
            return false;
        }
        self.reset_stream_state();
        self.messages.push(Message::new(Role::System, data));
        true
    }

    /// Rewrite the content of the first message iff it is a system message.
    #[must_use]
    pub fn change_first_system_message(&mut self, new_data: &str) -> bool {
        if new_data.is_empty() {
            return false;
        }
        match self.messages.first_mut() {
            Some(message) if message.role == Role::System => {
                message.content = Some(new_data.to_string());
                true
            }
            _ => false,
        }
    }

    /// Remove the system message only if it is literally the first message.
    #[must_use]
    pub fn pop_system_data(&mut self) -> bool {
        match self.messages.first() {
            Some(message) if message.role == Role::System => {
                self.reset_stream_state();
                self.messages.remove(0);
                true
            }
            _ => false,
        }
    }

    /// Append a user message. Fails on empty text.
    #[must_use]
    pub fn add_user_data(&mut self, data: &str) -> bool {
        if data.is_empty() {
            return false;
        }
        self.reset_stream_state();
        self.messages.push(Message::new(Role::User, data));
        self.erase_extra();
        true
    }

    /// Append a user message tagged with an author name. The name is
    /// required when impersonating a function response.
    #[must_use]
    pub fn add_user_data_as(&mut self, data: &str, name: &str) -> bool {
        if data.is_empty() {
            return false;
        }
        self.reset_stream_state();
        self.messages
            .push(Message::new(Role::User, data).with_name(name));
        self.erase_extra();
        true
    }

    /// Remove the last message only if its role is `user`.
    #[must_use]
    pub fn pop_user_data(&mut self) -> bool {
        self.pop_last_if(Role::User)
    }

    /// Remove the last message only if its role is `assistant`.
    #[must_use]
    pub fn pop_last_response(&mut self) -> bool {
        self.pop_last_if(Role::Assistant)
    }

    fn pop_last_if(&mut self, role: Role) -> bool {
        match self.messages.last() {
            Some(message) if message.role == role => {
                self.reset_stream_state();
                self.messages.pop();
                true
            }
            _ => false,
        }
    }

    /// Streaming reassembly state does not survive other log mutations; an
    /// abandoned stream must not leak its pending marker into the next turn.
    fn reset_stream_state(&mut self) {
        self.stream_pending = false;
        self.last_incomplete_buffer.clear();
    }

    /// Content of the last message if it is an assistant response.
    pub fn last_response(&self) -> Option<&str> {
        match self.messages.last() {
            Some(message) if message.role == Role::Assistant => message.content.as_deref(),
            _ => None,
        }
    }

    /// Whether the most recent update captured a function call instead of
    /// assistant text.
    pub fn last_response_is_function_call(&self) -> bool {
        self.function_call.is_some()
    }

    /// Name of the captured function call; meaningful only after
    /// [`Conversation::last_response_is_function_call`] returns true.
    pub fn last_function_call_name(&self) -> Option<&str> {
        self.function_call.as_ref().map(|fc| fc.name.as_str())
    }

    /// Raw argument text of the captured function call.
    pub fn last_function_call_arguments(&self) -> Option<&str> {
        self.function_call.as_ref().map(|fc| fc.arguments.as_str())
    }

    /// Reconcile a complete (non-streamed) response body into the log.
    ///
    /// Accepts three shapes: `{"choices":[{"message":{...}}]}`, a single
    /// `{"message":{...}}`, or a bare `{"role":..,"content":..}`. Any stale
    /// function-call record from a prior turn is cleared before appending.
    /// Returns `Ok(false)` with no mutation when the payload lacks the
    /// expected shape; JSON parse failures propagate.
    pub fn update(&mut self, response: &str) -> Result<bool, serde_json::Error> {
        if response.is_empty() {
            return Ok(false);
        }
        let root: Value = serde_json::from_str(response)?;
        Ok(self.update_from_value(&root))
    }

    /// [`Conversation::update`] on a classified [`Response`]'s body.
    pub fn update_from(&mut self, response: &Response) -> Result<bool, serde_json::Error> {
        self.update(&response.content)
    }

    fn update_from_value(&mut self, root: &Value) -> bool {
        // Validate the whole payload first so a rejected update leaves the
        // log untouched.
        let mut incoming: Vec<(Message, Option<FunctionCall>)> = Vec::new();

        if let Some(choices) = root.get("choices") {
            let Some(choices) = choices.as_array() else {
                return false;
            };
            for choice in choices {
                let Some(extracted) = choice.get("message").and_then(extract_message) else {
                    return false;
                };
                incoming.push(extracted);
            }
            if incoming.is_empty() {
                return false;
            }
        } else if let Some(message) = root.get("message") {
            let Some(extracted) = extract_message(message) else {
                return false;
            };
            incoming.push(extracted);
        } else if let Some(extracted) = extract_message(root) {
            incoming.push(extracted);
        } else {
            return false;
        }

        self.reset_stream_state();
        self.function_call = None;
        for (message, function_call) in incoming {
            self.messages.push(message);
            if let Some(function_call) = function_call {
                self.function_call = Some(function_call);
            }
        }
        self.erase_extra();
        true
    }

    /// Reassemble server-sent-event fragments into the log.
    ///
    /// The chunk is prefixed with any buffered incomplete tail, split on
    /// blank-line boundaries, and stripped of its `data: ` framing. Events
    /// that fail to decode are stashed for retry on the next call; this is
    /// deliberate tolerance for fragments split mid-line by the transport.
    /// The `data: [DONE]` sentinel finalizes the in-progress message and
    /// marks the returned delta as completed.
    ///
    /// Returns `None` when the chunk produced no event lines.
    pub fn append_stream_data(&mut self, chunk: &str) -> Option<StreamDelta> {
        let mut data = std::mem::take(&mut self.last_incomplete_buffer);
        data.push_str(chunk);

        let mut delta = StreamDelta::default();
        let mut produced = false;

        for event in data.split("\n\n") {
            let event = event.trim();
            if event.is_empty() {
                continue;
            }
            produced = true;

            let payload = event.strip_prefix(DATA_PREFIX).unwrap_or(event);
            if payload == DONE_SENTINEL {
                self.stream_pending = false;
                delta.completed = true;
                continue;
            }

            match serde_json::from_str::<StreamChunk>(payload) {
                Ok(parsed) => self.apply_stream_event(parsed, &mut delta),
                Err(_) => {
                    // Assume an incomplete fragment; retry once more data
                    // arrives. Bounded so a genuinely malformed event cannot
                    // stall the stream silently forever.
                    if payload.len() > MAX_INCOMPLETE_BUFFER {
                        warn!(
                            len = payload.len(),
                            "dropping oversized unparseable stream fragment"
                        );
                        self.last_incomplete_buffer.clear();
                    } else {
                        self.last_incomplete_buffer = payload.to_string();
                    }
                }
            }
        }

        produced.then_some(delta)
    }

    fn apply_stream_event(&mut self, chunk: StreamChunk, delta: &mut StreamDelta) {
        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };
        let event = choice.delta;

        if let Some(role) = event.role {
            if !self.stream_pending {
                self.messages.push(Message {
                    role,
                    content: Some(String::new()),
                    name: None,
                });
                self.stream_pending = true;
            }
        }

        if let Some(content) = event.content {
            if !self.stream_pending {
                // Role delta never arrived; assume an assistant message.
                self.messages
                    .push(Message::new(Role::Assistant, String::new()));
                self.stream_pending = true;
            }
            if let Some(message) = self.messages.last_mut() {
                message
                    .content
                    .get_or_insert_with(String::new)
                    .push_str(&content);
            }
            delta.content.push_str(&content);
            // Text output supersedes any function-call-in-progress.
            self.function_call = None;
        }

        if let Some(call) = event.function_call {
            if let Some(name) = call.name {
                // First occurrence wins.
                if self.function_call.is_none() {
                    self.function_call = Some(FunctionCall {
                        name,
                        arguments: String::new(),
                    });
                }
            }
            if let Some(arguments) = call.arguments {
                if let Some(record) = &mut self.function_call {
                    record.arguments.push_str(&arguments);
                }
            }
        }
    }

    /// Serialize the full log plus any attached catalog as one JSON
    /// document. Transient streaming state is not exported.
    pub fn export(&self) -> String {
        let mut doc = json!({ "messages": self.messages });
        if let Some(functions) = &self.functions {
            doc["functions"] = functions.to_json();
        }
        doc.to_string()
    }

    /// Rebuild the conversation from an exported document. Fails
    /// (`Ok(false)`, no mutation) if the `messages` key is absent; JSON
    /// parse failures propagate.
    pub fn import(&mut self, data: &str) -> Result<bool, serde_json::Error> {
        let root: Value = serde_json::from_str(data)?;
        let Some(messages) = root.get("messages") else {
            return Ok(false);
        };
        let messages: Vec<Message> = serde_json::from_value(messages.clone())?;
        self.messages = messages;
        self.functions = root.get("functions").and_then(Functions::from_json);
        self.function_call = None;
        self.last_incomplete_buffer.clear();
        self.stream_pending = false;
        Ok(true)
    }

    /// Attach a function catalog. Fails if the catalog is empty.
    #[must_use]
    pub fn set_functions(&mut self, functions: Functions) -> bool {
        if functions.is_empty() {
            return false;
        }
        self.functions = Some(functions);
        true
    }

    /// Detach any previously set catalog.
    pub fn pop_functions(&mut self) {
        self.functions = None;
    }

    pub fn has_functions(&self) -> bool {
        self.functions.is_some()
    }

    pub fn functions(&self) -> Option<&Functions> {
        self.functions.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Pretty JSON dump of the message log.
    pub fn raw(&self) -> String {
        serde_json::to_string_pretty(&json!({ "messages": self.messages }))
            .unwrap_or_default()
    }

    /// Cap the history length. Once exceeded, the oldest messages are
    /// removed; a leading system message is preserved.
    pub fn set_max_history_size(&mut self, size: usize) {
        self.max_history_size = Some(size);
        self.erase_extra();
    }

    fn erase_extra(&mut self) {
        let Some(max) = self.max_history_size else {
            return;
        };
        while self.messages.len() > max && self.messages.len() > 1 {
            let first_is_system = self
                .messages
                .first()
                .map(|m| m.role == Role::System)
                .unwrap_or(false);
            let victim = if first_is_system { 1 } else { 0 };
            self.messages.remove(victim);
        }
    }
}

/// Extract a log message (and any function-call record) from a message
/// object. The `content` key must be present, though it may be null;
/// a `function_call` object replaces the textual content entirely.
fn extract_message(value: &Value) -> Option<(Message, Option<FunctionCall>)> {
    let object = value.as_object()?;
    let role: Role = serde_json::from_value(object.get("role")?.clone()).ok()?;
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(call) = object.get("function_call") {
        let call_name = call.get("name")?.as_str()?.to_string();
        let arguments = match call.get("arguments") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        // No assistant text is available; the caller must invoke the
        // function externally and feed the result back in.
        let message = Message {
            role,
            content: Some(String::new()),
            name,
        };
        return Some((
            message,
            Some(FunctionCall {
                name: call_name,
                arguments,
            }),
        ));
    }

    let content = match object.get("content")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        _ => return None,
    };
    Some((
        Message {
            role,
            content,
            name,
        },
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_is_a_singleton() {
        let mut conversation = Conversation::new();
        assert!(conversation.set_system_data("You are helpful."));
        assert!(conversation.add_user_data("hi"));
        assert!(!conversation.set_system_data("You are terse."));
        assert_eq!(conversation.messages().len(), 2);
    }

    #[test]
    fn pop_system_only_when_first() {
        let mut conversation = Conversation::new();
        assert!(conversation.add_user_data("hi"));
        assert!(conversation.set_system_data("sys"));
        // System ended up second; pop must refuse.
        assert!(!conversation.pop_system_data());

        let mut conversation = Conversation::with_system("sys");
        assert!(conversation.pop_system_data());
        assert!(conversation.messages().is_empty());
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let mut conversation = Conversation::new();
        assert!(!conversation.set_system_data(""));
        assert!(!conversation.add_user_data(""));
        assert!(!conversation.add_user_data_as("", "fn"));
        assert!(!conversation.change_first_system_message(""));
    }

    #[test]
    fn update_batch_choices_shape() {
        let mut conversation = Conversation::new();
        assert!(conversation.add_user_data("What is 6*7?"));
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"42"}}]}"#;
        assert!(conversation.update(body).unwrap());
        assert_eq!(conversation.last_response(), Some("42"));
    }

    #[test]
    fn update_mid_and_low_level_shapes() {
        let mut conversation = Conversation::new();
        assert!(conversation
            .update(r#"{"message":{"role":"assistant","content":"mid"}}"#)
            .unwrap());
        assert_eq!(conversation.last_response(), Some("mid"));

        assert!(conversation
            .update(r#"{"role":"assistant","content":"low"}"#)
            .unwrap());
        assert_eq!(conversation.last_response(), Some("low"));
    }

    #[test]
    fn update_rejects_wrong_shape_without_mutation() {
        let mut conversation = Conversation::new();
        assert!(!conversation.update(r#"{"id":"x"}"#).unwrap());
        assert!(!conversation
            .update(r#"{"choices":[{"message":{"role":"assistant"}}]}"#)
            .unwrap());
        assert!(conversation.messages().is_empty());
    }

    #[test]
    fn update_propagates_parse_errors() {
        let mut conversation = Conversation::new();
        assert!(conversation.update("{ not json").is_err());
    }

    #[test]
    fn function_call_capture_and_clear() {
        let mut conversation = Conversation::new();
        let body = r#"{"choices":[{"message":{"role":"assistant","function_call":{"name":"f","arguments":"{}"}}}]}"#;
        assert!(conversation.update(body).unwrap());
        assert!(conversation.last_response_is_function_call());
        assert_eq!(conversation.last_function_call_name(), Some("f"));
        assert_eq!(conversation.last_function_call_arguments(), Some("{}"));
        assert_eq!(conversation.last_response(), Some(""));

        let body = r#"{"choices":[{"message":{"role":"assistant","content":"done"}}]}"#;
        assert!(conversation.update(body).unwrap());
        assert!(!conversation.last_response_is_function_call());
        assert_eq!(conversation.last_function_call_name(), None);
    }

    #[test]
    fn pop_respects_role_of_last_message() {
        let mut conversation = Conversation::new();
        assert!(conversation.add_user_data("q"));
        assert!(!conversation.pop_last_response());
        assert!(conversation
            .update(r#"{"role":"assistant","content":"a"}"#)
            .unwrap());
        assert!(!conversation.pop_user_data());
        assert!(conversation.pop_last_response());
        assert!(conversation.pop_user_data());
        assert!(!conversation.pop_user_data());
    }

    #[test]
    fn streaming_three_chunk_protocol() {
        let mut conversation = Conversation::new();
        let first = conversation
            .append_stream_data("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n")
            .unwrap();
        assert_eq!(first.content, "");
        assert!(!first.completed);

        let second = conversation
            .append_stream_data("data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n")
            .unwrap();
        assert_eq!(second.content, "Hi");
        assert!(!second.completed);

        let last = conversation.append_stream_data("data: [DONE]\n\n").unwrap();
        assert!(last.completed);

        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.messages()[0].role, Role::Assistant);
        assert_eq!(conversation.last_response(), Some("Hi"));
    }

    #[test]
    fn streaming_survives_arbitrary_split_points() {
        let full = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"Hello, world\"}}]}\n\ndata: [DONE]\n\n";

        let mut whole = Conversation::new();
        let _ = whole.append_stream_data(full);

        for split_at in 1..full.len() {
            let mut split = Conversation::new();
            let _ = split.append_stream_data(&full[..split_at]);
            let _ = split.append_stream_data(&full[split_at..]);
            assert_eq!(
                split.messages(),
                whole.messages(),
                "divergence at byte {split_at}"
            );
        }
    }

    #[test]
    fn streaming_function_call_accumulates_arguments() {
        let mut conversation = Conversation::new();
        let _ = conversation.append_stream_data(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"function_call\":{\"name\":\"f\",\"arguments\":\"\"}}}]}\n\n",
        );
        let _ = conversation.append_stream_data(
            "data: {\"choices\":[{\"delta\":{\"function_call\":{\"arguments\":\"{\\\"city\\\":\"}}}]}\n\n",
        );
        let _ = conversation.append_stream_data(
            "data: {\"choices\":[{\"delta\":{\"function_call\":{\"arguments\":\"\\\"Oslo\\\"}\"}}}]}\n\n",
        );
        let done = conversation.append_stream_data("data: [DONE]\n\n").unwrap();
        assert!(done.completed);
        assert!(conversation.last_response_is_function_call());
        assert_eq!(conversation.last_function_call_name(), Some("f"));
        assert_eq!(
            conversation.last_function_call_arguments(),
            Some("{\"city\":\"Oslo\"}")
        );
    }

    #[test]
    fn abandoned_stream_does_not_leak_into_next_turn() {
        let mut conversation = Conversation::new();
        // Role and partial content arrive, then the caller drops the stream
        // without ever seeing [DONE].
        let _ = conversation.append_stream_data(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"one\"}}]}\n\n",
        );
        assert!(conversation.add_user_data("next question"));

        let _ = conversation.append_stream_data(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"two\"}}]}\n\ndata: [DONE]\n\n",
        );

        assert_eq!(conversation.messages().len(), 3);
        assert_eq!(
            conversation.messages()[1].content.as_deref(),
            Some("next question")
        );
        assert_eq!(conversation.last_response(), Some("two"));
    }

    #[test]
    fn abandoned_incomplete_buffer_is_discarded_on_next_turn() {
        let mut conversation = Conversation::new();
        // Fragment split mid-event, then the stream is abandoned.
        let _ = conversation.append_stream_data("data: {\"choices\":[{\"delta\"");
        assert!(conversation.add_user_data("again"));

        let delta = conversation
            .append_stream_data("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"fresh\"}}]}\n\ndata: [DONE]\n\n")
            .unwrap();
        assert!(delta.completed);
        assert_eq!(conversation.last_response(), Some("fresh"));
    }

    #[test]
    fn first_system_message_can_be_rewritten_in_place() {
        let mut conversation = Conversation::with_system("strict");
        assert!(conversation.add_user_data("hi"));
        assert!(conversation.change_first_system_message("lenient"));
        assert_eq!(
            conversation.messages()[0].content.as_deref(),
            Some("lenient")
        );
        assert_eq!(conversation.messages()[0].role, Role::System);

        let mut no_system = Conversation::new();
        assert!(no_system.add_user_data("hi"));
        assert!(!no_system.change_first_system_message("lenient"));
    }

    #[test]
    fn user_only_constructor_seeds_turns_in_order() {
        let conversation = Conversation::with_user(["first", "second"]);
        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(conversation.messages()[0].role, Role::User);
        assert_eq!(conversation.messages()[0].content.as_deref(), Some("first"));
        assert_eq!(
            conversation.messages()[1].content.as_deref(),
            Some("second")
        );
    }

    #[test]
    fn whitespace_only_chunk_produces_nothing() {
        let mut conversation = Conversation::new();
        assert!(conversation.append_stream_data("\n\n").is_none());
    }

    #[test]
    fn export_import_round_trip() {
        let mut functions = Functions::new();
        assert!(functions.add_function("f"));
        assert!(functions.set_description("f", "does things"));

        let mut conversation = Conversation::with_system("sys");
        assert!(conversation.add_user_data("hello"));
        assert!(conversation
            .update(r#"{"role":"assistant","content":"hi there"}"#)
            .unwrap());
        assert!(conversation.set_functions(functions));

        let exported = conversation.export();
        let mut rebuilt = Conversation::new();
        assert!(rebuilt.import(&exported).unwrap());
        assert_eq!(rebuilt.messages(), conversation.messages());
        assert_eq!(rebuilt.functions(), conversation.functions());
    }

    #[test]
    fn import_requires_messages_key() {
        let mut conversation = Conversation::new();
        assert!(!conversation.import(r#"{"functions":[]}"#).unwrap());
        assert!(conversation.import("not json at all").is_err());
    }

    #[test]
    fn history_cap_preserves_leading_system_message() {
        let mut conversation = Conversation::with_system("sys");
        conversation.set_max_history_size(3);
        for turn in ["a", "b", "c", "d"] {
            assert!(conversation.add_user_data(turn));
        }
        assert_eq!(conversation.messages().len(), 3);
        assert_eq!(conversation.messages()[0].role, Role::System);
        assert_eq!(conversation.messages()[1].content.as_deref(), Some("c"));
        assert_eq!(conversation.messages()[2].content.as_deref(), Some("d"));
    }
}
