//! Multi-turn chat: conversation log, function catalog and the
//! completions endpoint.
//!
//! The [`Conversation`] owns the replayable message log and all streaming
//! reassembly state; [`Functions`] describes callable tools in the wire
//! schema; [`ChatCompletion`] performs the actual endpoint calls.

mod client;
mod conversation;
mod functions;
mod types;

pub use client::{ChatCompletion, ChatParams, DEFAULT_API_ROOT};
pub use conversation::Conversation;
pub use functions::{FunctionParameter, Functions};
pub use types::{FunctionCall, Message, Role, StreamDelta};
