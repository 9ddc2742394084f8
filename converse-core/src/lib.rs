//! converse-core: a client library for OpenAI-style chat completion APIs
//!
//! The crate is organized around three concerns:
//!
//! - [`config`]: explicit [`Auth`](config::Auth) credentials, proxy
//!   configuration and timeouts, with secrets redacted from logs.
//! - [`http`]: one-shot request sessions, the response/error classifier,
//!   and streaming multipart uploads.
//! - [`chat`]: the stateful [`Conversation`](chat::Conversation) log with
//!   server-sent-event stream reassembly, the [`Functions`](chat::Functions)
//!   catalog, and the completions endpoint façade.
//!
//! # Example
//!
//! ```no_run
//! use converse_core::chat::{ChatCompletion, ChatParams, Conversation};
//! use converse_core::config::Auth;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let auth = Auth::from_env("OPENAI_API_KEY")?;
//! let chat = ChatCompletion::default();
//!
//! let mut conversation = Conversation::with_system("You are terse.");
//! assert!(conversation.add_user_data("What is the capital of Norway?"));
//!
//! let params = ChatParams::new("gpt-4").with_temperature(0.2);
//! let response = chat.create(&auth, &params, &conversation).await?;
//! if conversation.update_from(&response)? {
//!     println!("{}", conversation.last_response().unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod http;

pub use chat::{ChatCompletion, ChatParams, Conversation, Functions};
pub use config::Auth;
pub use http::{Error, Response, Result};

/// Crate version, taken from the build manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runtime accessor for [`VERSION`].
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_manifest() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }
}
