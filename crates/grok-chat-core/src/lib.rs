//! Streaming chat-completions core for Grok-style APIs.
//!
//! The interesting part is the incremental assembler: bytes from an HTTP
//! body are framed into lines ([`stream::LineReader`]), each line is
//! classified ([`stream::interpret`]), and the fragments are folded into an
//! [`AccumulatedMessage`]. Every failure after the stream opens ends up as
//! an annotation on a finalized message, never as a lost reply.
//!
//! # Streaming a reply
//!
//! ```no_run
//! use grok_chat_core::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let client = ChatClient::from_env()?;
//! let mut conversation = Conversation::new("demo");
//! conversation.push(ChatMessage::user("Say hello"));
//!
//! let mut exchange = client.start_exchange(conversation.request_messages()).await?;
//! while let Some(event) = exchange.next_event().await {
//!     if let ExchangeEvent::Updated { content, .. } = event {
//!         println!("{content}");
//!     }
//! }
//! let outcome = exchange.finish().await?;
//! conversation.push(ChatMessage::assistant(outcome.message.content()));
//! # Ok(())
//! # }
//! ```
//!
//! # Driving a body directly
//!
//! ```
//! use grok_chat_core::StreamAssembler;
//!
//! let mut assembler = StreamAssembler::new();
//! assembler.push_chunk(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n");
//! let message = assembler.close();
//! assert_eq!(message.content(), "Hi");
//! assert!(message.is_finished());
//! ```

/// Message state and the per-exchange state machine.
pub mod accumulator;
/// HTTP client and the transport seam.
pub mod client;
/// Client configuration.
pub mod config;
/// Public error types.
pub mod errors;
/// Async exchange driver, observer hooks and the channel-backed stream.
pub mod exchange;
/// Logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Markdown rendering for display.
pub mod render;
/// Multi-conversation store.
pub mod sessions;
/// Line framing and frame classification.
pub mod stream;
/// Conversation history and import/export.
pub mod transcript;

pub use accumulator::{AccumulatedMessage, ExchangeState, StreamAssembler};
pub use client::{ByteStream, ChatClient, ChatRequest, ChatTransport, start_exchange};
pub use config::ChatClientConfig;
pub use errors::{ChatError, StreamFailure, TranscriptError};
pub use exchange::{
    AbortHandle, ExchangeEvent, ExchangeOutcome, ExchangeStream, MessageObserver, drive_exchange,
};
pub use render::{MarkdownRenderer, PulldownMarkdownRenderer};
pub use sessions::SessionStore;
pub use stream::{LineReader, ProtocolEvent};
pub use transcript::{ChatMessage, Conversation, Imported, RequestMessage, Role};
