//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, AccumulatedMessage, ChatClient, ChatClientConfig, ChatError, ChatMessage,
    Conversation, ExchangeEvent, ExchangeOutcome, ExchangeStream, MarkdownRenderer,
    MessageObserver, PulldownMarkdownRenderer, Role, SessionStore, StreamFailure,
};
