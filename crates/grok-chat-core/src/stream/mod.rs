//! Wire-level decoding of a chat-completions event stream.
//!
//! [`LineReader`] turns arbitrary byte chunks into lines; [`interpret`]
//! turns one line into a [`ProtocolEvent`]. Neither keeps message state.

mod event;
mod reader;

pub use event::{DATA_PREFIX, DONE_SENTINEL, ProtocolEvent, interpret};
pub use reader::LineReader;

pub(crate) use event::describe_error;
