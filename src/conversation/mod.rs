//! Conversation state machine.
//!
//! A chat is either idle or awaiting the single free-text follow-up of a
//! command it just invoked. [`ChatRouter`] serializes updates per chat,
//! [`Dispatcher`] applies one update, [`Handlers`] implement the commands.

pub mod commands;
pub mod dispatcher;
pub mod handlers;
pub mod router;
pub mod state;
pub mod texts;

pub use commands::Command;
pub use dispatcher::{Dispatcher, send_with_retries};
pub use handlers::{Handlers, Reply, StepOutcome};
pub use router::ChatRouter;
pub use state::{ChatState, ConversationSnapshot, ConversationStore, SharedChatState, Step};
