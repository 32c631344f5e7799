//! Chat transport boundary and the Telegram Bot API adapter.

pub mod memory;
pub mod telegram;
pub mod traits;

pub use memory::RecordingTransport;
pub use telegram::TelegramAdapter;
pub use traits::{
    ChatTransport, CommandInfo, DocumentSource, InboundDocument, InboundMessage, OutboundContent,
    OutboundMessage, SentMessage,
};
