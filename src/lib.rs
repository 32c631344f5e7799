//! Postbot: a Telegram bot for postcard address exchange.
//!
//! Participants register a postal address, wishes and an alternate handle;
//! approved participants can ask for someone else's address, either a
//! random one or by search.
//!
//! # Architecture
//!
//! - **Directory**: SQLite store of address records, mirrored to a Google
//!   spreadsheet on every write
//! - **Sync**: periodic spreadsheet → store → cache reconciliation
//! - **Cache**: in-memory snapshot of live records for random picks
//! - **Conversation**: per-chat state machine driven by bot commands
//! - **Transport**: Telegram Bot API long polling

pub mod cache;
pub mod config;
pub mod conversation;
pub mod directory;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod runtime;
pub mod sheets;
pub mod sync;
pub mod transport;

pub use config::BotConfig;
pub use error::{BotError, Result};
pub use runtime::Runtime;
