//! Error types for the address bot.

/// Top-level error type for the bot.
///
/// Absence of data is never an error here: lookups return empty records and
/// searches return empty vectors. Only I/O and integrity problems surface.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Relational directory store error.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// More than one live record for one normalized handle.
    #[error("integrity violation: {count} live records for handle `{handle}`")]
    Integrity {
        /// Normalized handle with duplicates.
        handle: String,
        /// Number of live records found.
        count: usize,
    },

    /// Record cannot be stored (e.g. its handle normalizes to nothing).
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Spreadsheet API or sheet-content error.
    #[error("spreadsheet error: {0}")]
    Sheets(String),

    /// Chat transport error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Random pick requested before the cache holds any record.
    #[error("directory cache is empty")]
    EmptyCache,

    /// An operation exceeded its time budget.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Conversation state could not be loaded or persisted.
    #[error("conversation state error: {0}")]
    State(String),

    /// A lock was poisoned by a panicking holder.
    #[error("lock poisoned: {0}")]
    Lock(String),

    /// Background task failed to complete.
    #[error("task error: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BotError>;
