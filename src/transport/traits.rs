use async_trait::async_trait;
use tokio::sync::mpsc;

/// Document attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDocument {
    pub file_id: String,
    pub file_name: Option<String>,
}

/// Message received from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: i64,
    /// Sender's username, if the account has one.
    pub sender_handle: Option<String>,
    /// Full message text (or caption), command included.
    pub text: String,
    /// Command name without `/` or `@botname`, when the text is a command.
    pub command: Option<String>,
    pub document: Option<InboundDocument>,
}

impl InboundMessage {
    /// Plain text message with no command.
    pub fn text(chat_id: i64, sender_handle: &str, text: &str) -> Self {
        Self {
            chat_id,
            sender_handle: Some(sender_handle.to_owned()),
            text: text.to_owned(),
            command: None,
            document: None,
        }
    }

    /// Command message; `text` is what the user typed, e.g. `/add_name Иван`.
    pub fn command(chat_id: i64, sender_handle: &str, text: &str) -> Self {
        let name = text
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_start_matches('/');
        let name = name.split('@').next().unwrap_or(name).to_owned();
        Self {
            command: Some(name),
            ..Self::text(chat_id, sender_handle, text)
        }
    }

    /// Text after the command token, trimmed.
    pub fn command_args(&self) -> &str {
        if self.command.is_none() {
            return "";
        }
        let text = self.text.trim_start();
        match text.find(char::is_whitespace) {
            Some(idx) => text[idx..].trim(),
            None => "",
        }
    }
}

/// Where a document reply comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// Fetched by the transport from a URL.
    Url(String),
    /// Previously uploaded file, re-sent without transfer.
    FileId(String),
}

/// Reply payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundContent {
    Text(String),
    Document {
        file_name: String,
        source: DocumentSource,
        caption: String,
    },
}

/// Outbound message sent back to a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub content: OutboundContent,
}

/// What the transport reports about a delivered message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: Option<i64>,
    /// File id assigned to a sent document.
    pub document_file_id: Option<String>,
}

/// Entry of the transport's command menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
}

/// Chat transport contract.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Stable transport identifier (e.g. `telegram`).
    fn id(&self) -> &'static str;

    /// Deliver one reply.
    async fn send(&self, message: OutboundMessage) -> anyhow::Result<SentMessage>;

    /// Receive inbound messages and forward them until the connection fails.
    async fn run(&self, inbound_tx: mpsc::Sender<InboundMessage>) -> anyhow::Result<()>;

    /// Register the command menu.
    async fn set_commands(&self, commands: &[CommandInfo]) -> anyhow::Result<()>;

    /// Best-effort liveness check.
    async fn health_check(&self) -> anyhow::Result<bool>;
}
