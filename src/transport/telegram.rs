use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::traits::{
    ChatTransport, CommandInfo, DocumentSource, InboundDocument, InboundMessage, OutboundContent,
    OutboundMessage, SentMessage,
};
use crate::config::TelegramConfig;
use crate::error::{BotError, Result};

/// Extra time allowed on top of the long-poll timeout before the HTTP
/// request itself is abandoned.
const POLL_GRACE_SECS: u64 = 10;

/// Telegram Bot API adapter using long polling.
pub struct TelegramAdapter {
    bot_token: String,
    api_base_url: String,
    poll_timeout_secs: u64,
    offset: AtomicI64,
    client: reqwest::Client,
}

impl TelegramAdapter {
    /// Build the adapter. Every request is bounded by
    /// `request_timeout_secs` except `getUpdates`, which waits for the long
    /// poll plus a grace period.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BotError::Transport(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            bot_token: config.bot_token.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            poll_timeout_secs: config.poll_timeout_secs,
            offset: AtomicI64::new(0),
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base_url, self.bot_token)
    }

    /// Call a Bot API method and return its `result`.
    async fn call(
        &self,
        method: &str,
        body: Value,
        timeout: Option<Duration>,
    ) -> anyhow::Result<Value> {
        let mut request = self.client.post(self.method_url(method)).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);

        let ok = payload.get("ok").and_then(Value::as_bool).unwrap_or(false);
        if !status.is_success() || !ok {
            let description = payload
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            anyhow::bail!("telegram {method} failed ({status}): {description}");
        }
        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    /// One `getUpdates` round. Returns the number of messages forwarded.
    pub async fn poll_once(
        &self,
        inbound_tx: &mpsc::Sender<InboundMessage>,
    ) -> anyhow::Result<usize> {
        let body = json!({
            "offset": self.offset.load(Ordering::SeqCst),
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message"],
        });
        let timeout = Duration::from_secs(self.poll_timeout_secs + POLL_GRACE_SECS);
        let result = self.call("getUpdates", body, Some(timeout)).await?;

        let mut forwarded = 0;
        for update in result.as_array().map(Vec::as_slice).unwrap_or_default() {
            if let Some(id) = update.get("update_id").and_then(Value::as_i64) {
                self.offset.fetch_max(id + 1, Ordering::SeqCst);
            }
            let Some(message) = parse_update(update) else {
                continue;
            };
            if inbound_tx.send(message).await.is_err() {
                anyhow::bail!("telegram inbound channel closed");
            }
            forwarded += 1;
        }
        Ok(forwarded)
    }
}

/// Decode one update into an inbound message; `None` for anything that is
/// not a user message.
pub fn parse_update(update: &Value) -> Option<InboundMessage> {
    let message = update.get("message")?;
    let chat_id = message.get("chat")?.get("id")?.as_i64()?;

    let from = message.get("from");
    if from
        .and_then(|f| f.get("is_bot"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return None;
    }
    let sender_handle = from
        .and_then(|f| f.get("username"))
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .map(str::to_owned);

    let (text, entities) = match message.get("text").and_then(Value::as_str) {
        Some(text) => (text, message.get("entities")),
        None => (
            message
                .get("caption")
                .and_then(Value::as_str)
                .unwrap_or_default(),
            message.get("caption_entities"),
        ),
    };

    let document = message.get("document").and_then(|doc| {
        Some(InboundDocument {
            file_id: doc.get("file_id")?.as_str()?.to_owned(),
            file_name: doc
                .get("file_name")
                .and_then(Value::as_str)
                .map(str::to_owned),
        })
    });

    Some(InboundMessage {
        chat_id,
        sender_handle,
        text: text.to_owned(),
        command: leading_command(text, entities),
        document,
    })
}

/// Command name from a `bot_command` entity at offset 0.
///
/// Entity offsets and lengths count UTF-16 code units.
fn leading_command(text: &str, entities: Option<&Value>) -> Option<String> {
    let entity = entities?.as_array()?.iter().find(|e| {
        e.get("type").and_then(Value::as_str) == Some("bot_command")
            && e.get("offset").and_then(Value::as_u64) == Some(0)
    })?;
    let length = usize::try_from(entity.get("length")?.as_u64()?).ok()?;

    let units: Vec<u16> = text.encode_utf16().take(length).collect();
    let raw = String::from_utf16(&units).ok()?;
    let name = raw.trim_start_matches('/');
    let name = name.split('@').next().unwrap_or(name);
    (!name.is_empty()).then(|| name.to_owned())
}

fn sent_from_result(result: &Value) -> SentMessage {
    SentMessage {
        message_id: result.get("message_id").and_then(Value::as_i64),
        document_file_id: result
            .get("document")
            .and_then(|d| d.get("file_id"))
            .and_then(Value::as_str)
            .map(str::to_owned),
    }
}

#[async_trait]
impl ChatTransport for TelegramAdapter {
    fn id(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, message: OutboundMessage) -> anyhow::Result<SentMessage> {
        let result = match message.content {
            OutboundContent::Text(text) => {
                let body = json!({
                    "chat_id": message.chat_id,
                    "text": text,
                });
                self.call("sendMessage", body, None).await?
            }
            OutboundContent::Document {
                source, caption, ..
            } => {
                let document = match source {
                    DocumentSource::Url(url) => url,
                    DocumentSource::FileId(file_id) => file_id,
                };
                let body = json!({
                    "chat_id": message.chat_id,
                    "document": document,
                    "caption": caption,
                });
                self.call("sendDocument", body, None).await?
            }
        };
        Ok(sent_from_result(&result))
    }

    async fn run(&self, inbound_tx: mpsc::Sender<InboundMessage>) -> anyhow::Result<()> {
        if self.bot_token.trim().is_empty() {
            anyhow::bail!("telegram bot token is empty");
        }
        info!("telegram long polling started");
        loop {
            let forwarded = self.poll_once(&inbound_tx).await?;
            if forwarded > 0 {
                debug!(forwarded, "telegram updates received");
            }
        }
    }

    async fn set_commands(&self, commands: &[CommandInfo]) -> anyhow::Result<()> {
        let commands: Vec<Value> = commands
            .iter()
            .map(|c| json!({"command": c.name, "description": c.description}))
            .collect();
        self.call("setMyCommands", json!({ "commands": commands }), None)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> anyhow::Result<bool> {
        if self.bot_token.trim().is_empty() {
            return Ok(false);
        }
        Ok(self.call("getMe", json!({}), None).await.is_ok())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn parses_command_with_bot_suffix() {
        let update = json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "chat": {"id": 42, "type": "private"},
                "from": {"id": 7, "is_bot": false, "username": "Ivan"},
                "text": "/give_me_some@post_bot maria",
                "entities": [{"type": "bot_command", "offset": 0, "length": 22}]
            }
        });
        let msg = parse_update(&update).unwrap();
        assert_eq!(msg.chat_id, 42);
        assert_eq!(msg.sender_handle.as_deref(), Some("Ivan"));
        assert_eq!(msg.command.as_deref(), Some("give_me_some"));
        assert_eq!(msg.command_args(), "maria");
    }

    #[test]
    fn plain_text_has_no_command() {
        let update = json!({
            "update_id": 11,
            "message": {
                "chat": {"id": 42},
                "from": {"id": 7, "is_bot": false},
                "text": "Москва, ул. Ленина /not_a_command"
            }
        });
        let msg = parse_update(&update).unwrap();
        assert_eq!(msg.command, None);
        assert_eq!(msg.sender_handle, None);
    }

    #[test]
    fn command_length_counts_utf16_units() {
        let entities = json!([{"type": "bot_command", "offset": 0, "length": 6}]);
        assert_eq!(
            leading_command("/start 😀", Some(&entities)).as_deref(),
            Some("start")
        );
        let later = json!([{"type": "bot_command", "offset": 3, "length": 6}]);
        assert_eq!(leading_command("hi /start", Some(&later)), None);
    }

    #[test]
    fn document_caption_is_text() {
        let update = json!({
            "update_id": 12,
            "message": {
                "chat": {"id": 1},
                "from": {"id": 7, "is_bot": false, "username": "ivan"},
                "caption": "my card",
                "document": {"file_id": "F1", "file_name": "card.pdf"}
            }
        });
        let msg = parse_update(&update).unwrap();
        assert_eq!(msg.text, "my card");
        let doc = msg.document.unwrap();
        assert_eq!(doc.file_id, "F1");
        assert_eq!(doc.file_name.as_deref(), Some("card.pdf"));
    }

    #[test]
    fn bots_and_non_messages_are_ignored() {
        let edited = json!({"update_id": 1, "edited_message": {}});
        assert!(parse_update(&edited).is_none());
        let from_bot = json!({
            "update_id": 2,
            "message": {"chat": {"id": 1}, "from": {"is_bot": true}, "text": "hi"}
        });
        assert!(parse_update(&from_bot).is_none());
    }

    #[test]
    fn sent_document_exposes_file_id() {
        let result = json!({"message_id": 5, "document": {"file_id": "ABC"}});
        let sent = sent_from_result(&result);
        assert_eq!(sent.message_id, Some(5));
        assert_eq!(sent.document_file_id.as_deref(), Some("ABC"));
    }
}
