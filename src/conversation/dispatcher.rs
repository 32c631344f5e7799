//! Per-update transition: classify the message, run the right handler under
//! a timeout, move the chat between idle and awaiting-input, deliver the
//! reply.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::commands::Command;
use super::handlers::{Handlers, Reply, StepOutcome};
use super::state::{ChatState, Step};
use super::texts;
use crate::error::{BotError, Result};
use crate::normalize::normalize_handle;
use crate::transport::{
    ChatTransport, DocumentSource, InboundMessage, OutboundContent, OutboundMessage, SentMessage,
};

/// Drives one chat's state machine for each inbound message.
pub struct Dispatcher {
    handlers: Handlers,
    transport: Arc<dyn ChatTransport>,
    handler_timeout: Duration,
    send_retries: u32,
}

impl Dispatcher {
    pub fn new(
        handlers: Handlers,
        transport: Arc<dyn ChatTransport>,
        handler_timeout: Duration,
        send_retries: u32,
    ) -> Self {
        Self {
            handlers,
            transport,
            handler_timeout,
            send_retries,
        }
    }

    /// Process one inbound message for the chat owning `state`.
    ///
    /// Only delivery failures surface as errors; handler failures become an
    /// apology reply.
    pub async fn handle(&self, state: &mut ChatState, message: InboundMessage) -> Result<()> {
        state.sender_handle = message
            .sender_handle
            .as_deref()
            .map(normalize_handle)
            .unwrap_or_default();
        if let Some(document) = &message.document
            && let Some(name) = &document.file_name
        {
            state
                .file_ids
                .insert(name.clone(), document.file_id.clone());
        }

        let reply = self.transition(state, &message).await;
        self.deliver(state, reply).await
    }

    /// Apply the message to `state` and produce the reply.
    pub async fn transition(&self, state: &mut ChatState, message: &InboundMessage) -> Reply {
        let chat_id = state.chat_id;

        if let Some(name) = message.command.as_deref() {
            state.step = Step::Idle;
            let Some(command) = Command::from_name(name) else {
                debug!(chat_id, command = name, "unknown command");
                return Reply::text(texts::UNKNOWN);
            };
            debug!(chat_id, %command, "command invoked");

            let args = message.command_args();
            let outcome = self
                .guarded(self.handlers.invoke(command, args, state))
                .await;
            return match outcome {
                Ok(StepOutcome::Pending(reply)) => {
                    if command.expects_follow_up() {
                        state.step = Step::AwaitingInput(command);
                    }
                    reply
                }
                Ok(StepOutcome::Done(reply)) => reply,
                Err(err) => apology(chat_id, command, &err),
            };
        }

        let Step::AwaitingInput(command) = state.step else {
            return Reply::text(texts::UNKNOWN);
        };
        let outcome = self
            .guarded(self.handlers.follow_up(command, &message.text, state))
            .await;
        match outcome {
            Ok(StepOutcome::Pending(reply)) => {
                debug!(chat_id, %command, "follow-up rejected; still waiting");
                reply
            }
            Ok(StepOutcome::Done(reply)) => {
                state.step = Step::Idle;
                reply
            }
            Err(err) => {
                state.step = Step::Idle;
                apology(chat_id, command, &err)
            }
        }
    }

    async fn guarded<F>(&self, step: F) -> Result<StepOutcome>
    where
        F: Future<Output = Result<StepOutcome>>,
    {
        tokio::time::timeout(self.handler_timeout, step)
            .await
            .map_err(|_| BotError::Timeout(self.handler_timeout))?
    }

    async fn deliver(&self, state: &mut ChatState, reply: Reply) -> Result<()> {
        let (content, document_name) = match reply {
            Reply::Text(text) => (OutboundContent::Text(text), None),
            Reply::Document {
                file_name,
                url,
                caption,
            } => {
                let source = match state.file_ids.get(&file_name) {
                    Some(file_id) => DocumentSource::FileId(file_id.clone()),
                    None => DocumentSource::Url(url),
                };
                let content = OutboundContent::Document {
                    file_name: file_name.clone(),
                    source,
                    caption,
                };
                (content, Some(file_name))
            }
        };

        let message = OutboundMessage {
            chat_id: state.chat_id,
            content,
        };
        let transport = self.transport.as_ref();
        let sent =
            send_with_retries(transport, message, self.send_retries, self.handler_timeout).await?;

        if let (Some(name), Some(file_id)) = (document_name, sent.document_file_id) {
            debug!(chat_id = state.chat_id, file = %name, "document file id cached");
            state.file_ids.insert(name, file_id);
        }
        Ok(())
    }
}

fn apology(chat_id: i64, command: Command, err: &BotError) -> Reply {
    error!(chat_id, %command, error = %err, "handler failed");
    Reply::text(texts::APOLOGY)
}

/// Send `message`, retrying immediately up to `attempts` times in total.
/// An attempt still pending after `attempt_timeout` counts as failed.
pub async fn send_with_retries(
    transport: &dyn ChatTransport,
    message: OutboundMessage,
    attempts: u32,
    attempt_timeout: Duration,
) -> Result<SentMessage> {
    let attempts = attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        let sending = transport.send(message.clone());
        let outcome = match tokio::time::timeout(attempt_timeout, sending).await {
            Ok(outcome) => outcome,
            Err(_) => Err(anyhow::anyhow!("no answer within {attempt_timeout:?}")),
        };
        match outcome {
            Ok(sent) => return Ok(sent),
            Err(err) => {
                warn!(
                    chat_id = message.chat_id,
                    transport = transport.id(),
                    attempt,
                    attempts,
                    error = %err,
                    "failed to send a message"
                );
                last_error = Some(err);
            }
        }
    }
    Err(BotError::Transport(format!(
        "sending to chat {} failed after {attempts} attempts: {:#}",
        message.chat_id,
        last_error.unwrap_or_else(|| anyhow::anyhow!("no attempt made"))
    )))
}
