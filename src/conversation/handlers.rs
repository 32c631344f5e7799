//! Step handlers: the first turn of every command and the follow-up turn of
//! two-turn commands.
//!
//! Handlers never see raw errors from the user's point of view: they either
//! return a reply or an error that the dispatcher turns into an apology.

use tracing::debug;

use super::commands::Command;
use super::state::ChatState;
use super::texts;
use crate::directory::{AddressRecord, Directory, FieldUpdate};
use crate::error::{BotError, Result};
use crate::normalize::{normalize_address_text, normalize_secondary_handle};

/// Shortest address accepted, in characters.
pub const MIN_ADDRESS_CHARS: usize = 10;

/// Reply produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// Document sent by URL unless the chat already has a file id for it.
    Document {
        file_name: String,
        url: String,
        caption: String,
    },
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Result of one handler turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Exchange complete; the chat returns to idle.
    Done(Reply),
    /// The chat keeps (or starts) waiting for input for this command.
    Pending(Reply),
}

impl StepOutcome {
    pub fn reply(&self) -> &Reply {
        match self {
            Self::Done(reply) | Self::Pending(reply) => reply,
        }
    }
}

fn done(text: impl Into<String>) -> StepOutcome {
    StepOutcome::Done(Reply::text(text))
}

fn pending(text: impl Into<String>) -> StepOutcome {
    StepOutcome::Pending(Reply::text(text))
}

/// Command handlers over the directory service.
#[derive(Clone)]
pub struct Handlers {
    directory: Directory,
    help_document_url: Option<String>,
}

impl Handlers {
    pub fn new(directory: Directory, help_document_url: Option<String>) -> Self {
        Self {
            directory,
            help_document_url: help_document_url.filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// First turn. Non-empty `args` are processed as the follow-up right away.
    pub async fn invoke(
        &self,
        command: Command,
        args: &str,
        state: &mut ChatState,
    ) -> Result<StepOutcome> {
        if command.needs_handle() && state.sender_handle.is_empty() {
            return Ok(done(texts::NO_USERNAME));
        }
        let args = args.trim();

        match command {
            Command::Help => Ok(StepOutcome::Done(self.help_reply())),
            Command::Start => Ok(done(texts::HELP)),
            Command::MyData => self.my_data(state).await,
            Command::GiveAddress => {
                if let Some(refusal) = self.give_gate(state).await? {
                    return Ok(StepOutcome::Done(refusal));
                }
                if args.is_empty() {
                    Ok(pending(texts::GIVE_PROMPT))
                } else {
                    self.give(args, state).await
                }
            }
            Command::AddAddress
            | Command::AddSecondaryHandle
            | Command::AddWishes
            | Command::AddName => {
                if args.is_empty() {
                    Ok(pending(prompt_for(command)))
                } else {
                    self.submit(command, args, state).await
                }
            }
        }
    }

    /// Second turn of a pending command.
    pub async fn follow_up(
        &self,
        command: Command,
        text: &str,
        state: &mut ChatState,
    ) -> Result<StepOutcome> {
        if command.needs_handle() && state.sender_handle.is_empty() {
            return Ok(done(texts::NO_USERNAME));
        }
        let text = text.trim();

        match command {
            Command::GiveAddress => {
                if let Some(refusal) = self.give_gate(state).await? {
                    return Ok(StepOutcome::Done(refusal));
                }
                if text.is_empty() {
                    return Ok(pending(texts::EMPTY_TEXT));
                }
                self.give(text, state).await
            }
            Command::AddAddress
            | Command::AddSecondaryHandle
            | Command::AddWishes
            | Command::AddName => self.submit(command, text, state).await,
            Command::Help | Command::Start | Command::MyData => Ok(done(texts::UNKNOWN)),
        }
    }

    fn help_reply(&self) -> Reply {
        match &self.help_document_url {
            Some(url) => Reply::Document {
                file_name: texts::HELP_DOCUMENT_NAME.to_owned(),
                url: url.clone(),
                caption: texts::HELP.to_owned(),
            },
            None => Reply::text(texts::HELP),
        }
    }

    /// Refusal when the sender may not receive addresses yet.
    async fn give_gate(&self, state: &ChatState) -> Result<Option<Reply>> {
        let own = self.directory.record_for(&state.sender_handle).await?;
        if !own.has_address() {
            return Ok(Some(Reply::text(texts::NO_ADDRESS)));
        }
        if !own.approved {
            return Ok(Some(Reply::text(texts::NOT_APPROVED)));
        }
        Ok(None)
    }

    async fn give(&self, query: &str, state: &mut ChatState) -> Result<StepOutcome> {
        if is_random_request(query) {
            return match self.directory.pick_random() {
                Ok(record) => {
                    state.given_addresses += 1;
                    Ok(done(format!("{}{}", texts::RANDOM_PREFIX, record.render())))
                }
                Err(BotError::EmptyCache) => Ok(done(texts::DIRECTORY_EMPTY)),
                Err(err) => Err(err),
            };
        }

        let hits = self.directory.search(query).await?;
        state.given_addresses += hits.len() as u64;
        debug!(
            chat_id = state.chat_id,
            query,
            hits = hits.len(),
            "address search"
        );
        Ok(done(format_hits(&hits)))
    }

    async fn submit(&self, command: Command, text: &str, state: &ChatState) -> Result<StepOutcome> {
        if text.is_empty() {
            return Ok(pending(texts::EMPTY_TEXT));
        }

        let (update, saved) = match command {
            Command::AddAddress => {
                if normalize_address_text(text).chars().count() < MIN_ADDRESS_CHARS {
                    return Ok(pending(texts::ADDRESS_TOO_SHORT));
                }
                (FieldUpdate::Address(text.to_owned()), texts::ADDRESS_SAVED)
            }
            Command::AddSecondaryHandle => {
                if normalize_secondary_handle(text).is_empty() {
                    return Ok(pending(texts::SECONDARY_INVALID));
                }
                (
                    FieldUpdate::SecondaryHandle(text.to_owned()),
                    texts::SECONDARY_SAVED,
                )
            }
            Command::AddWishes => (FieldUpdate::Wishes(text.to_owned()), texts::WISHES_SAVED),
            Command::AddName => (FieldUpdate::Name(text.to_owned()), texts::NAME_SAVED),
            Command::Help | Command::Start | Command::GiveAddress | Command::MyData => {
                return Ok(done(texts::UNKNOWN));
            }
        };

        // The store is authoritative: an unmirrored write leaves the sheet
        // behind until this record is written again.
        let report = self.directory.submit(&state.sender_handle, update).await?;
        debug!(
            chat_id = state.chat_id,
            %command,
            mirrored = report.mirrored,
            "field saved"
        );
        Ok(done(saved))
    }

    async fn my_data(&self, state: &ChatState) -> Result<StepOutcome> {
        let own = self.directory.record_for(&state.sender_handle).await?;
        if own.is_empty() {
            return Ok(done(texts::MY_DATA_EMPTY));
        }
        let mut text = format!("{}{}", texts::MY_DATA_PREFIX, own.render());
        if !own.secondary_handle.is_empty() {
            text.push_str(&format!("\nInstagram: {}.", own.secondary_handle));
        }
        Ok(done(text))
    }
}

fn prompt_for(command: Command) -> &'static str {
    match command {
        Command::AddAddress => texts::ADDRESS_PROMPT,
        Command::AddSecondaryHandle => texts::SECONDARY_PROMPT,
        Command::AddWishes => texts::WISHES_PROMPT,
        Command::AddName => texts::NAME_PROMPT,
        Command::GiveAddress => texts::GIVE_PROMPT,
        Command::Help | Command::Start | Command::MyData => texts::UNKNOWN,
    }
}

/// "ok" in either alphabet.
fn is_random_request(query: &str) -> bool {
    let query = query.trim().to_lowercase();
    query == "ok" || query == "ок"
}

fn format_hits(hits: &[AddressRecord]) -> String {
    match hits {
        [] => texts::NOTHING_FOUND.to_owned(),
        [only] => format!("{}{}", texts::FOUND_ONE, only.render()),
        many => {
            let mut text = texts::FOUND_MANY.to_owned();
            for (idx, record) in many.iter().enumerate() {
                text.push_str(&texts::numbered(idx + 1, &record.render()));
            }
            text
        }
    }
}
