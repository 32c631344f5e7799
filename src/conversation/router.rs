//! Per-chat serialization of inbound updates.
//!
//! Every chat gets one queue and one worker task, so messages from the same
//! chat are handled strictly in arrival order while different chats run
//! concurrently. Each update runs in its own task; a panic there is logged
//! and the worker moves on to the next update. A worker that sees no message
//! for the idle timeout unregisters itself and the next message starts a new
//! one.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::dispatcher::Dispatcher;
use super::state::ConversationStore;
use crate::error::{BotError, Result};
use crate::transport::InboundMessage;

/// How long a chat worker waits for its next message before retiring.
pub const DEFAULT_WORKER_IDLE: Duration = Duration::from_secs(600);

type Senders = HashMap<i64, mpsc::UnboundedSender<InboundMessage>>;
type WorkerMap = Mutex<Senders>;

/// Routes inbound messages to per-chat workers.
pub struct ChatRouter {
    dispatcher: Arc<Dispatcher>,
    conversations: Arc<ConversationStore>,
    workers: Arc<WorkerMap>,
    idle_timeout: Duration,
}

impl ChatRouter {
    pub fn new(dispatcher: Arc<Dispatcher>, conversations: Arc<ConversationStore>) -> Self {
        Self {
            dispatcher,
            conversations,
            workers: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout: DEFAULT_WORKER_IDLE,
        }
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    /// Queue `message` on its chat's worker, starting one if needed.
    ///
    /// Sends happen under the worker map lock; idle retirement relies on it.
    pub fn route(&self, message: InboundMessage) -> Result<()> {
        let chat_id = message.chat_id;
        let mut workers = lock_workers(&self.workers)?;
        let sender = workers
            .entry(chat_id)
            .or_insert_with(|| self.spawn_worker(chat_id));

        if let Err(mpsc::error::SendError(message)) = sender.send(message) {
            debug!(chat_id, "chat worker gone; restarting");
            let fresh = self.spawn_worker(chat_id);
            fresh
                .send(message)
                .map_err(|_| BotError::Task(format!("chat {chat_id} worker rejected message")))?;
            workers.insert(chat_id, fresh);
        }
        Ok(())
    }

    /// Number of chats with a running worker.
    pub fn active_chats(&self) -> Result<usize> {
        Ok(lock_workers(&self.workers)?.len())
    }

    /// Drop every queue; workers exit after draining what they hold.
    pub fn close(&self) -> Result<()> {
        lock_workers(&self.workers)?.clear();
        Ok(())
    }

    fn spawn_worker(&self, chat_id: i64) -> mpsc::UnboundedSender<InboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            chat_id,
            dispatcher: Arc::clone(&self.dispatcher),
            conversations: Arc::clone(&self.conversations),
            workers: Arc::clone(&self.workers),
            idle_timeout: self.idle_timeout,
        };
        tokio::spawn(worker.run(rx));
        tx
    }
}

fn lock_workers(workers: &WorkerMap) -> Result<MutexGuard<'_, Senders>> {
    workers.lock().map_err(|e| BotError::Lock(e.to_string()))
}

struct Worker {
    chat_id: i64,
    dispatcher: Arc<Dispatcher>,
    conversations: Arc<ConversationStore>,
    workers: Arc<WorkerMap>,
    idle_timeout: Duration,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<InboundMessage>) {
        let chat_id = self.chat_id;
        debug!(chat_id, "chat worker started");
        loop {
            let message = match tokio::time::timeout(self.idle_timeout, rx.recv()).await {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(_) => {
                    if self.retire(&rx) {
                        break;
                    }
                    continue;
                }
            };
            self.process(message).await;
        }
        debug!(chat_id, "chat worker stopped");
    }

    /// Unregister this worker if nothing is queued for it.
    ///
    /// While the channel is open the registered sender is this worker's own.
    fn retire(&self, rx: &mpsc::UnboundedReceiver<InboundMessage>) -> bool {
        let mut workers = match lock_workers(&self.workers) {
            Ok(workers) => workers,
            Err(err) => {
                warn!(chat_id = self.chat_id, error = %err, "cannot retire idle worker");
                return false;
            }
        };
        if !rx.is_empty() {
            return false;
        }
        workers.remove(&self.chat_id);
        debug!(chat_id = self.chat_id, "idle chat worker retired");
        true
    }

    async fn process(&self, message: InboundMessage) {
        let chat_id = self.chat_id;
        let state = match self.conversations.get_or_create(chat_id) {
            Ok(state) => state,
            Err(err) => {
                error!(chat_id, error = %err, "cannot load chat state; update dropped");
                return;
            }
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        let job = tokio::spawn(async move {
            let mut state = state.lock().await;
            dispatcher.handle(&mut state, message).await
        });

        match job.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(chat_id, error = %err, "update dropped"),
            Err(err) if err.is_panic() => {
                let panic = panic_message(err.into_panic());
                error!(chat_id, panic = %panic, "update handler panicked");
            }
            Err(err) => error!(chat_id, error = %err, "update task cancelled"),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
