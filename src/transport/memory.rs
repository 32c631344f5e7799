//! Process-local transport that records replies.
//!
//! Used by tests and dry runs. Inbound messages are injected with
//! [`RecordingTransport::inject`] and delivered through `run` like a real
//! transport would.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::traits::{
    ChatTransport, CommandInfo, InboundMessage, OutboundContent, OutboundMessage, SentMessage,
};

/// Transport double with failure injection.
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    commands: Mutex<Vec<CommandInfo>>,
    failures_left: AtomicU32,
    panics_left: AtomicU32,
    stalls_left: AtomicU32,
    next_id: AtomicU64,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<InboundMessage>>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            sent: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            failures_left: AtomicU32::new(0),
            panics_left: AtomicU32::new(0),
            stalls_left: AtomicU32::new(0),
            next_id: AtomicU64::new(1),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        }
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inbound message for `run`.
    pub fn inject(&self, message: InboundMessage) {
        let _ = self.inbound_tx.send(message);
    }

    /// Fail the next `count` sends with an error.
    pub fn fail_next_sends(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Panic inside the next `count` sends.
    pub fn panic_next_sends(&self, count: u32) {
        self.panics_left.store(count, Ordering::SeqCst);
    }

    /// Never complete the next `count` sends.
    pub fn stall_next_sends(&self, count: u32) {
        self.stalls_left.store(count, Ordering::SeqCst);
    }

    /// Every delivered message so far.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        lock(&self.sent).clone()
    }

    /// Text of every delivered text message, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        lock(&self.sent)
            .iter()
            .filter_map(|m| match &m.content {
                OutboundContent::Text(text) => Some(text.clone()),
                OutboundContent::Document { .. } => None,
            })
            .collect()
    }

    /// Registered command menu.
    pub fn commands(&self) -> Vec<CommandInfo> {
        lock(&self.commands).clone()
    }

    /// Wait until at least `count` messages were delivered.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> Vec<OutboundMessage> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let sent = self.sent();
            if sent.len() >= count || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn id(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, message: OutboundMessage) -> anyhow::Result<SentMessage> {
        if Self::take_one(&self.panics_left) {
            panic!("injected transport panic");
        }
        if Self::take_one(&self.failures_left) {
            anyhow::bail!("injected send failure");
        }
        if Self::take_one(&self.stalls_left) {
            std::future::pending::<()>().await;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let document_file_id = match &message.content {
            OutboundContent::Document { .. } => Some(format!("file-{id}")),
            OutboundContent::Text(_) => None,
        };
        lock(&self.sent).push(message);
        Ok(SentMessage {
            message_id: i64::try_from(id).ok(),
            document_file_id,
        })
    }

    async fn run(&self, inbound_tx: mpsc::Sender<InboundMessage>) -> anyhow::Result<()> {
        let mut rx = self.inbound_rx.lock().await;
        while let Some(message) = rx.recv().await {
            inbound_tx.send(message).await?;
        }
        Ok(())
    }

    async fn set_commands(&self, commands: &[CommandInfo]) -> anyhow::Result<()> {
        *lock(&self.commands) = commands.to_vec();
        Ok(())
    }

    async fn health_check(&self) -> anyhow::Result<bool> {
        Ok(true)
    }
}
