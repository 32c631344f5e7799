//! Process wiring: initial sync, background refresh, transport supervision
//! and the inbound routing loop.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::DirectoryCache;
use crate::config::{BotConfig, ConfigIssueSeverity};
use crate::conversation::{ChatRouter, Command, ConversationStore, Dispatcher, Handlers};
use crate::directory::{Directory, DirectoryStore, SqliteDirectory};
use crate::error::{BotError, Result};
use crate::sheets::{GoogleSheetsMirror, SheetMirror};
use crate::sync::{SyncEngine, SyncHandle, SyncStatus, SyncTrigger};
use crate::transport::{ChatTransport, InboundMessage, TelegramAdapter};

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const MIN_QUEUE_SIZE: usize = 8;

/// Fail on blocking configuration issues, log the rest.
///
/// # Errors
///
/// Returns [`BotError::Config`] listing every error-severity issue.
pub fn ensure_valid(config: &BotConfig) -> Result<()> {
    let mut blocking = Vec::new();
    for issue in config.validate() {
        match issue.severity {
            ConfigIssueSeverity::Warning => warn!(id = issue.id, "{}", issue.summary),
            ConfigIssueSeverity::Error => {
                error!(id = issue.id, "{}", issue.summary);
                blocking.push(issue.id);
            }
        }
    }
    if blocking.is_empty() {
        Ok(())
    } else {
        Err(BotError::Config(format!(
            "blocking configuration errors: {}",
            blocking.join(", ")
        )))
    }
}

/// A fully wired bot, ready to serve.
pub struct Runtime {
    router: Arc<ChatRouter>,
    transport: Arc<dyn ChatTransport>,
    sync: SyncHandle,
    cancel: CancellationToken,
    state_path: Option<PathBuf>,
    inbound_queue_size: usize,
}

impl Runtime {
    /// Run the initial sync and wire every component.
    ///
    /// # Errors
    ///
    /// Fails when the initial sync fails or the saved conversation state is
    /// unreadable; the bot must not serve traffic with an unsynced cache.
    pub async fn build(
        config: &BotConfig,
        store: Arc<dyn DirectoryStore>,
        mirror: Arc<dyn SheetMirror>,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self> {
        let conversations = match &config.conversation.state_path {
            Some(path) => ConversationStore::load_from_path(path)?,
            None => ConversationStore::new(),
        };

        let cache = Arc::new(DirectoryCache::new());
        let engine = SyncEngine::new(Arc::clone(&store), Arc::clone(&mirror), Arc::clone(&cache));
        let records = engine.startup().await?;
        info!(records, "directory ready");

        // Nothing fallible may follow: the refresh loop outlives a failed build.
        let cancel = CancellationToken::new();
        let sync = engine.spawn(
            Duration::from_secs(config.sync.interval_secs),
            cancel.child_token(),
        );

        let directory = Directory::new(store, mirror, cache);
        let handlers = Handlers::new(directory, config.conversation.help_document_url.clone());
        let dispatcher = Dispatcher::new(
            handlers,
            Arc::clone(&transport),
            Duration::from_secs(config.conversation.handler_timeout_secs),
            config.telegram.send_retries.max(1),
        );
        let router = ChatRouter::new(Arc::new(dispatcher), Arc::new(conversations))
            .with_idle_timeout(Duration::from_secs(config.conversation.worker_idle_secs));
        let router = Arc::new(router);

        match transport.health_check().await {
            Ok(true) => info!(transport = transport.id(), "transport reachable"),
            Ok(false) => warn!(transport = transport.id(), "transport health check failed"),
            Err(err) => warn!(
                transport = transport.id(),
                error = %err,
                "transport health check errored"
            ),
        }
        if let Err(err) = transport.set_commands(&Command::catalog()).await {
            warn!(transport = transport.id(), error = %err, "cannot publish command list");
        }

        Ok(Self {
            router,
            transport,
            sync,
            cancel,
            state_path: config.conversation.state_path.clone(),
            inbound_queue_size: config.telegram.inbound_queue_size.max(MIN_QUEUE_SIZE),
        })
    }

    pub fn router(&self) -> &Arc<ChatRouter> {
        &self.router
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync.status()
    }

    pub fn sync_trigger(&self) -> SyncTrigger {
        self.sync.trigger_source()
    }

    /// Route inbound messages until `shutdown` resolves, then stop the
    /// background tasks and persist conversation state.
    ///
    /// # Errors
    ///
    /// Returns an error only when conversation state cannot be saved.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (inbound_tx, mut inbound_rx) = mpsc::channel(self.inbound_queue_size);
        let supervisor = tokio::spawn(supervise(
            Arc::clone(&self.transport),
            inbound_tx,
            self.cancel.child_token(),
        ));
        #[cfg(unix)]
        spawn_hangup_listener(self.sync.trigger_source(), self.cancel.child_token());

        info!(transport = self.transport.id(), "bot serving");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                message = inbound_rx.recv() => {
                    let Some(message) = message else {
                        warn!("inbound channel closed");
                        break;
                    };
                    route(&self.router, message);
                }
            }
        }

        self.cancel.cancel();
        if let Err(err) = supervisor.await {
            error!(error = %err, "transport supervisor failed");
        }
        if let Err(err) = self.router.close() {
            warn!(error = %err, "cannot close chat workers");
        }
        self.sync.shutdown().await;

        if let Some(path) = &self.state_path {
            self.router.conversations().save_to_path(path).await?;
            info!(path = %path.display(), "conversation state saved");
        }
        info!("bot stopped");
        Ok(())
    }
}

fn route(router: &ChatRouter, message: InboundMessage) {
    let chat_id = message.chat_id;
    if let Err(err) = router.route(message) {
        error!(chat_id, error = %err, "cannot route message");
    }
}

/// Keep the transport running, restarting it with exponential backoff.
async fn supervise(
    transport: Arc<dyn ChatTransport>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        let outcome = tokio::select! {
            () = cancel.cancelled() => return,
            outcome = transport.run(inbound_tx.clone()) => outcome,
        };
        match outcome {
            Ok(()) => warn!(transport = transport.id(), "transport stopped; restarting"),
            Err(err) => warn!(
                transport = transport.id(),
                error = %format!("{err:#}"),
                backoff_secs = backoff.as_secs(),
                "transport failed; retrying"
            ),
        }
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(backoff) => {}
        }
        backoff = backoff.saturating_mul(2).min(MAX_BACKOFF);
    }
}

/// SIGHUP requests an immediate directory sync.
#[cfg(unix)]
fn spawn_hangup_listener(trigger: SyncTrigger, cancel: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(err) => {
            warn!(error = %err, "cannot listen for SIGHUP");
            return;
        }
    };
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    info!("SIGHUP received; syncing directory");
                    trigger.trigger();
                }
            }
        }
    });
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

/// Run the bot against Telegram and Google Sheets until ctrl-c.
///
/// # Errors
///
/// Returns an error on invalid configuration, an unopenable database, a
/// failed initial sync or a failed state save.
pub async fn run(config: BotConfig) -> Result<()> {
    ensure_valid(&config)?;
    let store = Arc::new(SqliteDirectory::open(&config.directory.db_path)?);
    info!(path = %config.directory.db_path.display(), "directory database opened");
    let mirror = Arc::new(GoogleSheetsMirror::new(&config.sheets)?);
    let transport = Arc::new(TelegramAdapter::new(&config.telegram)?);

    let runtime = Runtime::build(&config, store, mirror, transport).await?;
    runtime.serve(ctrl_c()).await
}
