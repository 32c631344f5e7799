//! End-to-end conversation tests.
//!
//! A real SQLite directory, an in-memory spreadsheet and a recording
//! transport wired through [`Runtime`], driven by injected chat messages.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use postbot::BotConfig;
use postbot::Runtime;
use postbot::conversation::{Command, ConversationStore, texts};
use postbot::directory::{DirectoryStore, SqliteDirectory};
use postbot::sheets::InMemoryMirror;
use postbot::transport::{InboundMessage, RecordingTransport};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(5);

/// One sheet row from `|`-separated cells.
fn row(cells: &str) -> Vec<String> {
    cells.split('|').map(str::to_owned).collect()
}

fn sheet() -> Vec<Vec<String>> {
    vec![
        row("Телеграм|Инстаграм|Имя|Адрес|Пожелания|Одобрен"),
        row("ivan||Иван|Москва, ул. Ленина, д. 1|Открытки|да"),
        row("maria|maria_ig|Мария|Казань, ул. Баумана, д. 5||да"),
        row("olga||Ольга|Самара, ул. Мира, д. 3||"),
    ]
}

struct Harness {
    store: Arc<SqliteDirectory>,
    mirror: Arc<InMemoryMirror>,
    transport: Arc<RecordingTransport>,
    conversations: Arc<ConversationStore>,
    trigger: postbot::sync::SyncTrigger,
    stop: oneshot::Sender<()>,
    serving: JoinHandle<postbot::Result<()>>,
    _dir: tempfile::TempDir,
}

impl Harness {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("postbot.db");
        let store = Arc::new(SqliteDirectory::open(&db_path).unwrap());
        let mirror = Arc::new(InMemoryMirror::with_rows(sheet()));
        let transport = Arc::new(RecordingTransport::new());

        let mut config = BotConfig::default();
        config.telegram.bot_token = "token".to_owned();
        config.sheets.spreadsheet_id = "sheet".to_owned();
        config.sync.interval_secs = 3600;

        let runtime = Runtime::build(&config, store.clone(), mirror.clone(), transport.clone())
            .await
            .unwrap();
        let conversations = Arc::clone(runtime.router().conversations());
        let trigger = runtime.sync_trigger();

        let (stop, stop_rx) = oneshot::channel::<()>();
        let serving = tokio::spawn(runtime.serve(async {
            let _ = stop_rx.await;
        }));

        Self {
            store,
            mirror,
            transport,
            conversations,
            trigger,
            stop,
            serving,
            _dir: dir,
        }
    }

    /// Inject `message` and return the reply it produced.
    async fn say(&self, message: InboundMessage) -> String {
        let before = self.transport.sent().len();
        self.transport.inject(message);
        let sent = self.transport.wait_for_sent(before + 1, WAIT).await;
        assert_eq!(sent.len(), before + 1, "no reply received");
        self.transport.sent_texts().pop().unwrap()
    }

    async fn command(&self, chat_id: i64, handle: &str, text: &str) -> String {
        let message = InboundMessage::command(chat_id, handle, text);
        self.say(message).await
    }

    async fn text(&self, chat_id: i64, handle: &str, text: &str) -> String {
        let message = InboundMessage::text(chat_id, handle, text);
        self.say(message).await
    }

    async fn given_addresses(&self, chat_id: i64) -> u64 {
        let chat = self.conversations.get_or_create(chat_id).unwrap();
        chat.lock().await.given_addresses
    }

    async fn stop(self) {
        self.stop.send(()).unwrap();
        self.serving.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn approved_user_gets_address_by_handle() {
    let bot = Harness::start().await;

    let reply = bot.command(1, "maria", "/give_me_some").await;
    assert_eq!(reply, texts::GIVE_PROMPT);

    let reply = bot.text(1, "maria", "@Ivan").await;
    assert!(reply.starts_with(texts::FOUND_ONE), "{reply}");
    assert!(reply.contains("Москва, ул. Ленина, д. 1"), "{reply}");
    assert_eq!(bot.given_addresses(1).await, 1);

    let chat = bot.conversations.get_or_create(1).unwrap();
    assert_eq!(chat.lock().await.pending(), None);
    bot.stop().await;
}

#[tokio::test]
async fn random_address_counts_one() {
    let bot = Harness::start().await;

    let reply = bot.command(2, "ivan", "/give_me_some ok").await;
    assert!(reply.starts_with(texts::RANDOM_PREFIX), "{reply}");
    assert_eq!(bot.given_addresses(2).await, 1);
    bot.stop().await;
}

#[tokio::test]
async fn unapproved_user_is_refused() {
    let bot = Harness::start().await;

    let reply = bot.command(3, "olga", "/give_me_some ivan").await;
    assert_eq!(reply, texts::NOT_APPROVED);
    assert_eq!(bot.given_addresses(3).await, 0);

    let reply = bot.command(4, "newbie", "/give_me_some").await;
    assert_eq!(reply, texts::NO_ADDRESS);
    bot.stop().await;
}

#[tokio::test]
async fn two_turn_address_is_stored_and_mirrored() {
    let bot = Harness::start().await;

    let reply = bot.command(5, "petr", "/add_address").await;
    assert_eq!(reply, texts::ADDRESS_PROMPT);

    let reply = bot.text(5, "petr", "Тверь").await;
    assert_eq!(reply, texts::ADDRESS_TOO_SHORT);
    let chat = bot.conversations.get_or_create(5).unwrap();
    assert_eq!(chat.lock().await.pending(), Some(Command::AddAddress));

    let reply = bot.text(5, "petr", "Тверь, ул. Советская, д. 10").await;
    assert_eq!(reply, texts::ADDRESS_SAVED);
    assert_eq!(bot.mirror.push_count(), 1);

    let stored = bot.store.get_by_handle("petr").await.unwrap();
    assert_eq!(stored.address, "Тверь, ул. Советская, д. 10");
    assert!(!stored.approved);

    let rows = bot.mirror.rows().unwrap();
    let handles: Vec<_> = rows.iter().filter_map(|r| r.first()).collect();
    assert!(handles.iter().any(|h| *h == "petr"));

    let reply = bot.command(5, "petr", "/my_data").await;
    assert!(reply.starts_with(texts::MY_DATA_PREFIX), "{reply}");
    assert!(reply.contains("Тверь, ул. Советская, д. 10"), "{reply}");
    bot.stop().await;
}

#[tokio::test]
async fn sync_keeps_local_records_and_picks_up_sheet_edits() {
    let bot = Harness::start().await;

    bot.command(6, "anna", "/add_wishes").await;
    bot.text(6, "anna", "марки").await;

    let mut rows = sheet();
    rows.push(row("@Sergey||Сергей|Пермь, ул. Ленина, д. 50||да"));
    bot.mirror.set_rows(rows).unwrap();
    bot.trigger.trigger();

    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let sergey = bot.store.get_by_handle("sergey").await.unwrap();
        if sergey.has_address() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "sync never ran");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let anna = bot.store.get_by_handle("anna").await.unwrap();
    assert_eq!(anna.wishes, "марки");

    let reply = bot.command(7, "ivan", "/give_me_some sergey").await;
    assert!(reply.contains("Пермь"), "{reply}");
    bot.stop().await;
}

#[tokio::test]
async fn failed_pull_leaves_directory_untouched() {
    let bot = Harness::start().await;

    bot.mirror.set_fail_pull(true);
    bot.mirror.set_rows(vec![row("Телеграм")]).unwrap();
    bot.trigger.trigger();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let reply = bot.command(8, "maria", "/give_me_some ok").await;
    assert!(reply.starts_with(texts::RANDOM_PREFIX), "{reply}");

    let reply = bot.command(8, "maria", "/give_me_some ivan").await;
    assert!(reply.starts_with(texts::FOUND_ONE), "{reply}");
    bot.stop().await;
}
