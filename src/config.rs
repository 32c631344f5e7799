//! Configuration types for the address bot.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level bot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Chat transport settings.
    pub telegram: TelegramConfig,
    /// Relational directory store settings.
    pub directory: DirectoryConfig,
    /// Spreadsheet (source of truth) settings.
    pub sheets: SheetsConfig,
    /// Spreadsheet reconciliation settings.
    pub sync: SyncConfig,
    /// Conversation handling settings.
    pub conversation: ConversationConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather.
    pub bot_token: String,
    /// Bot API base URL (overridable for tests and self-hosted API servers).
    pub api_base_url: String,
    /// Long-poll timeout for `getUpdates`.
    pub poll_timeout_secs: u64,
    /// Attempts per outbound reply before the update is dropped.
    pub send_retries: u32,
    /// Capacity of the adapter → router queue.
    pub inbound_queue_size: usize,
    /// Upper bound for one Bot API request, long polls excluded.
    pub request_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base_url: "https://api.telegram.org".to_owned(),
            poll_timeout_secs: 60,
            send_retries: 10,
            inbound_queue_size: 128,
            request_timeout_secs: 30,
        }
    }
}

/// Directory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("postbot.db"),
        }
    }
}

/// Google Sheets configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    /// Spreadsheet identifier (the long id in the sheet URL).
    pub spreadsheet_id: String,
    /// Worksheet holding the directory.
    pub sheet_name: String,
    /// Sheets API base URL.
    pub api_base_url: String,
    /// OAuth bearer token with spreadsheet scope.
    pub access_token: Option<String>,
    /// API key, appended as `key=` when set.
    pub api_key: Option<String>,
    /// Upper bound for one Sheets API request.
    pub request_timeout_secs: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            sheet_name: "Лист1".to_owned(),
            api_base_url: "https://sheets.googleapis.com".to_owned(),
            access_token: None,
            api_key: None,
            request_timeout_secs: 30,
        }
    }
}

/// Reconciliation loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between two spreadsheet pulls.
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

/// Conversation handling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Time budget for one step handler (store and spreadsheet calls included).
    pub handler_timeout_secs: u64,
    /// Where per-chat state is persisted on shutdown and restored on start.
    pub state_path: Option<PathBuf>,
    /// Document attached to `/help` replies.
    pub help_document_url: Option<String>,
    /// Seconds a chat worker stays alive without messages.
    pub worker_idle_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: 10,
            state_path: None,
            help_document_url: None,
            worker_idle_secs: 600,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for the `postbot` target (`trace` … `error`).
    pub level: String,
    /// Forces `debug` unless the level is already `trace`.
    pub debug: bool,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Directory for a daily rolling log file, in addition to stdout.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            debug: false,
            json: false,
            directory: None,
        }
    }
}

impl LoggingConfig {
    /// Level actually applied after the `debug` switch.
    pub fn effective_level(&self) -> String {
        let level = self.level.trim().to_ascii_lowercase();
        if self.debug && level != "trace" {
            "debug".to_owned()
        } else {
            level
        }
    }
}

/// Severity of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigIssueSeverity {
    Warning,
    Error,
}

/// Configuration problem found by [`BotConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub id: &'static str,
    pub severity: ConfigIssueSeverity,
    pub summary: String,
}

impl BotConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::BotError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::BotError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/postbot/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("postbot").join("config.toml")
        } else if let Some(config) = dirs::config_dir() {
            config.join("postbot").join("config.toml")
        } else {
            PathBuf::from("/tmp/postbot-config/config.toml")
        }
    }

    /// Apply environment overrides using `lookup` as the variable source.
    ///
    /// Recognised: `BOT_TOKEN`, `LOG_LEVEL`, `DEBUG`, `JSON`,
    /// `DATA_RELOAD_TIMEOUT`, `DATABASE_PATH`, `SPREADSHEET_ID`,
    /// `SHEETS_ACCESS_TOKEN`, `SHEETS_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error when a boolean or duration variable cannot be parsed.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> crate::error::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(raw) = lookup("DEBUG") {
            self.logging.debug = parse_env_bool("DEBUG", &raw)?;
        }
        if let Some(raw) = lookup("JSON") {
            self.logging.json = parse_env_bool("JSON", &raw)?;
        }
        if let Some(raw) = lookup("DATA_RELOAD_TIMEOUT") {
            self.sync.interval_secs = parse_duration_secs(&raw).ok_or_else(|| {
                let reason = format!("DATA_RELOAD_TIMEOUT: invalid duration `{raw}`");
                crate::error::BotError::Config(reason)
            })?;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.directory.db_path = PathBuf::from(path);
        }
        if let Some(id) = lookup("SPREADSHEET_ID") {
            self.sheets.spreadsheet_id = id;
        }
        if let Some(token) = lookup("SHEETS_ACCESS_TOKEN") {
            self.sheets.access_token = Some(token);
        }
        if let Some(key) = lookup("SHEETS_API_KEY") {
            self.sheets.api_key = Some(key);
        }
        Ok(())
    }

    /// Validate configuration without network calls.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.telegram.bot_token.trim().is_empty() {
            issues.push(ConfigIssue {
                id: "telegram-missing-token",
                severity: ConfigIssueSeverity::Error,
                summary: "Telegram bot token is empty.".to_owned(),
            });
        }
        if self.telegram.send_retries == 0 {
            issues.push(ConfigIssue {
                id: "telegram-zero-retries",
                severity: ConfigIssueSeverity::Error,
                summary: "send_retries must be at least 1.".to_owned(),
            });
        }
        if self.sheets.spreadsheet_id.trim().is_empty() {
            issues.push(ConfigIssue {
                id: "sheets-missing-id",
                severity: ConfigIssueSeverity::Error,
                summary: "Spreadsheet id is empty; the directory cannot be synced.".to_owned(),
            });
        }
        if self.sheets.access_token.is_none() && self.sheets.api_key.is_none() {
            issues.push(ConfigIssue {
                id: "sheets-no-credentials",
                severity: ConfigIssueSeverity::Warning,
                summary: "No access_token or api_key; writes to the sheet will fail.".to_owned(),
            });
        }
        if self.telegram.request_timeout_secs == 0 || self.sheets.request_timeout_secs == 0 {
            issues.push(ConfigIssue {
                id: "http-zero-timeout",
                severity: ConfigIssueSeverity::Error,
                summary: "request_timeout_secs must be greater than zero.".to_owned(),
            });
        }
        if self.sync.interval_secs == 0 {
            issues.push(ConfigIssue {
                id: "sync-zero-interval",
                severity: ConfigIssueSeverity::Error,
                summary: "Sync interval must be greater than zero.".to_owned(),
            });
        }
        if self.conversation.handler_timeout_secs == 0 {
            issues.push(ConfigIssue {
                id: "conversation-zero-timeout",
                severity: ConfigIssueSeverity::Warning,
                summary: "handler_timeout_secs is 0; every command will time out.".to_owned(),
            });
        }

        issues
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(home) = dirs::home_dir() {
        home.join(".postbot")
    } else {
        PathBuf::from("/tmp").join(".postbot")
    }
}

fn parse_env_bool(name: &str, raw: &str) -> crate::error::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(crate::error::BotError::Config(format!(
            "{name}: invalid boolean `{other}`"
        ))),
    }
}

/// Parse `30`, `30s`, `5m` or `1h` into seconds.
fn parse_duration_secs(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.char_indices().last()? {
        (i, 's') => (&raw[..i], 1),
        (i, 'm') => (&raw[..i], 60),
        (i, 'h') => (&raw[..i], 3600),
        _ => (raw, 1),
    };
    digits.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}
