//! Postbot binary.

use std::path::PathBuf;

use clap::Parser;
use postbot::BotConfig;
use postbot::config::ConfigIssueSeverity;
use tracing::info;

/// Postcard address-exchange Telegram bot.
#[derive(Parser)]
#[command(name = "postbot", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let explicit = cli.config.is_some();
    let path = cli.config.unwrap_or_else(BotConfig::default_config_path);
    let mut config = if path.exists() {
        BotConfig::from_file(&path)?
    } else if explicit {
        anyhow::bail!("config file not found: {}", path.display());
    } else {
        BotConfig::default()
    };
    config.apply_env_overrides(|name| std::env::var(name).ok())?;

    if cli.check {
        return check(&config);
    }

    let _log_guard = postbot::logging::init(&config.logging)?;
    info!(config = %path.display(), "postbot v{}", env!("CARGO_PKG_VERSION"));

    postbot::runtime::run(config).await?;
    Ok(())
}

fn check(config: &BotConfig) -> anyhow::Result<()> {
    let issues = config.validate();
    let mut errors = 0;
    for issue in &issues {
        let label = match issue.severity {
            ConfigIssueSeverity::Warning => "warning",
            ConfigIssueSeverity::Error => {
                errors += 1;
                "error"
            }
        };
        println!("{label}: [{}] {}", issue.id, issue.summary);
    }
    if errors > 0 {
        anyhow::bail!("{errors} blocking configuration issue(s)");
    }
    println!("configuration ok");
    Ok(())
}
