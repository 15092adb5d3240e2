use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dweet_mailbox::config::MailboxConfig;
use dweet_mailbox::error::{MailboxError, Result};
use dweet_mailbox::{MailboxSession, Message};

#[derive(Parser, Debug)]
#[command(name = "dweet-mailbox")]
#[command(about = "Encrypted mailbox over a public dweet store")]
struct Cli {
    /// JSON session config; flags below override it.
    #[arg(long)]
    config: Option<String>,

    #[arg(long, env = "DWEET_MAILBOX")]
    mailbox: Option<String>,

    #[arg(long, env = "DWEET_MAILBOX_SECRET")]
    secret: Option<String>,

    #[arg(long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    Send {
        message: String,

        /// Treat MESSAGE as base64 and send the decoded bytes.
        #[arg(long, default_value_t = false)]
        base64: bool,
    },
    Latest,
    New,
    /// Poll for new messages until interrupted.
    Watch {
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,
    },
}

fn load_config(cli: &Cli) -> Result<MailboxConfig> {
    let mut config = match &cli.config {
        Some(path) => MailboxConfig::from_file(path)?,
        None => MailboxConfig::default(),
    };
    if let Some(mailbox) = &cli.mailbox {
        config.mailbox = mailbox.clone();
    }
    if let Some(secret) = &cli.secret {
        config.secret = Some(secret.clone());
        config.secret_base64 = None;
    }
    if let Some(base_url) = &cli.base_url {
        config.base_url = Some(base_url.clone());
    }
    Ok(config)
}

fn render(message: &Message) -> String {
    match message.as_text() {
        Some(text) => text.to_string(),
        None => format!("base64:{}", BASE64.encode(message.as_bytes())),
    }
}

/// Store outages and records we cannot open are transient for a watcher.
fn survives_watch(err: &MailboxError) -> bool {
    matches!(
        err,
        MailboxError::Transport(_) | MailboxError::Decoding(_) | MailboxError::Replay(_)
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dweet_mailbox=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let mut session = MailboxSession::from_config(&config)?;

    match cli.command {
        Commands::Send { message, base64 } => {
            let message = if base64 {
                let bytes = BASE64
                    .decode(message.trim())
                    .map_err(|e| MailboxError::Encoding(e.to_string()))?;
                Message::Bytes(bytes)
            } else {
                Message::Text(message)
            };
            let record = session.send(message).await?;
            let ack = serde_json::to_string(&record)
                .map_err(|e| MailboxError::Transport(e.to_string()))?;
            println!("{ack}");
        }
        Commands::Latest => match session.get_latest().await? {
            Some(message) => println!("{}", render(&message)),
            None => info!(mailbox = session.mailbox(), "mailbox is empty"),
        },
        Commands::New => match session.get_new().await? {
            Some(message) => println!("{}", render(&message)),
            None => info!(mailbox = session.mailbox(), "no new message"),
        },
        Commands::Watch { interval_secs } => {
            let interval = Duration::from_secs(interval_secs.max(1));
            loop {
                match session.get_new().await {
                    Ok(Some(message)) => println!("{}", render(&message)),
                    Ok(None) => {}
                    Err(err) if survives_watch(&err) => {
                        warn!(error = %err, "poll failed, watching on");
                    }
                    Err(err) => return Err(err),
                }
                tokio::time::sleep(interval).await;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_prints_text_and_tags_bytes() {
        assert_eq!(render(&Message::from("hello")), "hello");
        assert_eq!(render(&Message::Bytes(vec![0, 1, 2])), "base64:AAEC");
    }

    #[test]
    fn watch_outlives_transient_failures() {
        assert!(survives_watch(&MailboxError::Transport("timed out".to_string())));
        assert!(survives_watch(&MailboxError::Decoding("bad mac".to_string())));
        assert!(survives_watch(&MailboxError::Replay("stale".to_string())));
        assert!(!survives_watch(&MailboxError::Config("no secret".to_string())));
        assert!(!survives_watch(&MailboxError::Encoding("bad input".to_string())));
    }
}
