//! Local console front end: one owner, stdin in, stdout out.

use anyhow::Result;
use dotenvy::dotenv;
use log::info;
use nudge::core::{Config, SystemClock};
use nudge::features::reminders::OwnerId;
use nudge::service::{Inbound, ReminderService, Transport};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};

const CONSOLE_OWNER: OwnerId = 1;

struct ConsoleTransport {
    stdout: Mutex<tokio::io::Stdout>,
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send(&self, _owner: OwnerId, text: &str) -> Result<()> {
        let mut stdout = self.stdout.lock().await;
        stdout.write_all(format!("{text}\n> ").as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    let service = ReminderService::open(&config, Arc::new(SystemClock)).await?;
    let transport = Arc::new(ConsoleTransport {
        stdout: Mutex::new(tokio::io::stdout()),
    });
    transport
        .send(CONSOLE_OWNER, "Type /start to begin, Ctrl-D to quit.")
        .await?;

    let (tx, rx) = mpsc::channel(16);
    let service_task = tokio::spawn(service.run(transport, rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if tx.send(Inbound::new(CONSOLE_OWNER, line)).await.is_err() {
            break;
        }
    }

    info!("End of input");
    drop(tx);
    service_task.await?
}
