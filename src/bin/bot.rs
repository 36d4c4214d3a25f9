use anyhow::Result;
use dotenvy::dotenv;
use log::{debug, error, info};
use serenity::async_trait;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::ChannelId;
use serenity::prelude::*;
use std::sync::Arc;
use tokio::sync::mpsc;

use nudge::core::{Config, SystemClock};
use nudge::features::reminders::OwnerId;
use nudge::service::{Inbound, ReminderService, Transport};

const INBOUND_BUFFER: usize = 256;

/// Forwards channel messages into the reminder service. The owner of a
/// dialogue or reminder is the channel it happens in.
struct Handler {
    inbound: mpsc::Sender<Inbound>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let owner = msg.channel_id.0 as OwnerId;
        debug!("Message in channel {owner} from {}", msg.author.name);
        if let Err(e) = self.inbound.send(Inbound::new(owner, msg.content)).await {
            error!("Reminder service is gone, dropping message: {e}");
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🎉 {} is connected and ready!", ready.user.name);
        info!("📡 Connected to {} guilds", ready.guilds.len());
        info!("🤖 Bot ID: {}", ready.user.id);
    }
}

/// Sends replies and reminders back to the owning channel
struct DiscordTransport {
    http: Arc<Http>,
}

#[async_trait]
impl Transport for DiscordTransport {
    async fn send(&self, owner: OwnerId, text: &str) -> Result<()> {
        ChannelId(owner as u64)
            .say(&self.http, text)
            .await
            .map_err(|e| anyhow::anyhow!("Discord send to channel {owner} failed: {e}"))?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting reminder bot...");

    let token = config
        .discord_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("DISCORD_TOKEN must be set"))?;

    // Store, scheduler and restore come up before the gateway connects
    let service = ReminderService::open(&config, Arc::new(SystemClock)).await?;

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
    let handler = Handler { inbound: inbound_tx };

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    let transport = Arc::new(DiscordTransport {
        http: client.cache_and_http.http.clone(),
    });
    let service_task = tokio::spawn(service.run(transport, inbound_rx));

    info!("Establishing WebSocket connection to Discord gateway...");
    info!("Gateway intents: {intents:?}");

    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {why:?}");
        error!("This could be due to:");
        error!("  - Invalid bot token");
        error!("  - Network connectivity issues");
        error!("  - Missing MESSAGE_CONTENT intent");
        service_task.abort();
        return Err(anyhow::anyhow!(
            "Failed to establish gateway connection: {}",
            why
        ));
    }

    match service_task.await {
        Ok(result) => result,
        Err(e) => Err(anyhow::anyhow!("Reminder service task failed: {e}")),
    }
}
