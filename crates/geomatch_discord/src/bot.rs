use crate::convert::{handle_from_user_id, inbound_kind, is_image, sender_info, strip_mention};
use crate::{DiscordError, Result};
use geomatch_core::config::DiscordConfig;
use geomatch_core::{InboundEvent, InboundKind, UpdateHandler};
use serenity::all::{CreateInteractionResponse, GatewayIntents};
use serenity::async_trait;
use serenity::client::{Client, Context, EventHandler};
use serenity::model::application::Interaction;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::UserId;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Serenity event handler feeding the core update handler.
pub struct GeomatchBot {
    handler: Arc<UpdateHandler>,
    prefix: String,
    /// Learned from the ready event, needed to spot mentions in guilds.
    bot_id: OnceLock<UserId>,
}

impl GeomatchBot {
    pub fn new(handler: Arc<UpdateHandler>, prefix: impl Into<String>) -> Self {
        Self {
            handler,
            prefix: prefix.into(),
            bot_id: OnceLock::new(),
        }
    }

    /// The text meant for the bot: all of a DM, or a guild message that
    /// mentions the bot with the mention removed.
    fn addressed_content<'a>(&self, msg: &'a Message) -> Option<&'a str> {
        if msg.guild_id.is_none() {
            return Some(msg.content.as_str());
        }
        let bot_id = *self.bot_id.get()?;
        msg.mentions_user_id(bot_id)
            .then(|| strip_mention(&msg.content, bot_id))
    }
}

#[async_trait]
impl EventHandler for GeomatchBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);
        let _ = self.bot_id.set(ready.user.id);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(content) = self.addressed_content(&msg) else {
            return;
        };

        let image_url = msg
            .attachments
            .iter()
            .find(|a| is_image(a.content_type.as_deref(), &a.filename))
            .map(|a| a.url.as_str());

        let kind = match inbound_kind(&self.prefix, content, image_url) {
            Ok(Some(kind)) => kind,
            Ok(None) => return,
            Err(e) => {
                debug!("Rejected message from {}: {}", msg.author.id, e);
                let reply = match &e {
                    DiscordError::InvalidCommandSyntax {
                        expected_format, ..
                    } => format!("Usage: {expected_format}"),
                    other => other.to_string(),
                };
                let message_length = reply.len();
                if let Err(cause) = msg.reply(&ctx.http, reply).await {
                    let error = DiscordError::MessageSendFailed {
                        destination: msg.author.id.to_string(),
                        message_length,
                        cause,
                    };
                    geomatch_core::log_error!("Failed to send usage hint", error);
                }
                return;
            }
        };

        let event = InboundEvent::new(handle_from_user_id(msg.author.id), kind)
            .with_sender(sender_info(&msg.author));
        self.handler.handle(event).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Component(component) = interaction else {
            return;
        };

        if let Err(cause) = component
            .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
            .await
        {
            let error = DiscordError::InteractionFailed {
                interaction_type: "component".to_string(),
                interaction_id: component.id.to_string(),
                user_id: component.user.id.to_string(),
                cause,
            };
            geomatch_core::log_error!("Failed to acknowledge button press", error);
        }

        let event = InboundEvent::new(
            handle_from_user_id(component.user.id),
            InboundKind::Callback(component.data.custom_id.clone()),
        )
        .with_sender(sender_info(&component.user));
        self.handler.handle(event).await;
    }
}

/// Create the Discord client (without starting it)
pub async fn create_discord_client(
    config: &DiscordConfig,
    handler: Arc<UpdateHandler>,
) -> Result<Client> {
    if config.token.trim().is_empty() {
        return Err(DiscordError::InvalidBotConfiguration {
            issues: "the bot token is empty".to_string(),
        });
    }

    let bot = GeomatchBot::new(handler, config.prefix.clone());
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client_builder = Client::builder(&config.token, intents).event_handler(bot);
    if let Some(app_id) = config.application_id {
        client_builder = client_builder.application_id(app_id.into());
    }

    client_builder
        .await
        .map_err(|cause| DiscordError::ClientBuildFailed { cause })
}

/// Create and run the Discord bot until the gateway connection ends.
pub async fn run_discord_bot(config: &DiscordConfig, handler: Arc<UpdateHandler>) -> Result<()> {
    let mut client = create_discord_client(config, handler).await?;

    info!("Starting Discord bot...");
    client
        .start()
        .await
        .map_err(|cause| DiscordError::GatewayConnectionLost { cause })
}
