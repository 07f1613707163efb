use crate::convert::{MAX_MESSAGE_LEN, split_message, user_id_from_handle};
use async_trait::async_trait;
use geomatch_core::transport::Button;
use geomatch_core::{ChatTransport, CoreError, OutboundMessage, Result, UserHandle};
use serenity::all::ButtonStyle;
use serenity::builder::{CreateActionRow, CreateButton, CreateEmbed, CreateMessage};
use serenity::http::Http;
use serenity::model::channel::PrivateChannel;
use std::fmt;
use std::sync::Arc;

/// Discord allows five action rows per message and five buttons per row.
const MAX_ROWS: usize = 5;
const MAX_BUTTONS_PER_ROW: usize = 5;

/// Button rows trimmed to what Discord accepts.
pub fn button_layout(message: &OutboundMessage) -> Vec<Vec<&Button>> {
    let total: usize = message.buttons.iter().map(Vec::len).sum();
    let layout: Vec<Vec<&Button>> = message
        .buttons
        .iter()
        .take(MAX_ROWS)
        .map(|row| row.iter().take(MAX_BUTTONS_PER_ROW).collect())
        .collect();
    let kept: usize = layout.iter().map(Vec::len).sum();
    if kept < total {
        tracing::warn!("Dropped {} buttons over Discord's limits", total - kept);
    }
    layout
}

fn action_rows(message: &OutboundMessage) -> Vec<CreateActionRow> {
    button_layout(message)
        .into_iter()
        .map(|row| {
            CreateActionRow::Buttons(
                row.into_iter()
                    .map(|button| {
                        CreateButton::new(button.action.to_string())
                            .label(button.label.as_str())
                            .style(ButtonStyle::Primary)
                    })
                    .collect(),
            )
        })
        .collect()
}

/// Sends everything as direct messages.
#[derive(Clone)]
pub struct DiscordTransport {
    http: Arc<Http>,
}

impl fmt::Debug for DiscordTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordTransport").finish_non_exhaustive()
    }
}

impl DiscordTransport {
    pub fn new(token: &str) -> Self {
        Self::with_http(Arc::new(Http::new(token)))
    }

    pub fn with_http(http: Arc<Http>) -> Self {
        Self { http }
    }

    async fn dm_channel(&self, operation: &str, user: UserHandle) -> Result<PrivateChannel> {
        let user_id =
            user_id_from_handle(user).map_err(|e| CoreError::transport(operation, user, e))?;
        user_id
            .create_dm_channel(&self.http)
            .await
            .map_err(|e| CoreError::transport(operation, user, e))
    }

    async fn deliver(&self, operation: &str, user: UserHandle, builder: CreateMessage) -> Result<()> {
        let channel = self.dm_channel(operation, user).await?;
        channel
            .send_message(&self.http, builder)
            .await
            .map_err(|e| CoreError::transport(operation, user, e))?;
        tracing::debug!("Sent {} to Discord user {}", operation, user);
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for DiscordTransport {
    async fn send_text(&self, user: UserHandle, text: &str) -> Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            self.deliver("text", user, CreateMessage::new().content(chunk))
                .await?;
        }
        Ok(())
    }

    async fn send_photo(&self, user: UserHandle, file_ref: &str) -> Result<()> {
        let embed = CreateEmbed::new().image(file_ref);
        self.deliver("photo", user, CreateMessage::new().embed(embed))
            .await
    }

    async fn send_message(&self, user: UserHandle, message: OutboundMessage) -> Result<()> {
        let mut chunks = split_message(&message.text, MAX_MESSAGE_LEN);
        // buttons ride on the last chunk
        let last = chunks.pop().unwrap_or_default();
        for chunk in chunks {
            self.deliver("message", user, CreateMessage::new().content(chunk))
                .await?;
        }
        let builder = CreateMessage::new()
            .content(last)
            .components(action_rows(&message));
        self.deliver("message", user, builder).await
    }
}
