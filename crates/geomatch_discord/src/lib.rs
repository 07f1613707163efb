//! Geomatch Discord - Discord front end for the geomatch bot
//!
//! Direct messages and mentions become [`geomatch_core::InboundEvent`]s for
//! the core update handler; replies go out as DMs through
//! [`DiscordTransport`].

pub mod bot;
pub mod convert;
pub mod endpoint;
pub mod error;

pub use bot::{GeomatchBot, create_discord_client, run_discord_bot};
pub use endpoint::DiscordTransport;
pub use error::{DiscordError, Result};

// Re-export serenity for convenience
pub use serenity;
