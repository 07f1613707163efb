//! Mapping between Discord shapes and the core's platform-neutral ones
//!
//! Everything here works on plain strings and ids so it can be tested
//! without a gateway connection.

use crate::{DiscordError, Result};
use geomatch_core::transport::SenderInfo;
use geomatch_core::{Coordinate, InboundKind, UserHandle};
use serenity::model::id::UserId;
use serenity::model::user::User;

/// Discord's limit for message content.
pub const MAX_MESSAGE_LEN: usize = 2000;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

pub fn handle_from_user_id(id: UserId) -> UserHandle {
    UserHandle(id.get() as i64)
}

pub fn user_id_from_handle(handle: UserHandle) -> Result<UserId> {
    u64::try_from(handle.get())
        .ok()
        .filter(|id| *id != 0)
        .map(UserId::new)
        .ok_or(DiscordError::InvalidUserHandle {
            handle: handle.get(),
        })
}

pub fn sender_info(user: &User) -> SenderInfo {
    SenderInfo {
        username: user.name.clone(),
        first_name: user.global_name.clone().unwrap_or_default(),
        last_name: String::new(),
    }
}

/// Whether an attachment looks like a picture.
pub fn is_image(content_type: Option<&str>, filename: &str) -> bool {
    if let Some(content_type) = content_type {
        return content_type.starts_with("image/");
    }
    filename
        .rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Drops a leading `<@id>` or `<@!id>` mention of the bot.
pub fn strip_mention(content: &str, bot_id: UserId) -> &str {
    let content = content.trim_start();
    for mention in [format!("<@{}>", bot_id), format!("<@!{}>", bot_id)] {
        if let Some(rest) = content.strip_prefix(mention.as_str()) {
            return rest.trim_start();
        }
    }
    content
}

/// Accepts `lat lon` or `lat, lon`.
pub fn parse_location(args: &str) -> Option<Coordinate> {
    let mut parts = args
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty());
    let latitude: f64 = parts.next()?.parse().ok()?;
    let longitude: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(Coordinate::new(latitude, longitude))
}

/// Turns a message into an inbound event kind.
///
/// An image attachment wins over any text. `<prefix>location <lat> <lon>`
/// becomes a location; every other `<prefix>name args` is a command. Returns
/// `None` for messages with nothing usable in them.
pub fn inbound_kind(
    prefix: &str,
    content: &str,
    image_url: Option<&str>,
) -> Result<Option<InboundKind>> {
    if let Some(url) = image_url {
        return Ok(Some(InboundKind::Photo {
            file_ref: url.to_string(),
        }));
    }

    let content = content.trim();
    if content.is_empty() {
        return Ok(None);
    }

    let Some(rest) = content.strip_prefix(prefix).filter(|_| !prefix.is_empty()) else {
        return Ok(Some(InboundKind::Text(content.to_string())));
    };
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    if name.is_empty() {
        return Ok(Some(InboundKind::Text(content.to_string())));
    }

    let name = name.to_lowercase();
    if name == "location" {
        return parse_location(args)
            .map(|coordinate| Some(InboundKind::Location(coordinate)))
            .ok_or_else(|| DiscordError::InvalidCommandSyntax {
                command: name,
                reason: format!("'{args}' is not a latitude and longitude"),
                expected_format: format!("{prefix}location <lat> <lon>"),
            });
    }

    Ok(Some(InboundKind::Command {
        name,
        args: args.to_string(),
    }))
}

/// Splits text into chunks no longer than `max` characters, preferring line
/// breaks.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
