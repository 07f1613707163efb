//! Candidate cards shown to users
//!
//! Used by the match dispatcher for bus-driven results and by the update
//! handler for "search next" and connection requests.

use crate::profile::Gender;
use crate::transport::{Button, CallbackAction, OutboundMessage};
use crate::{ChatTransport, CoreError, ProfileRepository, Result, UserHandle, UserProfile};
use std::sync::Arc;

pub const NOBODY_NEARBY: &str = "Nobody nearby right now. Try again a bit later.";

/// Plain-text summary of a profile.
pub fn profile_card(profile: &UserProfile) -> String {
    let mut card = String::from(profile.display_name());
    if let Some(age) = profile.age {
        card.push_str(&format!(", {age}"));
    }
    if let Some(gender) = profile.gender {
        let label = match gender {
            Gender::Male => "Man",
            Gender::Female => "Woman",
        };
        card.push('\n');
        card.push_str(label);
    }
    if let Some(bio) = profile.bio.as_deref().filter(|b| !b.is_empty()) {
        card.push_str("\n\n");
        card.push_str(bio);
    }
    card
}

#[derive(Debug, Clone)]
pub struct CardRenderer {
    profiles: Arc<dyn ProfileRepository>,
    transport: Arc<dyn ChatTransport>,
}

impl CardRenderer {
    pub fn new(profiles: Arc<dyn ProfileRepository>, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            profiles,
            transport,
        }
    }

    async fn send_profile(
        &self,
        to: UserHandle,
        subject: UserHandle,
        preface: Option<&str>,
        buttons: Vec<Button>,
    ) -> Result<()> {
        let profile = self
            .profiles
            .get_user_by_handle(subject)
            .await?
            .ok_or_else(|| CoreError::profile_not_found(subject))?;

        if let Some(photo) = self.profiles.get_user_photo(subject).await? {
            self.transport.send_photo(to, &photo.file_ref).await?;
        }

        let card = profile_card(&profile);
        let text = match preface {
            Some(preface) => format!("{preface}\n\n{card}"),
            None => card,
        };
        self.transport
            .send_message(to, OutboundMessage::text(text).with_row(buttons))
            .await
    }

    /// Shows `candidate` to `to` with connect and next actions.
    pub async fn present_candidate(&self, to: UserHandle, candidate: UserHandle) -> Result<()> {
        self.send_profile(
            to,
            candidate,
            None,
            vec![
                Button::new("Connect", CallbackAction::Connect(candidate)),
                Button::new("Next", CallbackAction::SearchNext),
            ],
        )
        .await
    }

    /// Shows `requester` to `to` with accept and decline actions.
    pub async fn present_request(&self, to: UserHandle, requester: UserHandle) -> Result<()> {
        self.send_profile(
            to,
            requester,
            Some("Someone nearby wants to chat with you:"),
            vec![
                Button::new("Accept", CallbackAction::Accept(requester)),
                Button::new("Decline", CallbackAction::Decline(requester)),
            ],
        )
        .await
    }

    pub async fn nobody_nearby(&self, to: UserHandle) -> Result<()> {
        self.transport.send_text(to, NOBODY_NEARBY).await
    }
}
