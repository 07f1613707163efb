//! Update routing
//!
//! [`UpdateHandler`] takes one [`InboundEvent`] at a time and turns it into
//! store writes, bus events and replies. Commands and callbacks are routed by
//! name; plain messages are routed by the sender's conversation step.

mod callbacks;
mod chat;
mod commands;
mod onboarding;
mod search;

use crate::menu::{CommandTable, MenuRenderer, MenuStyle};
use crate::render::CardRenderer;
use crate::session::ChatPairing;
use crate::transport::{InboundEvent, InboundKind};
use crate::{
    ChatTransport, ConversationTracker, GeoIndex, ProfileRepository, RequestBus, Result,
    SessionStore, Step, UserHandle, VisibilityCoordinator,
};
use std::sync::Arc;

pub const RETRY_LATER: &str = "Something went wrong on our side. Please try again later.";

/// Plain text that ends an active chat, sent by the chat reply button.
pub const END_CHAT_PHRASE: &str = "End chat";

pub(crate) fn prompt(step: Step) -> &'static str {
    match step {
        Step::TitleName => "What's your name?",
        Step::Gender => "Your gender (m/f):",
        Step::Age => "How old are you?",
        Step::Bio => "Tell us a little about yourself:",
        Step::Photo => "Please send a photo for verification:",
        Step::SearchGender => "Who are you looking for? Gender (m/f):",
        Step::SearchAge => "Preferred age range (for example 25-30):",
        Step::SearchLocation => "Please send your location:",
        Step::SetLocationForVisibility => "Please send your location to turn on visibility.",
    }
}

#[derive(Debug, Clone)]
pub struct UpdateHandler {
    sessions: Arc<dyn SessionStore>,
    tracker: ConversationTracker,
    geo: Arc<dyn GeoIndex>,
    coordinator: VisibilityCoordinator,
    profiles: Arc<dyn ProfileRepository>,
    transport: Arc<dyn ChatTransport>,
    cards: CardRenderer,
    chats: ChatPairing,
    menu: Arc<dyn MenuRenderer>,
    commands: Arc<CommandTable>,
    on_demand_radius_km: f64,
    prefix: String,
}

impl UpdateHandler {
    pub fn builder(
        sessions: Arc<dyn SessionStore>,
        geo: Arc<dyn GeoIndex>,
        bus: Arc<dyn RequestBus>,
        profiles: Arc<dyn ProfileRepository>,
        transport: Arc<dyn ChatTransport>,
    ) -> UpdateHandlerBuilder {
        UpdateHandlerBuilder::new(sessions, geo, bus, profiles, transport)
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Handles one update. Failures are logged and the user is told to try
    /// again later; nothing is returned to the caller.
    pub async fn handle(&self, event: InboundEvent) {
        let user = event.user;
        if let Err(e) = self.route(event).await {
            crate::log_error!(format!("Failed to handle update from {}", user), e);
            if let Err(e) = self.transport.send_text(user, RETRY_LATER).await {
                crate::log_error!(format!("Failed to tell {} to retry", user), e);
            }
        }
    }

    /// Same as [`UpdateHandler::handle`] but hands the error back.
    pub async fn route(&self, event: InboundEvent) -> Result<()> {
        let InboundEvent { user, sender, kind } = event;
        match kind {
            InboundKind::Command { name, args } => {
                tracing::debug!("Command {} from {} ({})", name, user, args);
                self.handle_command(user, &sender, &name).await
            }
            InboundKind::Callback(data) => {
                tracing::debug!("Callback '{}' from {}", data, user);
                self.handle_callback(user, &data).await
            }
            other => self.handle_message(user, other).await,
        }
    }

    async fn handle_message(&self, user: UserHandle, kind: InboundKind) -> Result<()> {
        let state = self.tracker.get_state(user).await?;

        if state == Some(Step::SetLocationForVisibility) {
            return self.save_visibility_location(user, &kind).await;
        }

        if matches!(&kind, InboundKind::Text(text) if text.trim() == END_CHAT_PHRASE) {
            if self.chats.partner(user).await?.is_some() {
                self.end_chat(user).await?;
            }
            return Ok(());
        }

        if let Some(partner) = self.chats.partner(user).await? {
            match &kind {
                InboundKind::Text(text) => return self.transport.send_text(partner, text).await,
                InboundKind::Photo { file_ref } => {
                    return self.transport.send_photo(partner, file_ref).await;
                }
                _ => {}
            }
        }

        match state {
            Some(Step::TitleName) => self.save_title_name(user, &kind).await,
            Some(Step::Gender) => self.save_gender(user, &kind).await,
            Some(Step::Age) => self.save_age(user, &kind).await,
            Some(Step::Bio) => self.save_bio(user, &kind).await,
            Some(Step::Photo) => self.save_photo(user, &kind).await,
            Some(Step::SearchGender) => self.save_search_gender(user, &kind).await,
            Some(Step::SearchAge) => self.save_search_age(user, &kind).await,
            Some(Step::SearchLocation) => self.save_search_location(user, &kind).await,
            Some(Step::SetLocationForVisibility) | None => self.send_start_hint(user).await,
        }
    }

    async fn send_start_hint(&self, user: UserHandle) -> Result<()> {
        self.transport
            .send_text(user, &format!("Please start with {}start.", self.prefix))
            .await
    }

    pub async fn show_main_menu(&self, user: UserHandle) -> Result<()> {
        let visible = self.coordinator.reconcile(user).await?;
        self.transport
            .send_message(user, self.menu.main_menu(&self.commands, visible))
            .await
    }
}

/// Collects the collaborators of an [`UpdateHandler`].
pub struct UpdateHandlerBuilder {
    sessions: Arc<dyn SessionStore>,
    geo: Arc<dyn GeoIndex>,
    bus: Arc<dyn RequestBus>,
    profiles: Arc<dyn ProfileRepository>,
    transport: Arc<dyn ChatTransport>,
    commands: CommandTable,
    menu_style: MenuStyle,
    prefix: String,
    on_demand_radius_km: f64,
}

impl UpdateHandlerBuilder {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        geo: Arc<dyn GeoIndex>,
        bus: Arc<dyn RequestBus>,
        profiles: Arc<dyn ProfileRepository>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            sessions,
            geo,
            bus,
            profiles,
            transport,
            commands: CommandTable::standard(),
            menu_style: MenuStyle::default(),
            prefix: "/".to_string(),
            on_demand_radius_km: crate::config::DEFAULT_ON_DEMAND_RADIUS_KM,
        }
    }

    pub fn with_commands(mut self, commands: CommandTable) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_menu_style(mut self, style: MenuStyle) -> Self {
        self.menu_style = style;
        self
    }

    /// Prefix shown in front of command names in replies.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_on_demand_radius(mut self, radius_km: f64) -> Self {
        self.on_demand_radius_km = radius_km;
        self
    }

    pub fn build(self) -> UpdateHandler {
        let coordinator =
            VisibilityCoordinator::new(self.geo.clone(), self.bus, self.sessions.clone());
        UpdateHandler {
            tracker: ConversationTracker::new(self.sessions.clone()),
            chats: ChatPairing::new(self.sessions.clone()),
            cards: CardRenderer::new(self.profiles.clone(), self.transport.clone()),
            menu: self.menu_style.renderer(&self.prefix),
            sessions: self.sessions,
            geo: self.geo,
            coordinator,
            profiles: self.profiles,
            transport: self.transport,
            commands: Arc::new(self.commands),
            on_demand_radius_km: self.on_demand_radius_km,
            prefix: self.prefix,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::test_helpers::{RecordingBus, RecordingTransport};
    use crate::transport::SenderInfo;
    use crate::{MemoryGeoIndex, MemoryProfileRepository, MemorySessionStore};
    use pretty_assertions::assert_eq;

    pub(crate) struct Harness {
        pub sessions: Arc<MemorySessionStore>,
        pub geo: Arc<MemoryGeoIndex>,
        pub bus: Arc<RecordingBus>,
        pub profiles: Arc<MemoryProfileRepository>,
        pub transport: Arc<RecordingTransport>,
        pub handler: UpdateHandler,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_style(MenuStyle::Buttons)
        }

        pub fn with_style(style: MenuStyle) -> Self {
            let sessions = Arc::new(MemorySessionStore::new());
            let geo = Arc::new(MemoryGeoIndex::new());
            let bus = Arc::new(RecordingBus::new());
            let profiles = Arc::new(MemoryProfileRepository::new());
            let transport = Arc::new(RecordingTransport::new());
            let handler = UpdateHandler::builder(
                sessions.clone(),
                geo.clone(),
                bus.clone(),
                profiles.clone(),
                transport.clone(),
            )
            .with_menu_style(style)
            .build();
            Self {
                sessions,
                geo,
                bus,
                profiles,
                transport,
                handler,
            }
        }

        pub async fn command(&self, user: i64, name: &str) {
            self.handler
                .handle(
                    InboundEvent::new(
                        UserHandle(user),
                        InboundKind::Command {
                            name: name.to_string(),
                            args: String::new(),
                        },
                    )
                    .with_sender(SenderInfo {
                        username: format!("u{user}"),
                        first_name: format!("First{user}"),
                        last_name: String::new(),
                    }),
                )
                .await;
        }

        pub async fn text(&self, user: i64, text: &str) {
            self.send(user, InboundKind::Text(text.to_string())).await;
        }

        pub async fn callback(&self, user: i64, data: &str) {
            self.send(user, InboundKind::Callback(data.to_string())).await;
        }

        pub async fn send(&self, user: i64, kind: InboundKind) {
            self.handler
                .handle(InboundEvent::new(UserHandle(user), kind))
                .await;
        }

        pub async fn state(&self, user: i64) -> Option<Step> {
            ConversationTracker::new(self.sessions.clone())
                .get_state(UserHandle(user))
                .await
                .unwrap()
        }

        pub fn last_text(&self, user: i64) -> String {
            self.transport
                .last_to(UserHandle(user))
                .map(|sent| sent.text().to_string())
                .unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn idle_message_points_to_start() {
        let h = Harness::new();
        h.text(1, "hello").await;
        assert_eq!(h.last_text(1), "Please start with /start.");
    }

    #[tokio::test]
    async fn chat_messages_are_relayed() {
        let h = Harness::new();
        h.handler
            .chats
            .start(UserHandle(1), UserHandle(2))
            .await
            .unwrap();

        h.text(1, "hi there").await;
        h.send(
            1,
            InboundKind::Photo {
                file_ref: "cat.jpg".to_string(),
            },
        )
        .await;

        let sent = h.transport.sent_to(UserHandle(2));
        assert_eq!(
            sent,
            vec![
                crate::test_helpers::Sent::Text("hi there".to_string()),
                crate::test_helpers::Sent::Photo("cat.jpg".to_string()),
            ]
        );
        assert!(h.transport.sent_to(UserHandle(1)).is_empty());
    }

    #[tokio::test]
    async fn end_chat_phrase_closes_both_sides() {
        let h = Harness::new();
        h.handler
            .chats
            .start(UserHandle(1), UserHandle(2))
            .await
            .unwrap();

        h.text(2, "End chat").await;
        assert_eq!(h.sessions.get("chat:1").await.unwrap(), None);
        assert_eq!(h.sessions.get("chat:2").await.unwrap(), None);
        assert!(h.transport.saw(UserHandle(1), "ended the chat"));

        // outside a chat the phrase is ignored
        h.transport.clear();
        h.text(2, "End chat").await;
        assert_eq!(h.transport.total(), 0);
    }

    #[tokio::test]
    async fn backend_failure_becomes_retry_notice() {
        use crate::CoreError;
        use crate::error::StringError;
        use crate::session::MockSessionStore;

        let mut sessions = MockSessionStore::new();
        sessions.expect_get().returning(|key| {
            Err(CoreError::session_store(
                "get",
                key,
                StringError("connection refused".to_string()),
            ))
        });
        let transport = Arc::new(RecordingTransport::new());
        let handler = UpdateHandler::builder(
            Arc::new(sessions),
            Arc::new(MemoryGeoIndex::new()),
            Arc::new(RecordingBus::new()),
            Arc::new(MemoryProfileRepository::new()),
            transport.clone(),
        )
        .build();

        handler
            .handle(InboundEvent::new(
                UserHandle(1),
                InboundKind::Text("hello".to_string()),
            ))
            .await;
        assert_eq!(
            transport.last_to(UserHandle(1)).map(|s| s.text().to_string()),
            Some(RETRY_LATER.to_string())
        );
    }
}
