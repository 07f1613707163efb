//! Chat platform boundary
//!
//! The core only depends on the shapes in this module. A platform adapter
//! turns its native updates into [`InboundEvent`]s and implements
//! [`ChatTransport`] for the way back.

use crate::{Coordinate, Result, UserHandle};
use async_trait::async_trait;
use std::fmt;

/// Typed form of the callback strings attached to buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackAction {
    Profile,
    EditProfile,
    BackToMenu,
    StartSearch,
    SearchNext,
    ToggleVisibility,
    EndChat,
    Connect(UserHandle),
    Accept(UserHandle),
    Decline(UserHandle),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<CallbackAction> {
        let data = data.trim();
        let simple = match data {
            "profile" => Some(CallbackAction::Profile),
            "edit_profile" => Some(CallbackAction::EditProfile),
            "back_to_menu" => Some(CallbackAction::BackToMenu),
            "start_search" => Some(CallbackAction::StartSearch),
            "search_next" => Some(CallbackAction::SearchNext),
            "toggle_visibility" => Some(CallbackAction::ToggleVisibility),
            "end_chat" => Some(CallbackAction::EndChat),
            _ => None,
        };
        if simple.is_some() {
            return simple;
        }

        let (verb, target) = data.split_once('_')?;
        let target = target.parse::<UserHandle>().ok()?;
        match verb {
            "connect" => Some(CallbackAction::Connect(target)),
            "accept" => Some(CallbackAction::Accept(target)),
            "decline" => Some(CallbackAction::Decline(target)),
            _ => None,
        }
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::Profile => f.write_str("profile"),
            CallbackAction::EditProfile => f.write_str("edit_profile"),
            CallbackAction::BackToMenu => f.write_str("back_to_menu"),
            CallbackAction::StartSearch => f.write_str("start_search"),
            CallbackAction::SearchNext => f.write_str("search_next"),
            CallbackAction::ToggleVisibility => f.write_str("toggle_visibility"),
            CallbackAction::EndChat => f.write_str("end_chat"),
            CallbackAction::Connect(user) => write!(f, "connect_{user}"),
            CallbackAction::Accept(user) => write!(f, "accept_{user}"),
            CallbackAction::Decline(user) => write!(f, "decline_{user}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: CallbackAction,
}

impl Button {
    pub fn new(label: impl Into<String>, action: CallbackAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Text plus optional rows of action buttons.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundMessage {
    pub text: String,
    pub buttons: Vec<Vec<Button>>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        if !row.is_empty() {
            self.buttons.push(row);
        }
        self
    }

    pub fn with_button(self, label: impl Into<String>, action: CallbackAction) -> Self {
        self.with_row(vec![Button::new(label, action)])
    }

    pub fn actions(&self) -> impl Iterator<Item = CallbackAction> + '_ {
        self.buttons.iter().flatten().map(|b| b.action)
    }
}

/// Display details the platform knows about the sender.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SenderInfo {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundKind {
    Command { name: String, args: String },
    Text(String),
    Location(Coordinate),
    Photo { file_ref: String },
    Callback(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub user: UserHandle,
    pub sender: SenderInfo,
    pub kind: InboundKind,
}

impl InboundEvent {
    pub fn new(user: UserHandle, kind: InboundKind) -> Self {
        Self {
            user,
            sender: SenderInfo::default(),
            kind,
        }
    }

    pub fn with_sender(mut self, sender: SenderInfo) -> Self {
        self.sender = sender;
        self
    }
}

/// Outbound side of the chat platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync + fmt::Debug {
    async fn send_text(&self, user: UserHandle, text: &str) -> Result<()>;

    /// `file_ref` is whatever the platform handed us for the photo.
    async fn send_photo(&self, user: UserHandle, file_ref: &str) -> Result<()>;

    async fn send_message(&self, user: UserHandle, message: OutboundMessage) -> Result<()>;
}
