//! Menus and the command table behind them
//!
//! The command table is an ordinary value built once at startup and handed
//! to the update handler. How it is shown to the user is decided by a
//! [`MenuRenderer`], picked from [`MenuStyle`] in the configuration.

use crate::transport::{Button, CallbackAction, OutboundMessage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    /// Slash command name without the prefix.
    pub command: String,
    pub label: String,
    /// Button action, if the entry can be a button at all.
    pub action: Option<CallbackAction>,
}

impl MenuEntry {
    pub fn new(
        command: impl Into<String>,
        label: impl Into<String>,
        action: Option<CallbackAction>,
    ) -> Self {
        Self {
            command: command.into(),
            label: label.into(),
            action,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuSection {
    pub title: String,
    pub entries: Vec<MenuEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTable {
    pub main: MenuSection,
    pub profile: MenuSection,
}

impl CommandTable {
    pub fn standard() -> Self {
        Self {
            main: MenuSection {
                title: "Main menu".to_string(),
                entries: vec![
                    MenuEntry::new("profile", "My profile", Some(CallbackAction::Profile)),
                    MenuEntry::new("current_visibility", "Am I visible?", None),
                    MenuEntry::new(
                        "toggle_visibility",
                        "Toggle visibility",
                        Some(CallbackAction::ToggleVisibility),
                    ),
                    MenuEntry::new(
                        "search",
                        "Find people nearby",
                        Some(CallbackAction::StartSearch),
                    ),
                    MenuEntry::new("help", "Help", None),
                ],
            },
            profile: MenuSection {
                title: "Your profile".to_string(),
                entries: vec![
                    MenuEntry::new(
                        "edit_profile",
                        "Edit profile",
                        Some(CallbackAction::EditProfile),
                    ),
                    MenuEntry::new(
                        "main_menu",
                        "Back to menu",
                        Some(CallbackAction::BackToMenu),
                    ),
                ],
            },
        }
    }

    /// All commands across sections, in display order, without duplicates.
    pub fn commands(&self) -> Vec<&MenuEntry> {
        let mut seen = Vec::new();
        for entry in self.main.entries.iter().chain(&self.profile.entries) {
            if !seen.iter().any(|e: &&MenuEntry| e.command == entry.command) {
                seen.push(entry);
            }
        }
        seen
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::standard()
    }
}

pub trait MenuRenderer: Send + Sync + fmt::Debug {
    fn main_menu(&self, table: &CommandTable, visible: bool) -> OutboundMessage;

    /// `card` is the already rendered profile text.
    fn profile_menu(&self, table: &CommandTable, card: &str) -> OutboundMessage;
}

fn visibility_line(visible: bool) -> &'static str {
    if visible {
        "You are visible to people nearby."
    } else {
        "You are hidden from people nearby."
    }
}

/// Inline buttons, one per row.
#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonMenu;

impl ButtonMenu {
    fn rows(section: &MenuSection, visible: Option<bool>) -> Vec<Vec<Button>> {
        section
            .entries
            .iter()
            .filter_map(|entry| {
                let action = entry.action?;
                let label = match (action, visible) {
                    (CallbackAction::ToggleVisibility, Some(true)) => "Hide me".to_string(),
                    (CallbackAction::ToggleVisibility, Some(false)) => "Show me nearby".to_string(),
                    _ => entry.label.clone(),
                };
                Some(vec![Button::new(label, action)])
            })
            .collect()
    }
}

impl MenuRenderer for ButtonMenu {
    fn main_menu(&self, table: &CommandTable, visible: bool) -> OutboundMessage {
        OutboundMessage {
            text: format!("{}\n{}", table.main.title, visibility_line(visible)),
            buttons: Self::rows(&table.main, Some(visible)),
        }
    }

    fn profile_menu(&self, table: &CommandTable, card: &str) -> OutboundMessage {
        OutboundMessage {
            text: format!("{}\n\n{}", table.profile.title, card),
            buttons: Self::rows(&table.profile, None),
        }
    }
}

/// Plain text listing of slash commands, no buttons.
#[derive(Debug, Clone)]
pub struct CommandMenu {
    prefix: String,
}

impl CommandMenu {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn listing(&self, section: &MenuSection) -> String {
        section
            .entries
            .iter()
            .map(|entry| format!("{}{} - {}", self.prefix, entry.command, entry.label))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl MenuRenderer for CommandMenu {
    fn main_menu(&self, table: &CommandTable, visible: bool) -> OutboundMessage {
        OutboundMessage::text(format!(
            "{}\n{}\n\n{}",
            table.main.title,
            visibility_line(visible),
            self.listing(&table.main)
        ))
    }

    fn profile_menu(&self, table: &CommandTable, card: &str) -> OutboundMessage {
        OutboundMessage::text(format!(
            "{}\n\n{}\n\n{}",
            table.profile.title,
            card,
            self.listing(&table.profile)
        ))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuStyle {
    #[default]
    Buttons,
    Commands,
}

impl MenuStyle {
    pub fn renderer(self, command_prefix: &str) -> Arc<dyn MenuRenderer> {
        match self {
            MenuStyle::Buttons => Arc::new(ButtonMenu),
            MenuStyle::Commands => Arc::new(CommandMenu::new(command_prefix)),
        }
    }
}
