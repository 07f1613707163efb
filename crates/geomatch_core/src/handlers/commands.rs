use super::{UpdateHandler, prompt};
use crate::coordinator::ToggleOutcome;
use crate::profile::NewUser;
use crate::render::profile_card;
use crate::transport::SenderInfo;
use crate::{Result, SessionKey, Step, UserHandle};

pub(super) const VISIBILITY_ON: &str = "Visibility is on. People nearby can now find you.";
pub(super) const VISIBILITY_OFF: &str = "Visibility is off. You no longer show up in searches.";

impl UpdateHandler {
    pub(super) async fn handle_command(
        &self,
        user: UserHandle,
        sender: &SenderInfo,
        name: &str,
    ) -> Result<()> {
        match name {
            "start" => self.start(user, sender).await,
            "profile" => self.show_profile(user).await,
            "main_menu" => self.show_main_menu(user).await,
            "current_visibility" => self.current_visibility(user).await,
            "toggle_visibility" => self.toggle_visibility(user).await,
            "search" => self.start_search_filters(user).await,
            "help" => self.help(user).await,
            "edit_profile" => self.edit_profile(user).await,
            "cancel" => self.cancel(user).await,
            "end_chat" => self.end_chat(user).await,
            other => {
                tracing::debug!("Unknown command '{}' from {}", other, user);
                self.transport
                    .send_text(
                        user,
                        &format!("Unknown command. Try {}start.", self.prefix),
                    )
                    .await
            }
        }
    }

    async fn start(&self, user: UserHandle, sender: &SenderInfo) -> Result<()> {
        match self.profiles.get_user_by_handle(user).await? {
            None => {
                self.profiles
                    .create_user(NewUser {
                        handle: user,
                        username: sender.username.clone(),
                        first_name: sender.first_name.clone(),
                        last_name: sender.last_name.clone(),
                    })
                    .await?;
                self.sessions
                    .set(&SessionKey::Visibility(user).to_string(), "false")
                    .await?;
                self.tracker.set_state(user, Step::TitleName).await?;
                tracing::info!("Created profile for {}", user);
                self.transport
                    .send_text(user, &format!("Welcome! {}", prompt(Step::TitleName)))
                    .await
            }
            Some(profile) if !profile.profile_complete => {
                self.tracker.set_state(user, Step::TitleName).await?;
                self.transport
                    .send_text(
                        user,
                        &format!(
                            "Let's finish your profile first. {}",
                            prompt(Step::TitleName)
                        ),
                    )
                    .await
            }
            Some(_) => self.show_main_menu(user).await,
        }
    }

    pub(super) async fn show_profile(&self, user: UserHandle) -> Result<()> {
        let Some(profile) = self.profiles.get_user_by_handle(user).await? else {
            return self.send_start_hint(user).await;
        };
        if let Some(photo) = self.profiles.get_user_photo(user).await? {
            self.transport.send_photo(user, &photo.file_ref).await?;
        }
        let message = self
            .menu
            .profile_menu(&self.commands, &profile_card(&profile));
        self.transport.send_message(user, message).await
    }

    async fn current_visibility(&self, user: UserHandle) -> Result<()> {
        let status = if self.coordinator.reconcile(user).await? {
            "Your profile is visible and shows up in searches."
        } else {
            "Your profile is hidden and does not show up in searches."
        };
        self.transport
            .send_text(
                user,
                &format!(
                    "{status}\nUse {}toggle_visibility to switch.",
                    self.prefix
                ),
            )
            .await
    }

    pub(super) async fn toggle_visibility(&self, user: UserHandle) -> Result<()> {
        let reply = match self.coordinator.toggle_visibility(user).await? {
            ToggleOutcome::Enabled(_) => VISIBILITY_ON,
            ToggleOutcome::LocationRequired => prompt(Step::SetLocationForVisibility),
            ToggleOutcome::Disabled => VISIBILITY_OFF,
        };
        self.transport.send_text(user, reply).await
    }

    async fn help(&self, user: UserHandle) -> Result<()> {
        let mut lines: Vec<String> = self
            .commands
            .commands()
            .into_iter()
            .map(|entry| format!("{}{} - {}", self.prefix, entry.command, entry.label))
            .collect();
        lines.push(format!("{}cancel - Stop the current question", self.prefix));
        lines.push(format!("{}end_chat - Leave the current chat", self.prefix));
        self.transport.send_text(user, &lines.join("\n")).await
    }

    /// Walks the onboarding questions again, overwriting each answer.
    pub(super) async fn edit_profile(&self, user: UserHandle) -> Result<()> {
        if self.profiles.get_user_by_handle(user).await?.is_none() {
            return self.send_start_hint(user).await;
        }
        self.tracker.set_state(user, Step::TitleName).await?;
        self.transport
            .send_text(
                user,
                &format!("Let's update your profile. {}", prompt(Step::TitleName)),
            )
            .await
    }

    async fn cancel(&self, user: UserHandle) -> Result<()> {
        let Some(step) = self.tracker.get_state(user).await? else {
            return self.transport.send_text(user, "Nothing to cancel.").await;
        };
        self.tracker.clear_state(user).await?;
        tracing::debug!("User {} cancelled at {}", user, step);
        self.transport.send_text(user, "Cancelled.").await
    }
}
