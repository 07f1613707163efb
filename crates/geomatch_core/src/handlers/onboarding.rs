use super::{UpdateHandler, prompt};
use crate::profile::Gender;
use crate::transport::InboundKind;
use crate::validation::{ValidationError, parse_age, validate_bio, validate_title_name};
use crate::{Result, Step, UserHandle};

pub(super) fn text_of(kind: &InboundKind) -> Option<&str> {
    match kind {
        InboundKind::Text(text) => Some(text.as_str()),
        _ => None,
    }
}

impl UpdateHandler {
    /// Re-asks the current question, leading with what was wrong.
    pub(super) async fn reprompt(
        &self,
        user: UserHandle,
        step: Step,
        problem: Option<&ValidationError>,
    ) -> Result<()> {
        let text = match problem {
            Some(problem) => format!("{problem}. {}", prompt(step)),
            None => prompt(step).to_string(),
        };
        self.transport.send_text(user, &text).await
    }

    async fn advance(&self, user: UserHandle) -> Result<()> {
        match self.tracker.next_step(user).await? {
            Some(next) => self.transport.send_text(user, prompt(next)).await,
            None => Ok(()),
        }
    }

    pub(super) async fn save_title_name(&self, user: UserHandle, kind: &InboundKind) -> Result<()> {
        let Some(text) = text_of(kind) else {
            return self.reprompt(user, Step::TitleName, None).await;
        };
        match validate_title_name(text) {
            Ok(name) => {
                self.profiles.update_title_name(user, &name).await?;
                self.advance(user).await
            }
            Err(e) => self.reprompt(user, Step::TitleName, Some(&e)).await,
        }
    }

    pub(super) async fn save_gender(&self, user: UserHandle, kind: &InboundKind) -> Result<()> {
        let Some(text) = text_of(kind) else {
            return self.reprompt(user, Step::Gender, None).await;
        };
        match Gender::parse(text) {
            Ok(gender) => {
                self.profiles.update_gender(user, gender).await?;
                self.advance(user).await
            }
            Err(e) => self.reprompt(user, Step::Gender, Some(&e)).await,
        }
    }

    pub(super) async fn save_age(&self, user: UserHandle, kind: &InboundKind) -> Result<()> {
        let Some(text) = text_of(kind) else {
            return self.reprompt(user, Step::Age, None).await;
        };
        match parse_age(text) {
            Ok(age) => {
                self.profiles.update_age(user, age).await?;
                self.advance(user).await
            }
            Err(e) => self.reprompt(user, Step::Age, Some(&e)).await,
        }
    }

    pub(super) async fn save_bio(&self, user: UserHandle, kind: &InboundKind) -> Result<()> {
        let Some(text) = text_of(kind) else {
            return self.reprompt(user, Step::Bio, None).await;
        };
        match validate_bio(text) {
            Ok(bio) => {
                self.profiles.update_bio(user, &bio).await?;
                self.advance(user).await
            }
            Err(e) => self.reprompt(user, Step::Bio, Some(&e)).await,
        }
    }

    pub(super) async fn save_photo(&self, user: UserHandle, kind: &InboundKind) -> Result<()> {
        let InboundKind::Photo { file_ref } = kind else {
            return self.reprompt(user, Step::Photo, None).await;
        };
        self.profiles.add_photo_for_user(user, file_ref).await?;
        self.profiles.mark_profile_complete(user).await?;
        self.tracker.clear_state(user).await?;
        tracing::info!("Profile for {} is complete", user);
        self.transport
            .send_text(user, "Your profile is ready.")
            .await?;
        self.show_main_menu(user).await
    }
}
