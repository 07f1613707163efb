use super::{END_CHAT_PHRASE, UpdateHandler};
use crate::transport::{CallbackAction, OutboundMessage};
use crate::{Result, UserHandle};

impl UpdateHandler {
    /// Sends the requester's card to `target` with accept/decline actions.
    pub(super) async fn connect(&self, requester: UserHandle, target: UserHandle) -> Result<()> {
        if requester == target {
            return self
                .transport
                .send_text(requester, "That's your own profile.")
                .await;
        }
        if self.profiles.get_user_by_handle(requester).await?.is_none() {
            return self.send_start_hint(requester).await;
        }
        self.cards.present_request(target, requester).await?;
        tracing::info!("{} asked to chat with {}", requester, target);
        self.transport
            .send_text(
                requester,
                "Request sent. We'll let you know if they accept.",
            )
            .await
    }

    pub(super) async fn accept(&self, user: UserHandle, requester: UserHandle) -> Result<()> {
        if self.chats.partner(user).await?.is_some() {
            return self
                .transport
                .send_text(user, "Finish your current chat first.")
                .await;
        }
        if self.chats.partner(requester).await?.is_some() {
            return self
                .transport
                .send_text(user, "They are already chatting with someone else.")
                .await;
        }

        self.chats.start(user, requester).await?;
        tracing::info!("Chat started between {} and {}", user, requester);
        for member in [user, requester] {
            let message = OutboundMessage::text(
                "You're connected. Anything you send here goes to your match.",
            )
            .with_button(END_CHAT_PHRASE, CallbackAction::EndChat);
            self.transport.send_message(member, message).await?;
        }
        Ok(())
    }

    pub(super) async fn decline(&self, user: UserHandle, requester: UserHandle) -> Result<()> {
        tracing::debug!("{} declined {}", user, requester);
        self.transport
            .send_text(user, "You declined the request.")
            .await?;
        self.transport
            .send_text(requester, "Your chat request was declined.")
            .await
    }

    pub(super) async fn end_chat(&self, user: UserHandle) -> Result<()> {
        match self.chats.end(user).await? {
            Some(partner) => {
                self.transport
                    .send_text(user, "You ended the chat.")
                    .await?;
                self.transport
                    .send_text(partner, "Your match ended the chat.")
                    .await
            }
            None => {
                self.transport
                    .send_text(user, "You're not in a chat right now.")
                    .await
            }
        }
    }
}
