use super::UpdateHandler;
use crate::transport::CallbackAction;
use crate::{Result, UserHandle};

impl UpdateHandler {
    pub(super) async fn handle_callback(&self, user: UserHandle, data: &str) -> Result<()> {
        let Some(action) = CallbackAction::parse(data) else {
            tracing::warn!("Unrecognised callback '{}' from {}", data, user);
            return self.transport.send_text(user, "Unknown action.").await;
        };

        match action {
            CallbackAction::Profile => self.show_profile(user).await,
            CallbackAction::EditProfile => self.edit_profile(user).await,
            CallbackAction::BackToMenu => self.show_main_menu(user).await,
            CallbackAction::StartSearch => self.start_search_at_location(user).await,
            CallbackAction::SearchNext => self.search_next_user(user).await,
            CallbackAction::ToggleVisibility => self.toggle_visibility(user).await,
            CallbackAction::EndChat => self.end_chat(user).await,
            CallbackAction::Connect(target) => self.connect(user, target).await,
            CallbackAction::Accept(requester) => self.accept(user, requester).await,
            CallbackAction::Decline(requester) => self.decline(user, requester).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::handlers::tests::Harness;
    use crate::test_helpers::Sent;
    use crate::transport::CallbackAction;
    use crate::{Step, UserHandle};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn garbage_callback_is_reported() {
        let h = Harness::new();
        h.callback(1, "connect_nobody").await;
        assert_eq!(h.last_text(1), "Unknown action.");
        assert!(logs_contain("Unrecognised callback"));
    }

    #[tokio::test]
    async fn start_search_skips_filters() {
        let h = Harness::new();
        h.callback(1, "start_search").await;
        assert_eq!(h.state(1).await, Some(Step::SearchLocation));
    }

    #[tokio::test]
    async fn back_to_menu_renders_buttons() {
        let h = Harness::new();
        h.callback(1, "back_to_menu").await;
        let Some(Sent::Message(menu)) = h.transport.last_to(UserHandle(1)) else {
            panic!("expected the main menu");
        };
        assert!(menu.actions().any(|a| a == CallbackAction::ToggleVisibility));
    }
}
