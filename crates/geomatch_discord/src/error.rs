use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DiscordError {
    #[error("Failed to build the Discord client")]
    #[diagnostic(
        code(geomatch::discord::client_build_failed),
        help("Check that your Discord bot token is valid and has not been regenerated")
    )]
    ClientBuildFailed {
        #[source]
        cause: serenity::Error,
    },

    #[error("Gateway connection lost")]
    #[diagnostic(
        code(geomatch::discord::gateway_connection_lost),
        help("The bot stopped receiving events from Discord")
    )]
    GatewayConnectionLost {
        #[source]
        cause: serenity::Error,
    },

    #[error("Message send failed")]
    #[diagnostic(
        code(geomatch::discord::message_send_failed),
        help("Failed to send message to {destination}")
    )]
    MessageSendFailed {
        destination: String,
        message_length: usize,
        #[source]
        cause: serenity::Error,
    },

    #[error("Interaction failed")]
    #[diagnostic(
        code(geomatch::discord::interaction_failed),
        help("Failed to acknowledge {interaction_type} interaction {interaction_id} from {user_id}")
    )]
    InteractionFailed {
        interaction_type: String,
        interaction_id: String,
        user_id: String,
        #[source]
        cause: serenity::Error,
    },

    #[error("Invalid command syntax")]
    #[diagnostic(
        code(geomatch::discord::invalid_command_syntax),
        help("Usage: {expected_format}")
    )]
    InvalidCommandSyntax {
        command: String,
        reason: String,
        expected_format: String,
    },

    #[error("User handle {handle} is not a Discord user id")]
    #[diagnostic(
        code(geomatch::discord::invalid_user_handle),
        help("Discord user ids are positive integers")
    )]
    InvalidUserHandle { handle: i64 },

    #[error("Invalid bot configuration")]
    #[diagnostic(
        code(geomatch::discord::invalid_bot_config),
        help("Bot configuration error: {issues}")
    )]
    InvalidBotConfiguration { issues: String },
}

pub type Result<T> = std::result::Result<T, DiscordError>;

#[cfg(test)]
mod tests {
    use super::*;
    use miette::Report;

    #[test]
    fn syntax_error_shows_usage() {
        let error = DiscordError::InvalidCommandSyntax {
            command: "location".to_string(),
            reason: "expected two numbers".to_string(),
            expected_format: "!location <lat> <lon>".to_string(),
        };
        let output = format!("{:?}", Report::new(error));
        assert!(output.contains("invalid_command_syntax"));
        assert!(output.contains("!location <lat> <lon>"));
    }

    #[test]
    fn send_failure_names_destination() {
        let error = DiscordError::MessageSendFailed {
            destination: "4242".to_string(),
            message_length: 31,
            cause: serenity::Error::Other("dm channel closed"),
        };
        let output = format!("{:?}", Report::new(error));
        assert!(output.contains("message_send_failed"));
        assert!(output.contains("Failed to send message to 4242"));
        assert!(output.contains("dm channel closed"));
    }
}
