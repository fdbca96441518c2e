//! Slash command parsing for the chat application.
//!
//! Input starting with `/` controls the session and is never sent to the
//! assistant.

use crate::FeedbackType;

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Clear the conversation.
    Clear,

    /// Switch the premium model on or off.
    Premium(bool),

    /// Unlock the premium model for this persona.
    Unlock,

    /// Rate the latest answer.
    Feedback(FeedbackType),

    /// Publish the conversation.
    Share,

    /// Replace the conversation with a shared one.
    Open(String),

    /// Attach a document's text to the next question.
    Attach(String),

    /// List sources cited by the latest answer.
    Sources,

    /// Show the session identifier and flags.
    Session,

    /// Repair the conversation after an interrupted answer.
    Recover,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent as a question.
///
/// # Examples
///
/// ```
/// # use mecenas::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/feedback +").is_some());
/// assert!(parse_command("Jaki jest okres wypowiedzenia?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" => ChatCommand::Clear,
        "premium" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Premium(value),
            None => ChatCommand::Invalid("/premium expects 'on' or 'off'".to_string()),
        },
        "unlock" => ChatCommand::Unlock,
        "feedback" | "rate" => match argument.map(str::parse::<FeedbackType>) {
            Some(Ok(kind)) => ChatCommand::Feedback(kind),
            Some(Err(err)) => ChatCommand::Invalid(format!("/feedback: {err}")),
            None => ChatCommand::Invalid("/feedback expects '+' or '-'".to_string()),
        },
        "share" => ChatCommand::Share,
        "open" => match argument {
            Some(id) => ChatCommand::Open(id.to_string()),
            None => ChatCommand::Invalid("/open requires a share id".to_string()),
        },
        "attach" => match argument {
            Some(path) => ChatCommand::Attach(path.to_string()),
            None => ChatCommand::Invalid("/attach requires a file path".to_string()),
        },
        "sources" => ChatCommand::Sources,
        "session" => ChatCommand::Session,
        "recover" | "reset" => ChatCommand::Recover,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /clear                 Clear the conversation
  /premium on|off        Use the premium model (requires /unlock)
  /unlock                Unlock the premium model
  /feedback +|-          Rate the latest answer
  /share                 Publish the conversation and print its id
  /open <id>             Load a shared conversation
  /attach <file>         Attach a document to the next question
  /sources               List sources cited by the latest answer
  /session               Show the session id and flags
  /recover               Repair the conversation after an interrupted answer
  /help                  Show this help message
  /quit                  Exit the chat"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn test_parse_clear() {
        assert_eq!(parse_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/CLEAR"), Some(ChatCommand::Clear));
    }

    #[test]
    fn test_parse_premium_toggle() {
        assert_eq!(parse_command("/premium on"), Some(ChatCommand::Premium(true)));
        assert_eq!(parse_command("/premium off"), Some(ChatCommand::Premium(false)));
        assert!(matches!(
            parse_command("/premium maybe"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("expects")
        ));
        assert_eq!(parse_command("/unlock"), Some(ChatCommand::Unlock));
    }

    #[test]
    fn test_parse_feedback() {
        assert_eq!(
            parse_command("/feedback +"),
            Some(ChatCommand::Feedback(FeedbackType::Positive))
        );
        assert_eq!(
            parse_command("/rate down"),
            Some(ChatCommand::Feedback(FeedbackType::Negative))
        );
        assert!(matches!(
            parse_command("/feedback"),
            Some(ChatCommand::Invalid(_))
        ));
        assert!(matches!(
            parse_command("/feedback meh"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("meh")
        ));
    }

    #[test]
    fn test_parse_share_and_open() {
        assert_eq!(parse_command("/share"), Some(ChatCommand::Share));
        assert_eq!(
            parse_command("/open  abc123 "),
            Some(ChatCommand::Open("abc123".to_string()))
        );
        assert_eq!(
            parse_command("/open"),
            Some(ChatCommand::Invalid("/open requires a share id".to_string()))
        );
    }

    #[test]
    fn test_parse_attach() {
        assert_eq!(
            parse_command("/attach umowa.txt"),
            Some(ChatCommand::Attach("umowa.txt".to_string()))
        );
    }

    #[test]
    fn test_parse_session_commands() {
        assert_eq!(parse_command("/sources"), Some(ChatCommand::Sources));
        assert_eq!(parse_command("/session"), Some(ChatCommand::Session));
        assert_eq!(parse_command("/recover"), Some(ChatCommand::Recover));
        assert_eq!(parse_command("/reset"), Some(ChatCommand::Recover));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_command("/model x"),
            Some(ChatCommand::Invalid("Unknown command: /model".to_string()))
        );
    }

    #[test]
    fn test_non_commands() {
        assert_eq!(parse_command("Czy pracodawca może mnie zwolnić?"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn test_help_text_not_empty() {
        let help = help_text();
        assert!(help.contains("/quit"));
        assert!(help.contains("/clear"));
        assert!(help.contains("/feedback"));
        assert!(help.contains("/recover"));
    }
}
