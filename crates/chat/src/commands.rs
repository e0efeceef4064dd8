/// Help text, shared by `/help` and `/start`.
pub const HELP_TEXT: &str = "Send a message to start talking with ChatGPT. You can use /reload at \
                             any point to clear the conversation history and start from scratch \
                             (don't worry, it won't delete the Telegram messages).";

pub const RELOAD_CONFIRMATION: &str = "Started a new conversation. Enjoy!";

pub const UNKNOWN_COMMAND_NOTICE: &str = "Unknown command. Send /help to see a list of commands.";

/// Commands advertised to the transport for autocomplete.
pub const COMMAND_DESCRIPTIONS: &[(&str, &str)] = &[
    ("help", "Show how to use the bot"),
    ("start", "Show how to use the bot"),
    ("reload", "Start a new conversation"),
];

/// A slash command received from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Start,
    Reload,
    /// Any other `/name`; carries the name without the slash.
    Unknown(String),
}

impl Command {
    /// Parse a message as a command.
    ///
    /// Returns `None` for text that does not start with `/`. Arguments after
    /// the command word and an `@botname` suffix are ignored. Names are
    /// matched case-sensitively.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.trim_start().strip_prefix('/')?;
        let word = rest.split_whitespace().next().unwrap_or_default();
        let name = word.split('@').next().unwrap_or_default();
        Some(match name {
            "help" => Self::Help,
            "start" => Self::Start,
            "reload" => Self::Reload,
            other => Self::Unknown(other.to_string()),
        })
    }

    /// Fixed reply for commands that need no agent.
    pub fn static_reply(&self) -> Option<&'static str> {
        match self {
            Self::Help | Self::Start => Some(HELP_TEXT),
            Self::Unknown(_) => Some(UNKNOWN_COMMAND_NOTICE),
            Self::Reload => None,
        }
    }
}
