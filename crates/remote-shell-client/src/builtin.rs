//! Commands handled locally, without a round trip to the server.

/// Words that end the session.
pub const QUIT_COMMANDS: [&str; 4] = ["exit", "ex", "quit", "qu"];

/// A local built-in command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltIn {
    /// End the session.
    Quit,
    /// List built-ins and remote commands.
    Help,
    /// List commands sent in this session.
    History,
    /// Clear the screen.
    Clear,
}

impl BuiltIn {
    /// Recognise a built-in from a trimmed command line.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            word if QUIT_COMMANDS.contains(&word) => Some(Self::Quit),
            "help" => Some(Self::Help),
            "history" => Some(Self::History),
            "clear" => Some(Self::Clear),
            _ => None,
        }
    }

    /// All built-ins with their usage and description, for `help`.
    #[must_use]
    pub fn descriptions() -> [(String, &'static str); 4] {
        [
            (QUIT_COMMANDS.join("|"), "End the session"),
            ("help".to_string(), "Show this help"),
            ("history".to_string(), "List commands sent in this session"),
            ("clear".to_string(), "Clear the screen"),
        ]
    }
}

/// Hint printed when the operator cancels at an idle prompt.
#[must_use]
pub fn quit_hint() -> String {
    format!(
        "Command canceled, exit use the command: {}",
        QUIT_COMMANDS.join("|")
    )
}
