//! Protocol messages exchanged over a shell channel.

use serde::{Deserialize, Serialize};

/// Lifecycle position of a [`Message::Stdout`] chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// First chunk of a command's output.
    New,
    /// Intermediate chunk.
    Running,
    /// Final chunk.
    Completed,
}

impl ChannelState {
    /// Whether a stdout chunk in this state releases the client prompt.
    #[must_use]
    pub const fn wakes_prompt(self) -> bool {
        matches!(self, Self::New | Self::Completed)
    }
}

/// Description of a command the server can execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    /// Command name, the first word of a command line.
    pub name: String,
    /// One-line description.
    #[serde(default)]
    pub description: String,
    /// Usage string, e.g. `sleep <millis>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    /// Ask the operator before honouring a graceful interrupt.
    #[serde(default)]
    pub confirm_interrupt: bool,
}

impl CommandDescriptor {
    /// Create a descriptor with a name and description.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            usage: None,
            confirm_interrupt: false,
        }
    }

    /// Set the usage string.
    #[must_use]
    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    /// Require operator confirmation for graceful interrupts.
    #[must_use]
    pub const fn confirm_interrupt(mut self) -> Self {
        self.confirm_interrupt = true;
        self
    }
}

/// Well-known failure kinds carried by [`RemoteError`].
pub mod error_kind {
    /// No handler is registered under the command name.
    pub const COMMAND_NOT_FOUND: &str = "command_not_found";
    /// The command line could not be parsed.
    pub const INVALID_COMMAND: &str = "invalid_command";
    /// Another command is still in flight on the session.
    pub const BUSY: &str = "busy";
    /// The command was cancelled by an interrupt.
    pub const INTERRUPTED: &str = "interrupted";
    /// The command ran and failed.
    pub const FAILED: &str = "failed";
}

/// Structured failure of a remote command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// Machine-readable failure kind, see [`error_kind`].
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// Optional extended detail (cause chain, backtrace).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RemoteError {
    /// Create a new remote error.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            detail: None,
        }
    }

    /// Attach extended detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A protocol message.
///
/// Client-bound and server-bound kinds share one enum so both ends speak the
/// same closed set; each end ignores kinds that only make sense for its peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Server command catalogue.
    Meta {
        registered_methods: Vec<CommandDescriptor>,
    },
    /// Command line to execute (client to server).
    Command { line: String },
    /// One chunk of normal output.
    Stdout { content: String, state: ChannelState },
    /// Terminal failure of the in-flight command.
    Stderr { error: RemoteError },
    /// Advisory progress report.
    Progress {
        title: String,
        progress: u64,
        whole: u64,
    },
    /// Begin-of-output sentinel.
    BofStdout,
    /// End-of-output sentinel.
    EofStdout,
    /// Server asks the operator to confirm an interrupt.
    AskInterrupt { subject: String },
    /// Operator's answer to [`Message::AskInterrupt`].
    ConfirmInterrupt { confirmed: bool },
    /// Cancellation request for the running command (client to server).
    Interrupt { graceful: bool },
}

impl Message {
    /// Create a command-payload message.
    #[must_use]
    pub fn command(line: impl Into<String>) -> Self {
        Self::Command { line: line.into() }
    }

    /// Create a stdout chunk.
    #[must_use]
    pub fn stdout(content: impl Into<String>, state: ChannelState) -> Self {
        Self::Stdout {
            content: content.into(),
            state,
        }
    }

    /// Create a stderr message.
    #[must_use]
    pub const fn stderr(error: RemoteError) -> Self {
        Self::Stderr { error }
    }

    /// Create a progress message.
    #[must_use]
    pub fn progress(title: impl Into<String>, progress: u64, whole: u64) -> Self {
        Self::Progress {
            title: title.into(),
            progress,
            whole,
        }
    }

    /// Whether this message ends a command's lifecycle.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Stderr { .. }
                | Self::EofStdout
                | Self::Stdout {
                    state: ChannelState::Completed,
                    ..
                }
        )
    }

    /// Short kind name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Meta { .. } => "meta",
            Self::Command { .. } => "command",
            Self::Stdout { .. } => "stdout",
            Self::Stderr { .. } => "stderr",
            Self::Progress { .. } => "progress",
            Self::BofStdout => "bof_stdout",
            Self::EofStdout => "eof_stdout",
            Self::AskInterrupt { .. } => "ask_interrupt",
            Self::ConfirmInterrupt { .. } => "confirm_interrupt",
            Self::Interrupt { .. } => "interrupt",
        }
    }
}
