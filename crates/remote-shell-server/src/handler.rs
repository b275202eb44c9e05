//! Command handler trait and the context handlers run in.

use std::sync::Arc;

use async_trait::async_trait;
use remote_shell_core::{ChannelState, Message, RemoteError, error_kind};
use remote_shell_transport::{MessageSink, TransportError};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::command_line::CommandLine;

/// Command failure.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(String),
    #[error("{0}")]
    Failed(String),
    #[error("Command interrupted")]
    Interrupted,
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl CommandError {
    /// Convert into the failure carried by a stderr message.
    #[must_use]
    pub fn to_remote(&self) -> RemoteError {
        let kind = match self {
            Self::Usage(_) => error_kind::INVALID_COMMAND,
            Self::Interrupted => error_kind::INTERRUPTED,
            Self::Failed(_) | Self::Transport(_) => error_kind::FAILED,
        };
        RemoteError::new(kind, self.to_string())
    }
}

/// Executes one named command.
///
/// Return `Ok(Some(text))` to finish with a final stdout chunk, `Ok(None)`
/// to finish with an end-of-output sentinel, or `Err` to fail. The
/// dispatcher turns the result into the command's terminal message.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run the command.
    async fn execute(&self, ctx: CommandContext) -> Result<Option<String>, CommandError>;
}

/// Everything a running command can see and do.
pub struct CommandContext {
    /// Unique id of this execution.
    pub command_id: Uuid,
    /// Parsed command line.
    pub line: CommandLine,
    output: OutputSink,
    interrupt: InterruptSignal,
}

impl CommandContext {
    pub(crate) const fn new(
        command_id: Uuid,
        line: CommandLine,
        output: OutputSink,
        interrupt: InterruptSignal,
    ) -> Self {
        Self {
            command_id,
            line,
            output,
            interrupt,
        }
    }

    /// Command arguments, without the name.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.line.args
    }

    /// Output stream towards the client.
    #[must_use]
    pub const fn output(&self) -> &OutputSink {
        &self.output
    }

    /// Interrupt signal for cooperative cancellation.
    #[must_use]
    pub const fn interrupt(&self) -> &InterruptSignal {
        &self.interrupt
    }

    /// Send an intermediate output chunk.
    ///
    /// # Errors
    /// Returns error if the channel is gone.
    pub async fn stdout(&self, content: impl Into<String> + Send) -> Result<(), CommandError> {
        self.output.stdout(content).await
    }

    /// Report progress.
    ///
    /// # Errors
    /// Returns error if the channel is gone.
    pub async fn progress(
        &self,
        title: impl Into<String> + Send,
        progress: u64,
        whole: u64,
    ) -> Result<(), CommandError> {
        self.output.progress(title, progress, whole).await
    }

    /// Whether an interrupt was requested.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_interrupted()
    }
}

/// Non-terminal output of a running command.
#[derive(Clone)]
pub struct OutputSink {
    sink: Arc<dyn MessageSink>,
}

impl OutputSink {
    pub(crate) fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    /// Send an intermediate output chunk.
    ///
    /// # Errors
    /// Returns error if the channel is gone.
    pub async fn stdout(&self, content: impl Into<String> + Send) -> Result<(), CommandError> {
        self.sink
            .send(Message::stdout(content, ChannelState::Running))
            .await?;
        Ok(())
    }

    /// Report progress.
    ///
    /// # Errors
    /// Returns error if the channel is gone.
    pub async fn progress(
        &self,
        title: impl Into<String> + Send,
        progress: u64,
        whole: u64,
    ) -> Result<(), CommandError> {
        self.sink
            .send(Message::progress(title, progress, whole))
            .await?;
        Ok(())
    }
}

/// Cooperative interrupt flag for one command.
#[derive(Debug, Clone)]
pub struct InterruptSignal {
    rx: watch::Receiver<bool>,
}

impl InterruptSignal {
    pub(crate) const fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Whether an interrupt was requested.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once an interrupt is requested.
    ///
    /// Never resolves if the command finishes without one.
    pub async fn interrupted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|interrupted| *interrupted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Fail with [`CommandError::Interrupted`] if an interrupt was requested.
    ///
    /// # Errors
    /// Returns `Interrupted` once an interrupt was requested.
    pub fn check(&self) -> Result<(), CommandError> {
        if self.is_interrupted() {
            Err(CommandError::Interrupted)
        } else {
            Ok(())
        }
    }
}
