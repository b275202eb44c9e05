//! Interactive client session controller.
//!
//! Two loops share one [`ShellClient`]: the input loop ([`ShellClient::run_loop`])
//! blocks on the line editor, the inbound loop ([`ShellClient::run_inbound`])
//! blocks on the channel. They meet at the completion tracker and, for
//! interrupt confirmation, at the line rendezvous.

use std::sync::{
    Arc, Mutex, PoisonError, RwLock,
    atomic::{AtomicBool, Ordering},
};

use remote_shell_core::{CommandCatalogue, Message};
use remote_shell_transport::{MessageSink, MessageSource, TransportError};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    builtin::{self, BuiltIn},
    completion::CompletionTracker,
    config::ClientConfig,
    editor::{LineEditor, ReadLineError},
    render,
    rendezvous::{LineRendezvous, parse_confirmation},
};

/// Client session error.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Shell session already running")]
    AlreadyRunning,
    #[error("A command is still in flight")]
    CommandInFlight,
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Line editor error: {0}")]
    ReadLine(#[from] ReadLineError),
    #[error("Input task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ClientError {
    /// Whether the session cannot continue after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Output handed to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// A protocol message from the server.
    Remote(Message),
    /// Already-resolved local output (built-in commands).
    Local(String),
}

impl From<Message> for Output {
    fn from(message: Message) -> Self {
        Self::Remote(message)
    }
}

/// Effect of one piece of output on the in-flight command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    /// Keep the prompt suppressed.
    Keep,
    /// Release the prompt; the command may still be running.
    Prompt,
    /// The command's terminal message.
    Terminal,
}

/// What the input loop does after an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Client side of one shell session.
pub struct ShellClient<E: LineEditor> {
    id: Uuid,
    editor: Arc<E>,
    sink: Arc<dyn MessageSink>,
    config: ClientConfig,
    running: AtomicBool,
    completion: CompletionTracker,
    rendezvous: LineRendezvous,
    catalogue: RwLock<CommandCatalogue>,
    history: Mutex<Vec<String>>,
    shutdown: watch::Sender<bool>,
}

impl<E: LineEditor> ShellClient<E> {
    /// Create a session that reads from `editor` and sends through `sink`.
    pub fn new(editor: E, sink: impl MessageSink + 'static, config: ClientConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            editor: Arc::new(editor),
            sink: Arc::new(sink),
            completion: CompletionTracker::new(config.timeout),
            config,
            running: AtomicBool::new(false),
            rendezvous: LineRendezvous::new(),
            catalogue: RwLock::new(CommandCatalogue::new()),
            history: Mutex::new(Vec::new()),
            shutdown,
        }
    }

    /// Session identifier, for log correlation.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Completion tracker for the in-flight command.
    #[must_use]
    pub const fn completion(&self) -> &CompletionTracker {
        &self.completion
    }

    /// Snapshot of the merged remote command catalogue.
    #[must_use]
    pub fn catalogue(&self) -> CommandCatalogue {
        self.catalogue
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Commands sent in this session, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a new command may be sent.
    ///
    /// True once the last command's terminal message arrived, or once the
    /// configured timeout has elapsed since it was sent.
    #[must_use]
    pub fn is_last_completed(&self) -> bool {
        self.completion.is_completed()
    }

    /// Whether the session has been shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// End both loops.
    ///
    /// The inbound loop stops at once; the input loop stops after the
    /// read it is blocked in returns.
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            tracing::info!(session = %self.id, "Shell session shutting down");
        }
    }

    /// Drive the input loop until quit, end of input, shutdown or a fatal
    /// transport error.
    ///
    /// # Errors
    /// Returns `AlreadyRunning` without side effects if the loop was started
    /// before, or the fatal transport error that ended the session.
    pub async fn run_loop(&self) -> Result<(), ClientError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(session = %self.id, "Rejected second start of shell loop");
            return Err(ClientError::AlreadyRunning);
        }
        tracing::info!(session = %self.id, "Shell session started");

        while !self.is_shutdown() {
            match self.step().await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(e) if e.is_fatal() => {
                    tracing::error!(session = %self.id, "Shell session failed: {e}");
                    self.shutdown();
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(session = %self.id, "Shell iteration failed: {e}");
                    self.editor.print(&format!("Error: {e}"));
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Drive the inbound loop until shutdown or a fatal transport error.
    ///
    /// Undecodable messages are logged and skipped.
    ///
    /// # Errors
    /// Returns the fatal transport error that ended the session.
    pub async fn run_inbound<S: MessageSource>(&self, mut source: S) -> Result<(), ClientError> {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            let received = tokio::select! {
                () = stopped(&mut shutdown) => return Ok(()),
                received = source.receive() => received,
            };

            let result = match received {
                Ok(message) => self.on_inbound(message).await,
                Err(e) if e.is_fatal() => Err(e.into()),
                Err(e) => {
                    tracing::warn!(session = %self.id, "Ignoring inbound message: {e}");
                    continue;
                }
            };

            match result {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    tracing::error!(session = %self.id, "Channel lost: {e}");
                    self.shutdown();
                    return Err(e);
                }
                Err(e) => tracing::warn!(session = %self.id, "Inbound handling failed: {e}"),
            }
        }
    }

    /// Send a command and wait for it to complete, without the input loop.
    ///
    /// Returns true once the command's terminal message (or a `NEW` chunk)
    /// arrived, false if the timeout elapsed first. Catalogue updates and
    /// local output do not end the wait. Output is rendered by the inbound
    /// loop.
    ///
    /// # Errors
    /// Returns `CommandInFlight` if another command is still running, or a
    /// transport error if the command cannot be sent.
    pub async fn execute(&self, line: &str) -> Result<bool, ClientError> {
        if !self.is_last_completed() {
            return Err(ClientError::CommandInFlight);
        }
        self.send_command(line.trim()).await?;
        Ok(self.completion.wait().await)
    }

    /// Handle one piece of output.
    ///
    /// Terminal messages, metadata and local output release the prompt;
    /// progress, sentinels and intermediate chunks do not. Only terminal
    /// messages end an [`execute`](Self::execute) wait.
    ///
    /// # Errors
    /// Returns a transport error if an interrupt confirmation cannot be sent.
    pub async fn on_inbound(&self, output: impl Into<Output>) -> Result<(), ClientError> {
        let wake = match output.into() {
            Output::Local(text) => {
                self.editor.print(&text);
                Wake::Prompt
            }
            Output::Remote(message) => self.on_message(message).await?,
        };

        let released = match wake {
            Wake::Keep => false,
            Wake::Prompt => self.completion.wake(),
            Wake::Terminal => self.completion.settle(),
        };
        if released {
            tracing::debug!(session = %self.id, "Command completed");
        }
        Ok(())
    }

    async fn on_message(&self, message: Message) -> Result<Wake, ClientError> {
        let kind = message.kind();
        tracing::trace!(session = %self.id, kind, "Inbound message");

        let wake = match message {
            Message::Meta { registered_methods } => {
                let changed = self
                    .catalogue
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .merge(registered_methods);
                tracing::debug!(session = %self.id, changed, "Merged remote command catalogue");
                Wake::Prompt
            }
            Message::Stderr { error } => {
                self.editor
                    .print(&render::remote_error(&error, self.config.show_error_detail));
                Wake::Terminal
            }
            Message::Progress {
                title,
                progress,
                whole,
            } => {
                self.editor.print(&render::progress_bar(
                    &title,
                    progress,
                    whole,
                    render::PROGRESS_WIDTH,
                    '=',
                ));
                Wake::Keep
            }
            Message::AskInterrupt { subject } => {
                self.confirm_interrupt(&subject).await?;
                Wake::Keep
            }
            Message::BofStdout => Wake::Keep,
            Message::EofStdout => Wake::Terminal,
            Message::Stdout { content, state } => {
                self.editor.print(&content);
                if state.wakes_prompt() {
                    Wake::Terminal
                } else {
                    Wake::Keep
                }
            }
            Message::Command { .. } | Message::ConfirmInterrupt { .. } | Message::Interrupt { .. } => {
                tracing::debug!(session = %self.id, kind, "Ignoring server-bound message");
                Wake::Keep
            }
        };

        Ok(wake)
    }

    async fn confirm_interrupt(&self, subject: &str) -> Result<(), ClientError> {
        let next_line = self.rendezvous.subscribe();
        self.editor.print_above(subject);

        let answer = next_line.wait(self.config.timeout).await;
        if answer.is_none() {
            tracing::debug!(session = %self.id, "No interrupt confirmation before timeout");
        }

        let confirmed = parse_confirmation(answer.as_deref());
        tracing::info!(session = %self.id, confirmed, "Answering interrupt confirmation");
        self.sink
            .send(Message::ConfirmInterrupt { confirmed })
            .await?;
        Ok(())
    }

    async fn step(&self) -> Result<Flow, ClientError> {
        let prompt = if self.is_last_completed() {
            self.config.prompt.clone()
        } else {
            String::new()
        };

        let editor = Arc::clone(&self.editor);
        let read = tokio::task::spawn_blocking(move || editor.read_line(&prompt)).await?;

        match read {
            Ok(line) => {
                self.rendezvous.notify(&line);
                self.submit(&line).await
            }
            Err(ReadLineError::Interrupted) => {
                self.on_user_interrupt().await?;
                Ok(Flow::Continue)
            }
            Err(ReadLineError::Eof) => Ok(Flow::Quit),
            Err(e) => Err(e.into()),
        }
    }

    async fn submit(&self, line: &str) -> Result<Flow, ClientError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Flow::Continue);
        }
        if !self.is_last_completed() {
            tracing::debug!(session = %self.id, "Command in flight, input not sent");
            return Ok(Flow::Continue);
        }

        if let Some(builtin) = BuiltIn::parse(line) {
            return Ok(self.run_builtin(builtin));
        }

        self.send_command(line).await?;
        Ok(Flow::Continue)
    }

    async fn send_command(&self, line: &str) -> Result<(), ClientError> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());

        // Mark before sending so a fast terminal reply cannot be overwritten.
        self.completion.begin();
        tracing::debug!(session = %self.id, command = line, "Sending command");
        self.sink.send(Message::command(line)).await?;
        Ok(())
    }

    async fn on_user_interrupt(&self) -> Result<(), ClientError> {
        if self.is_last_completed() {
            self.editor.print(&builtin::quit_hint());
        } else {
            tracing::info!(session = %self.id, "Interrupting in-flight command");
            self.sink.send(Message::Interrupt { graceful: true }).await?;
        }
        Ok(())
    }

    fn run_builtin(&self, builtin: BuiltIn) -> Flow {
        tracing::debug!(session = %self.id, ?builtin, "Running built-in command");
        let text = match builtin {
            BuiltIn::Quit => {
                self.shutdown();
                return Flow::Quit;
            }
            BuiltIn::Clear => {
                self.editor.clear_screen();
                return Flow::Continue;
            }
            BuiltIn::Help => render::help(&self.catalogue()),
            BuiltIn::History => render::history(&self.history()),
        };

        self.editor.print(&text);
        if self.completion.wake() {
            tracing::debug!(session = %self.id, "Command completed");
        }
        Flow::Continue
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
