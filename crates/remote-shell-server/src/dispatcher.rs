//! Per-session command dispatch.
//!
//! A [`Dispatcher`] owns one channel. It runs at most one command at a time
//! and guarantees a single terminal message for every command it accepts:
//! the in-flight slot is claimed exactly once, by whichever of the command
//! task, an immediate interrupt, the grace-period reaper or session close
//! gets there first, and only the claimant speaks.

use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use futures::FutureExt;
use remote_shell_core::{ChannelState, CommandDescriptor, Message, RemoteError, error_kind};
use remote_shell_transport::{MessageSink, MessageSource, TransportError};
use thiserror::Error;
use tokio::{
    sync::{oneshot, watch},
    task::AbortHandle,
};
use uuid::Uuid;

use crate::{
    command_line::CommandLine,
    config::ServerConfig,
    handler::{CommandContext, CommandHandler, InterruptSignal, OutputSink},
    registry::CommandRegistry,
};

/// Dispatcher error.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatcher already running")]
    AlreadyRunning,
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl DispatchError {
    /// Whether the session cannot continue after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::AlreadyRunning => false,
            Self::Transport(e) => e.is_fatal(),
        }
    }
}

struct InFlight {
    command_id: Uuid,
    line: String,
    descriptor: CommandDescriptor,
    interrupt: watch::Sender<bool>,
    abort: AbortHandle,
    awaiting_confirm: bool,
    started: Instant,
}

impl InFlight {
    fn signalled(&self) -> bool {
        *self.interrupt.borrow()
    }

    fn signal(&self) {
        self.interrupt.send_replace(true);
    }
}

/// State shared between the dispatcher and the tasks it spawns.
struct Session {
    id: Uuid,
    sink: Arc<dyn MessageSink>,
    slot: Mutex<Option<InFlight>>,
}

impl Session {
    fn slot(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_line(&self) -> Option<String> {
        self.slot().as_ref().map(|command| command.line.clone())
    }

    /// Take the in-flight command if it is still `command_id`.
    fn claim(&self, command_id: Uuid) -> Option<InFlight> {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|c| c.command_id == command_id) {
            slot.take()
        } else {
            None
        }
    }

    async fn finish(&self, command: InFlight, message: Message) {
        tracing::info!(
            session = %self.id,
            command_id = %command.command_id,
            command = %command.line,
            outcome = message.kind(),
            elapsed = ?command.started.elapsed(),
            "Command finished"
        );
        if let Err(e) = self.sink.send(message).await {
            tracing::warn!(session = %self.id, "Failed to send terminal message: {e}");
        }
    }
}

enum InterruptPlan {
    Idle,
    Abort(InFlight),
    Ask(String),
    Signal(Uuid),
    Pending,
}

/// Server side of one shell session.
pub struct Dispatcher {
    session: Arc<Session>,
    registry: Arc<CommandRegistry>,
    config: ServerConfig,
    running: AtomicBool,
}

impl Dispatcher {
    /// Create a dispatcher that replies through `sink`.
    pub fn new(
        registry: Arc<CommandRegistry>,
        sink: impl MessageSink + 'static,
        config: ServerConfig,
    ) -> Self {
        Self {
            session: Arc::new(Session {
                id: Uuid::new_v4(),
                sink: Arc::new(sink),
                slot: Mutex::new(None),
            }),
            registry,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Session identifier, for log correlation.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.session.id
    }

    /// Whether a command is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.session.slot().is_some()
    }

    /// Serve the session until the peer closes the channel.
    ///
    /// Publishes the command catalogue first and again whenever the
    /// registry changes. A command still in flight when the channel closes
    /// is aborted.
    ///
    /// # Errors
    /// Returns `AlreadyRunning` if the dispatcher was started before, or the
    /// fatal transport error that ended the session.
    pub async fn run<S: MessageSource>(&self, mut source: S) -> Result<(), DispatchError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DispatchError::AlreadyRunning);
        }
        tracing::info!(session = %self.session.id, "Dispatcher started");

        let publisher = self.spawn_meta_publisher();
        if let Err(e) = self.reply(self.registry.meta()).await {
            publisher.abort();
            return Err(e);
        }
        let result = loop {
            let message = match source.receive().await {
                Ok(message) => message,
                Err(TransportError::Closed) => break Ok(()),
                Err(e) if e.is_fatal() => break Err(e.into()),
                Err(e) => {
                    tracing::warn!(session = %self.session.id, "Ignoring inbound message: {e}");
                    continue;
                }
            };

            match self.handle(message).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => break Err(e),
                Err(e) => tracing::warn!(session = %self.session.id, "Dispatch failed: {e}"),
            }
        };

        publisher.abort();
        self.cancel_in_flight();
        match &result {
            Ok(()) => tracing::info!(session = %self.session.id, "Dispatcher stopped"),
            Err(e) => tracing::error!(session = %self.session.id, "Dispatcher failed: {e}"),
        }
        result
    }

    /// Handle one inbound message.
    ///
    /// # Errors
    /// Returns a transport error if a reply cannot be sent.
    pub async fn handle(&self, message: Message) -> Result<(), DispatchError> {
        match message {
            Message::Command { line } => self.start(&line).await,
            Message::Interrupt { graceful } => self.interrupt(graceful).await,
            Message::ConfirmInterrupt { confirmed } => {
                self.confirm(confirmed);
                Ok(())
            }
            other => {
                tracing::debug!(
                    session = %self.session.id,
                    kind = other.kind(),
                    "Ignoring client-bound message"
                );
                Ok(())
            }
        }
    }

    fn spawn_meta_publisher(&self) -> tokio::task::JoinHandle<()> {
        let session = Arc::clone(&self.session);
        let registry = Arc::clone(&self.registry);
        let mut changes = registry.subscribe();
        changes.mark_unchanged();

        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                tracing::debug!(session = %session.id, "Republishing command catalogue");
                if let Err(e) = session.sink.send(registry.meta()).await {
                    tracing::debug!(session = %session.id, "Stopped publishing catalogue: {e}");
                    return;
                }
            }
        })
    }

    async fn reply(&self, message: Message) -> Result<(), DispatchError> {
        self.session.sink.send(message).await?;
        Ok(())
    }

    async fn reject(&self, kind: &str, message: String) -> Result<(), DispatchError> {
        tracing::debug!(session = %self.session.id, kind, "Rejecting command: {message}");
        self.reply(Message::stderr(RemoteError::new(kind, message)))
            .await
    }

    async fn start(&self, line: &str) -> Result<(), DispatchError> {
        let line = line.trim();
        if line.is_empty() {
            return self.reply(Message::EofStdout).await;
        }
        if let Some(current) = self.session.current_line() {
            return self
                .reject(
                    error_kind::BUSY,
                    format!("Command '{current}' is still running"),
                )
                .await;
        }

        let parsed = match CommandLine::parse(line) {
            Ok(parsed) => parsed,
            Err(e) => return self.reject(error_kind::INVALID_COMMAND, e.to_string()).await,
        };
        let Some((descriptor, handler)) = self.registry.get(&parsed.name) else {
            return self
                .reject(
                    error_kind::COMMAND_NOT_FOUND,
                    format!("Command not found: {}", parsed.name),
                )
                .await;
        };

        self.reply(Message::BofStdout).await?;
        let command_id = self.launch(line, parsed, descriptor, handler);
        tracing::info!(session = %self.session.id, %command_id, command = line, "Command started");
        Ok(())
    }

    fn launch(
        &self,
        line: &str,
        parsed: CommandLine,
        descriptor: CommandDescriptor,
        handler: Arc<dyn CommandHandler>,
    ) -> Uuid {
        let command_id = Uuid::new_v4();
        let (interrupt, interrupt_rx) = watch::channel(false);
        let ctx = CommandContext::new(
            command_id,
            parsed,
            OutputSink::new(Arc::clone(&self.session.sink)),
            InterruptSignal::new(interrupt_rx),
        );

        let (start, gate) = oneshot::channel();
        let task = tokio::spawn(run_command(
            Arc::clone(&self.session),
            command_id,
            handler,
            ctx,
            gate,
        ));
        *self.session.slot() = Some(InFlight {
            command_id,
            line: line.to_string(),
            descriptor,
            interrupt,
            abort: task.abort_handle(),
            awaiting_confirm: false,
            started: Instant::now(),
        });
        // The handler only runs once its slot is filled, so it can always claim it.
        let _ = start.send(());
        command_id
    }

    async fn interrupt(&self, graceful: bool) -> Result<(), DispatchError> {
        match self.plan_interrupt(graceful) {
            InterruptPlan::Idle => {
                tracing::debug!(session = %self.session.id, "Interrupt with nothing in flight");
                self.reply(Message::EofStdout).await
            }
            InterruptPlan::Abort(command) => {
                tracing::info!(
                    session = %self.session.id,
                    command_id = %command.command_id,
                    graceful,
                    "Aborting command"
                );
                command.abort.abort();
                self.session.finish(command, interrupted()).await;
                Ok(())
            }
            InterruptPlan::Ask(subject) => {
                self.reply(Message::AskInterrupt { subject }).await
            }
            InterruptPlan::Signal(command_id) => {
                self.spawn_reaper(command_id);
                Ok(())
            }
            InterruptPlan::Pending => {
                tracing::debug!(session = %self.session.id, "Interrupt confirmation pending");
                Ok(())
            }
        }
    }

    fn plan_interrupt(&self, graceful: bool) -> InterruptPlan {
        let mut slot = self.session.slot();
        let Some(command) = slot.as_mut() else {
            return InterruptPlan::Idle;
        };

        // A repeated graceful interrupt escalates to an abort.
        if !graceful || command.signalled() {
            return slot.take().map_or(InterruptPlan::Idle, InterruptPlan::Abort);
        }
        if command.awaiting_confirm {
            return InterruptPlan::Pending;
        }
        if command.descriptor.confirm_interrupt {
            command.awaiting_confirm = true;
            return InterruptPlan::Ask(self.config.confirm_subject_for(&command.line));
        }

        command.signal();
        InterruptPlan::Signal(command.command_id)
    }

    fn confirm(&self, confirmed: bool) {
        let signalled = {
            let mut slot = self.session.slot();
            match slot.as_mut() {
                Some(command) if command.awaiting_confirm => {
                    command.awaiting_confirm = false;
                    if confirmed {
                        command.signal();
                    }
                    Some(command.command_id)
                }
                _ => None,
            }
        };

        match signalled {
            None => tracing::debug!(session = %self.session.id, "Unsolicited interrupt confirmation"),
            Some(command_id) if confirmed => {
                tracing::info!(session = %self.session.id, %command_id, "Interrupt confirmed");
                self.spawn_reaper(command_id);
            }
            Some(command_id) => {
                tracing::info!(session = %self.session.id, %command_id, "Interrupt declined, command continues");
            }
        }
    }

    /// Abort the command after the grace period unless it finished.
    fn spawn_reaper(&self, command_id: Uuid) {
        let session = Arc::clone(&self.session);
        let grace = self.config.interrupt_grace;

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(command) = session.claim(command_id) {
                tracing::warn!(
                    session = %session.id,
                    %command_id,
                    "Command ignored interrupt for {grace:?}, aborting"
                );
                command.abort.abort();
                session.finish(command, interrupted()).await;
            }
        });
    }

    fn cancel_in_flight(&self) {
        if let Some(command) = self.session.slot().take() {
            tracing::info!(
                session = %self.session.id,
                command_id = %command.command_id,
                "Channel closed, aborting command"
            );
            command.abort.abort();
        }
    }
}

fn interrupted() -> Message {
    Message::stderr(RemoteError::new(
        error_kind::INTERRUPTED,
        "Command interrupted",
    ))
}

async fn run_command(
    session: Arc<Session>,
    command_id: Uuid,
    handler: Arc<dyn CommandHandler>,
    ctx: CommandContext,
    gate: oneshot::Receiver<()>,
) {
    if gate.await.is_err() {
        return;
    }
    let outcome = AssertUnwindSafe(handler.execute(ctx)).catch_unwind().await;

    let Some(command) = session.claim(command_id) else {
        tracing::debug!(session = %session.id, %command_id, "Command already cancelled");
        return;
    };

    let message = match outcome {
        Ok(Ok(Some(text))) => Message::stdout(text, ChannelState::Completed),
        Ok(Ok(None)) => Message::EofStdout,
        Ok(Err(e)) => {
            tracing::warn!(session = %session.id, %command_id, "Command failed: {e}");
            Message::stderr(e.to_remote())
        }
        Err(_) => {
            tracing::error!(session = %session.id, %command_id, "Command handler panicked");
            Message::stderr(RemoteError::new(
                error_kind::FAILED,
                "Command handler panicked",
            ))
        }
    };
    session.finish(command, message).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use remote_shell_transport::{MemorySource, duplex};

    use super::*;
    use crate::handler::CommandError;

    /// Waits for an interrupt, or forever if `cooperative` is false.
    struct Wait {
        cooperative: bool,
    }

    #[async_trait]
    impl CommandHandler for Wait {
        async fn execute(&self, ctx: CommandContext) -> Result<Option<String>, CommandError> {
            if self.cooperative {
                ctx.interrupt().interrupted().await;
                Err(CommandError::Interrupted)
            } else {
                std::future::pending().await
            }
        }
    }

    struct Echo;

    #[async_trait]
    impl CommandHandler for Echo {
        async fn execute(&self, ctx: CommandContext) -> Result<Option<String>, CommandError> {
            Ok(Some(ctx.args().join(" ")))
        }
    }

    fn dispatcher(config: ServerConfig) -> (Dispatcher, MemorySource) {
        let registry = Arc::new(CommandRegistry::new());
        registry.register(CommandDescriptor::new("echo", "Print arguments"), Echo);
        registry.register(
            CommandDescriptor::new("wait", "Wait for an interrupt"),
            Wait { cooperative: true },
        );
        registry.register(
            CommandDescriptor::new("stuck", "Ignore interrupts"),
            Wait { cooperative: false },
        );
        registry.register(
            CommandDescriptor::new("ask", "Confirm first").confirm_interrupt(),
            Wait { cooperative: true },
        );

        let (server_end, client_end) = duplex();
        let (sink, _) = server_end.split();
        let (_, client_rx) = client_end.split();
        (Dispatcher::new(registry, sink, config), client_rx)
    }

    async fn wait_idle(dispatcher: &Dispatcher) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while dispatcher.is_busy() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    async fn next(rx: &mut MemorySource) -> Message {
        tokio::time::timeout(Duration::from_secs(5), rx.receive())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_command_gets_bof_and_completed() {
        let (dispatcher, mut rx) = dispatcher(ServerConfig::default());

        dispatcher.handle(Message::command("echo hi there")).await.unwrap();

        assert_eq!(next(&mut rx).await, Message::BofStdout);
        assert_eq!(
            next(&mut rx).await,
            Message::stdout("hi there", ChannelState::Completed)
        );
    }

    #[tokio::test]
    async fn test_rejections_are_terminal() {
        let (dispatcher, mut rx) = dispatcher(ServerConfig::default());

        dispatcher.handle(Message::command("nope")).await.unwrap();
        let Message::Stderr { error } = next(&mut rx).await else {
            panic!("expected stderr");
        };
        assert_eq!(error.kind, error_kind::COMMAND_NOT_FOUND);

        dispatcher.handle(Message::command("echo \"open")).await.unwrap();
        let Message::Stderr { error } = next(&mut rx).await else {
            panic!("expected stderr");
        };
        assert_eq!(error.kind, error_kind::INVALID_COMMAND);

        dispatcher.handle(Message::command("  ")).await.unwrap();
        assert_eq!(next(&mut rx).await, Message::EofStdout);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fast_commands_finish_exactly_once() {
        let (dispatcher, mut rx) = dispatcher(ServerConfig::default());

        for i in 0..200 {
            dispatcher.handle(Message::command(format!("echo {i}"))).await.unwrap();
            assert_eq!(next(&mut rx).await, Message::BofStdout);
            assert_eq!(
                next(&mut rx).await,
                Message::stdout(i.to_string(), ChannelState::Completed)
            );
            wait_idle(&dispatcher).await;
        }
        assert!(rx.try_receive().is_none());
    }

    #[tokio::test]
    async fn test_second_command_is_busy() {
        let (dispatcher, mut rx) = dispatcher(ServerConfig::default());

        dispatcher.handle(Message::command("wait")).await.unwrap();
        assert_eq!(next(&mut rx).await, Message::BofStdout);
        dispatcher.handle(Message::command("echo x")).await.unwrap();

        let Message::Stderr { error } = next(&mut rx).await else {
            panic!("expected stderr");
        };
        assert_eq!(error.kind, error_kind::BUSY);
        assert!(dispatcher.is_busy());
    }

    #[tokio::test]
    async fn test_interrupt_when_idle_resynchronises() {
        let (dispatcher, mut rx) = dispatcher(ServerConfig::default());

        dispatcher
            .handle(Message::Interrupt { graceful: true })
            .await
            .unwrap();

        assert_eq!(next(&mut rx).await, Message::EofStdout);
    }

    #[tokio::test]
    async fn test_graceful_interrupt_reaches_handler() {
        let (dispatcher, mut rx) = dispatcher(ServerConfig::default());

        dispatcher.handle(Message::command("wait")).await.unwrap();
        assert_eq!(next(&mut rx).await, Message::BofStdout);
        dispatcher
            .handle(Message::Interrupt { graceful: true })
            .await
            .unwrap();

        assert_eq!(next(&mut rx).await, interrupted());
        assert!(!dispatcher.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_handler_is_aborted_after_grace() {
        let config = ServerConfig::default().with_interrupt_grace(Duration::from_secs(2));
        let (dispatcher, mut rx) = dispatcher(config);

        dispatcher.handle(Message::command("stuck")).await.unwrap();
        assert_eq!(next(&mut rx).await, Message::BofStdout);
        dispatcher
            .handle(Message::Interrupt { graceful: true })
            .await
            .unwrap();

        assert_eq!(next(&mut rx).await, interrupted());
        assert!(rx.try_receive().is_none());
    }

    #[tokio::test]
    async fn test_ungraceful_interrupt_aborts_at_once() {
        let (dispatcher, mut rx) = dispatcher(ServerConfig::default());

        dispatcher.handle(Message::command("stuck")).await.unwrap();
        assert_eq!(next(&mut rx).await, Message::BofStdout);
        dispatcher
            .handle(Message::Interrupt { graceful: false })
            .await
            .unwrap();

        assert_eq!(next(&mut rx).await, interrupted());
        assert!(!dispatcher.is_busy());
    }

    #[tokio::test]
    async fn test_confirmation_flow() {
        let (dispatcher, mut rx) = dispatcher(ServerConfig::default());

        dispatcher.handle(Message::command("ask")).await.unwrap();
        assert_eq!(next(&mut rx).await, Message::BofStdout);

        dispatcher
            .handle(Message::Interrupt { graceful: true })
            .await
            .unwrap();
        assert_eq!(
            next(&mut rx).await,
            Message::AskInterrupt {
                subject: "Are you sure you want to cancel 'ask'? (y|n)".to_string()
            }
        );

        dispatcher
            .handle(Message::ConfirmInterrupt { confirmed: false })
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert!(dispatcher.is_busy());
        assert!(rx.try_receive().is_none());

        dispatcher
            .handle(Message::Interrupt { graceful: true })
            .await
            .unwrap();
        assert!(matches!(next(&mut rx).await, Message::AskInterrupt { .. }));
        dispatcher
            .handle(Message::ConfirmInterrupt { confirmed: true })
            .await
            .unwrap();
        assert_eq!(next(&mut rx).await, interrupted());
    }

    #[tokio::test]
    async fn test_run_publishes_meta_and_stops_on_close() {
        let (dispatcher, mut rx) = dispatcher(ServerConfig::default());
        let (client_end, server_end) = duplex();
        let (client_tx, _) = client_end.split();
        let (_, server_rx) = server_end.split();

        let run = async {
            dispatcher.run(server_rx).await.unwrap();
        };
        let drive = async {
            let Message::Meta { registered_methods } = next(&mut rx).await else {
                panic!("expected meta first");
            };
            assert_eq!(registered_methods.len(), 4);

            client_tx.send(Message::command("wait")).await.unwrap();
            assert_eq!(next(&mut rx).await, Message::BofStdout);
            drop(client_tx);
        };
        tokio::join!(run, drive);

        assert!(!dispatcher.is_busy());
        assert!(matches!(
            dispatcher.run(duplex().0.source).await,
            Err(DispatchError::AlreadyRunning)
        ));
    }
}
