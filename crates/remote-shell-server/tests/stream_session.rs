//! Sessions served over an in-process byte stream with newline-delimited JSON.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use remote_shell_core::{ChannelState, CommandDescriptor, Message, error_kind};
use remote_shell_server::{
    CommandContext, CommandError, CommandHandler, CommandRegistry, ServerConfig, ShellServer,
};
use remote_shell_transport::{JsonLinesSource, MessageSink, MessageSource, json_lines};
use tokio::io::{DuplexStream, ReadHalf};

const CHUNK: usize = 4096;

/// Writes one chunk larger than the pipe, then hangs.
struct Flood;

#[async_trait]
impl CommandHandler for Flood {
    async fn execute(&self, ctx: CommandContext) -> Result<Option<String>, CommandError> {
        ctx.stdout("x".repeat(CHUNK)).await?;
        std::future::pending().await
    }
}

async fn next(source: &mut JsonLinesSource<ReadHalf<DuplexStream>>) -> Message {
    tokio::time::timeout(Duration::from_secs(5), source.receive())
        .await
        .expect("timed out waiting for message")
        .unwrap()
}

#[tokio::test]
async fn test_abort_during_backpressure_keeps_frames_whole() {
    let registry = Arc::new(CommandRegistry::new());
    registry.register(CommandDescriptor::new("flood", "Write a large chunk"), Flood);
    let server = ShellServer::new(registry, ServerConfig::default());

    let (server_io, client_io) = tokio::io::duplex(256);
    let (read, write) = tokio::io::split(server_io);
    let (source, sink) = json_lines(read, write);
    tokio::spawn(async move { server.serve_channel(source, sink).await });

    let (read, write) = tokio::io::split(client_io);
    let (mut rx, tx) = json_lines(read, write);
    assert!(matches!(next(&mut rx).await, Message::Meta { .. }));

    tx.send(Message::command("flood")).await.unwrap();
    assert_eq!(next(&mut rx).await, Message::BofStdout);

    // Leave the chunk stuck on the full pipe, then abort its command.
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(Message::Interrupt { graceful: false }).await.unwrap();

    assert_eq!(
        next(&mut rx).await,
        Message::stdout("x".repeat(CHUNK), ChannelState::Running)
    );
    let Message::Stderr { error } = next(&mut rx).await else {
        panic!("expected stderr");
    };
    assert_eq!(error.kind, error_kind::INTERRUPTED);
}
