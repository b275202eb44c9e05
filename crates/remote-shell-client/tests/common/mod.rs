//! Harness driving a client session with a scripted operator.

#![allow(dead_code)]

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use remote_shell_client::{ClientConfig, ClientError, ScriptHandle, ScriptedEditor, ShellClient};
use remote_shell_core::Message;
use remote_shell_transport::{Endpoint, MemorySource, duplex};
use tokio::task::JoinHandle;

pub const PROMPT: &str = "remote> ";

/// Poll `cond` until it holds, failing the test after five seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Receive the next message, failing the test after five seconds.
pub async fn next(source: &mut MemorySource) -> Message {
    use remote_shell_transport::MessageSource as _;

    tokio::time::timeout(Duration::from_secs(5), source.receive())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

/// A running client session.
pub struct Session {
    pub client: Arc<ShellClient<ScriptedEditor>>,
    pub editor: ScriptedEditor,
    pub keys: ScriptHandle,
    input: JoinHandle<Result<(), ClientError>>,
    inbound: JoinHandle<Result<(), ClientError>>,
}

impl Session {
    /// Start both loops; returns the session and the server's end of the channel.
    pub fn start(config: ClientConfig) -> (Self, Endpoint) {
        let (editor, keys) = ScriptedEditor::new();
        let (client_end, server_end) = duplex();
        let (client_tx, client_rx) = client_end.split();
        let client = Arc::new(ShellClient::new(
            editor.clone(),
            client_tx,
            config.with_prompt(PROMPT),
        ));

        let input = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.run_loop().await }
        });
        let inbound = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.run_inbound(client_rx).await }
        });

        let session = Self {
            client,
            editor,
            keys,
            input,
            inbound,
        };
        (session, server_end)
    }

    /// Wait until the input loop has issued `n` reads.
    pub async fn reads(&self, n: usize) {
        wait_until(|| self.editor.prompts().len() >= n).await;
    }

    /// Wait until some printed output contains `text`.
    pub async fn printed(&self, text: &str) {
        wait_until(|| self.editor.printed().iter().any(|p| p.contains(text))).await;
    }

    /// End input and wait for both loops to stop.
    pub async fn finish(self) {
        self.keys.eof();
        self.join().await;
    }

    /// Wait for both loops to stop on their own.
    pub async fn join(self) {
        let timeout = Duration::from_secs(5);
        tokio::time::timeout(timeout, self.input)
            .await
            .expect("input loop did not stop")
            .unwrap()
            .unwrap();
        tokio::time::timeout(timeout, self.inbound)
            .await
            .expect("inbound loop did not stop")
            .unwrap()
            .unwrap();
    }
}
