//! Demo shell client.
//!
//! Run with: cargo run -p shell-client-demo -- --connect 127.0.0.1:7878
//!
//! Pass a command after `--` to run it once and exit.

use std::{io::IsTerminal, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use remote_shell_client::{ClientConfig, LineEditor, ShellClient, StdioEditor, TerminalEditor};
use remote_shell_transport::json_lines::tcp::{self, TcpSink, TcpSource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "shell-client-demo", about = "Remote shell demo client", version)]
struct Cli {
    /// Server address.
    #[arg(long, default_value = "127.0.0.1:7878")]
    connect: String,

    /// Liveness timeout, in milliseconds. Overrides `REMOTE_SHELL_TIMEOUT_MS`.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Prompt text. Overrides `REMOTE_SHELL_PROMPT`.
    #[arg(long)]
    prompt: Option<String>,

    /// Print remote failure details.
    #[arg(long)]
    detail: bool,

    /// Run this command once instead of starting an interactive session.
    #[arg(last = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    // Exit explicitly: a pending blocking read would otherwise hold the runtime open.
    let code = match run(Cli::parse()).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ClientConfig::from_env()?.with_error_detail(cli.detail);
    if let Some(ms) = cli.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    if let Some(prompt) = cli.prompt {
        config = config.with_prompt(prompt);
    }

    let (source, sink) = tcp::connect(cli.connect.as_str())
        .await
        .with_context(|| format!("failed to connect to {}", cli.connect))?;

    if !cli.command.is_empty() {
        return one_shot(source, sink, config, &cli.command.join(" ")).await;
    }
    if std::io::stdin().is_terminal() {
        interactive(TerminalEditor::new(), source, sink, config).await
    } else {
        interactive(StdioEditor::new(), source, sink, config).await
    }
}

async fn interactive<E: LineEditor>(
    editor: E,
    source: TcpSource,
    sink: TcpSink,
    config: ClientConfig,
) -> anyhow::Result<()> {
    let client = Arc::new(ShellClient::new(editor, sink, config));
    let mut inbound = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.run_inbound(source).await }
    });

    tokio::select! {
        input = client.run_loop() => {
            client.shutdown();
            input?;
            inbound.await??;
        }
        result = &mut inbound => {
            result.context("inbound loop panicked")??;
        }
    }
    Ok(())
}

async fn one_shot(
    source: TcpSource,
    sink: TcpSink,
    config: ClientConfig,
    line: &str,
) -> anyhow::Result<()> {
    let timeout = config.timeout;
    let client = Arc::new(ShellClient::new(StdioEditor::new(), sink, config));
    let inbound = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.run_inbound(source).await }
    });

    let completed = client.execute(line).await;
    client.shutdown();
    inbound.await??;

    if !completed? {
        anyhow::bail!("no reply to '{line}' within {timeout:?}");
    }
    Ok(())
}
