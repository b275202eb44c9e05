//! Demo shell server with a handful of commands.
//!
//! Run with: cargo run -p shell-server-demo -- --listen 127.0.0.1:7878
//!
//! Then connect with: cargo run -p shell-client-demo

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use remote_shell_core::CommandDescriptor;
use remote_shell_server::{
    CommandContext, CommandError, CommandHandler, CommandRegistry, ServerConfig, ShellServer,
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "shell-server-demo", about = "Remote shell demo server", version)]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:7878")]
    listen: String,

    /// Grace period for interrupted commands, in milliseconds.
    ///
    /// Overrides `REMOTE_SHELL_INTERRUPT_GRACE_MS`.
    #[arg(long)]
    interrupt_grace_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env()?;
    if let Some(ms) = cli.interrupt_grace_ms {
        config = config.with_interrupt_grace(Duration::from_millis(ms));
    }

    let server = ShellServer::new(Arc::new(registry()), config);
    let listener = TcpListener::bind(cli.listen.as_str())
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    server.serve(listener).await?;
    Ok(())
}

fn registry() -> CommandRegistry {
    let registry = CommandRegistry::new();
    registry.register(
        CommandDescriptor::new("echo", "Print the arguments").with_usage("echo <text>..."),
        Echo,
    );
    registry.register(
        CommandDescriptor::new("sleep", "Wait, reporting progress")
            .with_usage("sleep <millis>")
            .confirm_interrupt(),
        Sleep,
    );
    registry.register(
        CommandDescriptor::new("lines", "Stream numbered lines").with_usage("lines <count>"),
        Lines,
    );
    registry.register(
        CommandDescriptor::new("fail", "Fail with the given message").with_usage("fail <message>"),
        Fail,
    );
    registry
}

struct Echo;

#[async_trait]
impl CommandHandler for Echo {
    async fn execute(&self, ctx: CommandContext) -> Result<Option<String>, CommandError> {
        Ok(Some(ctx.args().join(" ")))
    }
}

struct Sleep;

#[async_trait]
impl CommandHandler for Sleep {
    async fn execute(&self, ctx: CommandContext) -> Result<Option<String>, CommandError> {
        let millis: u64 = parse_arg(&ctx, "sleep <millis>")?;
        let steps = 20;
        let step = Duration::from_millis(millis / steps);

        for done in 1..=steps {
            tokio::select! {
                () = tokio::time::sleep(step) => {}
                () = ctx.interrupt().interrupted() => return Err(CommandError::Interrupted),
            }
            ctx.progress("sleep", done, steps).await?;
        }
        Ok(Some(format!("Slept {millis} ms")))
    }
}

struct Lines;

#[async_trait]
impl CommandHandler for Lines {
    async fn execute(&self, ctx: CommandContext) -> Result<Option<String>, CommandError> {
        let count: u64 = parse_arg(&ctx, "lines <count>")?;
        for n in 1..=count {
            ctx.interrupt().check()?;
            ctx.stdout(format!("line {n}")).await?;
        }
        Ok(None)
    }
}

struct Fail;

#[async_trait]
impl CommandHandler for Fail {
    async fn execute(&self, ctx: CommandContext) -> Result<Option<String>, CommandError> {
        let message = ctx.args().join(" ");
        if message.is_empty() {
            return Err(CommandError::Usage("fail <message>".to_string()));
        }
        Err(CommandError::Failed(message))
    }
}

fn parse_arg<T: std::str::FromStr>(ctx: &CommandContext, usage: &str) -> Result<T, CommandError> {
    ctx.args()
        .first()
        .and_then(|arg| arg.parse().ok())
        .ok_or_else(|| CommandError::Usage(usage.to_string()))
}
