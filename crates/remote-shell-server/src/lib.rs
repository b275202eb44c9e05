//! Server side of the remote shell protocol.
//!
//! Provides:
//! - `CommandHandler` - Async trait implemented by each command
//! - `CommandRegistry` - Named handlers and the published catalogue
//! - `Dispatcher` - Per-session dispatch with one terminal message per command
//! - `ShellServer` - Session per connection (feature: tcp adds the accept loop)

pub mod command_line;
pub mod config;
pub mod dispatcher;
pub mod handler;
pub mod registry;
pub mod server;

pub use command_line::{CommandLine, CommandLineError};
pub use config::ServerConfig;
pub use dispatcher::{DispatchError, Dispatcher};
pub use handler::{CommandContext, CommandError, CommandHandler, InterruptSignal, OutputSink};
pub use registry::CommandRegistry;
pub use server::ShellServer;
