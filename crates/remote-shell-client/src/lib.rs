//! Interactive client for the remote shell protocol.
//!
//! Provides:
//! - `ShellClient` - Session controller (input loop, inbound loop, interrupts)
//! - `LineEditor` - Line-editing capability with a stdio editor
//! - `ScriptedEditor` - Scripted editor for tests (feature: test-util)
//! - `CompletionTracker` - In-flight command tracking with liveness timeout
//! - `LineRendezvous` - Bounded hand-off of the operator's next line
//! - Raw-mode terminal editor (feature: terminal)

pub mod builtin;
pub mod completion;
pub mod config;
pub mod editor;
pub mod render;
pub mod rendezvous;
pub mod session;

#[cfg(any(test, feature = "test-util"))]
pub mod scripted;

#[cfg(feature = "terminal")]
pub mod terminal;

pub use completion::CompletionTracker;
pub use config::ClientConfig;
pub use editor::{LineEditor, ReadLineError, StdioEditor};
pub use rendezvous::LineRendezvous;
pub use session::{ClientError, Output, ShellClient};

#[cfg(any(test, feature = "test-util"))]
pub use scripted::{ScriptHandle, ScriptedEditor};
#[cfg(feature = "terminal")]
pub use terminal::TerminalEditor;
