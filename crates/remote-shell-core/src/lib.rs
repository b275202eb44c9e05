//! Core types for the remote shell protocol.
//!
//! This crate provides the pieces both ends of a session share:
//! - `Message` - Tagged protocol message enum
//! - `ChannelState` - Lifecycle position of a stdout chunk
//! - `CommandCatalogue` - Name-keyed command descriptors
//! - Configuration helpers

pub mod catalogue;
pub mod config;
pub mod message;

pub use catalogue::CommandCatalogue;
pub use config::{ConfigError, DEFAULT_TIMEOUT};
pub use message::{ChannelState, CommandDescriptor, Message, RemoteError, error_kind};
