//! Command registry shared by all sessions of a server.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use remote_shell_core::{CommandCatalogue, CommandDescriptor, Message};
use tokio::sync::watch;

use crate::handler::CommandHandler;

struct Entry {
    descriptor: CommandDescriptor,
    handler: Arc<dyn CommandHandler>,
}

/// Named command handlers plus their published descriptors.
///
/// Every change bumps a version that sessions watch to re-publish their
/// `Meta` message.
pub struct CommandRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    version: watch::Sender<u64>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            entries: RwLock::new(HashMap::new()),
            version,
        }
    }

    /// Register a handler, replacing any handler with the same name.
    pub fn register(&self, descriptor: CommandDescriptor, handler: impl CommandHandler + 'static) {
        self.register_arc(descriptor, Arc::new(handler));
    }

    /// Register a shared handler, replacing any handler with the same name.
    pub fn register_arc(&self, descriptor: CommandDescriptor, handler: Arc<dyn CommandHandler>) {
        let name = descriptor.name.clone();
        let replaced = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), Entry { descriptor, handler })
            .is_some();
        tracing::debug!(command = %name, replaced, "Registered command");
        self.version.send_modify(|v| *v += 1);
    }

    /// Remove a command. Returns true if it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            tracing::debug!(command = %name, "Unregistered command");
            self.version.send_modify(|v| *v += 1);
        }
        removed
    }

    /// Look up a command.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<(CommandDescriptor, Arc<dyn CommandHandler>)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|entry| (entry.descriptor.clone(), Arc::clone(&entry.handler)))
    }

    /// Current descriptors.
    #[must_use]
    pub fn catalogue(&self) -> CommandCatalogue {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Metadata message publishing the current descriptors.
    #[must_use]
    pub fn meta(&self) -> Message {
        Message::Meta {
            registered_methods: self.catalogue().to_vec(),
        }
    }

    /// Watch for registry changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::handler::{CommandContext, CommandError};

    struct Noop;

    #[async_trait]
    impl CommandHandler for Noop {
        async fn execute(&self, _ctx: CommandContext) -> Result<Option<String>, CommandError> {
            Ok(None)
        }
    }

    #[test]
    fn test_meta_lists_registered_commands() {
        let registry = CommandRegistry::new();
        registry.register(CommandDescriptor::new("sleep", "Wait"), Noop);
        registry.register(CommandDescriptor::new("echo", "Print"), Noop);

        let Message::Meta { registered_methods } = registry.meta() else {
            panic!("expected meta message");
        };
        let names: Vec<_> = registered_methods.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["echo", "sleep"]);
    }

    #[test]
    fn test_changes_bump_version() {
        let registry = CommandRegistry::new();
        let mut changes = registry.subscribe();
        assert!(!changes.has_changed().unwrap());

        registry.register(CommandDescriptor::new("echo", ""), Noop);
        assert!(changes.has_changed().unwrap());
        changes.mark_unchanged();

        assert!(!registry.unregister("missing"));
        assert!(!changes.has_changed().unwrap());
        assert!(registry.unregister("echo"));
        assert!(changes.has_changed().unwrap());
        assert!(registry.get("echo").is_none());
    }
}
