//! Name-keyed catalogue of command descriptors.

use std::collections::BTreeMap;

use crate::CommandDescriptor;

/// Catalogue of commands known to one end of a session.
///
/// The server builds it from its registry; the client merges every
/// published `Meta` message into its own copy.
#[derive(Debug, Clone, Default)]
pub struct CommandCatalogue {
    commands: BTreeMap<String, CommandDescriptor>,
}

impl CommandCatalogue {
    /// Create an empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge descriptors, replacing entries with the same name.
    ///
    /// Returns the number of entries that were added or changed.
    pub fn merge<I>(&mut self, descriptors: I) -> usize
    where
        I: IntoIterator<Item = CommandDescriptor>,
    {
        let mut changed = 0;
        for descriptor in descriptors {
            if self.commands.get(&descriptor.name) != Some(&descriptor) {
                changed += 1;
                self.commands.insert(descriptor.name.clone(), descriptor);
            }
        }
        changed
    }

    /// Insert a single descriptor.
    pub fn insert(&mut self, descriptor: CommandDescriptor) {
        self.commands.insert(descriptor.name.clone(), descriptor);
    }

    /// Look up a command by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    /// Whether a command is known.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Number of known commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the catalogue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Descriptors in name order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.values()
    }

    /// Owned snapshot of all descriptors, in name order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<CommandDescriptor> {
        self.commands.values().cloned().collect()
    }
}

impl FromIterator<CommandDescriptor> for CommandCatalogue {
    fn from_iter<T: IntoIterator<Item = CommandDescriptor>>(iter: T) -> Self {
        let mut catalogue = Self::new();
        catalogue.merge(iter);
        catalogue
    }
}
