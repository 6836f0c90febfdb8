use crate::handler::{ActionKeyProblem, ResourceHandler, check_action_keys};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("{resource_type} declares action key '{key}' more than once")]
    DuplicateActionKey { resource_type: String, key: char },
    #[error("{resource_type} declares reserved action key '{key}'")]
    ReservedActionKey { resource_type: String, key: char },
    #[error("alias '{alias}' points at unknown resource '{target}'")]
    UnknownAliasTarget { alias: String, target: String },
}

/// Handlers by canonical type, with alias lookup and stable
/// registration order. One instance per scope; never global.
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, Arc<dyn ResourceHandler>>,
    aliases: HashMap<String, String>,
    /// Aliases added through `add_alias`; they outlive re-registration.
    user_aliases: HashMap<String, String>,
    order: Vec<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-registering a type replaces the previous handler in place.
    pub fn register(&mut self, handler: Arc<dyn ResourceHandler>) -> Result<(), RegistryError> {
        let resource_type = handler.resource_type().to_string();
        check_action_keys(&handler.actions()).map_err(|problem| match problem {
            ActionKeyProblem::Duplicate(key) => RegistryError::DuplicateActionKey {
                resource_type: resource_type.clone(),
                key,
            },
            ActionKeyProblem::Reserved(key) => RegistryError::ReservedActionKey {
                resource_type: resource_type.clone(),
                key,
            },
        })?;

        let user_aliases = &self.user_aliases;
        self.aliases
            .retain(|alias, target| *target != resource_type || user_aliases.contains_key(alias));
        for alias in [handler.shortcut_key(), handler.resource_name()] {
            let alias = normalize_alias(alias);
            if !alias.is_empty() && alias != resource_type && !self.user_aliases.contains_key(&alias) {
                self.aliases.insert(alias, resource_type.clone());
            }
        }

        if !self.order.contains(&resource_type) {
            self.order.push(resource_type.clone());
        }
        debug!("registered handler {resource_type}");
        self.handlers.insert(resource_type, handler);
        Ok(())
    }

    /// Adds a user alias for an already registered type or alias.
    pub fn add_alias(&mut self, alias: &str, target: &str) -> Result<(), RegistryError> {
        let Some(resource_type) = self.resolve(target) else {
            return Err(RegistryError::UnknownAliasTarget {
                alias: alias.to_string(),
                target: target.to_string(),
            });
        };
        let resource_type = resource_type.to_string();
        let alias = normalize_alias(alias);
        self.user_aliases.insert(alias.clone(), resource_type.clone());
        self.aliases.insert(alias, resource_type);
        Ok(())
    }

    pub fn get(&self, type_or_alias: &str) -> Option<Arc<dyn ResourceHandler>> {
        let resource_type = self.resolve(type_or_alias)?;
        self.handlers.get(resource_type).cloned()
    }

    pub fn all(&self) -> Vec<Arc<dyn ResourceHandler>> {
        self.order
            .iter()
            .filter_map(|resource_type| self.handlers.get(resource_type).cloned())
            .collect()
    }

    #[cfg(test)]
    pub fn types(&self) -> &[String] {
        &self.order
    }

    /// Every name `get` accepts, sorted for completion.
    pub fn lookup_names(&self) -> Vec<String> {
        let mut names = self
            .aliases
            .keys()
            .cloned()
            .chain(self.order.iter().cloned())
            .filter(|name| !name.contains(' '))
            .collect::<Vec<_>>();
        names.sort();
        names.dedup();
        names
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn resolve(&self, type_or_alias: &str) -> Option<&str> {
        if let Some((resource_type, _)) = self.handlers.get_key_value(type_or_alias) {
            return Some(resource_type.as_str());
        }
        self.aliases
            .get(&normalize_alias(type_or_alias))
            .map(String::as_str)
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("order", &self.order)
            .field("aliases", &self.aliases)
            .finish()
    }
}

fn normalize_alias(alias: &str) -> String {
    alias.trim().to_ascii_lowercase()
}
