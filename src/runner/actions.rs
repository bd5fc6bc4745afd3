//! Action registry - resolves `uses:` references to something runnable

use crate::core::ActionRef;
use crate::runner::{config::ActionAliasConfig, RunnerError};
use std::collections::BTreeMap;

/// Actions the runner implements itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinAction {
    /// The workspace already holds the repository; nothing to do
    Checkout,
}

/// How a resolved action runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionHandler {
    Builtin(BuiltinAction),
    Script {
        run: String,
        shell: Option<String>,
    },
}

/// Lookup table from action references to handlers
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    builtins: BTreeMap<String, BuiltinAction>,
    aliases: BTreeMap<String, ActionAliasConfig>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        let mut builtins = BTreeMap::new();
        builtins.insert("actions/checkout".to_string(), BuiltinAction::Checkout);
        Self {
            builtins,
            aliases: BTreeMap::new(),
        }
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with builtins plus the given aliases
    pub fn with_aliases(aliases: BTreeMap<String, ActionAliasConfig>) -> Self {
        Self {
            aliases,
            ..Self::default()
        }
    }

    pub fn register(&mut self, reference: impl Into<String>, alias: ActionAliasConfig) {
        self.aliases.insert(reference.into(), alias);
    }

    /// Resolve a reference.
    ///
    /// An alias for the exact `name@version` wins over one for `name`, and
    /// aliases win over builtins so a local setup can replace them.
    pub fn resolve(&self, action: &ActionRef) -> Result<ActionHandler, RunnerError> {
        let exact = action.to_string();
        let alias = self
            .aliases
            .get(&exact)
            .or_else(|| self.aliases.get(&action.name));

        if let Some(alias) = alias {
            return Ok(ActionHandler::Script {
                run: alias.run.clone(),
                shell: alias.shell.clone(),
            });
        }

        if let Some(builtin) = self.builtins.get(&action.name) {
            return Ok(ActionHandler::Builtin(*builtin));
        }

        Err(RunnerError::ActionNotFound(exact))
    }
}
