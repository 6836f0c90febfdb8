use crate::error::{HandlerError, ValidationReport};
use crate::model::{ActionDef, ActionOutcome, ColumnDef, DetailMap, ListOptions, ListResult, Resource};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Keys the engine never lets a handler action claim.
pub const RESERVED_ACTION_KEYS: [char; 6] = ['q', ':', '/', '?', 'j', 'k'];

/// Capability set every browsable resource type implements.
///
/// Mutations and actions are optional: the defaults report
/// `NOT_SUPPORTED`, which the UI uses to hide the affordance.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Namespaced type tag, e.g. `ecs:tasks`.
    fn resource_type(&self) -> &str;

    fn resource_name(&self) -> &str;

    fn resource_icon(&self) -> &str {
        "◆"
    }

    fn shortcut_key(&self) -> &str;

    fn columns(&self) -> &[ColumnDef];

    async fn list(&self, options: &ListOptions) -> Result<ListResult, HandlerError>;

    async fn get(&self, id: &str) -> Result<Arc<dyn Resource>, HandlerError>;

    async fn describe(&self, id: &str) -> Result<DetailMap, HandlerError>;

    fn can_edit(&self) -> bool {
        false
    }

    fn can_delete(&self) -> bool {
        false
    }

    fn validate_update(&self, _id: &str, _fields: &DetailMap) -> ValidationReport {
        ValidationReport::default()
    }

    async fn update(&self, _id: &str, _fields: DetailMap) -> Result<(), HandlerError> {
        Err(HandlerError::not_supported())
    }

    async fn delete(&self, _id: &str) -> Result<(), HandlerError> {
        Err(HandlerError::not_supported())
    }

    fn actions(&self) -> Vec<ActionDef> {
        Vec::new()
    }

    async fn execute_action(&self, _action: &str, _resource_id: &str) -> ActionOutcome {
        ActionOutcome::Failed(HandlerError::not_supported())
    }
}

pub fn find_action(handler: &dyn ResourceHandler, key: char) -> Option<ActionDef> {
    handler.actions().into_iter().find(|action| action.key == key)
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ActionKeyProblem {
    Duplicate(char),
    Reserved(char),
}

pub fn check_action_keys(actions: &[ActionDef]) -> Result<(), ActionKeyProblem> {
    let mut seen = HashSet::new();
    for action in actions {
        if RESERVED_ACTION_KEYS.contains(&action.key) {
            return Err(ActionKeyProblem::Reserved(action.key));
        }
        if !seen.insert(action.key) {
            return Err(ActionKeyProblem::Duplicate(action.key));
        }
    }
    Ok(())
}
