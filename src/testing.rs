use crate::aws::{AwsCliError, AwsTransport};
use crate::error::HandlerError;
use crate::handler::ResourceHandler;
use crate::model::{
    ActionDef, ActionOutcome, ColumnDef, DetailMap, ListOptions, ListResult, Resource,
    ResourceMeta, Scope, TagMap,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub struct FakeResource {
    meta: ResourceMeta,
    row: Vec<String>,
}

impl Resource for FakeResource {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn table_row(&self) -> Vec<String> {
        self.row.clone()
    }

    fn detail_map(&self) -> DetailMap {
        let mut map = DetailMap::new();
        map.insert("id".to_string(), Value::String(self.meta.id.clone()));
        map
    }
}

pub fn fake_resource(id: &str, row: &[&str], tags: &[(&str, &str)]) -> Arc<dyn Resource> {
    let tags = tags
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect::<TagMap>();
    Arc::new(FakeResource {
        meta: ResourceMeta::new("fake:things", id, "us-east-1").tagged(tags),
        row: row.iter().map(|cell| cell.to_string()).collect(),
    })
}

pub fn columns(titles: &[(&'static str, bool)]) -> Vec<ColumnDef> {
    titles
        .iter()
        .map(|(title, sortable)| ColumnDef::new(*title, 16, *sortable))
        .collect()
}

/// Handler serving canned pages keyed by continuation token.
pub struct FakeHandler {
    resource_type: String,
    name: String,
    shortcut: String,
    columns: Vec<ColumnDef>,
    pages: HashMap<String, ListResult>,
    actions: Vec<ActionDef>,
    outcomes: Mutex<HashMap<String, ActionOutcome>>,
    list_tokens: Mutex<Vec<String>>,
    editable: bool,
}

impl FakeHandler {
    pub fn new(resource_type: &str, name: &str, shortcut: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            shortcut: shortcut.to_string(),
            columns: columns(&[("NAME", true), ("STATE", true), ("NOTE", false)]),
            pages: HashMap::new(),
            actions: Vec::new(),
            outcomes: Mutex::new(HashMap::new()),
            list_tokens: Mutex::new(Vec::new()),
            editable: false,
        }
    }

    /// Accepts every update and delete.
    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    pub fn with_page(mut self, token: &str, resources: Vec<Arc<dyn Resource>>, next: &str) -> Self {
        self.pages.insert(
            token.to_string(),
            ListResult {
                resources,
                next_token: next.to_string(),
            },
        );
        self
    }

    pub fn with_action(mut self, action: ActionDef, outcome: ActionOutcome) -> Self {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.insert(action.name.to_string(), outcome);
        }
        self.actions.push(action);
        self
    }

    pub fn list_tokens(&self) -> Vec<String> {
        self.list_tokens
            .lock()
            .map(|tokens| tokens.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResourceHandler for FakeHandler {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn resource_name(&self) -> &str {
        &self.name
    }

    fn shortcut_key(&self) -> &str {
        &self.shortcut
    }

    fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    async fn list(&self, options: &ListOptions) -> Result<ListResult, HandlerError> {
        if let Ok(mut tokens) = self.list_tokens.lock() {
            tokens.push(options.next_token.clone());
        }
        self.pages
            .get(&options.next_token)
            .cloned()
            .ok_or_else(|| HandlerError::not_found(format!("page {:?}", options.next_token)))
    }

    async fn get(&self, id: &str) -> Result<Arc<dyn Resource>, HandlerError> {
        self.pages
            .values()
            .flat_map(|page| page.resources.iter())
            .find(|resource| resource.id() == id)
            .cloned()
            .ok_or_else(|| HandlerError::not_found(id))
    }

    async fn describe(&self, id: &str) -> Result<DetailMap, HandlerError> {
        self.get(id).await.map(|resource| resource.detail_map())
    }

    fn can_edit(&self) -> bool {
        self.editable
    }

    fn can_delete(&self) -> bool {
        self.editable
    }

    async fn update(&self, _id: &str, _fields: DetailMap) -> Result<(), HandlerError> {
        if self.editable {
            Ok(())
        } else {
            Err(HandlerError::not_supported())
        }
    }

    async fn delete(&self, _id: &str) -> Result<(), HandlerError> {
        if self.editable {
            Ok(())
        } else {
            Err(HandlerError::not_supported())
        }
    }

    fn actions(&self) -> Vec<ActionDef> {
        self.actions.clone()
    }

    async fn execute_action(&self, action: &str, _resource_id: &str) -> ActionOutcome {
        self.outcomes
            .lock()
            .ok()
            .and_then(|outcomes| outcomes.get(action).cloned())
            .unwrap_or(ActionOutcome::Failed(HandlerError::not_supported()))
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FakeFailure {
    Denied,
    Missing,
    Broken,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RecordedCall {
    pub service: String,
    pub operation: String,
    pub args: Vec<String>,
}

impl RecordedCall {
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        let index = self.args.iter().position(|arg| arg == flag)?;
        self.args.get(index + 1).map(String::as_str)
    }
}

/// Transport answering `service operation` pairs from canned JSON.
/// Responses queued for the same pair are served in order; the last one
/// repeats.
pub struct FakeTransport {
    scope: Scope,
    responses: Mutex<HashMap<String, Vec<Result<Value, FakeFailure>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            scope: Scope::new("test", "us-east-1"),
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(self, service: &str, operation: &str, value: Value) -> Self {
        self.push(service, operation, Ok(value));
        self
    }

    pub fn fail(self, service: &str, operation: &str, failure: FakeFailure) -> Self {
        self.push(service, operation, Err(failure));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.operation == operation)
            .collect()
    }

    fn push(&self, service: &str, operation: &str, response: Result<Value, FakeFailure>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses
                .entry(format!("{service} {operation}"))
                .or_default()
                .push(response);
        }
    }
}

#[async_trait]
impl AwsTransport for FakeTransport {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    async fn call(
        &self,
        service: &str,
        operation: &str,
        args: &[String],
    ) -> Result<Value, AwsCliError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                service: service.to_string(),
                operation: operation.to_string(),
                args: args.to_vec(),
            });
        }
        let response = self.responses.lock().ok().and_then(|mut responses| {
            let queue = responses.get_mut(&format!("{service} {operation}"))?;
            if queue.len() > 1 {
                Some(queue.remove(0))
            } else {
                queue.first().cloned()
            }
        });
        match response {
            Some(Ok(value)) => Ok(value),
            Some(Err(FakeFailure::Denied)) => Err(AwsCliError::AccessDenied {
                stderr: "AccessDeniedException".to_string(),
            }),
            Some(Err(FakeFailure::Missing)) | None => Err(AwsCliError::NotFound {
                stderr: format!("{service} {operation}: NotFound"),
            }),
            Some(Err(FakeFailure::Broken)) => Err(AwsCliError::Failed {
                status: "exit status: 255".to_string(),
                stderr: "InternalFailure".to_string(),
            }),
        }
    }
}
