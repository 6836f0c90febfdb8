use crate::error::HandlerError;
use crate::handler::ResourceHandler;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: usize = 50;

pub type DetailMap = BTreeMap<String, Value>;
pub type TagMap = BTreeMap<String, String>;

/// Identity and metadata shared by every resource type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceMeta {
    pub resource_type: String,
    pub id: String,
    pub arn: String,
    pub name: String,
    pub region: String,
    pub created_at: Option<DateTime<Utc>>,
    pub tags: TagMap,
}

impl ResourceMeta {
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            region: region.into(),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_arn(mut self, arn: impl Into<String>) -> Self {
        self.arn = arn.into();
        self
    }

    pub fn created(mut self, created_at: Option<DateTime<Utc>>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn tagged(mut self, tags: TagMap) -> Self {
        self.tags = tags;
        self
    }
}

/// One displayed cloud object. Values are built fresh on every list/get and
/// never mutated afterwards.
pub trait Resource: Send + Sync + Debug {
    fn meta(&self) -> &ResourceMeta;

    /// Cells in the order of the owning handler's column schema.
    fn table_row(&self) -> Vec<String>;

    fn detail_map(&self) -> DetailMap;

    fn id(&self) -> &str {
        &self.meta().id
    }

    /// Falls back to a synthesized identifier for services without ARNs.
    fn arn(&self) -> String {
        let meta = self.meta();
        if !meta.arn.is_empty() {
            return meta.arn.clone();
        }
        let (service, kind) = meta
            .resource_type
            .split_once(':')
            .unwrap_or((meta.resource_type.as_str(), "resource"));
        format!("arn:aws:{service}:{}::{kind}/{}", meta.region, meta.id)
    }

    fn name(&self) -> &str {
        let meta = self.meta();
        if meta.name.is_empty() {
            &meta.id
        } else {
            &meta.name
        }
    }

    fn resource_type(&self) -> &str {
        &self.meta().resource_type
    }

    fn region(&self) -> &str {
        &self.meta().region
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.meta().created_at
    }

    fn tags(&self) -> &TagMap {
        &self.meta().tags
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ColumnDef {
    pub title: &'static str,
    pub width: u16,
    pub sortable: bool,
}

impl ColumnDef {
    pub const fn new(title: &'static str, width: u16, sortable: bool) -> Self {
        Self {
            title,
            width,
            sortable,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ListOptions {
    pub filter: String,
    pub page_size: usize,
    /// Opaque continuation token, replayed verbatim.
    pub next_token: String,
    pub sort_field: Option<String>,
    pub sort_ascending: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            filter: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            next_token: String::new(),
            sort_field: None,
            sort_ascending: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub resources: Vec<Arc<dyn Resource>>,
    /// Empty when there are no further pages.
    pub next_token: String,
}

impl ListResult {
    #[cfg(test)]
    pub fn has_more(&self) -> bool {
        !self.next_token.is_empty()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ActionDef {
    pub key: char,
    pub name: &'static str,
    pub description: &'static str,
    pub dangerous: bool,
}

impl ActionDef {
    pub const fn new(key: char, name: &'static str, description: &'static str) -> Self {
        Self {
            key,
            name,
            description,
            dangerous: false,
        }
    }

    pub const fn dangerous(key: char, name: &'static str, description: &'static str) -> Self {
        Self {
            key,
            name,
            description,
            dangerous: true,
        }
    }
}

/// Request to start browsing another handler, carried by an action result.
#[derive(Clone)]
pub struct NavTarget {
    pub handler: Arc<dyn ResourceHandler>,
    pub breadcrumb: Vec<String>,
}

impl NavTarget {
    pub fn new(handler: Arc<dyn ResourceHandler>, breadcrumb: Vec<String>) -> Self {
        Self {
            handler,
            breadcrumb,
        }
    }
}

impl Debug for NavTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavTarget")
            .field("handler", &self.handler.resource_type())
            .field("breadcrumb", &self.breadcrumb)
            .finish()
    }
}

/// Interactive subprocess an action wants to hand the terminal to.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub prompt: String,
}

#[derive(Debug, Clone)]
pub enum ActionOutcome {
    Done(Option<String>),
    Failed(HandlerError),
    Navigate(NavTarget),
    Inspect { title: String, detail: DetailMap },
    External(ExternalCommand),
}

/// Credential/region pair handlers are keyed by.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Scope {
    pub profile: String,
    pub region: String,
}

impl Scope {
    pub fn new(profile: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            region: region.into(),
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.profile, self.region)
    }
}

pub fn format_timestamp(value: Option<DateTime<Utc>>) -> String {
    match value {
        Some(value) => value.format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{DetailMap, Resource, ResourceMeta, Scope, format_timestamp};

    #[derive(Debug)]
    struct Bare(ResourceMeta);

    impl Resource for Bare {
        fn meta(&self) -> &ResourceMeta {
            &self.0
        }

        fn table_row(&self) -> Vec<String> {
            vec![self.0.id.clone()]
        }

        fn detail_map(&self) -> DetailMap {
            DetailMap::new()
        }
    }

    #[test]
    fn name_falls_back_to_id() {
        let resource = Bare(ResourceMeta::new("logs:groups", "/aws/lambda/api", "eu-west-1"));
        assert_eq!(resource.name(), "/aws/lambda/api");
    }

    #[test]
    fn arn_is_synthesized_when_missing() {
        let resource = Bare(ResourceMeta::new("dynamodb:items", "{\"pk\":\"1\"}", "us-east-1"));
        assert_eq!(
            resource.arn(),
            "arn:aws:dynamodb:us-east-1::items/{\"pk\":\"1\"}"
        );

        let explicit = Bare(
            ResourceMeta::new("s3:buckets", "assets", "us-east-1").with_arn("arn:aws:s3:::assets"),
        );
        assert_eq!(explicit.arn(), "arn:aws:s3:::assets");
    }

    #[test]
    fn scope_renders_profile_at_region() {
        assert_eq!(Scope::new("prod", "eu-central-1").to_string(), "prod@eu-central-1");
    }

    #[test]
    fn missing_timestamp_renders_dash() {
        assert_eq!(format_timestamp(None), "-");
    }
}
