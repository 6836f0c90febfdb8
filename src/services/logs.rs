use super::{
    Searchable, args, array_field, erase, format_bytes, insert_section, next_token, num_field,
    object_to_detail, paging_args, parse_tags, parse_time, retain_matching, str_field,
};
use crate::aws::AwsTransport;
use crate::error::{ErrorCode, HandlerError};
use crate::handler::ResourceHandler;
use crate::model::{
    ActionDef, ActionOutcome, ColumnDef, DetailMap, ListOptions, ListResult, NavTarget,
    Resource, ResourceMeta, format_timestamp,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

const RECENT_EVENT_LIMIT: &str = "50";

const GROUP_COLUMNS: [ColumnDef; 4] = [
    ColumnDef::new("NAME", 48, true),
    ColumnDef::new("RETENTION", 10, true),
    ColumnDef::new("STORED", 10, false),
    ColumnDef::new("CREATED", 17, true),
];

const STREAM_COLUMNS: [ColumnDef; 3] = [
    ColumnDef::new("NAME", 56, true),
    ColumnDef::new("LAST EVENT", 17, true),
    ColumnDef::new("CREATED", 17, true),
];

#[derive(Debug, Clone)]
pub struct LogGroup {
    meta: ResourceMeta,
    retention: String,
    stored: String,
    raw: Value,
}

impl LogGroup {
    fn from_json(value: &Value, region: &str) -> Self {
        let name = str_field(value, "logGroupName");
        let arn = str_field(value, "arn");
        let retention = match num_field(value, "retentionInDays") {
            0 => "never".to_string(),
            days => format!("{days}d"),
        };
        Self {
            meta: ResourceMeta::new("logs:groups", name.clone(), region)
                .named(name)
                .with_arn(arn.trim_end_matches(":*"))
                .created(parse_time(value.get("creationTime"))),
            retention,
            stored: format_bytes(num_field(value, "storedBytes")),
            raw: value.clone(),
        }
    }
}

impl Resource for LogGroup {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.meta.name.clone(),
            self.retention.clone(),
            self.stored.clone(),
            format_timestamp(self.meta.created_at),
        ]
    }

    fn detail_map(&self) -> DetailMap {
        object_to_detail(&self.raw)
    }
}

impl Searchable for LogGroup {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.meta.name.as_str()]
    }
}

pub struct LogGroupHandler {
    transport: Arc<dyn AwsTransport>,
}

impl LogGroupHandler {
    pub fn new(transport: Arc<dyn AwsTransport>) -> Self {
        Self { transport }
    }

    async fn find(&self, id: &str, code: ErrorCode) -> Result<LogGroup, HandlerError> {
        let value = self
            .transport
            .call(
                "logs",
                "describe-log-groups",
                &args(&["--log-group-name-prefix", id]),
            )
            .await
            .map_err(|error| {
                HandlerError::from_transport(code, format!("failed to describe log group {id}"), error)
            })?;
        let region = &self.transport.scope().region;
        array_field(&value, "logGroups")
            .iter()
            .map(|group| LogGroup::from_json(group, region))
            .find(|group| group.meta.id == id)
            .ok_or_else(|| HandlerError::not_found(format!("log group {id}")))
    }
}

#[async_trait]
impl ResourceHandler for LogGroupHandler {
    fn resource_type(&self) -> &str {
        "logs:groups"
    }

    fn resource_name(&self) -> &str {
        "Log Groups"
    }

    fn resource_icon(&self) -> &str {
        "≡"
    }

    fn shortcut_key(&self) -> &str {
        "logs"
    }

    fn columns(&self) -> &[ColumnDef] {
        &GROUP_COLUMNS
    }

    async fn list(&self, options: &ListOptions) -> Result<ListResult, HandlerError> {
        let value = self
            .transport
            .call("logs", "describe-log-groups", &paging_args(options))
            .await
            .map_err(|error| {
                HandlerError::from_transport(ErrorCode::ListFailed, "failed to list log groups", error)
            })?;
        let region = &self.transport.scope().region;
        let mut groups = array_field(&value, "logGroups")
            .iter()
            .map(|group| LogGroup::from_json(group, region))
            .collect::<Vec<_>>();
        retain_matching(&mut groups, &options.filter);
        Ok(ListResult {
            resources: erase(groups),
            next_token: next_token(&value),
        })
    }

    async fn get(&self, id: &str) -> Result<Arc<dyn Resource>, HandlerError> {
        let group = self.find(id, ErrorCode::GetFailed).await?;
        Ok(Arc::new(group))
    }

    async fn describe(&self, id: &str) -> Result<DetailMap, HandlerError> {
        let group = self.find(id, ErrorCode::DescribeFailed).await?;
        let mut detail = group.detail_map();
        let tags = self
            .transport
            .call(
                "logs",
                "list-tags-for-resource",
                &args(&["--resource-arn", group.meta.arn.as_str()]),
            )
            .await
            .map(|value| {
                serde_json::to_value(parse_tags(value.get("tags"))).unwrap_or(Value::Null)
            });
        insert_section(&mut detail, "Tags", tags);
        Ok(detail)
    }

    fn actions(&self) -> Vec<ActionDef> {
        vec![ActionDef::new('s', "streams", "Browse streams of this log group")]
    }

    async fn execute_action(&self, action: &str, resource_id: &str) -> ActionOutcome {
        match action {
            "streams" => ActionOutcome::Navigate(NavTarget::new(
                Arc::new(LogStreamHandler::new(self.transport.clone(), resource_id)),
                vec![
                    "Logs".to_string(),
                    "Groups".to_string(),
                    resource_id.to_string(),
                    "Streams".to_string(),
                ],
            )),
            _ => ActionOutcome::Failed(HandlerError::not_supported()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogStream {
    meta: ResourceMeta,
    last_event: String,
    raw: Value,
}

impl LogStream {
    fn from_json(value: &Value, region: &str) -> Self {
        let name = str_field(value, "logStreamName");
        Self {
            meta: ResourceMeta::new("logs:streams", name.clone(), region)
                .named(name)
                .with_arn(str_field(value, "arn"))
                .created(parse_time(value.get("creationTime"))),
            last_event: format_timestamp(parse_time(value.get("lastEventTimestamp"))),
            raw: value.clone(),
        }
    }
}

impl Resource for LogStream {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.meta.name.clone(),
            self.last_event.clone(),
            format_timestamp(self.meta.created_at),
        ]
    }

    fn detail_map(&self) -> DetailMap {
        object_to_detail(&self.raw)
    }
}

impl Searchable for LogStream {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.meta.name.as_str()]
    }
}

/// Streams of one log group, most recently written first.
pub struct LogStreamHandler {
    transport: Arc<dyn AwsTransport>,
    group: String,
}

impl LogStreamHandler {
    pub fn new(transport: Arc<dyn AwsTransport>, group: impl Into<String>) -> Self {
        Self {
            transport,
            group: group.into(),
        }
    }

    async fn find(&self, id: &str, code: ErrorCode) -> Result<LogStream, HandlerError> {
        let value = self
            .transport
            .call(
                "logs",
                "describe-log-streams",
                &args(&[
                    "--log-group-name",
                    self.group.as_str(),
                    "--log-stream-name-prefix",
                    id,
                ]),
            )
            .await
            .map_err(|error| {
                HandlerError::from_transport(code, format!("failed to describe stream {id}"), error)
            })?;
        let region = &self.transport.scope().region;
        array_field(&value, "logStreams")
            .iter()
            .map(|stream| LogStream::from_json(stream, region))
            .find(|stream| stream.meta.id == id)
            .ok_or_else(|| HandlerError::not_found(format!("log stream {id}")))
    }

    async fn recent_events(&self, stream: &str) -> ActionOutcome {
        let call_args = args(&[
            "--log-group-name",
            self.group.as_str(),
            "--log-stream-name",
            stream,
            "--limit",
            RECENT_EVENT_LIMIT,
            "--no-start-from-head",
        ]);
        match self.transport.call("logs", "get-log-events", &call_args).await {
            Ok(value) => {
                let lines = array_field(&value, "events")
                    .iter()
                    .map(|event| {
                        let at = format_timestamp(parse_time(event.get("timestamp")));
                        let message = str_field(event, "message");
                        Value::String(format!("{at}  {}", message.trim_end()))
                    })
                    .collect::<Vec<_>>();
                let mut detail = DetailMap::new();
                detail.insert("group".to_string(), Value::String(self.group.clone()));
                detail.insert("stream".to_string(), Value::String(stream.to_string()));
                detail.insert("events".to_string(), Value::Array(lines));
                ActionOutcome::Inspect {
                    title: format!("Recent events: {stream}"),
                    detail,
                }
            }
            Err(error) => ActionOutcome::Failed(HandlerError::from_transport(
                ErrorCode::GetFailed,
                format!("failed to read events of {stream}"),
                error,
            )),
        }
    }
}

#[async_trait]
impl ResourceHandler for LogStreamHandler {
    fn resource_type(&self) -> &str {
        "logs:streams"
    }

    fn resource_name(&self) -> &str {
        "Log Streams"
    }

    fn resource_icon(&self) -> &str {
        "≈"
    }

    fn shortcut_key(&self) -> &str {
        "log-streams"
    }

    fn columns(&self) -> &[ColumnDef] {
        &STREAM_COLUMNS
    }

    async fn list(&self, options: &ListOptions) -> Result<ListResult, HandlerError> {
        let mut call_args = args(&[
            "--log-group-name",
            self.group.as_str(),
            "--order-by",
            "LastEventTime",
            "--descending",
        ]);
        call_args.extend(paging_args(options));
        let value = self
            .transport
            .call("logs", "describe-log-streams", &call_args)
            .await
            .map_err(|error| {
                HandlerError::from_transport(
                    ErrorCode::ListFailed,
                    format!("failed to list streams of {}", self.group),
                    error,
                )
            })?;
        let region = &self.transport.scope().region;
        let mut streams = array_field(&value, "logStreams")
            .iter()
            .map(|stream| LogStream::from_json(stream, region))
            .collect::<Vec<_>>();
        retain_matching(&mut streams, &options.filter);
        Ok(ListResult {
            resources: erase(streams),
            next_token: next_token(&value),
        })
    }

    async fn get(&self, id: &str) -> Result<Arc<dyn Resource>, HandlerError> {
        let stream = self.find(id, ErrorCode::GetFailed).await?;
        Ok(Arc::new(stream))
    }

    async fn describe(&self, id: &str) -> Result<DetailMap, HandlerError> {
        let stream = self.find(id, ErrorCode::DescribeFailed).await?;
        let mut detail = stream.detail_map();
        detail.insert("logGroupName".to_string(), Value::String(self.group.clone()));
        Ok(detail)
    }

    fn actions(&self) -> Vec<ActionDef> {
        vec![ActionDef::new('v', "events", "View the most recent events")]
    }

    async fn execute_action(&self, action: &str, resource_id: &str) -> ActionOutcome {
        match action {
            "events" => self.recent_events(resource_id).await,
            _ => ActionOutcome::Failed(HandlerError::not_supported()),
        }
    }
}
