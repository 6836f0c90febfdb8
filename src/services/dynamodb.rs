use super::{
    Searchable, args, array_field, erase, format_bytes, insert_section, next_token, num_field,
    object_to_detail, paging_args, parse_tags, parse_time, retain_matching, str_field,
};
use crate::aws::{AwsCliError, AwsTransport};
use crate::error::{ErrorCode, HandlerError, ValidationReport};
use crate::handler::ResourceHandler;
use crate::model::{
    ActionDef, ActionOutcome, ColumnDef, DetailMap, ListOptions, ListResult, NavTarget,
    Resource, ResourceMeta,
};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;

const PREVIEW_ATTRIBUTES: usize = 4;

const TABLE_COLUMNS: [ColumnDef; 6] = [
    ColumnDef::new("NAME", 32, true),
    ColumnDef::new("STATUS", 10, true),
    ColumnDef::new("ITEMS", 10, true),
    ColumnDef::new("SIZE", 10, false),
    ColumnDef::new("KEYS", 28, false),
    ColumnDef::new("BILLING", 16, true),
];

const ITEM_COLUMNS: [ColumnDef; 3] = [
    ColumnDef::new("KEY", 36, true),
    ColumnDef::new("ATTRS", 6, true),
    ColumnDef::new("PREVIEW", 60, false),
];

#[derive(Debug, Clone)]
pub struct DynamoTable {
    meta: ResourceMeta,
    status: String,
    items: String,
    size: String,
    keys: String,
    billing: String,
    raw: Value,
}

impl DynamoTable {
    fn from_json(table: &Value, region: &str) -> Self {
        let name = str_field(table, "TableName");
        let keys = array_field(table, "KeySchema")
            .iter()
            .map(|key| format!("{} ({})", str_field(key, "AttributeName"), str_field(key, "KeyType")))
            .collect::<Vec<_>>()
            .join(", ");
        let billing = table
            .get("BillingModeSummary")
            .map(|summary| str_field(summary, "BillingMode"))
            .filter(|mode| !mode.is_empty())
            .unwrap_or_else(|| "PROVISIONED".to_string());
        Self {
            meta: ResourceMeta::new("dynamodb:tables", name.clone(), region)
                .named(name)
                .with_arn(str_field(table, "TableArn"))
                .created(parse_time(table.get("CreationDateTime"))),
            status: str_field(table, "TableStatus"),
            items: num_field(table, "ItemCount").to_string(),
            size: format_bytes(num_field(table, "TableSizeBytes")),
            keys,
            billing,
            raw: table.clone(),
        }
    }

    /// Row for a table whose describe call failed; the name is all we know.
    fn unknown(name: &str, region: &str) -> Self {
        Self {
            meta: ResourceMeta::new("dynamodb:tables", name, region).named(name),
            status: "UNKNOWN".to_string(),
            items: "-".to_string(),
            size: "-".to_string(),
            keys: String::new(),
            billing: String::new(),
            raw: Value::Null,
        }
    }
}

impl Resource for DynamoTable {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.meta.name.clone(),
            self.status.clone(),
            self.items.clone(),
            self.size.clone(),
            self.keys.clone(),
            self.billing.clone(),
        ]
    }

    fn detail_map(&self) -> DetailMap {
        object_to_detail(&self.raw)
    }
}

impl Searchable for DynamoTable {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.meta.name.as_str(), self.status.as_str()]
    }
}

pub struct TableHandler {
    transport: Arc<dyn AwsTransport>,
}

impl TableHandler {
    pub fn new(transport: Arc<dyn AwsTransport>) -> Self {
        Self { transport }
    }

    async fn describe_table(&self, name: &str) -> Result<Value, AwsCliError> {
        let value = self
            .transport
            .call("dynamodb", "describe-table", &args(&["--table-name", name]))
            .await?;
        Ok(value.get("Table").cloned().unwrap_or(Value::Null))
    }

    async fn find(&self, id: &str, code: ErrorCode) -> Result<DynamoTable, HandlerError> {
        let table = self.describe_table(id).await.map_err(|error| {
            HandlerError::from_transport(code, format!("failed to describe table {id}"), error)
        })?;
        if table.is_null() {
            return Err(HandlerError::not_found(format!("table {id}")));
        }
        Ok(DynamoTable::from_json(&table, &self.transport.scope().region))
    }
}

#[async_trait]
impl ResourceHandler for TableHandler {
    fn resource_type(&self) -> &str {
        "dynamodb:tables"
    }

    fn resource_name(&self) -> &str {
        "DynamoDB Tables"
    }

    fn resource_icon(&self) -> &str {
        "▤"
    }

    fn shortcut_key(&self) -> &str {
        "ddb"
    }

    fn columns(&self) -> &[ColumnDef] {
        &TABLE_COLUMNS
    }

    async fn list(&self, options: &ListOptions) -> Result<ListResult, HandlerError> {
        let listed = self
            .transport
            .call("dynamodb", "list-tables", &paging_args(options))
            .await
            .map_err(|error| {
                HandlerError::from_transport(ErrorCode::ListFailed, "failed to list tables", error)
            })?;
        let names = array_field(&listed, "TableNames")
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>();
        let region = &self.transport.scope().region;
        let described = join_all(names.iter().map(|name| self.describe_table(name))).await;
        let mut tables = names
            .iter()
            .zip(described)
            .map(|(name, result)| match result {
                Ok(table) if !table.is_null() => DynamoTable::from_json(&table, region),
                _ => DynamoTable::unknown(name, region),
            })
            .collect::<Vec<_>>();
        retain_matching(&mut tables, &options.filter);
        Ok(ListResult {
            resources: erase(tables),
            next_token: next_token(&listed),
        })
    }

    async fn get(&self, id: &str) -> Result<Arc<dyn Resource>, HandlerError> {
        let table = self.find(id, ErrorCode::GetFailed).await?;
        Ok(Arc::new(table))
    }

    async fn describe(&self, id: &str) -> Result<DetailMap, HandlerError> {
        let table = self.find(id, ErrorCode::DescribeFailed).await?;
        let mut detail = table.detail_map();
        let backups = self
            .transport
            .call(
                "dynamodb",
                "describe-continuous-backups",
                &args(&["--table-name", id]),
            )
            .await
            .map(|value| {
                value
                    .get("ContinuousBackupsDescription")
                    .cloned()
                    .unwrap_or(Value::Null)
            });
        insert_section(&mut detail, "ContinuousBackups", backups);
        let tags = self
            .transport
            .call(
                "dynamodb",
                "list-tags-of-resource",
                &args(&["--resource-arn", table.meta.arn.as_str()]),
            )
            .await
            .map(|value| serde_json::to_value(parse_tags(value.get("Tags"))).unwrap_or(Value::Null));
        insert_section(&mut detail, "Tags", tags);
        Ok(detail)
    }

    fn actions(&self) -> Vec<ActionDef> {
        vec![ActionDef::new('i', "items", "Browse items of this table")]
    }

    async fn execute_action(&self, action: &str, resource_id: &str) -> ActionOutcome {
        match action {
            "items" => ActionOutcome::Navigate(NavTarget::new(
                Arc::new(ItemHandler::new(self.transport.clone(), resource_id)),
                vec![
                    "DynamoDB".to_string(),
                    "Tables".to_string(),
                    resource_id.to_string(),
                    "Items".to_string(),
                ],
            )),
            _ => ActionOutcome::Failed(HandlerError::not_supported()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DynamoItem {
    meta: ResourceMeta,
    key_display: String,
    attribute_count: usize,
    preview: String,
    item: Map<String, Value>,
}

impl DynamoItem {
    fn from_item(item: Map<String, Value>, key_names: &[String], region: &str) -> Self {
        let key = item_key(&item, key_names);
        let key_display = key
            .iter()
            .map(|(name, value)| format!("{name}={}", display_attribute(value)))
            .collect::<Vec<_>>()
            .join(", ");
        let preview = item
            .iter()
            .filter(|(name, _)| !key.contains_key(*name))
            .take(PREVIEW_ATTRIBUTES)
            .map(|(name, value)| format!("{name}={}", display_attribute(value)))
            .collect::<Vec<_>>()
            .join(", ");
        let id = Value::Object(key).to_string();
        Self {
            meta: ResourceMeta::new("dynamodb:items", id, region).named(key_display.clone()),
            key_display,
            attribute_count: item.len(),
            preview,
            item,
        }
    }
}

impl Resource for DynamoItem {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.key_display.clone(),
            self.attribute_count.to_string(),
            self.preview.clone(),
        ]
    }

    /// Attributes in their typed wire form, so edits round-trip.
    fn detail_map(&self) -> DetailMap {
        self.item
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

impl Searchable for DynamoItem {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.key_display.as_str(), self.preview.as_str()]
    }
}

/// Items of one table. Ids are the key attributes serialized as JSON.
pub struct ItemHandler {
    transport: Arc<dyn AwsTransport>,
    table: String,
    key_names: OnceCell<Vec<String>>,
}

impl ItemHandler {
    pub fn new(transport: Arc<dyn AwsTransport>, table: impl Into<String>) -> Self {
        Self {
            transport,
            table: table.into(),
            key_names: OnceCell::new(),
        }
    }

    async fn key_names(&self) -> Result<&[String], AwsCliError> {
        let names = self
            .key_names
            .get_or_try_init(|| async {
                let value = self
                    .transport
                    .call(
                        "dynamodb",
                        "describe-table",
                        &args(&["--table-name", self.table.as_str()]),
                    )
                    .await?;
                let schema = value.get("Table").cloned().unwrap_or(Value::Null);
                Ok::<_, AwsCliError>(
                    array_field(&schema, "KeySchema")
                        .iter()
                        .map(|key| str_field(key, "AttributeName"))
                        .collect(),
                )
            })
            .await?;
        Ok(names.as_slice())
    }

    async fn fetch(&self, id: &str, code: ErrorCode) -> Result<DynamoItem, HandlerError> {
        let key = parse_key(id)?;
        let key_names = self.key_names().await.map_err(|error| {
            HandlerError::from_transport(code, format!("failed to read key schema of {}", self.table), error)
        })?;
        let value = self
            .transport
            .call(
                "dynamodb",
                "get-item",
                &args(&["--table-name", self.table.as_str(), "--key", &key.to_string()]),
            )
            .await
            .map_err(|error| {
                HandlerError::from_transport(code, format!("failed to get item {id}"), error)
            })?;
        match value.get("Item") {
            Some(Value::Object(item)) => Ok(DynamoItem::from_item(
                item.clone(),
                key_names,
                &self.transport.scope().region,
            )),
            _ => Err(HandlerError::not_found(format!("item {id}"))),
        }
    }
}

#[async_trait]
impl ResourceHandler for ItemHandler {
    fn resource_type(&self) -> &str {
        "dynamodb:items"
    }

    fn resource_name(&self) -> &str {
        "DynamoDB Items"
    }

    fn resource_icon(&self) -> &str {
        "▫"
    }

    fn shortcut_key(&self) -> &str {
        "ddb-items"
    }

    fn columns(&self) -> &[ColumnDef] {
        &ITEM_COLUMNS
    }

    async fn list(&self, options: &ListOptions) -> Result<ListResult, HandlerError> {
        let list_failed = |error: AwsCliError| {
            HandlerError::from_transport(
                ErrorCode::ListFailed,
                format!("failed to scan {}", self.table),
                error,
            )
        };
        let key_names = self.key_names().await.map_err(list_failed)?;
        let mut call_args = args(&["--table-name", self.table.as_str()]);
        call_args.extend(paging_args(options));
        let value = self
            .transport
            .call("dynamodb", "scan", &call_args)
            .await
            .map_err(list_failed)?;
        let region = &self.transport.scope().region;
        let mut items = array_field(&value, "Items")
            .iter()
            .filter_map(Value::as_object)
            .map(|item| DynamoItem::from_item(item.clone(), key_names, region))
            .collect::<Vec<_>>();
        retain_matching(&mut items, &options.filter);
        Ok(ListResult {
            resources: erase(items),
            next_token: next_token(&value),
        })
    }

    async fn get(&self, id: &str) -> Result<Arc<dyn Resource>, HandlerError> {
        let item = self.fetch(id, ErrorCode::GetFailed).await?;
        Ok(Arc::new(item))
    }

    async fn describe(&self, id: &str) -> Result<DetailMap, HandlerError> {
        let item = self.fetch(id, ErrorCode::DescribeFailed).await?;
        Ok(item.detail_map())
    }

    fn can_edit(&self) -> bool {
        true
    }

    fn can_delete(&self) -> bool {
        true
    }

    fn validate_update(&self, id: &str, fields: &DetailMap) -> ValidationReport {
        let mut report = ValidationReport::default();
        match parse_key(id) {
            Ok(Value::Object(key)) => {
                for (name, expected) in &key {
                    match fields.get(name) {
                        None => report.push(name, "key attribute is missing"),
                        Some(actual) if actual != expected => {
                            report.push(name, "key attribute cannot change")
                        }
                        Some(_) => {}
                    }
                }
            }
            _ => report.push("id", "item key is not valid JSON"),
        }
        for (name, value) in fields {
            if let Err(message) = check_attribute(value) {
                report.push(name, message);
            }
        }
        report
    }

    async fn update(&self, id: &str, fields: DetailMap) -> Result<(), HandlerError> {
        let report = self.validate_update(id, &fields);
        if !report.is_empty() {
            return Err(HandlerError::new(ErrorCode::UpdateFailed, report.summary()));
        }
        let item = serde_json::to_string(&fields).map_err(|error| {
            HandlerError::with_cause(ErrorCode::UpdateFailed, "failed to encode item", error)
        })?;
        self.transport
            .call(
                "dynamodb",
                "put-item",
                &args(&["--table-name", self.table.as_str(), "--item", &item]),
            )
            .await
            .map(|_| ())
            .map_err(|error| {
                HandlerError::from_transport(ErrorCode::UpdateFailed, format!("failed to put item {id}"), error)
            })
    }

    async fn delete(&self, id: &str) -> Result<(), HandlerError> {
        let key = parse_key(id)?;
        self.transport
            .call(
                "dynamodb",
                "delete-item",
                &args(&["--table-name", self.table.as_str(), "--key", &key.to_string()]),
            )
            .await
            .map(|_| ())
            .map_err(|error| {
                HandlerError::from_transport(ErrorCode::DeleteFailed, format!("failed to delete item {id}"), error)
            })
    }
}

fn parse_key(id: &str) -> Result<Value, HandlerError> {
    match serde_json::from_str::<Value>(id) {
        Ok(key @ Value::Object(_)) => Ok(key),
        Ok(_) => Err(HandlerError::new(ErrorCode::GetFailed, format!("item key {id} is not an object"))),
        Err(error) => Err(HandlerError::with_cause(
            ErrorCode::GetFailed,
            format!("item key {id} is not valid JSON"),
            error,
        )),
    }
}

fn item_key(item: &Map<String, Value>, key_names: &[String]) -> Map<String, Value> {
    key_names
        .iter()
        .filter_map(|name| item.get(name).map(|value| (name.clone(), value.clone())))
        .collect()
}

/// One typed attribute, e.g. `{"S": "abc"}` or `{"N": "42"}`.
fn check_attribute(value: &Value) -> Result<(), String> {
    let Some(object) = value.as_object() else {
        return Err("expected a typed attribute object".to_string());
    };
    let mut entries = object.iter();
    let (Some((tag, inner)), None) = (entries.next(), entries.next()) else {
        return Err("expected exactly one attribute type".to_string());
    };
    let valid = match tag.as_str() {
        "S" | "B" => inner.is_string(),
        "N" => inner.as_str().is_some_and(|raw| raw.trim().parse::<f64>().is_ok()),
        "BOOL" => inner.is_boolean(),
        "NULL" => inner.as_bool() == Some(true),
        "M" => inner
            .as_object()
            .is_some_and(|map| map.values().all(|nested| check_attribute(nested).is_ok())),
        "L" => inner
            .as_array()
            .is_some_and(|list| list.iter().all(|nested| check_attribute(nested).is_ok())),
        "SS" | "BS" => inner
            .as_array()
            .is_some_and(|set| !set.is_empty() && set.iter().all(Value::is_string)),
        "NS" => inner.as_array().is_some_and(|set| {
            !set.is_empty()
                && set
                    .iter()
                    .all(|entry| entry.as_str().is_some_and(|raw| raw.parse::<f64>().is_ok()))
        }),
        other => return Err(format!("unknown attribute type {other}")),
    };
    if valid {
        Ok(())
    } else {
        Err(format!("malformed {tag} attribute"))
    }
}

fn display_attribute(value: &Value) -> String {
    let Some((tag, inner)) = value.as_object().and_then(|object| object.iter().next()) else {
        return value.to_string();
    };
    match (tag.as_str(), inner) {
        ("S" | "N", Value::String(raw)) => raw.clone(),
        ("BOOL", Value::Bool(flag)) => flag.to_string(),
        ("NULL", _) => "null".to_string(),
        _ => inner.to_string(),
    }
}
