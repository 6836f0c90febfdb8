pub mod dynamodb;
pub mod ec2;
pub mod ecs;
pub mod logs;
pub mod s3;

use crate::aws::{AwsCliError, AwsTransport};
use crate::model::{DetailMap, ListOptions, Resource, TagMap};
use crate::registry::{Registry, RegistryError};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Builds the handler set for one scope. `aliases` are user-defined extra
/// command names.
pub fn build_registry(
    transport: Arc<dyn AwsTransport>,
    aliases: &BTreeMap<String, String>,
) -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    registry.register(Arc::new(ecs::ClusterHandler::new(transport.clone())))?;
    registry.register(Arc::new(logs::LogGroupHandler::new(transport.clone())))?;
    registry.register(Arc::new(dynamodb::TableHandler::new(transport.clone())))?;
    registry.register(Arc::new(ec2::InstanceHandler::new(transport.clone())))?;
    registry.register(Arc::new(s3::BucketHandler::new(transport)))?;
    for (alias, target) in aliases {
        registry.add_alias(alias, target)?;
    }
    Ok(registry)
}

/// Fields a list filter is matched against when the API has no
/// server-side substring filter.
pub(crate) trait Searchable {
    fn search_fields(&self) -> Vec<&str>;
}

pub(crate) fn retain_matching<R: Searchable>(items: &mut Vec<R>, filter: &str) {
    let needle = filter.trim().to_lowercase();
    if needle.is_empty() {
        return;
    }
    items.retain(|item| {
        item.search_fields()
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    });
}

pub(crate) fn erase<R: Resource + 'static>(items: Vec<R>) -> Vec<Arc<dyn Resource>> {
    items
        .into_iter()
        .map(|item| Arc::new(item) as Arc<dyn Resource>)
        .collect()
}

pub(crate) fn paging_args(options: &ListOptions) -> Vec<String> {
    let mut args = vec!["--max-items".to_string(), options.page_size.max(1).to_string()];
    if !options.next_token.is_empty() {
        args.push("--starting-token".to_string());
        args.push(options.next_token.clone());
    }
    args
}

pub(crate) fn next_token(value: &Value) -> String {
    str_field(value, "NextToken")
}

pub(crate) fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

pub(crate) fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn num_field(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or_default()
}

pub(crate) fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Accepts both `[{"Key": .., "Value": ..}]` (either casing) and plain
/// object tag encodings.
pub(crate) fn parse_tags(value: Option<&Value>) -> TagMap {
    let mut tags = TagMap::new();
    match value {
        Some(Value::Array(items)) => {
            for item in items {
                let key = item.get("Key").or_else(|| item.get("key"));
                let val = item.get("Value").or_else(|| item.get("value"));
                if let Some(key) = key.and_then(Value::as_str) {
                    let val = val.and_then(Value::as_str).unwrap_or_default();
                    tags.insert(key.to_string(), val.to_string());
                }
            }
        }
        Some(Value::Object(map)) => {
            for (key, val) in map {
                tags.insert(key.clone(), val.as_str().unwrap_or_default().to_string());
            }
        }
        _ => {}
    }
    tags
}

/// Timestamps arrive as RFC 3339 strings or epoch numbers (seconds or
/// milliseconds, depending on the service).
pub(crate) fn parse_time(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|time| time.with_timezone(&Utc)),
        Value::Number(number) => {
            let raw = number.as_f64()?;
            if raw > 1e11 {
                Utc.timestamp_millis_opt(raw as i64).single()
            } else {
                Utc.timestamp_opt(raw as i64, 0).single()
            }
        }
        _ => None,
    }
}

pub(crate) fn object_to_detail(value: &Value) -> DetailMap {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        other => {
            let mut detail = DetailMap::new();
            detail.insert("Value".to_string(), other.clone());
            detail
        }
    }
}

/// Adds an enrichment section, leaving it out when its call failed.
pub(crate) fn insert_section(
    detail: &mut DetailMap,
    section: &str,
    result: Result<Value, AwsCliError>,
) {
    match result {
        Ok(value) => {
            detail.insert(section.to_string(), value);
        }
        Err(error) => warn!("omitting {section}: {error}"),
    }
}

pub(crate) fn last_segment(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

pub(crate) fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Searchable, build_registry, format_bytes, last_segment, paging_args, parse_tags,
        parse_time, retain_matching,
    };
    use crate::model::ListOptions;
    use crate::testing::FakeTransport;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct Named(&'static str, &'static str);

    impl Searchable for Named {
        fn search_fields(&self) -> Vec<&str> {
            vec![self.0, self.1]
        }
    }

    #[test]
    fn client_filter_matches_documented_fields() {
        let mut items = vec![Named("api", "RUNNING"), Named("worker", "STOPPED")];
        retain_matching(&mut items, "stop");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0, "worker");
    }

    #[test]
    fn paging_args_replay_token_verbatim() {
        let options = ListOptions {
            next_token: "eyJOZXh0VG9rZW4iOiBudWxsfQ==".to_string(),
            page_size: 50,
            ..ListOptions::default()
        };
        assert_eq!(
            paging_args(&options),
            vec![
                "--max-items",
                "50",
                "--starting-token",
                "eyJOZXh0VG9rZW4iOiBudWxsfQ=="
            ]
        );
        assert_eq!(paging_args(&ListOptions::default()), vec!["--max-items", "50"]);
    }

    #[test]
    fn tags_parse_from_list_and_object_forms() {
        let listed = parse_tags(Some(&json!([{"Key": "env", "Value": "prod"}])));
        let lower = parse_tags(Some(&json!([{"key": "team", "value": "x"}])));
        let object = parse_tags(Some(&json!({"owner": "ops"})));
        assert_eq!(listed.get("env").map(String::as_str), Some("prod"));
        assert_eq!(lower.get("team").map(String::as_str), Some("x"));
        assert_eq!(object.get("owner").map(String::as_str), Some("ops"));
        assert!(parse_tags(None).is_empty());
    }

    #[test]
    fn times_parse_from_strings_and_epochs() {
        let rfc = parse_time(Some(&json!("2024-03-01T10:00:00Z"))).expect("rfc3339");
        let seconds = parse_time(Some(&json!(1709287200.0))).expect("seconds");
        let millis = parse_time(Some(&json!(1709287200000i64))).expect("millis");
        assert_eq!(rfc, seconds);
        assert_eq!(rfc, millis);
        assert!(parse_time(Some(&json!(true))).is_none());
    }

    #[test]
    fn helpers_format_display_values() {
        assert_eq!(last_segment("arn:aws:ecs:us-east-1:1:task/prod/abc123"), "abc123");
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(1536), "1.5KiB");
    }

    #[test]
    fn registry_contains_root_handlers_in_order() {
        let mut aliases = BTreeMap::new();
        aliases.insert("cw".to_string(), "logs".to_string());
        let registry =
            build_registry(Arc::new(FakeTransport::new()), &aliases).expect("registry builds");
        assert_eq!(
            registry.types(),
            [
                "ecs:clusters",
                "logs:groups",
                "dynamodb:tables",
                "ec2:instances",
                "s3:buckets"
            ]
        );
        assert!(registry.get("cw").is_some());
        assert!(registry.get("ddb").is_some());
    }
}
