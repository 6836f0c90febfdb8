use super::{
    Searchable, args, array_field, erase, insert_section, next_token, object_to_detail,
    paging_args, parse_tags, parse_time, retain_matching, str_field,
};
use crate::aws::{AwsCliError, AwsTransport};
use crate::error::{ErrorCode, HandlerError};
use crate::handler::ResourceHandler;
use crate::model::{
    ActionDef, ActionOutcome, ColumnDef, DetailMap, ListOptions, ListResult, Resource,
    ResourceMeta, format_timestamp,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// `get-bucket-location` reports the oldest region as a null constraint.
const LEGACY_REGION: &str = "us-east-1";

const BUCKET_COLUMNS: [ColumnDef; 3] = [
    ColumnDef::new("NAME", 48, true),
    ColumnDef::new("REGION", 14, true),
    ColumnDef::new("CREATED", 17, true),
];

#[derive(Debug, Clone)]
pub struct S3Bucket {
    meta: ResourceMeta,
    bucket_region: String,
    raw: Value,
}

impl S3Bucket {
    fn from_json(value: &Value, region: &str) -> Self {
        let name = str_field(value, "Name");
        Self {
            meta: ResourceMeta::new("s3:buckets", name.clone(), region)
                .named(name.clone())
                .with_arn(format!("arn:aws:s3:::{name}"))
                .created(parse_time(value.get("CreationDate"))),
            bucket_region: str_field(value, "BucketRegion"),
            raw: value.clone(),
        }
    }
}

impl Resource for S3Bucket {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn table_row(&self) -> Vec<String> {
        let region = if self.bucket_region.is_empty() {
            "-".to_string()
        } else {
            self.bucket_region.clone()
        };
        vec![
            self.meta.name.clone(),
            region,
            format_timestamp(self.meta.created_at),
        ]
    }

    fn detail_map(&self) -> DetailMap {
        object_to_detail(&self.raw)
    }
}

impl Searchable for S3Bucket {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.meta.name.as_str(), self.bucket_region.as_str()]
    }
}

pub struct BucketHandler {
    transport: Arc<dyn AwsTransport>,
}

impl BucketHandler {
    pub fn new(transport: Arc<dyn AwsTransport>) -> Self {
        Self { transport }
    }

    async fn find(&self, id: &str, code: ErrorCode) -> Result<S3Bucket, HandlerError> {
        let value = self
            .transport
            .call("s3api", "list-buckets", &args(&["--prefix", id]))
            .await
            .map_err(|error| {
                HandlerError::from_transport(code, format!("failed to look up bucket {id}"), error)
            })?;
        let region = &self.transport.scope().region;
        array_field(&value, "Buckets")
            .iter()
            .map(|bucket| S3Bucket::from_json(bucket, region))
            .find(|bucket| bucket.meta.id == id)
            .ok_or_else(|| HandlerError::not_found(format!("bucket {id}")))
    }

    async fn bucket_call(&self, operation: &str, bucket: &str) -> Result<Value, AwsCliError> {
        self.transport
            .call("s3api", operation, &args(&["--bucket", bucket]))
            .await
    }

    async fn policy(&self, bucket: &str) -> ActionOutcome {
        let value = match self.bucket_call("get-bucket-policy", bucket).await {
            Ok(value) => value,
            Err(AwsCliError::NotFound { .. }) => {
                return ActionOutcome::Done(Some(format!("No bucket policy on {bucket}")));
            }
            Err(error) => {
                return ActionOutcome::Failed(HandlerError::from_transport(
                    ErrorCode::DescribeFailed,
                    format!("failed to read policy of {bucket}"),
                    error,
                ));
            }
        };
        // The policy document arrives as an escaped JSON string.
        let raw = str_field(&value, "Policy");
        let document = serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw));
        ActionOutcome::Inspect {
            title: format!("Bucket policy: {bucket}"),
            detail: object_to_detail(&document),
        }
    }
}

#[async_trait]
impl ResourceHandler for BucketHandler {
    fn resource_type(&self) -> &str {
        "s3:buckets"
    }

    fn resource_name(&self) -> &str {
        "S3 Buckets"
    }

    fn resource_icon(&self) -> &str {
        "◫"
    }

    fn shortcut_key(&self) -> &str {
        "s3"
    }

    fn columns(&self) -> &[ColumnDef] {
        &BUCKET_COLUMNS
    }

    async fn list(&self, options: &ListOptions) -> Result<ListResult, HandlerError> {
        let value = self
            .transport
            .call("s3api", "list-buckets", &paging_args(options))
            .await
            .map_err(|error| {
                HandlerError::from_transport(ErrorCode::ListFailed, "failed to list buckets", error)
            })?;
        let region = &self.transport.scope().region;
        let mut buckets = array_field(&value, "Buckets")
            .iter()
            .map(|bucket| S3Bucket::from_json(bucket, region))
            .collect::<Vec<_>>();
        retain_matching(&mut buckets, &options.filter);
        Ok(ListResult {
            resources: erase(buckets),
            next_token: next_token(&value),
        })
    }

    async fn get(&self, id: &str) -> Result<Arc<dyn Resource>, HandlerError> {
        let bucket = self.find(id, ErrorCode::GetFailed).await?;
        Ok(Arc::new(bucket))
    }

    async fn describe(&self, id: &str) -> Result<DetailMap, HandlerError> {
        let bucket = self.find(id, ErrorCode::DescribeFailed).await?;
        let mut detail = bucket.detail_map();

        let location = self.bucket_call("get-bucket-location", id).await.map(|value| {
            match value.get("LocationConstraint") {
                Some(Value::String(region)) if !region.is_empty() => json!(region),
                _ => json!(LEGACY_REGION),
            }
        });
        insert_section(&mut detail, "Location", location);

        let versioning = self.bucket_call("get-bucket-versioning", id).await;
        insert_section(&mut detail, "Versioning", versioning);

        let tags = self.bucket_call("get-bucket-tagging", id).await.map(|value| {
            serde_json::to_value(parse_tags(value.get("TagSet"))).unwrap_or(Value::Null)
        });
        insert_section(&mut detail, "Tags", tags);

        let encryption = self.bucket_call("get-bucket-encryption", id).await.map(|value| {
            value
                .get("ServerSideEncryptionConfiguration")
                .cloned()
                .unwrap_or(Value::Null)
        });
        insert_section(&mut detail, "Encryption", encryption);
        Ok(detail)
    }

    fn actions(&self) -> Vec<ActionDef> {
        vec![ActionDef::new('p', "policy", "Show the bucket policy")]
    }

    async fn execute_action(&self, action: &str, resource_id: &str) -> ActionOutcome {
        match action {
            "policy" => self.policy(resource_id).await,
            _ => ActionOutcome::Failed(HandlerError::not_supported()),
        }
    }
}
