use super::{
    Searchable, args, array_field, erase, insert_section, next_token, object_to_detail,
    paging_args, parse_tags, parse_time, retain_matching, str_field,
};
use crate::aws::{AwsTransport, scope_args};
use crate::error::{ErrorCode, HandlerError};
use crate::handler::ResourceHandler;
use crate::model::{
    ActionDef, ActionOutcome, ColumnDef, DetailMap, ListOptions, ListResult, Resource,
    ResourceMeta, format_timestamp,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

const INSTANCE_COLUMNS: [ColumnDef; 7] = [
    ColumnDef::new("NAME", 28, true),
    ColumnDef::new("INSTANCE ID", 20, true),
    ColumnDef::new("STATE", 10, true),
    ColumnDef::new("TYPE", 12, true),
    ColumnDef::new("AZ", 12, true),
    ColumnDef::new("PRIVATE IP", 15, false),
    ColumnDef::new("LAUNCHED", 17, true),
];

#[derive(Debug, Clone)]
pub struct Ec2Instance {
    meta: ResourceMeta,
    state: String,
    instance_type: String,
    zone: String,
    private_ip: String,
    raw: Value,
}

impl Ec2Instance {
    fn from_json(value: &Value, region: &str) -> Self {
        let id = str_field(value, "InstanceId");
        let tags = parse_tags(value.get("Tags"));
        let name = tags.get("Name").cloned().unwrap_or_default();
        let state = value
            .get("State")
            .map(|state| str_field(state, "Name"))
            .unwrap_or_default();
        let zone = value
            .get("Placement")
            .map(|placement| str_field(placement, "AvailabilityZone"))
            .unwrap_or_default();
        Self {
            meta: ResourceMeta::new("ec2:instances", id, region)
                .named(name)
                .created(parse_time(value.get("LaunchTime")))
                .tagged(tags),
            state,
            instance_type: str_field(value, "InstanceType"),
            zone,
            private_ip: str_field(value, "PrivateIpAddress"),
            raw: value.clone(),
        }
    }

    fn display_name(&self) -> &str {
        if self.meta.name.is_empty() {
            "-"
        } else {
            &self.meta.name
        }
    }
}

impl Resource for Ec2Instance {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.display_name().to_string(),
            self.meta.id.clone(),
            self.state.clone(),
            self.instance_type.clone(),
            self.zone.clone(),
            self.private_ip.clone(),
            format_timestamp(self.meta.created_at),
        ]
    }

    fn detail_map(&self) -> DetailMap {
        object_to_detail(&self.raw)
    }
}

impl Searchable for Ec2Instance {
    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.meta.name.as_str(),
            self.meta.id.as_str(),
            self.state.as_str(),
            self.instance_type.as_str(),
            self.private_ip.as_str(),
        ]
    }
}

pub struct InstanceHandler {
    transport: Arc<dyn AwsTransport>,
}

impl InstanceHandler {
    pub fn new(transport: Arc<dyn AwsTransport>) -> Self {
        Self { transport }
    }

    async fn find(&self, id: &str, code: ErrorCode) -> Result<Ec2Instance, HandlerError> {
        let value = self
            .transport
            .call("ec2", "describe-instances", &args(&["--instance-ids", id]))
            .await
            .map_err(|error| {
                HandlerError::from_transport(code, format!("failed to describe instance {id}"), error)
            })?;
        instances(&value, &self.transport.scope().region)
            .into_iter()
            .find(|instance| instance.meta.id == id)
            .ok_or_else(|| HandlerError::not_found(format!("instance {id}")))
    }

    async fn change_state(&self, operation: &str, verb: &str, id: &str) -> ActionOutcome {
        match self
            .transport
            .call("ec2", operation, &args(&["--instance-ids", id]))
            .await
        {
            Ok(_) => ActionOutcome::Done(Some(format!("{verb} instance {id}"))),
            Err(error) => ActionOutcome::Failed(HandlerError::from_transport(
                ErrorCode::UpdateFailed,
                format!("failed to {operation} {id}"),
                error,
            )),
        }
    }

    async fn connection_info(&self, id: &str) -> ActionOutcome {
        let instance = match self.find(id, ErrorCode::GetFailed).await {
            Ok(instance) => instance,
            Err(error) => return ActionOutcome::Failed(error),
        };
        let mut session = args(&["aws", "ssm", "start-session", "--target", id]);
        session.extend(scope_args(self.transport.scope()));
        let mut detail = DetailMap::new();
        for (label, field) in [
            ("PrivateIp", "PrivateIpAddress"),
            ("PrivateDns", "PrivateDnsName"),
            ("PublicIp", "PublicIpAddress"),
            ("PublicDns", "PublicDnsName"),
            ("KeyName", "KeyName"),
        ] {
            let value = str_field(&instance.raw, field);
            if !value.is_empty() {
                detail.insert(label.to_string(), json!(value));
            }
        }
        detail.insert("SessionManager".to_string(), json!(session.join(" ")));
        ActionOutcome::Inspect {
            title: format!("Connect: {}", instance.display_name()),
            detail,
        }
    }
}

fn instances(value: &Value, region: &str) -> Vec<Ec2Instance> {
    array_field(value, "Reservations")
        .iter()
        .flat_map(|reservation| array_field(reservation, "Instances"))
        .map(|instance| Ec2Instance::from_json(instance, region))
        .collect()
}

#[async_trait]
impl ResourceHandler for InstanceHandler {
    fn resource_type(&self) -> &str {
        "ec2:instances"
    }

    fn resource_name(&self) -> &str {
        "EC2 Instances"
    }

    fn resource_icon(&self) -> &str {
        "▣"
    }

    fn shortcut_key(&self) -> &str {
        "ec2"
    }

    fn columns(&self) -> &[ColumnDef] {
        &INSTANCE_COLUMNS
    }

    async fn list(&self, options: &ListOptions) -> Result<ListResult, HandlerError> {
        let value = self
            .transport
            .call("ec2", "describe-instances", &paging_args(options))
            .await
            .map_err(|error| {
                HandlerError::from_transport(ErrorCode::ListFailed, "failed to list instances", error)
            })?;
        let mut found = instances(&value, &self.transport.scope().region);
        retain_matching(&mut found, &options.filter);
        Ok(ListResult {
            resources: erase(found),
            next_token: next_token(&value),
        })
    }

    async fn get(&self, id: &str) -> Result<Arc<dyn Resource>, HandlerError> {
        let instance = self.find(id, ErrorCode::GetFailed).await?;
        Ok(Arc::new(instance))
    }

    async fn describe(&self, id: &str) -> Result<DetailMap, HandlerError> {
        let instance = self.find(id, ErrorCode::DescribeFailed).await?;
        let mut detail = instance.detail_map();
        let status = self
            .transport
            .call(
                "ec2",
                "describe-instance-status",
                &args(&["--instance-ids", id, "--include-all-instances"]),
            )
            .await
            .map(|value| {
                array_field(&value, "InstanceStatuses")
                    .first()
                    .cloned()
                    .unwrap_or(Value::Null)
            });
        insert_section(&mut detail, "Status", status);
        Ok(detail)
    }

    fn actions(&self) -> Vec<ActionDef> {
        vec![
            ActionDef::new('s', "start", "Start the instance"),
            ActionDef::dangerous('S', "stop", "Stop the instance"),
            ActionDef::dangerous('r', "reboot", "Reboot the instance"),
            ActionDef::new('c', "connect", "Show connection details"),
        ]
    }

    async fn execute_action(&self, action: &str, resource_id: &str) -> ActionOutcome {
        match action {
            "start" => self.change_state("start-instances", "Starting", resource_id).await,
            "stop" => self.change_state("stop-instances", "Stopping", resource_id).await,
            "reboot" => self.change_state("reboot-instances", "Rebooting", resource_id).await,
            "connect" => self.connection_info(resource_id).await,
            _ => ActionOutcome::Failed(HandlerError::not_supported()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::InstanceHandler;
    use crate::error::ErrorCode;
    use crate::handler::ResourceHandler;
    use crate::model::{ActionOutcome, ListOptions};
    use crate::testing::{FakeFailure, FakeTransport};
    use serde_json::json;
    use std::sync::Arc;

    fn reservations() -> serde_json::Value {
        json!({
            "Reservations": [
                {"Instances": [{
                    "InstanceId": "i-0aaa",
                    "InstanceType": "t3.micro",
                    "State": {"Name": "running"},
                    "Placement": {"AvailabilityZone": "us-east-1a"},
                    "PrivateIpAddress": "10.0.0.4",
                    "PublicIpAddress": "3.3.3.3",
                    "LaunchTime": "2024-05-01T08:30:00+00:00",
                    "Tags": [{"Key": "Name", "Value": "bastion"}, {"Key": "env", "Value": "prod"}]
                }]},
                {"Instances": [{
                    "InstanceId": "i-0bbb",
                    "InstanceType": "m5.large",
                    "State": {"Name": "stopped"}
                }]}
            ],
            "NextToken": "page-2"
        })
    }

    #[tokio::test]
    async fn list_flattens_reservations() {
        let transport = Arc::new(FakeTransport::new().respond("ec2", "describe-instances", reservations()));
        let handler = InstanceHandler::new(transport);
        let result = handler
            .list(&ListOptions::default())
            .await
            .expect("list succeeds");

        assert_eq!(result.next_token, "page-2");
        assert_eq!(result.resources.len(), 2);
        assert_eq!(
            result.resources[0].table_row(),
            vec![
                "bastion",
                "i-0aaa",
                "running",
                "t3.micro",
                "us-east-1a",
                "10.0.0.4",
                "2024-05-01 08:30"
            ]
        );
        assert_eq!(result.resources[1].table_row()[0], "-");
        assert_eq!(result.resources[1].name(), "i-0bbb");
    }

    #[tokio::test]
    async fn stop_reports_transport_failure_as_update_failed() {
        let transport = Arc::new(FakeTransport::new().fail("ec2", "stop-instances", FakeFailure::Broken));
        let handler = InstanceHandler::new(transport);
        let ActionOutcome::Failed(error) = handler.execute_action("stop", "i-0aaa").await else {
            panic!("expected failure");
        };
        assert_eq!(error.code, ErrorCode::UpdateFailed);
    }

    #[tokio::test]
    async fn connect_inspects_addresses() {
        let transport = Arc::new(FakeTransport::new().respond("ec2", "describe-instances", reservations()));
        let handler = InstanceHandler::new(transport);
        let ActionOutcome::Inspect { title, detail } =
            handler.execute_action("connect", "i-0aaa").await
        else {
            panic!("expected inspect");
        };
        assert_eq!(title, "Connect: bastion");
        assert_eq!(detail.get("PublicIp"), Some(&json!("3.3.3.3")));
        assert_eq!(
            detail.get("SessionManager"),
            Some(&json!(
                "aws ssm start-session --target i-0aaa --profile test --region us-east-1"
            ))
        );
    }

    #[test]
    fn reboot_key_shadows_builtin_refresh() {
        let handler = InstanceHandler::new(Arc::new(FakeTransport::new()));
        let reboot = crate::handler::find_action(&handler, 'r').expect("bound");
        assert_eq!(reboot.name, "reboot");
        assert!(reboot.dangerous);
    }
}
