use super::{
    Searchable, args, array_field, erase, insert_section, last_segment, next_token,
    num_field, object_to_detail, paging_args, parse_tags, parse_time, retain_matching, str_field,
};
use crate::aws::{AwsCliError, AwsTransport, scope_args};
use crate::error::{ErrorCode, HandlerError};
use crate::handler::ResourceHandler;
use crate::model::{
    ActionDef, ActionOutcome, ColumnDef, DetailMap, ExternalCommand, ListOptions, ListResult,
    NavTarget, Resource, ResourceMeta, format_timestamp,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

const DESCRIBE_SERVICES_BATCH: usize = 10;
const DESCRIBE_TASKS_BATCH: usize = 100;

const CLUSTER_COLUMNS: [ColumnDef; 6] = [
    ColumnDef::new("NAME", 32, true),
    ColumnDef::new("STATUS", 10, true),
    ColumnDef::new("SERVICES", 9, true),
    ColumnDef::new("RUNNING", 8, true),
    ColumnDef::new("PENDING", 8, true),
    ColumnDef::new("INSTANCES", 10, true),
];

const SERVICE_COLUMNS: [ColumnDef; 7] = [
    ColumnDef::new("NAME", 32, true),
    ColumnDef::new("STATUS", 10, true),
    ColumnDef::new("DESIRED", 8, true),
    ColumnDef::new("RUNNING", 8, true),
    ColumnDef::new("PENDING", 8, true),
    ColumnDef::new("LAUNCH", 9, true),
    ColumnDef::new("TASK DEF", 28, false),
];

const TASK_COLUMNS: [ColumnDef; 7] = [
    ColumnDef::new("TASK", 34, true),
    ColumnDef::new("STATUS", 12, true),
    ColumnDef::new("DESIRED", 12, true),
    ColumnDef::new("LAUNCH", 9, true),
    ColumnDef::new("CPU", 6, false),
    ColumnDef::new("MEMORY", 7, false),
    ColumnDef::new("STARTED", 17, true),
];

#[derive(Debug, Clone)]
pub struct EcsCluster {
    meta: ResourceMeta,
    status: String,
    services: i64,
    running: i64,
    pending: i64,
    instances: i64,
    raw: Value,
}

impl EcsCluster {
    fn from_json(value: &Value, region: &str) -> Self {
        let name = str_field(value, "clusterName");
        Self {
            meta: ResourceMeta::new("ecs:clusters", name.clone(), region)
                .named(name)
                .with_arn(str_field(value, "clusterArn"))
                .tagged(parse_tags(value.get("tags"))),
            status: str_field(value, "status"),
            services: num_field(value, "activeServicesCount"),
            running: num_field(value, "runningTasksCount"),
            pending: num_field(value, "pendingTasksCount"),
            instances: num_field(value, "registeredContainerInstancesCount"),
            raw: value.clone(),
        }
    }
}

impl Resource for EcsCluster {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.meta.name.clone(),
            self.status.clone(),
            self.services.to_string(),
            self.running.to_string(),
            self.pending.to_string(),
            self.instances.to_string(),
        ]
    }

    fn detail_map(&self) -> DetailMap {
        object_to_detail(&self.raw)
    }
}

impl Searchable for EcsCluster {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.meta.name.as_str(), self.status.as_str()]
    }
}

pub struct ClusterHandler {
    transport: Arc<dyn AwsTransport>,
}

impl ClusterHandler {
    pub fn new(transport: Arc<dyn AwsTransport>) -> Self {
        Self { transport }
    }

    async fn describe_clusters(&self, clusters: &[String]) -> Result<Vec<EcsCluster>, AwsCliError> {
        let mut call_args = args(&["--include", "TAGS", "--clusters"]);
        call_args.extend(clusters.iter().cloned());
        let value = self
            .transport
            .call("ecs", "describe-clusters", &call_args)
            .await?;
        let region = &self.transport.scope().region;
        Ok(array_field(&value, "clusters")
            .iter()
            .map(|cluster| EcsCluster::from_json(cluster, region))
            .collect())
    }

    async fn find(&self, id: &str, code: ErrorCode) -> Result<EcsCluster, HandlerError> {
        self.describe_clusters(&[id.to_string()])
            .await
            .map_err(|error| {
                HandlerError::from_transport(code, format!("failed to describe cluster {id}"), error)
            })?
            .into_iter()
            .next()
            .ok_or_else(|| HandlerError::not_found(format!("cluster {id}")))
    }
}

#[async_trait]
impl ResourceHandler for ClusterHandler {
    fn resource_type(&self) -> &str {
        "ecs:clusters"
    }

    fn resource_name(&self) -> &str {
        "ECS Clusters"
    }

    fn resource_icon(&self) -> &str {
        "▣"
    }

    fn shortcut_key(&self) -> &str {
        "ecs"
    }

    fn columns(&self) -> &[ColumnDef] {
        &CLUSTER_COLUMNS
    }

    async fn list(&self, options: &ListOptions) -> Result<ListResult, HandlerError> {
        let list_failed = |error| {
            HandlerError::from_transport(ErrorCode::ListFailed, "failed to list ECS clusters", error)
        };
        let listed = self
            .transport
            .call("ecs", "list-clusters", &paging_args(options))
            .await
            .map_err(list_failed)?;
        let arns = string_array(&listed, "clusterArns");
        let mut clusters = if arns.is_empty() {
            Vec::new()
        } else {
            self.describe_clusters(&arns).await.map_err(list_failed)?
        };
        retain_matching(&mut clusters, &options.filter);
        Ok(ListResult {
            resources: erase(clusters),
            next_token: next_token(&listed),
        })
    }

    async fn get(&self, id: &str) -> Result<Arc<dyn Resource>, HandlerError> {
        let cluster = self.find(id, ErrorCode::GetFailed).await?;
        Ok(Arc::new(cluster))
    }

    async fn describe(&self, id: &str) -> Result<DetailMap, HandlerError> {
        let cluster = self.find(id, ErrorCode::DescribeFailed).await?;
        let mut detail = cluster.detail_map();
        let services = self
            .transport
            .call("ecs", "list-services", &args(&["--cluster", id, "--max-items", "100"]))
            .await
            .map(|value| {
                Value::Array(
                    string_array(&value, "serviceArns")
                        .iter()
                        .map(|arn| Value::String(last_segment(arn).to_string()))
                        .collect(),
                )
            });
        insert_section(&mut detail, "Services", services);
        Ok(detail)
    }

    fn actions(&self) -> Vec<ActionDef> {
        vec![
            ActionDef::new('s', "services", "Browse services in this cluster"),
            ActionDef::new('t', "tasks", "Browse tasks in this cluster"),
        ]
    }

    async fn execute_action(&self, action: &str, resource_id: &str) -> ActionOutcome {
        match action {
            "services" => ActionOutcome::Navigate(NavTarget::new(
                Arc::new(ServiceHandler::new(self.transport.clone(), resource_id)),
                crumbs(&["ECS", "Clusters", resource_id, "Services"]),
            )),
            "tasks" => ActionOutcome::Navigate(NavTarget::new(
                Arc::new(TaskHandler::new(self.transport.clone(), resource_id, None)),
                crumbs(&["ECS", "Clusters", resource_id, "Tasks"]),
            )),
            _ => ActionOutcome::Failed(HandlerError::not_supported()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EcsService {
    meta: ResourceMeta,
    status: String,
    desired: i64,
    running: i64,
    pending: i64,
    launch_type: String,
    task_definition: String,
    raw: Value,
}

impl EcsService {
    fn from_json(value: &Value, region: &str) -> Self {
        let name = str_field(value, "serviceName");
        let launch_type = match str_field(value, "launchType") {
            launch if launch.is_empty() => "CAPACITY".to_string(),
            launch => launch,
        };
        Self {
            meta: ResourceMeta::new("ecs:services", name.clone(), region)
                .named(name)
                .with_arn(str_field(value, "serviceArn"))
                .created(parse_time(value.get("createdAt")))
                .tagged(parse_tags(value.get("tags"))),
            status: str_field(value, "status"),
            desired: num_field(value, "desiredCount"),
            running: num_field(value, "runningCount"),
            pending: num_field(value, "pendingCount"),
            launch_type,
            task_definition: str_field(value, "taskDefinition"),
            raw: value.clone(),
        }
    }
}

impl Resource for EcsService {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.meta.name.clone(),
            self.status.clone(),
            self.desired.to_string(),
            self.running.to_string(),
            self.pending.to_string(),
            self.launch_type.clone(),
            last_segment(&self.task_definition).to_string(),
        ]
    }

    fn detail_map(&self) -> DetailMap {
        object_to_detail(&self.raw)
    }
}

impl Searchable for EcsService {
    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.meta.name.as_str(),
            self.status.as_str(),
            self.launch_type.as_str(),
            self.task_definition.as_str(),
        ]
    }
}

/// Services of one cluster. Only reachable through cluster navigation.
pub struct ServiceHandler {
    transport: Arc<dyn AwsTransport>,
    cluster: String,
}

impl ServiceHandler {
    pub fn new(transport: Arc<dyn AwsTransport>, cluster: impl Into<String>) -> Self {
        Self {
            transport,
            cluster: cluster.into(),
        }
    }

    async fn describe_services(&self, services: &[String]) -> Result<Vec<EcsService>, AwsCliError> {
        let region = &self.transport.scope().region;
        let mut found = Vec::with_capacity(services.len());
        for batch in services.chunks(DESCRIBE_SERVICES_BATCH) {
            let mut call_args = args(&["--cluster", self.cluster.as_str(), "--include", "TAGS", "--services"]);
            call_args.extend(batch.iter().cloned());
            let value = self
                .transport
                .call("ecs", "describe-services", &call_args)
                .await?;
            found.extend(
                array_field(&value, "services")
                    .iter()
                    .map(|service| EcsService::from_json(service, region)),
            );
        }
        Ok(found)
    }

    async fn find(&self, id: &str, code: ErrorCode) -> Result<EcsService, HandlerError> {
        self.describe_services(&[id.to_string()])
            .await
            .map_err(|error| {
                HandlerError::from_transport(code, format!("failed to describe service {id}"), error)
            })?
            .into_iter()
            .next()
            .ok_or_else(|| HandlerError::not_found(format!("service {id}")))
    }
}

#[async_trait]
impl ResourceHandler for ServiceHandler {
    fn resource_type(&self) -> &str {
        "ecs:services"
    }

    fn resource_name(&self) -> &str {
        "ECS Services"
    }

    fn resource_icon(&self) -> &str {
        "◎"
    }

    fn shortcut_key(&self) -> &str {
        "ecs-services"
    }

    fn columns(&self) -> &[ColumnDef] {
        &SERVICE_COLUMNS
    }

    async fn list(&self, options: &ListOptions) -> Result<ListResult, HandlerError> {
        let list_failed = |error| {
            HandlerError::from_transport(
                ErrorCode::ListFailed,
                format!("failed to list services in {}", self.cluster),
                error,
            )
        };
        let mut call_args = args(&["--cluster", self.cluster.as_str()]);
        call_args.extend(paging_args(options));
        let listed = self
            .transport
            .call("ecs", "list-services", &call_args)
            .await
            .map_err(list_failed)?;
        let arns = string_array(&listed, "serviceArns");
        let mut services = self.describe_services(&arns).await.map_err(list_failed)?;
        retain_matching(&mut services, &options.filter);
        Ok(ListResult {
            resources: erase(services),
            next_token: next_token(&listed),
        })
    }

    async fn get(&self, id: &str) -> Result<Arc<dyn Resource>, HandlerError> {
        let service = self.find(id, ErrorCode::GetFailed).await?;
        Ok(Arc::new(service))
    }

    async fn describe(&self, id: &str) -> Result<DetailMap, HandlerError> {
        let service = self.find(id, ErrorCode::DescribeFailed).await?;
        let mut detail = service.detail_map();
        if !service.task_definition.is_empty() {
            let task_definition = self
                .transport
                .call(
                    "ecs",
                    "describe-task-definition",
                    &args(&["--task-definition", service.task_definition.as_str()]),
                )
                .await
                .map(|value| value.get("taskDefinition").cloned().unwrap_or(Value::Null));
            insert_section(&mut detail, "TaskDefinition", task_definition);
        }
        Ok(detail)
    }

    fn actions(&self) -> Vec<ActionDef> {
        vec![ActionDef::new('t', "tasks", "Browse tasks of this service")]
    }

    async fn execute_action(&self, action: &str, resource_id: &str) -> ActionOutcome {
        match action {
            "tasks" => ActionOutcome::Navigate(NavTarget::new(
                Arc::new(TaskHandler::new(
                    self.transport.clone(),
                    self.cluster.clone(),
                    Some(resource_id.to_string()),
                )),
                crumbs(&["ECS", "Clusters", self.cluster.as_str(), "Services", resource_id, "Tasks"]),
            )),
            _ => ActionOutcome::Failed(HandlerError::not_supported()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EcsTask {
    meta: ResourceMeta,
    last_status: String,
    desired_status: String,
    launch_type: String,
    cpu: String,
    memory: String,
    started_at: String,
    group: String,
    containers: Vec<String>,
    raw: Value,
}

impl EcsTask {
    fn from_json(value: &Value, region: &str) -> Self {
        let arn = str_field(value, "taskArn");
        let id = last_segment(&arn).to_string();
        let containers = array_field(value, "containers")
            .iter()
            .map(|container| str_field(container, "name"))
            .filter(|name| !name.is_empty())
            .collect();
        Self {
            meta: ResourceMeta::new("ecs:tasks", id.clone(), region)
                .named(id)
                .with_arn(arn.clone())
                .created(parse_time(value.get("createdAt")))
                .tagged(parse_tags(value.get("tags"))),
            last_status: str_field(value, "lastStatus"),
            desired_status: str_field(value, "desiredStatus"),
            launch_type: str_field(value, "launchType"),
            cpu: str_field(value, "cpu"),
            memory: str_field(value, "memory"),
            started_at: format_timestamp(parse_time(value.get("startedAt"))),
            group: str_field(value, "group"),
            containers,
            raw: value.clone(),
        }
    }
}

impl Resource for EcsTask {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.meta.id.clone(),
            self.last_status.clone(),
            self.desired_status.clone(),
            self.launch_type.clone(),
            self.cpu.clone(),
            self.memory.clone(),
            self.started_at.clone(),
        ]
    }

    fn detail_map(&self) -> DetailMap {
        object_to_detail(&self.raw)
    }
}

impl Searchable for EcsTask {
    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.meta.id.as_str(),
            self.last_status.as_str(),
            self.group.as_str(),
            self.launch_type.as_str(),
        ]
    }
}

/// Tasks of one cluster, optionally narrowed to a single service.
pub struct TaskHandler {
    transport: Arc<dyn AwsTransport>,
    cluster: String,
    service: Option<String>,
}

impl TaskHandler {
    pub fn new(
        transport: Arc<dyn AwsTransport>,
        cluster: impl Into<String>,
        service: Option<String>,
    ) -> Self {
        Self {
            transport,
            cluster: cluster.into(),
            service,
        }
    }

    async fn describe_tasks(&self, tasks: &[String]) -> Result<Vec<EcsTask>, AwsCliError> {
        let region = &self.transport.scope().region;
        let mut found = Vec::with_capacity(tasks.len());
        for batch in tasks.chunks(DESCRIBE_TASKS_BATCH) {
            let mut call_args = args(&["--cluster", self.cluster.as_str(), "--include", "TAGS", "--tasks"]);
            call_args.extend(batch.iter().cloned());
            let value = self.transport.call("ecs", "describe-tasks", &call_args).await?;
            found.extend(
                array_field(&value, "tasks")
                    .iter()
                    .map(|task| EcsTask::from_json(task, region)),
            );
        }
        Ok(found)
    }

    async fn find(&self, id: &str, code: ErrorCode) -> Result<EcsTask, HandlerError> {
        self.describe_tasks(&[id.to_string()])
            .await
            .map_err(|error| {
                HandlerError::from_transport(code, format!("failed to describe task {id}"), error)
            })?
            .into_iter()
            .next()
            .ok_or_else(|| HandlerError::not_found(format!("task {id}")))
    }

    async fn exec_command(&self, id: &str) -> ActionOutcome {
        let task = match self.find(id, ErrorCode::GetFailed).await {
            Ok(task) => task,
            Err(error) => return ActionOutcome::Failed(error),
        };
        let Some(container) = task.containers.first().cloned() else {
            return ActionOutcome::Failed(HandlerError::new(
                ErrorCode::GetFailed,
                format!("task {id} has no containers"),
            ));
        };
        let mut command_args = args(&[
            "ecs",
            "execute-command",
            "--cluster",
            self.cluster.as_str(),
            "--task",
            id,
            "--container",
            container.as_str(),
            "--interactive",
            "--command",
            "/bin/sh",
        ]);
        command_args.extend(scope_args(self.transport.scope()));
        ActionOutcome::External(ExternalCommand {
            program: self.transport.program().to_string(),
            args: command_args,
            prompt: format!("Open a shell in {container} of task {id}?"),
        })
    }
}

#[async_trait]
impl ResourceHandler for TaskHandler {
    fn resource_type(&self) -> &str {
        "ecs:tasks"
    }

    fn resource_name(&self) -> &str {
        "ECS Tasks"
    }

    fn resource_icon(&self) -> &str {
        "▪"
    }

    fn shortcut_key(&self) -> &str {
        "ecs-tasks"
    }

    fn columns(&self) -> &[ColumnDef] {
        &TASK_COLUMNS
    }

    async fn list(&self, options: &ListOptions) -> Result<ListResult, HandlerError> {
        let list_failed = |error| {
            HandlerError::from_transport(
                ErrorCode::ListFailed,
                format!("failed to list tasks in {}", self.cluster),
                error,
            )
        };
        let mut call_args = args(&["--cluster", self.cluster.as_str()]);
        if let Some(service) = &self.service {
            call_args.push("--service-name".to_string());
            call_args.push(service.clone());
        }
        call_args.extend(paging_args(options));
        let listed = self
            .transport
            .call("ecs", "list-tasks", &call_args)
            .await
            .map_err(list_failed)?;
        let arns = string_array(&listed, "taskArns");
        let mut tasks = if arns.is_empty() {
            Vec::new()
        } else {
            self.describe_tasks(&arns).await.map_err(list_failed)?
        };
        retain_matching(&mut tasks, &options.filter);
        Ok(ListResult {
            resources: erase(tasks),
            next_token: next_token(&listed),
        })
    }

    async fn get(&self, id: &str) -> Result<Arc<dyn Resource>, HandlerError> {
        let task = self.find(id, ErrorCode::GetFailed).await?;
        Ok(Arc::new(task))
    }

    async fn describe(&self, id: &str) -> Result<DetailMap, HandlerError> {
        let task = self.find(id, ErrorCode::DescribeFailed).await?;
        Ok(task.detail_map())
    }

    fn actions(&self) -> Vec<ActionDef> {
        vec![
            ActionDef::new('x', "exec", "Open an interactive shell in the task"),
            ActionDef::dangerous('S', "stop", "Stop the task"),
        ]
    }

    async fn execute_action(&self, action: &str, resource_id: &str) -> ActionOutcome {
        match action {
            "exec" => self.exec_command(resource_id).await,
            "stop" => {
                let call_args = args(&[
                    "--cluster",
                    self.cluster.as_str(),
                    "--task",
                    resource_id,
                    "--reason",
                    "Stopped from stratus",
                ]);
                match self.transport.call("ecs", "stop-task", &call_args).await {
                    Ok(_) => ActionOutcome::Done(Some(format!("Stopping task {resource_id}"))),
                    Err(error) => ActionOutcome::Failed(HandlerError::from_transport(
                        ErrorCode::UpdateFailed,
                        format!("failed to stop task {resource_id}"),
                        error,
                    )),
                }
            }
            _ => ActionOutcome::Failed(HandlerError::not_supported()),
        }
    }
}

fn string_array(value: &Value, key: &str) -> Vec<String> {
    array_field(value, key)
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

fn crumbs(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}
