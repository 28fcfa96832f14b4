//! Compute: EC2 instances, ECS clusters, Lambda functions.
//!
//! Every workload identity is resolved at sync time: instance profile or
//! role ARN -> role name -> attached and inline policy names. Those lookups
//! are per item and run through the bounded fan-out.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{format_time_text, items, name_from_arn, parse_lenient, parse_list, read_derived, step, string_list, tag_name, OnStep, SyncResult, Syncer, Tag};
use crate::cache::{regional, CacheStore};
use crate::policy::{self, PolicyStatement};

/// `describe-services` accepts at most this many services per call
const DESCRIBE_SERVICES_BATCH: usize = 10;
/// `describe-tasks` / `describe-clusters` batch limit
const DESCRIBE_TASKS_BATCH: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Ec2Instance {
    pub instance_id: String,
    pub name: String,
    pub instance_type: String,
    pub state: String,
    #[serde(rename = "PublicIP")]
    pub public_ip: String,
    #[serde(rename = "PrivateIP")]
    pub private_ip: String,
    pub vpc_id: String,
    pub subnet_id: String,
    pub security_groups: Vec<String>,
    pub launch_time: String,
    pub iam_role: String,
    pub iam_policies: Vec<String>,
    pub key_name: String,
    pub image_id: String,
    pub volumes: Vec<Ec2Volume>,
    /// Instance profile ARN, kept so the role can be resolved later
    pub instance_profile_arn: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Ec2Volume {
    pub volume_id: String,
    pub device_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EcsCluster {
    pub cluster_name: String,
    pub cluster_arn: String,
    pub status: String,
    pub running_tasks: i64,
    pub pending_tasks: i64,
    pub services: i64,
    pub capacity_providers: Vec<String>,
    pub task_defs: Vec<EcsTaskDef>,
    #[serde(rename = "ECSServices")]
    pub ecs_services: Vec<EcsService>,
    pub tasks: Vec<EcsTask>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EcsService {
    pub service_name: String,
    pub status: String,
    pub desired_count: i64,
    pub running_count: i64,
    pub launch_type: String,
    pub task_definition: String,
    pub subnet_ids: Vec<String>,
    pub security_groups: Vec<String>,
    #[serde(rename = "AssignPublicIP")]
    pub assign_public_ip: bool,
    #[serde(rename = "LBTargetGroups")]
    pub lb_target_groups: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EcsTask {
    pub task_arn: String,
    pub task_definition: String,
    pub last_status: String,
    pub launch_type: String,
    #[serde(rename = "PrivateIP")]
    pub private_ip: String,
    #[serde(rename = "PublicIP")]
    pub public_ip: String,
    pub subnet_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EcsTaskDef {
    pub family: String,
    pub revision: i64,
    pub task_role_name: String,
    pub task_role_policies: Vec<String>,
    pub exec_role_name: String,
    pub exec_role_policies: Vec<String>,
    pub launch_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LambdaFunction {
    pub function_name: String,
    pub runtime: String,
    pub handler: String,
    pub state: String,
    pub memory_size: i64,
    pub timeout: i64,
    pub code_size: i64,
    pub last_modified: String,
    pub function_url: String,
    pub policies: Vec<PolicyStatement>,
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    pub security_groups: Vec<String>,
    pub role_arn: String,
    pub iam_role: String,
    pub iam_policies: Vec<String>,
}

/// Compute view for one region
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeData {
    pub ec2: Vec<Ec2Instance>,
    pub ecs: Vec<EcsCluster>,
    pub lambda: Vec<LambdaFunction>,
}

// --- wire shapes ----------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct NamedState {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct GroupRef {
    group_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ProfileRef {
    arn: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct EbsRef {
    volume_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct BlockDeviceRecord {
    device_name: String,
    ebs: Option<EbsRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstanceRecord {
    instance_id: String,
    instance_type: String,
    state: NamedState,
    public_ip_address: String,
    private_ip_address: String,
    vpc_id: String,
    subnet_id: String,
    launch_time: String,
    key_name: String,
    image_id: String,
    tags: Vec<Tag>,
    security_groups: Vec<GroupRef>,
    iam_instance_profile: Option<ProfileRef>,
    block_device_mappings: Vec<BlockDeviceRecord>,
}

impl From<InstanceRecord> for Ec2Instance {
    fn from(r: InstanceRecord) -> Self {
        Self {
            name: tag_name(&r.tags),
            instance_id: r.instance_id,
            instance_type: r.instance_type,
            state: r.state.name,
            public_ip: r.public_ip_address,
            private_ip: r.private_ip_address,
            vpc_id: r.vpc_id,
            subnet_id: r.subnet_id,
            security_groups: r.security_groups.into_iter().map(|g| g.group_id).collect(),
            launch_time: format_time_text(&r.launch_time),
            iam_role: String::new(),
            iam_policies: Vec::new(),
            key_name: r.key_name,
            image_id: r.image_id,
            volumes: r
                .block_device_mappings
                .into_iter()
                .filter_map(|b| {
                    b.ebs.map(|ebs| Ec2Volume {
                        volume_id: ebs.volume_id,
                        device_name: b.device_name,
                    })
                })
                .collect(),
            instance_profile_arn: r.iam_instance_profile.map(|p| p.arn).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ClusterRecord {
    cluster_name: String,
    cluster_arn: String,
    status: String,
    running_tasks_count: i64,
    pending_tasks_count: i64,
    active_services_count: i64,
    capacity_providers: Vec<String>,
}

impl From<ClusterRecord> for EcsCluster {
    fn from(r: ClusterRecord) -> Self {
        Self {
            cluster_name: r.cluster_name,
            cluster_arn: r.cluster_arn,
            status: r.status,
            running_tasks: r.running_tasks_count,
            pending_tasks: r.pending_tasks_count,
            services: r.active_services_count,
            capacity_providers: r.capacity_providers,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AwsvpcRecord {
    subnets: Vec<String>,
    security_groups: Vec<String>,
    assign_public_ip: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NetworkConfigRecord {
    awsvpc_configuration: AwsvpcRecord,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ServiceLbRecord {
    target_group_arn: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ServiceRecord {
    service_name: String,
    status: String,
    desired_count: i64,
    running_count: i64,
    launch_type: String,
    task_definition: String,
    network_configuration: Option<NetworkConfigRecord>,
    load_balancers: Vec<ServiceLbRecord>,
}

impl From<ServiceRecord> for EcsService {
    fn from(r: ServiceRecord) -> Self {
        let awsvpc = r.network_configuration.map(|n| n.awsvpc_configuration).unwrap_or_default();
        Self {
            service_name: r.service_name,
            status: r.status,
            desired_count: r.desired_count,
            running_count: r.running_count,
            launch_type: r.launch_type,
            task_definition: r.task_definition,
            subnet_ids: awsvpc.subnets,
            security_groups: awsvpc.security_groups,
            assign_public_ip: awsvpc.assign_public_ip == "ENABLED",
            lb_target_groups: r
                .load_balancers
                .into_iter()
                .map(|lb| lb.target_group_arn)
                .filter(|arn| !arn.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DetailRecord {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TaskAttachmentRecord {
    #[serde(rename = "type")]
    kind: String,
    details: Vec<DetailRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TaskRecord {
    task_arn: String,
    task_definition_arn: String,
    last_status: String,
    launch_type: String,
    attachments: Vec<TaskAttachmentRecord>,
}

impl From<TaskRecord> for EcsTask {
    fn from(r: TaskRecord) -> Self {
        let mut task = Self {
            task_arn: r.task_arn,
            task_definition: r.task_definition_arn,
            last_status: r.last_status,
            launch_type: r.launch_type,
            ..Default::default()
        };

        let details = r
            .attachments
            .into_iter()
            .filter(|a| a.kind == "ElasticNetworkInterface")
            .flat_map(|a| a.details);
        for d in details {
            match d.name.as_str() {
                "privateIPv4Address" => task.private_ip = d.value,
                "publicIPv4Address" => task.public_ip = d.value,
                "subnetId" => task.subnet_id = d.value,
                _ => {},
            }
        }
        task
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TaskDefinitionRecord {
    family: String,
    revision: i64,
    task_role_arn: String,
    execution_role_arn: String,
    requires_compatibilities: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct VpcConfigRecord {
    vpc_id: String,
    subnet_ids: Vec<String>,
    security_group_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct FunctionRecord {
    function_name: String,
    runtime: String,
    handler: String,
    state: String,
    memory_size: i64,
    timeout: i64,
    code_size: i64,
    last_modified: String,
    role: String,
    vpc_config: Option<VpcConfigRecord>,
}

impl From<FunctionRecord> for LambdaFunction {
    fn from(r: FunctionRecord) -> Self {
        let vpc = r.vpc_config.filter(|v| !v.vpc_id.is_empty()).unwrap_or_default();
        Self {
            function_name: r.function_name,
            runtime: r.runtime,
            handler: r.handler,
            state: r.state,
            memory_size: r.memory_size,
            timeout: r.timeout,
            code_size: r.code_size,
            last_modified: format_time_text(&r.last_modified),
            vpc_id: vpc.vpc_id,
            subnet_ids: vpc.subnet_ids,
            security_groups: vpc.security_group_ids,
            iam_role: name_from_arn(&r.role),
            role_arn: r.role,
            ..Default::default()
        }
    }
}

fn parse_instances(data: &Value) -> Vec<Ec2Instance> {
    items(data, "Reservations")
        .iter()
        .flat_map(|reservation| parse_list::<InstanceRecord>(reservation, "Instances"))
        .map(Ec2Instance::from)
        .collect()
}

fn parse_functions(data: &Value) -> Vec<LambdaFunction> {
    parse_list::<FunctionRecord>(data, "Functions")
        .into_iter()
        .map(LambdaFunction::from)
        .collect()
}

/// Cluster shells from a bare `list-clusters` response
fn clusters_from_arns(data: &Value) -> Vec<EcsCluster> {
    string_list(data, "clusterArns")
        .into_iter()
        .map(|arn| EcsCluster {
            cluster_name: name_from_arn(&arn),
            cluster_arn: arn,
            ..Default::default()
        })
        .collect()
}

impl Syncer {
    pub async fn sync_compute(&self, region: &str, on_step: OnStep<'_>) -> Result<Vec<SyncResult>> {
        let mut results = Vec::with_capacity(3);

        self.precache_security_groups(region).await;
        step(on_step, "security groups");

        // EC2
        let (mut result, data) = self
            .sync_raw("ec2", &regional(region, "ec2"), &["ec2", "describe-instances", "--region", region], "Reservations")
            .await;
        if let Some(data) = data {
            let instances = self
                .enrich(parse_instances(&data), |mut inst| async move {
                    if !inst.instance_profile_arn.is_empty() {
                        let (role, policies) = self.resolve_instance_profile(&inst.instance_profile_arn).await;
                        inst.iam_role = role;
                        inst.iam_policies = policies;
                    }
                    inst
                })
                .await;
            result.count = instances.len();
            results.push(result);
            self.store_derived(&regional(region, "ec2-enriched"), &instances, &mut results);
        } else {
            results.push(result);
        }
        step(on_step, "ec2");

        // ECS
        let (mut result, data) = self
            .sync_raw("ecs", &regional(region, "ecs"), &["ecs", "list-clusters", "--region", region], "clusterArns")
            .await;
        if let Some(data) = data {
            let clusters = self.ecs_clusters(region, &string_list(&data, "clusterArns")).await;
            result.count = clusters.len();
            results.push(result);
            self.store_derived(&regional(region, "ecs-enriched"), &clusters, &mut results);
        } else {
            results.push(result);
        }
        step(on_step, "ecs");

        // Lambda
        let (mut result, data) = self
            .sync_raw("lambda", &regional(region, "lambda"), &["lambda", "list-functions", "--region", region], "Functions")
            .await;
        if let Some(data) = data {
            let functions = self
                .enrich(parse_functions(&data), |f| self.enrich_function(region, f))
                .await;
            result.count = functions.len();
            results.push(result);
            self.store_derived(&regional(region, "lambda-enriched"), &functions, &mut results);
        } else {
            results.push(result);
        }
        step(on_step, "lambda");

        Ok(results)
    }

    /// instance profile -> first role -> policies
    async fn resolve_instance_profile(&self, profile_arn: &str) -> (String, Vec<String>) {
        let profile_name = name_from_arn(profile_arn);
        let Some(data) = self
            .lookup(&["iam", "get-instance-profile", "--instance-profile-name", &profile_name])
            .await
        else {
            return (String::new(), Vec::new());
        };

        let role_name = data
            .pointer("/InstanceProfile/Roles/0/RoleName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if role_name.is_empty() {
            return (String::new(), Vec::new());
        }

        let policies = self.role_policies(&role_name).await;
        (role_name, policies)
    }

    async fn ecs_clusters(&self, region: &str, arns: &[String]) -> Vec<EcsCluster> {
        let mut clusters = Vec::new();
        for batch in arns.chunks(DESCRIBE_TASKS_BATCH) {
            let mut args = vec!["ecs", "describe-clusters", "--region", region, "--include", "SETTINGS", "--clusters"];
            args.extend(batch.iter().map(String::as_str));
            if let Some(data) = self.lookup(&args).await {
                clusters.extend(parse_list::<ClusterRecord>(&data, "clusters").into_iter().map(EcsCluster::from));
            }
        }

        // Task definitions are account-wide; they hang off the first cluster
        if let Some(data) = self
            .lookup(&["ecs", "list-task-definition-families", "--region", region, "--status", "ACTIVE"])
            .await
        {
            let families = string_list(&data, "families");
            let task_defs: Vec<EcsTaskDef> = self
                .enrich(families, |family| async move { self.task_definition(region, &family).await })
                .await
                .into_iter()
                .flatten()
                .collect();
            if let Some(first) = clusters.first_mut() {
                first.task_defs = task_defs;
            }
        }

        self.enrich(clusters, |mut cluster| async move {
            cluster.ecs_services = self.ecs_services(region, &cluster.cluster_arn).await;
            cluster.tasks = self.ecs_tasks(region, &cluster.cluster_arn).await;
            cluster
        })
        .await
    }

    async fn task_definition(&self, region: &str, family: &str) -> Option<EcsTaskDef> {
        let data = self
            .lookup(&["ecs", "describe-task-definition", "--region", region, "--task-definition", family])
            .await?;
        let record: TaskDefinitionRecord =
            parse_lenient(data.get("taskDefinition").unwrap_or(&Value::Null), "taskDefinition");

        let mut def = EcsTaskDef {
            family: record.family,
            revision: record.revision,
            launch_type: record.requires_compatibilities.into_iter().next().unwrap_or_default(),
            ..Default::default()
        };
        if !record.task_role_arn.is_empty() {
            (def.task_role_name, def.task_role_policies) = self.resolve_role(&record.task_role_arn).await;
        }
        if !record.execution_role_arn.is_empty() {
            (def.exec_role_name, def.exec_role_policies) = self.resolve_role(&record.execution_role_arn).await;
        }
        Some(def)
    }

    async fn ecs_services(&self, region: &str, cluster_arn: &str) -> Vec<EcsService> {
        let Some(data) = self
            .lookup(&["ecs", "list-services", "--region", region, "--cluster", cluster_arn])
            .await
        else {
            return Vec::new();
        };

        let mut services = Vec::new();
        for batch in string_list(&data, "serviceArns").chunks(DESCRIBE_SERVICES_BATCH) {
            let mut args = vec!["ecs", "describe-services", "--region", region, "--cluster", cluster_arn, "--services"];
            args.extend(batch.iter().map(String::as_str));
            if let Some(desc) = self.lookup(&args).await {
                services.extend(parse_list::<ServiceRecord>(&desc, "services").into_iter().map(EcsService::from));
            }
        }
        services
    }

    async fn ecs_tasks(&self, region: &str, cluster_arn: &str) -> Vec<EcsTask> {
        let Some(data) = self
            .lookup(&["ecs", "list-tasks", "--region", region, "--cluster", cluster_arn])
            .await
        else {
            return Vec::new();
        };

        let mut tasks = Vec::new();
        for batch in string_list(&data, "taskArns").chunks(DESCRIBE_TASKS_BATCH) {
            let mut args = vec!["ecs", "describe-tasks", "--region", region, "--cluster", cluster_arn, "--tasks"];
            args.extend(batch.iter().map(String::as_str));
            if let Some(desc) = self.lookup(&args).await {
                tasks.extend(parse_list::<TaskRecord>(&desc, "tasks").into_iter().map(EcsTask::from));
            }
        }
        tasks
    }

    /// Function URL, resource policy, execution role policies
    async fn enrich_function(&self, region: &str, mut function: LambdaFunction) -> LambdaFunction {
        let name = function.function_name.clone();

        if let Some(data) = self
            .lookup(&["lambda", "get-function-url-config", "--function-name", &name, "--region", region])
            .await
        {
            function.function_url = data
                .get("FunctionUrl")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
        }

        if let Some(data) = self
            .lookup(&["lambda", "get-policy", "--function-name", &name, "--region", region])
            .await
        {
            function.policies = policy::normalize_value(data.get("Policy").unwrap_or(&Value::Null));
        }

        if !function.iam_role.is_empty() {
            function.iam_policies = self.role_policies(&function.iam_role).await;
        }
        function
    }
}

/// Compute view for `region`
pub fn load_compute(store: &CacheStore, region: &str) -> Result<ComputeData> {
    let ec2 = match read_derived::<Vec<Ec2Instance>>(store, &regional(region, "ec2-enriched"))? {
        Some(instances) => instances,
        None => store
            .read(&regional(region, "ec2"))?
            .map(|data| parse_instances(&data))
            .unwrap_or_default(),
    };

    let ecs = match read_derived::<Vec<EcsCluster>>(store, &regional(region, "ecs-enriched"))? {
        Some(clusters) => clusters,
        None => store
            .read(&regional(region, "ecs"))?
            .map(|data| clusters_from_arns(&data))
            .unwrap_or_default(),
    };

    let lambda = match read_derived::<Vec<LambdaFunction>>(store, &regional(region, "lambda-enriched"))? {
        Some(functions) => functions,
        None => store
            .read(&regional(region, "lambda"))?
            .map(|data| parse_functions(&data))
            .unwrap_or_default(),
    };

    Ok(ComputeData { ec2, ecs, lambda })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_instance() {
        let data = json!({"Reservations": [{"Instances": [{
            "InstanceId": "i-1",
            "InstanceType": "t3.micro",
            "State": {"Code": 16, "Name": "running"},
            "PrivateIpAddress": "10.0.1.5",
            "VpcId": "vpc-1",
            "LaunchTime": "2024-01-02T03:04:05+00:00",
            "Tags": [{"Key": "Name", "Value": "web-1"}],
            "SecurityGroups": [{"GroupId": "sg-1", "GroupName": "web"}],
            "IamInstanceProfile": {"Arn": "arn:aws:iam::1:instance-profile/WebProfile"},
            "BlockDeviceMappings": [{"DeviceName": "/dev/xvda", "Ebs": {"VolumeId": "vol-1"}}, {"DeviceName": "/dev/sdb"}]
        }]}]});

        let instances = parse_instances(&data);
        assert_eq!(instances.len(), 1);
        let inst = &instances[0];
        assert_eq!(inst.name, "web-1");
        assert_eq!(inst.state, "running");
        assert_eq!(inst.security_groups, vec!["sg-1"]);
        assert_eq!(inst.launch_time, "2024-01-02 03:04");
        assert_eq!(inst.instance_profile_arn, "arn:aws:iam::1:instance-profile/WebProfile");
        assert_eq!(
            inst.volumes,
            vec![Ec2Volume {
                volume_id: "vol-1".to_string(),
                device_name: "/dev/xvda".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_service_network() {
        let record: ServiceRecord = serde_json::from_value(json!({
            "serviceName": "api",
            "desiredCount": 2,
            "networkConfiguration": {"awsvpcConfiguration": {
                "subnets": ["subnet-a"], "securityGroups": ["sg-1"], "assignPublicIp": "ENABLED"
            }},
            "loadBalancers": [{"targetGroupArn": "arn:tg/api", "containerName": "api", "containerPort": 80}]
        }))
        .unwrap();
        let service = EcsService::from(record);
        assert!(service.assign_public_ip);
        assert_eq!(service.subnet_ids, vec!["subnet-a"]);
        assert_eq!(service.lb_target_groups, vec!["arn:tg/api"]);
    }

    #[test]
    fn test_parse_task_eni_details() {
        let record: TaskRecord = serde_json::from_value(json!({
            "taskArn": "arn:task/1",
            "lastStatus": "RUNNING",
            "attachments": [{"type": "ElasticNetworkInterface", "details": [
                {"name": "subnetId", "value": "subnet-a"},
                {"name": "privateIPv4Address", "value": "10.0.0.9"}
            ]}]
        }))
        .unwrap();
        let task = EcsTask::from(record);
        assert_eq!(task.private_ip, "10.0.0.9");
        assert_eq!(task.subnet_id, "subnet-a");
        assert_eq!(task.public_ip, "");
    }

    #[test]
    fn test_function_role_name_and_vpc() {
        let data = json!({"Functions": [
            {"FunctionName": "f", "Role": "arn:aws:iam::1:role/service-role/f-role",
             "VpcConfig": {"VpcId": "", "SubnetIds": []}},
            {"FunctionName": "g", "Role": "arn:aws:iam::1:role/g-role",
             "VpcConfig": {"VpcId": "vpc-1", "SubnetIds": ["subnet-a"], "SecurityGroupIds": ["sg-1"]}}
        ]});
        let functions = parse_functions(&data);
        assert_eq!(functions[0].iam_role, "f-role");
        assert_eq!(functions[0].vpc_id, "");
        assert_eq!(functions[1].vpc_id, "vpc-1");
        assert_eq!(functions[1].security_groups, vec!["sg-1"]);
    }

    #[test]
    fn test_clusters_from_arns() {
        let clusters = clusters_from_arns(&json!({"clusterArns": ["arn:aws:ecs:us-east-1:1:cluster/prod"]}));
        assert_eq!(clusters[0].cluster_name, "prod");
    }
}
