//! Integration tests for the sync orchestrators
//!
//! A scripted runner stands in for the aws CLI: each test lists the calls
//! it expects to succeed or fail, and anything not scripted fails the way a
//! denied call would.

use async_trait::async_trait;
use cloudsnap::aws::{CliError, CommandRunner};
use cloudsnap::cache::CacheStore;
use cloudsnap::sync::{
    load_ai, load_compute, load_database, load_identity, load_network, load_storage, load_streaming, load_warehouse,
    BucketAccess, Category, RouteAccess, Syncer,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

enum Reply {
    Ok(Value),
    Fail(&'static str),
    Timeout,
}

/// Answers CLI calls from a script keyed by the joined argument list
#[derive(Default)]
struct FakeRunner {
    script: HashMap<String, Reply>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    fn new() -> Self {
        Self::default()
    }

    fn ok(mut self, args: &str, value: Value) -> Self {
        self.script.insert(args.to_string(), Reply::Ok(value));
        self
    }

    fn fail(mut self, args: &str, stderr: &'static str) -> Self {
        self.script.insert(args.to_string(), Reply::Fail(stderr));
        self
    }

    fn timeout(mut self, args: &str) -> Self {
        self.script.insert(args.to_string(), Reply::Timeout);
        self
    }

    /// Hold the reply to `args` back for `after`
    fn delay(mut self, args: &str, after: Duration) -> Self {
        self.delays.insert(args.to_string(), after);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, args: &[&str]) -> Result<Value, CliError> {
        let key = args.join(" ");
        self.calls.lock().unwrap().push(key.clone());
        if let Some(after) = self.delays.get(&key).copied() {
            tokio::time::sleep(after).await;
        }
        let command = args.iter().take(2).copied().collect::<Vec<_>>().join(" ");

        match self.script.get(&key) {
            Some(Reply::Ok(value)) => Ok(value.clone()),
            Some(Reply::Fail(stderr)) => Err(CliError::Tool {
                command,
                stderr: stderr.to_string(),
            }),
            Some(Reply::Timeout) => Err(CliError::Timeout {
                command,
                after: Duration::from_secs(60),
            }),
            None => Err(CliError::Tool {
                command,
                stderr: "An error occurred (AccessDenied)".to_string(),
            }),
        }
    }
}

fn syncer(runner: FakeRunner) -> (Syncer, Arc<FakeRunner>) {
    let runner = Arc::new(runner);
    let store = Arc::new(CacheStore::open_in_memory().unwrap());
    let syncer = Syncer::new(runner.clone(), store);
    (syncer, runner)
}

mod network_tests {
    use super::*;

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let runner = FakeRunner::new()
            .ok(
                "ec2 describe-vpcs --region us-east-1",
                json!({"Vpcs": [{"VpcId": "vpc-1", "CidrBlock": "10.0.0.0/16"}, {"VpcId": "vpc-2"}]}),
            )
            .fail("ec2 describe-subnets --region us-east-1", "An error occurred (UnauthorizedOperation)");
        let (syncer, _) = syncer(runner);

        let results = syncer.sync_network("us-east-1", None).await.unwrap();
        assert_eq!(results.len(), 8);

        assert_eq!(results[0].service, "vpcs");
        assert!(results[0].is_ok());
        assert_eq!(results[0].count, 2);

        assert_eq!(results[1].service, "subnets");
        let err = results[1].error.as_deref().unwrap();
        assert!(err.contains("aws ec2 describe-subnets"));
        assert!(err.contains("UnauthorizedOperation"));

        let store = syncer.store();
        assert!(store.exists("us-east-1:vpcs").unwrap());
        assert!(!store.exists("us-east-1:subnets").unwrap());
        assert!(store.exists("us-east-1:network-enriched").unwrap());

        let view = load_network(store, "us-east-1").unwrap();
        assert_eq!(view.vpcs.len(), 2);
    }

    #[tokio::test]
    async fn test_subnet_access_follows_route_table() {
        let runner = FakeRunner::new()
            .ok("ec2 describe-vpcs --region eu-west-1", json!({"Vpcs": [{"VpcId": "vpc-1"}]}))
            .ok(
                "ec2 describe-subnets --region eu-west-1",
                json!({"Subnets": [{"SubnetId": "subnet-pub", "VpcId": "vpc-1"}, {"SubnetId": "subnet-priv", "VpcId": "vpc-1"}]}),
            )
            .ok(
                "ec2 describe-route-tables --region eu-west-1",
                json!({"RouteTables": [
                    {
                        "RouteTableId": "rtb-main",
                        "VpcId": "vpc-1",
                        "Associations": [{"Main": true}],
                        "Routes": [{"DestinationCidrBlock": "0.0.0.0/0", "NatGatewayId": "nat-1"}]
                    },
                    {
                        "RouteTableId": "rtb-public",
                        "VpcId": "vpc-1",
                        "Associations": [{"Main": false, "SubnetId": "subnet-pub"}],
                        "Routes": [{"DestinationCidrBlock": "0.0.0.0/0", "GatewayId": "igw-1"}]
                    }
                ]}),
            );
        let (syncer, _) = syncer(runner);
        syncer.sync_network("eu-west-1", None).await.unwrap();

        let view = load_network(syncer.store(), "eu-west-1").unwrap();
        let vpc = view.vpc("vpc-1").unwrap();
        let access: HashMap<&str, RouteAccess> = vpc
            .subnets
            .iter()
            .map(|s| (s.subnet_id.as_str(), s.access))
            .collect();
        assert_eq!(access["subnet-pub"], RouteAccess::Public);
        assert_eq!(access["subnet-priv"], RouteAccess::EgressOnly);
    }

    #[tokio::test]
    async fn test_step_labels_follow_call_order() {
        let (syncer, _) = syncer(FakeRunner::new());
        let labels = Mutex::new(Vec::new());
        let on_step = |label: &str| labels.lock().unwrap().push(label.to_string());

        syncer.sync_network("us-east-1", Some(&on_step)).await.unwrap();
        assert_eq!(
            labels.into_inner().unwrap(),
            vec!["vpcs", "subnets", "igws", "nat-gws", "route-tables", "security-groups", "load-balancers", "target-groups"]
        );
    }

    #[tokio::test]
    async fn test_timeout_is_reported_per_call() {
        let runner = FakeRunner::new().timeout("elbv2 describe-load-balancers --region us-east-1");
        let (syncer, _) = syncer(runner);

        let results = syncer.sync_network("us-east-1", None).await.unwrap();
        let lb = results.iter().find(|r| r.service == "load-balancers").unwrap();
        assert!(lb.error.as_deref().unwrap().contains("timed out after 60s"));
    }
}

mod storage_tests {
    use super::*;

    #[test]
    fn test_bucket_access_is_derived_from_checks() {
        let runner = FakeRunner::new()
            .ok(
                "s3api list-buckets",
                json!({"Buckets": [
                    {"Name": "locked", "CreationDate": "2023-01-01T00:00:00+00:00"},
                    {"Name": "website", "CreationDate": "2023-02-01T00:00:00+00:00"}
                ]}),
            )
            .ok(
                "s3api get-public-access-block --bucket locked",
                json!({"PublicAccessBlockConfiguration": {
                    "BlockPublicAcls": true, "IgnorePublicAcls": true,
                    "BlockPublicPolicy": true, "RestrictPublicBuckets": true
                }}),
            )
            .ok("s3api get-bucket-location --bucket locked", json!({"LocationConstraint": null}))
            .ok("s3api get-bucket-location --bucket website", json!({"LocationConstraint": "eu-west-1"}))
            .ok(
                "s3api get-bucket-acl --bucket website",
                json!({"Grants": [{"Grantee": {"Type": "Group", "URI": "http://acs.amazonaws.com/groups/global/AllUsers"}, "Permission": "READ"}]}),
            )
            .ok("s3api get-bucket-versioning --bucket website", json!({"Status": "Enabled"}))
            .ok("s3api get-bucket-versioning --bucket locked", json!({}));
        let (syncer, _) = syncer(runner);

        let results = tokio_test::block_on(syncer.sync_storage(None)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].count, 2);

        let view = load_storage(syncer.store()).unwrap();
        let locked = &view.buckets[0];
        assert_eq!(locked.name, "locked");
        assert_eq!(locked.access, BucketAccess::Private);
        assert_eq!(locked.region, "us-east-1");
        assert_eq!(locked.versioning, "Disabled");

        let website = &view.buckets[1];
        assert_eq!(website.access, BucketAccess::Public);
        assert_eq!(website.region, "eu-west-1");
        assert_eq!(website.versioning, "Enabled");
        assert!(website.acl_public);
    }

    #[tokio::test]
    async fn test_failed_listing_writes_nothing() {
        let (syncer, _) = syncer(FakeRunner::new().fail("s3api list-buckets", "An error occurred (AccessDenied)"));
        let results = syncer.sync_storage(None).await.unwrap();
        assert!(!results[0].is_ok());
        assert!(!syncer.store().exists("s3").unwrap());
        assert!(!syncer.store().exists("s3:enriched").unwrap());
        assert!(load_storage(syncer.store()).unwrap().buckets.is_empty());
    }
}

mod streaming_tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_queues_and_order() {
        let urls: Vec<String> = (0..10)
            .map(|i| {
                let suffix = if i % 3 == 0 { ".fifo" } else { "" };
                format!("https://sqs.us-east-1.amazonaws.com/1/queue-{}{}", i, suffix)
            })
            .collect();

        // Later queues answer sooner, so lookups complete out of order.
        // queue-4 is left unscripted and fails.
        let mut runner = FakeRunner::new().ok("sqs list-queues --region us-east-1", json!({"QueueUrls": urls}));
        for (i, url) in urls.iter().enumerate() {
            if i == 4 {
                continue;
            }
            let name = url.rsplit('/').next().unwrap();
            let args = format!("sqs get-queue-attributes --queue-url {} --attribute-names All --region us-east-1", url);
            runner = runner
                .ok(
                    &args,
                    json!({"Attributes": {"QueueArn": format!("arn:aws:sqs:us-east-1:1:{}", name), "DelaySeconds": i.to_string()}}),
                )
                .delay(&args, Duration::from_millis((10 - i as u64) * 5));
        }
        let runner = Arc::new(runner);
        let store = Arc::new(CacheStore::open_in_memory().unwrap());
        let syncer = Syncer::new(runner, store).with_concurrency(3);

        let results = syncer.sync_streaming("us-east-1", None).await.unwrap();
        let services: Vec<&str> = results.iter().map(|r| r.service.as_str()).collect();
        assert_eq!(services, vec!["sqs", "sns", "kinesis", "eventbridge"]);
        assert_eq!(results[0].count, 10);

        let view = load_streaming(syncer.store(), "us-east-1").unwrap();
        let names: Vec<String> = view.sqs.iter().map(|q| q.queue_name.clone()).collect();
        let expected: Vec<String> = urls.iter().map(|u| u.rsplit('/').next().unwrap().to_string()).collect();
        assert_eq!(names, expected);

        for (i, queue) in view.sqs.iter().enumerate() {
            assert_eq!(queue.is_fifo, queue.queue_name.ends_with(".fifo"));
            if i == 4 {
                assert_eq!(queue.arn, "");
            } else {
                assert_eq!(queue.arn, format!("arn:aws:sqs:us-east-1:1:{}", queue.queue_name));
                assert_eq!(queue.delay_seconds, i.to_string());
            }
        }
    }
}

mod ai_tests {
    use super::*;

    #[tokio::test]
    async fn test_endpoint_config_chain() {
        let runner = FakeRunner::new()
            .fail("sagemaker list-notebook-instances --region us-east-1", "An error occurred (AccessDeniedException)")
            .ok(
                "sagemaker list-endpoints --region us-east-1",
                json!({"Endpoints": [
                    {"EndpointName": "churn", "EndpointStatus": "InService"},
                    {"EndpointName": "stale", "EndpointStatus": "Failed"}
                ]}),
            )
            .ok(
                "sagemaker describe-endpoint --endpoint-name churn --region us-east-1",
                json!({"EndpointName": "churn", "EndpointConfigName": "churn-cfg"}),
            )
            .ok(
                "sagemaker describe-endpoint-config --endpoint-config-name churn-cfg --region us-east-1",
                json!({"ProductionVariants": [
                    {"ModelName": "churn-model", "InstanceType": "ml.m5.large", "InitialInstanceCount": 2},
                    {"ModelName": "shadow", "InstanceType": "ml.t2.medium", "InitialInstanceCount": 1}
                ]}),
            )
            .ok(
                "sagemaker describe-endpoint --endpoint-name stale --region us-east-1",
                json!({"EndpointName": "stale", "EndpointConfigName": "stale-cfg"}),
            )
            .ok(
                "sagemaker list-models --region us-east-1",
                json!({"Models": [{"ModelName": "churn-model", "ModelArn": "arn:aws:sagemaker:us-east-1:1:model/churn-model"}]}),
            )
            .ok(
                "bedrock list-foundation-models --region us-east-1",
                json!({"modelSummaries": [{"modelId": "anthropic.claude-v2", "providerName": "Anthropic"}]}),
            )
            .ok(
                "bedrock list-custom-models --region us-east-1",
                json!({"modelSummaries": [{
                    "modelName": "support-tuned",
                    "modelArn": "arn:aws:bedrock:us-east-1:1:custom-model/support-tuned",
                    "baseModelIdentifier": "anthropic.claude-v2"
                }]}),
            );
        let (syncer, runner) = syncer(runner);

        let results = syncer.sync_ai("us-east-1", None).await.unwrap();
        let services: Vec<&str> = results.iter().map(|r| r.service.as_str()).collect();
        assert_eq!(
            services,
            vec!["sagemaker-notebooks", "sagemaker-endpoints", "sagemaker-models", "bedrock-models", "bedrock-custom"]
        );
        assert!(!results[0].is_ok());
        assert!(results[1..].iter().all(|r| r.is_ok()));
        assert_eq!(results[1].count, 2);

        // stale's config lookup was attempted and failed
        assert!(runner
            .calls()
            .contains(&"sagemaker describe-endpoint-config --endpoint-config-name stale-cfg --region us-east-1".to_string()));

        assert!(syncer.store().exists("us-east-1:ai-enriched").unwrap());
        assert!(!syncer.store().exists("us-east-1:sagemaker-notebooks").unwrap());

        let view = load_ai(syncer.store(), "us-east-1").unwrap();
        assert!(view.sagemaker_notebooks.is_empty());
        assert_eq!(view.sagemaker_endpoints.len(), 2);

        let churn = &view.sagemaker_endpoints[0];
        assert_eq!(churn.name, "churn");
        assert_eq!(churn.model_name, "churn-model");
        assert_eq!(churn.instance_type, "ml.m5.large");
        assert_eq!(churn.instance_count, 2);

        let stale = &view.sagemaker_endpoints[1];
        assert_eq!(stale.name, "stale");
        assert_eq!(stale.status, "Failed");
        assert_eq!(stale.model_name, "");
        assert_eq!(stale.instance_count, 0);

        assert_eq!(view.sagemaker_models[0].name, "churn-model");
        assert_eq!(view.bedrock_models[0].provider, "Anthropic");
        assert_eq!(view.bedrock_custom.len(), 1);
        assert_eq!(view.bedrock_custom[0].model_name, "support-tuned");
        assert_eq!(view.bedrock_custom[0].base_model_id, "anthropic.claude-v2");
    }
}

mod warehouse_tests {
    use super::*;

    #[tokio::test]
    async fn test_redshift_failure_keeps_athena_and_glue() {
        let runner = FakeRunner::new()
            .ok("ec2 describe-security-groups --region us-east-1", json!({"SecurityGroups": []}))
            .fail("redshift describe-clusters --region us-east-1", "An error occurred (AccessDenied)")
            .ok(
                "athena list-work-groups --region us-east-1",
                json!({"WorkGroups": [{
                    "Name": "primary",
                    "State": "ENABLED",
                    "Description": "default",
                    "EngineVersion": {"SelectedEngineVersion": "AUTO", "EffectiveEngineVersion": "Athena engine version 3"}
                }]}),
            )
            .ok(
                "glue get-databases --region us-east-1",
                json!({"DatabaseList": [
                    {"Name": "analytics", "LocationUri": "s3://lake/analytics", "CatalogId": "123456789012"},
                    {"Name": "raw", "Description": null}
                ]}),
            );
        let (syncer, _) = syncer(runner);

        let results = syncer.sync_warehouse("us-east-1", None).await.unwrap();
        let services: Vec<&str> = results.iter().map(|r| r.service.as_str()).collect();
        assert_eq!(services, vec!["redshift", "athena", "glue"]);
        assert!(!results[0].is_ok());
        assert_eq!(results[1].count, 1);
        assert_eq!(results[2].count, 2);

        let store = syncer.store();
        assert!(!store.exists("us-east-1:redshift").unwrap());
        assert!(store.exists("us-east-1:athena-enriched").unwrap());
        assert!(store.exists("us-east-1:glue-enriched").unwrap());

        let view = load_warehouse(store, "us-east-1").unwrap();
        assert!(view.redshift.is_empty());
        assert_eq!(view.athena[0].name, "primary");
        assert_eq!(view.athena[0].engine_version, "Athena engine version 3");

        let names: Vec<&str> = view.glue.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["analytics", "raw"]);
        assert_eq!(view.glue[0].location_uri, "s3://lake/analytics");
        assert_eq!(view.glue[1].description, "");
    }
}

mod compute_tests {
    use super::*;

    #[tokio::test]
    async fn test_instance_profile_resolves_to_policies() {
        let runner = FakeRunner::new()
            .ok("ec2 describe-security-groups --region us-east-1", json!({"SecurityGroups": []}))
            .ok(
                "ec2 describe-instances --region us-east-1",
                json!({"Reservations": [{"Instances": [{
                    "InstanceId": "i-1",
                    "State": {"Name": "running"},
                    "IamInstanceProfile": {"Arn": "arn:aws:iam::1:instance-profile/WebProfile"}
                }, {
                    "InstanceId": "i-2",
                    "State": {"Name": "stopped"}
                }]}]}),
            )
            .ok(
                "iam get-instance-profile --instance-profile-name WebProfile",
                json!({"InstanceProfile": {"Roles": [{"RoleName": "web-role"}]}}),
            )
            .ok(
                "iam list-attached-role-policies --role-name web-role",
                json!({"AttachedPolicies": [{"PolicyName": "ReadOnlyAccess", "PolicyArn": "arn:aws:iam::aws:policy/ReadOnlyAccess"}]}),
            )
            .ok("iam list-role-policies --role-name web-role", json!({"PolicyNames": ["s3-logs"]}));
        let (syncer, _) = syncer(runner);

        let results = syncer.sync_compute("us-east-1", None).await.unwrap();
        let services: Vec<&str> = results.iter().map(|r| r.service.as_str()).collect();
        assert_eq!(services, vec!["ec2", "ecs", "lambda"]);
        assert_eq!(results[0].count, 2);
        assert!(!results[1].is_ok());
        assert!(!results[2].is_ok());
        assert!(syncer.store().exists("us-east-1:security-groups").unwrap());

        let view = load_compute(syncer.store(), "us-east-1").unwrap();
        assert_eq!(view.ec2[0].iam_role, "web-role");
        assert_eq!(view.ec2[0].iam_policies, vec!["ReadOnlyAccess", "s3-logs (inline)"]);
        assert_eq!(view.ec2[1].iam_role, "");
        assert!(view.ecs.is_empty());
        assert!(view.lambda.is_empty());
    }

    #[tokio::test]
    async fn test_ecs_services_are_batched() {
        let service_arns: Vec<String> = (0..12).map(|i| format!("arn:svc/s{}", i)).collect();
        let first: Vec<&str> = service_arns[..10].iter().map(String::as_str).collect();
        let second: Vec<&str> = service_arns[10..].iter().map(String::as_str).collect();

        let runner = FakeRunner::new()
            .ok("ecs list-clusters --region us-east-1", json!({"clusterArns": ["arn:cluster/prod"]}))
            .ok(
                "ecs describe-clusters --region us-east-1 --include SETTINGS --clusters arn:cluster/prod",
                json!({"clusters": [{"clusterName": "prod", "clusterArn": "arn:cluster/prod", "status": "ACTIVE"}]}),
            )
            .ok(
                "ecs list-services --region us-east-1 --cluster arn:cluster/prod",
                json!({"serviceArns": service_arns}),
            )
            .ok(
                &format!("ecs describe-services --region us-east-1 --cluster arn:cluster/prod --services {}", first.join(" ")),
                json!({"services": [{"serviceName": "s0"}]}),
            )
            .ok(
                &format!("ecs describe-services --region us-east-1 --cluster arn:cluster/prod --services {}", second.join(" ")),
                json!({"services": [{"serviceName": "s10"}]}),
            );
        let (syncer, runner) = syncer(runner);

        let results = syncer.sync_compute("us-east-1", None).await.unwrap();
        assert_eq!(results[1].service, "ecs");
        assert_eq!(results[1].count, 1);

        let view = load_compute(syncer.store(), "us-east-1").unwrap();
        let names: Vec<&str> = view.ecs[0].ecs_services.iter().map(|s| s.service_name.as_str()).collect();
        assert_eq!(names, vec!["s0", "s10"]);

        let describe_calls = runner
            .calls()
            .iter()
            .filter(|c| c.starts_with("ecs describe-services"))
            .count();
        assert_eq!(describe_calls, 2);
    }
}

mod database_tests {
    use super::*;

    #[tokio::test]
    async fn test_dynamodb_and_elasticache_enrichment() {
        let runner = FakeRunner::new()
            .ok("dynamodb list-tables --region us-east-1", json!({"TableNames": ["orders", "gone"]}))
            .ok(
                "dynamodb describe-table --table-name orders --region us-east-1",
                json!({"Table": {"TableName": "orders", "TableStatus": "ACTIVE", "ItemCount": 42,
                                 "BillingModeSummary": {"BillingMode": "PAY_PER_REQUEST"}}}),
            )
            .ok(
                "elasticache describe-cache-clusters --show-cache-node-info --region us-east-1",
                json!({"CacheClusters": [{"CacheClusterId": "sessions", "CacheSubnetGroupName": "cache-private"}]}),
            )
            .ok(
                "elasticache describe-cache-subnet-groups --cache-subnet-group-name cache-private --region us-east-1",
                json!({"CacheSubnetGroups": [{"CacheSubnetGroupName": "cache-private", "VpcId": "vpc-9"}]}),
            );
        let (syncer, _) = syncer(runner);

        let results = syncer.sync_database("us-east-1", None).await.unwrap();
        let services: Vec<&str> = results.iter().map(|r| r.service.as_str()).collect();
        assert_eq!(services, vec!["rds", "dynamodb", "elasticache"]);
        assert!(!results[0].is_ok());
        // The table whose describe failed is dropped
        assert_eq!(results[1].count, 1);

        let view = load_database(syncer.store(), "us-east-1").unwrap();
        assert_eq!(view.dynamodb[0].billing_mode, "PAY_PER_REQUEST");
        assert_eq!(view.dynamodb[0].table_class, "STANDARD");
        assert_eq!(view.elasticache[0].vpc_id, "vpc-9");
    }
}

mod identity_tests {
    use super::*;

    #[tokio::test]
    async fn test_roles_and_failed_groups() {
        let runner = FakeRunner::new()
            .ok(
                "iam list-roles",
                json!({"Roles": [{
                    "RoleName": "deploy",
                    "Path": "/",
                    "AssumeRolePolicyDocument": {"Statement": [{"Effect": "Allow", "Principal": {"AWS": "arn:aws:iam::1:root"}, "Action": "sts:AssumeRole"}]}
                }]}),
            )
            .ok(
                "iam list-attached-role-policies --role-name deploy",
                json!({"AttachedPolicies": [{"PolicyName": "PowerUserAccess"}]}),
            )
            .ok("iam list-role-policies --role-name deploy", json!({"PolicyNames": ["extra"]}))
            .fail("iam list-groups", "An error occurred (AccessDenied)");
        let (syncer, _) = syncer(runner);

        let results = syncer.sync_category(Category::Identity, "ignored", None).await.unwrap();
        assert!(results[0].is_ok());
        assert_eq!(results[1].service, "iam-groups");
        assert!(!results[1].is_ok());

        let view = load_identity(syncer.store()).unwrap();
        let role = view.role("deploy").unwrap();
        assert_eq!(role.attached_policies, vec!["PowerUserAccess"]);
        assert_eq!(role.inline_policies, vec!["extra"]);
        assert_eq!(role.trust_policy[0].principal, "arn:aws:iam::1:root");
        assert!(view.groups.is_empty());
    }
}

mod orchestration_tests {
    use super::*;

    #[tokio::test]
    async fn test_sync_all_records_successful_services() {
        let runner = FakeRunner::new()
            .ok("ec2 describe-vpcs --region us-east-1", json!({"Vpcs": []}))
            .ok("s3api list-buckets", json!({"Buckets": []}))
            .ok("iam list-roles", json!({"Roles": []}));
        let (syncer, _) = syncer(runner);

        let results = syncer.sync_all("us-east-1", None).await.unwrap();
        assert!(results.len() > 20);

        let last = syncer.store().read_last_sync().unwrap().unwrap();
        let services: Vec<&str> = last.services.keys().map(String::as_str).collect();
        assert_eq!(services, vec!["iam-roles", "s3", "vpcs"]);
        assert!(last.services.values().all(|ok| *ok));
    }

    #[tokio::test]
    async fn test_regions_are_seeded_once() {
        let runner = FakeRunner::new().ok(
            "ec2 describe-regions --all-regions --query Regions[?OptInStatus!='not-opted-in'].[RegionName]",
            json!([["us-east-1"], ["eu-west-1"], ["ap-south-1"]]),
        );
        let (syncer, runner) = syncer(runner);

        let regions = syncer.ensure_regions_seeded().await.unwrap();
        let names: Vec<&str> = regions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["ap-south-1", "eu-west-1", "us-east-1"]);
        assert!(regions.iter().all(|r| r.enabled));

        syncer.store().set_region_enabled("eu-west-1", false).unwrap();
        let again = syncer.ensure_regions_seeded().await.unwrap();
        assert_eq!(again.len(), 3);
        assert!(!again.iter().find(|r| r.name == "eu-west-1").unwrap().enabled);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_region_discovery_failure_is_an_error() {
        let (syncer, _) = syncer(FakeRunner::new());
        assert!(syncer.ensure_regions_seeded().await.is_err());
        assert!(syncer.store().list_regions().unwrap().is_empty());
    }
}
