//! Database: RDS instances, DynamoDB tables, ElastiCache clusters.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{parse_lenient, parse_list, read_derived, step, string_list, OnStep, SyncResult, Syncer};
use crate::cache::{regional, CacheStore};

const DEFAULT_BILLING_MODE: &str = "PROVISIONED";
const DEFAULT_TABLE_CLASS: &str = "STANDARD";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RdsInstance {
    #[serde(rename = "DBInstanceIdentifier")]
    pub db_instance_id: String,
    pub engine: String,
    pub engine_version: String,
    #[serde(rename = "DBInstanceClass")]
    pub instance_class: String,
    #[serde(rename = "DBInstanceStatus")]
    pub status: String,
    #[serde(rename = "MultiAZ")]
    pub multi_az: bool,
    pub storage_type: String,
    pub allocated_storage: i64,
    pub endpoint: String,
    pub port: i64,
    pub vpc_id: String,
    pub subnet_group_name: String,
    pub publicly_accessible: bool,
    pub security_groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DynamoDbTable {
    pub table_name: String,
    #[serde(rename = "TableStatus")]
    pub status: String,
    pub item_count: i64,
    #[serde(rename = "TableSizeBytes")]
    pub size_bytes: i64,
    pub billing_mode: String,
    pub table_class: String,
}

impl Default for DynamoDbTable {
    fn default() -> Self {
        Self {
            table_name: String::new(),
            status: String::new(),
            item_count: 0,
            size_bytes: 0,
            billing_mode: DEFAULT_BILLING_MODE.to_string(),
            table_class: DEFAULT_TABLE_CLASS.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ElastiCacheCluster {
    pub cache_cluster_id: String,
    pub engine: String,
    pub engine_version: String,
    pub cache_node_type: String,
    #[serde(rename = "NumCacheNodes")]
    pub num_nodes: i64,
    #[serde(rename = "CacheClusterStatus")]
    pub status: String,
    pub endpoint: String,
    pub port: i64,
    pub subnet_group_name: String,
    pub vpc_id: String,
    pub security_groups: Vec<String>,
}

/// Database view for one region
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseData {
    pub rds: Vec<RdsInstance>,
    pub dynamodb: Vec<DynamoDbTable>,
    pub elasticache: Vec<ElastiCacheCluster>,
}

// --- wire shapes ----------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct EndpointRecord {
    address: String,
    port: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DbSubnetGroupRecord {
    #[serde(rename = "DBSubnetGroupName")]
    name: String,
    #[serde(rename = "VpcId")]
    vpc_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct VpcSecurityGroupRef {
    vpc_security_group_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DbInstanceRecord {
    #[serde(rename = "DBInstanceIdentifier")]
    db_instance_identifier: String,
    engine: String,
    engine_version: String,
    #[serde(rename = "DBInstanceClass")]
    db_instance_class: String,
    #[serde(rename = "DBInstanceStatus")]
    db_instance_status: String,
    #[serde(rename = "MultiAZ")]
    multi_az: bool,
    storage_type: String,
    allocated_storage: i64,
    publicly_accessible: bool,
    endpoint: Option<EndpointRecord>,
    #[serde(rename = "DBSubnetGroup")]
    db_subnet_group: Option<DbSubnetGroupRecord>,
    vpc_security_groups: Vec<VpcSecurityGroupRef>,
}

impl From<DbInstanceRecord> for RdsInstance {
    fn from(r: DbInstanceRecord) -> Self {
        let endpoint = r.endpoint.unwrap_or_default();
        let subnet_group = r.db_subnet_group.unwrap_or_default();
        Self {
            db_instance_id: r.db_instance_identifier,
            engine: r.engine,
            engine_version: r.engine_version,
            instance_class: r.db_instance_class,
            status: r.db_instance_status,
            multi_az: r.multi_az,
            storage_type: r.storage_type,
            allocated_storage: r.allocated_storage,
            endpoint: endpoint.address,
            port: endpoint.port,
            vpc_id: subnet_group.vpc_id,
            subnet_group_name: subnet_group.name,
            publicly_accessible: r.publicly_accessible,
            security_groups: r
                .vpc_security_groups
                .into_iter()
                .map(|sg| sg.vpc_security_group_id)
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct BillingModeSummary {
    billing_mode: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct TableClassSummary {
    table_class: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct TableRecord {
    table_name: String,
    table_status: String,
    item_count: i64,
    table_size_bytes: i64,
    billing_mode_summary: Option<BillingModeSummary>,
    table_class_summary: Option<TableClassSummary>,
}

impl From<TableRecord> for DynamoDbTable {
    fn from(r: TableRecord) -> Self {
        let billing_mode = r
            .billing_mode_summary
            .map(|s| s.billing_mode)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_BILLING_MODE.to_string());
        let table_class = r
            .table_class_summary
            .map(|s| s.table_class)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_TABLE_CLASS.to_string());
        Self {
            table_name: r.table_name,
            status: r.table_status,
            item_count: r.item_count,
            size_bytes: r.table_size_bytes,
            billing_mode,
            table_class,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct CacheNodeRecord {
    endpoint: Option<EndpointRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct CacheSecurityGroupRef {
    security_group_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct CacheClusterRecord {
    cache_cluster_id: String,
    engine: String,
    engine_version: String,
    cache_node_type: String,
    num_cache_nodes: i64,
    cache_cluster_status: String,
    cache_subnet_group_name: String,
    configuration_endpoint: Option<EndpointRecord>,
    cache_nodes: Vec<CacheNodeRecord>,
    security_groups: Vec<CacheSecurityGroupRef>,
}

impl From<CacheClusterRecord> for ElastiCacheCluster {
    fn from(r: CacheClusterRecord) -> Self {
        // Cluster-mode endpoint wins over the first node's
        let endpoint = r
            .configuration_endpoint
            .or_else(|| r.cache_nodes.into_iter().next().and_then(|n| n.endpoint))
            .unwrap_or_default();
        Self {
            cache_cluster_id: r.cache_cluster_id,
            engine: r.engine,
            engine_version: r.engine_version,
            cache_node_type: r.cache_node_type,
            num_nodes: r.num_cache_nodes,
            status: r.cache_cluster_status,
            endpoint: endpoint.address,
            port: endpoint.port,
            subnet_group_name: r.cache_subnet_group_name,
            vpc_id: String::new(),
            security_groups: r.security_groups.into_iter().map(|sg| sg.security_group_id).collect(),
        }
    }
}

fn parse_rds(data: &Value) -> Vec<RdsInstance> {
    parse_list::<DbInstanceRecord>(data, "DBInstances")
        .into_iter()
        .map(RdsInstance::from)
        .collect()
}

fn parse_cache_clusters(data: &Value) -> Vec<ElastiCacheCluster> {
    parse_list::<CacheClusterRecord>(data, "CacheClusters")
        .into_iter()
        .map(ElastiCacheCluster::from)
        .collect()
}

/// Table shells from a bare `list-tables` response
fn tables_from_names(data: &Value) -> Vec<DynamoDbTable> {
    string_list(data, "TableNames")
        .into_iter()
        .map(|table_name| DynamoDbTable {
            table_name,
            ..Default::default()
        })
        .collect()
}

impl Syncer {
    pub async fn sync_database(&self, region: &str, on_step: OnStep<'_>) -> Result<Vec<SyncResult>> {
        let mut results = Vec::with_capacity(3);

        self.precache_security_groups(region).await;
        step(on_step, "security groups");

        let (result, _) = self
            .sync_raw("rds", &regional(region, "rds"), &["rds", "describe-db-instances", "--region", region], "DBInstances")
            .await;
        results.push(result);
        step(on_step, "rds");

        // DynamoDB: list, then describe each table
        let (mut result, data) = self
            .sync_raw(
                "dynamodb",
                &regional(region, "dynamodb-tables"),
                &["dynamodb", "list-tables", "--region", region],
                "TableNames",
            )
            .await;
        if let Some(data) = data {
            let tables: Vec<DynamoDbTable> = self
                .enrich(string_list(&data, "TableNames"), |name| async move {
                    let described = self
                        .lookup(&["dynamodb", "describe-table", "--table-name", &name, "--region", region])
                        .await?;
                    let record: TableRecord = parse_lenient(described.get("Table").unwrap_or(&Value::Null), "Table");
                    Some(DynamoDbTable::from(record))
                })
                .await
                .into_iter()
                .flatten()
                .collect();
            result.count = tables.len();
            results.push(result);
            self.store_derived(&regional(region, "dynamodb-enriched"), &tables, &mut results);
        } else {
            results.push(result);
        }
        step(on_step, "dynamodb");

        // ElastiCache, with the VPC taken from each cluster's subnet group
        let (mut result, data) = self
            .sync_raw(
                "elasticache",
                &regional(region, "elasticache"),
                &["elasticache", "describe-cache-clusters", "--show-cache-node-info", "--region", region],
                "CacheClusters",
            )
            .await;
        if let Some(data) = data {
            let clusters = self
                .enrich(parse_cache_clusters(&data), |mut cluster| async move {
                    if !cluster.subnet_group_name.is_empty() {
                        cluster.vpc_id = self.cache_subnet_group_vpc(region, &cluster.subnet_group_name).await;
                    }
                    cluster
                })
                .await;
            result.count = clusters.len();
            results.push(result);
            self.store_derived(&regional(region, "elasticache-enriched"), &clusters, &mut results);
        } else {
            results.push(result);
        }
        step(on_step, "elasticache");

        Ok(results)
    }

    async fn cache_subnet_group_vpc(&self, region: &str, group_name: &str) -> String {
        self.lookup(&[
            "elasticache",
            "describe-cache-subnet-groups",
            "--cache-subnet-group-name",
            group_name,
            "--region",
            region,
        ])
        .await
        .and_then(|data| {
            data.pointer("/CacheSubnetGroups/0/VpcId")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default()
    }
}

/// Database view for `region`
pub fn load_database(store: &CacheStore, region: &str) -> Result<DatabaseData> {
    let rds = store
        .read(&regional(region, "rds"))?
        .map(|data| parse_rds(&data))
        .unwrap_or_default();

    let dynamodb = match read_derived::<Vec<DynamoDbTable>>(store, &regional(region, "dynamodb-enriched"))? {
        Some(tables) => tables,
        None => store
            .read(&regional(region, "dynamodb-tables"))?
            .map(|data| tables_from_names(&data))
            .unwrap_or_default(),
    };

    let elasticache = match read_derived::<Vec<ElastiCacheCluster>>(store, &regional(region, "elasticache-enriched"))? {
        Some(clusters) => clusters,
        None => store
            .read(&regional(region, "elasticache"))?
            .map(|data| parse_cache_clusters(&data))
            .unwrap_or_default(),
    };

    Ok(DatabaseData {
        rds,
        dynamodb,
        elasticache,
    })
}
