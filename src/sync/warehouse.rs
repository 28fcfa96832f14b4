//! Data warehouse: Redshift clusters, Athena workgroups, Glue databases.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{format_time, parse_list, read_derived, step, OnStep, SyncResult, Syncer};
use crate::cache::{regional, CacheStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RedshiftSecurityGroup {
    #[serde(rename = "VpcSecurityGroupId")]
    pub group_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RedshiftCluster {
    pub cluster_identifier: String,
    pub node_type: String,
    pub number_of_nodes: i64,
    #[serde(rename = "ClusterStatus")]
    pub status: String,
    #[serde(rename = "DBName")]
    pub db_name: String,
    pub endpoint: String,
    pub port: i64,
    pub vpc_id: String,
    pub subnet_group_name: String,
    pub encrypted: bool,
    pub publicly_accessible: bool,
    pub security_groups: Vec<RedshiftSecurityGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AthenaWorkgroup {
    pub name: String,
    pub state: String,
    pub description: String,
    pub engine_version: String,
    pub creation_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GlueDatabase {
    pub name: String,
    pub description: String,
    pub location_uri: String,
    pub create_time: String,
    pub catalog_id: String,
}

/// Warehouse view for one region
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseData {
    pub redshift: Vec<RedshiftCluster>,
    pub athena: Vec<AthenaWorkgroup>,
    pub glue: Vec<GlueDatabase>,
}

// --- wire shapes ----------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct EndpointRecord {
    address: String,
    port: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RedshiftRecord {
    cluster_identifier: String,
    node_type: String,
    number_of_nodes: i64,
    cluster_status: String,
    #[serde(rename = "DBName")]
    db_name: String,
    encrypted: bool,
    publicly_accessible: bool,
    endpoint: Option<EndpointRecord>,
    vpc_id: String,
    cluster_subnet_group_name: String,
    vpc_security_groups: Vec<RedshiftSecurityGroup>,
}

impl From<RedshiftRecord> for RedshiftCluster {
    fn from(r: RedshiftRecord) -> Self {
        let endpoint = r.endpoint.unwrap_or_default();
        Self {
            cluster_identifier: r.cluster_identifier,
            node_type: r.node_type,
            number_of_nodes: r.number_of_nodes,
            status: r.cluster_status,
            db_name: r.db_name,
            endpoint: endpoint.address,
            port: endpoint.port,
            vpc_id: r.vpc_id,
            subnet_group_name: r.cluster_subnet_group_name,
            encrypted: r.encrypted,
            publicly_accessible: r.publicly_accessible,
            security_groups: r.vpc_security_groups,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct EngineVersionRecord {
    effective_engine_version: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct WorkgroupRecord {
    name: String,
    state: String,
    description: String,
    creation_time: Value,
    engine_version: EngineVersionRecord,
}

impl From<WorkgroupRecord> for AthenaWorkgroup {
    fn from(r: WorkgroupRecord) -> Self {
        Self {
            name: r.name,
            state: r.state,
            description: r.description,
            engine_version: r.engine_version.effective_engine_version,
            creation_time: format_time(&r.creation_time),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct GlueRecord {
    name: String,
    description: String,
    location_uri: String,
    create_time: Value,
    catalog_id: String,
}

impl From<GlueRecord> for GlueDatabase {
    fn from(r: GlueRecord) -> Self {
        Self {
            name: r.name,
            description: r.description,
            location_uri: r.location_uri,
            create_time: format_time(&r.create_time),
            catalog_id: r.catalog_id,
        }
    }
}

fn parse_redshift(data: &Value) -> Vec<RedshiftCluster> {
    parse_list::<RedshiftRecord>(data, "Clusters")
        .into_iter()
        .map(RedshiftCluster::from)
        .collect()
}

fn parse_workgroups(data: &Value) -> Vec<AthenaWorkgroup> {
    parse_list::<WorkgroupRecord>(data, "WorkGroups")
        .into_iter()
        .map(AthenaWorkgroup::from)
        .collect()
}

fn parse_glue(data: &Value) -> Vec<GlueDatabase> {
    parse_list::<GlueRecord>(data, "DatabaseList")
        .into_iter()
        .map(GlueDatabase::from)
        .collect()
}

impl Syncer {
    pub async fn sync_warehouse(&self, region: &str, on_step: OnStep<'_>) -> Result<Vec<SyncResult>> {
        let mut results = Vec::with_capacity(3);

        self.precache_security_groups(region).await;
        step(on_step, "security groups");

        let (result, _) = self
            .sync_raw("redshift", &regional(region, "redshift"), &["redshift", "describe-clusters", "--region", region], "Clusters")
            .await;
        results.push(result);
        step(on_step, "redshift");

        let (result, data) = self
            .sync_raw("athena", &regional(region, "athena"), &["athena", "list-work-groups", "--region", region], "WorkGroups")
            .await;
        results.push(result);
        if let Some(data) = data {
            self.store_derived(&regional(region, "athena-enriched"), &parse_workgroups(&data), &mut results);
        }
        step(on_step, "athena");

        let (result, data) = self
            .sync_raw("glue", &regional(region, "glue"), &["glue", "get-databases", "--region", region], "DatabaseList")
            .await;
        results.push(result);
        if let Some(data) = data {
            self.store_derived(&regional(region, "glue-enriched"), &parse_glue(&data), &mut results);
        }
        step(on_step, "glue");

        Ok(results)
    }
}

/// Warehouse view for `region`
pub fn load_warehouse(store: &CacheStore, region: &str) -> Result<WarehouseData> {
    let redshift = store
        .read(&regional(region, "redshift"))?
        .map(|data| parse_redshift(&data))
        .unwrap_or_default();

    let athena = match read_derived::<Vec<AthenaWorkgroup>>(store, &regional(region, "athena-enriched"))? {
        Some(workgroups) => workgroups,
        None => store
            .read(&regional(region, "athena"))?
            .map(|data| parse_workgroups(&data))
            .unwrap_or_default(),
    };

    let glue = match read_derived::<Vec<GlueDatabase>>(store, &regional(region, "glue-enriched"))? {
        Some(databases) => databases,
        None => store
            .read(&regional(region, "glue"))?
            .map(|data| parse_glue(&data))
            .unwrap_or_default(),
    };

    Ok(WarehouseData { redshift, athena, glue })
}
