//! Network: VPCs and everything that hangs off them.
//!
//! Eight listing calls, then one assembly pass that groups subnets,
//! gateways, route tables, security groups and load balancers under the VPC
//! they belong to and classifies each route table (and through it each
//! subnet) as public, egress-only or isolated.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{parse_list, read_derived, step, tag_name, OnStep, SyncResult, Syncer, Tag};
use crate::cache::{regional, CacheStore};

/// How traffic leaves a route table's subnets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteAccess {
    Public,
    EgressOnly,
    #[default]
    Isolated,
}

impl RouteAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::EgressOnly => "egress-only",
            Self::Isolated => "isolated",
        }
    }
}

/// Public wins over egress-only, which wins over isolated
pub fn classify_routes(routes: &[Route]) -> RouteAccess {
    if routes.iter().any(|r| r.gateway_id.starts_with("igw-")) {
        RouteAccess::Public
    } else if routes.iter().any(|r| r.nat_gateway_id.starts_with("nat-")) {
        RouteAccess::EgressOnly
    } else {
        RouteAccess::Isolated
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Vpc {
    pub vpc_id: String,
    pub cidr_block: String,
    pub state: String,
    pub is_default: bool,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Subnet {
    pub subnet_id: String,
    pub vpc_id: String,
    pub cidr_block: String,
    pub availability_zone: String,
    pub state: String,
    pub available_ip_address_count: i64,
    pub map_public_ip_on_launch: bool,
    pub name: String,
    /// Access of the route table governing this subnet
    pub access: RouteAccess,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InternetGateway {
    pub internet_gateway_id: String,
    pub attached_vpc_ids: Vec<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NatGateway {
    pub nat_gateway_id: String,
    pub vpc_id: String,
    pub subnet_id: String,
    pub state: String,
    pub connectivity_type: String,
    pub public_ip: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Route {
    pub destination_cidr_block: String,
    pub gateway_id: String,
    pub nat_gateway_id: String,
    pub state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RouteTable {
    pub route_table_id: String,
    pub vpc_id: String,
    pub name: String,
    pub routes: Vec<Route>,
    pub subnet_ids: Vec<String>,
    pub is_main: bool,
    pub access: RouteAccess,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SecurityGroup {
    pub group_id: String,
    pub group_name: String,
    pub description: String,
    pub vpc_id: String,
    pub inbound_count: usize,
    pub outbound_count: usize,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoadBalancer {
    pub load_balancer_name: String,
    pub load_balancer_arn: String,
    pub dns_name: String,
    #[serde(rename = "Type")]
    pub kind: String,
    pub scheme: String,
    pub state: String,
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    pub security_groups: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TargetGroup {
    pub target_group_name: String,
    pub target_group_arn: String,
    pub protocol: String,
    pub port: i64,
    pub target_type: String,
    pub vpc_id: String,
    pub load_balancer_arns: Vec<String>,
}

/// A VPC with the resources associated to it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VpcNetwork {
    #[serde(flatten)]
    pub vpc: Vpc,
    pub subnets: Vec<Subnet>,
    pub internet_gateways: Vec<InternetGateway>,
    pub nat_gateways: Vec<NatGateway>,
    pub route_tables: Vec<RouteTable>,
    pub security_groups: Vec<SecurityGroup>,
    pub load_balancers: Vec<LoadBalancer>,
    pub target_groups: Vec<TargetGroup>,
}

/// Enriched network view for one region
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkData {
    pub vpcs: Vec<VpcNetwork>,
}

impl NetworkData {
    pub fn vpc(&self, vpc_id: &str) -> Option<&VpcNetwork> {
        self.vpcs.iter().find(|v| v.vpc.vpc_id == vpc_id)
    }
}

// --- wire shapes ----------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct VpcRecord {
    #[serde(flatten)]
    vpc: Vpc,
    tags: Vec<Tag>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct SubnetRecord {
    #[serde(flatten)]
    subnet: Subnet,
    tags: Vec<Tag>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct AttachmentRecord {
    vpc_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InternetGatewayRecord {
    internet_gateway_id: String,
    attachments: Vec<AttachmentRecord>,
    tags: Vec<Tag>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct NatAddressRecord {
    public_ip: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct NatGatewayRecord {
    nat_gateway_id: String,
    vpc_id: String,
    subnet_id: String,
    state: String,
    connectivity_type: String,
    nat_gateway_addresses: Vec<NatAddressRecord>,
    tags: Vec<Tag>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct AssociationRecord {
    main: bool,
    subnet_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RouteTableRecord {
    route_table_id: String,
    vpc_id: String,
    routes: Vec<Route>,
    associations: Vec<AssociationRecord>,
    tags: Vec<Tag>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct SecurityGroupRecord {
    group_id: String,
    group_name: String,
    description: String,
    vpc_id: String,
    ip_permissions: Vec<Value>,
    ip_permissions_egress: Vec<Value>,
    tags: Vec<Tag>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct LbStateRecord {
    code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct AvailabilityZoneRecord {
    subnet_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct LoadBalancerRecord {
    load_balancer_name: String,
    load_balancer_arn: String,
    #[serde(rename = "DNSName")]
    dns_name: String,
    #[serde(rename = "Type")]
    kind: String,
    scheme: String,
    state: LbStateRecord,
    vpc_id: String,
    availability_zones: Vec<AvailabilityZoneRecord>,
    security_groups: Vec<String>,
}

/// Raw listings the assembly pass works from
#[derive(Debug, Default)]
struct NetworkParts {
    vpcs: Vec<Vpc>,
    subnets: Vec<Subnet>,
    igws: Vec<InternetGateway>,
    nat_gws: Vec<NatGateway>,
    route_tables: Vec<RouteTable>,
    security_groups: Vec<SecurityGroup>,
    load_balancers: Vec<LoadBalancer>,
    target_groups: Vec<TargetGroup>,
}

impl NetworkParts {
    fn absorb(&mut self, service: &str, data: &Value) {
        match service {
            "vpcs" => self.vpcs = parse_vpcs(data),
            "subnets" => self.subnets = parse_subnets(data),
            "igws" => self.igws = parse_igws(data),
            "nat-gws" => self.nat_gws = parse_nat_gws(data),
            "route-tables" => self.route_tables = parse_route_tables(data),
            "security-groups" => self.security_groups = parse_security_groups(data),
            "load-balancers" => self.load_balancers = parse_load_balancers(data),
            "target-groups" => self.target_groups = parse_list(data, "TargetGroups"),
            _ => {},
        }
    }
}

fn parse_vpcs(data: &Value) -> Vec<Vpc> {
    parse_list::<VpcRecord>(data, "Vpcs")
        .into_iter()
        .map(|r| Vpc {
            name: tag_name(&r.tags),
            ..r.vpc
        })
        .collect()
}

fn parse_subnets(data: &Value) -> Vec<Subnet> {
    parse_list::<SubnetRecord>(data, "Subnets")
        .into_iter()
        .map(|r| Subnet {
            name: tag_name(&r.tags),
            ..r.subnet
        })
        .collect()
}

fn parse_igws(data: &Value) -> Vec<InternetGateway> {
    parse_list::<InternetGatewayRecord>(data, "InternetGateways")
        .into_iter()
        .map(|r| InternetGateway {
            name: tag_name(&r.tags),
            internet_gateway_id: r.internet_gateway_id,
            attached_vpc_ids: r.attachments.into_iter().map(|a| a.vpc_id).collect(),
        })
        .collect()
}

fn parse_nat_gws(data: &Value) -> Vec<NatGateway> {
    parse_list::<NatGatewayRecord>(data, "NatGateways")
        .into_iter()
        .map(|r| NatGateway {
            name: tag_name(&r.tags),
            public_ip: r
                .nat_gateway_addresses
                .into_iter()
                .map(|a| a.public_ip)
                .find(|ip| !ip.is_empty())
                .unwrap_or_default(),
            nat_gateway_id: r.nat_gateway_id,
            vpc_id: r.vpc_id,
            subnet_id: r.subnet_id,
            state: r.state,
            connectivity_type: r.connectivity_type,
        })
        .collect()
}

fn parse_route_tables(data: &Value) -> Vec<RouteTable> {
    parse_list::<RouteTableRecord>(data, "RouteTables")
        .into_iter()
        .map(|r| RouteTable {
            name: tag_name(&r.tags),
            is_main: r.associations.iter().any(|a| a.main),
            subnet_ids: r
                .associations
                .into_iter()
                .filter_map(|a| a.subnet_id)
                .filter(|id| !id.is_empty())
                .collect(),
            access: classify_routes(&r.routes),
            route_table_id: r.route_table_id,
            vpc_id: r.vpc_id,
            routes: r.routes,
        })
        .collect()
}

fn parse_security_groups(data: &Value) -> Vec<SecurityGroup> {
    parse_list::<SecurityGroupRecord>(data, "SecurityGroups")
        .into_iter()
        .map(|r| SecurityGroup {
            name: tag_name(&r.tags),
            inbound_count: r.ip_permissions.len(),
            outbound_count: r.ip_permissions_egress.len(),
            group_id: r.group_id,
            group_name: r.group_name,
            description: r.description,
            vpc_id: r.vpc_id,
        })
        .collect()
}

fn parse_load_balancers(data: &Value) -> Vec<LoadBalancer> {
    parse_list::<LoadBalancerRecord>(data, "LoadBalancers")
        .into_iter()
        .map(|r| LoadBalancer {
            load_balancer_name: r.load_balancer_name,
            load_balancer_arn: r.load_balancer_arn,
            dns_name: r.dns_name,
            kind: r.kind,
            scheme: r.scheme,
            state: r.state.code,
            vpc_id: r.vpc_id,
            subnet_ids: r
                .availability_zones
                .into_iter()
                .map(|az| az.subnet_id)
                .filter(|id| !id.is_empty())
                .collect(),
            security_groups: r.security_groups,
        })
        .collect()
}

/// Group everything under its VPC. Subnets take the access of the route
/// table they are explicitly associated with, else of their VPC's main table.
fn assemble(parts: NetworkParts) -> NetworkData {
    let NetworkParts {
        vpcs,
        subnets,
        igws,
        nat_gws,
        route_tables,
        security_groups,
        load_balancers,
        target_groups,
    } = parts;

    let subnet_access = |subnet: &Subnet| -> RouteAccess {
        route_tables
            .iter()
            .find(|rt| rt.subnet_ids.iter().any(|id| *id == subnet.subnet_id))
            .or_else(|| route_tables.iter().find(|rt| rt.is_main && rt.vpc_id == subnet.vpc_id))
            .map(|rt| rt.access)
            .unwrap_or_default()
    };

    let vpcs = vpcs
        .into_iter()
        .map(|vpc| {
            let id = vpc.vpc_id.as_str();
            VpcNetwork {
                subnets: subnets
                    .iter()
                    .filter(|s| s.vpc_id == id)
                    .map(|s| Subnet {
                        access: subnet_access(s),
                        ..s.clone()
                    })
                    .collect(),
                internet_gateways: igws
                    .iter()
                    .filter(|g| g.attached_vpc_ids.iter().any(|v| v == id))
                    .cloned()
                    .collect(),
                nat_gateways: nat_gws.iter().filter(|n| n.vpc_id == id).cloned().collect(),
                route_tables: route_tables.iter().filter(|rt| rt.vpc_id == id).cloned().collect(),
                security_groups: security_groups.iter().filter(|sg| sg.vpc_id == id).cloned().collect(),
                load_balancers: load_balancers.iter().filter(|lb| lb.vpc_id == id).cloned().collect(),
                target_groups: target_groups.iter().filter(|tg| tg.vpc_id == id).cloned().collect(),
                vpc,
            }
        })
        .collect();

    NetworkData { vpcs }
}

/// (service and cache category, command, list field)
const NETWORK_CALLS: [(&str, &[&str], &str); 8] = [
    ("vpcs", &["ec2", "describe-vpcs"], "Vpcs"),
    ("subnets", &["ec2", "describe-subnets"], "Subnets"),
    ("igws", &["ec2", "describe-internet-gateways"], "InternetGateways"),
    ("nat-gws", &["ec2", "describe-nat-gateways"], "NatGateways"),
    ("route-tables", &["ec2", "describe-route-tables"], "RouteTables"),
    ("security-groups", &["ec2", "describe-security-groups"], "SecurityGroups"),
    ("load-balancers", &["elbv2", "describe-load-balancers"], "LoadBalancers"),
    ("target-groups", &["elbv2", "describe-target-groups"], "TargetGroups"),
];

impl Syncer {
    pub async fn sync_network(&self, region: &str, on_step: OnStep<'_>) -> Result<Vec<SyncResult>> {
        let mut results = Vec::with_capacity(NETWORK_CALLS.len());
        let mut parts = NetworkParts::default();

        for (service, command, field) in NETWORK_CALLS {
            let mut args: Vec<&str> = command.to_vec();
            args.extend(["--region", region]);

            let key = regional(region, service);
            let (result, data) = self.sync_raw(service, &key, &args, field).await;
            if let Some(data) = data {
                parts.absorb(service, &data);
            }
            results.push(result);
            step(on_step, service);
        }

        let network = assemble(parts);
        self.store_derived(&regional(region, "network-enriched"), &network, &mut results);

        Ok(results)
    }
}

/// Network view for `region`, rebuilt from the raw listings when the
/// enriched entry is missing
pub fn load_network(store: &CacheStore, region: &str) -> Result<NetworkData> {
    if let Some(data) = read_derived::<NetworkData>(store, &regional(region, "network-enriched"))? {
        return Ok(data);
    }

    let mut parts = NetworkParts::default();
    for (service, _, _) in NETWORK_CALLS {
        if let Some(data) = store.read(&regional(region, service))? {
            parts.absorb(service, &data);
        }
    }
    Ok(assemble(parts))
}
