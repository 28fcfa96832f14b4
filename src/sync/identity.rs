//! IAM roles and groups. Global: no region argument.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{attached_policy_names, format_time_text, parse_list, read_derived, step, string_list, OnStep, SyncResult, Syncer};
use crate::cache::{keys, CacheStore};
use crate::policy::{self, PolicyStatement};

const SERVICE_ROLE_PATH: &str = "/aws-service-role/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct IamRole {
    pub role_name: String,
    pub role_id: String,
    pub arn: String,
    pub create_date: String,
    pub description: String,
    pub trust_policy: Vec<PolicyStatement>,
    pub attached_policies: Vec<String>,
    pub inline_policies: Vec<String>,
    pub is_service_linked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct IamGroup {
    pub group_name: String,
    pub group_id: String,
    pub arn: String,
    pub create_date: String,
    pub attached_policies: Vec<String>,
    pub inline_policies: Vec<String>,
    pub members: Vec<String>,
}

/// Account-wide identity view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityData {
    pub roles: Vec<IamRole>,
    pub groups: Vec<IamGroup>,
}

impl IdentityData {
    pub fn role(&self, name: &str) -> Option<&IamRole> {
        self.roles.iter().find(|r| r.role_name == name)
    }
}

// --- wire shapes ----------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RoleRecord {
    role_name: String,
    role_id: String,
    arn: String,
    create_date: String,
    description: String,
    path: String,
    /// Decoded object from the CLI, or a still-encoded string
    assume_role_policy_document: Value,
}

impl From<RoleRecord> for IamRole {
    fn from(r: RoleRecord) -> Self {
        Self {
            role_name: r.role_name,
            role_id: r.role_id,
            arn: r.arn,
            create_date: format_time_text(&r.create_date),
            description: r.description,
            trust_policy: policy::normalize_value(&r.assume_role_policy_document),
            attached_policies: Vec::new(),
            inline_policies: Vec::new(),
            is_service_linked: r.path.starts_with(SERVICE_ROLE_PATH),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct GroupRecord {
    group_name: String,
    group_id: String,
    arn: String,
    create_date: String,
}

impl From<GroupRecord> for IamGroup {
    fn from(r: GroupRecord) -> Self {
        Self {
            group_name: r.group_name,
            group_id: r.group_id,
            arn: r.arn,
            create_date: format_time_text(&r.create_date),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct UserRef {
    user_name: String,
}

fn parse_roles(data: &Value) -> Vec<IamRole> {
    parse_list::<RoleRecord>(data, "Roles")
        .into_iter()
        .map(IamRole::from)
        .collect()
}

fn parse_groups(data: &Value) -> Vec<IamGroup> {
    parse_list::<GroupRecord>(data, "Groups")
        .into_iter()
        .map(IamGroup::from)
        .collect()
}

impl Syncer {
    pub async fn sync_identity(&self, on_step: OnStep<'_>) -> Result<Vec<SyncResult>> {
        let mut results = Vec::with_capacity(2);
        let mut data = IdentityData::default();

        let (result, raw) = self
            .sync_raw("iam-roles", keys::IAM_ROLES, &["iam", "list-roles"], "Roles")
            .await;
        results.push(result);
        if let Some(raw) = raw {
            data.roles = self
                .enrich(parse_roles(&raw), |role| self.enrich_role(role))
                .await;
        }
        step(on_step, "iam roles");

        let (result, raw) = self
            .sync_raw("iam-groups", keys::IAM_GROUPS, &["iam", "list-groups"], "Groups")
            .await;
        results.push(result);
        if let Some(raw) = raw {
            data.groups = self
                .enrich(parse_groups(&raw), |group| self.enrich_group(group))
                .await;
        }
        step(on_step, "iam groups");

        self.store_derived(keys::IAM_ENRICHED, &data, &mut results);
        Ok(results)
    }

    async fn enrich_role(&self, mut role: IamRole) -> IamRole {
        if let Some(data) = self
            .lookup(&["iam", "list-attached-role-policies", "--role-name", &role.role_name])
            .await
        {
            role.attached_policies = attached_policy_names(&data);
        }
        if let Some(data) = self
            .lookup(&["iam", "list-role-policies", "--role-name", &role.role_name])
            .await
        {
            role.inline_policies = string_list(&data, "PolicyNames");
        }
        role
    }

    async fn enrich_group(&self, mut group: IamGroup) -> IamGroup {
        if let Some(data) = self
            .lookup(&["iam", "list-attached-group-policies", "--group-name", &group.group_name])
            .await
        {
            group.attached_policies = attached_policy_names(&data);
        }
        if let Some(data) = self
            .lookup(&["iam", "list-group-policies", "--group-name", &group.group_name])
            .await
        {
            group.inline_policies = string_list(&data, "PolicyNames");
        }
        if let Some(data) = self
            .lookup(&["iam", "get-group", "--group-name", &group.group_name])
            .await
        {
            group.members = parse_list::<UserRef>(&data, "Users")
                .into_iter()
                .map(|u| u.user_name)
                .collect();
        }
        group
    }
}

/// Identity view. Without an enriched collection, roles and groups come
/// from the raw listings with no policy or membership details.
pub fn load_identity(store: &CacheStore) -> Result<IdentityData> {
    if let Some(data) = read_derived::<IdentityData>(store, keys::IAM_ENRICHED)? {
        return Ok(data);
    }

    let roles = store
        .read(keys::IAM_ROLES)?
        .map(|raw| parse_roles(&raw))
        .unwrap_or_default();
    let groups = store
        .read(keys::IAM_GROUPS)?
        .map(|raw| parse_groups(&raw))
        .unwrap_or_default();
    Ok(IdentityData { roles, groups })
}
