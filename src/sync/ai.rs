//! AI & ML: SageMaker notebooks, endpoints and models; Bedrock foundation
//! and custom models.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{format_time, parse_lenient, parse_list, read_derived, step, OnStep, SyncResult, Syncer};
use crate::cache::{regional, CacheStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NotebookInstance {
    pub name: String,
    pub status: String,
    pub instance_type: String,
    pub creation_time: String,
    pub url: String,
    pub direct_internet_access: String,
    pub subnet_id: String,
    pub security_groups: Vec<String>,
    pub role_arn: String,
    pub role_name: String,
    #[serde(rename = "VolumeSizeGB")]
    pub volume_size_gb: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SageMakerEndpoint {
    pub name: String,
    pub status: String,
    pub creation_time: String,
    pub model_name: String,
    pub instance_type: String,
    pub instance_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SageMakerModel {
    pub name: String,
    pub creation_time: String,
    pub model_arn: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FoundationModel {
    pub model_id: String,
    pub model_name: String,
    pub provider: String,
    pub input_modes: Vec<String>,
    pub output_modes: Vec<String>,
    pub streaming: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CustomModel {
    pub model_name: String,
    pub model_arn: String,
    pub base_model_id: String,
    pub creation_time: String,
}

/// AI view for one region
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiData {
    pub sagemaker_notebooks: Vec<NotebookInstance>,
    pub sagemaker_endpoints: Vec<SageMakerEndpoint>,
    pub sagemaker_models: Vec<SageMakerModel>,
    pub bedrock_models: Vec<FoundationModel>,
    pub bedrock_custom: Vec<CustomModel>,
}

/// Role name from a role ARN; empty unless the ARN has a path
fn role_name(arn: &str) -> String {
    match arn.rsplit_once('/') {
        Some((_, name)) => name.to_string(),
        None => String::new(),
    }
}

// --- wire shapes ----------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct NotebookRecord {
    notebook_instance_name: String,
    notebook_instance_status: String,
    instance_type: String,
    creation_time: Value,
    url: String,
    direct_internet_access: String,
    subnet_id: String,
    security_groups: Vec<String>,
    role_arn: String,
    #[serde(rename = "VolumeSizeInGB")]
    volume_size_in_gb: i64,
}

impl From<NotebookRecord> for NotebookInstance {
    fn from(r: NotebookRecord) -> Self {
        Self {
            name: r.notebook_instance_name,
            status: r.notebook_instance_status,
            instance_type: r.instance_type,
            creation_time: format_time(&r.creation_time),
            url: r.url,
            direct_internet_access: r.direct_internet_access,
            subnet_id: r.subnet_id,
            security_groups: r.security_groups,
            role_name: role_name(&r.role_arn),
            role_arn: r.role_arn,
            volume_size_gb: r.volume_size_in_gb,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct EndpointRecord {
    endpoint_name: String,
    endpoint_status: String,
    creation_time: Value,
}

impl From<EndpointRecord> for SageMakerEndpoint {
    fn from(r: EndpointRecord) -> Self {
        Self {
            name: r.endpoint_name,
            status: r.endpoint_status,
            creation_time: format_time(&r.creation_time),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ProductionVariantRecord {
    model_name: String,
    instance_type: String,
    initial_instance_count: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ModelRecord {
    model_name: String,
    creation_time: Value,
    model_arn: String,
}

impl From<ModelRecord> for SageMakerModel {
    fn from(r: ModelRecord) -> Self {
        Self {
            name: r.model_name,
            creation_time: format_time(&r.creation_time),
            model_arn: r.model_arn,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FoundationModelRecord {
    model_id: String,
    model_name: String,
    provider_name: String,
    input_modalities: Vec<String>,
    output_modalities: Vec<String>,
    response_streaming_supported: bool,
}

impl From<FoundationModelRecord> for FoundationModel {
    fn from(r: FoundationModelRecord) -> Self {
        Self {
            model_id: r.model_id,
            model_name: r.model_name,
            provider: r.provider_name,
            input_modes: r.input_modalities,
            output_modes: r.output_modalities,
            streaming: r.response_streaming_supported,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CustomModelRecord {
    model_name: String,
    model_arn: String,
    base_model_identifier: String,
    creation_time: Value,
}

impl From<CustomModelRecord> for CustomModel {
    fn from(r: CustomModelRecord) -> Self {
        Self {
            model_name: r.model_name,
            model_arn: r.model_arn,
            base_model_id: r.base_model_identifier,
            creation_time: format_time(&r.creation_time),
        }
    }
}

fn parse_into<R, T>(data: &Value, field: &str) -> Vec<T>
where
    R: serde::de::DeserializeOwned + Default,
    T: From<R>,
{
    parse_list::<R>(data, field).into_iter().map(T::from).collect()
}

/// (service and cache category, command, list field, step label)
const AI_CALLS: [(&str, &[&str], &str, &str); 5] = [
    ("sagemaker-notebooks", &["sagemaker", "list-notebook-instances"], "NotebookInstances", "sagemaker notebooks"),
    ("sagemaker-endpoints", &["sagemaker", "list-endpoints"], "Endpoints", "sagemaker endpoints"),
    ("sagemaker-models", &["sagemaker", "list-models"], "Models", "sagemaker models"),
    ("bedrock-models", &["bedrock", "list-foundation-models"], "modelSummaries", "bedrock models"),
    ("bedrock-custom", &["bedrock", "list-custom-models"], "modelSummaries", "bedrock custom models"),
];

impl Syncer {
    pub async fn sync_ai(&self, region: &str, on_step: OnStep<'_>) -> Result<Vec<SyncResult>> {
        let mut results = Vec::with_capacity(AI_CALLS.len());
        let mut data = AiData::default();

        for (service, command, field, label) in AI_CALLS {
            let mut args: Vec<&str> = command.to_vec();
            args.extend(["--region", region]);

            let (result, raw) = self.sync_raw(service, &regional(region, service), &args, field).await;
            results.push(result);

            if let Some(raw) = raw {
                match service {
                    "sagemaker-notebooks" => data.sagemaker_notebooks = parse_into::<NotebookRecord, _>(&raw, field),
                    "sagemaker-endpoints" => {
                        let endpoints = parse_into::<EndpointRecord, _>(&raw, field);
                        data.sagemaker_endpoints = self
                            .enrich(endpoints, |endpoint| self.enrich_endpoint(region, endpoint))
                            .await;
                    },
                    "sagemaker-models" => data.sagemaker_models = parse_into::<ModelRecord, _>(&raw, field),
                    "bedrock-models" => data.bedrock_models = parse_into::<FoundationModelRecord, _>(&raw, field),
                    "bedrock-custom" => data.bedrock_custom = parse_into::<CustomModelRecord, _>(&raw, field),
                    other => tracing::warn!("No parser for {}", other),
                }
            }
            step(on_step, label);
        }

        self.store_derived(&regional(region, "ai-enriched"), &data, &mut results);
        Ok(results)
    }

    /// endpoint -> endpoint config -> first production variant
    async fn enrich_endpoint(&self, region: &str, mut endpoint: SageMakerEndpoint) -> SageMakerEndpoint {
        let Some(desc) = self
            .lookup(&["sagemaker", "describe-endpoint", "--endpoint-name", &endpoint.name, "--region", region])
            .await
        else {
            return endpoint;
        };

        let config_name = desc
            .get("EndpointConfigName")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if config_name.is_empty() {
            return endpoint;
        }

        if let Some(config) = self
            .lookup(&["sagemaker", "describe-endpoint-config", "--endpoint-config-name", config_name, "--region", region])
            .await
        {
            if let Some(variant) = config.pointer("/ProductionVariants/0") {
                let variant: ProductionVariantRecord = parse_lenient(variant, "ProductionVariants");
                endpoint.model_name = variant.model_name;
                endpoint.instance_type = variant.instance_type;
                endpoint.instance_count = variant.initial_instance_count;
            }
        }
        endpoint
    }
}

/// AI view for `region`. Endpoints rebuilt from raw keys carry no model
/// or instance details.
pub fn load_ai(store: &CacheStore, region: &str) -> Result<AiData> {
    if let Some(data) = read_derived::<AiData>(store, &regional(region, "ai-enriched"))? {
        return Ok(data);
    }

    let raw = |service: &str| store.read(&regional(region, service));
    let mut data = AiData::default();
    if let Some(v) = raw("sagemaker-notebooks")? {
        data.sagemaker_notebooks = parse_into::<NotebookRecord, _>(&v, "NotebookInstances");
    }
    if let Some(v) = raw("sagemaker-endpoints")? {
        data.sagemaker_endpoints = parse_into::<EndpointRecord, _>(&v, "Endpoints");
    }
    if let Some(v) = raw("sagemaker-models")? {
        data.sagemaker_models = parse_into::<ModelRecord, _>(&v, "Models");
    }
    if let Some(v) = raw("bedrock-models")? {
        data.bedrock_models = parse_into::<FoundationModelRecord, _>(&v, "modelSummaries");
    }
    if let Some(v) = raw("bedrock-custom")? {
        data.bedrock_custom = parse_into::<CustomModelRecord, _>(&v, "modelSummaries");
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_name() {
        assert_eq!(role_name("arn:aws:iam::1:role/service-role/SageMakerRole"), "SageMakerRole");
        assert_eq!(role_name("not-an-arn"), "");
    }

    #[test]
    fn test_parse_notebooks() {
        let data = json!({"NotebookInstances": [{
            "NotebookInstanceName": "research",
            "NotebookInstanceStatus": "InService",
            "InstanceType": "ml.t3.medium",
            "CreationTime": "2024-05-01T10:20:30.456000+00:00",
            "RoleArn": "arn:aws:iam::1:role/SageMakerRole",
            "VolumeSizeInGB": 20
        }]});
        let notebooks: Vec<NotebookInstance> = parse_into::<NotebookRecord, _>(&data, "NotebookInstances");
        assert_eq!(notebooks[0].name, "research");
        assert_eq!(notebooks[0].role_name, "SageMakerRole");
        assert_eq!(notebooks[0].volume_size_gb, 20);
        assert_eq!(notebooks[0].creation_time, "2024-05-01 10:20");
    }

    #[test]
    fn test_parse_bedrock_camel_case() {
        let data = json!({"modelSummaries": [{
            "modelId": "anthropic.claude-v2",
            "modelName": "Claude",
            "providerName": "Anthropic",
            "inputModalities": ["TEXT"],
            "outputModalities": ["TEXT"],
            "responseStreamingSupported": true
        }]});
        let models: Vec<FoundationModel> = parse_into::<FoundationModelRecord, _>(&data, "modelSummaries");
        assert_eq!(models[0].provider, "Anthropic");
        assert_eq!(models[0].input_modes, vec!["TEXT"]);
        assert!(models[0].streaming);

        let custom = json!({"modelSummaries": [{"modelName": "tuned", "baseModelIdentifier": "base", "creationTime": "2024-01-01T00:00:00Z"}]});
        let models: Vec<CustomModel> = parse_into::<CustomModelRecord, _>(&custom, "modelSummaries");
        assert_eq!(models[0].base_model_id, "base");
        assert_eq!(models[0].creation_time, "2024-01-01 00:00");
    }

    #[test]
    fn test_container_keys_are_camel_case() {
        let json = serde_json::to_value(AiData::default()).unwrap();
        assert!(json.get("sagemakerNotebooks").is_some());
        assert!(json.get("bedrockCustom").is_some());
    }

    #[test]
    fn test_load_from_raw_keys() {
        let store = CacheStore::open_in_memory().unwrap();
        store
            .write("us-west-2:sagemaker-endpoints", &json!({"Endpoints": [{"EndpointName": "churn", "EndpointStatus": "InService"}]}))
            .unwrap();
        let data = load_ai(&store, "us-west-2").unwrap();
        assert_eq!(data.sagemaker_endpoints.len(), 1);
        assert_eq!(data.sagemaker_endpoints[0].model_name, "");
    }
}
