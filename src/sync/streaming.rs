//! Queues and streaming: SQS, SNS, Kinesis, EventBridge.
//!
//! All four land in one derived collection per region.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::{
    count_items, format_time, format_time_text, parse_lenient, parse_list, read_derived, step, string_list, OnStep, SyncResult,
    Syncer,
};
use crate::cache::{regional, CacheStore};
use crate::policy::{self, PolicyStatement};

const FIFO_SUFFIX: &str = ".fifo";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SqsQueue {
    pub queue_name: String,
    pub queue_url: String,
    pub arn: String,
    pub approximate_messages: String,
    pub approximate_messages_not_visible: String,
    pub visibility_timeout: String,
    pub max_message_size: String,
    pub message_retention: String,
    pub created_timestamp: String,
    pub delay_seconds: String,
    #[serde(rename = "IsFIFO")]
    pub is_fifo: bool,
    pub redrive_policy: String,
    pub policies: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SnsTopic {
    pub topic_arn: String,
    pub name: String,
    pub display_name: String,
    pub subscriptions: usize,
    pub policies: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct KinesisStream {
    pub stream_name: String,
    #[serde(rename = "StreamARN")]
    pub stream_arn: String,
    pub stream_status: String,
    pub stream_mode: String,
    pub shard_count: i64,
    #[serde(rename = "RetentionPeriodHours")]
    pub retention: i64,
    #[serde(rename = "EncryptionType")]
    pub encryption: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EventBridgeRule {
    pub name: String,
    pub state: String,
    pub description: String,
    #[serde(rename = "ScheduleExpression")]
    pub schedule: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EventBus {
    pub name: String,
    pub arn: String,
    pub rules: Vec<EventBridgeRule>,
}

/// Streaming view for one region
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingData {
    pub sqs: Vec<SqsQueue>,
    pub sns: Vec<SnsTopic>,
    pub kinesis: Vec<KinesisStream>,
    pub eventbridge: Vec<EventBus>,
}

/// FIFO queues are marked by a case-sensitive `.fifo` name suffix
pub fn is_fifo_queue(name: &str) -> bool {
    name.ends_with(FIFO_SUFFIX)
}

impl SqsQueue {
    fn from_url(url: String) -> Self {
        let queue_name = url.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            is_fifo: is_fifo_queue(&queue_name),
            queue_name,
            queue_url: url,
            ..Default::default()
        }
    }

    fn apply_attributes(&mut self, mut attrs: HashMap<String, String>) {
        let mut take = |name: &str| attrs.remove(name).unwrap_or_default();
        self.arn = take("QueueArn");
        self.approximate_messages = take("ApproximateNumberOfMessages");
        self.approximate_messages_not_visible = take("ApproximateNumberOfMessagesNotVisible");
        self.visibility_timeout = take("VisibilityTimeoutSeconds");
        self.max_message_size = take("MaximumMessageSize");
        self.message_retention = take("MessageRetentionPeriod");
        self.delay_seconds = take("DelaySeconds");
        self.redrive_policy = take("RedrivePolicy");
        self.created_timestamp = format_time_text(&take("CreatedTimestamp"));
        self.policies = policy::normalize(&take("Policy"));
    }
}

impl SnsTopic {
    fn from_arn(topic_arn: String) -> Self {
        Self {
            name: topic_arn.rsplit(':').next().unwrap_or_default().to_string(),
            topic_arn,
            ..Default::default()
        }
    }
}

// --- wire shapes ----------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct Attributes {
    attributes: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct TopicRef {
    topic_arn: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct StreamModeRecord {
    stream_mode: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct StreamSummaryRecord {
    stream_name: String,
    #[serde(rename = "StreamARN")]
    stream_arn: String,
    stream_status: String,
    stream_mode_details: StreamModeRecord,
    stream_creation_timestamp: Value,
}

impl From<StreamSummaryRecord> for KinesisStream {
    fn from(r: StreamSummaryRecord) -> Self {
        Self {
            stream_name: r.stream_name,
            stream_arn: r.stream_arn,
            stream_status: r.stream_status,
            stream_mode: r.stream_mode_details.stream_mode,
            created_at: format_time(&r.stream_creation_timestamp),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct StreamDescriptionRecord {
    open_shard_count: i64,
    retention_period_hours: i64,
    encryption_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct EventBusRecord {
    name: String,
    arn: String,
}

fn parse_queues(data: &Value) -> Vec<SqsQueue> {
    string_list(data, "QueueUrls")
        .into_iter()
        .map(SqsQueue::from_url)
        .collect()
}

fn parse_topics(data: &Value) -> Vec<SnsTopic> {
    parse_list::<TopicRef>(data, "Topics")
        .into_iter()
        .map(|t| SnsTopic::from_arn(t.topic_arn))
        .collect()
}

fn parse_streams(data: &Value) -> Vec<KinesisStream> {
    parse_list::<StreamSummaryRecord>(data, "StreamSummaries")
        .into_iter()
        .map(KinesisStream::from)
        .collect()
}

fn parse_buses(data: &Value) -> Vec<EventBus> {
    parse_list::<EventBusRecord>(data, "EventBuses")
        .into_iter()
        .map(|b| EventBus {
            name: b.name,
            arn: b.arn,
            rules: Vec::new(),
        })
        .collect()
}

impl Syncer {
    pub async fn sync_streaming(&self, region: &str, on_step: OnStep<'_>) -> Result<Vec<SyncResult>> {
        let mut results = Vec::with_capacity(4);
        let mut data = StreamingData::default();

        let (result, raw) = self
            .sync_raw("sqs", &regional(region, "sqs"), &["sqs", "list-queues", "--region", region], "QueueUrls")
            .await;
        results.push(result);
        if let Some(raw) = raw {
            data.sqs = self
                .enrich(parse_queues(&raw), |queue| self.enrich_queue(region, queue))
                .await;
        }
        step(on_step, "sqs");

        let (result, raw) = self
            .sync_raw("sns", &regional(region, "sns"), &["sns", "list-topics", "--region", region], "Topics")
            .await;
        results.push(result);
        if let Some(raw) = raw {
            data.sns = self
                .enrich(parse_topics(&raw), |topic| self.enrich_topic(region, topic))
                .await;
        }
        step(on_step, "sns");

        let (result, raw) = self
            .sync_raw("kinesis", &regional(region, "kinesis"), &["kinesis", "list-streams", "--region", region], "StreamSummaries")
            .await;
        results.push(result);
        if let Some(raw) = raw {
            data.kinesis = self
                .enrich(parse_streams(&raw), |stream| self.enrich_stream(region, stream))
                .await;
        }
        step(on_step, "kinesis");

        let (result, raw) = self
            .sync_raw("eventbridge", &regional(region, "eventbridge"), &["events", "list-event-buses", "--region", region], "EventBuses")
            .await;
        results.push(result);
        if let Some(raw) = raw {
            data.eventbridge = self
                .enrich(parse_buses(&raw), |mut bus| async move {
                    if let Some(rules) = self
                        .lookup(&["events", "list-rules", "--event-bus-name", &bus.name, "--region", region])
                        .await
                    {
                        bus.rules = parse_list(&rules, "Rules");
                    }
                    bus
                })
                .await;
        }
        step(on_step, "eventbridge");

        self.store_derived(&regional(region, "streaming-enriched"), &data, &mut results);
        Ok(results)
    }

    async fn enrich_queue(&self, region: &str, mut queue: SqsQueue) -> SqsQueue {
        if let Some(data) = self
            .lookup(&[
                "sqs",
                "get-queue-attributes",
                "--queue-url",
                &queue.queue_url,
                "--attribute-names",
                "All",
                "--region",
                region,
            ])
            .await
        {
            let attrs: Attributes = parse_lenient(&data, "queue attributes");
            queue.apply_attributes(attrs.attributes);
        }
        queue
    }

    async fn enrich_topic(&self, region: &str, mut topic: SnsTopic) -> SnsTopic {
        if let Some(data) = self
            .lookup(&["sns", "get-topic-attributes", "--topic-arn", &topic.topic_arn, "--region", region])
            .await
        {
            let mut attrs: Attributes = parse_lenient(&data, "topic attributes");
            topic.display_name = attrs.attributes.remove("DisplayName").unwrap_or_default();
            topic.policies = policy::normalize(&attrs.attributes.remove("Policy").unwrap_or_default());
        }

        if let Some(data) = self
            .lookup(&["sns", "list-subscriptions-by-topic", "--topic-arn", &topic.topic_arn, "--region", region])
            .await
        {
            topic.subscriptions = count_items(&data, "Subscriptions");
        }
        topic
    }

    async fn enrich_stream(&self, region: &str, mut stream: KinesisStream) -> KinesisStream {
        if let Some(data) = self
            .lookup(&["kinesis", "describe-stream-summary", "--stream-name", &stream.stream_name, "--region", region])
            .await
        {
            let desc: StreamDescriptionRecord = parse_lenient(
                data.get("StreamDescriptionSummary").unwrap_or(&Value::Null),
                "StreamDescriptionSummary",
            );
            stream.shard_count = desc.open_shard_count;
            stream.retention = desc.retention_period_hours;
            stream.encryption = desc.encryption_type;
        }
        stream
    }
}

/// Streaming view for `region`. Without an enriched collection the raw
/// listings give names only.
pub fn load_streaming(store: &CacheStore, region: &str) -> Result<StreamingData> {
    if let Some(data) = read_derived::<StreamingData>(store, &regional(region, "streaming-enriched"))? {
        return Ok(data);
    }

    let mut data = StreamingData::default();
    if let Some(raw) = store.read(&regional(region, "sqs"))? {
        data.sqs = parse_queues(&raw);
    }
    if let Some(raw) = store.read(&regional(region, "sns"))? {
        data.sns = parse_topics(&raw);
    }
    if let Some(raw) = store.read(&regional(region, "kinesis"))? {
        data.kinesis = parse_streams(&raw);
    }
    if let Some(raw) = store.read(&regional(region, "eventbridge"))? {
        data.eventbridge = parse_buses(&raw);
    }
    Ok(data)
}
