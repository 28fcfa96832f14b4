//! Resource Policy Normalizer
//!
//! Resource policies (queue, topic, function, trust policies) put whatever
//! they like in `Principal` and `Action`: a bare string, an object such as
//! `{"AWS": "arn:..."}`, an object of arrays such as
//! `{"Service": ["lambda.amazonaws.com"]}`, or a plain array. This module
//! flattens every statement into a [`PolicyStatement`] with one string per
//! field.
//!
//! Unparseable documents produce an empty list; they are logged so schema
//! drift is visible, while a document that simply isn't there stays quiet.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A normalized policy statement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    #[serde(default)]
    pub sid: String,
    #[serde(default)]
    pub effect: String,
    #[serde(default)]
    pub principal: String,
    #[serde(default)]
    pub action: String,
}

/// The shapes `Principal` / `Action` take on the wire
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PolicyField {
    Scalar(String),
    List(Vec<Value>),
    Object(Map<String, Value>),
    Other(Value),
}

impl PolicyField {
    /// The single representative value of this field.
    ///
    /// Scalars are returned verbatim. For a list, its first element. For an
    /// object, walk the values in document order and take the first scalar,
    /// or the first element of the first non-empty array.
    pub fn first_value(&self) -> String {
        match self {
            Self::Scalar(s) => s.clone(),
            Self::List(items) => items.first().map(scalar_text).unwrap_or_default(),
            Self::Object(map) => map
                .values()
                .find_map(|v| match v {
                    Value::Array(items) => items.first().map(scalar_text),
                    Value::Object(_) | Value::Null => None,
                    other => Some(scalar_text(other)),
                })
                .unwrap_or_default(),
            Self::Other(v) => match v {
                Value::Null => String::new(),
                other => scalar_text(other),
            },
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawStatement {
    #[serde(default)]
    sid: Option<String>,
    #[serde(default)]
    effect: Option<String>,
    #[serde(default)]
    principal: Option<PolicyField>,
    #[serde(default)]
    action: Option<PolicyField>,
}

impl From<RawStatement> for PolicyStatement {
    fn from(raw: RawStatement) -> Self {
        Self {
            sid: raw.sid.unwrap_or_default(),
            effect: raw.effect.unwrap_or_default(),
            principal: raw.principal.map(|p| p.first_value()).unwrap_or_default(),
            action: raw.action.map(|a| a.first_value()).unwrap_or_default(),
        }
    }
}

/// Normalize a policy document given as JSON text
pub fn normalize(document: &str) -> Vec<PolicyStatement> {
    let document = document.trim();
    if document.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Value>(document) {
        Ok(value) => normalize_value(&value),
        Err(e) => {
            tracing::warn!("Ignoring malformed policy document: {}", e);
            Vec::new()
        },
    }
}

/// Normalize a policy document that is already parsed.
///
/// A JSON string is treated as an embedded document and parsed first.
pub fn normalize_value(document: &Value) -> Vec<PolicyStatement> {
    match document {
        Value::Null => Vec::new(),
        Value::String(text) => normalize(text),
        Value::Object(map) => match map.get("Statement") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(statements)) => statements.iter().filter_map(parse_statement).collect(),
            Some(single @ Value::Object(_)) => parse_statement(single).into_iter().collect(),
            Some(other) => {
                tracing::warn!("Ignoring policy with non-list Statement: {}", type_name(other));
                Vec::new()
            },
        },
        other => {
            tracing::warn!("Ignoring policy document of type {}", type_name(other));
            Vec::new()
        },
    }
}

fn parse_statement(value: &Value) -> Option<PolicyStatement> {
    match RawStatement::deserialize(value) {
        Ok(raw) => Some(raw.into()),
        Err(e) => {
            tracing::warn!("Skipping malformed policy statement: {}", e);
            None
        },
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_principal_and_action() {
        let doc = r#"{"Version":"2012-10-17","Statement":[{"Sid":"AllowAll","Effect":"Allow","Principal":"*","Action":"sqs:SendMessage"}]}"#;
        let statements = normalize(doc);
        assert_eq!(
            statements,
            vec![PolicyStatement {
                sid: "AllowAll".to_string(),
                effect: "Allow".to_string(),
                principal: "*".to_string(),
                action: "sqs:SendMessage".to_string(),
            }]
        );
    }

    #[test]
    fn test_object_principal_scalar_value() {
        let doc = json!({"Statement": [{"Effect": "Allow", "Principal": {"AWS": "arn:aws:iam::123456789012:root"}}]});
        let statements = normalize_value(&doc);
        assert_eq!(statements[0].principal, "arn:aws:iam::123456789012:root");
        assert_eq!(statements[0].sid, "");
        assert_eq!(statements[0].action, "");
    }

    #[test]
    fn test_object_of_arrays_takes_first_key_first_element() {
        let doc = r#"{"Statement":[{"Effect":"Allow","Principal":{"Service":["lambda.amazonaws.com","edgelambda.amazonaws.com"],"AWS":["arn:aws:iam::1:root"]},"Action":["sts:AssumeRole","sts:TagSession"]}]}"#;
        let statements = normalize(doc);
        assert_eq!(statements[0].principal, "lambda.amazonaws.com");
        assert_eq!(statements[0].action, "sts:AssumeRole");
    }

    #[test]
    fn test_object_skips_empty_arrays() {
        let field: PolicyField =
            serde_json::from_value(json!({"Federated": [], "Service": ["ec2.amazonaws.com"]})).unwrap();
        assert_eq!(field.first_value(), "ec2.amazonaws.com");
    }

    #[test]
    fn test_string_wrapped_document() {
        let inner = r#"{"Statement":[{"Effect":"Deny","Principal":"*","Action":"s3:*"}]}"#;
        let statements = normalize_value(&Value::String(inner.to_string()));
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].effect, "Deny");
    }

    #[test]
    fn test_single_statement_object() {
        let doc = json!({"Statement": {"Sid": "One", "Effect": "Allow", "Principal": "*", "Action": "sns:Publish"}});
        let statements = normalize_value(&doc);
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].sid, "One");
    }

    #[test]
    fn test_malformed_input_is_empty() {
        assert!(normalize("{not json").is_empty());
        assert!(normalize("").is_empty());
        assert!(normalize("[1,2,3]").is_empty());
        assert!(normalize_value(&json!({"Statement": 7})).is_empty());
    }

    #[test]
    fn test_bad_statement_does_not_drop_siblings() {
        let doc = json!({"Statement": [
            {"Sid": 42, "Effect": "Allow"},
            {"Sid": "Good", "Effect": "Allow", "Principal": "*", "Action": "lambda:InvokeFunction"}
        ]});
        let statements = normalize_value(&doc);
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].sid, "Good");
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(PolicyStatement::default()).unwrap();
        assert!(json.get("Sid").is_some());
        assert!(json.get("Principal").is_some());
    }
}
