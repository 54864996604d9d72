//! Bucket policy documents and the guard-statement editor
//!
//! The document model only types the fields the editor needs; everything else in a
//! statement or at the top level (`Condition`, `NotPrincipal`, vendor keys, ...) is
//! carried through verbatim so a rewrite never drops another team's access rules.

pub mod editor;

pub use editor::{
    bucket_objects_arn, guard_statement, insert_guard, remove_guard, GuardChange, NoGuardPresent,
    GUARD_ACTION, GUARD_SID, POLICY_VERSION,
};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// A policy field that may be written as a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "Sid", default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(rename = "Effect")]
    pub effect: Effect,
    #[serde(rename = "Principal", default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Value>,
    #[serde(rename = "Action", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<OneOrMany>,
    #[serde(rename = "Resource", default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<OneOrMany>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Statement {
    pub fn is_guard(&self) -> bool {
        self.sid.as_deref() == Some(GUARD_SID)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Statement", deserialize_with = "one_or_many_statements")]
    pub statement: Vec<Statement>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatementList {
    Many(Vec<Statement>),
    One(Box<Statement>),
}

/// The policy grammar allows `Statement` to be a bare object instead of a list.
fn one_or_many_statements<'de, D>(deserializer: D) -> Result<Vec<Statement>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match StatementList::deserialize(deserializer)? {
        StatementList::Many(statements) => statements,
        StatementList::One(statement) => vec![*statement],
    })
}

impl PolicyDocument {
    /// Fresh document at the current policy language version.
    pub fn new(statement: Vec<Statement>) -> Self {
        Self {
            version: Some(POLICY_VERSION.to_string()),
            id: None,
            statement,
            extra: Map::new(),
        }
    }

    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn guard_count(&self) -> usize {
        self.statement.iter().filter(|s| s.is_guard()).count()
    }

    pub fn has_guard(&self) -> bool {
        self.statement.iter().any(Statement::is_guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_single_statement_object() {
        let doc = PolicyDocument::parse(
            r#"{"Version":"2012-10-17","Statement":{"Sid":"Only","Effect":"Allow","Principal":"*","Action":"s3:ListBucket","Resource":"arn:aws:s3:::b"}}"#,
        )
        .unwrap();
        assert_eq!(doc.statement.len(), 1);
        assert_eq!(doc.statement[0].sid.as_deref(), Some("Only"));
        assert_eq!(
            doc.statement[0].action,
            Some(OneOrMany::One("s3:ListBucket".to_string()))
        );
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let original = json!({
            "Version": "2012-10-17",
            "Id": "Policy1",
            "Owner": "platform-team",
            "Statement": [{
                "Sid": "VpcOnly",
                "Effect": "Deny",
                "Principal": {"AWS": ["arn:aws:iam::111122223333:root"]},
                "NotAction": "s3:ListBucket",
                "Resource": ["arn:aws:s3:::b", "arn:aws:s3:::b/*"],
                "Condition": {"StringNotEquals": {"aws:SourceVpc": "vpc-1"}}
            }]
        });

        let doc = PolicyDocument::parse(&original.to_string()).unwrap();
        assert_eq!(doc.extra.get("Owner"), Some(&json!("platform-team")));
        assert!(doc.statement[0].extra.contains_key("Condition"));
        assert!(doc.statement[0].extra.contains_key("NotAction"));

        let written: Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
        assert_eq!(written, original);
    }

    #[test]
    fn test_missing_version_is_not_invented() {
        let doc = PolicyDocument::parse(r#"{"Statement":[]}"#).unwrap();
        assert_eq!(doc.version, None);
        assert_eq!(doc.to_json().unwrap(), r#"{"Statement":[]}"#);
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        assert!(PolicyDocument::parse("not json").is_err());
        assert!(PolicyDocument::parse(r#"{"Version":"2012-10-17"}"#).is_err());
        assert!(PolicyDocument::parse(
            r#"{"Statement":[{"Sid":"x","Effect":"Maybe","Action":"s3:*"}]}"#
        )
        .is_err());
        assert!(PolicyDocument::parse(r#"["Statement"]"#).is_err());
    }
}
