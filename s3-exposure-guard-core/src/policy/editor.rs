//! Guard statement insertion and removal
//!
//! The guard is found by Sid, never by position: other statements keep their order and
//! content, and `Version` is left alone.

use super::{Effect, OneOrMany, PolicyDocument, Statement};
use serde_json::{Map, Value};
use thiserror::Error;

pub const GUARD_SID: &str = "RestrictGetObject";
pub const GUARD_ACTION: &str = "s3:GetObject";
pub const POLICY_VERSION: &str = "2012-10-17";

/// What `insert_guard` did to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardChange {
    Inserted,
    Replaced,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("no '{}' statement present", GUARD_SID)]
pub struct NoGuardPresent;

pub fn bucket_objects_arn(partition: &str, bucket: &str) -> String {
    format!("arn:{partition}:s3:::{bucket}/*")
}

/// Deny anonymous and authenticated `GetObject` on every object in the bucket.
pub fn guard_statement(partition: &str, bucket: &str) -> Statement {
    Statement {
        sid: Some(GUARD_SID.to_string()),
        effect: Effect::Deny,
        principal: Some(Value::String("*".to_string())),
        action: Some(OneOrMany::Many(vec![GUARD_ACTION.to_string()])),
        resource: Some(OneOrMany::One(bucket_objects_arn(partition, bucket))),
        extra: Map::new(),
    }
}

/// Upsert the guard by Sid.
///
/// An existing guard is replaced where it stands and any duplicates behind it are
/// dropped; otherwise the guard is prepended.
pub fn insert_guard(mut doc: PolicyDocument, guard: Statement) -> (PolicyDocument, GuardChange) {
    match doc.statement.iter().position(Statement::is_guard) {
        Some(first) => {
            doc.statement[first] = guard;
            let mut index = 0;
            doc.statement.retain(|statement| {
                let keep = index <= first || !statement.is_guard();
                index += 1;
                keep
            });
            (doc, GuardChange::Replaced)
        }
        None => {
            doc.statement.insert(0, guard);
            (doc, GuardChange::Inserted)
        }
    }
}

/// Remove every statement carrying the guard Sid.
pub fn remove_guard(mut doc: PolicyDocument) -> Result<PolicyDocument, NoGuardPresent> {
    if !doc.has_guard() {
        return Err(NoGuardPresent);
    }
    doc.statement.retain(|statement| !statement.is_guard());
    Ok(doc)
}
