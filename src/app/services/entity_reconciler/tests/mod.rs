//! Shared test utilities for entity reconciler tests

use crate::app::adapters::http::HttpResponse;
use crate::app::adapters::http::testing::ScriptedTransport;
use crate::app::models::RemoteRef;
use crate::app::services::entity_reconciler::EntityReconciler;
use serde_json::{Map, Value, json};
use std::sync::Arc;

pub mod reconcile_tests;

pub const BASE_URL: &str = "http://sta.example/v1.1";

/// Reconciler over a fresh scripted transport
pub fn create_reconciler() -> (Arc<ScriptedTransport>, EntityReconciler) {
    let transport = Arc::new(ScriptedTransport::new());
    let reconciler = EntityReconciler::new(transport.clone(), BASE_URL);
    (transport, reconciler)
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}

/// Filtered-read answer listing `records`
pub fn query_response(records: Vec<Value>) -> HttpResponse {
    let count = records.len();
    HttpResponse::new(200).with_json(&json!({"value": records, "@iot.count": count}))
}

/// Remote record with identifiers
pub fn remote_record(collection: &str, id: i64, fields: Value) -> Value {
    let mut record = object(fields);
    record.insert("@iot.id".to_string(), json!(id));
    record.insert(
        "@iot.selfLink".to_string(),
        json!(format!("{}/{}({})", BASE_URL, collection, id)),
    );
    Value::Object(record)
}

pub fn thing_ref(id: i64) -> RemoteRef {
    RemoteRef {
        id: json!(id),
        self_link: format!("{}/Things({})", BASE_URL, id),
    }
}
