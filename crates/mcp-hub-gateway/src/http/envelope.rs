//! Success envelope: any JSON object plus a `timestamp` (spec §6).

use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

pub fn ok<T: Serialize>(data: T) -> Json<Value> {
    let mut value = serde_json::to_value(data).unwrap_or(Value::Null);
    match value {
        Value::Object(ref mut map) => {
            map.insert("timestamp".to_string(), json!(Utc::now()));
        }
        _ => {
            value = json!({ "data": value, "timestamp": Utc::now() });
        }
    }
    Json(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_payload_gets_timestamp_merged_in() {
        let Json(value) = ok(json!({ "server_name": "github", "started": true }));
        assert_eq!(value["server_name"], "github");
        assert_eq!(value["started"], true);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn non_object_payload_is_wrapped() {
        let Json(value) = ok(vec!["a", "b"]);
        assert_eq!(value["data"], json!(["a", "b"]));
        assert!(value["timestamp"].is_string());
    }
}
