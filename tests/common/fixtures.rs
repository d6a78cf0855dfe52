use chrono::{DateTime, Utc};
use serde_json::{json, Value};

pub fn frames() -> Value {
    json!([
        {"file": "gems/rack/handler.rb", "line": 12, "function": "call", "inApp": false},
        {"file": "app/controllers/orders_controller.rb", "line": 55, "function": "show", "inApp": true},
        {"file": "app/models/order.rb", "line": 42, "function": "total", "inApp": true}
    ])
}

pub fn error_item(project: &str, kind: &str, call_path: &str) -> Value {
    json!({
        "type": "error",
        "project": project,
        "kind": kind,
        "message": "undefined method `total` for nil",
        "frames": frames(),
        "callPath": call_path,
        "occurredAt": Utc::now().to_rfc3339(),
    })
}

pub fn perf_item(project: &str, target: &str, duration_ms: f64, at: DateTime<Utc>) -> Value {
    json!({
        "type": "performance",
        "project": project,
        "target": target,
        "durationMs": duration_ms,
        "error": false,
        "occurredAt": at.to_rfc3339(),
    })
}

pub fn repeated_queries(normalized: &str, count: usize, duration_ms: f64) -> Value {
    let queries: Vec<Value> = (0..count)
        .map(|_| json!({"normalized": normalized, "durationMs": duration_ms}))
        .collect();
    Value::Array(queries)
}
