#![forbid(unsafe_code)]

use serde::Serialize;

/// `JSON.stringify(v, null, 4)` equivalent. Bodies that are not JSON come back unchanged.
pub fn pretty_json(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(v) => pretty_value(&v).unwrap_or_else(|| body.to_string()),
        Err(_) => body.to_string(),
    }
}

fn pretty_value(v: &serde_json::Value) -> Option<String> {
    let mut buf = Vec::new();
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
    v.serialize(&mut ser).ok()?;
    String::from_utf8(buf).ok()
}

/// Error document shown when no HTTP response was received.
pub fn transport_error(message: &str) -> String {
    let v = serde_json::json!({ "status": 0, "details": message });
    pretty_value(&v).unwrap_or_else(|| message.to_string())
}
