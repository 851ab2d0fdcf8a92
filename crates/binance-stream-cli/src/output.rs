/*
[INPUT]:  Stream label + any serializable event
[OUTPUT]: One JSON line per event
[POS]:    Output layer - stdout rendering
[UPDATE]: When the printed line format changes
*/

use serde::Serialize;
use serde_json::json;

/// Render `{"source": ..., "event": ...}` on a single line
pub fn event_line<E: Serialize>(source: &str, event: &E) -> serde_json::Result<String> {
    serde_json::to_string(&json!({
        "source": source,
        "event": serde_json::to_value(event)?,
    }))
}
