/*
[INPUT]:  User data stream REST payloads
[OUTPUT]: Typed Rust response structs with serialization support
[POS]:    Data layer - listen key endpoint responses
[UPDATE]: When the listen key endpoints change shape
*/

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenKeyResponse {
    #[serde(rename = "listenKey")]
    pub listen_key: String,
}
