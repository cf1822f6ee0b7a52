use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name and id of heartbeat frames.
pub const HEARTBEAT: &str = "heartbeat";

/// A JSON text frame: `{"id": ..., "name": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketFrame {
    /// Peers may omit the id; it then deserializes as empty.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

impl SocketFrame {
    pub fn new(id: impl Into<String>, name: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data,
        }
    }

    /// The keep-alive frame carrying `message` as opaque data.
    pub fn heartbeat(message: impl Into<String>) -> Self {
        Self::new(HEARTBEAT, HEARTBEAT, Value::String(message.into()))
    }

    pub fn is_heartbeat(&self) -> bool {
        self.name == HEARTBEAT
    }

    /// # Errors
    ///
    /// Returns the `serde_json` error if `data` cannot be serialized.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// # Errors
    ///
    /// Returns the `serde_json` error if `text` is not a frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
