/*
[INPUT]:  Raw WebSocket text frames
[OUTPUT]: Frame (envelope-normalized) and StreamMessage (routed, decoded) structs
[POS]:    WebSocket layer - message shapes shared by router, registry and callbacks
[UPDATE]: When the envelope format or callback payload changes
*/

use serde_json::Value;

use crate::stream_id::StreamId;
use crate::types::MarketEvent;

/// A parsed inbound frame before routing.
///
/// Combined-stream sessions wrap every payload as `{"stream": ..., "data": ...}`;
/// single-stream sessions send the payload bare.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub stream: Option<StreamId>,
    pub payload: Value,
}

impl Frame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map)
                if map.get("stream").is_some_and(Value::is_string) && map.contains_key("data") =>
            {
                let stream = map
                    .remove("stream")
                    .and_then(|stream| stream.as_str().map(StreamId::new));
                let payload = map.remove("data").unwrap_or(Value::Null);
                Self { stream, payload }
            }
            other => Self {
                stream: None,
                payload: other,
            },
        }
    }

    pub fn is_enveloped(&self) -> bool {
        self.stream.is_some()
    }
}

/// Decoded payload delivered to subscription callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMessage {
    pub stream: StreamId,
    pub event: MarketEvent,
}
