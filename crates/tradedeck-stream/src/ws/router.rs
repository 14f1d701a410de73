/*
[INPUT]:  Raw inbound text frames (enveloped or bare)
[OUTPUT]: (StreamId, MarketEvent) pairs ready for dispatch, or a drop reason
[POS]:    WebSocket layer - demultiplexing of the shared socket
[UPDATE]: When adding event markers or changing stream inference
*/

use serde_json::Value;

use super::message::{Frame, StreamMessage};
use crate::stream_id::{FeedKind, StreamId};
use crate::types::MarketEvent;
use crate::types::events::feed_kind_for_marker;

/// Outcome of routing one text frame.
#[derive(Debug)]
pub enum Route {
    Routed(StreamMessage),
    /// Valid JSON with no envelope and no recognizable event marker.
    Unroutable(Value),
    Malformed(serde_json::Error),
}

/// Parse, classify and resolve one text frame.
pub fn route_text(text: &str) -> Route {
    match Frame::parse(text) {
        Ok(frame) => route_frame(frame),
        Err(err) => Route::Malformed(err),
    }
}

pub fn route_frame(frame: Frame) -> Route {
    let Some(stream) = frame.stream.or_else(|| infer_stream(&frame.payload)) else {
        return Route::Unroutable(frame.payload);
    };

    // A marked payload whose body fails to decode still routes, as `Unknown`.
    let event = MarketEvent::decode(&frame.payload, stream.kind());
    Route::Routed(StreamMessage { stream, event })
}

/// Stream a frame belongs to: the envelope's `stream` verbatim, else inferred
/// from the payload's event marker.
pub fn resolve(frame: &Frame) -> Option<StreamId> {
    match &frame.stream {
        Some(stream) => Some(stream.clone()),
        None => infer_stream(&frame.payload),
    }
}

/// Rebuild the canonical id of a bare single-stream payload from its `e`, `s`
/// and (for klines) `k.i` fields alone.
pub fn infer_stream(payload: &Value) -> Option<StreamId> {
    let kind = payload
        .get("e")
        .and_then(Value::as_str)
        .and_then(feed_kind_for_marker)?;
    let symbol = non_empty_str(payload.get("s"))?;

    match kind {
        FeedKind::Trade => Some(StreamId::trade(symbol)),
        FeedKind::AggTrade => Some(StreamId::agg_trade(symbol)),
        FeedKind::Ticker => Some(StreamId::ticker(symbol)),
        FeedKind::DiffDepth => Some(StreamId::diff_depth(symbol)),
        FeedKind::Kline => {
            let interval = non_empty_str(payload.pointer("/k/i"))?;
            Some(StreamId::kline(symbol, interval))
        }
        FeedKind::Depth => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|text| !text.is_empty())
}
