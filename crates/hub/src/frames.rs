use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every frame on the wire is JSON of shape `{type, payload}` (spec.md §6).
/// Generalizes the teacher's typed-event + `emit_*` pairing
/// (`contracts/marketplace_settlement/src/events.rs`) from chain events to
/// serde-serializable WebSocket payloads.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerFrame {
    BroadcastNewBid(BroadcastNewBid),
    OutbidAlert(OutbidAlert),
    ChatMessage(ChatMessagePayload),
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastNewBid {
    pub auction_id: Uuid,
    pub amount: Decimal,
    pub bidder_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutbidAlert {
    pub auction_id: Uuid,
    pub your_bid: Decimal,
    pub new_high_bid: Decimal,
    pub new_bidder: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessagePayload {
    pub id: Uuid,
    pub room_id: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Duck-typed inbound frames (spec.md §9): distinguished by `type` and the
/// presence of payload fields. Unknown variants are discarded rather than
/// failing the connection, via `#[serde(other)]`-style permissive decoding
/// at the call site (see `parse_client_frame`).
#[derive(Debug, Clone, Deserialize)]
pub struct RawClientFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSendPayload {
    pub body: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ClientFrame {
    ChatSend(ChatSendPayload),
    Unknown,
}

/// Parses a raw inbound text frame, discarding anything malformed or of an
/// unrecognized type rather than closing the connection.
pub fn parse_client_frame(text: &str) -> ClientFrame {
    let Ok(raw) = serde_json::from_str::<RawClientFrame>(text) else {
        return ClientFrame::Unknown;
    };
    match raw.frame_type.as_str() {
        "chat_send" => match serde_json::from_value::<ChatSendPayload>(raw.payload) {
            Ok(payload) => ClientFrame::ChatSend(payload),
            Err(_) => ClientFrame::Unknown,
        },
        _ => ClientFrame::Unknown,
    }
}
