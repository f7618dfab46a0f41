//! WebSocket frames
//!
//! Every frame is a JSON text message tagged by `type`.

use axum::extract::ws::Message;
use contracts::{
    AlertSubscription, Batch, CloseReason, CollabMessage, Event, IngestResult, Snapshot,
    Subscription,
};
use serde::{Deserialize, Serialize};

/// Client -> server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// One ingestion batch
    Batch(Batch),
    /// Client finished sending
    End,
    /// Snapshot subscription request
    Subscribe(Subscription),
    /// Alert subscription request
    SubscribeAlerts(AlertSubscription),
    /// Session message
    Message(CollabMessage),
}

impl ClientFrame {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Batch(_) => "batch",
            Self::End => "end",
            Self::Subscribe(_) => "subscribe",
            Self::SubscribeAlerts(_) => "subscribe_alerts",
            Self::Message(_) => "message",
        }
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Server -> client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Result(IngestResult),
    Snapshot(Snapshot),
    Event(Event),
    Message(CollabMessage),
    /// Stream ended
    End { reason: CloseReason },
    /// Frame-level error; the stream stays open unless an `end` follows
    Error { message: String },
}

impl ServerFrame {
    pub fn end(reason: CloseReason) -> Self {
        Self::End { reason }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Encode as a WebSocket text message
    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(Message::Text(json.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SampleValue, Severity};

    #[test]
    fn test_parse_batch_frame() {
        let frame = ClientFrame::parse(
            r#"{"type":"batch","batch_id":"b1","records":[
                {"id":"r1","metric_name":"cpu","value":0.5,"timestamp":"2026-01-01T00:00:00Z"}
            ]}"#,
        )
        .unwrap();

        let ClientFrame::Batch(batch) = frame else {
            panic!("expected batch frame");
        };
        assert_eq!(batch.batch_id, "b1");
        assert_eq!(batch.records[0].value, SampleValue::from(0.5));
    }

    #[test]
    fn test_parse_control_frames() {
        assert_eq!(ClientFrame::parse(r#"{"type":"end"}"#).unwrap(), ClientFrame::End);

        let frame = ClientFrame::parse(
            r#"{"type":"subscribe","metric_names":["cpu"],"cadence_ms":0}"#,
        )
        .unwrap();
        assert_eq!(frame, ClientFrame::Subscribe(Subscription::for_metrics(["cpu"], 0)));

        let frame =
            ClientFrame::parse(r#"{"type":"subscribe_alerts","severities":["critical"]}"#).unwrap();
        let ClientFrame::SubscribeAlerts(filter) = frame else {
            panic!("expected alert subscription");
        };
        assert!(filter.severities.contains(&Severity::Critical));
        assert!(filter.sources.is_empty());
    }

    #[test]
    fn test_unknown_frame_is_error() {
        assert!(ClientFrame::parse(r#"{"type":"nope"}"#).is_err());
        assert!(ClientFrame::parse("not json").is_err());
    }

    #[test]
    fn test_end_frame_wire_format() {
        let json = serde_json::to_value(ServerFrame::end(CloseReason::Shutdown)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "end", "reason": {"kind": "shutdown"}})
        );

        let json = serde_json::to_value(ServerFrame::error("bad frame")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "error", "message": "bad frame"}));
    }
}
