//! Frame parser for live channel messages
//!
//! Malformed or unknown frames are logged and dropped; they never close the
//! channel.

use super::InboundEvent;
use tracing::{trace, warn};

/// Parse one text frame from the live channel
///
/// Returns None for anything that is not a known event.
pub fn parse_frame(msg: &str) -> Option<InboundEvent> {
    trace!(len = msg.len(), "Parsing frame");

    serde_json::from_str::<InboundEvent>(msg)
        .map_err(|e| {
            warn!(error = %e, frame = msg, "Dropping malformed frame");
        })
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gift_announcement() {
        let msg = r#"{
            "type": "gift_announcement",
            "from_nickname": "table one",
            "to_nickname": "table four",
            "amount": 23000
        }"#;

        let event = parse_frame(msg).expect("should parse");
        assert_eq!(event.kind(), "gift_announcement");
    }

    #[test]
    fn test_malformed_frames_dropped() {
        for msg in ["", "not json", "{", "[]", "42", r#"{"type":"chat_message"}"#, r#"{"message":"x"}"#] {
            assert!(parse_frame(msg).is_none(), "frame {:?} should be dropped", msg);
        }
    }
}
