use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::WsCodec;
use crate::core::types::{Control, Envelope, Frame};
use tokio_tungstenite::tungstenite::Message;

/// Spiral WebSocket codec: JSON text frames shaped `{event, data}`
#[derive(Debug, Clone, Copy, Default)]
pub struct SpiralCodec;

impl SpiralCodec {
    pub const fn new() -> Self {
        Self
    }

    fn classify(envelope: Envelope) -> Frame {
        match envelope.event.as_str() {
            "connected" => Frame::Control(Control::Connected(envelope.data)),
            "authenticated" => Frame::Control(Control::Authenticated(envelope.data)),
            "pong" => Frame::Control(Control::Pong(envelope.data)),
            _ => Frame::Data(envelope),
        }
    }
}

impl WsCodec for SpiralCodec {
    fn encode_envelope(&self, envelope: &Envelope) -> Result<Message, ExchangeError> {
        let text = serde_json::to_string(envelope).map_err(|e| {
            ExchangeError::SerializationError(format!("Failed to encode envelope: {}", e))
        })?;
        Ok(Message::Text(text))
    }

    fn decode_message(&self, message: Message) -> Result<Option<Frame>, ExchangeError> {
        let envelope: Envelope = match message {
            Message::Text(text) => serde_json::from_str(&text),
            Message::Binary(data) => serde_json::from_slice(&data),
            _ => return Ok(None),
        }
        .map_err(|e| ExchangeError::DeserializationError(format!("Failed to parse frame: {}", e)))?;

        Ok(Some(Self::classify(envelope)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(text: &str) -> Result<Option<Frame>, ExchangeError> {
        SpiralCodec.decode_message(Message::Text(text.to_string()))
    }

    #[test]
    fn test_control_frames() {
        assert_eq!(
            decode(r#"{"event":"connected","data":{"session":"abc"}}"#).unwrap(),
            Some(Frame::Control(Control::Connected(json!({"session": "abc"}))))
        );
        assert_eq!(
            decode(r#"{"event":"authenticated"}"#).unwrap(),
            Some(Frame::Control(Control::Authenticated(serde_json::Value::Null)))
        );
        assert_eq!(
            decode(r#"{"event":"pong","data":1700000000000}"#).unwrap(),
            Some(Frame::Control(Control::Pong(json!(1_700_000_000_000_i64))))
        );
    }

    #[test]
    fn test_data_frames_pass_through() {
        let frame = decode(r#"{"event":"orderbook","data":{"symbol":"ETHUSDT","bids":[]}}"#)
            .unwrap()
            .unwrap();
        match frame {
            Frame::Data(envelope) => {
                assert_eq!(envelope.event, "orderbook");
                assert_eq!(envelope.data["symbol"], "ETHUSDT");
                assert_eq!(envelope.channel(), None);
            }
            Frame::Control(other) => panic!("unexpected control frame {:?}", other),
        }
    }

    #[test]
    fn test_binary_json_accepted() {
        let frame = SpiralCodec
            .decode_message(Message::Binary(br#"{"event":"trade","data":[]}"#.to_vec()))
            .unwrap();
        assert!(matches!(frame, Some(Frame::Data(ref e)) if e.event == "trade"));
    }

    #[test]
    fn test_malformed_frames_rejected() {
        assert!(matches!(
            decode("not json"),
            Err(ExchangeError::DeserializationError(_))
        ));
        assert!(matches!(
            decode(r#"{"data":1}"#),
            Err(ExchangeError::DeserializationError(_))
        ));
    }

    #[test]
    fn test_encode_ping() {
        let message = SpiralCodec.encode_envelope(&Envelope::ping(42)).unwrap();
        assert_eq!(message, Message::Text(r#"{"event":"ping","data":42}"#.to_string()));
    }
}
