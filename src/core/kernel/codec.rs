use crate::core::errors::ExchangeError;
use crate::core::types::{Envelope, Frame};
use tokio_tungstenite::tungstenite::Message;

/// Codec trait for exchange-specific WebSocket message encoding/decoding
///
/// The codec is the single place where wire text becomes a typed [`Frame`];
/// nothing downstream matches on event strings.
pub trait WsCodec: Send + Sync + 'static {
    /// Encode an outbound envelope into a WebSocket message
    fn encode_envelope(&self, envelope: &Envelope) -> Result<Message, ExchangeError>;

    /// Decode a raw WebSocket data message
    ///
    /// Control messages (ping, pong, close) are handled at the transport level
    /// and never reach the codec.
    ///
    /// # Returns
    /// - `Ok(Some(frame))` - Successfully decoded frame
    /// - `Ok(None)` - Message was ignored by the codec
    /// - `Err(error)` - Malformed message
    fn decode_message(&self, message: Message) -> Result<Option<Frame>, ExchangeError>;
}
