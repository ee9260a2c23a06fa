use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Which of the two streaming connections a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Public,
    Private,
}

impl ChannelKind {
    /// Whether the channel needs the authenticate handshake after transport connect
    pub const fn requires_auth(self) -> bool {
        matches!(self, Self::Private)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a single streaming connection.
///
/// `Closing` is terminal and only reached through an explicit stop; every other
/// state cycles as the connection drops and reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingHandshake,
    Ready,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHandshake => "awaiting_handshake",
            Self::Ready => "ready",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// The `{event, data}` unit exchanged over the streaming channels.
///
/// Inbound envelopes remember which channel delivered them; that tag is not part
/// of the wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(skip)]
    channel: Option<ChannelKind>,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            channel: None,
        }
    }

    /// Heartbeat request carrying the current timestamp in milliseconds
    pub fn ping(timestamp_ms: i64) -> Self {
        Self::new("ping", Value::from(timestamp_ms))
    }

    /// Channel the envelope arrived on, `None` for locally built envelopes
    pub fn channel(&self) -> Option<ChannelKind> {
        self.channel
    }

    pub(crate) fn with_channel(mut self, channel: ChannelKind) -> Self {
        self.channel = Some(channel);
        self
    }
}

/// Control events the connection layer acts on itself
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Connected(Value),
    Authenticated(Value),
    Pong(Value),
}

impl Control {
    /// Envelope handed to the consumer, `None` for frames that stay inside the connection
    pub fn into_envelope(self) -> Option<Envelope> {
        match self {
            Self::Connected(data) => Some(Envelope::new("connected", data)),
            Self::Authenticated(data) => Some(Envelope::new("authenticated", data)),
            Self::Pong(_) => None,
        }
    }
}

/// A decoded inbound frame, classified once at the connection boundary
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Control(Control),
    Data(Envelope),
}

/// Streaming topics offered by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Ticker,
    Orderbook,
    Trade,
    Kline,
    Order,
    Account,
}

impl Topic {
    /// Channel that carries this topic
    pub const fn channel(self) -> ChannelKind {
        match self {
            Self::Ticker | Self::Orderbook | Self::Trade | Self::Kline => ChannelKind::Public,
            Self::Order | Self::Account => ChannelKind::Private,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Orderbook => "orderbook",
            Self::Trade => "trade",
            Self::Kline => "kline",
            Self::Order => "order",
            Self::Account => "account",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolParams {
    pub symbols: Vec<String>,
}

impl SymbolParams {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlineParams {
    pub symbols: Vec<String>,
    pub interval: String,
}

/// A subscription request: the topic plus its parameter record.
///
/// Serializes to the `data` payload of a `subscribe` envelope,
/// e.g. `{"topic":"orderbook","symbols":["ETHUSDT"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "lowercase")]
pub enum Subscription {
    Ticker(SymbolParams),
    Orderbook(SymbolParams),
    Trade(SymbolParams),
    Kline(KlineParams),
    Order(SymbolParams),
    Account,
}

impl Subscription {
    pub const fn topic(&self) -> Topic {
        match self {
            Self::Ticker(_) => Topic::Ticker,
            Self::Orderbook(_) => Topic::Orderbook,
            Self::Trade(_) => Topic::Trade,
            Self::Kline(_) => Topic::Kline,
            Self::Order(_) => Topic::Order,
            Self::Account => Topic::Account,
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        Ok(Envelope::new("subscribe", serde_json::to_value(self)?))
    }
}

/// Status code and decoded body of a REST call; non-2xx statuses are not errors
#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    pub status: u16,
    pub body: Value,
}

impl RestResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_topic_routing() {
        assert_eq!(Topic::Ticker.channel(), ChannelKind::Public);
        assert_eq!(Topic::Orderbook.channel(), ChannelKind::Public);
        assert_eq!(Topic::Trade.channel(), ChannelKind::Public);
        assert_eq!(Topic::Kline.channel(), ChannelKind::Public);
        assert_eq!(Topic::Order.channel(), ChannelKind::Private);
        assert_eq!(Topic::Account.channel(), ChannelKind::Private);
    }

    #[test]
    fn test_subscription_envelope_shape() {
        let sub = Subscription::Orderbook(SymbolParams::new(["ETHUSDT"]));
        let envelope = sub.to_envelope().unwrap();
        assert_eq!(envelope.event, "subscribe");
        assert_eq!(
            envelope.data,
            json!({"topic": "orderbook", "symbols": ["ETHUSDT"]})
        );

        let kline = Subscription::Kline(KlineParams {
            symbols: vec!["BTCUSDT".to_string()],
            interval: "1m".to_string(),
        });
        assert_eq!(
            kline.to_envelope().unwrap().data,
            json!({"topic": "kline", "symbols": ["BTCUSDT"], "interval": "1m"})
        );

        assert_eq!(
            Subscription::Account.to_envelope().unwrap().data,
            json!({"topic": "account"})
        );
    }

    #[test]
    fn test_envelope_channel_not_on_wire() {
        let envelope = Envelope::new("order", json!({"id": 1})).with_channel(ChannelKind::Private);
        assert_eq!(envelope.channel(), Some(ChannelKind::Private));

        let text = serde_json::to_string(&envelope).unwrap();
        assert_eq!(text, r#"{"event":"order","data":{"id":1}}"#);
    }

    #[test]
    fn test_pong_is_not_forwarded() {
        assert!(Control::Pong(json!(1)).into_envelope().is_none());
        let connected = Control::Connected(Value::Null).into_envelope().unwrap();
        assert_eq!(connected.event, "connected");
    }

    #[test]
    fn test_rest_response_success() {
        assert!(RestResponse { status: 200, body: Value::Null }.is_success());
        assert!(!RestResponse { status: 401, body: Value::Null }.is_success());
    }
}
