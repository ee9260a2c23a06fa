use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::Signer;
use crate::core::kernel::ws::{Backpressure, InboundReceiver, StreamConnection, WsConfig};
use crate::core::types::{
    ChannelKind, ConnectionState, Envelope, KlineParams, Subscription, SymbolParams,
};
use crate::exchanges::spiral::codec::SpiralCodec;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

/// Default capacity of the shared inbound queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Settings shared by both streaming channels
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub public_url: String,
    pub private_url: String,
    pub queue_capacity: usize,
    pub backpressure: Backpressure,
    pub ws: WsConfig,
}

impl HubConfig {
    pub fn new(public_url: impl Into<String>, private_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into(),
            private_url: private_url.into(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backpressure: Backpressure::default(),
            ws: WsConfig::default(),
        }
    }
}

/// Owns the public and private connections and the queue both feed.
///
/// Without a signer the hub runs the public channel only; private topics then
/// fail with `AuthenticationRequired`.
pub struct StreamHub {
    public: StreamConnection<SpiralCodec>,
    private: Option<StreamConnection<SpiralCodec>>,
    events: InboundReceiver,
}

impl StreamHub {
    pub fn new(config: HubConfig, signer: Option<Arc<dyn Signer>>) -> Result<Self, ExchangeError> {
        let (tx, events) = mpsc::channel(config.queue_capacity.max(1));
        let codec = Arc::new(SpiralCodec::new());

        let public = StreamConnection::new(
            ChannelKind::Public,
            config.public_url,
            "spiral".to_string(),
            config.ws.clone(),
            config.backpressure,
            Arc::clone(&codec),
            None,
            tx.clone(),
        )?;

        let private = match signer {
            Some(signer) => Some(StreamConnection::new(
                ChannelKind::Private,
                config.private_url,
                "spiral".to_string(),
                config.ws,
                config.backpressure,
                codec,
                Some(signer),
                tx,
            )?),
            None => None,
        };

        Ok(Self {
            public,
            private,
            events,
        })
    }

    /// Start both connections; each runs its own task
    #[instrument(skip(self), fields(exchange = "spiral"))]
    pub fn start(&mut self) -> Result<(), ExchangeError> {
        self.public.start()?;
        if let Some(private) = self.private.as_mut() {
            private.start()?;
        }
        info!(private = self.private.is_some(), "stream hub started");
        Ok(())
    }

    /// Stop the private connection, then the public one.
    ///
    /// Both are always stopped; the first failure is returned. Envelopes already
    /// queued stay readable through [`StreamHub::next_event`].
    #[instrument(skip(self), fields(exchange = "spiral"))]
    pub async fn stop(&mut self) -> Result<(), ExchangeError> {
        let private = match self.private.as_mut() {
            Some(private) => private.stop().await,
            None => Ok(()),
        };
        let public = self.public.stop().await;
        debug!("stream hub stopped");
        private.and(public)
    }

    /// Next envelope in arrival order, across both channels.
    ///
    /// Cancel-safe, so it can sit in a `select!` next to a shutdown signal.
    pub async fn next_event(&mut self) -> Result<Envelope, ExchangeError> {
        match self.events.recv().await {
            Some(event) => event,
            None => Err(ExchangeError::StreamClosed),
        }
    }

    /// Send a subscription on the channel that carries its topic
    #[instrument(skip(self), fields(exchange = "spiral", topic = %subscription.topic()))]
    pub async fn subscribe(&self, subscription: Subscription) -> Result<(), ExchangeError> {
        let connection = self.connection(subscription.topic().channel())?;
        let envelope = subscription.to_envelope()?;
        connection.send(envelope).await
    }

    pub async fn subscribe_ticker(&self, symbols: SymbolParams) -> Result<(), ExchangeError> {
        self.subscribe(Subscription::Ticker(symbols)).await
    }

    pub async fn subscribe_orderbook(&self, symbols: SymbolParams) -> Result<(), ExchangeError> {
        self.subscribe(Subscription::Orderbook(symbols)).await
    }

    pub async fn subscribe_trade(&self, symbols: SymbolParams) -> Result<(), ExchangeError> {
        self.subscribe(Subscription::Trade(symbols)).await
    }

    pub async fn subscribe_kline(&self, params: KlineParams) -> Result<(), ExchangeError> {
        self.subscribe(Subscription::Kline(params)).await
    }

    pub async fn subscribe_order(&self, symbols: SymbolParams) -> Result<(), ExchangeError> {
        self.subscribe(Subscription::Order(symbols)).await
    }

    pub async fn subscribe_account(&self) -> Result<(), ExchangeError> {
        self.subscribe(Subscription::Account).await
    }

    /// Current state of one channel; a hub without credentials reports its
    /// private channel as disconnected
    pub fn state(&self, kind: ChannelKind) -> ConnectionState {
        self.connection(kind)
            .map_or(ConnectionState::Disconnected, StreamConnection::state)
    }

    pub fn connection(&self, kind: ChannelKind) -> Result<&StreamConnection<SpiralCodec>, ExchangeError> {
        match kind {
            ChannelKind::Public => Ok(&self.public),
            ChannelKind::Private => self
                .private
                .as_ref()
                .ok_or(ExchangeError::AuthenticationRequired),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_private_topic_without_credentials() {
        let hub = StreamHub::new(HubConfig::new("ws://127.0.0.1:1", "ws://127.0.0.1:1"), None).unwrap();
        let result = hub.subscribe_account().await;
        assert!(matches!(result, Err(ExchangeError::AuthenticationRequired)));
        assert_eq!(hub.state(ChannelKind::Private), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_subscribe_before_start_is_not_ready() {
        let hub = StreamHub::new(HubConfig::new("ws://127.0.0.1:1", "ws://127.0.0.1:1"), None).unwrap();
        let result = hub.subscribe_orderbook(SymbolParams::new(["ETHUSDT"])).await;
        assert!(matches!(
            result,
            Err(ExchangeError::NotReady {
                channel: ChannelKind::Public
            })
        ));
    }

    #[tokio::test]
    async fn test_stop_drains_then_closes() {
        let mut hub = StreamHub::new(HubConfig::new("ws://127.0.0.1:1", "ws://127.0.0.1:1"), None).unwrap();
        hub.start().unwrap();
        hub.stop().await.unwrap();
        hub.stop().await.unwrap();
        assert!(matches!(hub.next_event().await, Err(ExchangeError::StreamClosed)));
    }
}
