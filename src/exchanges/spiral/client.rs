use crate::core::errors::ExchangeError;
use crate::core::kernel::RestClient;
use crate::core::types::{ChannelKind, ConnectionState, Envelope, Subscription};
use crate::exchanges::spiral::hub::StreamHub;
use crate::exchanges::spiral::rest::SpiralRestClient;
use tracing::{info, instrument, warn};

/// Facade over the REST catalog and the stream hub.
///
/// Dropping a started client cancels both stream tasks without waiting for
/// them; call [`SpiralClient::stop`] for an orderly shutdown.
pub struct SpiralClient<R: RestClient> {
    rest: SpiralRestClient<R>,
    hub: StreamHub,
}

impl<R: RestClient> SpiralClient<R> {
    pub fn new(rest: SpiralRestClient<R>, hub: StreamHub) -> Self {
        Self { rest, hub }
    }

    /// Open the REST session, then start both streaming channels
    #[instrument(skip(self), fields(exchange = "spiral"))]
    pub fn start(&mut self) -> Result<(), ExchangeError> {
        self.rest.start()?;
        if let Err(e) = self.hub.start() {
            warn!(error = %e, "stream hub failed to start, closing REST session");
            self.rest.stop();
            return Err(e);
        }
        info!("client started");
        Ok(())
    }

    /// Stop the streaming channels, then the REST session; both are always released
    #[instrument(skip(self), fields(exchange = "spiral"))]
    pub async fn stop(&mut self) -> Result<(), ExchangeError> {
        let hub = self.hub.stop().await;
        self.rest.stop();
        info!("client stopped");
        hub
    }

    pub fn rest(&self) -> &SpiralRestClient<R> {
        &self.rest
    }

    pub fn hub(&self) -> &StreamHub {
        &self.hub
    }

    pub async fn subscribe(&self, subscription: Subscription) -> Result<(), ExchangeError> {
        self.hub.subscribe(subscription).await
    }

    pub async fn next_event(&mut self) -> Result<Envelope, ExchangeError> {
        self.hub.next_event().await
    }

    pub fn state(&self, kind: ChannelKind) -> ConnectionState {
        self.hub.state(kind)
    }
}
