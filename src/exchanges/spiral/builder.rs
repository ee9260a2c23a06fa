use crate::core::config::{ConfigError, Credentials};
use crate::core::errors::ExchangeError;
use crate::core::kernel::ws::{Backpressure, WsConfig};
use crate::core::kernel::{HmacSigner, ReqwestRest, RestClientBuilder, RestClientConfig, Signer};
use crate::exchanges::spiral::client::SpiralClient;
use crate::exchanges::spiral::hub::{HubConfig, StreamHub, DEFAULT_QUEUE_CAPACITY};
use crate::exchanges::spiral::rest::SpiralRestClient;
use crate::exchanges::spiral::{REST_URL, WSS_URL};
use std::env;
use std::sync::Arc;

/// Everything needed to build a [`SpiralClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub rest_url: String,
    pub public_ws_url: String,
    pub private_ws_url: String,
    /// `None` builds a public-only client
    pub credentials: Option<Credentials>,
    pub queue_capacity: usize,
    pub backpressure: Backpressure,
    pub rest_timeout_seconds: u64,
    pub ws: WsConfig,
}

impl ClientConfig {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            rest_url: REST_URL.to_string(),
            public_ws_url: WSS_URL.to_string(),
            private_ws_url: WSS_URL.to_string(),
            credentials,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backpressure: Backpressure::default(),
            rest_timeout_seconds: 30,
            ws: WsConfig::default(),
        }
    }

    /// Read credentials and optional endpoint overrides from the environment.
    ///
    /// `{PREFIX}_API_KEY`/`{PREFIX}_API_SECRET` are required;
    /// `{PREFIX}_REST_URL` and `{PREFIX}_WS_URL` override the production endpoints.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let mut config = Self::new(Some(Credentials::from_env(prefix)?));
        let prefix = prefix.to_uppercase();

        if let Ok(url) = env::var(format!("{}_REST_URL", prefix)) {
            config.rest_url = url;
        }
        if let Ok(url) = env::var(format!("{}_WS_URL", prefix)) {
            config.public_ws_url.clone_from(&url);
            config.private_ws_url = url;
        }

        Ok(config)
    }

    pub fn public_only() -> Self {
        Self::new(None)
    }

    pub fn with_urls(
        mut self,
        rest_url: impl Into<String>,
        public_ws_url: impl Into<String>,
        private_ws_url: impl Into<String>,
    ) -> Self {
        self.rest_url = rest_url.into();
        self.public_ws_url = public_ws_url.into();
        self.private_ws_url = private_ws_url.into();
        self
    }

    pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_ws_config(mut self, ws: WsConfig) -> Self {
        self.ws = ws;
        self
    }
}

/// Build a Spiral client; nothing connects until `start`
pub fn build_client(config: ClientConfig) -> Result<SpiralClient<ReqwestRest>, ExchangeError> {
    if config.queue_capacity == 0 {
        return Err(ExchangeError::InvalidParameters(
            "queue capacity must be at least 1".to_string(),
        ));
    }

    let signer: Option<Arc<dyn Signer>> = config
        .credentials
        .map(|credentials| Arc::new(HmacSigner::new(Arc::new(credentials))) as Arc<dyn Signer>);

    let rest_config = RestClientConfig::new(config.rest_url, "spiral".to_string())
        .with_timeout(config.rest_timeout_seconds);

    let mut rest_builder = RestClientBuilder::new(rest_config);
    if let Some(signer) = &signer {
        rest_builder = rest_builder.with_signer(Arc::clone(signer));
    }
    let rest = SpiralRestClient::new(rest_builder.build()?);

    let hub = StreamHub::new(
        HubConfig {
            public_url: config.public_ws_url,
            private_url: config.private_ws_url,
            queue_capacity: config.queue_capacity,
            backpressure: config.backpressure,
            ws: config.ws,
        },
        signer,
    )?;

    Ok(SpiralClient::new(rest, hub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ChannelKind, ConnectionState};

    #[test]
    fn test_defaults_point_at_production() {
        let config = ClientConfig::public_only();
        assert_eq!(config.rest_url, "https://api.spiral.exchange/api/v1");
        assert_eq!(config.public_ws_url, "wss://ws.spiral.exchange");
        assert_eq!(config.private_ws_url, "wss://ws.spiral.exchange");
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.backpressure, Backpressure::Block);
    }

    #[test]
    fn test_from_env_overrides() {
        env::set_var("SPIRALTEST_API_KEY", "k");
        env::set_var("SPIRALTEST_API_SECRET", "s");
        env::set_var("SPIRALTEST_WS_URL", "ws://localhost:9000");

        let config = ClientConfig::from_env("SPIRALTEST").unwrap();
        assert_eq!(config.public_ws_url, "ws://localhost:9000");
        assert_eq!(config.private_ws_url, "ws://localhost:9000");
        assert_eq!(config.rest_url, REST_URL);
        assert_eq!(config.credentials.unwrap().api_key(), "k");
    }

    #[test]
    fn test_build_client_states() {
        let client = build_client(ClientConfig::new(Some(Credentials::new("k", "s")))).unwrap();
        assert_eq!(client.state(ChannelKind::Public), ConnectionState::Disconnected);
        assert_eq!(client.state(ChannelKind::Private), ConnectionState::Disconnected);
        assert!(!client.rest().is_started());
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let result = build_client(ClientConfig::public_only().with_queue_capacity(0));
        assert!(matches!(result, Err(ExchangeError::InvalidParameters(_))));
    }
}
