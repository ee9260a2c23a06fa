/// `SpiralX` Kernel - transport layer for the REST and streaming channels
///
/// The kernel holds transport logic and the generic interfaces exchange code
/// plugs into; it knows nothing about Spiral's endpoints or topics.
///
/// # Architecture
///
/// ## Transport Layer
/// - `RestClient`: HTTP client interface, `ReqwestRest` implementation
/// - `StreamConnection`: one WebSocket channel with handshake, heartbeat and
///   reconnect-with-backoff running on its own task
///
/// ## Authentication
/// - `Signer`: pluggable authentication interface
/// - `HmacSigner`: HMAC-SHA256 over method, path, expiry and body
///
/// ## Message Handling
/// - `WsCodec`: exchange-specific frame encoding/decoding into [`Frame`]
///
/// # Example
/// ```rust,no_run
/// use spiralx::core::config::Credentials;
/// use spiralx::core::kernel::*;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let credentials = Arc::new(Credentials::new("api_key", "secret"));
/// let rest_config = RestClientConfig::new(
///     "https://api.spiral.exchange/api/v1".to_string(),
///     "spiral".to_string(),
/// );
/// let mut rest = RestClientBuilder::new(rest_config)
///     .with_signer(Arc::new(HmacSigner::new(credentials)))
///     .build()?;
///
/// rest.start()?;
/// let response = rest.get("/wallet/balances", &[("currency", "USDT")], true).await?;
/// println!("{} {}", response.status, response.body);
/// rest.stop();
/// # Ok(())
/// # }
/// ```
///
/// [`Frame`]: crate::core::types::Frame
pub mod codec;
pub mod rest;
pub mod signer;
pub mod ws;

// Re-export key types for convenience
pub use codec::WsCodec;
pub use rest::{ReqwestRest, RestClient, RestClientBuilder, RestClientConfig};
pub use signer::{HmacSigner, Signature, SignatureResult, Signer};
pub use ws::{
    Backoff, Backpressure, ConnectionStatus, RetryPolicy, StreamConnection, WsConfig,
};
