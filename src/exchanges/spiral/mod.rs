pub mod builder;
pub mod client;
pub mod codec;
pub mod hub;
pub mod rest;
pub mod types;

pub use builder::{build_client, ClientConfig};
pub use client::SpiralClient;
pub use codec::SpiralCodec;
pub use hub::{HubConfig, StreamHub};
pub use rest::SpiralRestClient;
pub use types::{CancelAllOrders, CancelOrder, NewOrder, OrderType, Side};

/// Production REST base URL, including the API version prefix
pub const REST_URL: &str = "https://api.spiral.exchange/api/v1";

/// Production WebSocket endpoint, shared by the public and private channels
pub const WSS_URL: &str = "wss://ws.spiral.exchange";
