pub mod core;
pub mod exchanges;

pub use crate::core::{config::Credentials, errors::ExchangeError, types::*};
pub use crate::exchanges::spiral::{build_client, ClientConfig, SpiralClient};
