use crate::core::errors::ExchangeError;
use crate::core::kernel::RestClient;
use crate::core::types::RestResponse;
use crate::exchanges::spiral::types::{CancelAllOrders, CancelOrder, NewOrder};
use reqwest::Method;
use serde::Serialize;

/// Spiral REST catalog over any `RestClient`.
///
/// Every call resolves to `(status, body)`; check [`RestResponse::is_success`]
/// for exchange-level rejections.
pub struct SpiralRestClient<R: RestClient> {
    client: R,
}

impl<R: RestClient> SpiralRestClient<R> {
    pub fn new(client: R) -> Self {
        Self { client }
    }

    pub fn start(&mut self) -> Result<(), ExchangeError> {
        self.client.start()
    }

    pub fn stop(&mut self) {
        self.client.stop();
    }

    pub fn is_started(&self) -> bool {
        self.client.is_started()
    }

    pub fn inner(&self) -> &R {
        &self.client
    }

    pub async fn get_currencies(&self, params: &[(&str, &str)]) -> Result<RestResponse, ExchangeError> {
        self.client.get("/currencies", params, false).await
    }

    pub async fn get_products(&self, params: &[(&str, &str)]) -> Result<RestResponse, ExchangeError> {
        self.client.get("/products", params, false).await
    }

    /// Candlesticks, e.g. `[("symbol", "BTCUSDT"), ("interval", "1m")]`
    pub async fn get_klines(&self, params: &[(&str, &str)]) -> Result<RestResponse, ExchangeError> {
        self.client.get("/klines", params, false).await
    }

    pub async fn get_orderbook(&self, params: &[(&str, &str)]) -> Result<RestResponse, ExchangeError> {
        self.client.get("/orderbook", params, false).await
    }

    pub async fn get_trades(&self, params: &[(&str, &str)]) -> Result<RestResponse, ExchangeError> {
        self.client.get("/trades", params, false).await
    }

    pub async fn get_wallet_balances(
        &self,
        params: &[(&str, &str)],
    ) -> Result<RestResponse, ExchangeError> {
        self.client.get("/wallet/balances", params, true).await
    }

    pub async fn get_my_trades(&self, params: &[(&str, &str)]) -> Result<RestResponse, ExchangeError> {
        self.client.get("/myTrades", params, true).await
    }

    /// Open orders, filtered by `symbol`, `side`, `count`
    pub async fn get_order(&self, params: &[(&str, &str)]) -> Result<RestResponse, ExchangeError> {
        self.client.get("/order", params, true).await
    }

    pub async fn post_order(&self, order: &NewOrder) -> Result<RestResponse, ExchangeError> {
        self.post_order_raw(order).await
    }

    /// Place an order from any serializable body
    pub async fn post_order_raw<B: Serialize + Sync>(&self, body: &B) -> Result<RestResponse, ExchangeError> {
        self.client.send_json(Method::POST, "/order", body, true).await
    }

    pub async fn delete_order(&self, cancel: &CancelOrder) -> Result<RestResponse, ExchangeError> {
        self.client.send_json(Method::DELETE, "/order", cancel, true).await
    }

    pub async fn delete_order_all(
        &self,
        cancel: &CancelAllOrders,
    ) -> Result<RestResponse, ExchangeError> {
        self.client
            .send_json(Method::DELETE, "/order/all", cancel, true)
            .await
    }
}
