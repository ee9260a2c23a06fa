use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::{unix_now_secs, Signer};
use crate::core::types::RestResponse;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Response, Url};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, trace};

/// REST client trait for making HTTP requests
///
/// Every call resolves to the status code and decoded body. A non-2xx status is
/// a normal outcome; only transport failures are returned as errors.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Open the HTTP session
    fn start(&mut self) -> Result<(), ExchangeError>;

    /// Close the HTTP session, dropping pooled connections
    fn stop(&mut self);

    fn is_started(&self) -> bool;

    /// Send a request
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `endpoint` - The API endpoint path, appended to the base URL
    /// * `query_params` - Query parameters as key-value pairs
    /// * `body` - Raw body bytes; these exact bytes are signed and transmitted
    /// * `authenticated` - Whether to sign the request
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
        body: &[u8],
        authenticated: bool,
    ) -> Result<RestResponse, ExchangeError>;

    /// Make a GET request
    async fn get(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<RestResponse, ExchangeError> {
        self.request(Method::GET, endpoint, query_params, &[], authenticated)
            .await
    }

    /// Serialize `body` once and send it as the JSON request body
    async fn send_json<B: Serialize + Sync>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
        authenticated: bool,
    ) -> Result<RestResponse, ExchangeError> {
        let body_bytes = serde_json::to_vec(body).map_err(|e| {
            ExchangeError::SerializationError(format!("Failed to serialize request body: {}", e))
        })?;

        self.request(method, endpoint, &[], &body_bytes, authenticated)
            .await
    }
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API, including any path prefix
    pub base_url: String,
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
}

impl RestClientConfig {
    pub fn new(base_url: String, exchange_name: String) -> Self {
        Self {
            base_url,
            exchange_name,
            timeout_seconds: 30,
            user_agent: "SpiralX/0.1".to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
        }
    }

    /// Set the signer for authenticated requests
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Build the REST client; the HTTP session opens on `start`
    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        Url::parse(&self.config.base_url).map_err(|e| {
            ExchangeError::InvalidParameters(format!(
                "Invalid base URL '{}': {}",
                self.config.base_url, e
            ))
        })?;

        Ok(ReqwestRest {
            client: None,
            config: self.config,
            signer: self.signer,
        })
    }
}

/// Implementation of `RestClient` using reqwest
pub struct ReqwestRest {
    client: Option<Client>,
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("started", &self.client.is_some())
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    /// Build the full URL for an endpoint, with the query string attached
    fn build_url(&self, endpoint: &str, query_params: &[(&str, &str)]) -> Result<Url, ExchangeError> {
        let mut url = Url::parse(&format!("{}{}", self.config.base_url, endpoint)).map_err(|e| {
            ExchangeError::InvalidParameters(format!("Invalid endpoint '{}': {}", endpoint, e))
        })?;

        if !query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query_params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Decode the response body into a JSON value
    #[instrument(skip(self, response), fields(exchange = %self.config.exchange_name, status = %response.status()))]
    async fn handle_response(&self, response: Response) -> Result<RestResponse, ExchangeError> {
        let status = response.status();
        let response_text = response.text().await?;

        trace!("Response body: {}", response_text);

        let body = if response_text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&response_text) {
                Ok(value) => value,
                Err(_) if !status.is_success() => Value::String(response_text),
                Err(e) => {
                    return Err(ExchangeError::DeserializationError(format!(
                        "Failed to parse JSON response: {}",
                        e
                    )))
                }
            }
        };

        Ok(RestResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Path and query exactly as they appear on the request line
pub fn signing_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    fn start(&mut self) -> Result<(), ExchangeError> {
        if self.client.is_some() {
            return Err(ExchangeError::AlreadyStarted(format!(
                "{} REST session",
                self.config.exchange_name
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .user_agent(&self.config.user_agent)
            .build()?;

        debug!(exchange = %self.config.exchange_name, "REST session opened");
        self.client = Some(client);
        Ok(())
    }

    fn stop(&mut self) {
        if self.client.take().is_some() {
            debug!(exchange = %self.config.exchange_name, "REST session closed");
        }
    }

    fn is_started(&self) -> bool {
        self.client.is_some()
    }

    #[instrument(skip(self, query_params, body), fields(exchange = %self.config.exchange_name, method = %method, endpoint = %endpoint))]
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
        body: &[u8],
        authenticated: bool,
    ) -> Result<RestResponse, ExchangeError> {
        let client = self.client.as_ref().ok_or_else(|| {
            ExchangeError::NotStarted(format!("{} REST session", self.config.exchange_name))
        })?;

        let url = self.build_url(endpoint, query_params)?;
        let mut request = client.request(method.clone(), url.clone());

        if authenticated {
            let signer = self
                .signer
                .as_ref()
                .ok_or(ExchangeError::AuthenticationRequired)?;
            let signed = signer.sign_rest(method.as_str(), &signing_path(&url), body, unix_now_secs())?;

            for (key, value) in signed.headers() {
                request = request.header(key, value);
            }
        }

        if authenticated || !body.is_empty() {
            request = request.header(CONTENT_TYPE, "application/json");
        }

        if !body.is_empty() {
            request = request.body(body.to_vec());
        }

        let response = request.send().await?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rest() -> ReqwestRest {
        RestClientBuilder::new(RestClientConfig::new(
            "https://api.spiral.exchange/api/v1".to_string(),
            "spiral".to_string(),
        ))
        .build()
        .unwrap()
    }

    #[test]
    fn test_build_url_with_query() {
        let url = rest()
            .build_url("/klines", &[("symbol", "BTCUSDT"), ("limit", "5")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.spiral.exchange/api/v1/klines?symbol=BTCUSDT&limit=5"
        );
        assert_eq!(signing_path(&url), "/api/v1/klines?symbol=BTCUSDT&limit=5");
    }

    #[test]
    fn test_signing_path_without_query() {
        let url = rest().build_url("/order/all", &[]).unwrap();
        assert_eq!(signing_path(&url), "/api/v1/order/all");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = RestClientBuilder::new(RestClientConfig::new(
            "not a url".to_string(),
            "spiral".to_string(),
        ))
        .build();
        assert!(matches!(result, Err(ExchangeError::InvalidParameters(_))));
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let mut rest = rest();
        assert!(!rest.is_started());
        rest.start().unwrap();
        assert!(rest.is_started());
        assert!(matches!(rest.start(), Err(ExchangeError::AlreadyStarted(_))));
        rest.stop();
        assert!(!rest.is_started());
    }

    #[tokio::test]
    async fn test_request_before_start() {
        let result = rest().get("/currencies", &[], false).await;
        assert!(matches!(result, Err(ExchangeError::NotStarted(_))));
    }
}
