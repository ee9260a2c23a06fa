use crate::core::config::Credentials;
use crate::core::errors::ExchangeError;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Fixed verb and path signed by the private stream handshake
pub const STREAM_AUTH_PREFIX: &str = "GET/realtime";

/// Key, expiry and signature produced for one request or handshake.
///
/// Serializes to the `data` payload of an `authenticate` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub api_key: String,
    pub expires: u64,
    pub signature: String,
}

impl Signature {
    /// REST authentication headers in wire form
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            ("api-key", self.api_key.clone()),
            ("api-expires", self.expires.to_string()),
            ("api-signature", self.signature.clone()),
        ]
    }
}

pub type SignatureResult = Result<Signature, ExchangeError>;

/// Signer trait for request authentication
///
/// Implementations are pure: the same inputs always yield the same signature.
pub trait Signer: Send + Sync {
    /// Sign a REST request
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, DELETE)
    /// * `path` - Request path including the query string, exactly as sent
    /// * `body` - Raw request body bytes, empty when there is no body
    /// * `now` - Current unix time in seconds
    fn sign_rest(&self, method: &str, path: &str, body: &[u8], now: u64) -> SignatureResult;

    /// Sign the private stream `authenticate` handshake
    fn sign_stream_auth(&self, now: u64) -> SignatureResult;
}

/// HMAC-SHA256 signer over `method ∥ path ∥ expires ∥ body`
#[derive(Debug, Clone)]
pub struct HmacSigner {
    credentials: Arc<Credentials>,
}

impl HmacSigner {
    pub fn new(credentials: Arc<Credentials>) -> Self {
        Self { credentials }
    }

    fn expires_at(&self, now: u64) -> u64 {
        now + self.credentials.expiry_window().as_secs()
    }

    fn sign_parts(&self, parts: &[&[u8]]) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.secret_bytes())
            .map_err(|e| ExchangeError::AuthError(format!("Invalid secret key: {}", e)))?;

        for part in parts {
            mac.update(part);
        }

        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl Signer for HmacSigner {
    fn sign_rest(&self, method: &str, path: &str, body: &[u8], now: u64) -> SignatureResult {
        let expires = self.expires_at(now);
        let expires_str = expires.to_string();
        let signature = self.sign_parts(&[
            method.as_bytes(),
            path.as_bytes(),
            expires_str.as_bytes(),
            body,
        ])?;

        Ok(Signature {
            api_key: self.credentials.api_key().to_string(),
            expires,
            signature,
        })
    }

    fn sign_stream_auth(&self, now: u64) -> SignatureResult {
        let expires = self.expires_at(now);
        let expires_str = expires.to_string();
        let signature = self.sign_parts(&[STREAM_AUTH_PREFIX.as_bytes(), expires_str.as_bytes()])?;

        Ok(Signature {
            api_key: self.credentials.api_key().to_string(),
            expires,
            signature,
        })
    }
}

/// Current unix time in seconds
pub fn unix_now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Current unix time in milliseconds
pub fn unix_now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn signer(secret: &str) -> HmacSigner {
        HmacSigner::new(Arc::new(
            Credentials::new("test-key", secret).with_expiry_window(Duration::from_secs(60)),
        ))
    }

    fn reference_hmac(secret: &str, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_sign_rest_matches_concatenation() {
        let signed = signer("S")
            .sign_rest("GET", "/api/v1/order?count=5", b"", 1_700_000_000)
            .unwrap();

        assert_eq!(signed.api_key, "test-key");
        assert_eq!(signed.expires, 1_700_000_060);
        assert_eq!(
            signed.signature,
            reference_hmac("S", "GET/api/v1/order?count=51700000060")
        );
    }

    #[test]
    fn test_sign_rest_is_deterministic_and_verifiable() {
        let body = br#"{"order_id":131513}"#;
        let a = signer("secret").sign_rest("DELETE", "/api/v1/order", body, 42).unwrap();
        let b = signer("secret").sign_rest("DELETE", "/api/v1/order", body, 42).unwrap();
        assert_eq!(a, b);

        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"DELETE/api/v1/order102");
        mac.update(body);
        let raw = hex::decode(&a.signature).unwrap();
        assert!(mac.verify_slice(&raw).is_ok());
    }

    #[test]
    fn test_sign_rest_depends_on_secret() {
        let a = signer("one").sign_rest("GET", "/x", b"", 1).unwrap();
        let b = signer("two").sign_rest("GET", "/x", b"", 1).unwrap();
        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn test_sign_stream_auth() {
        let signed = signer("S").sign_stream_auth(1_000).unwrap();
        assert_eq!(signed.expires, 1_060);
        assert_eq!(signed.signature, reference_hmac("S", "GET/realtime1060"));

        let payload = serde_json::to_value(&signed).unwrap();
        assert_eq!(payload["api_key"], "test-key");
        assert_eq!(payload["expires"], 1_060);
    }

    #[test]
    fn test_headers() {
        let signed = signer("S").sign_rest("GET", "/x", b"", 0).unwrap();
        let headers = signed.headers();
        assert_eq!(headers[0], ("api-key", "test-key".to_string()));
        assert_eq!(headers[1], ("api-expires", "60".to_string()));
        assert_eq!(headers[2].0, "api-signature");
    }
}
