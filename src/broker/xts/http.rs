//! HTTP transport for the XTS REST API.
//!
//! Maps HTTP and envelope failures into the broker error taxonomy. Retry,
//! breaker, and rate-limit decisions happen above this layer.

use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::api_types::XtsEnvelope;
use crate::broker::error::BrokerError;

/// Thin `reqwest` wrapper speaking the XTS envelope protocol.
#[derive(Debug, Clone)]
pub struct XtsHttpClient {
    client: Client,
    base_url: String,
}

impl XtsHttpClient {
    /// Create a client for `base_url` with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Transport` if the underlying client cannot be
    /// built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// GET returning the envelope payload.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, BrokerError> {
        self.request(Method::GET, path, None::<&()>, token).await
    }

    /// POST with a JSON body.
    pub async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<T, BrokerError> {
        self.request(Method::POST, path, Some(body), token).await
    }

    /// PUT with a JSON body.
    pub async fn put<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<T, BrokerError> {
        self.request(Method::PUT, path, Some(body), token).await
    }

    /// DELETE returning the envelope payload.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, BrokerError> {
        self.request(Method::DELETE, path, None::<&()>, token).await
    }

    /// DELETE expecting only an acknowledgement envelope (result optional).
    pub async fn delete_ack(&self, path: &str, token: Option<&str>) -> Result<(), BrokerError> {
        let _: XtsEnvelope<serde_json::Value> = self
            .send_envelope(Method::DELETE, path, None::<&()>, token)
            .await?;
        Ok(())
    }

    async fn request<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<T, BrokerError> {
        let envelope = self.send_envelope(method, path, body, token).await?;
        envelope
            .result
            .ok_or_else(|| BrokerError::invalid_response("success envelope without result"))
    }

    async fn send_envelope<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<XtsEnvelope<T>, BrokerError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(token) = token {
            request = request.header("authorization", token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BrokerError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_for_status(status, path, &response_text(response).await));
        }

        let text = response_text(response).await;
        let envelope: XtsEnvelope<T> = serde_json::from_str(&text)
            .map_err(|e| BrokerError::invalid_response(format!("{e}: {text}")))?;

        if envelope.kind != "success" {
            return Err(BrokerError::Rejected {
                reason: envelope
                    .description
                    .or(envelope.code)
                    .unwrap_or_else(|| "unspecified broker error".to_string()),
            });
        }

        Ok(envelope)
    }
}

async fn response_text(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_default()
}

/// Map an error status to the taxonomy.
fn error_for_status(status: StatusCode, path: &str, body: &str) -> BrokerError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BrokerError::Unauthenticated,
        StatusCode::NOT_FOUND => BrokerError::NotFound {
            order_id: path.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => BrokerError::RateLimited {
            retry_after_secs: retry_after(body),
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => BrokerError::Rejected {
            reason: envelope_description(body)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
        },
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            BrokerError::transport(format!("HTTP {}", s.as_u16()))
        }
        s => BrokerError::invalid_response(format!("unexpected HTTP {}: {body}", s.as_u16())),
    }
}

/// Pull a description out of an error envelope body, if it is one.
fn envelope_description(body: &str) -> Option<String> {
    serde_json::from_str::<XtsEnvelope<serde_json::Value>>(body)
        .ok()
        .and_then(|envelope| envelope.description.or(envelope.code))
}

/// XTS reports rate-limit retry hints in the error description.
fn retry_after(body: &str) -> Option<u64> {
    envelope_description(body).and_then(|description| {
        description
            .split_whitespace()
            .find_map(|word| word.parse::<u64>().ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_unauthenticated() {
        let err = error_for_status(StatusCode::UNAUTHORIZED, "/orders", "");
        assert_eq!(err, BrokerError::Unauthenticated);
    }

    #[test]
    fn server_errors_map_to_transport() {
        for code in [500u16, 502, 503, 504, 408] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = error_for_status(status, "/orders", "");
            assert!(matches!(err, BrokerError::Transport { .. }), "HTTP {code}");
        }
    }

    #[test]
    fn too_many_requests_maps_to_rate_limited() {
        let body = r#"{"type":"error","code":"e-ratelimit","description":"retry after 30 seconds"}"#;
        let err = error_for_status(StatusCode::TOO_MANY_REQUESTS, "/orders", body);
        assert_eq!(
            err,
            BrokerError::RateLimited {
                retry_after_secs: Some(30)
            }
        );
    }

    #[test]
    fn bad_request_surfaces_envelope_description() {
        let body = r#"{"type":"error","code":"e-orders-0001","description":"invalid quantity"}"#;
        let err = error_for_status(StatusCode::BAD_REQUEST, "/orders", body);
        assert_eq!(
            err,
            BrokerError::Rejected {
                reason: "invalid quantity".to_string()
            }
        );
    }

    #[test]
    fn not_found_maps_to_not_found() {
        let err = error_for_status(StatusCode::NOT_FOUND, "/orders/9", "");
        assert!(matches!(err, BrokerError::NotFound { .. }));
    }
}
