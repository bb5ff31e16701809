use async_trait::async_trait;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, Response, header::{ HeaderMap, HeaderName, HeaderValue, ACCEPT } };
use serde_json::Value;
use std::time::Duration;

use super::{ ChatTransport, TransportError };
use crate::config::WidgetConfig;

/// The `X-CSRFToken` header, lowercased as `HeaderName::from_static` requires.
pub const CSRF_HEADER: &str = "x-csrftoken";

pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn from_config(config: &WidgetConfig) -> Result<Self, TransportError> {
        Self::new(config.csrf_token.as_deref(), Duration::from_secs(config.request_timeout_secs))
    }

    pub fn new(csrf_token: Option<&str>, timeout: Duration) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = csrf_token.filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(token).map_err(|e|
                TransportError::Request(format!("invalid CSRF token: {}", e))
            )?;
            headers.insert(HeaderName::from_static(CSRF_HEADER), value);
        }

        let http = HttpClient::builder().default_headers(headers).timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<Value, TransportError> {
        debug!("POST {}", url);
        let resp = self.http.post(url).json(payload).send().await?;
        decode_object(url, resp).await
    }

    async fn get_json(&self, url: &str) -> Result<Value, TransportError> {
        debug!("GET {}", url);
        let resp = self.http.get(url).send().await?;
        decode_object(url, resp).await
    }
}

async fn decode_object(url: &str, resp: Response) -> Result<Value, TransportError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        warn!("Endpoint {} answered HTTP {}", url, status);
        return Err(TransportError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = resp.bytes().await?;
    let value: Value = serde_json
        ::from_slice(&bytes)
        .map_err(|e| TransportError::Decode(e.to_string()))?;
    if !value.is_object() {
        return Err(TransportError::Decode("expected a JSON object".to_string()));
    }
    Ok(value)
}
