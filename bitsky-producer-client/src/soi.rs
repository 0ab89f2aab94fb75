//! HTTP delivery to Systems Of Interest.

use crate::http::{build_http_client, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use async_trait::async_trait;
use bitsky_producer_core::{
    join_url, Intelligence, ProducerError, Soi, TargetSystem, SECURITY_KEY_HEADER,
};
use std::time::Duration;

/// HTTP client posting result batches to SOI callbacks.
pub struct HttpTargetSystem {
    http: reqwest::Client,
}

impl HttpTargetSystem {
    pub fn new() -> Result<Self, ProducerError> {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeouts(
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ProducerError> {
        Ok(Self {
            http: build_http_client(connect_timeout, request_timeout)?,
        })
    }
}

#[async_trait]
impl TargetSystem for HttpTargetSystem {
    async fn deliver(&self, soi: &Soi, items: &[Intelligence]) -> Result<(), ProducerError> {
        let base_url = soi
            .base_url
            .as_deref()
            .ok_or_else(|| ProducerError::invalid_input("soi has no baseURL"))?;
        let path = soi
            .callback_path()
            .ok_or_else(|| ProducerError::invalid_input("soi callback has no path"))?;
        let method = soi
            .callback_method()
            .ok_or_else(|| ProducerError::invalid_input("soi callback has no method"))?;
        let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| ProducerError::invalid_input(format!("invalid method {method:?}")))?;

        let url = join_url(base_url, path);
        let mut req = self.http.request(method, &url).json(items);
        if let Some(api_key) = soi.api_key.as_deref() {
            req = req.header(SECURITY_KEY_HEADER, api_key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ProducerError::transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProducerError::from_status(status.as_u16(), body));
        }
        tracing::debug!("delivered {} intelligences to {}", items.len(), url);
        Ok(())
    }
}
