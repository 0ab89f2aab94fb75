//! Typed HTTP client for the Metadata Service.

use crate::http::{build_http_client, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use async_trait::async_trait;
use bitsky_producer_core::{
    join_url, ControlPlane, Intelligence, ProducerConfig, ProducerError, ResolvedConfig,
    SECURITY_KEY_HEADER,
};
use serde_json::Value;
use std::time::Duration;

/// HTTP client for producer and intelligence operations.
pub struct HttpControlPlane {
    http: reqwest::Client,
}

/// Builder for [`HttpControlPlane`].
pub struct HttpControlPlaneBuilder {
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl Default for HttpControlPlaneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpControlPlaneBuilder {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HttpControlPlane, ProducerError> {
        Ok(HttpControlPlane {
            http: build_http_client(self.connect_timeout, self.request_timeout)?,
        })
    }
}

impl HttpControlPlane {
    /// Create a client with default HTTP settings.
    pub fn new() -> Result<Self, ProducerError> {
        HttpControlPlaneBuilder::new().build()
    }

    pub fn builder() -> HttpControlPlaneBuilder {
        HttpControlPlaneBuilder::new()
    }

    fn apply_security(
        &self,
        req: reqwest::RequestBuilder,
        config: &ResolvedConfig,
    ) -> reqwest::RequestBuilder {
        match &config.security_key {
            Some(key) => req.header(SECURITY_KEY_HEADER, key),
            None => req,
        }
    }

    fn require_identity<'a>(
        config: &'a ResolvedConfig,
    ) -> Result<(&'a str, &'a str), ProducerError> {
        match (config.base_url.as_deref(), config.global_id.as_deref()) {
            (Some(base_url), Some(global_id)) => Ok((base_url, global_id)),
            _ => Err(ProducerError::ConfigMissing),
        }
    }

    /// Classify a non-success response using its status and the vendor
    /// `code` field, when the body parses as JSON.
    async fn classify(
        response: reqwest::Response,
        global_id: &str,
        kind: &str,
    ) -> ProducerError {
        let status = response.status().as_u16();
        let code = match response.json::<Value>().await {
            Ok(body) => body
                .get("code")
                .and_then(Value::as_str)
                .map(str::to_string),
            Err(_) => None,
        };
        ProducerError::from_response(status, code.as_deref(), global_id, kind)
    }

    /// Update this producer's registration on the control plane.
    pub async fn update_producer(
        &self,
        config: &ResolvedConfig,
        producer: &ProducerConfig,
    ) -> Result<ProducerConfig, ProducerError> {
        let (base_url, global_id) = Self::require_identity(config)?;
        let url = join_url(base_url, &format!("apis/producers/{global_id}"));
        let req = self.apply_security(self.http.put(&url), config).json(producer);
        let response = req
            .send()
            .await
            .map_err(|e| ProducerError::transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::classify(response, global_id, "").await);
        }
        response
            .json::<ProducerConfig>()
            .await
            .map_err(|e| ProducerError::transport(format!("invalid producer response: {e}")))
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn fetch_producer_config(
        &self,
        config: &ResolvedConfig,
        kind: &str,
    ) -> Result<ProducerConfig, ProducerError> {
        let (base_url, global_id) = Self::require_identity(config)?;
        let url = join_url(base_url, &format!("apis/producers/{global_id}"));
        let req = self
            .apply_security(self.http.get(&url), config)
            .query(&[("type", kind), ("serialId", config.serial_id.as_str())]);
        let response = req
            .send()
            .await
            .map_err(|e| ProducerError::transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::classify(response, global_id, kind).await);
        }
        response
            .json::<ProducerConfig>()
            .await
            .map_err(|e| ProducerError::transport(format!("invalid config response: {e}")))
    }

    async fn fetch_intelligences(
        &self,
        config: &ResolvedConfig,
    ) -> Result<Vec<Intelligence>, ProducerError> {
        let (base_url, global_id) = Self::require_identity(config)?;
        let url = join_url(base_url, "apis/intelligences");
        let req = self
            .apply_security(self.http.get(&url), config)
            .query(&[("gid", global_id)]);
        let response = req
            .send()
            .await
            .map_err(|e| ProducerError::transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::classify(response, global_id, "").await);
        }
        response
            .json::<Vec<Intelligence>>()
            .await
            .map_err(|e| ProducerError::transport(format!("invalid intelligences response: {e}")))
    }

    async fn update_intelligences(
        &self,
        config: &ResolvedConfig,
        items: &[Intelligence],
    ) -> Result<(), ProducerError> {
        let (base_url, global_id) = Self::require_identity(config)?;
        let url = join_url(base_url, "apis/intelligences");
        let req = self.apply_security(self.http.put(&url), config).json(items);
        let response = req
            .send()
            .await
            .map_err(|e| ProducerError::transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::classify(response, global_id, "").await);
        }
        Ok(())
    }
}
