use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobscout_core::error::AppError;
use jobscout_core::models::{FetchRequest, Method, RawResponse};
use jobscout_core::proxy_pool::ProxyEndpoint;
use jobscout_core::traits::Transport;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};

pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// HTTP transport using reqwest.
///
/// Keeps one [`Client`] per proxy endpoint, built on first use, so every
/// request goes out through the proxy leased for it. Any HTTP status is
/// returned as a [`RawResponse`]; only timeouts and connection failures are
/// reported as errors.
#[derive(Clone)]
pub struct ReqwestTransport {
    clients: Arc<Mutex<HashMap<ProxyEndpoint, Client>>>,
    user_agent: String,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            user_agent: user_agent.into(),
            timeout,
        }
    }

    /// Build clients for `endpoints` up front so a bad proxy URL fails at
    /// startup rather than mid-crawl.
    pub fn with_endpoints(self, endpoints: &[ProxyEndpoint]) -> Result<Self, AppError> {
        for endpoint in endpoints {
            self.client_for(endpoint)?;
        }
        Ok(self)
    }

    fn client_for(&self, endpoint: &ProxyEndpoint) -> Result<Client, AppError> {
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned transport client cache");
            poisoned.into_inner()
        });
        if let Some(client) = clients.get(endpoint) {
            return Ok(client.clone());
        }

        let client = self.build_client(endpoint)?;
        clients.insert(endpoint.clone(), client.clone());
        tracing::debug!(proxy = %endpoint, "Built HTTP client");
        Ok(client)
    }

    fn build_client(&self, endpoint: &ProxyEndpoint) -> Result<Client, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE),
        );

        let mut builder = Client::builder()
            .user_agent(self.user_agent.as_str())
            .default_headers(headers)
            .timeout(self.timeout);

        if let Some(url) = endpoint.url() {
            let proxy = reqwest::Proxy::all(url)
                .map_err(|e| AppError::ConfigError(format!("Invalid proxy {endpoint}: {e}")))?;
            builder = builder.proxy(proxy);
        } else {
            builder = builder.no_proxy();
        }

        builder
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))
    }

    fn map_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout.as_secs())
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else {
            AppError::NetworkError(e.to_string())
        }
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: &FetchRequest) -> Result<RawResponse, AppError> {
        let endpoint = request.proxy.clone().unwrap_or_else(ProxyEndpoint::direct);
        let client = self.client_for(&endpoint)?;

        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Post => client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        tracing::debug!(
            url = %request.url,
            site = %request.site,
            proxy = %endpoint,
            attempt = request.attempt,
            "Sending request"
        );

        let response = builder.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(RawResponse::new(status, body))
    }
}
