use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::ApiRateLimiter;
use crate::error::{CollectorError, CollectorResult};

/// Query parameter value; sequences are sent comma-joined
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Text(String),
    Integer(i64),
    Float(f64),
    List(Vec<String>),
}

impl QueryValue {
    pub fn render(&self) -> String {
        match self {
            QueryValue::Text(s) => s.clone(),
            QueryValue::Integer(n) => n.to_string(),
            QueryValue::Float(f) => f.to_string(),
            QueryValue::List(items) => items.join(","),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Integer(value)
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        QueryValue::Float(value)
    }
}

impl<S: Into<String>> From<Vec<S>> for QueryValue {
    fn from(values: Vec<S>) -> Self {
        QueryValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// HTTP client for one external source
///
/// Every request goes through the client's own [`ApiRateLimiter`], so two
/// clients for different sources never slow each other down.
pub struct RemoteClient {
    name: String,
    client: Client,
    base_url: String,
    headers: HeaderMap,
    rate_limiter: ApiRateLimiter,
}

impl RemoteClient {
    /// Create a client; when an API key is given it is sent under every name
    /// in `key_headers`
    pub fn new(
        name: &str,
        base_url: &str,
        requests_per_minute: u32,
        api_key: Option<&str>,
        key_headers: &[&str],
    ) -> CollectorResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("funding-collector/0.1")
            .build()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|_| CollectorError::Config(format!("{} API key is not a valid header value", name)))?;
            for header in key_headers {
                let header_name = HeaderName::from_bytes(header.as_bytes())
                    .map_err(|_| CollectorError::Config(format!("invalid header name '{}'", header)))?;
                headers.insert(header_name, value.clone());
            }
        }

        Ok(Self {
            name: name.to_string(),
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
            rate_limiter: ApiRateLimiter::new(requests_per_minute),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rate_limiter(&self) -> &ApiRateLimiter {
        &self.rate_limiter
    }

    /// Resolve `path` against the base URL and append the query parameters
    pub fn build_url(&self, path: &str, query: &[(&str, QueryValue)]) -> CollectorResult<Url> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&raw)
            .map_err(|e| CollectorError::Config(format!("invalid URL '{}': {}", raw, e)))?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, &value.render());
            }
        }

        Ok(url)
    }

    /// GET a JSON document
    pub async fn get(&self, path: &str, query: &[(&str, QueryValue)]) -> CollectorResult<Value> {
        let url = self.build_url(path, query)?;
        debug!("{}: GET {}", self.name, url);
        self.send(self.client.get(url)).await
    }

    /// POST a JSON body and read back a JSON document
    pub async fn post_json(&self, path: &str, body: &Value) -> CollectorResult<Value> {
        let url = self.build_url(path, &[])?;
        debug!("{}: POST {}", self.name, url);
        self.send(self.client.post(url).json(body)).await
    }

    async fn send(&self, request: RequestBuilder) -> CollectorResult<Value> {
        let request = request.headers(self.headers.clone());

        let (status, body) = self
            .rate_limiter
            .run(async {
                let response = request.send().await?;
                let status = response.status();
                let body = response.text().await?;
                Ok::<_, CollectorError>((status, body))
            })
            .await
            .map_err(|e| {
                warn!("{}: request failed: {}", self.name, e);
                e
            })?;

        if !status.is_success() {
            warn!("{}: API request failed with status {}", self.name, status);
            return Err(CollectorError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        debug!("{}: response received: {} bytes", self.name, body.len());
        serde_json::from_str(&body).map_err(|e| CollectorError::decode(&self.name, e.to_string()))
    }
}
