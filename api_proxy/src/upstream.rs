use std::time::Duration;

use async_trait::async_trait;
use common::{
    env_config::UpstreamConfig,
    error::{AppError, Res},
};
use reqwest::{Client, Method};
use serde_json::Value;
use url::Url;

/// One request to a third-party API, relative to its base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamCall {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl UpstreamCall {
    pub fn get(path: &str, query: Vec<(String, String)>) -> Self {
        UpstreamCall {
            method: Method::GET,
            path: path.to_string(),
            query,
            body: None,
        }
    }

    pub fn post(path: &str, body: Value) -> Self {
        UpstreamCall {
            method: Method::POST,
            path: path.to_string(),
            query: Vec::new(),
            body: Some(body),
        }
    }
}

/// A third-party JSON API reached with server-held credentials.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Display name, e.g. `TMDB`. Also namespaces cached lookups.
    fn provider(&self) -> &str;

    /// Returns the upstream body unmodified on success. Non-success statuses
    /// become [`AppError::Upstream`] carrying the upstream status and body.
    async fn call(&self, call: UpstreamCall) -> Res<Value>;
}

/// Where the server credential goes on each request.
#[derive(Debug, Clone, PartialEq)]
pub enum Credential {
    Bearer(String),
    QueryParam { name: &'static str, value: String },
}

pub struct HttpUpstream {
    provider: String,
    base_url: String,
    credential: Credential,
    client: Client,
}

impl HttpUpstream {
    pub fn new(
        provider: &str,
        base_url: &str,
        credential: Credential,
        timeout: Duration,
    ) -> Res<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpUpstream {
            provider: provider.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credential,
            client,
        })
    }

    pub fn openai(config: &UpstreamConfig, timeout: Duration) -> Res<Self> {
        Self::new(
            "OpenAI",
            &config.base_url,
            Credential::Bearer(config.api_key.clone()),
            timeout,
        )
    }

    pub fn tmdb(config: &UpstreamConfig, timeout: Duration) -> Res<Self> {
        Self::new(
            "TMDB",
            &config.base_url,
            Credential::QueryParam {
                name: "api_key",
                value: config.api_key.clone(),
            },
            timeout,
        )
    }

    pub fn google_books(config: &UpstreamConfig, timeout: Duration) -> Res<Self> {
        Self::new(
            "Google Books",
            &config.base_url,
            Credential::QueryParam {
                name: "key",
                value: config.api_key.clone(),
            },
            timeout,
        )
    }

    /// Full request URL without the credential.
    ///
    /// Caller parameters named like the credential parameter are dropped, so the
    /// server key is the only one ever sent.
    pub fn url_for(&self, call: &UpstreamCall) -> Res<Url> {
        let raw = format!("{}/{}", self.base_url, call.path.trim_start_matches('/'));
        let mut url = Url::parse(&raw)
            .map_err(|e| AppError::Internal(format!("Invalid upstream URL {}: {}", raw, e)))?;

        let reserved = match &self.credential {
            Credential::QueryParam { name, .. } => Some(*name),
            Credential::Bearer(_) => None,
        };
        let query: Vec<&(String, String)> = call
            .query
            .iter()
            .filter(|(name, _)| {
                let keep = Some(name.as_str()) != reserved;
                if !keep {
                    log::debug!("Dropping caller-supplied '{}' for {}", name, self.provider);
                }
                keep
            })
            .collect();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn call(&self, call: UpstreamCall) -> Res<Value> {
        let mut url = self.url_for(&call)?;
        let mut request = match &self.credential {
            Credential::Bearer(key) => self.client.request(call.method.clone(), url).bearer_auth(key),
            Credential::QueryParam { name, value } => {
                url.query_pairs_mut().append_pair(name, value);
                self.client.request(call.method.clone(), url)
            }
        };
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            log::error!("{} request to {} failed: {}", self.provider, call.path, e);
            AppError::Reqwest(e.without_url())
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let details = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
            log::warn!(
                "{} responded {} for {}: {}",
                self.provider,
                status.as_u16(),
                call.path,
                details
            );
            return Err(AppError::Upstream {
                provider: self.provider.clone(),
                status: status.as_u16(),
                details,
            });
        }

        response.json::<Value>().await.map_err(|e| {
            log::error!("{} returned an unreadable body for {}: {}", self.provider, call.path, e);
            AppError::Reqwest(e.without_url())
        })
    }
}
