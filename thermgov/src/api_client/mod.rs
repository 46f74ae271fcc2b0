//! HTTP client for the governor API.

pub mod types;

use anyhow::{Context, Result, bail};

use types::{ErrorBody, GovernorStatus, TunableValue, TunableWrite};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7786";

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v0{}", self.base_url, path)
    }

    pub async fn get_status(&self) -> Result<GovernorStatus> {
        let resp = self.http.get(self.url("/status")).send().await?;
        decode(resp).await
    }

    pub async fn get_tunables(&self) -> Result<Vec<TunableValue>> {
        let resp = self.http.get(self.url("/tunables")).send().await?;
        decode(resp).await
    }

    pub async fn get_tunable(&self, name: &str) -> Result<TunableValue> {
        let resp = self
            .http
            .get(self.url(&format!("/tunables/{name}")))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn set_tunable(&self, name: &str, value: &str) -> Result<TunableValue> {
        let resp = self
            .http
            .put(self.url(&format!("/tunables/{name}")))
            .json(&TunableWrite {
                value: value.to_string(),
            })
            .send()
            .await?;
        decode(resp).await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return resp.json().await.context("decoding response body");
    }

    match resp.json::<ErrorBody>().await {
        Ok(body) => bail!("{} ({})", body.error, status),
        Err(_) => bail!("request failed with {status}"),
    }
}
