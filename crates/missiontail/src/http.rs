//! HTTP counter source.

use missiontail_core::config::CounterConfig;
use missiontail_core::convergence::{CounterFuture, CounterSource};
use missiontail_core::error::CounterError;
use missiontail_core::payload::extract_counter;

/// Reads the counter from the service payload for one identifier.
#[derive(Debug, Clone)]
pub struct HttpCounterSource {
    client: reqwest::Client,
    url: String,
    counter: CounterConfig,
}

impl HttpCounterSource {
    pub fn new(counter: &CounterConfig, identifier: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(counter.timeout())
            .user_agent(concat!("missiontail/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: counter.url_for(identifier),
            counter: counter.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_text(&self) -> Result<String, CounterError> {
        let network = |e: reqwest::Error| CounterError::Network(e.to_string());
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(network)?
            .error_for_status()
            .map_err(network)?;
        let body = response.bytes().await.map_err(network)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

impl CounterSource for HttpCounterSource {
    fn fetch(&self) -> CounterFuture<'_> {
        Box::pin(async move {
            let text = self.fetch_text().await?;
            let value = extract_counter(&text, &self.counter)?;
            tracing::debug!(url = %self.url, value, "Fetched counter");
            Ok(value)
        })
    }
}
