//! Event sink backed by a remote HTTP event store.
//!
//! Events are POSTed to `/v1/events/{candidate}` and read back from
//! `GET /v1/events/{candidate}?limit=N`, authenticated with a bearer token.

use crate::core::Event;
use crate::sink::{EventSink, SinkError};
use serde::Serialize;

/// Remote event store configuration.
#[derive(Debug, Clone)]
pub struct RemoteSinkConfig {
    /// Store host (default: 127.0.0.1)
    pub host: String,
    pub port: u16,
    /// Bearer authentication token
    pub token: String,
}

impl RemoteSinkConfig {
    pub fn new(host: impl Into<String>, port: u16, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            token: token.into(),
        }
    }

    /// Get the base URL of the store.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Events endpoint for one candidate, with the id as one escaped segment.
    pub fn events_url(&self, candidate_id: &str) -> Result<reqwest::Url, SinkError> {
        let mut url = reqwest::Url::parse(&self.url())
            .map_err(|e| SinkError::Remote(format!("Invalid store URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SinkError::Remote("Store URL cannot take a path".to_string()))?
            .pop_if_empty()
            .extend(["v1", "events", candidate_id]);
        Ok(url)
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.url())
    }
}

/// Envelope sent with every event.
#[derive(Debug, Serialize)]
struct EventEnvelope<'a> {
    station_id: &'a str,
    event: &'a Event,
}

/// Blocking client for the remote store, for use from sync contexts such
/// as the `QueuedSink` worker.
pub struct RemoteSink {
    config: RemoteSinkConfig,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    station_id: String,
}

impl RemoteSink {
    pub fn new(config: RemoteSinkConfig) -> Result<Self, SinkError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SinkError::Remote(format!("Failed to create runtime: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| SinkError::Remote(format!("Failed to create HTTP client: {e}")))?;

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let station_id = format!(
            "station-{}-{}",
            hostname,
            &uuid::Uuid::new_v4().to_string()[..8]
        );

        Ok(Self {
            config,
            client,
            runtime,
            station_id,
        })
    }

    /// Test connection to the store.
    pub fn test_connection(&self) -> Result<bool, SinkError> {
        self.runtime.block_on(async {
            let response = self
                .client
                .get(self.config.health_url())
                .send()
                .await
                .map_err(|e| SinkError::Remote(e.to_string()))?;
            Ok(response.status().is_success())
        })
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }
}

impl EventSink for RemoteSink {
    fn append(&self, candidate_id: &str, event: &Event) -> Result<(), SinkError> {
        let envelope = EventEnvelope {
            station_id: &self.station_id,
            event,
        };

        let url = self.config.events_url(candidate_id)?;
        self.runtime.block_on(async {
            let response = self
                .client
                .post(url)
                .header("Authorization", format!("Bearer {}", self.config.token))
                .json(&envelope)
                .send()
                .await
                .map_err(|e| SinkError::Remote(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(SinkError::Remote(format!("store returned {status}: {message}")));
            }
            Ok(())
        })
    }

    fn query(&self, candidate_id: &str, limit: usize) -> Result<Vec<Event>, SinkError> {
        let url = self.config.events_url(candidate_id)?;
        self.runtime.block_on(async {
            let response = self
                .client
                .get(url)
                .query(&[("limit", limit)])
                .header("Authorization", format!("Bearer {}", self.config.token))
                .send()
                .await
                .map_err(|e| SinkError::Remote(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(SinkError::Remote(format!("store returned {status}")));
            }

            response
                .json::<Vec<Event>>()
                .await
                .map_err(|e| SinkError::Serialization(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_urls() {
        let config = RemoteSinkConfig::new("127.0.0.1", 8080, "test-token");
        assert_eq!(config.url(), "http://127.0.0.1:8080");
        assert_eq!(
            config.events_url("cand 1/a").unwrap().as_str(),
            "http://127.0.0.1:8080/v1/events/cand%201%2Fa"
        );
        assert_eq!(
            config.events_url("cand_1").unwrap().as_str(),
            "http://127.0.0.1:8080/v1/events/cand_1"
        );
        assert_eq!(config.health_url(), "http://127.0.0.1:8080/health");
    }
}
