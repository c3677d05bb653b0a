//! HTTP client for the USDA MARS API

use chrono::NaiveDate;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::MarsConfig;
use crate::error::{FetchError, IngestError, ParseError, Result};
use crate::record::ReportMetadata;

/// `{"results": [...]}` wrapper used by every MARS endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    results: Vec<T>,
}

/// One failed attempt, with the server's requested wait if it sent one
struct FailedAttempt {
    error: FetchError,
    retry_after: Option<Duration>,
}

/// Authenticated MARS client with bounded retries
pub struct MarsClient {
    client: Client,
    config: MarsConfig,
    api_key: String,
}

impl MarsClient {
    /// Create a client; fails when the config is invalid or has no API key
    pub fn new(config: MarsConfig) -> Result<Self> {
        config.validate()?;
        let api_key = config.require_api_key()?.to_string();

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("livestock-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn config(&self) -> &MarsConfig {
        &self.config
    }

    /// List every published report for the configured slug
    pub async fn list_reports(&self) -> Result<Vec<ReportMetadata>> {
        let url = self.report_url(None)?;
        info!(slug_id = %self.config.slug_id, "Fetching report metadata");

        let envelope: Envelope<ReportMetadata> = self.get_json(&url).await?;
        debug!(reports = envelope.results.len(), "Report metadata received");

        Ok(envelope.results)
    }

    /// Fetch the items of one section for the report ending on `report_end_date`
    pub async fn fetch_section(
        &self,
        section: &str,
        report_end_date: NaiveDate,
    ) -> Result<Vec<Map<String, Value>>> {
        let mut url = self.report_url(Some(section))?;
        url.query_pairs_mut().append_pair(
            "q",
            &format!("report_end_date={}", report_end_date.format("%m/%d/%Y")),
        );

        let envelope: Envelope<Value> = self.get_json(&url).await?;

        envelope
            .results
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(map),
                other => Err(IngestError::from(ParseError::new(
                    format!("{} item {}", section, i),
                    format!("expected a JSON object, found {}", json_kind(&other)),
                ))),
            })
            .collect()
    }

    /// `{base}/services/{version}/reports/{slug_id}[/{section}]`
    ///
    /// Segments are percent-encoded, so section names with spaces are safe.
    pub fn report_url(&self, section: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.config.reports_url())
            .map_err(|e| IngestError::Config(format!("Invalid MARS base URL: {}", e)))?;

        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| IngestError::Config("MARS base URL cannot be a base".to_string()))?;
            segments.pop_if_empty().push(&self.config.slug_id);
            if let Some(section) = section {
                segments.push(section);
            }
        }

        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let body = self.get_with_retry(url).await?;
        serde_json::from_slice(&body)
            .map_err(|e| IngestError::from(ParseError::new(url.as_str(), e)))
    }

    /// GET with retry on transient failures
    ///
    /// Attempt `n` failing transiently waits `base * 2^(n-1)` (capped), or the
    /// server's `Retry-After` when it sent one.
    async fn get_with_retry(&self, url: &Url) -> std::result::Result<Vec<u8>, FetchError> {
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 1;

        loop {
            let failure = match self.get_once(url).await {
                Ok(body) => return Ok(body),
                Err(failure) => failure,
            };

            if !failure.error.is_retriable() || attempt >= max_attempts {
                warn!(
                    url = %url,
                    attempt,
                    error = %failure.error,
                    "Request failed, giving up"
                );
                return Err(failure.error);
            }

            let delay = failure
                .retry_after
                .map(|d| d.min(self.config.retry_max_delay()))
                .unwrap_or_else(|| self.backoff(attempt));

            warn!(
                url = %url,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure.error,
                "Request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn get_once(&self, url: &Url) -> std::result::Result<Vec<u8>, FailedAttempt> {
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(url.clone())
            .basic_auth(&self.api_key, Some(""))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FailedAttempt {
                error: FetchError::transport(url.as_str(), &e),
                retry_after: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(&response);
            let reason = status.canonical_reason().unwrap_or("unexpected status").to_string();
            return Err(FailedAttempt {
                error: FetchError::http(url.as_str(), status, reason),
                retry_after,
            });
        }

        let body = response.bytes().await.map_err(|e| FailedAttempt {
            error: FetchError::transport(url.as_str(), &e),
            retry_after: None,
        })?;

        Ok(body.to_vec())
    }

    /// Backoff before retrying after failed attempt number `attempt` (1-based)
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.config
            .retry_base_delay()
            .saturating_mul(factor)
            .min(self.config.retry_max_delay())
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn client(config: MarsConfig) -> MarsClient {
        MarsClient::new(config.with_api_key("test-key")).unwrap()
    }

    #[test]
    fn test_new_requires_api_key() {
        assert!(matches!(
            MarsClient::new(MarsConfig::default()),
            Err(IngestError::Config(_))
        ));
    }

    #[test]
    fn test_report_url_encodes_section_names() {
        let client = client(MarsConfig::default().with_base_url("http://localhost:1234"));

        let url = client.report_url(None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:1234/services/v1.2/reports/3658");

        let url = client.report_url(Some("Report FIS Cattle")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:1234/services/v1.2/reports/3658/Report%20FIS%20Cattle"
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let client = client(
            MarsConfig::default()
                .with_retry_delays(Duration::from_millis(100), Duration::from_millis(350)),
        );

        assert_eq!(client.backoff(1), Duration::from_millis(100));
        assert_eq!(client.backoff(2), Duration::from_millis(200));
        assert_eq!(client.backoff(3), Duration::from_millis(350));
        assert_eq!(client.backoff(40), Duration::from_millis(350));
    }
}
