//! HTTP implementations of the fetch interfaces.
//!
//! One reqwest client is reused across requests; responses are parsed
//! through the boundary layer in [`super::wire`] so loosely-shaped payloads
//! become typed values or get dropped entry-by-entry.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{instrument, trace};

use super::wire;
use super::{AlertLogSource, Baseline, BaselineSource, EnvSource, HistorySource, LivenessSource};
use crate::error::{EngineError, EngineResult};
use crate::{AlertLogEntry, EnvSample, LivenessRecord, Sample};

/// Client for the telemetry backend's JSON API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into(),
            token,
        }
    }

    async fn get_json(&self, path: &str) -> EngineResult<Value> {
        let url = format!("{}/{path}", self.base_url.trim_end_matches('/'));
        trace!("requesting {url}");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.header("X-MONITORING-SECRET", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::FetchFailed(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            return Err(EngineError::FetchFailed(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::FetchFailed(format!("{url}: invalid JSON body: {e}")))
    }

    async fn get_array(&self, path: &str) -> EngineResult<Vec<Value>> {
        match self.get_json(path).await? {
            Value::Array(values) => Ok(values),
            other => Err(EngineError::FetchFailed(format!(
                "{path}: expected a JSON array, got {other}"
            ))),
        }
    }
}

#[async_trait]
impl BaselineSource for HttpBackend {
    #[instrument(skip(self))]
    async fn fetch_baseline(&self, building_id: &str) -> EngineResult<Baseline> {
        let body = self
            .get_json(&format!("buildings/{building_id}/baseline"))
            .await?;
        wire::parse_baseline(&body)
    }
}

#[async_trait]
impl LivenessSource for HttpBackend {
    #[instrument(skip(self))]
    async fn fetch_liveness(&self, building_id: &str) -> EngineResult<Vec<LivenessRecord>> {
        let values = self
            .get_array(&format!("buildings/{building_id}/liveness"))
            .await?;
        Ok(wire::parse_liveness(&values))
    }
}

#[async_trait]
impl HistorySource for HttpBackend {
    #[instrument(skip(self))]
    async fn query_range(
        &self,
        door_num: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<Vec<Sample>> {
        let values = self
            .get_array(&format!(
                "nodes/{door_num}/samples?from={}&to={}",
                from.timestamp_millis(),
                to.timestamp_millis()
            ))
            .await?;
        let mut samples = wire::parse_samples(&values);
        // transforms need ascending order; the backend usually complies but
        // is not trusted to
        samples.sort_by_key(|s| s.timestamp);
        Ok(samples)
    }
}

#[async_trait]
impl AlertLogSource for HttpBackend {
    #[instrument(skip(self))]
    async fn query_alerts(
        &self,
        building_id: &str,
        limit: usize,
    ) -> EngineResult<Vec<AlertLogEntry>> {
        let values = self
            .get_array(&format!("buildings/{building_id}/alerts?limit={limit}"))
            .await?;
        Ok(wire::parse_alerts(&values))
    }
}

#[async_trait]
impl EnvSource for HttpBackend {
    #[instrument(skip(self))]
    async fn fetch_env(&self, building_id: &str) -> EngineResult<EnvSample> {
        let body = self
            .get_json(&format!("buildings/{building_id}/environment"))
            .await?;
        wire::parse_env(&body)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn baseline_fetch_parses_the_payload() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/buildings/b-1/baseline"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "nodes": [
                    { "doorNum": 1, "gatewayId": "gw-1" },
                    { "doorNum": 2 },
                ],
                "gateways": [
                    { "serialNumber": "gw-1", "zone": "crane side", "alive": true },
                ],
                "thresholds": { "caution": 0.2, "warning": 0.4, "danger": 0.6 },
            })))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(server.uri(), None);
        let baseline = backend.fetch_baseline("b-1").await.unwrap();

        assert_eq!(baseline.nodes.len(), 2);
        assert_eq!(baseline.gateways[0].zone_label, "crane side");
        assert_eq!(baseline.thresholds.caution(), 0.2);
    }

    #[tokio::test]
    async fn http_error_becomes_fetch_failed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/buildings/b-1/liveness"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(server.uri(), None);
        assert_matches!(
            backend.fetch_liveness("b-1").await,
            Err(EngineError::FetchFailed(_))
        );
    }

    #[tokio::test]
    async fn unreachable_backend_becomes_fetch_failed() {
        let backend = HttpBackend::new("http://127.0.0.1:9", None);
        assert_matches!(
            backend.fetch_env("b-1").await,
            Err(EngineError::FetchFailed(_))
        );
    }

    #[tokio::test]
    async fn malformed_liveness_entries_are_dropped_individually() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/buildings/b-1/liveness"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "nodeId": 1, "alive": true, "recording": true },
                { "alive": true, "recording": true },
                { "nodeId": "2", "alive": "1", "recording": 0 },
            ])))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(server.uri(), None);
        let records = backend.fetch_liveness("b-1").await.unwrap();

        assert_eq!(records.len(), 2);
        assert!(records[0].recording);
        assert!(!records[1].recording);
    }

    #[tokio::test]
    async fn secret_header_is_attached_when_configured() {
        use wiremock::matchers::header;

        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/buildings/b-1/environment"))
            .and(header("X-MONITORING-SECRET", "hunter2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "windSpeed": 7.5 })),
            )
            .mount(&server)
            .await;

        let backend = HttpBackend::new(server.uri(), Some("hunter2".to_string()));
        let env = backend.fetch_env("b-1").await.unwrap();
        assert_eq!(env.wind_speed, 7.5);
    }

    #[tokio::test]
    async fn history_samples_are_returned_ascending() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "doorNum": 1, "timestamp": 2000, "axisX": 0.2, "axisY": 0.0 },
                { "doorNum": 1, "timestamp": 1000, "axisX": 0.1, "axisY": 0.0 },
            ])))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(server.uri(), None);
        let samples = backend
            .query_range(1, Utc::now() - chrono::Duration::hours(1), Utc::now())
            .await
            .unwrap();

        assert_eq!(samples.len(), 2);
        assert!(samples[0].timestamp < samples[1].timestamp);
    }
}
