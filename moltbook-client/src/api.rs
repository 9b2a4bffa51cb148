use crate::metrics::{ApiMetrics, MetricsCollector, RequestMetrics};
use crate::pacing::{PacerConfig, RequestPacer};
use moltscrape_core::{ApiError, ClientConfig, CoreError};
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// HTTP client for the Moltbook API.
///
/// Every call is paced by a fixed pre-request delay and made exactly once:
/// there is no retry policy. Transport failures surface as typed errors that
/// the harvest loop treats as an empty page.
#[derive(Debug)]
pub struct MoltbookClient {
    http_client: Client,
    pacer: RequestPacer,
    metrics: MetricsCollector,
    base_url: String,
    api_key: Option<String>,
}

impl MoltbookClient {
    pub fn new(config: ClientConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        let pacer = RequestPacer::new(PacerConfig {
            delay: config.request_delay,
        });

        Ok(Self {
            http_client,
            pacer,
            metrics: MetricsCollector::new(),
            base_url: config.base_url,
            api_key: config.api_key,
        })
    }

    /// Fetch one page of posts, from the global feed when `submolt` is None
    /// or from `submolts/{name}/feed` otherwise. Returns the raw item
    /// payloads in API order.
    pub async fn get_posts(
        &self,
        submolt: Option<&str>,
        sort: &str,
        limit: u32,
    ) -> Result<Vec<Value>, CoreError> {
        let endpoint = match submolt {
            Some(name) => format!("submolts/{name}/feed"),
            None => "posts".to_string(),
        };
        let limit_str = limit.to_string();
        let params = [("sort", sort), ("limit", limit_str.as_str())];

        let body = self.make_request(&endpoint, &params).await?;
        Ok(extract_items(&endpoint, body))
    }

    async fn make_request(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, CoreError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let start_time = Instant::now();

        self.pacer.wait().await;
        debug!(endpoint, "Making Moltbook API request");

        let mut request_builder = self.http_client.get(&url).query(params);
        if let Some(key) = &self.api_key {
            request_builder = request_builder.bearer_auth(key);
        }

        let result = request_builder.send().await;

        let (status_code, timed_out, outcome) = match result {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    match response.json::<Value>().await {
                        Ok(body) => (Some(status.as_u16()), false, Ok(body)),
                        Err(e) => {
                            error!(endpoint, error = %e, "Failed to parse response body");
                            (
                                Some(status.as_u16()),
                                false,
                                Err(ApiError::InvalidResponse {
                                    details: e.to_string(),
                                }),
                            )
                        }
                    }
                } else {
                    error!(endpoint, status = status.as_u16(), "Request failed");
                    (
                        Some(status.as_u16()),
                        false,
                        Err(ApiError::ErrorStatus {
                            status_code: status.as_u16(),
                            endpoint: endpoint.to_string(),
                        }),
                    )
                }
            }
            Err(e) => {
                error!(endpoint, error = %e, "Network error");
                if e.is_timeout() {
                    (None, true, Err(ApiError::RequestTimeout))
                } else {
                    (
                        None,
                        false,
                        Err(ApiError::InvalidResponse {
                            details: e.to_string(),
                        }),
                    )
                }
            }
        };

        self.metrics
            .record_request(RequestMetrics {
                endpoint: endpoint.to_string(),
                status_code,
                response_time: start_time.elapsed(),
                success: outcome.is_ok(),
                timed_out,
            })
            .await;

        outcome.map_err(CoreError::from)
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.get_metrics().await
    }

    pub async fn reset_metrics(&self) {
        self.metrics.reset_metrics().await;
    }

    pub fn request_delay(&self) -> Duration {
        self.pacer.delay()
    }
}

/// Normalize the three recognized response shapes to an ordered item list:
/// `{"success": true, "posts": [...]}`, a bare array, or `{"data": [...]}`.
/// Anything else is logged and handled as an empty page.
pub fn extract_items(endpoint: &str, body: Value) -> Vec<Value> {
    if body.get("success").and_then(Value::as_bool) == Some(true) {
        if let Some(posts) = body.get("posts").and_then(Value::as_array) {
            return posts.clone();
        }
    }

    match body {
        Value::Array(items) => items,
        Value::Object(ref map) => match map.get("data") {
            Some(Value::Array(items)) => items.clone(),
            _ => {
                let keys: Vec<&String> = map.keys().collect();
                warn!(endpoint, ?keys, "Unexpected response shape");
                Vec::new()
            }
        },
        other => {
            warn!(endpoint, body_type = ?other, "Unexpected response shape");
            Vec::new()
        }
    }
}
