use crate::domain::ports::Transport;
use crate::utils::error::{HarvestError, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// How much of a raw body survives into a diagnostic message.
const RAW_PREFIX_LIMIT: usize = 4096;

/// Backoff schedule for one logical request. The three delay flavours differ
/// in cap and jitter span: a body that fails to parse usually clears fast, a
/// 5xx/network hiccup may need longer, and a 429 obeys the server's own hint
/// when it sends one.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: f64,
    pub parse_cap_secs: f64,
    pub transient_cap_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            backoff_base: 1.2,
            parse_cap_secs: 30.0,
            transient_cap_secs: 60.0,
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32, cap_secs: f64, jitter_span: f64) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..=jitter_span);
        let raw = self.backoff_base.powi(attempt as i32) + jitter;
        Duration::from_secs_f64(raw.min(cap_secs).max(0.0))
    }

    pub fn parse_delay(&self, attempt: u32) -> Duration {
        self.delay(attempt, self.parse_cap_secs, 0.5)
    }

    pub fn transient_delay(&self, attempt: u32) -> Duration {
        self.delay(attempt, self.transient_cap_secs, 0.75)
    }

    /// A server-supplied Retry-After wins verbatim over the computed schedule.
    pub fn rate_limit_delay(&self, attempt: u32, hint_secs: Option<u64>) -> Duration {
        match hint_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.delay(attempt, self.transient_cap_secs, 0.5),
        }
    }
}

/// The single HTTP seam of the pipeline: executes one logical call with
/// failure classification and retry/backoff.
///
/// Classification: 401 fails fast and is never retried; any other 4xx is a
/// hard client error; 429, 5xx, network resets/timeouts and unparseable
/// bodies are transient and retried up to the attempt cap.
pub struct BackoffTransport {
    client: Client,
    policy: RetryPolicy,
    auth_token: Option<String>,
}

impl BackoffTransport {
    pub fn new(auth_token: Option<String>) -> Self {
        Self::with_policy(RetryPolicy::default(), auth_token)
    }

    pub fn with_policy(policy: RetryPolicy, auth_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            policy,
            auth_token,
        }
    }
}

fn truncate_detail(text: &str) -> String {
    if text.len() <= RAW_PREFIX_LIMIT {
        return text.to_string();
    }
    let mut cut = RAW_PREFIX_LIMIT;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &text[..cut])
}

fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

#[async_trait]
impl Transport for BackoffTransport {
    async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let max_attempts = self.policy.max_attempts;
        let mut last_detail = String::new();

        for attempt in 1..=max_attempts {
            let mut req = self.client.request(method.clone(), url);
            if let Some(token) = &self.auth_token {
                req = req.bearer_auth(token);
            }
            if let Some(body) = body {
                req = req.json(body);
            }

            let response = match req.send().await {
                Ok(response) => response,
                Err(e) => {
                    last_detail = format!("network error: {}", e);
                    if attempt < max_attempts {
                        let delay = self.policy.transient_delay(attempt);
                        tracing::warn!(
                            "network error (attempt {}/{}); retrying in {:.1}s: {}",
                            attempt,
                            max_attempts,
                            delay.as_secs_f64(),
                            e
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                let detail = response.text().await.unwrap_or_default();
                return Err(HarvestError::Unauthorized {
                    detail: format!(
                        "verify REPORT_API_TOKEN and tenant access. {}",
                        truncate_detail(&detail)
                    ),
                });
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let hint = retry_after_secs(&response);
                last_detail = format!("429 rate limited from {}", url);
                if attempt < max_attempts {
                    let delay = self.policy.rate_limit_delay(attempt, hint);
                    tracing::warn!(
                        "429 rate limited (attempt {}/{}); retrying in {:.1}s",
                        attempt,
                        max_attempts,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                break;
            }

            if status.is_server_error() {
                last_detail = format!("HTTP {} from {}", status.as_u16(), url);
                if attempt < max_attempts {
                    let delay = self.policy.transient_delay(attempt);
                    tracing::warn!(
                        "HTTP {} (attempt {}/{}); retrying in {:.1}s",
                        status.as_u16(),
                        attempt,
                        max_attempts,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                break;
            }

            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(HarvestError::ClientError {
                    status: status.as_u16(),
                    detail: truncate_detail(&detail),
                });
            }

            // A reset mid-body is the same transient class as a failed connect.
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    last_detail = format!("error reading body: {}", e);
                    if attempt < max_attempts {
                        let delay = self.policy.transient_delay(attempt);
                        tracing::warn!(
                            "error reading body (attempt {}/{}); retrying in {:.1}s: {}",
                            attempt,
                            max_attempts,
                            delay.as_secs_f64(),
                            e
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    break;
                }
            };

            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(Value::Null);
            }

            match serde_json::from_str(trimmed) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt < max_attempts {
                        let delay = self.policy.parse_delay(attempt);
                        tracing::warn!(
                            "JSON parse error (attempt {}/{}); retrying in {:.1}s",
                            attempt,
                            max_attempts,
                            delay.as_secs_f64()
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(HarvestError::MalformedResponse {
                        url: url.to_string(),
                        detail: format!("{}; raw prefix: {}", e, truncate_detail(trimmed)),
                    });
                }
            }
        }

        Err(HarvestError::ExhaustedRetries {
            attempts: max_attempts,
            detail: last_detail,
        })
    }
}
