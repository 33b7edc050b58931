use crate::domain::model::{JobStatus, Window};
use crate::domain::ports::Transport;
use crate::utils::error::{HarvestError, Result};
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::time::Instant;

/// Submits one report-generation job per window and polls it to completion.
pub struct JobController<'a, T: Transport> {
    transport: &'a T,
    base_url: &'a str,
}

impl<'a, T: Transport> JobController<'a, T> {
    pub fn new(transport: &'a T, base_url: &'a str) -> Self {
        Self {
            transport,
            base_url,
        }
    }

    fn submit_url(&self) -> String {
        format!("{}/reports", self.base_url)
    }

    fn meta_url(&self, job_id: &str) -> String {
        format!("{}/reports/{}", self.base_url, job_id)
    }

    /// Submits a report job covering `window` and returns the server-assigned
    /// job id.
    ///
    /// The body deliberately carries no "status" filter unless the caller's
    /// extra filters set one: the API treats an absent status as "all states"
    /// (open, closed and mitigated), and narrowing by default would silently
    /// drop records.
    pub async fn submit(
        &self,
        report_type: &str,
        window: &Window,
        extra_filters: &Map<String, Value>,
    ) -> Result<String> {
        let mut body = Map::new();
        body.insert("report_type".to_string(), json!(report_type));
        body.insert(
            "last_updated_start_date".to_string(),
            json!(format!("{} 00:00:00", window.start)),
        );
        body.insert(
            "last_updated_end_date".to_string(),
            json!(format!("{} 23:59:59", window.end)),
        );
        for (key, value) in extra_filters {
            body.insert(key.clone(), value.clone());
        }

        let url = self.submit_url();
        let response = self
            .transport
            .request(Method::POST, &url, Some(&Value::Object(body)))
            .await?;

        extract_job_id(&response).ok_or_else(|| HarvestError::MalformedResponse {
            url,
            detail: format!("submission returned no job id: {}", response),
        })
    }

    /// Polls the job until it reaches a terminal state, logging only on
    /// status transitions. Fails with [`HarvestError::JobTimeout`] once the
    /// wait budget elapses; a stuck job is not retried.
    pub async fn await_ready(
        &self,
        job_id: &str,
        max_wait: Duration,
        interval: Duration,
    ) -> Result<()> {
        let url = self.meta_url(job_id);
        let deadline = Instant::now() + max_wait;
        let mut last_seen: Option<JobStatus> = None;

        while Instant::now() < deadline {
            let meta = self.transport.request(Method::GET, &url, None).await?;
            let status = current_status(&meta);
            if last_seen != Some(status) {
                tracing::info!("  {} status: {}", status.icon(), status.as_str());
                last_seen = Some(status);
            }
            if is_completed(&meta) {
                return Ok(());
            }
            tokio::time::sleep(interval).await;
        }

        Err(HarvestError::JobTimeout {
            job_id: job_id.to_string(),
            waited_secs: max_wait.as_secs(),
        })
    }
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Job id lives either at the top level or one level down under `_embedded`.
pub(crate) fn extract_job_id(response: &Value) -> Option<String> {
    response.get("id").and_then(id_to_string).or_else(|| {
        response
            .get("_embedded")
            .and_then(|e| e.get("id"))
            .and_then(id_to_string)
    })
}

/// Reads the status string from either nesting location; missing or
/// unrecognized strings map to [`JobStatus::Unknown`].
pub(crate) fn current_status(meta: &Value) -> JobStatus {
    let raw = meta
        .get("status")
        .and_then(Value::as_str)
        .or_else(|| {
            meta.get("_embedded")
                .and_then(|e| e.get("status"))
                .and_then(Value::as_str)
        })
        .unwrap_or("");
    JobStatus::parse(raw)
}

/// Completion is a predicate over the whole payload, not a single field: the
/// server populates the status string and the completion timestamp
/// inconsistently, so either signal is accepted as terminal.
pub(crate) fn is_completed(meta: &Value) -> bool {
    if current_status(meta) == JobStatus::Completed {
        return true;
    }
    let stamp = meta.get("date_report_completed").or_else(|| {
        meta.get("_embedded")
            .and_then(|e| e.get("date_report_completed"))
    });
    match stamp {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}
