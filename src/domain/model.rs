use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One bounded date sub-range of the requested report interval. The report API
/// rejects ranges wider than the window cap, so a run is driven window by window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    /// Inclusive number of days covered by the window.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Observed state of a server-side report job. Anything the server reports that
/// we do not recognize maps to `Unknown`, which is non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Submitted,
    Processing,
    Completed,
    Unknown,
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "SUBMITTED" => JobStatus::Submitted,
            "PROCESSING" => JobStatus::Processing,
            "COMPLETED" => JobStatus::Completed,
            _ => JobStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "⏳",
            JobStatus::Processing => "🔄",
            JobStatus::Completed => "✅",
            JobStatus::Unknown => "❓",
        }
    }
}

/// Pagination metadata as reported by the server. Every field is optional
/// because the remote representation is inconsistent across calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub number: Option<u64>,
    pub total_pages: Option<u64>,
    pub size: Option<u64>,
    pub total_elements: Option<u64>,
}

impl PageMeta {
    /// Copies fields from `other` into slots still unset here. First-seen
    /// values win, so a page that reported a total early cannot be clobbered
    /// by a later page that reports nothing or something else.
    pub fn fill_missing(&mut self, other: &PageMeta) {
        if self.number.is_none() {
            self.number = other.number;
        }
        if self.total_pages.is_none() {
            self.total_pages = other.total_pages;
        }
        if self.size.is_none() {
            self.size = other.size;
        }
        if self.total_elements.is_none() {
            self.total_elements = other.total_elements;
        }
    }
}

/// Per-page provenance emitted by the walker before its items are consumed.
#[derive(Debug, Clone)]
pub struct PageStamp {
    pub page_no: u64,
    pub count: usize,
    pub meta: PageMeta,
}

/// Durable per-window reconciliation summary, written once per job and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audit {
    pub job_id: String,
    pub page_indexes_seen: Vec<u64>,
    pub pages_seen_count: usize,
    pub total_pages_reported: Option<u64>,
    pub total_elements_reported: Option<u64>,
    pub collected_count_after_verify: usize,
    pub id_field: Option<String>,
    pub duplicate_id_count: Option<usize>,
    pub verification_passed: bool,
}

/// What a completed run produced, for the final milestone output.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub windows: usize,
    pub grand_total: usize,
    pub jsonl_path: String,
    pub json_path: String,
    pub csv_path: Option<String>,
}
