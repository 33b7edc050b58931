pub mod cli;

use crate::core::ConfigProvider;
use crate::utils::error::{HarvestError, Result};
use crate::utils::validation::{
    self, validate_date, validate_non_empty_string, validate_path, validate_positive_number,
    validate_range, validate_url,
};
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "report-harvest")]
#[command(
    about = "Fetches paginated async report jobs across long date ranges, with retries and coverage verification"
)]
pub struct CliConfig {
    /// Range start, YYYY-MM-DD
    #[arg(long = "from")]
    pub from_date: String,

    /// Range end (inclusive), YYYY-MM-DD
    #[arg(long = "to")]
    pub to_date: String,

    /// Report type to request (e.g. FINDINGS)
    #[arg(long, default_value = "FINDINGS")]
    pub report_type: String,

    /// Page size for report content fetches
    #[arg(long, default_value = "1000")]
    pub size: usize,

    /// Output directory
    #[arg(long, default_value = "./out")]
    pub out: String,

    /// Report API root
    #[arg(long, default_value = "https://api.veracode.com/appsec/v1/analytics")]
    pub base_url: String,

    /// Path to a JSON object with extra submission filters (merged into the POST body)
    #[arg(long)]
    pub filters: Option<String>,

    /// Pause after submission before polling starts, in seconds
    #[arg(long, default_value = "0.5")]
    pub sleep: f64,

    /// Seconds to wait for report completion
    #[arg(long, default_value = "600")]
    pub poll_timeout: u64,

    /// Polling interval in seconds
    #[arg(long, default_value = "2.0")]
    pub poll_interval: f64,

    /// After paging, reconcile against server totals and fetch missing pages
    #[arg(long)]
    pub verify: bool,

    /// With --verify, exit non-zero on any mismatch or duplicate
    #[arg(long)]
    pub strict: bool,

    /// Unique id field (e.g. finding_id) to check for duplicates
    #[arg(long)]
    pub id_field: Option<String>,

    /// Do not add source_job_id/window_start/window_end to each record
    #[arg(long)]
    pub no_stamp: bool,

    /// Skip the flattened CSV export
    #[arg(long)]
    pub no_csv: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl ConfigProvider for CliConfig {
    fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    fn report_type(&self) -> &str {
        &self.report_type
    }

    fn page_size(&self) -> usize {
        self.size
    }

    fn from_date(&self) -> &str {
        &self.from_date
    }

    fn to_date(&self) -> &str {
        &self.to_date
    }

    fn out_dir(&self) -> &str {
        &self.out
    }

    fn filters_path(&self) -> Option<&str> {
        self.filters.as_deref()
    }

    fn settle_delay_secs(&self) -> f64 {
        self.sleep
    }

    fn poll_timeout_secs(&self) -> u64 {
        self.poll_timeout
    }

    fn poll_interval_secs(&self) -> f64 {
        self.poll_interval
    }

    fn verify(&self) -> bool {
        self.verify
    }

    fn strict(&self) -> bool {
        self.strict
    }

    fn id_field(&self) -> Option<&str> {
        self.id_field.as_deref()
    }

    fn stamp_records(&self) -> bool {
        !self.no_stamp
    }

    fn csv_export(&self) -> bool {
        !self.no_csv
    }
}

impl validation::Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_date("--from", &self.from_date)?;
        validate_date("--to", &self.to_date)?;
        validate_non_empty_string("--report-type", &self.report_type)?;
        validate_positive_number("--size", self.size, 1)?;
        validate_non_empty_string("--out", &self.out)?;
        validate_url("--base-url", &self.base_url)?;
        validate_range("--sleep", self.sleep, 0.0, 3600.0)?;
        validate_positive_number("--poll-timeout", self.poll_timeout as usize, 1)?;
        validate_range("--poll-interval", self.poll_interval, 0.1, 3600.0)?;
        if let Some(path) = &self.filters {
            validate_path("--filters", path)?;
        }
        if let Some(field) = &self.id_field {
            validate_non_empty_string("--id-field", field)?;
        }
        Ok(())
    }
}

/// Reads the API token the transport authenticates with. Refuses to start
/// without it, and warns when only the legacy variable is set.
pub fn check_env() -> Result<String> {
    if std::env::var("REPORT_API_KEY").is_ok() && std::env::var("REPORT_API_TOKEN").is_err() {
        tracing::warn!("legacy REPORT_API_KEY is set; the client reads REPORT_API_TOKEN");
    }
    match std::env::var("REPORT_API_TOKEN") {
        Ok(token) if !token.trim().is_empty() => Ok(token),
        _ => Err(HarvestError::MissingConfigError {
            field: "REPORT_API_TOKEN".to_string(),
        }),
    }
}
