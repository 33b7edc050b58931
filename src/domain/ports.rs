use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

/// One logical HTTP call against the report API. Submission, polling and page
/// fetches all go through this single seam; the production implementation
/// absorbs transient failures behind retry/backoff, so callers only ever see
/// a parsed JSON value or a fatal error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value>;
}

/// Persists run artifacts. Paths are relative to the store's root.
pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Decouples the engine from the concrete CLI parser.
pub trait ConfigProvider: Send + Sync {
    fn base_url(&self) -> &str;
    fn report_type(&self) -> &str;
    fn page_size(&self) -> usize;
    fn from_date(&self) -> &str;
    fn to_date(&self) -> &str;
    fn out_dir(&self) -> &str;
    fn filters_path(&self) -> Option<&str>;
    fn settle_delay_secs(&self) -> f64;
    fn poll_timeout_secs(&self) -> u64;
    fn poll_interval_secs(&self) -> f64;
    fn verify(&self) -> bool;
    fn strict(&self) -> bool;
    fn id_field(&self) -> Option<&str>;
    fn stamp_records(&self) -> bool;
    fn csv_export(&self) -> bool;
}
