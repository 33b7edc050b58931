use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV export error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("401 Unauthorized: {detail}")]
    Unauthorized { detail: String },

    #[error("API rejected request with HTTP {status}: {detail}")]
    ClientError { status: u16, detail: String },

    #[error("giving up after {attempts} attempt(s): {detail}")]
    ExhaustedRetries { attempts: u32, detail: String },

    #[error("malformed response from {url}: {detail}")]
    MalformedResponse { url: String, detail: String },

    #[error("report {job_id} not ready within {waited_secs}s")]
    JobTimeout { job_id: String, waited_secs: u64 },

    #[error("invalid date range: {message}")]
    InvalidRange { message: String },

    #[error("invalid filters: {message}")]
    InvalidFilters { message: String },

    #[error("verification failed for report {job_id}: {message}")]
    VerificationFailed { job_id: String, message: String },

    #[error("invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("missing required configuration: {field}")]
    MissingConfigError { field: String },
}

pub type Result<T> = std::result::Result<T, HarvestError>;
