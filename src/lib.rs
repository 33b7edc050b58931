pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::{cli::LocalStorage, CliConfig};
pub use core::harvest::HarvestEngine;
pub use core::sink::RecordSink;
pub use core::transport::{BackoffTransport, RetryPolicy};
pub use utils::error::{HarvestError, Result};
