pub mod harvest;
pub mod job;
pub mod pages;
pub mod sink;
pub mod transport;
pub mod verify;
pub mod windows;

pub use crate::domain::model::{Audit, JobStatus, PageMeta, PageStamp, RunSummary, Window};
pub use crate::domain::ports::{ConfigProvider, Storage, Transport};
pub use crate::utils::error::Result;
