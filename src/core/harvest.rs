use crate::core::job::JobController;
use crate::core::pages::PageWalker;
use crate::core::sink::RecordSink;
use crate::core::verify::CoverageVerifier;
use crate::core::windows::plan_windows;
use crate::domain::model::{RunSummary, Window};
use crate::domain::ports::{ConfigProvider, Storage, Transport};
use crate::utils::error::{HarvestError, Result};
use crate::utils::validation::validate_date;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::Duration;

/// Drives the whole run: window planning, then per window submit, poll,
/// walk, verify and stamp, strictly in sequence. Any fatal error aborts the
/// run; there is no per-window partial-success continuation.
pub struct HarvestEngine<T: Transport, S: Storage, C: ConfigProvider> {
    transport: T,
    sink: RecordSink<S>,
    config: C,
}

impl<T: Transport, S: Storage, C: ConfigProvider> HarvestEngine<T, S, C> {
    pub fn new(transport: T, storage: S, config: C) -> Self {
        Self {
            transport,
            sink: RecordSink::new(storage),
            config,
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let from = validate_date("--from", self.config.from_date())?;
        let to = validate_date("--to", self.config.to_date())?;
        let extra_filters = self.load_filters()?;

        let windows = plan_windows(from, to)?;
        tracing::info!("🗂️ planned {} window(s)", windows.len());
        for window in &windows {
            tracing::info!("  - {} -> {}", window.start, window.end);
        }

        let jobs = JobController::new(&self.transport, self.config.base_url());
        let verifier = CoverageVerifier::new(&self.transport, self.config.base_url());

        let mut all_items: Vec<Value> = Vec::new();
        let mut grand_total = 0usize;

        for window in &windows {
            tracing::info!("🗂️ === window {} -> {} ===", window.start, window.end);
            let job_id = jobs
                .submit(self.config.report_type(), window, &extra_filters)
                .await?;
            tracing::info!("  📄 report id: {}", job_id);

            let settle = self.config.settle_delay_secs();
            if settle > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(settle)).await;
            }
            jobs.await_ready(
                &job_id,
                Duration::from_secs(self.config.poll_timeout_secs()),
                Duration::from_secs_f64(self.config.poll_interval_secs()),
            )
            .await?;

            let mut walker = PageWalker::new(
                &self.transport,
                self.config.base_url(),
                &job_id,
                self.config.page_size(),
            );
            let mut pages_seen = Vec::new();
            let mut window_items: Vec<Value> = Vec::new();

            while let Some((stamp, items)) = walker.next_page().await? {
                tracing::info!(
                    "    📦 page {}: {} items (window_total={}, grand_total={})",
                    stamp.page_no,
                    stamp.count,
                    window_items.len(),
                    grand_total + window_items.len()
                );
                for item in items {
                    window_items.push(self.stamped(item, &job_id, window));
                }
                pages_seen.push(stamp);
            }

            if self.config.verify() {
                tracing::info!("    🧾 running verification …");
                let before = window_items.len();
                verifier
                    .verify(
                        &job_id,
                        self.config.page_size(),
                        &pages_seen,
                        &mut window_items,
                        self.config.id_field(),
                        self.config.strict(),
                        &self.sink,
                    )
                    .await?;
                // items the verifier recovered still need their provenance
                for index in before..window_items.len() {
                    let item = std::mem::take(&mut window_items[index]);
                    window_items[index] = self.stamped(item, &job_id, window);
                }
            }

            grand_total += window_items.len();
            tracing::info!(
                "  📊 window complete: {} items (grand_total={})",
                window_items.len(),
                grand_total
            );
            all_items.append(&mut window_items);
        }

        let (jsonl, json, csv) = self
            .sink
            .write_records(&all_items, self.config.csv_export())
            .await?;

        let out_dir = self.config.out_dir();
        Ok(RunSummary {
            windows: windows.len(),
            grand_total,
            jsonl_path: join_out(out_dir, &jsonl),
            json_path: join_out(out_dir, &json),
            csv_path: csv.map(|path| join_out(out_dir, &path)),
        })
    }

    /// Tags one record with which job and window produced it.
    fn stamped(&self, mut item: Value, job_id: &str, window: &Window) -> Value {
        if !self.config.stamp_records() {
            return item;
        }
        if let Value::Object(map) = &mut item {
            map.insert("source_job_id".to_string(), json!(job_id));
            map.insert("window_start".to_string(), json!(window.start.to_string()));
            map.insert("window_end".to_string(), json!(window.end.to_string()));
        }
        item
    }

    fn load_filters(&self) -> Result<Map<String, Value>> {
        let Some(path) = self.config.filters_path() else {
            return Ok(Map::new());
        };
        let text = std::fs::read_to_string(path).map_err(|e| HarvestError::InvalidFilters {
            message: format!("reading {}: {}", path, e),
        })?;
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(HarvestError::InvalidFilters {
                message: format!("{} must contain a JSON object", path),
            }),
            Err(e) => Err(HarvestError::InvalidFilters {
                message: format!("parsing {}: {}", path, e),
            }),
        }
    }
}

fn join_out(out_dir: &str, file: &str) -> String {
    Path::new(out_dir).join(file).to_string_lossy().into_owned()
}
