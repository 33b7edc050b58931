use crate::domain::model::Audit;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub const JSONL_FILE: &str = "report_all.jsonl";
pub const JSON_FILE: &str = "report_all.json";
pub const CSV_FILE: &str = "report_all.csv";

/// Persists the run artifacts: stamped records as JSONL and a JSON array,
/// one audit document per window, and an optional flattened CSV export.
pub struct RecordSink<S: Storage> {
    storage: S,
}

impl<S: Storage> RecordSink<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub async fn write_audit(&self, audit: &Audit) -> Result<()> {
        let path = format!("audit/audit_{}.json", audit.job_id);
        let data = serde_json::to_vec_pretty(audit)?;
        self.storage.write_file(&path, &data).await
    }

    /// Writes all record files for the run. Returns the relative paths of
    /// the JSONL and JSON artifacts plus the CSV one when requested.
    pub async fn write_records(
        &self,
        records: &[Value],
        csv_export: bool,
    ) -> Result<(String, String, Option<String>)> {
        let mut jsonl = Vec::new();
        for record in records {
            serde_json::to_writer(&mut jsonl, record)?;
            jsonl.push(b'\n');
        }
        self.storage.write_file(JSONL_FILE, &jsonl).await?;

        let json = serde_json::to_vec_pretty(&records)?;
        self.storage.write_file(JSON_FILE, &json).await?;

        let csv_path = if csv_export {
            let data = render_csv(records)?;
            self.storage.write_file(CSV_FILE, &data).await?;
            Some(CSV_FILE.to_string())
        } else {
            None
        };

        Ok((JSONL_FILE.to_string(), JSON_FILE.to_string(), csv_path))
    }
}

/// Flattens one record into dotted column names. Arrays stay JSON-encoded in
/// a single cell; scalars render as their bare text.
fn flatten_record(record: &Value) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    flatten_into(&mut flat, "", record);
    flat
}

fn flatten_into(out: &mut BTreeMap<String, String>, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let column = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(out, &column, nested);
            }
        }
        Value::Array(_) => {
            out.insert(prefix.to_string(), value.to_string());
        }
        Value::Null => {
            out.insert(prefix.to_string(), String::new());
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

fn render_csv(records: &[Value]) -> Result<Vec<u8>> {
    let rows: Vec<BTreeMap<String, String>> = records
        .iter()
        .filter(|r| r.is_object())
        .map(flatten_record)
        .collect();

    // columns are the sorted union of keys so every row lines up
    let columns: BTreeSet<&String> = rows.iter().flat_map(|row| row.keys()).collect();
    if columns.is_empty() {
        return Ok(Vec::new());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns.iter().map(|c| c.as_str()))?;
    for row in &rows {
        writer.write_record(
            columns
                .iter()
                .map(|column| row.get(*column).map(String::as_str).unwrap_or("")),
        )?;
    }
    writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e).into())
}
