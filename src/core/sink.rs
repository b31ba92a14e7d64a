//! Measurement sink — newline-delimited JSON tables under a data directory.
//!
//! Shares the rotating-writer shape from `diagnostics::RotatingLogger` across
//! three named tables (`<probe-kind>.jsonl`, `reports.jsonl`,
//! `notifications.jsonl`), fed by one `mpsc` channel so probe tasks and the
//! notifier dispatcher never block on disk I/O.

use crate::core::model::{AttributeMap, MeasurementRow};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "table")]
enum SinkRow {
    #[serde(rename = "measurement")]
    Measurement {
        probe_kind: String,
        at_unix: i64,
        subject: String,
        row: BTreeMap<String, Value>,
        attributes: BTreeMap<String, Value>,
    },
    #[serde(rename = "report")]
    Report {
        probe_kind: String,
        subject: String,
        at_unix: i64,
        healthy: bool,
        reasons: Vec<String>,
    },
    #[serde(rename = "notification")]
    Notification { notifier: String, at_unix: i64, text: String },
}

impl SinkRow {
    fn file_name(&self) -> String {
        match self {
            SinkRow::Measurement { probe_kind, .. } => format!("{probe_kind}.jsonl"),
            SinkRow::Report { .. } => "reports.jsonl".to_string(),
            SinkRow::Notification { .. } => "notifications.jsonl".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct MeasurementSink {
    tx: mpsc::Sender<SinkRow>,
}

impl MeasurementSink {
    /// Spawn the writer task and return a cheap-to-clone handle.
    pub fn spawn(data_dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::channel::<SinkRow>(1024);
        tokio::spawn(async move {
            if let Err(err) = tokio::fs::create_dir_all(&data_dir).await {
                eprintln!("measurement sink: failed to create {data_dir:?}: {err}");
                return;
            }
            while let Some(row) = rx.recv().await {
                let path = data_dir.join(row.file_name());
                let line = match serde_json::to_string(&row) {
                    Ok(l) => l,
                    Err(_) => continue,
                };
                if let Err(err) = append_line(&path, &line).await {
                    eprintln!("measurement sink: failed to write {path:?}: {err}");
                }
            }
        });
        Self { tx }
    }

    pub async fn record_measurement(
        &self,
        probe_kind: &str,
        subject: &str,
        at_unix: i64,
        row: &MeasurementRow,
        attributes: &AttributeMap,
    ) {
        let row = row
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(Value::Null)))
            .collect();
        let attributes = attributes
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(Value::Null)))
            .collect();
        let _ = self
            .tx
            .send(SinkRow::Measurement {
                probe_kind: probe_kind.to_string(),
                at_unix,
                subject: subject.to_string(),
                row,
                attributes,
            })
            .await;
    }

    pub async fn record_report(&self, probe_kind: &str, subject: &str, at_unix: i64, healthy: bool, reasons: Vec<String>) {
        let _ = self
            .tx
            .send(SinkRow::Report {
                probe_kind: probe_kind.to_string(),
                subject: subject.to_string(),
                at_unix,
                healthy,
                reasons,
            })
            .await;
    }

    pub async fn record_notification(&self, notifier: &str, at_unix: i64, text: String) {
        let _ = self
            .tx
            .send(SinkRow::Notification {
                notifier: notifier.to_string(),
                at_unix,
                text,
            })
            .await;
    }
}

async fn append_line(path: &std::path::Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Scalar;

    #[tokio::test]
    async fn measurement_lands_in_its_own_table() {
        let dir = std::env::temp_dir().join(format!("simplomon-sink-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let sink = MeasurementSink::spawn(dir.clone());
        let row: MeasurementRow = BTreeMap::from([("msec".to_string(), Scalar::Int(42))]);
        let attributes = AttributeMap::new();
        sink.record_measurement("dns", "example.com", 100, &row, &attributes).await;
        drop(sink);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let contents = tokio::fs::read_to_string(dir.join("dns.jsonl")).await.unwrap();
        assert!(contents.contains("\"probe_kind\":\"dns\""));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
