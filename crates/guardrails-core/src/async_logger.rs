use chrono::Utc;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// In-process FIFO queue drained by a single task, appending one JSON line per
/// record to `<log_dir>/detection_YYYYMMDD.jsonl` (§4.8), grounded on
/// `async_logger.py`. Flushes on every record (immediate-write mode).
pub struct AsyncDetectionLogger {
    sender: mpsc::UnboundedSender<Value>,
    writer: JoinHandle<()>,
}

impl AsyncDetectionLogger {
    pub fn start(log_dir: impl Into<PathBuf>) -> Arc<Self> {
        let log_dir = log_dir.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Value>();

        let writer = tokio::spawn(async move {
            if let Err(e) = tokio::fs::create_dir_all(&log_dir).await {
                tracing::error!(error = %e, "failed to create detection log dir");
                return;
            }

            while let Some(mut record) = receiver.recv().await {
                clean_null_characters(&mut record);
                if let Value::Object(ref mut map) = record {
                    map.insert("logged_at".to_string(), Value::String(Utc::now().to_rfc3339()));
                }

                let filename = log_dir.join(format!("detection_{}.jsonl", Utc::now().format("%Y%m%d")));
                let line = match serde_json::to_string(&record) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize detection record");
                        continue;
                    }
                };

                match OpenOptions::new().create(true).append(true).open(&filename).await {
                    Ok(mut file) => {
                        if let Err(e) = file.write_all(format!("{line}\n").as_bytes()).await {
                            tracing::error!(error = %e, "failed to write detection record");
                        }
                        if let Err(e) = file.flush().await {
                            tracing::error!(error = %e, "failed to flush detection log");
                        }
                    }
                    Err(e) => tracing::error!(error = %e, file = %filename.display(), "failed to open detection log"),
                }
            }
        });

        Arc::new(Self { sender, writer })
    }

    /// Enqueues `record` for append; control characters/NULs are stripped from all
    /// free-text fields before write.
    pub fn log_detection(&self, record: Value) {
        if self.sender.send(record).is_err() {
            tracing::error!("detection logger channel closed, dropping record");
        }
    }

    pub async fn stop(self: Arc<Self>) {
        if let Ok(this) = Arc::try_unwrap(self) {
            drop(this.sender);
            let _ = this.writer.await;
        }
    }
}

/// Strips NUL and other control characters from every string value, recursively
/// (Postgres `text`/`jsonb` columns reject embedded NULs).
fn clean_null_characters(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains(['\0']) {
                *s = s.chars().filter(|c| *c != '\0').collect();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(clean_null_characters),
        Value::Object(map) => map.values_mut().for_each(clean_null_characters),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_embedded_nul_bytes() {
        let mut value = json!({"content": "hello\u{0}world"});
        clean_null_characters(&mut value);
        assert_eq!(value["content"], "helloworld");
    }

    #[tokio::test]
    async fn writes_one_jsonl_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AsyncDetectionLogger::start(dir.path());

        logger.log_detection(json!({"request_id": "abc"}));
        // give the writer task a chance to drain
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let filename = dir.path().join(format!("detection_{}.jsonl", Utc::now().format("%Y%m%d")));
        let contents = tokio::fs::read_to_string(&filename).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("\"request_id\":\"abc\""));
    }
}
