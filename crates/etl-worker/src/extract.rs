//! Producer side: upload a batch of records and announce it on the queue.
//!
//! Used for local runs against LocalStack. Every remote call goes through a
//! short readiness gate, since the services may still be starting.

use anyhow::{Context, Result};
use chrono::Utc;
use etl_common::types::WorkNotification;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::aws;
use crate::config::WorkerConfig;
use crate::fetcher::parse_records;
use crate::queue::{SqsQueue, WorkQueue};
use crate::readiness::ReadinessGate;
use crate::storage::S3Storage;

pub const DEFAULT_BUCKET: &str = "etl-bucket";
const STEP_ATTEMPTS: u32 = 10;
const STEP_INTERVAL: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// JSON array of records to upload; the sample records when `None`
    pub file: Option<PathBuf>,
    pub bucket: String,
}

/// Records uploaded when no input file is given
pub fn sample_records() -> Vec<u8> {
    json!([
        { "id": 1, "name": "Apple", "price": 100 },
        { "id": 2, "name": "Banana", "price": 50 },
    ])
    .to_string()
    .into_bytes()
}

/// Read the records to upload, rejecting anything the worker could not parse.
pub fn read_records(file: Option<&Path>) -> Result<Vec<u8>> {
    let Some(path) = file else {
        return Ok(sample_records());
    };

    let body = std::fs::read(path)
        .with_context(|| format!("Failed to read records from {}", path.display()))?;
    parse_records(&body).map_err(|reason| {
        anyhow::anyhow!("{} is not a JSON array of records: {}", path.display(), reason)
    })?;
    Ok(body)
}

/// Unique per second: `data-<unix-seconds>.json`
pub fn object_key(unix_seconds: i64) -> String {
    format!("data-{}.json", unix_seconds)
}

/// Send the notification for an uploaded object.
pub async fn announce<Q: WorkQueue>(
    queue: &Q,
    notification: &WorkNotification,
    gate: &ReadinessGate,
) -> Result<()> {
    let body = notification.to_json()?;
    gate.wait_until_ready("queue send", || queue.send(&body)).await?;
    Ok(())
}

pub async fn run(config: &WorkerConfig, options: &ExtractOptions) -> Result<WorkNotification> {
    let body = read_records(options.file.as_deref())?;
    let gate = ReadinessGate::new(STEP_ATTEMPTS, STEP_INTERVAL);

    let sdk = aws::load_sdk_config(&config.aws).await;
    let storage = S3Storage::new(aws::s3_client(&sdk, &config.aws));
    let sqs = aws::sqs_client(&sdk);

    let bucket = options.bucket.as_str();
    gate.wait_until_ready("bucket", || storage.ensure_bucket(bucket)).await?;
    info!(bucket, "Bucket ready");

    let key = object_key(Utc::now().timestamp());
    gate.wait_until_ready("upload", || {
        storage.upload(bucket, &key, body.clone(), "application/json")
    })
    .await?;
    info!(bucket, key = %key, bytes = body.len(), "Uploaded records");

    let queue_name = config.queue.name.as_str();
    let queue_url = gate
        .wait_until_ready("queue", || SqsQueue::create(&sqs, queue_name))
        .await?;
    let queue = SqsQueue::new(sqs, queue_url);

    let notification = WorkNotification::new(bucket, key);
    announce(&queue, &notification, &gate).await?;
    info!(bucket, key = %notification.key, queue = queue_name, "Sent notification");

    Ok(notification)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use std::io::Write;

    #[test]
    fn test_sample_records_are_parseable() {
        let records = parse_records(&sample_records()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["name"], "Apple");
        assert_eq!(records[1]["price"], 50);
    }

    #[test]
    fn test_object_key_format() {
        assert_eq!(object_key(1_700_000_000), "data-1700000000.json");
    }

    #[test]
    fn test_read_records_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id": 9, "name": "Cherry", "price": 300}}]"#).unwrap();

        let body = read_records(Some(file.path())).unwrap();
        assert_eq!(parse_records(&body).unwrap()[0]["id"], 9);
    }

    #[test]
    fn test_read_records_rejects_non_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"id": 9}}"#).unwrap();

        assert!(read_records(Some(file.path())).is_err());
        assert!(read_records(Some(Path::new("/nonexistent/records.json"))).is_err());
    }

    #[tokio::test]
    async fn test_announce_sends_notification() {
        let queue = MemoryQueue::new();
        let notification = WorkNotification::new("etl-bucket", "data-1.json");

        announce(&queue, &notification, &ReadinessGate::new(1, Duration::ZERO))
            .await
            .unwrap();

        let message = queue
            .receive(Duration::ZERO, Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(WorkNotification::from_json(&message.body).unwrap(), notification);
    }
}
