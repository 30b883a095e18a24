//! Per-record JSON files.
//!
//! Every record lands at `{output_dir}/{source_code}/{slug}.json`, where the
//! slug comes from the park name. A later record with the same name replaces
//! the earlier file.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, instrument};

use crate::error::BoxError;
use crate::models::{Record, ScrapedEvent};
use crate::publish::Subscriber;
use crate::utils::slugify;

#[derive(Debug, Clone)]
pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path_for(&self, record: &Record) -> PathBuf {
        self.output_dir
            .join(&record.source_code)
            .join(format!("{}.json", slugify(&record.name)))
    }

    /// Write `record` as pretty JSON and return the file path.
    #[instrument(level = "debug", skip_all, fields(name = %record.name))]
    pub async fn write(&self, record: &Record) -> Result<PathBuf, BoxError> {
        let path = self.path_for(record);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json).await?;
        debug!(path = %path.display(), "Wrote record file");
        Ok(path)
    }
}

#[async_trait]
impl Subscriber for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn on_record_scraped(&self, event: &ScrapedEvent) -> Result<(), BoxError> {
        self.write(&event.record).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Activity;

    fn lakeview() -> Record {
        Record {
            name: "Lakeview Park".into(),
            source_code: "A".into(),
            address: None,
            latitude: 41.2,
            longitude: -87.3,
            activities: vec![Activity::new("Hiking")],
        }
    }

    #[test]
    fn test_path_layout() {
        let sink = FileSink::new("output");
        assert_eq!(
            sink.path_for(&lakeview()),
            PathBuf::from("output/A/lakeview-park.json")
        );
    }

    #[tokio::test]
    async fn test_writes_record_file() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FileSink::new(tmp.path().join("output"));

        let path = sink.write(&lakeview()).await.unwrap();
        assert_eq!(path, tmp.path().join("output/A/lakeview-park.json"));

        let written: Record = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, lakeview());
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"sourceCode\": \"A\""));
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let sink = FileSink::new(&blocker);
        assert!(sink.write(&lakeview()).await.is_err());
    }
}
