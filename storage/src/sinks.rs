use moltscrape_core::{CoreError, PostRecord};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Append-only per-submolt record sinks: a CSV file with the fixed column
/// set (header written when the file is created) and a JSONL archive holding
/// each post's verbatim source payload, one object per line.
#[derive(Debug)]
pub struct PostSink {
    posts_dir: PathBuf,
}

impl PostSink {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let posts_dir = data_dir.into().join("posts");
        std::fs::create_dir_all(&posts_dir)?;
        Ok(Self { posts_dir })
    }

    pub fn append(&self, submolt: &str, records: &[PostRecord]) -> Result<(), CoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let csv_path = self.posts_dir.join(format!("{submolt}.csv"));
        let write_header = !csv_path.exists();
        let csv_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(csv_file);
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        let raw_path = self.posts_dir.join(format!("{submolt}_raw.jsonl"));
        let mut raw_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&raw_path)?;
        for record in records {
            writeln!(raw_file, "{}", record.raw_json)?;
        }

        info!(submolt, count = records.len(), path = %csv_path.display(), "Appended posts");
        Ok(())
    }
}
