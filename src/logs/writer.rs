use crate::error::{Result, VigilError};
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;

/// Default timestamp format for log lines
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Which pipe of the child a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Where and how captured output is written
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub out_file: PathBuf,
    pub error_file: PathBuf,
    /// Both streams interleaved in arrival order
    pub combined_file: PathBuf,
    /// Prefix each line with a timestamp
    pub time: bool,
    /// strftime-style pattern for the timestamp
    pub date_format: String,
}

/// LogWriter appends captured lines to the out, error and combined files.
///
/// The three handles are opened once and held for the writer's lifetime.
pub struct LogWriter {
    out_file: TokioFile,
    err_file: TokioFile,
    combined_file: TokioFile,
    time: bool,
    date_format: String,
}

impl LogWriter {
    /// Open (creating if needed) the three log files in append mode
    pub async fn open(settings: &LogSettings) -> Result<Self> {
        let out_file = open_append(&settings.out_file).await?;
        let err_file = open_append(&settings.error_file).await?;
        let combined_file = open_append(&settings.combined_file).await?;

        Ok(Self {
            out_file,
            err_file,
            combined_file,
            time: settings.time,
            date_format: settings.date_format.clone(),
        })
    }

    /// Write one captured line to its stream file and to the combined file
    pub async fn write_line(&mut self, stream: StreamKind, data: &[u8]) -> Result<()> {
        let entry = self.format_log_entry(&Local::now(), data);

        let file = match stream {
            StreamKind::Stdout => &mut self.out_file,
            StreamKind::Stderr => &mut self.err_file,
        };
        write_entry(file, &entry).await?;
        write_entry(&mut self.combined_file, &entry).await?;

        Ok(())
    }

    /// Format a log entry, prefixing the timestamp when `time` is enabled
    fn format_log_entry(&self, timestamp: &DateTime<Local>, data: &[u8]) -> Vec<u8> {
        let mut entry = Vec::with_capacity(data.len() + 32);

        if self.time {
            // Format: <timestamp>: <data>
            entry.extend_from_slice(timestamp.format(&self.date_format).to_string().as_bytes());
            entry.extend_from_slice(b": ");
        }
        entry.extend_from_slice(data);

        if !data.ends_with(b"\n") {
            entry.push(b'\n');
        }

        entry
    }

    /// Flush all log files to ensure all data is written
    pub async fn flush(&mut self) -> Result<()> {
        for file in [&mut self.out_file, &mut self.err_file, &mut self.combined_file] {
            file.flush()
                .await
                .map_err(|e| VigilError::LogError(format!("Failed to flush log: {}", e)))?;
        }
        Ok(())
    }
}

async fn open_append(path: &Path) -> Result<TokioFile> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                VigilError::LogError(format!(
                    "Failed to create log directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| VigilError::LogFileError(format!("{}: {}", path.display(), e)))?;

    Ok(TokioFile::from_std(file))
}

async fn write_entry(file: &mut TokioFile, entry: &[u8]) -> Result<()> {
    file.write_all(entry)
        .await
        .map_err(|e| VigilError::LogError(format!("Failed to write to log: {}", e)))?;
    file.flush()
        .await
        .map_err(|e| VigilError::LogError(format!("Failed to flush log: {}", e)))
}
