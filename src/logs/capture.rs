use crate::error::{Result, VigilError};
use crate::logs::writer::{LogSettings, LogWriter, StreamKind};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lines buffered between the pipe readers and the writer task
const LINE_BUFFER: usize = 1024;

/// How long `close` waits for readers to drain before giving up
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct CapturedLine {
    stream: StreamKind,
    data: Vec<u8>,
}

/// Routes the output of successive child instances into one set of log files.
///
/// Every attached pipe gets its own reader task; all readers feed a single
/// channel drained by one writer task, so the combined file records lines in
/// the order they arrived.
pub struct LogCapture {
    tx: mpsc::Sender<CapturedLine>,
    writer_task: JoinHandle<()>,
}

impl LogCapture {
    /// Open the log files and start the writer task
    pub async fn open(settings: &LogSettings) -> Result<Self> {
        let writer = LogWriter::open(settings).await?;
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let writer_task = tokio::spawn(run_writer(writer, rx));

        Ok(Self { tx, writer_task })
    }

    /// Take the stdout/stderr pipes of `child` and start reading them
    pub fn attach(&self, child: &mut Child) -> Result<()> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VigilError::LogError("No stdout pipe available".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| VigilError::LogError("No stderr pipe available".to_string()))?;

        tokio::spawn(read_stream(StreamKind::Stdout, stdout, self.tx.clone()));
        tokio::spawn(read_stream(StreamKind::Stderr, stderr, self.tx.clone()));

        Ok(())
    }

    /// Stop accepting new pipes and wait for pending lines to be written
    pub async fn close(self) {
        let Self {
            tx,
            mut writer_task,
        } = self;
        drop(tx);

        if tokio::time::timeout(CLOSE_GRACE, &mut writer_task).await.is_err() {
            warn!("Log pipes still open after {:?}, abandoning capture", CLOSE_GRACE);
            writer_task.abort();
        }
    }
}

async fn read_stream<R>(stream: StreamKind, pipe: R, tx: mpsc::Sender<CapturedLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();

    loop {
        match reader.read_until(b'\n', &mut buf).await {
            // EOF: the child closed the pipe
            Ok(0) => break,
            Ok(_) => {
                let line = CapturedLine {
                    stream,
                    data: std::mem::take(&mut buf),
                };
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Stopped reading {:?}: {}", stream, e);
                break;
            }
        }
    }
}

async fn run_writer(mut writer: LogWriter, mut rx: mpsc::Receiver<CapturedLine>) {
    while let Some(line) = rx.recv().await {
        if let Err(e) = writer.write_line(line.stream, &line.data).await {
            warn!("Dropping captured {:?} line: {}", line.stream, e);
        }
    }

    if let Err(e) = writer.flush().await {
        warn!("Failed to flush logs on close: {}", e);
    }
}
