// Logs module - Capture of the child's stdout/stderr

mod capture;
mod writer;

pub use capture::LogCapture;
pub use writer::{LogSettings, LogWriter, StreamKind, DEFAULT_DATE_FORMAT};
