// PID file for the supervised child

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Records the PID of the current child instance
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Overwrite the file with `pid`, creating parent directories as needed
    pub fn write(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, pid.to_string())?;
        Ok(())
    }

    pub fn remove(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_pid(pid_file: &PidFile) -> Option<u32> {
        fs::read_to_string(pid_file.path())
            .ok()
            .and_then(|content| content.trim().parse().ok())
    }

    #[test]
    fn test_pid_file_write_read_remove() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = PidFile::with_path(temp_dir.path().join("run").join("app.pid"));

        assert_eq!(read_pid(&pid_file), None);

        pid_file.write(4242).unwrap();
        assert_eq!(read_pid(&pid_file), Some(4242));

        pid_file.write(4343).unwrap();
        assert_eq!(read_pid(&pid_file), Some(4343));

        pid_file.remove().unwrap();
        assert!(!pid_file.path().exists());
        pid_file.remove().unwrap();
    }
}
