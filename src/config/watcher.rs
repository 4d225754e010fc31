//! Modification-time polling for hot reload.
//!
//! Changes are detected by comparing a file's mtime against the last value
//! acted upon. Nothing is pushed; the reconciler asks on every tick.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Read a file's modification time.
pub fn modified_at(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// Tracks one file and reports when its mtime moves past the last seen value.
#[derive(Debug, Clone)]
pub struct MtimeWatch {
    path: PathBuf,
    last_seen: SystemTime,
}

impl MtimeWatch {
    /// Start watching from the file's current mtime, or from now if it cannot be read.
    pub fn new(path: &Path) -> Self {
        let last_seen = modified_at(path).unwrap_or_else(|_| SystemTime::now());
        Self {
            path: path.to_path_buf(),
            last_seen,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_seen(&self) -> SystemTime {
        self.last_seen
    }

    /// Returns the new mtime if the file changed since the last acknowledged value.
    ///
    /// The change is not acknowledged here; call [`MtimeWatch::acknowledge`] once
    /// it has been acted upon, so a failed reload is not retried forever but a
    /// rejected file is not silently forgotten either.
    pub fn poll(&self) -> io::Result<Option<SystemTime>> {
        let modified = modified_at(&self.path)?;
        Ok((modified > self.last_seen).then_some(modified))
    }

    pub fn acknowledge(&mut self, seen: SystemTime) {
        if seen > self.last_seen {
            self.last_seen = seen;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    #[test]
    fn test_detects_advanced_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.json");
        fs::write(&path, "[]").unwrap();

        let mut watch = MtimeWatch::new(&path);
        assert_eq!(watch.poll().unwrap(), None);

        let later = SystemTime::now() + Duration::from_secs(60);
        File::options().write(true).open(&path).unwrap().set_modified(later).unwrap();

        let seen = watch.poll().unwrap().expect("change should be reported");
        watch.acknowledge(seen);
        assert_eq!(watch.poll().unwrap(), None);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let watch = MtimeWatch::new(&dir.path().join("missing"));
        assert!(watch.poll().is_err());
    }
}
