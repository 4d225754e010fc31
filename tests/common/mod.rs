//! Shared fixtures for integration tests.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use serde_json::json;
use tempfile::TempDir;

/// Name of the modifier marker every fixture folder uses.
pub const MARKER: &str = "modified";

/// A temporary tree of host folders plus a hosts file.
pub struct Site {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Site {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Create `name/templates/*` and the marker file.
    pub fn folder(&self, name: &str, templates: &[(&str, &str)]) -> PathBuf {
        let folder = self.dir.path().join(name);
        fs::create_dir_all(folder.join("templates")).unwrap();
        for (file, body) in templates {
            write_template(&folder, file, body);
        }
        fs::write(folder.join(MARKER), "").unwrap();
        folder
    }

    pub fn hosts_path(&self) -> PathBuf {
        self.dir.path().join("hosts.json")
    }

    /// Write the hosts file as a JSON array in the given order.
    pub fn write_hosts(&self, entries: &[(&str, &Path)]) -> PathBuf {
        let list: Vec<_> = entries
            .iter()
            .map(|(host, folder)| json!({ "host": host, "folder": folder, "modifier": MARKER }))
            .collect();
        let path = self.hosts_path();
        fs::write(&path, serde_json::to_vec_pretty(&list).unwrap()).unwrap();
        path
    }
}

#[allow(dead_code)]
pub fn write_template(folder: &Path, name: &str, body: &str) {
    fs::write(folder.join("templates").join(name), body).unwrap();
}

/// Date `path` `secs` seconds into the future so pollers see it as changed.
#[allow(dead_code)]
pub fn touch_forward(path: &Path, secs: u64) {
    let when = SystemTime::now() + Duration::from_secs(secs);
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(when)
        .unwrap();
}
