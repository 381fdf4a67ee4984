//! Crash-safe JSON file writes
//!
//! The payload is written to a `.tmp` sibling in the same directory and then
//! renamed over the target, so readers only ever see the old or the new
//! file. This is not a lock: every persisted file has a single writer.

use crate::Result;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Temp file used while writing `path` (`checkpoint.json` -> `checkpoint.tmp`)
pub fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("tmp")
}

/// Serialize `value` as pretty JSON and atomically replace `path`
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_bytes(path, &bytes)
}

/// Atomically replace `path` with `bytes`
pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = written {
        // Leave no partial temp file behind
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
