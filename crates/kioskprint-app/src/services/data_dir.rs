// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Return the kiosk's data directory, creating it if needed.
///
/// `KIOSKPRINT_DATA_DIR` overrides the XDG location.
pub fn data_dir() -> PathBuf {
    let dir = match std::env::var_os("KIOSKPRINT_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => dirs_fallback().join("kioskprint"),
    };
    ensure_dir(&dir);
    dir
}

fn ensure_dir(dir: &Path) {
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!(path = %dir.display(), error = %e, "cannot create data directory");
    }
}

fn dirs_fallback() -> PathBuf {
    // Try XDG data dir, then fallback to home
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    // Last resort
    std::env::temp_dir()
}
