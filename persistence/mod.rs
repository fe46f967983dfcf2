/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! JSON document store for settings, favorites, and pinned tabs.
//!
//! Each document is rewritten whole on every save. Loads never fail: a missing,
//! unreadable, or malformed file yields the caller's fallback. Saves never fail
//! either; faults are retried a few times, logged, and dropped.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use vaultshell_core::bookmarks::retain_persistent;
use vaultshell_core::{Bookmark, BookmarkList, PinnedTab, Settings};

pub const SETTINGS_FILE: &str = "settings.json";
pub const BOOKMARKS_FILE: &str = "bookmarks.json";
pub const PINNED_FILE: &str = "pinned.json";

const APP_DIR_NAME: &str = "vaultshell";
const SAVE_RETRY_MIN_DELAY: Duration = Duration::from_millis(10);
const SAVE_RETRY_MAX_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_SAVE_RETRIES: usize = 2;

/// Application-private data directory.
pub fn default_data_dir() -> PathBuf {
    match dirs::config_dir() {
        Some(mut dir) => {
            dir.push(APP_DIR_NAME);
            dir
        }
        None => {
            warn!("No platform config directory; storing state under ./{APP_DIR_NAME}");
            PathBuf::from(APP_DIR_NAME)
        }
    }
}

#[derive(Debug)]
pub enum PersistenceError {
    Io(String),
    Json(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::Io(e) => write!(f, "IO error: {e}"),
            PersistenceError::Json(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

/// How hard a save tries before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveRetryPolicy {
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl SaveRetryPolicy {
    pub fn none() -> Self {
        Self::with_retries(0)
    }

    pub fn with_retries(max_retries: usize) -> Self {
        Self {
            max_retries,
            min_delay: SAVE_RETRY_MIN_DELAY,
            max_delay: SAVE_RETRY_MAX_DELAY,
        }
    }

    fn delays(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_retries)
            .build()
    }
}

impl Default for SaveRetryPolicy {
    fn default() -> Self {
        Self::with_retries(DEFAULT_SAVE_RETRIES)
    }
}

/// Read and parse `path`. `Ok(None)` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| PersistenceError::Io(format!("Failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| PersistenceError::Json(format!("Failed to parse {}: {e}", path.display())))
}

/// Serialize `value` and overwrite `path`, creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            PersistenceError::Io(format!("Failed to create {}: {e}", parent.display()))
        })?;
    }
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| PersistenceError::Json(format!("Failed to encode {}: {e}", path.display())))?;
    fs::write(path, body)
        .map_err(|e| PersistenceError::Io(format!("Failed to write {}: {e}", path.display())))
}

/// [`read_json`], substituting `fallback` for any fault.
pub fn load_or<T: DeserializeOwned>(path: &Path, fallback: T) -> T {
    match read_json(path) {
        Ok(Some(value)) => value,
        Ok(None) => fallback,
        Err(e) => {
            warn!("persistence: {e}; using defaults");
            fallback
        }
    }
}

/// [`write_json`] with retries. Returns whether the document reached disk.
pub fn save_best_effort<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    policy: SaveRetryPolicy,
) -> bool {
    let mut delays = policy.delays();
    loop {
        match write_json(path, value) {
            Ok(()) => return true,
            Err(e) => match delays.next() {
                Some(delay) => {
                    debug!("persistence: {e}; retrying in {delay:?}");
                    std::thread::sleep(delay);
                }
                None => {
                    warn!("persistence: {e}; change not saved");
                    return false;
                }
            },
        }
    }
}

/// The three documents under one data directory.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
    retry: SaveRetryPolicy,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>, retry: SaveRetryPolicy) -> Self {
        Self {
            dir: dir.into(),
            retry,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    pub fn bookmarks_path(&self) -> PathBuf {
        self.dir.join(BOOKMARKS_FILE)
    }

    pub fn pinned_path(&self) -> PathBuf {
        self.dir.join(PINNED_FILE)
    }

    /// Settings with load-time invariants applied. PIN provisioning is left
    /// to the caller so it can persist the result.
    pub fn load_settings(&self) -> Settings {
        let mut settings = load_or(&self.settings_path(), Settings::default());
        settings.normalize_after_load();
        settings
    }

    pub fn save_settings(&self, settings: &Settings) -> bool {
        save_best_effort(&self.settings_path(), settings, self.retry)
    }

    pub fn load_bookmarks(&self) -> BookmarkList {
        let documents: Vec<serde_json::Value> = load_or(&self.bookmarks_path(), Vec::new());
        let (list, dropped) = BookmarkList::from_documents(documents);
        if dropped > 0 {
            warn!("persistence: dropped {dropped} malformed bookmark entries");
        }
        list
    }

    pub fn save_bookmarks(&self, bookmarks: &[Bookmark]) -> bool {
        save_best_effort(&self.bookmarks_path(), bookmarks, self.retry)
    }

    pub fn load_pinned(&self) -> Vec<PinnedTab> {
        let documents: Vec<serde_json::Value> = load_or(&self.pinned_path(), Vec::new());
        let (pinned, dropped) = retain_persistent::<PinnedTab>(documents);
        if dropped > 0 {
            warn!("persistence: dropped {dropped} malformed pinned-tab entries");
        }
        pinned
    }

    pub fn save_pinned(&self, pinned: &[PinnedTab]) -> bool {
        save_best_effort(&self.pinned_path(), pinned, self.retry)
    }
}
