/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Request/response command boundary.
//!
//! A request is a JSON object `{"command": "<name>", "payload": <any>}`. Known
//! commands never reject their payload: anything malformed is coerced to a safe
//! default and logged. Only a non-object request or an unknown command name is
//! an error.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vaultshell_core::bookmarks::retain_persistent;
use vaultshell_core::settings::coerce_inactivity_ms;
use vaultshell_core::{Bookmark, BookmarkDraft, PinnedTab, RemoveKey, SettingsView, TimerToken};

use crate::shell::desktop::runtime::events::WindowBounds;

pub const CMD_STATE_GET: &str = "state.get";
pub const CMD_BOOKMARKS_ADD: &str = "bookmarks.add";
pub const CMD_BOOKMARKS_REMOVE: &str = "bookmarks.remove";
pub const CMD_BOOKMARKS_LIST: &str = "bookmarks.list";
pub const CMD_BOOKMARKS_REORDER: &str = "bookmarks.reorder";
pub const CMD_PINNED_SET: &str = "pinned.set";
pub const CMD_SESSION_CREATE: &str = "session.create";
pub const CMD_LOCK_ACTIVITY: &str = "lock.activity";
pub const CMD_LOCK_SHOW: &str = "lock.show";
pub const CMD_LOCK_VERIFY: &str = "lock.verify";
pub const CMD_LOCK_CHECK: &str = "lock.check";
pub const CMD_LOCK_SETPIN: &str = "lock.setpin";
pub const CMD_LOCK_TOGGLE: &str = "lock.toggle";
pub const CMD_SETTINGS_SET_INACTIVITY: &str = "settings.setInactivity";
pub const CMD_FAVORITES_OPEN: &str = "favorites.open";
pub const CMD_WINDOW_BOUNDS: &str = "window.bounds";

/// Everything the control loop can be asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    GetState,
    AddBookmark(BookmarkDraft),
    /// `None` when the key could not be decoded; removes nothing.
    RemoveBookmark(Option<RemoveKey>),
    ListBookmarks,
    ReorderBookmarks(Vec<Bookmark>),
    SetPinned(Vec<PinnedTab>),
    CreateSession(String),
    LockActivity,
    LockShow,
    VerifyPin(String),
    CheckPin(String),
    SetPin(String),
    ToggleLock,
    /// Already clamped to the supported range.
    SetInactivity(u64),
    OpenFavorite(String),
    WindowBounds(Option<WindowBounds>),
    /// Raised by a timer worker, never decoded from a request.
    LockTimerFired(TimerToken),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Malformed(String),
    UnknownCommand(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Malformed(e) => write!(f, "Malformed request: {e}"),
            CommandError::UnknownCommand(name) => write!(f, "Unknown command: {name}"),
        }
    }
}

impl std::error::Error for CommandError {}

#[derive(Debug, Deserialize)]
struct RawCommand {
    command: String,
    #[serde(default)]
    payload: Value,
}

impl ShellCommand {
    /// Decode a request object.
    pub fn from_request(request: Value) -> Result<Self, CommandError> {
        let raw: RawCommand =
            serde_json::from_value(request).map_err(|e| CommandError::Malformed(e.to_string()))?;
        Self::decode(&raw.command, raw.payload)
    }

    /// Decode `payload` for the command called `name`.
    pub fn decode(name: &str, payload: Value) -> Result<Self, CommandError> {
        let command = match name {
            CMD_STATE_GET => Self::GetState,
            CMD_BOOKMARKS_ADD => Self::AddBookmark(decode_or_default(name, payload)),
            CMD_BOOKMARKS_REMOVE => Self::RemoveBookmark(decode_lenient(name, payload)),
            CMD_BOOKMARKS_LIST => Self::ListBookmarks,
            CMD_BOOKMARKS_REORDER => Self::ReorderBookmarks(decode_entries(name, payload)),
            CMD_PINNED_SET => Self::SetPinned(decode_pinned(payload)),
            CMD_SESSION_CREATE => Self::CreateSession(coerce_text(payload)),
            CMD_LOCK_ACTIVITY => Self::LockActivity,
            CMD_LOCK_SHOW => Self::LockShow,
            CMD_LOCK_VERIFY => Self::VerifyPin(coerce_text(payload)),
            CMD_LOCK_CHECK => Self::CheckPin(coerce_text(payload)),
            CMD_LOCK_SETPIN => Self::SetPin(coerce_text(payload)),
            CMD_LOCK_TOGGLE => Self::ToggleLock,
            CMD_SETTINGS_SET_INACTIVITY => {
                Self::SetInactivity(coerce_inactivity_ms(coerce_number(&payload)))
            }
            CMD_FAVORITES_OPEN => Self::OpenFavorite(coerce_text(payload)),
            CMD_WINDOW_BOUNDS => Self::WindowBounds(decode_lenient(name, payload)),
            other => return Err(CommandError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetState => CMD_STATE_GET,
            Self::AddBookmark(_) => CMD_BOOKMARKS_ADD,
            Self::RemoveBookmark(_) => CMD_BOOKMARKS_REMOVE,
            Self::ListBookmarks => CMD_BOOKMARKS_LIST,
            Self::ReorderBookmarks(_) => CMD_BOOKMARKS_REORDER,
            Self::SetPinned(_) => CMD_PINNED_SET,
            Self::CreateSession(_) => CMD_SESSION_CREATE,
            Self::LockActivity => CMD_LOCK_ACTIVITY,
            Self::LockShow => CMD_LOCK_SHOW,
            Self::VerifyPin(_) => CMD_LOCK_VERIFY,
            Self::CheckPin(_) => CMD_LOCK_CHECK,
            Self::SetPin(_) => CMD_LOCK_SETPIN,
            Self::ToggleLock => CMD_LOCK_TOGGLE,
            Self::SetInactivity(_) => CMD_SETTINGS_SET_INACTIVITY,
            Self::OpenFavorite(_) => CMD_FAVORITES_OPEN,
            Self::WindowBounds(_) => CMD_WINDOW_BOUNDS,
            Self::LockTimerFired(_) => "lock.timerFired",
        }
    }
}

/// Result payload of a handled command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum CommandResponse {
    State {
        settings: SettingsView,
        bookmarks: Vec<Bookmark>,
        pinned_tabs: Vec<PinnedTab>,
    },
    Bookmarks(Vec<Bookmark>),
    Pinned(Vec<PinnedTab>),
    Verification {
        ok: bool,
        needs_setup: bool,
    },
    PinSet {
        ok: bool,
    },
    FavoriteOpened {
        bookmark: Option<Bookmark>,
        bookmarks: Vec<Bookmark>,
    },
    InactivityMs(u64),
    /// Plain acknowledgment, or the new value of a boolean setting.
    Flag(bool),
}

fn decode_or_default<T: Default + serde::de::DeserializeOwned>(name: &str, payload: Value) -> T {
    decode_lenient(name, payload).unwrap_or_default()
}

fn decode_lenient<T: serde::de::DeserializeOwned>(name: &str, payload: Value) -> Option<T> {
    match serde_json::from_value(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("command: {name} payload ignored ({e})");
            None
        }
    }
}

fn decode_entries(name: &str, payload: Value) -> Vec<Bookmark> {
    let Value::Array(items) = payload else {
        warn!("command: {name} expects a list; treating as empty");
        return Vec::new();
    };
    let total = items.len();
    let entries: Vec<Bookmark> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if entries.len() < total {
        debug!("command: {name} skipped {} undecodable entries", total - entries.len());
    }
    entries
}

fn decode_pinned(payload: Value) -> Vec<PinnedTab> {
    let Value::Array(items) = payload else {
        return Vec::new();
    };
    let (pinned, dropped) = retain_persistent(items);
    if dropped > 0 {
        debug!("command: {CMD_PINNED_SET} skipped {dropped} entries");
    }
    pinned
}

/// Strings pass through; numbers are rendered; anything else is empty.
fn coerce_text(payload: Value) -> String {
    match payload {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    }
}

fn coerce_number(payload: &Value) -> Option<f64> {
    match payload {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}
