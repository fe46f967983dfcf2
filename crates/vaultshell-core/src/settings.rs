/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Persisted shell settings.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const INACTIVITY_DEFAULT_MS: u64 = 5 * 60 * 1000;
pub const INACTIVITY_MIN_MS: u64 = 60 * 1000;

/// Settings document as stored on disk (`settings.json`).
///
/// Field names are camelCase on the wire so documents written by earlier
/// releases keep loading. A malformed `inactivityMs` or `lockEnabled` is
/// coerced and never fails the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_lock_enabled", deserialize_with = "lenient_lock_enabled")]
    pub lock_enabled: bool,
    #[serde(default = "default_inactivity_ms", deserialize_with = "lenient_inactivity_ms")]
    pub inactivity_ms: u64,
    #[serde(default)]
    pub pin_salt: Option<String>,
    #[serde(default)]
    pub pin_hash: Option<String>,
}

fn default_lock_enabled() -> bool {
    true
}

fn default_inactivity_ms() -> u64 {
    INACTIVITY_DEFAULT_MS
}

fn lenient_lock_enabled<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?
        .as_bool()
        .unwrap_or_else(default_lock_enabled))
}

fn lenient_inactivity_ms<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(coerce_inactivity_ms(raw))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lock_enabled: true,
            inactivity_ms: INACTIVITY_DEFAULT_MS,
            pin_salt: None,
            pin_hash: None,
        }
    }
}

impl Settings {
    /// Apply the load-time invariants.
    ///
    /// The lock can only be disabled for the lifetime of a process, so a stored
    /// `lockEnabled: false` never survives a restart.
    pub fn normalize_after_load(&mut self) {
        self.lock_enabled = true;
        self.inactivity_ms = clamp_inactivity_ms(self.inactivity_ms);
    }

    pub fn inactivity_interval(&self) -> Duration {
        Duration::from_millis(clamp_inactivity_ms(self.inactivity_ms))
    }

    /// Salt and hash, when both are present and non-empty.
    pub fn pin_material(&self) -> Option<(&str, &str)> {
        match (self.pin_salt.as_deref(), self.pin_hash.as_deref()) {
            (Some(salt), Some(hash)) if !salt.is_empty() && !hash.is_empty() => Some((salt, hash)),
            _ => None,
        }
    }

    pub fn has_pin(&self) -> bool {
        self.pin_material().is_some()
    }

    /// Projection handed across the command boundary. Never carries PIN material.
    pub fn view(&self) -> SettingsView {
        SettingsView {
            lock_enabled: self.lock_enabled,
            inactivity_ms: self.inactivity_ms,
            pin_configured: self.has_pin(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub lock_enabled: bool,
    pub inactivity_ms: u64,
    pub pin_configured: bool,
}

/// Zero means "unset" and maps to the default; anything else is raised to the floor.
pub fn clamp_inactivity_ms(ms: u64) -> u64 {
    if ms == 0 {
        INACTIVITY_DEFAULT_MS
    } else {
        ms.max(INACTIVITY_MIN_MS)
    }
}

/// Coerce an untrusted numeric input the way the settings boundary expects:
/// non-finite or zero values fall back to the default, negatives hit the floor.
pub fn coerce_inactivity_ms(raw: Option<f64>) -> u64 {
    match raw {
        Some(value) if value.is_finite() && value != 0.0 => {
            if value <= INACTIVITY_MIN_MS as f64 {
                INACTIVITY_MIN_MS
            } else if value >= u64::MAX as f64 {
                u64::MAX
            } else {
                value as u64
            }
        }
        _ => INACTIVITY_DEFAULT_MS,
    }
}
