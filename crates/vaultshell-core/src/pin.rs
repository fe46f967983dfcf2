/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Salted PIN hashing for the lock overlay.
//!
//! The stored form is `sha256(pin ":" salt)` as lowercase hex, with a fresh
//! 128-bit salt per [`set_pin`] call.

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::settings::Settings;

/// Provisioned when a settings document carries no PIN material at all.
///
/// Shipping a known credential is weak; callers log loudly when they fall back to it.
pub const DEFAULT_PIN: &str = "123456";

const SALT_LEN: usize = 16;
const MAX_PIN_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinVerification {
    Match,
    Mismatch,
    /// No salt/hash provisioned yet.
    NeedsSetup,
}

impl PinVerification {
    pub fn ok(self) -> bool {
        self == Self::Match
    }

    pub fn needs_setup(self) -> bool {
        self == Self::NeedsSetup
    }
}

/// Numeric, non-empty, and short enough to type on an overlay keypad.
pub fn is_valid_pin(pin: &str) -> bool {
    !pin.is_empty() && pin.len() <= MAX_PIN_LEN && pin.bytes().all(|b| b.is_ascii_digit())
}

pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    encode_hex(&salt)
}

pub fn derive_pin_hash(pin: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pin.as_bytes());
    hasher.update(b":");
    hasher.update(salt.as_bytes());
    encode_hex(&hasher.finalize())
}

/// Replace the stored credential with one derived from `pin`.
pub fn set_pin(settings: &mut Settings, pin: &str) {
    let salt = generate_salt();
    settings.pin_hash = Some(derive_pin_hash(pin, &salt));
    settings.pin_salt = Some(salt);
}

pub fn verify_pin(settings: &Settings, pin: &str) -> PinVerification {
    let Some((salt, hash)) = settings.pin_material() else {
        return PinVerification::NeedsSetup;
    };
    if constant_time_eq(derive_pin_hash(pin, salt).as_bytes(), hash.as_bytes()) {
        PinVerification::Match
    } else {
        PinVerification::Mismatch
    }
}

/// Provision [`DEFAULT_PIN`] when no credential exists. Returns `true` if it did.
pub fn ensure_provisioned(settings: &mut Settings) -> bool {
    if settings.has_pin() {
        return false;
    }
    set_pin(settings, DEFAULT_PIN);
    true
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn encode_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_settings_need_setup() {
        let settings = Settings::default();
        assert_eq!(verify_pin(&settings, "123456"), PinVerification::NeedsSetup);
    }

    #[test]
    fn set_then_verify() {
        let mut settings = Settings::default();
        set_pin(&mut settings, "4242");

        assert_eq!(verify_pin(&settings, "4242"), PinVerification::Match);
        assert_eq!(verify_pin(&settings, "0000"), PinVerification::Mismatch);
        assert!(!verify_pin(&settings, "0000").needs_setup());
    }

    #[test]
    fn salt_is_128_bits_and_fresh_each_time() {
        let mut settings = Settings::default();
        set_pin(&mut settings, "4242");
        let first = settings.pin_salt.clone().unwrap();
        set_pin(&mut settings, "4242");
        let second = settings.pin_salt.clone().unwrap();

        assert_eq!(first.len(), SALT_LEN * 2);
        assert_ne!(first, second);
    }

    #[test]
    fn hash_matches_known_digest() {
        assert_eq!(
            derive_pin_hash("1234", "abcd"),
            "3188d8a34e3f61221cddd29a7cc76604232337457659f47e7905b4713472696b"
        );
        assert_ne!(derive_pin_hash("1234", "abcd"), derive_pin_hash("1234", "abce"));
    }

    #[test]
    fn provisioning_only_runs_once() {
        let mut settings = Settings::default();
        assert!(ensure_provisioned(&mut settings));
        assert_eq!(verify_pin(&settings, DEFAULT_PIN), PinVerification::Match);

        set_pin(&mut settings, "9999");
        assert!(!ensure_provisioned(&mut settings));
        assert_eq!(verify_pin(&settings, "9999"), PinVerification::Match);
    }

    #[test]
    fn pin_shape() {
        assert!(is_valid_pin("0000"));
        assert!(!is_valid_pin(""));
        assert!(!is_valid_pin("12a4"));
        assert!(!is_valid_pin(" 1234"));
    }
}
