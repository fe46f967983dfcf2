/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Portable kernel for Vaultshell.
//!
//! Everything in this crate is synchronous and free of I/O: the host crate
//! owns files, timers, and the command loop, and feeds results back in.
//!
//! - [`settings`]: persisted settings model and its load-time normalization.
//! - [`pin`]: salted PIN hashing and verification.
//! - [`partition`]: storage-partition naming and allocation.
//! - [`lock`]: the inactivity lock state machine and its timer seam.
//! - [`bookmarks`]: favorite and pinned-tab lists keyed by partition.

pub mod bookmarks;
pub mod lock;
pub mod partition;
pub mod pin;
pub mod settings;

pub use bookmarks::{Bookmark, BookmarkDraft, BookmarkList, PinnedTab, RemoveKey};
pub use lock::{
    InactivityLock, LockEffect, LockState, TimerScheduler, TimerSlot, TimerToken, WindowRect,
};
pub use partition::PartitionAllocator;
pub use pin::PinVerification;
pub use settings::{Settings, SettingsView};
