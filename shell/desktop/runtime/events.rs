/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Notifications from the control loop to presentation-layer listeners.
//!
//! Listeners hold a [`Receiver`] from [`EventBus::subscribe`]. Dropping it
//! unsubscribes; the bus prunes dead senders on the next publish.

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use vaultshell_core::{Bookmark, PinnedTab, WindowRect};

/// Host window geometry as it crosses the command boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl From<WindowRect> for WindowBounds {
    fn from(rect: WindowRect) -> Self {
        Self {
            x: rect.origin.x,
            y: rect.origin.y,
            width: rect.size.width,
            height: rect.size.height,
        }
    }
}

impl From<WindowBounds> for WindowRect {
    fn from(bounds: WindowBounds) -> Self {
        euclid::rect(bounds.x, bounds.y, bounds.width, bounds.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ShellEvent {
    /// Favorites changed; menus listing them should be rebuilt.
    BookmarksChanged { bookmarks: Vec<Bookmark> },
    PinnedTabsChanged { pinned_tabs: Vec<PinnedTab> },
    /// The lock was toggled; the lock menu item flips its label.
    LockEnabledChanged { lock_enabled: bool },
    OverlayShown { bounds: Option<WindowBounds> },
    OverlayHidden,
    OverlayMoved { bounds: WindowBounds },
    SessionEnsured { partition: String },
    /// A new PIN was stored. It cannot be recovered if forgotten.
    PinChanged,
}

#[derive(Debug, Default)]
pub struct EventBus {
    listeners: Vec<Sender<ShellEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<ShellEvent> {
        let (tx, rx) = unbounded();
        self.listeners.push(tx);
        rx
    }

    pub fn publish(&mut self, event: ShellEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}
