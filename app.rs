/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Application controller.
//!
//! [`ShellApp`] owns every piece of mutable state: settings, the session
//! registry, and the lock machine. It is driven one [`ShellCommand`] at a time
//! by a single control loop, which is the only thing that may call into it.

use std::time::Duration;

use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use vaultshell_core::lock::route_effects;
use vaultshell_core::pin::{self, is_valid_pin};
use vaultshell_core::{
    InactivityLock, LockEffect, LockState, PinVerification, Settings, TimerScheduler, TimerToken,
};

use crate::command::{CommandResponse, ShellCommand};
use crate::persistence::JsonStore;
use crate::registry::SessionRegistry;
use crate::shell::desktop::runtime::events::{EventBus, ShellEvent};

pub struct ShellApp {
    settings: Settings,
    registry: SessionRegistry,
    lock: InactivityLock,
    store: JsonStore,
    timers: Box<dyn TimerScheduler>,
    events: EventBus,
}

impl ShellApp {
    /// Load persisted state from `store`. Provisions the default PIN, and
    /// writes it back, when the settings carry none.
    pub fn load(store: JsonStore, timers: Box<dyn TimerScheduler>) -> Self {
        let mut settings = store.load_settings();
        if pin::ensure_provisioned(&mut settings) {
            warn!(
                "app: no PIN configured; provisioned the default PIN {}. \
                 Change it from the lock screen.",
                pin::DEFAULT_PIN
            );
            store.save_settings(&settings);
        }
        let registry = SessionRegistry::load(store.clone());
        let lock = InactivityLock::new(settings.lock_enabled, settings.inactivity_interval());
        Self {
            settings,
            registry,
            lock,
            store,
            timers,
            events: EventBus::new(),
        }
    }

    /// Launch sequence: restore pinned sessions, arm the idle countdown, and
    /// schedule the startup lock.
    pub fn start(&mut self, startup_grace: Duration) {
        let pinned: Vec<String> = self
            .registry
            .pinned()
            .iter()
            .map(|tab| tab.partition.clone())
            .collect();
        for partition in pinned {
            self.ensure_session(&partition);
        }
        let effects = self.lock.start(startup_grace);
        self.apply_lock_effects(effects);
        info!(
            "app: started with {} favorites; locking in {startup_grace:?}",
            self.registry.bookmarks().len()
        );
    }

    pub fn subscribe(&mut self) -> Receiver<ShellEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn lock_state(&self) -> LockState {
        self.lock.state()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    pub fn handle(&mut self, command: ShellCommand) -> CommandResponse {
        debug!("app: handling {}", command.name());
        match command {
            ShellCommand::GetState => CommandResponse::State {
                settings: self.settings.view(),
                bookmarks: self.registry.list(),
                pinned_tabs: self.registry.pinned().to_vec(),
            },
            ShellCommand::AddBookmark(draft) => {
                if self.registry.add(draft) {
                    self.publish_bookmarks();
                }
                CommandResponse::Bookmarks(self.registry.list())
            }
            ShellCommand::RemoveBookmark(key) => {
                self.registry.remove(key.as_ref());
                self.publish_bookmarks();
                CommandResponse::Bookmarks(self.registry.list())
            }
            ShellCommand::ListBookmarks => CommandResponse::Bookmarks(self.registry.list()),
            ShellCommand::ReorderBookmarks(order) => {
                self.registry.reorder(order);
                self.publish_bookmarks();
                CommandResponse::Bookmarks(self.registry.list())
            }
            ShellCommand::SetPinned(pinned) => {
                let stored = self.registry.set_pinned(pinned).to_vec();
                self.events.publish(ShellEvent::PinnedTabsChanged {
                    pinned_tabs: stored.clone(),
                });
                CommandResponse::Pinned(stored)
            }
            ShellCommand::CreateSession(partition) => {
                self.ensure_session(&partition);
                CommandResponse::Flag(!partition.is_empty())
            }
            ShellCommand::LockActivity => {
                let effects = self.lock.record_activity();
                self.apply_lock_effects(effects);
                CommandResponse::Flag(true)
            }
            ShellCommand::LockShow => {
                let effects = self.lock.show();
                self.apply_lock_effects(effects);
                CommandResponse::Flag(true)
            }
            ShellCommand::VerifyPin(candidate) => {
                let verification = pin::verify_pin(&self.settings, &candidate);
                if verification.ok() {
                    let effects = self.lock.unlock();
                    self.apply_lock_effects(effects);
                }
                verification_response(verification)
            }
            ShellCommand::CheckPin(candidate) => {
                verification_response(pin::verify_pin(&self.settings, &candidate))
            }
            ShellCommand::SetPin(new_pin) => {
                if !is_valid_pin(&new_pin) {
                    warn!("app: rejected PIN change; a PIN is 1 to 64 digits");
                    return CommandResponse::PinSet { ok: false };
                }
                pin::set_pin(&mut self.settings, &new_pin);
                self.store.save_settings(&self.settings);
                self.events.publish(ShellEvent::PinChanged);
                let effects = self.lock.unlock();
                self.apply_lock_effects(effects);
                CommandResponse::PinSet { ok: true }
            }
            ShellCommand::ToggleLock => {
                let enabled = !self.settings.lock_enabled;
                self.settings.lock_enabled = enabled;
                self.store.save_settings(&self.settings);
                let effects = self.lock.set_enabled(enabled);
                self.apply_lock_effects(effects);
                self.events.publish(ShellEvent::LockEnabledChanged {
                    lock_enabled: enabled,
                });
                CommandResponse::Flag(enabled)
            }
            ShellCommand::SetInactivity(ms) => {
                self.settings.inactivity_ms = ms;
                self.store.save_settings(&self.settings);
                let effects = self.lock.set_interval(Duration::from_millis(ms));
                self.apply_lock_effects(effects);
                CommandResponse::InactivityMs(ms)
            }
            ShellCommand::OpenFavorite(raw_url) => {
                let bookmark = self.registry.open_favorite(&raw_url);
                if let Some(bookmark) = &bookmark {
                    self.publish_bookmarks();
                    self.events.publish(ShellEvent::SessionEnsured {
                        partition: bookmark.partition.clone(),
                    });
                }
                CommandResponse::FavoriteOpened {
                    bookmark,
                    bookmarks: self.registry.list(),
                }
            }
            ShellCommand::WindowBounds(bounds) => match bounds {
                Some(bounds) => {
                    let effects = self.lock.host_bounds_changed(bounds.into());
                    self.apply_lock_effects(effects);
                    CommandResponse::Flag(true)
                }
                None => CommandResponse::Flag(false),
            },
            ShellCommand::LockTimerFired(token) => {
                self.timer_fired(token);
                CommandResponse::Flag(true)
            }
        }
    }

    /// A timer armed through the scheduler has expired.
    pub fn timer_fired(&mut self, token: TimerToken) {
        let effects = self.lock.timer_fired(token);
        if effects.is_empty() {
            debug!("app: timer {token:?} fired with nothing to do");
            return;
        }
        self.apply_lock_effects(effects);
    }

    fn ensure_session(&mut self, partition: &str) {
        if self.registry.ensure_session(partition) {
            self.events.publish(ShellEvent::SessionEnsured {
                partition: partition.to_string(),
            });
        }
    }

    fn publish_bookmarks(&mut self) {
        self.events.publish(ShellEvent::BookmarksChanged {
            bookmarks: self.registry.list(),
        });
    }

    fn apply_lock_effects(&mut self, effects: Vec<LockEffect>) {
        for effect in route_effects(effects, self.timers.as_mut()) {
            let event = match effect {
                LockEffect::ShowOverlay { bounds } => {
                    info!("app: locked");
                    ShellEvent::OverlayShown {
                        bounds: bounds.map(Into::into),
                    }
                }
                LockEffect::HideOverlay => {
                    info!("app: unlocked");
                    ShellEvent::OverlayHidden
                }
                LockEffect::RepositionOverlay { bounds } => ShellEvent::OverlayMoved {
                    bounds: bounds.into(),
                },
                LockEffect::ArmTimer { .. } | LockEffect::CancelTimer { .. } => continue,
            };
            self.events.publish(event);
        }
    }
}

fn verification_response(verification: PinVerification) -> CommandResponse {
    CommandResponse::Verification {
        ok: verification.ok(),
        needs_setup: verification.needs_setup(),
    }
}
