/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Inactivity lock state machine.
//!
//! The machine never reads a clock. It asks for timers through
//! [`LockEffect::ArmTimer`] and is told about expiry through
//! [`InactivityLock::timer_fired`], which makes it drivable by a tokio worker in
//! production and by [`testing::VirtualTimers`] in tests.
//!
//! ```text
//!   Unlocked ──activity──▶ OverlayPending ──timer──▶ Locked
//!       ▲                    │  ▲  activity            │
//!       │                    └──┘  (re-arm)            │
//!       └──────────────── PIN verified ◀───────────────┘
//! ```
//!
//! Activity is ignored while `Locked`; only a verified PIN dismisses the overlay.

use std::time::Duration;

use crate::settings::INACTIVITY_MIN_MS;

/// Host window geometry the overlay has to cover.
pub type WindowRect = euclid::default::Rect<i32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    /// Inactivity timer armed, overlay not shown.
    OverlayPending,
    /// Overlay visible, main surface blocked.
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerSlot {
    Inactivity,
    /// One-shot lock shortly after launch. Activity does not cancel it.
    StartupGrace,
}

/// Identifies one arming of a timer slot. A fired token that no longer
/// matches the slot's current arming is stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub slot: TimerSlot,
    pub generation: u64,
}

/// Timer seam implemented by the host.
///
/// At most one timer is outstanding per slot: arming a slot replaces the
/// previous arming.
pub trait TimerScheduler {
    fn arm(&mut self, token: TimerToken, after: Duration);
    fn cancel(&mut self, slot: TimerSlot);
}

#[derive(Debug, Clone, PartialEq)]
pub enum LockEffect {
    ArmTimer { token: TimerToken, after: Duration },
    CancelTimer { slot: TimerSlot },
    ShowOverlay { bounds: Option<WindowRect> },
    HideOverlay,
    RepositionOverlay { bounds: WindowRect },
}

/// Hand timer effects to `scheduler` and return the overlay effects for the
/// presentation layer, in order.
pub fn route_effects(
    effects: Vec<LockEffect>,
    scheduler: &mut dyn TimerScheduler,
) -> Vec<LockEffect> {
    let mut overlay = Vec::new();
    for effect in effects {
        match effect {
            LockEffect::ArmTimer { token, after } => scheduler.arm(token, after),
            LockEffect::CancelTimer { slot } => scheduler.cancel(slot),
            other => overlay.push(other),
        }
    }
    overlay
}

#[derive(Debug, Clone)]
pub struct InactivityLock {
    state: LockState,
    enabled: bool,
    interval: Duration,
    next_generation: u64,
    inactivity_timer: Option<TimerToken>,
    startup_timer: Option<TimerToken>,
    host_bounds: Option<WindowRect>,
}

impl InactivityLock {
    pub fn new(enabled: bool, interval: Duration) -> Self {
        Self {
            state: LockState::Unlocked,
            enabled,
            interval: clamp_interval(interval),
            next_generation: 0,
            inactivity_timer: None,
            startup_timer: None,
            host_bounds: None,
        }
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state == LockState::Locked
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current arming of the inactivity slot, if any.
    pub fn pending_timer(&self) -> Option<TimerToken> {
        self.inactivity_timer
    }

    /// Launch sequence: arm the inactivity timer and the startup-grace lock.
    pub fn start(&mut self, startup_grace: Duration) -> Vec<LockEffect> {
        let mut effects = Vec::new();
        if self.enabled && !self.is_locked() {
            self.arm_inactivity(&mut effects);
        }
        let token = self.issue_token(TimerSlot::StartupGrace);
        self.startup_timer = Some(token);
        effects.push(LockEffect::ArmTimer {
            token,
            after: startup_grace,
        });
        effects
    }

    /// Any user-activity signal: restart the countdown.
    pub fn record_activity(&mut self) -> Vec<LockEffect> {
        if !self.enabled || self.is_locked() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        self.arm_inactivity(&mut effects);
        effects
    }

    pub fn timer_fired(&mut self, token: TimerToken) -> Vec<LockEffect> {
        match token.slot {
            TimerSlot::Inactivity => {
                if self.inactivity_timer != Some(token) {
                    return Vec::new();
                }
                self.inactivity_timer = None;
                if !self.enabled {
                    self.state = LockState::Unlocked;
                    return Vec::new();
                }
                self.engage()
            }
            TimerSlot::StartupGrace => {
                if self.startup_timer != Some(token) {
                    return Vec::new();
                }
                self.startup_timer = None;
                self.engage()
            }
        }
    }

    /// Force the overlay up immediately.
    pub fn show(&mut self) -> Vec<LockEffect> {
        self.engage()
    }

    /// Dismiss the overlay after a verified PIN and restart the countdown.
    pub fn unlock(&mut self) -> Vec<LockEffect> {
        if !self.is_locked() {
            return Vec::new();
        }
        self.state = LockState::Unlocked;
        let mut effects = vec![LockEffect::HideOverlay];
        if self.enabled {
            self.arm_inactivity(&mut effects);
        }
        effects
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Vec<LockEffect> {
        if self.enabled == enabled {
            return Vec::new();
        }
        self.enabled = enabled;
        let mut effects = Vec::new();
        if enabled {
            if !self.is_locked() {
                self.arm_inactivity(&mut effects);
            }
        } else {
            self.disarm_inactivity(&mut effects);
            if self.state == LockState::OverlayPending {
                self.state = LockState::Unlocked;
            }
        }
        effects
    }

    pub fn toggle(&mut self) -> Vec<LockEffect> {
        self.set_enabled(!self.enabled)
    }

    /// Apply a new idle interval (floored at one minute) and restart the countdown.
    pub fn set_interval(&mut self, interval: Duration) -> Vec<LockEffect> {
        self.interval = clamp_interval(interval);
        if !self.enabled || self.is_locked() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        self.arm_inactivity(&mut effects);
        effects
    }

    /// Track host window geometry; while locked the overlay follows it.
    pub fn host_bounds_changed(&mut self, bounds: WindowRect) -> Vec<LockEffect> {
        self.host_bounds = Some(bounds);
        if self.is_locked() {
            vec![LockEffect::RepositionOverlay { bounds }]
        } else {
            Vec::new()
        }
    }

    fn engage(&mut self) -> Vec<LockEffect> {
        if self.is_locked() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        self.disarm_inactivity(&mut effects);
        self.state = LockState::Locked;
        effects.push(LockEffect::ShowOverlay {
            bounds: self.host_bounds,
        });
        effects
    }

    fn issue_token(&mut self, slot: TimerSlot) -> TimerToken {
        self.next_generation = self.next_generation.wrapping_add(1);
        TimerToken {
            slot,
            generation: self.next_generation,
        }
    }

    fn arm_inactivity(&mut self, effects: &mut Vec<LockEffect>) {
        let token = self.issue_token(TimerSlot::Inactivity);
        self.inactivity_timer = Some(token);
        self.state = LockState::OverlayPending;
        effects.push(LockEffect::ArmTimer {
            token,
            after: self.interval,
        });
    }

    fn disarm_inactivity(&mut self, effects: &mut Vec<LockEffect>) {
        if self.inactivity_timer.take().is_some() {
            effects.push(LockEffect::CancelTimer {
                slot: TimerSlot::Inactivity,
            });
        }
    }
}

fn clamp_interval(interval: Duration) -> Duration {
    interval.max(Duration::from_millis(INACTIVITY_MIN_MS))
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    //! Deterministic timer scheduler over a virtual clock.

    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;
    use std::time::Duration;

    use super::{TimerScheduler, TimerSlot, TimerToken};

    #[derive(Debug, Default)]
    struct VirtualTimersInner {
        now: Duration,
        armed: BTreeMap<TimerSlot, (TimerToken, Duration)>,
    }

    /// Clones share one clock, so a test can keep a handle while the
    /// component under test owns another.
    #[derive(Debug, Clone, Default)]
    pub struct VirtualTimers {
        inner: Rc<RefCell<VirtualTimersInner>>,
    }

    impl VirtualTimers {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn now(&self) -> Duration {
            self.inner.borrow().now
        }

        /// Token and absolute deadline armed in `slot`.
        pub fn armed(&self, slot: TimerSlot) -> Option<(TimerToken, Duration)> {
            self.inner.borrow().armed.get(&slot).copied()
        }

        pub fn outstanding(&self) -> usize {
            self.inner.borrow().armed.len()
        }

        /// Move the clock forward by `by`, calling `fire` for each timer whose
        /// deadline is reached, earliest first. Timers armed from inside `fire`
        /// are honoured if they fall due before the end of the window.
        pub fn advance<F>(&self, by: Duration, mut fire: F)
        where
            F: FnMut(TimerToken),
        {
            let target = self.now() + by;
            loop {
                let due = {
                    let mut inner = self.inner.borrow_mut();
                    let earliest = inner
                        .armed
                        .iter()
                        .filter(|(_, (_, deadline))| *deadline <= target)
                        .min_by_key(|(_, (_, deadline))| *deadline)
                        .map(|(slot, (token, deadline))| (*slot, *token, *deadline));
                    earliest.map(|(slot, token, deadline)| {
                        inner.armed.remove(&slot);
                        inner.now = deadline;
                        token
                    })
                };
                match due {
                    Some(token) => fire(token),
                    None => break,
                }
            }
            self.inner.borrow_mut().now = target;
        }
    }

    impl TimerScheduler for VirtualTimers {
        fn arm(&mut self, token: TimerToken, after: Duration) {
            let mut inner = self.inner.borrow_mut();
            let deadline = inner.now + after;
            inner.armed.insert(token.slot, (token, deadline));
        }

        fn cancel(&mut self, slot: TimerSlot) {
            self.inner.borrow_mut().armed.remove(&slot);
        }
    }
}
