/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Vaultshell host crate.
//!
//! Wires the portable kernel in `vaultshell-core` to disk, timers, and a
//! request/response command boundary. All state lives in one [`app::ShellApp`]
//! owned by the control loop; everything else talks to it through
//! [`command::ShellCommand`]s.

pub mod app;
pub mod command;
pub mod persistence;
pub mod prefs;
pub mod registry;
pub mod shell;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the stderr log subscriber. stdout is reserved for the IPC stream.
#[cfg(feature = "tracing")]
pub fn init_tracing(filter: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let filter = filter
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(prefs::DEFAULT_LOG_FILTER));
    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(e) = result {
        eprintln!("vaultshell: log subscriber already installed ({e})");
    }
}

#[cfg(not(feature = "tracing"))]
pub fn init_tracing(_filter: Option<&str>) {}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    //! Builders shared by unit tests and the scenario binary.

    use std::path::Path;
    use std::time::Duration;

    use vaultshell_core::lock::testing::VirtualTimers;

    use crate::app::ShellApp;
    use crate::persistence::{JsonStore, SaveRetryPolicy};

    /// A loaded, not yet started, app over `dir` driven by a virtual clock.
    pub fn app_in_dir(dir: &Path) -> (ShellApp, VirtualTimers) {
        let timers = VirtualTimers::new();
        let store = JsonStore::new(dir, SaveRetryPolicy::none());
        let app = ShellApp::load(store, Box::new(timers.clone()));
        (app, timers)
    }

    /// Advance `timers` by `by`, feeding each expiry back into `app`.
    pub fn advance(app: &mut ShellApp, timers: &VirtualTimers, by: Duration) {
        timers.advance(by, |token| {
            app.timer_fired(token);
        });
    }
}
