/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::env;

use log::{info, warn};
use tokio::io::BufReader;
use tokio::runtime::Handle;

use crate::app::ShellApp;
use crate::persistence::{JsonStore, SaveRetryPolicy};
use crate::prefs::{AppPreferences, ArgumentParsingResult, parse_command_line_arguments};
use crate::shell::desktop::host::ipc::run_control_loop;
use crate::shell::desktop::runtime::control_panel::ControlPanel;

pub fn main() {
    // Skip the first argument, which is the binary name.
    let args: Vec<String> = env::args().skip(1).collect();
    let (preferences, prefs_problem) = match parse_command_line_arguments(&args) {
        ArgumentParsingResult::Run(preferences, problem) => (preferences, problem),
        ArgumentParsingResult::Exit => std::process::exit(0),
        ArgumentParsingResult::ErrorParsing => std::process::exit(1),
    };

    crate::init_tracing(Some(&preferences.log_filter));
    if let Some(problem) = prefs_problem {
        warn!("prefs: {problem}; using defaults");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    let handle = runtime.handle().clone();
    if let Err(e) = runtime.block_on(run(preferences, handle)) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(preferences: AppPreferences, runtime: Handle) -> std::io::Result<()> {
    info!(
        "vaultshell {} using data dir {}",
        crate::VERSION,
        preferences.data_dir.display()
    );
    let mut panel = ControlPanel::new();
    let store = JsonStore::new(
        &preferences.data_dir,
        SaveRetryPolicy::with_retries(preferences.save_retries),
    );
    let mut app = ShellApp::load(store, Box::new(panel.lock_timers(runtime)));
    let events = app.subscribe();

    panel.spawn_request_reader(BufReader::new(tokio::io::stdin()));
    app.start(preferences.startup_grace);

    let mut stdout = tokio::io::stdout();
    let result = run_control_loop(&mut app, &mut panel, &events, &mut stdout).await;
    info!("vaultshell: request stream closed; exiting");
    result
}
