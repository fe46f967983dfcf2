/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Command-line and file preferences.
//!
//! Precedence is CLI, then `prefs.toml`, then built-in defaults. The prefs
//! file lives at `--config` or `<data-dir>/prefs.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bpaf::{Bpaf, ParseFailure};
use serde::Deserialize;

use crate::persistence::{DEFAULT_SAVE_RETRIES, default_data_dir};

pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_STARTUP_GRACE_MS: u64 = 300;
pub const PREFS_FILE: &str = "prefs.toml";

/// Multi-site browser shell host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Bpaf)]
#[bpaf(options, version)]
pub struct CliArgs {
    /// Directory holding settings, favorites, and pinned tabs
    #[bpaf(long("data-dir"), argument("DIR"))]
    pub data_dir: Option<PathBuf>,
    /// Preferences file (defaults to <data-dir>/prefs.toml)
    #[bpaf(long("config"), argument("PATH"))]
    pub config: Option<PathBuf>,
    /// Log filter directives, e.g. "debug" or "vaultshell=trace"
    #[bpaf(long("log-filter"), argument("FILTER"))]
    pub log_filter: Option<String>,
    /// Delay before the startup lock engages
    #[bpaf(long("startup-grace-ms"), argument("MS"))]
    pub startup_grace_ms: Option<u64>,
    /// How many times a failed save is retried
    #[bpaf(long("save-retries"), argument("N"))]
    pub save_retries: Option<usize>,
}

/// Contents of `prefs.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FilePrefs {
    pub data_dir: Option<PathBuf>,
    pub log_filter: Option<String>,
    pub startup_grace_ms: Option<u64>,
    pub save_retries: Option<usize>,
}

/// Fully resolved preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPreferences {
    pub data_dir: PathBuf,
    pub log_filter: String,
    pub startup_grace: Duration,
    pub save_retries: usize,
}

#[derive(Debug)]
pub enum PrefsError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for PrefsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrefsError::Io(e) => write!(f, "IO error: {e}"),
            PrefsError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for PrefsError {}

pub enum ArgumentParsingResult {
    /// Resolved preferences, plus a prefs-file problem to report once logging is up.
    Run(AppPreferences, Option<PrefsError>),
    Exit,
    ErrorParsing,
}

pub fn parse_command_line_arguments(args: &[String]) -> ArgumentParsingResult {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match cli_args().run_inner(args.as_slice()) {
        Ok(cli) => {
            let (preferences, problem) = resolve(cli);
            ArgumentParsingResult::Run(preferences, problem)
        }
        Err(ParseFailure::Stdout(doc, full)) => {
            println!("{}", doc.monochrome(full));
            ArgumentParsingResult::Exit
        }
        Err(ParseFailure::Completion(script)) => {
            print!("{script}");
            ArgumentParsingResult::Exit
        }
        Err(ParseFailure::Stderr(doc)) => {
            eprintln!("{}", doc.monochrome(true));
            ArgumentParsingResult::ErrorParsing
        }
    }
}

/// Merge `cli` over the prefs file over defaults. A broken prefs file is
/// ignored and handed back for reporting.
pub fn resolve(cli: CliArgs) -> (AppPreferences, Option<PrefsError>) {
    let base_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let prefs_path = cli.config.clone().unwrap_or_else(|| base_dir.join(PREFS_FILE));
    let (file, problem) = match load_file_prefs(&prefs_path) {
        Ok(file) => (file.unwrap_or_default(), None),
        Err(e) => (FilePrefs::default(), Some(e)),
    };
    (merge(cli, file, base_dir), problem)
}

fn merge(cli: CliArgs, file: FilePrefs, base_dir: PathBuf) -> AppPreferences {
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => file.data_dir.unwrap_or(base_dir),
    };
    AppPreferences {
        data_dir,
        log_filter: cli
            .log_filter
            .or(file.log_filter)
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        startup_grace: Duration::from_millis(
            cli.startup_grace_ms
                .or(file.startup_grace_ms)
                .unwrap_or(DEFAULT_STARTUP_GRACE_MS),
        ),
        save_retries: cli
            .save_retries
            .or(file.save_retries)
            .unwrap_or(DEFAULT_SAVE_RETRIES),
    }
}

/// `Ok(None)` when there is no prefs file.
pub fn load_file_prefs(path: &Path) -> Result<Option<FilePrefs>, PrefsError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| PrefsError::Io(format!("Failed to read {}: {e}", path.display())))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| PrefsError::Parse(format!("{}: {e}", path.display())))
}
