use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use vaultshell::VERSION;
use vaultshell::app::ShellApp;
use vaultshell::command::{CommandResponse, ShellCommand};
use vaultshell::persistence::{JsonStore, SaveRetryPolicy};
use vaultshell::test_utils::{advance, app_in_dir};
use vaultshell_core::pin::{DEFAULT_PIN, verify_pin};
use vaultshell_core::{LockState, PinVerification, Settings};

fn request(app: &mut ShellApp, command: &str, payload: Value) -> Value {
    let command = ShellCommand::from_request(json!({"command": command, "payload": payload}))
        .expect("known command");
    serde_json::to_value(app.handle(command)).expect("response encodes")
}

#[test]
fn scenarios_binary_smoke_runs() {
    assert!(!VERSION.is_empty());
}

#[test]
fn add_then_remove_by_url_scenario() {
    let dir = TempDir::new().unwrap();
    let (mut app, _timers) = app_in_dir(dir.path());

    let list = request(
        &mut app,
        "bookmarks.add",
        json!({"url": "https://example.com", "partition": "persist:example"}),
    );
    assert_eq!(
        list,
        json!([{
            "title": "https://example.com",
            "url": "https://example.com",
            "partition": "persist:example",
        }])
    );

    let list = request(&mut app, "bookmarks.remove", json!("https://example.com"));
    assert_eq!(list, json!([]));
    assert_eq!(request(&mut app, "bookmarks.list", Value::Null), json!([]));
}

#[test]
fn duplicate_partition_add_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (mut app, _timers) = app_in_dir(dir.path());
    let payload = json!({
        "title": "Mail",
        "url": "https://mail.example.com",
        "partition": "persist:mail",
    });

    let first = request(&mut app, "bookmarks.add", payload.clone());
    let second = request(&mut app, "bookmarks.add", payload);
    assert_eq!(first, second);
    assert_eq!(second.as_array().map(Vec::len), Some(1));
}

#[test]
fn remove_by_partition_spares_same_domain_siblings() {
    let dir = TempDir::new().unwrap();
    let (mut app, _timers) = app_in_dir(dir.path());
    for partition in ["persist:ex", "persist:ex1", "persist:ex12"] {
        request(
            &mut app,
            "bookmarks.add",
            json!({"url": "https://ex.com", "partition": partition}),
        );
    }

    let list = request(&mut app, "bookmarks.remove", json!({"partition": "persist:ex1"}));
    let partitions: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|entry| entry["partition"].as_str())
        .collect();
    assert_eq!(partitions, vec!["persist:ex", "persist:ex12"]);
}

#[test]
fn partitions_count_up_and_are_never_reissued() {
    let dir = TempDir::new().unwrap();
    let (mut app, _timers) = app_in_dir(dir.path());
    request(
        &mut app,
        "bookmarks.add",
        json!({"url": "https://d.io", "partition": "persist:d_io"}),
    );
    request(
        &mut app,
        "bookmarks.add",
        json!({"url": "https://d.io", "partition": "persist:d_io2"}),
    );

    let opened = request(&mut app, "favorites.open", json!("d.io"));
    assert_eq!(opened["bookmark"]["partition"], "persist:d_io3");

    request(&mut app, "bookmarks.remove", json!({"partition": "persist:d_io3"}));
    let reopened = request(&mut app, "favorites.open", json!("https://d.io/"));
    assert_eq!(reopened["bookmark"]["partition"], "persist:d_io4");
}

#[test]
fn pin_needs_setup_only_before_provisioning() {
    let mut settings = Settings::default();
    assert_eq!(verify_pin(&settings, "4242"), PinVerification::NeedsSetup);

    vaultshell_core::pin::set_pin(&mut settings, "4242");
    assert_eq!(verify_pin(&settings, "4242"), PinVerification::Match);
    assert_eq!(verify_pin(&settings, "0000"), PinVerification::Mismatch);
}

#[test]
fn verify_reports_mismatch_and_setup_separately() {
    let dir = TempDir::new().unwrap();
    let (mut app, _timers) = app_in_dir(dir.path());

    assert_eq!(
        request(&mut app, "lock.verify", json!("0000")),
        json!({"ok": false, "needsSetup": false})
    );
    assert_eq!(request(&mut app, "lock.setpin", json!("4242")), json!({"ok": true}));
    assert_eq!(
        request(&mut app, "lock.verify", json!("4242")),
        json!({"ok": true, "needsSetup": false})
    );
}

#[test]
fn activity_resets_the_inactivity_countdown() {
    let dir = TempDir::new().unwrap();
    let (mut app, timers) = app_in_dir(dir.path());
    assert_eq!(request(&mut app, "settings.setInactivity", json!(60_000)), json!(60_000));

    request(&mut app, "lock.activity", Value::Null);
    advance(&mut app, &timers, Duration::from_millis(59_000));
    request(&mut app, "lock.activity", Value::Null);

    advance(&mut app, &timers, Duration::from_millis(59_999));
    assert_eq!(app.lock_state(), LockState::OverlayPending);

    advance(&mut app, &timers, Duration::from_millis(1));
    assert_eq!(app.lock_state(), LockState::Locked);

    request(&mut app, "lock.activity", Value::Null);
    assert_eq!(app.lock_state(), LockState::Locked);
}

#[test]
fn inactivity_below_floor_is_clamped() {
    let dir = TempDir::new().unwrap();
    let (mut app, _timers) = app_in_dir(dir.path());
    assert_eq!(request(&mut app, "settings.setInactivity", json!(5)), json!(60_000));
    assert_eq!(
        request(&mut app, "settings.setInactivity", json!("not a number")),
        json!(300_000)
    );
}

#[test]
fn settings_round_trip_forces_lock_on() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::new(dir.path(), SaveRetryPolicy::none());
    let mut saved = Settings {
        lock_enabled: false,
        inactivity_ms: 90_000,
        ..Settings::default()
    };
    vaultshell_core::pin::set_pin(&mut saved, "777");
    assert!(store.save_settings(&saved));

    assert_eq!(
        store.load_settings(),
        Settings {
            lock_enabled: true,
            ..saved
        }
    );
}

#[test]
fn restart_restores_state_and_starts_locked() {
    let dir = TempDir::new().unwrap();
    {
        let (mut app, _timers) = app_in_dir(dir.path());
        request(&mut app, "favorites.open", json!("news.example.org"));
        request(
            &mut app,
            "pinned.set",
            json!([{
                "url": "https://news.example.org",
                "title": "News",
                "partition": "persist:news_example_org",
            }]),
        );
        request(&mut app, "lock.toggle", Value::Null);
    }

    let (mut app, timers) = app_in_dir(dir.path());
    let state = request(&mut app, "state.get", Value::Null);
    assert_eq!(state["settings"]["lockEnabled"], true);
    assert_eq!(state["bookmarks"][0]["partition"], "persist:news_example_org");
    assert_eq!(state["pinnedTabs"][0]["title"], "News");

    app.start(Duration::from_millis(300));
    advance(&mut app, &timers, Duration::from_millis(300));
    assert!(app.is_locked());

    let response = app.handle(ShellCommand::VerifyPin(DEFAULT_PIN.to_string()));
    assert_eq!(
        response,
        CommandResponse::Verification {
            ok: true,
            needs_setup: false
        }
    );
    assert!(!app.is_locked());
}

#[test]
fn fractional_interval_on_disk_keeps_the_saved_pin() {
    let dir = TempDir::new().unwrap();
    let mut saved = Settings::default();
    vaultshell_core::pin::set_pin(&mut saved, "4242");
    let mut document = serde_json::to_value(&saved).unwrap();
    document["inactivityMs"] = json!(90_000.5);
    std::fs::write(dir.path().join("settings.json"), document.to_string()).unwrap();

    let (mut app, _timers) = app_in_dir(dir.path());
    assert_eq!(
        request(&mut app, "lock.check", json!("4242")),
        json!({"ok": true, "needsSetup": false})
    );
    assert_eq!(
        request(&mut app, "lock.check", json!(DEFAULT_PIN)),
        json!({"ok": false, "needsSetup": false})
    );
    let state = request(&mut app, "state.get", Value::Null);
    assert_eq!(state["settings"]["inactivityMs"], 90_000);
}

#[test]
fn corrupt_documents_fall_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("settings.json"), "][").unwrap();
    std::fs::write(dir.path().join("bookmarks.json"), "{\"bookmarks\": 1}").unwrap();
    std::fs::write(dir.path().join("pinned.json"), "null").unwrap();

    let (mut app, _timers) = app_in_dir(dir.path());
    let state = request(&mut app, "state.get", Value::Null);
    assert_eq!(
        state,
        json!({
            "settings": {"lockEnabled": true, "inactivityMs": 300_000, "pinConfigured": true},
            "bookmarks": [],
            "pinnedTabs": [],
        })
    );
}
