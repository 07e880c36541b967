//! Worker loop behaviour

mod common;

use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use common::{assets, mock_detector, noise, with_patch};
use sightclick::mock::{MockClicker, MockScreen};
use sightclick::{EngineConfig, ExecuteOptions, LoopSettings, Orchestrator, TemplateStore};

fn quick_settings() -> LoopSettings {
    LoopSettings {
        poll_interval: Duration::from_millis(20),
        cooldown: Duration::from_millis(50),
        execute: ExecuteOptions {
            step_delay: Duration::from_millis(5),
            timeout_per_step: Duration::from_millis(500),
            check_interval: Duration::from_millis(20),
        },
    }
}

/// Collect messages until one equals `wanted` or the deadline passes
fn wait_for(rx: &Receiver<String>, wanted: &str, timeout: Duration) -> Vec<String> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(left) {
            Ok(message) => {
                let done = message == wanted;
                seen.push(message);
                if done {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    seen
}

/// Store with a visible "daily-quest" (claim, confirm) and an invisible "event"
fn fixture() -> (TemplateStore, MockScreen) {
    let claim = noise(16, 16, 1);
    let confirm = noise(14, 14, 2);
    let event = noise(16, 16, 3);

    let store = TemplateStore::from_assets(&assets(&[
        ("daily-quest", "claim", &claim),
        ("daily-quest", "confirm", &confirm),
        ("event", "open", &event),
    ]))
    .unwrap();

    let frame = with_patch(&noise(100, 80, 4), &claim, 10, 10);
    let frame = with_patch(&frame, &confirm, 60, 50);
    (store, MockScreen::new(frame))
}

#[test]
fn test_runs_visible_sequence() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (store, screen) = fixture();
    let clicker = MockClicker::new();
    let (tx, rx) = mpsc::channel();
    let mut orchestrator = Orchestrator::new(mock_detector(&screen, &clicker), store.into_sequences())
        .with_settings(quick_settings())
        .with_log(tx);

    orchestrator.start().unwrap();
    let messages = wait_for(&rx, "Completed!", Duration::from_secs(20));
    orchestrator.stop();

    assert!(messages.contains(&"Enabled: daily-quest, event".to_string()));
    assert!(messages.contains(&"Found 'daily-quest' (#1)".to_string()));
    assert!(messages.contains(&"Executing: daily-quest".to_string()));
    assert_eq!(messages.last().map(String::as_str), Some("Completed!"));
    assert!(orchestrator.execution_count() >= 1);
    assert!(clicker.clicks().len() >= 2);

    let tail: Vec<String> = rx.try_iter().collect();
    let total = orchestrator.execution_count();
    assert_eq!(
        tail.last().map(String::as_str),
        Some(format!("Stopped. Total: {}", total).as_str())
    );
}

#[test]
fn test_enabled_set_can_change_while_running() {
    let (store, screen) = fixture();
    let clicker = MockClicker::new();
    let (tx, rx) = mpsc::channel();
    let mut orchestrator = Orchestrator::new(mock_detector(&screen, &clicker), store.into_sequences())
        .with_settings(quick_settings())
        .with_log(tx);
    orchestrator.set_enabled("daily-quest", false);

    orchestrator.start().unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while screen.captures() < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(orchestrator.execution_count(), 0);
    assert!(clicker.clicks().is_empty());

    orchestrator.set_enabled("daily-quest", true);
    let messages = wait_for(&rx, "Found 'daily-quest' (#1)", Duration::from_secs(20));
    orchestrator.stop();

    assert_eq!(messages.last().map(String::as_str), Some("Found 'daily-quest' (#1)"));
}

#[test]
fn test_from_config_applies_enabled_list() {
    let (store, screen) = fixture();
    let mut config = EngineConfig::default().with_cooldown(0.25);
    config.polling.enabled = vec!["event".to_string()];

    let orchestrator = Orchestrator::from_config(
        mock_detector(&screen, &MockClicker::new()),
        store.into_sequences(),
        &config,
    );

    assert_eq!(orchestrator.enabled().into_iter().collect::<Vec<_>>(), vec!["event"]);
    assert_eq!(orchestrator.settings().cooldown, Duration::from_millis(250));
    assert_eq!(orchestrator.sequences().len(), 2);
}

#[test]
fn test_restart_after_stop() {
    let (store, screen) = fixture();
    let (tx, rx) = mpsc::channel();
    let mut orchestrator = Orchestrator::new(
        mock_detector(&screen, &MockClicker::new()),
        store.into_sequences(),
    )
    .with_settings(quick_settings())
    .with_log(tx);
    orchestrator.set_enabled("daily-quest", false);

    orchestrator.start().unwrap();
    orchestrator.stop();
    assert!(orchestrator.detector().is_some());

    orchestrator.start().unwrap();
    assert!(orchestrator.is_running());
    orchestrator.stop();

    let stopped = rx
        .try_iter()
        .filter(|m| m.starts_with("Stopped. Total:"))
        .count();
    assert_eq!(stopped, 2);
}
