// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the coordinator using the in-memory transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use haptique_rs90::persistence::MacroStore;
use haptique_rs90::protocol::{MemoryTransport, Topics};
use haptique_rs90::readout;
use haptique_rs90::{Coordinator, CoordinatorConfig, Error, MacroState, RemoteState, RemoteStatus};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

const REMOTE_ID: &str = "rs90";
const WAIT: Duration = Duration::from_secs(2);
const SETTLE: Duration = Duration::from_millis(100);

fn topics() -> Topics {
    Topics::new("haptique", REMOTE_ID)
}

fn config(dir: &TempDir) -> CoordinatorConfig {
    CoordinatorConfig::new(REMOTE_ID).with_storage_dir(dir.path())
}

fn write_states(dir: &TempDir, json: &str) {
    let store = MacroStore::for_remote(dir.path(), REMOTE_ID);
    std::fs::write(store.path(), json).unwrap();
}

fn read_states(dir: &TempDir) -> serde_json::Value {
    let store = MacroStore::for_remote(dir.path(), REMOTE_ID);
    let contents = std::fs::read_to_string(store.path()).unwrap();
    serde_json::from_str(&contents).unwrap()
}

async fn start(dir: &TempDir) -> (Coordinator, MemoryTransport) {
    let transport = MemoryTransport::new();
    let coordinator = Coordinator::start(transport.clone(), config(dir))
        .await
        .unwrap();
    (coordinator, transport)
}

/// Waits until a snapshot satisfies `pred` and returns it.
async fn wait_for(
    coordinator: &Coordinator,
    mut pred: impl FnMut(&RemoteState) -> bool,
) -> RemoteState {
    let mut rx = coordinator.watch();
    timeout(WAIT, async {
        loop {
            {
                let state = rx.borrow_and_update();
                if pred(&state) {
                    return state.clone();
                }
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("state condition not reached")
}

/// Polls `check` until it holds.
async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn start_subscribes_fixed_topics_and_requests_battery() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;

        for (topic, _) in topics().fixed_subscriptions() {
            assert!(transport.is_subscribed(&topic), "{topic} not subscribed");
        }

        let requests = transport.published_to(&topics().battery_request());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].payload, "");
        assert!(!requests[0].retain);

        assert_eq!(coordinator.snapshot().status, RemoteStatus::Offline);
        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let result = Coordinator::start(MemoryTransport::new(), CoordinatorConfig::new("  ")).await;
        assert!(matches!(result, Err(Error::Value(_))));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;
        let other = coordinator.clone();

        let changes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&changes);
        coordinator.on_change(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut updates = coordinator.watch();

        transport.inject(&topics().status(), "online").await;
        wait_for(&coordinator, |s| s.status == RemoteStatus::Online).await;
        updates.borrow_and_update();

        coordinator.shutdown().await.unwrap();
        let notified = changes.load(Ordering::SeqCst);
        let unsubscribed = transport.unsubscribe_calls().len();
        assert_eq!(notified, 1);
        assert_eq!(unsubscribed, topics().fixed_subscriptions().len());

        coordinator.shutdown().await.unwrap();
        other.shutdown().await.unwrap();

        assert_eq!(changes.load(Ordering::SeqCst), notified);
        assert_eq!(transport.unsubscribe_calls().len(), unsubscribed);
        assert!(updates.has_changed().is_err());
        assert_eq!(updates.borrow().status, RemoteStatus::Online);
        assert!(!coordinator.is_running());
        assert!(transport.active_topics().is_empty());
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_coordinator() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;
        drop(coordinator);

        eventually(|| transport.active_topics().is_empty()).await;
    }

    #[tokio::test]
    async fn operations_after_shutdown_fail() {
        let dir = TempDir::new().unwrap();
        let (coordinator, _transport) = start(&dir).await;
        coordinator.shutdown().await.unwrap();

        assert!(matches!(
            coordinator.trigger_macro("X", MacroState::On).await,
            Err(Error::Stopped)
        ));
        assert!(matches!(coordinator.diagnostics().await, Err(Error::Stopped)));

        match coordinator.force_refresh().await {
            Err(Error::Refresh { snapshot, .. }) => {
                assert_eq!(snapshot.status, RemoteStatus::Offline);
            }
            other => panic!("expected refresh error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn periodic_refresh_requests_battery() {
        let dir = TempDir::new().unwrap();
        let transport = MemoryTransport::new();
        let coordinator = Coordinator::start(
            transport.clone(),
            config(&dir).with_refresh_interval(Duration::from_millis(50)),
        )
        .await
        .unwrap();

        let battery_request = topics().battery_request();
        eventually(|| transport.published_to(&battery_request).len() >= 3).await;

        let diagnostics = coordinator.diagnostics().await.unwrap();
        assert!(diagnostics.last_refresh_at.is_some());
        coordinator.shutdown().await.unwrap();
    }
}

// ============================================================================
// Telemetry topics
// ============================================================================

mod telemetry {
    use super::*;

    #[tokio::test]
    async fn status_and_test_status() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;

        transport.inject(&topics().status(), "online").await;
        let state = wait_for(&coordinator, |s| s.status == RemoteStatus::Online).await;
        assert!(readout::is_available(&state));

        transport.inject(&topics().test_status(), "Watch TV").await;
        let state = wait_for(&coordinator, |s| s.running_macro.is_some()).await;
        assert_eq!(state.running_macro.as_deref(), Some("Watch TV"));

        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn battery_values_are_parsed_and_clamped() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;
        let topic = topics().battery_level();
        let level = |s: &RemoteState| s.battery_level.map(|b| b.value());

        transport.inject(&topic, "85").await;
        wait_for(&coordinator, |s| level(s) == Some(85)).await;

        transport.inject(&topic, "85%").await;
        transport.inject(&topic, "92").await;
        wait_for(&coordinator, |s| level(s) == Some(92)).await;

        transport.inject(&topic, "150").await;
        wait_for(&coordinator, |s| level(s) == Some(100)).await;

        transport.inject(&topic, "garbage").await;
        transport.inject(&topic, "abc92%").await;
        sleep(SETTLE).await;
        assert_eq!(level(&coordinator.snapshot()), Some(100));

        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn key_presses() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;

        transport.inject(&topics().keys(), "button:7").await;
        let state = wait_for(&coordinator, |s| s.last_key.is_some()).await;
        assert_eq!(state.last_key.as_deref(), Some("7"));
        assert_eq!(readout::last_key_label(&state).as_deref(), Some("Button 7"));

        transport.inject(&topics().keys(), "garbage").await;
        sleep(SETTLE).await;
        assert_eq!(coordinator.snapshot().last_key.as_deref(), Some("7"));

        coordinator.shutdown().await.unwrap();
    }
}

// ============================================================================
// Discovery
// ============================================================================

mod discovery {
    use super::*;

    #[tokio::test]
    async fn device_delta_subscribes_once_and_purges_removed() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;
        let t = topics();
        let list = r#"[{"id":1,"name":"D1"},{"id":2,"name":"D2"}]"#;

        transport.inject(&t.devices(), list).await;
        eventually(|| {
            ["D1", "D2"].iter().all(|d| {
                t.device_catalog_topics(d)
                    .iter()
                    .all(|topic| transport.is_subscribed(topic))
            })
        })
        .await;

        // Each catalog topic gets exactly one retained request
        eventually(|| transport.published_to(&t.device_detail("D2")).len() == 1).await;
        let requests = transport.published_to(&t.device_commands("D1"));
        assert_eq!(requests.len(), 1);
        assert!(requests[0].retain);
        assert_eq!(requests[0].payload, "");

        // Same list again: nothing new
        transport.inject(&t.devices(), list).await;
        sleep(SETTLE).await;
        assert_eq!(transport.subscribe_count(&t.device_commands("D1")), 1);
        assert_eq!(transport.subscribe_count(&t.device_commands("D2")), 1);

        transport
            .inject(&t.device_commands("D2"), r#"[{"id":1,"name":"Power"}]"#)
            .await;
        wait_for(&coordinator, |s| s.commands_for("D2").len() == 1).await;

        transport.inject(&t.devices(), r#"[{"id":1,"name":"D1"}]"#).await;
        let state = wait_for(&coordinator, |s| s.devices.len() == 1).await;
        assert!(!state.device_commands.contains_key("D2"));

        eventually(|| {
            t.device_catalog_topics("D2")
                .iter()
                .all(|topic| !transport.is_subscribed(topic))
        })
        .await;
        assert!(transport.is_subscribed(&t.device_commands("D1")));

        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_list_keeps_previous() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;

        transport
            .inject(&topics().devices(), r#"[{"name":"TV"}]"#)
            .await;
        wait_for(&coordinator, |s| s.devices.len() == 1).await;

        transport.inject(&topics().devices(), "not json").await;
        transport.inject(&topics().devices(), r#"{"name":"TV"}"#).await;
        sleep(SETTLE).await;
        assert_eq!(coordinator.snapshot().device_names(), vec!["TV"]);

        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unnamed_records_are_listed_but_not_subscribed() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;

        transport
            .inject(&topics().macros(), r#"[{"id":1},{"Id":2,"name":"M"}]"#)
            .await;
        let state = wait_for(&coordinator, |s| s.macros.len() == 2).await;
        assert_eq!(state.macro_names(), vec!["M"]);

        let trigger = topics().macro_trigger("M");
        eventually(|| transport.is_subscribed(&trigger)).await;
        // Macro discovery never publishes a request
        assert!(transport.published_to(&trigger).is_empty());

        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn device_removed_while_subscribing_is_detached() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;
        let t = topics();
        transport.set_subscribe_delay(Some(Duration::from_millis(150)));

        transport.inject(&t.devices(), r#"[{"name":"D1"}]"#).await;
        wait_for(&coordinator, |s| s.devices.len() == 1).await;
        transport.inject(&t.devices(), "[]").await;
        wait_for(&coordinator, |s| s.devices.is_empty()).await;

        eventually(|| transport.subscribe_count(&t.device_detail("D1")) == 1).await;
        eventually(|| !transport.is_subscribed(&t.device_commands("D1"))).await;
        eventually(|| !transport.is_subscribed(&t.device_detail("D1"))).await;
        sleep(Duration::from_millis(300)).await;
        assert!(!transport.is_subscribed(&t.device_commands("D1")));
        assert!(!transport.is_subscribed(&t.device_detail("D1")));

        transport.set_subscribe_delay(None);
        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn failed_subscription_is_retried_on_next_list() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;
        let t = topics();
        transport.fail_subscribe(t.device_commands("D1"));

        transport.inject(&t.devices(), r#"[{"name":"D1"}]"#).await;
        eventually(|| transport.subscribe_count(&t.device_commands("D1")) == 1).await;
        sleep(SETTLE).await;
        assert!(!transport.is_subscribed(&t.device_detail("D1")));
        assert!(
            coordinator
                .diagnostics()
                .await
                .unwrap()
                .subscribed_devices
                .is_empty()
        );

        transport.clear_subscribe_failure(&t.device_commands("D1"));
        transport.inject(&t.devices(), r#"[{"name":"D1"}]"#).await;
        eventually(|| {
            transport.is_subscribed(&t.device_commands("D1"))
                && transport.is_subscribed(&t.device_detail("D1"))
        })
        .await;

        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn device_removed_and_readded_stays_subscribed() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;
        let t = topics();
        let catalog = t.device_catalog_topics("TV");
        let listed = r#"[{"name":"TV"}]"#;

        transport.inject(&t.devices(), listed).await;
        eventually(|| catalog.iter().all(|topic| transport.is_subscribed(topic))).await;

        for round in 0..25 {
            transport.inject(&t.devices(), "[]").await;
            transport.inject(&t.devices(), listed).await;

            // Detach first, then a real transport subscribe
            eventually(|| transport.subscribe_count(&catalog[1]) == round + 2).await;
            eventually(|| catalog.iter().all(|topic| transport.is_subscribed(topic))).await;
            sleep(Duration::from_millis(20)).await;

            let diagnostics = coordinator.diagnostics().await.unwrap();
            assert_eq!(diagnostics.subscribed_devices, vec!["TV"], "round {round}");
            for topic in &catalog {
                assert!(transport.is_subscribed(topic), "round {round}: {topic} lost");
            }
        }

        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn macro_removed_and_readded_stays_subscribed() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;
        let t = topics();
        let trigger = t.macro_trigger("M");
        let listed = r#"[{"name":"M"}]"#;

        transport.inject(&t.macros(), listed).await;
        eventually(|| transport.is_subscribed(&trigger)).await;

        for round in 0..25 {
            transport.inject(&t.macros(), "[]").await;
            transport.inject(&t.macros(), listed).await;

            eventually(|| transport.subscribe_count(&trigger) == round + 2).await;
            eventually(|| transport.is_subscribed(&trigger)).await;
            sleep(Duration::from_millis(20)).await;

            let diagnostics = coordinator.diagnostics().await.unwrap();
            assert_eq!(diagnostics.subscribed_macros, vec!["M"], "round {round}");
            assert!(transport.is_subscribed(&trigger), "round {round}: trigger lost");
        }

        coordinator.shutdown().await.unwrap();
    }
}

// ============================================================================
// Macros
// ============================================================================

mod macros {
    use super::*;

    #[tokio::test]
    async fn persisted_states_are_loaded() {
        let dir = TempDir::new().unwrap();
        write_states(&dir, r#"{"macro_states":{"X":"off","Y":"on"}}"#);
        let (coordinator, _transport) = start(&dir).await;

        let state = coordinator.snapshot();
        assert_eq!(state.macro_state("X"), Some(MacroState::Off));
        assert_eq!(state.macro_state("Y"), Some(MacroState::On));

        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_state_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        write_states(&dir, "{ not json");
        let (coordinator, _transport) = start(&dir).await;

        assert!(coordinator.snapshot().macro_states.is_empty());
        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn trigger_publishes_retained_and_persists() {
        let dir = TempDir::new().unwrap();
        write_states(&dir, r#"{"macro_states":{"X":"off"}}"#);
        let (coordinator, transport) = start(&dir).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        coordinator.on_macro_state(move |name, state| sink.lock().push((name.to_string(), state)));

        coordinator.trigger_macro("X", MacroState::On).await.unwrap();

        let published = transport.published_to(&topics().macro_trigger("X"));
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].payload, "on");
        assert!(published[0].retain);
        assert_eq!(coordinator.snapshot().macro_state("X"), Some(MacroState::On));
        assert_eq!(*seen.lock(), vec![("X".to_string(), MacroState::On)]);

        coordinator.shutdown().await.unwrap();
        assert_eq!(read_states(&dir)["macro_states"]["X"], "on");
    }

    #[tokio::test]
    async fn toggle_negates_last_known_state() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;

        assert_eq!(coordinator.toggle_macro("X").await.unwrap(), MacroState::On);
        assert_eq!(coordinator.toggle_macro("X").await.unwrap(), MacroState::Off);

        let payloads: Vec<String> = transport
            .published_to(&topics().macro_trigger("X"))
            .into_iter()
            .map(|p| p.payload)
            .collect();
        assert_eq!(payloads, vec!["on", "off"]);

        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn publish_failure_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;
        transport.fail_publishes(true);

        let result = coordinator.trigger_macro("X", MacroState::On).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
        assert_eq!(coordinator.snapshot().macro_state("X"), None);

        transport.fail_publishes(false);
        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn empty_macro_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;

        let result = coordinator.trigger_macro("", MacroState::On).await;
        assert!(matches!(result, Err(Error::Value(_))));
        assert_eq!(transport.published().len(), 1);

        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn retained_trigger_value_is_adopted() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;
        transport
            .inject_retained(&topics().macro_trigger("M"), "on")
            .await;

        transport.inject(&topics().macros(), r#"[{"name":"M"}]"#).await;
        let state = wait_for(&coordinator, |s| s.macro_state("M").is_some()).await;
        assert_eq!(state.macro_state("M"), Some(MacroState::On));
        assert_eq!(readout::running_macro(&state), "M");

        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn removed_macro_is_dropped_from_disk() {
        let dir = TempDir::new().unwrap();
        write_states(&dir, r#"{"macro_states":{"X":"on","Y":"off"}}"#);
        let (coordinator, transport) = start(&dir).await;

        transport.inject(&topics().macros(), r#"[{"name":"Y"}]"#).await;
        wait_for(&coordinator, |s| s.macro_state("X").is_none()).await;

        coordinator.shutdown().await.unwrap();
        let file = read_states(&dir);
        assert!(file["macro_states"].get("X").is_none());
        assert_eq!(file["macro_states"]["Y"], "off");
    }
}

// ============================================================================
// Device commands, refresh and diagnostics
// ============================================================================

mod operations {
    use super::*;

    #[tokio::test]
    async fn device_command_is_not_retained() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;

        coordinator
            .trigger_device_command("TV", "Power")
            .await
            .unwrap();

        let published = transport.published_to(&topics().device_trigger("TV"));
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].payload, "Power");
        assert!(!published[0].retain);

        assert!(matches!(
            coordinator.trigger_device_command("TV", " ").await,
            Err(Error::Value(_))
        ));
        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn force_refresh_fans_out_to_subscribed_devices() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;
        let t = topics();

        transport.inject(&t.devices(), r#"[{"name":"D1"}]"#).await;
        eventually(|| transport.is_subscribed(&t.device_detail("D1"))).await;

        let report = coordinator.force_refresh().await.unwrap();
        assert_eq!(report.requests_sent, 3);
        assert_eq!(report.requests_failed, 0);
        assert_eq!(report.snapshot.device_names(), vec!["D1"]);

        let refresh_requests: Vec<_> = transport
            .published_to(&t.device_commands("D1"))
            .into_iter()
            .filter(|p| !p.retain)
            .collect();
        assert_eq!(refresh_requests.len(), 1);

        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn force_refresh_counts_failures() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;
        transport.fail_publishes(true);

        let report = coordinator.force_refresh().await.unwrap();
        assert_eq!(report.requests_sent, 0);
        assert_eq!(report.requests_failed, 1);

        transport.fail_publishes(false);
        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn diagnostics_reflect_state() {
        let dir = TempDir::new().unwrap();
        let (coordinator, transport) = start(&dir).await;
        let t = topics();

        transport
            .inject(&t.devices(), r#"[{"id":"a","name":"TV"}]"#)
            .await;
        transport.inject(&t.macros(), r#"[{"id":1,"name":"M"}]"#).await;
        eventually(|| {
            transport.is_subscribed(&t.device_detail("TV"))
                && transport.is_subscribed(&t.macro_trigger("M"))
        })
        .await;
        transport
            .inject(&t.device_detail("TV"), r#"[{"name":"Power"},{"name":"Mute"}]"#)
            .await;
        wait_for(&coordinator, |s| s.commands_for("TV").len() == 2).await;

        let diagnostics = coordinator.diagnostics().await.unwrap();
        assert_eq!(diagnostics.remote_id, REMOTE_ID);
        assert_eq!(diagnostics.devices_count, 1);
        assert_eq!(diagnostics.macros_count, 1);
        assert_eq!(diagnostics.device_commands.get("TV"), Some(&2));
        assert_eq!(diagnostics.subscribed_devices, vec!["TV"]);
        assert_eq!(diagnostics.subscribed_macros, vec!["M"]);
        assert_eq!(diagnostics.subscriptions_count, 6 + 2 + 1);
        assert!(diagnostics.last_message_at.is_some());

        let json = serde_json::to_value(&diagnostics).unwrap();
        assert_eq!(json["devices_count"], 1);

        coordinator.shutdown().await.unwrap();
    }
}
