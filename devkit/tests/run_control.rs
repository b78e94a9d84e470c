//! Run-control scenarios driven through the devkit harness.

use dax_devkit::test_utils::{TEST_HOST, TEST_MODE};
use dax_devkit::{CommandBuilder, ControllerCall, MockController, TestHarness};
use dax_reader::controller::{DacValues, HardwareController, RunState};
use serde_json::json;

#[tokio::test]
async fn happy_path_arm_start_stop() {
    let mut harness = TestHarness::new();

    harness.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;
    assert_eq!(harness.run_control().readout().links(), vec![0, 1]);
    assert_eq!(harness.controller.status(), RunState::Armed);

    harness.send_and_cycle(CommandBuilder::start("run_00042")).await;
    assert_eq!(harness.controller.status(), RunState::Running);
    assert_eq!(harness.run_control().current_run_id(), "run_00042");
    assert_eq!(harness.heartbeat().unwrap().current_run_id, "run_00042");

    harness.send_and_cycle(CommandBuilder::stop()).await;
    assert!(harness.run_control().readout().is_empty());
    assert_eq!(harness.controller.live_readers(), 0);
    assert_eq!(harness.run_control().current_run_id(), "none");
    assert_eq!(harness.journal.positions_with_prefix("reader:exit").len(), 2);

    let heartbeat = harness.heartbeat().unwrap();
    assert_eq!(heartbeat.status, RunState::Idle.ordinal());
    assert_eq!(heartbeat.current_run_id, "none");
}

#[tokio::test]
async fn every_command_is_acknowledged_before_dispatch() {
    let mut harness = TestHarness::new();

    let arm = harness.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;
    harness.assert_acknowledged(&arm).unwrap();
    harness
        .assert_before(&format!("store:ack:{arm}"), "controller:initialize")
        .unwrap();

    // Failing commands are acknowledged too
    let bad = harness.send_and_cycle(CommandBuilder::malformed()).await;
    harness.assert_acknowledged(&bad).unwrap();

    let ghost = harness.send_and_cycle(CommandBuilder::arm("no-such-mode")).await;
    harness.assert_acknowledged(&ghost).unwrap();

    // Nothing left to pick up
    harness.cycle().await;
    assert_eq!(harness.controller.count(&ControllerCall::Initialize(TEST_MODE.into())), 1);
}

#[tokio::test]
async fn acknowledge_failure_defers_the_command() {
    let mut harness = TestHarness::new();
    harness.store.fail_acknowledge(true);

    let id = harness.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;

    // Deferred, not applied, and the cycle still heartbeats.
    assert_eq!(harness.controller.count(&ControllerCall::Initialize(TEST_MODE.into())), 0);
    assert!(harness.run_control().readout().is_empty());
    assert!(harness.heartbeat().is_some());

    // Applied exactly once after the acknowledgment lands.
    harness.store.fail_acknowledge(false);
    harness.cycle().await;
    harness.cycle().await;
    harness.assert_acknowledged(&id).unwrap();
    assert_eq!(harness.controller.count(&ControllerCall::Initialize(TEST_MODE.into())), 1);
    assert_eq!(harness.controller.status(), RunState::Armed);
    assert_eq!(harness.run_control().readout().len(), 2);

    harness.send_and_cycle(CommandBuilder::stop()).await;
    assert!(harness.run_control().readout().is_empty());
}

#[tokio::test]
async fn stop_is_idempotent() {
    let mut idle = TestHarness::new();
    idle.send_and_cycle(CommandBuilder::stop()).await;

    let mut running = TestHarness::new();
    running.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;
    running.send_and_cycle(CommandBuilder::start(7)).await;
    running.send_and_cycle(CommandBuilder::stop()).await;

    for harness in [&idle, &running] {
        assert!(harness.run_control().readout().is_empty());
        assert_eq!(harness.run_control().current_run_id(), "none");
        assert_eq!(harness.controller.status(), RunState::Idle);
        assert_eq!(harness.heartbeat().unwrap().current_run_id, "none");
    }

    // A second stop changes nothing
    running.send_and_cycle(CommandBuilder::stop()).await;
    assert!(running.run_control().readout().is_empty());
    assert_eq!(running.run_control().current_run_id(), "none");
}

#[tokio::test]
async fn start_outside_armed_is_ignored() {
    let mut harness = TestHarness::new();

    harness.send_and_cycle(CommandBuilder::start("abc")).await;
    assert_eq!(harness.controller.count(&ControllerCall::Start), 0);
    assert_eq!(harness.run_control().current_run_id(), "none");
    assert_eq!(harness.controller.status(), RunState::Idle);

    harness.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;
    harness.send_and_cycle(CommandBuilder::start("abc")).await;
    assert_eq!(harness.controller.status(), RunState::Running);

    // Already running: the second start is dropped
    harness.send_and_cycle(CommandBuilder::start("xyz")).await;
    assert_eq!(harness.controller.count(&ControllerCall::Start), 1);
    assert_eq!(harness.run_control().current_run_id(), "abc");

    harness.send_and_cycle(CommandBuilder::stop()).await;
}

#[tokio::test]
async fn start_run_identifier_forms() {
    let cases = [
        (CommandBuilder::start("abc"), "abc"),
        (CommandBuilder::start(42), "42"),
        (CommandBuilder::start(json!({"nested": 1})), "na"),
        (CommandBuilder::new("start"), "na"),
    ];

    for (command, expected) in cases {
        let mut harness = TestHarness::new();
        harness.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;
        harness.send_and_cycle(command).await;
        assert_eq!(harness.run_control().current_run_id(), expected);
        harness.send_and_cycle(CommandBuilder::stop()).await;
    }
}

#[tokio::test]
async fn failed_arm_leaves_clean_state() {
    let mut harness = TestHarness::new();
    harness.controller.fail_next_initialize();

    harness.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;

    assert!(harness.run_control().readout().is_empty());
    assert_eq!(harness.controller.live_readers(), 0);
    assert_eq!(harness.memory().dac_snapshot_count(), 0);
    assert_eq!(harness.controller.status(), RunState::Idle);
    assert_eq!(harness.controller.calls().last(), Some(&ControllerCall::CheckErrors));
    assert!(harness.controller.calls().contains(&ControllerCall::End));

    // The next arm goes through
    harness.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;
    assert_eq!(harness.run_control().readout().len(), 2);
    assert_eq!(harness.memory().dac_snapshot_count(), 1);

    harness.send_and_cycle(CommandBuilder::stop()).await;
}

#[tokio::test]
async fn orphaned_readers_are_joined_before_rearm() {
    let mut harness = TestHarness::new();
    harness.controller.set_links(vec![0, 1, 2]);

    // No stop in between: the first generation is left running.
    harness.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;
    assert_eq!(harness.run_control().readout().len(), 3);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    harness.controller.set_links(vec![4, 5]);
    harness
        .send_and_cycle(CommandBuilder::arm(TEST_MODE).options_override(json!({"run_identifier": "second"})))
        .await;

    assert_eq!(harness.run_control().readout().links(), vec![4, 5]);
    assert_eq!(harness.controller.readers_at_initialize(), vec![0, 0]);
    assert!(!harness.controller.generations_overlapped());
    for link in 0..3 {
        harness
            .assert_before(&format!("reader:exit:{link}"), "store:dac:second")
            .unwrap();
    }

    harness.send_and_cycle(CommandBuilder::stop()).await;
    assert_eq!(harness.controller.live_readers(), 0);
}

#[tokio::test]
async fn arm_refused_outside_idle_arming_armed() {
    let mut harness = TestHarness::new();
    harness.controller.pin_state(Some(RunState::Error));

    harness.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;

    assert!(harness.run_control().readout().is_empty());
    assert_eq!(harness.controller.count(&ControllerCall::Initialize(TEST_MODE.into())), 0);
    assert_eq!(harness.memory().dac_snapshot_count(), 0);
}

#[tokio::test]
async fn rearm_from_armed_ends_previous_configuration() {
    let mut harness = TestHarness::new();
    harness.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;

    harness.controller.clear_calls();
    harness.controller.pin_state(Some(RunState::Armed));
    harness.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;
    harness.controller.pin_state(None);

    let calls = harness.controller.calls();
    assert_eq!(
        &calls[..3],
        &[
            ControllerCall::Stop,
            ControllerCall::End,
            ControllerCall::Initialize(TEST_MODE.into()),
        ]
    );

    harness.send_and_cycle(CommandBuilder::stop()).await;
}

#[tokio::test]
async fn dac_snapshot_keyed_by_resolved_run_identifier() {
    let mut harness = TestHarness::new();

    harness
        .send_and_cycle(CommandBuilder::arm(TEST_MODE).options_override(json!({"run_identifier": "abc"})))
        .await;
    let first = harness.memory().dac_snapshot("abc").unwrap();
    assert_eq!(first[&0], MockController::dac_values_for(1, 0));
    assert_eq!(harness.run_control().options().unwrap().get_string("run_identifier", ""), "abc");

    harness
        .send_and_cycle(CommandBuilder::arm(TEST_MODE).options_override(json!({"run_identifier": "abc"})))
        .await;
    let second = harness.memory().dac_snapshot("abc").unwrap();
    assert_eq!(harness.memory().dac_snapshot_count(), 1);
    assert_eq!(
        second,
        DacValues::from([
            (0, MockController::dac_values_for(2, 0)),
            (1, MockController::dac_values_for(2, 1)),
        ])
    );

    harness.send_and_cycle(CommandBuilder::stop()).await;
}

#[tokio::test]
async fn dac_write_failure_still_spawns_readout() {
    let mut harness = TestHarness::new();
    harness.store.fail_dac(true);

    harness.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;

    assert_eq!(harness.memory().dac_snapshot_count(), 0);
    assert_eq!(harness.run_control().readout().len(), 2);

    harness.send_and_cycle(CommandBuilder::stop()).await;
}

#[tokio::test]
async fn store_outages_never_stop_the_loop() {
    let mut harness = TestHarness::new();
    harness.store.fail_find(true);
    harness.store.fail_heartbeat(true);

    let id = harness.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;
    harness.cycle().await;
    assert!(harness.memory().acknowledgments(&id).is_empty());
    assert!(harness.heartbeat().is_none());
    assert_eq!(harness.controller.count(&ControllerCall::CheckErrors), 2);

    // Back online: the pending command is picked up.
    harness.store.fail_find(false);
    harness.store.fail_heartbeat(false);
    harness.cycle().await;
    harness.assert_acknowledged(&id).unwrap();
    assert!(harness.heartbeat().is_some());

    harness.send_and_cycle(CommandBuilder::stop()).await;
}

#[tokio::test]
async fn heartbeat_reports_controller_telemetry() {
    let mut harness = TestHarness::new();
    harness.send_and_cycle(CommandBuilder::arm(TEST_MODE)).await;

    harness.controller.set_data_size(3_000_000);
    harness.controller.set_buffer_length(2_500_000);
    harness.cycle().await;

    let heartbeat = harness.heartbeat().unwrap();
    assert_eq!(heartbeat.host, TEST_HOST);
    assert_eq!(heartbeat.rate, 3.0);
    assert_eq!(heartbeat.buffer_length, 2.5);
    assert_eq!(heartbeat.status, RunState::Armed.ordinal());
    assert_eq!(heartbeat.run_mode, TEST_MODE);
    assert_eq!(harness.memory().heartbeat_count(), 1);

    harness.send_and_cycle(CommandBuilder::stop()).await;
}

#[tokio::test]
async fn commands_for_other_hosts_are_ignored() {
    let mut harness = TestHarness::new();
    let id = harness
        .memory()
        .insert_command(CommandBuilder::arm(TEST_MODE).build_for("elsewhere_reader_0"));

    harness.cycle().await;

    assert!(harness.memory().acknowledgments(&id).is_empty());
    assert_eq!(harness.controller.count(&ControllerCall::Initialize(TEST_MODE.into())), 0);
}
