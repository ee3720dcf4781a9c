// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Spindle task implementation using the controller components.
//!
//! One task owns the transport link and the state machine, so every wire
//! exchange is serialized: the command path and the status sampler
//! interleave through a single `select!` loop and at most one frame is in
//! flight. Emergency stops arrive on their own channel which is polled
//! first and drained before each queued command, so they overtake anything
//! not yet dispatched while still letting a frame already on the wire
//! complete.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, error, info, warn};

use spindle_backend::SpindleLink;
use spindle_core::spindle::controller::{
    AdaptivePolling, ExponentialBackoff, PollingPolicy, RetryPolicy, SpindleStateMachine,
};
use spindle_core::{
    DynResult, ObservedState, SpindleCommand, SpindleError, SpindleReply, SpindleRequest,
    SpindleResult, SpindleSnapshot, DEFAULT_MAX_SPEED,
};
use spindle_protocol::wire::RawTelemetry;

use crate::persist;

/// Configuration for the spindle task.
pub struct SpindleTaskConfig {
    pub polling: Box<dyn PollingPolicy>,
    pub retry: Box<dyn RetryPolicy>,
    /// Consecutive poll failures before telemetry is considered stale.
    pub offline_threshold: u32,
    /// Speed ceiling applied until a persisted value overrides it.
    pub initial_max_speed: u32,
    /// Port to open at startup, if configured.
    pub initial_port: Option<String>,
    /// Max-speed state file; persistence is disabled when unset.
    pub state_file: Option<PathBuf>,
}

impl Default for SpindleTaskConfig {
    fn default() -> Self {
        Self {
            polling: Box::new(AdaptivePolling::default()),
            retry: Box::new(ExponentialBackoff::default()),
            offline_threshold: 3,
            initial_max_speed: DEFAULT_MAX_SPEED,
            initial_port: None,
            state_file: None,
        }
    }
}

/// Run the spindle task until both request channels close.
pub async fn run_spindle_task(
    mut link: SpindleLink,
    config: SpindleTaskConfig,
    mut cmd_rx: mpsc::Receiver<SpindleRequest>,
    mut estop_rx: mpsc::Receiver<SpindleRequest>,
    state_tx: watch::Sender<SpindleSnapshot>,
) -> DynResult<()> {
    let mut machine = SpindleStateMachine::new();
    machine.set_max_speed(config.initial_max_speed);

    if let Some(path) = config.state_file.as_deref() {
        if let Some(max) = persist::load_max_speed(path) {
            machine.set_max_speed(max);
            info!(
                "Restored max spindle speed {} RPM from {}",
                max,
                path.display()
            );
        }
    }

    if let Some(port) = config.initial_port.as_deref() {
        connect_with_retry(&mut link, &mut machine, port, config.retry.as_ref()).await;
    }

    let mut consecutive_failures: u32 = 0;
    publish(&state_tx, &machine, &link);

    let mut current_poll = config.polling.interval(machine.is_running());
    let mut poll_sleep = Box::pin(time::sleep(current_poll));
    loop {
        // Track the polling cadence across Running/Idle changes.
        let new_duration = config.polling.interval(machine.is_running());
        if new_duration != current_poll {
            current_poll = new_duration;
            poll_sleep = Box::pin(time::sleep(current_poll));
        }

        tokio::select! {
            biased;

            Some(req) = estop_rx.recv() => {
                answer_emergency_stop(req, &mut link, &mut machine).await;
                publish(&state_tx, &machine, &link);
            },

            _ = &mut poll_sleep => {
                poll_sleep = Box::pin(time::sleep(current_poll));
                poll_status(
                    &mut link,
                    &mut machine,
                    &mut consecutive_failures,
                    config.offline_threshold,
                )
                .await;
                publish(&state_tx, &machine, &link);
            },

            maybe_req = cmd_rx.recv() => {
                let Some(first_req) = maybe_req else { break; };

                // Batch up any pending requests
                let mut batch = vec![first_req];
                while let Ok(next) = cmd_rx.try_recv() {
                    batch.push(next);
                }

                for SpindleRequest { cmd, respond_to } in batch.drain(..) {
                    // A concurrent emergency stop overtakes every command
                    // still waiting in the queue.
                    while let Ok(estop) = estop_rx.try_recv() {
                        answer_emergency_stop(estop, &mut link, &mut machine).await;
                        publish(&state_tx, &machine, &link);
                    }

                    let cmd_label = format!("{:?}", cmd);
                    let result = process_command(
                        cmd,
                        &mut link,
                        &mut machine,
                        &config,
                        &mut consecutive_failures,
                    )
                    .await;
                    match &result {
                        Ok(_) => debug!("Spindle command {} completed", cmd_label),
                        Err(e) => warn!("Spindle command {} failed: {}", cmd_label, e),
                    }
                    let _ = respond_to.send(result);
                    publish(&state_tx, &machine, &link);
                }
            },
        }
    }

    link.disconnect();
    info!("spindle task shutting down (channel closed)");
    Ok(())
}

/// Handle one emergency-stop request and answer it.
async fn answer_emergency_stop(
    req: SpindleRequest,
    link: &mut SpindleLink,
    machine: &mut SpindleStateMachine,
) {
    let result = emergency_stop(link, machine).await;
    if let Err(e) = &result {
        warn!("Emergency stop failed: {}", e);
    }
    let _ = req
        .respond_to
        .send(result.map(|_| SpindleReply::Snapshot(snapshot(machine, link))));
}

/// Latch the emergency stop and issue its frame.
///
/// The latch is applied before touching the wire: if the frame cannot be
/// sent the failure is reported, but the machine keeps the safe assumption.
async fn emergency_stop(
    link: &mut SpindleLink,
    machine: &mut SpindleStateMachine,
) -> SpindleResult<()> {
    machine.emergency_stop()?;
    if let Err(e) = link.emergency_stop().await {
        error!("Emergency stop frame failed (latched locally): {}", e);
        return Err(e);
    }
    info!("Emergency stop issued");
    Ok(())
}

/// One sampler tick: query status and fold the result into the machine.
///
/// Failures leave the previous observation in place; once the threshold of
/// consecutive failures is reached the telemetry is marked stale and the
/// reported state degrades to Offline.
async fn poll_status(
    link: &mut SpindleLink,
    machine: &mut SpindleStateMachine,
    consecutive_failures: &mut u32,
    offline_threshold: u32,
) {
    if !link.is_connected() {
        return;
    }

    match link.query_status().await {
        Ok(telemetry) => {
            *consecutive_failures = 0;
            machine.observe(observed_from(&telemetry));
        }
        Err(e) => {
            *consecutive_failures += 1;
            debug!(
                "Status poll failed ({} consecutive): {}",
                consecutive_failures, e
            );
            if *consecutive_failures >= offline_threshold && !machine.is_stale() {
                warn!(
                    "Telemetry stale after {} failed polls; reporting Offline",
                    consecutive_failures
                );
                machine.mark_stale();
            }
        }
    }
}

/// Process a single spindle command.
async fn process_command(
    cmd: SpindleCommand,
    link: &mut SpindleLink,
    machine: &mut SpindleStateMachine,
    config: &SpindleTaskConfig,
    consecutive_failures: &mut u32,
) -> SpindleResult<SpindleReply> {
    match cmd {
        SpindleCommand::GetSnapshot => Ok(SpindleReply::Snapshot(snapshot(machine, link))),

        SpindleCommand::GetAvailablePorts => link
            .enumerate()
            .map(|ports| SpindleReply::Ports(ports.into_iter().map(|p| p.path).collect()))
            .map_err(|e| SpindleError::Communication(e.to_string())),

        SpindleCommand::SetPort(path) => match link.select(&path).await {
            Ok(()) => {
                // Fresh connection: telemetry from the previous port no
                // longer applies.
                machine.connection_opened();
                *consecutive_failures = 0;
                info!("Selected serial port {}", path);
                Ok(SpindleReply::Snapshot(snapshot(machine, link)))
            }
            Err(e) => {
                // The old connection is closed even when the new open
                // fails.
                machine.connection_closed();
                warn!("Failed to select port {}: {}", path, e);
                Err(SpindleError::Connect {
                    path,
                    reason: e.to_string(),
                })
            }
        },

        SpindleCommand::Start => {
            machine.start()?;
            let commanded = *machine.commanded();
            link.start().await?;
            link.set_target(commanded.direction, commanded.target_speed)
                .await?;
            info!(
                "Spindle started towards {} RPM ({:?})",
                commanded.target_speed, commanded.direction
            );
            Ok(SpindleReply::Snapshot(snapshot(machine, link)))
        }

        SpindleCommand::Stop => {
            if machine.stop()? {
                link.stop().await?;
                info!("Spindle stopped");
            }
            Ok(SpindleReply::Snapshot(snapshot(machine, link)))
        }

        SpindleCommand::EmergencyStop => {
            emergency_stop(link, machine).await?;
            Ok(SpindleReply::Snapshot(snapshot(machine, link)))
        }

        SpindleCommand::SetTarget { direction, speed } => {
            if machine.set_target(direction, speed)? {
                // Running: push the new target to the device immediately.
                link.set_target(direction, speed).await?;
            }
            Ok(SpindleReply::Snapshot(snapshot(machine, link)))
        }

        SpindleCommand::SetMaxSpeed(speed) => {
            let clamped = machine.set_max_speed(speed);
            if let Some(path) = config.state_file.as_deref() {
                if let Err(e) = persist::store_max_speed(path, speed) {
                    warn!("Failed to persist max speed: {}", e);
                }
            }
            if clamped {
                info!("Target clamped to new max speed {} RPM", speed);
                if machine.is_running() {
                    let commanded = *machine.commanded();
                    link.set_target(commanded.direction, commanded.target_speed)
                        .await?;
                }
            }
            Ok(SpindleReply::Snapshot(snapshot(machine, link)))
        }

        SpindleCommand::Reset => {
            machine.reset()?;
            info!("Spindle latch cleared by reset");
            Ok(SpindleReply::Snapshot(snapshot(machine, link)))
        }
    }
}

/// Open the configured startup port, retrying transient failures.
async fn connect_with_retry(
    link: &mut SpindleLink,
    machine: &mut SpindleStateMachine,
    path: &str,
    retry: &dyn RetryPolicy,
) {
    let max = retry.max_attempts();
    for attempt in 0..max {
        match link.select(path).await {
            Ok(()) => {
                machine.connection_opened();
                info!("Connected to spindle on {}", path);
                return;
            }
            Err(e) => {
                let err = SpindleError::Connect {
                    path: path.to_string(),
                    reason: e.to_string(),
                };
                if attempt + 1 < max && retry.should_retry(attempt, &err) {
                    let delay = retry.delay(attempt);
                    warn!(
                        "Failed to open {} (attempt {} of {}): {}; retrying in {:?}",
                        path,
                        attempt + 1,
                        max,
                        e,
                        delay
                    );
                    time::sleep(delay).await;
                } else {
                    error!("Giving up on startup port {}: {}", path, e);
                    return;
                }
            }
        }
    }
}

fn observed_from(telemetry: &RawTelemetry) -> ObservedState {
    ObservedState {
        run_state: telemetry.state.to_run_state(),
        direction: telemetry.direction,
        speed: telemetry.speed,
        power: telemetry.power,
    }
}

fn snapshot(machine: &SpindleStateMachine, link: &SpindleLink) -> SpindleSnapshot {
    machine.snapshot(link.current_selection().map(String::from))
}

fn publish(state_tx: &watch::Sender<SpindleSnapshot>, machine: &SpindleStateMachine, link: &SpindleLink) {
    let _ = state_tx.send(snapshot(machine, link));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::SpindleHandle;
    use spindle_backend::mock::{MockTransport, ReplyQueue, SentFrames};
    use spindle_core::spindle::controller::FixedPolling;
    use spindle_core::{Direction, RunState};
    use spindle_protocol::wire::{RawTelemetry, ReportedState};

    const PORT: &str = "COM3";

    struct Harness {
        handle: SpindleHandle,
        sent: SentFrames,
        replies: ReplyQueue,
    }

    fn spawn_task(mock: MockTransport, config: SpindleTaskConfig) -> Harness {
        let sent = mock.sent();
        let replies = mock.reply_queue();
        let link = SpindleLink::new(Box::new(mock), Duration::from_millis(100));
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (estop_tx, estop_rx) = mpsc::channel(4);
        let (state_tx, state_rx) = watch::channel(SpindleSnapshot::default());
        tokio::spawn(run_spindle_task(link, config, cmd_rx, estop_rx, state_tx));
        Harness {
            handle: SpindleHandle {
                cmd_tx,
                estop_tx,
                state_rx,
            },
            sent,
            replies,
        }
    }

    fn fast_poll_config() -> SpindleTaskConfig {
        SpindleTaskConfig {
            polling: Box::new(FixedPolling::new(Duration::from_millis(50))),
            ..SpindleTaskConfig::default()
        }
    }

    fn running_telemetry() -> RawTelemetry {
        RawTelemetry {
            state: ReportedState::Running,
            direction: Direction::Forward,
            target_speed: 1000,
            speed: 950,
            power: 75,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_scenario_reaches_running() {
        let harness = spawn_task(MockTransport::with_device(vec![PORT.into()]), fast_poll_config());

        harness
            .handle
            .request(SpindleCommand::SetPort(PORT.into()))
            .await
            .unwrap();
        harness
            .handle
            .request(SpindleCommand::SetMaxSpeed(2000))
            .await
            .unwrap();
        harness
            .handle
            .request(SpindleCommand::SetTarget {
                direction: Direction::Forward,
                speed: 1000,
            })
            .await
            .unwrap();
        harness.handle.request(SpindleCommand::Start).await.unwrap();

        // Let the sampler confirm the device state.
        time::sleep(Duration::from_millis(200)).await;

        let snap = harness.handle.snapshot();
        assert_eq!(snap.run_state, RunState::Running);
        assert_eq!(snap.commanded.target_speed, 1000);
        assert_eq!(snap.observed.speed, 1000);
        assert_eq!(snap.selected_port.as_deref(), Some(PORT));

        let frames = harness.sent.as_strings();
        assert!(frames.contains(&";START\n".to_string()));
        assert!(frames.contains(&";TARGET F 1000\n".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness_degrades_to_offline() {
        let harness = spawn_task(MockTransport::new(vec![PORT.into()]), fast_poll_config());

        harness
            .handle
            .request(SpindleCommand::SetPort(PORT.into()))
            .await
            .unwrap();
        harness.replies.push_status(&running_telemetry());

        // First poll succeeds and reports Running.
        time::sleep(Duration::from_millis(80)).await;
        assert_eq!(harness.handle.snapshot().run_state, RunState::Running);

        // The queue is now empty: three consecutive poll timeouts must
        // degrade the reported state to Offline.
        time::sleep(Duration::from_millis(300)).await;
        let snap = harness.handle.snapshot();
        assert_eq!(snap.run_state, RunState::Offline);
        assert_eq!(snap.to_dto().speed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_stop_overtakes_queued_target() {
        let mock = MockTransport::with_device(vec![PORT.into()]);
        let sent = mock.sent();
        let link = SpindleLink::new(Box::new(mock), Duration::from_millis(100));

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (estop_tx, estop_rx) = mpsc::channel(4);
        let (state_tx, state_rx) = watch::channel(SpindleSnapshot::default());

        let handle = SpindleHandle {
            cmd_tx: cmd_tx.clone(),
            estop_tx: estop_tx.clone(),
            state_rx,
        };

        // Queue a target change and an emergency stop before the task even
        // starts draining: the emergency must win.
        let (target_tx, target_rx) = tokio::sync::oneshot::channel();
        cmd_tx
            .send(SpindleRequest {
                cmd: SpindleCommand::SetTarget {
                    direction: Direction::Forward,
                    speed: 900,
                },
                respond_to: target_tx,
            })
            .await
            .unwrap();
        let (estop_resp_tx, estop_resp_rx) = tokio::sync::oneshot::channel();
        estop_tx
            .send(SpindleRequest {
                cmd: SpindleCommand::EmergencyStop,
                respond_to: estop_resp_tx,
            })
            .await
            .unwrap();

        let config = SpindleTaskConfig {
            polling: Box::new(FixedPolling::new(Duration::from_secs(60))),
            initial_port: Some(PORT.into()),
            ..SpindleTaskConfig::default()
        };
        tokio::spawn(run_spindle_task(link, config, cmd_rx, estop_rx, state_tx));

        estop_resp_rx.await.unwrap().unwrap();
        // The stored-target update succeeds but must not reach the wire
        // behind the latch.
        target_rx.await.unwrap().unwrap();

        let frames = sent.as_strings();
        assert_eq!(frames.first().map(String::as_str), Some(";EMERG\n"));
        assert!(!frames.contains(&";TARGET F 900\n".to_string()));

        assert_eq!(handle.snapshot().run_state, RunState::EmergencyStop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_speed_clamps_running_target() {
        let harness = spawn_task(MockTransport::with_device(vec![PORT.into()]), fast_poll_config());

        harness
            .handle
            .request(SpindleCommand::SetPort(PORT.into()))
            .await
            .unwrap();
        harness
            .handle
            .request(SpindleCommand::SetMaxSpeed(2000))
            .await
            .unwrap();
        harness
            .handle
            .request(SpindleCommand::SetTarget {
                direction: Direction::Forward,
                speed: 1000,
            })
            .await
            .unwrap();
        harness.handle.request(SpindleCommand::Start).await.unwrap();

        harness
            .handle
            .request(SpindleCommand::SetMaxSpeed(500))
            .await
            .unwrap();

        let snap = harness.handle.snapshot();
        assert_eq!(snap.commanded.max_speed, 500);
        assert_eq!(snap.commanded.target_speed, 500);
        // The clamped target was re-issued so the device cannot keep the
        // stale higher setpoint.
        assert!(harness
            .sent
            .as_strings()
            .contains(&";TARGET F 500\n".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_above_max_is_rejected() {
        let harness = spawn_task(MockTransport::with_device(vec![PORT.into()]), fast_poll_config());

        harness
            .handle
            .request(SpindleCommand::SetPort(PORT.into()))
            .await
            .unwrap();
        let result = harness
            .handle
            .request(SpindleCommand::SetTarget {
                direction: Direction::Forward,
                speed: DEFAULT_MAX_SPEED + 1,
            })
            .await;
        assert_eq!(
            result.unwrap_err(),
            SpindleError::OutOfRange {
                speed: DEFAULT_MAX_SPEED + 1,
                max: DEFAULT_MAX_SPEED,
            }
        );
        assert_eq!(harness.handle.snapshot().commanded.target_speed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_idle_sends_nothing() {
        let harness = spawn_task(MockTransport::with_device(vec![PORT.into()]), fast_poll_config());

        harness
            .handle
            .request(SpindleCommand::SetPort(PORT.into()))
            .await
            .unwrap();
        harness.handle.request(SpindleCommand::Stop).await.unwrap();

        assert!(!harness.sent.as_strings().contains(&";STOP\n".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_port_failure_surfaces_connect_error() {
        let harness = spawn_task(MockTransport::new(vec![PORT.into()]), fast_poll_config());

        let result = harness
            .handle
            .request(SpindleCommand::SetPort("COM9".into()))
            .await;
        assert!(matches!(result, Err(SpindleError::Connect { .. })));
        assert_eq!(harness.handle.snapshot().run_state, RunState::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_never_fail_without_connection() {
        let harness = spawn_task(MockTransport::new(vec![PORT.into()]), fast_poll_config());

        let reply = harness
            .handle
            .request(SpindleCommand::GetSnapshot)
            .await
            .unwrap();
        match reply {
            SpindleReply::Snapshot(snap) => assert_eq!(snap.run_state, RunState::Offline),
            other => panic!("expected snapshot, got {other:?}"),
        }

        let reply = harness
            .handle
            .request(SpindleCommand::GetAvailablePorts)
            .await
            .unwrap();
        match reply {
            SpindleReply::Ports(ports) => assert_eq!(ports, vec![PORT.to_string()]),
            other => panic!("expected ports, got {other:?}"),
        }
    }
}
