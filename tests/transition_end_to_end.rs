// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: End-to-end RMA transitions against the simulated device.
// Author: Lukas Bower

use std::time::Duration;

use rma_transit::mailbox::{StatusWord, STATUS_SUCCESS};
use rma_transit::sim::{ExecutorBehavior, SimulatedDevice, SIM_STATUS_ALREADY_RMA};
use rma_transit::{
    DiagnosticSink, LifecycleFuses, LifecycleStage, LifecycleStageReader, MailboxTransport,
    OrchestratorState, TransitionError, TransitionOrchestrator, MAX_CREDENTIAL_LENGTH,
};

const TOKEN: &[u8] = b"eyJhbGciOiJFUzI1NiIsInR5cCI6IkpXVCJ9.eyJhdXRoIjp7fX0.sig";

#[derive(Default)]
struct Transcript {
    lines: Vec<String>,
}

impl DiagnosticSink for Transcript {
    fn line(&mut self, message: &str) {
        self.lines.push(message.to_owned());
    }
}

#[test]
fn secure_device_reaches_rma_after_reset() {
    let device = SimulatedDevice::new(
        LifecycleFuses::NORMAL | LifecycleFuses::SECURE,
        ExecutorBehavior::default(),
    );
    let transport = MailboxTransport::new(device.mailbox(), device.clock());
    let mut orchestrator =
        TransitionOrchestrator::new(LifecycleStageReader::new(device.efuse()), transport, TOKEN);
    let mut transcript = Transcript::default();

    assert_eq!(orchestrator.announce(&mut transcript), LifecycleStage::Secure);
    let report = orchestrator.on_trigger(true, &mut transcript).expect("attempt ran");
    assert_eq!(report.result, Ok(StatusWord::new(STATUS_SUCCESS)));
    assert_eq!(orchestrator.state(), OrchestratorState::Succeeded);

    // Fuses are latched at reset.
    assert_eq!(orchestrator.current_stage(), LifecycleStage::Secure);
    device.reset();
    assert_eq!(orchestrator.current_stage(), LifecycleStage::Rma);
}

#[test]
fn repeated_attempt_on_rma_device_runs_full_protocol() {
    let device = SimulatedDevice::new(LifecycleFuses::RMA, ExecutorBehavior::default());
    let transport = MailboxTransport::new(device.mailbox(), device.clock());
    let mut orchestrator =
        TransitionOrchestrator::new(LifecycleStageReader::new(device.efuse()), transport, TOKEN);
    let mut transcript = Transcript::default();

    assert_eq!(orchestrator.current_stage(), LifecycleStage::Rma);
    let report = orchestrator.on_trigger(true, &mut transcript).expect("attempt ran");

    assert_eq!(report.stage_before, LifecycleStage::Rma);
    assert_eq!(device.posts(), 1);
    assert_eq!(device.elapsed(), Duration::from_secs(3));
    assert_eq!(
        report.result,
        Err(TransitionError::ExecutorReportedFailure {
            status: StatusWord::new(SIM_STATUS_ALREADY_RMA)
        })
    );
    assert_eq!(
        transcript.lines,
        vec![
            "Life Cycle Stage : RMA".to_owned(),
            "Transition to RMA failed (executor reported failure status 0xf0000003)".to_owned(),
        ]
    );
}

#[test]
fn rma_device_reports_whatever_the_executor_returns() {
    let device = SimulatedDevice::new(LifecycleFuses::RMA, ExecutorBehavior::default())
        .with_status_override(0xA000_0000);
    let transport = MailboxTransport::new(device.mailbox(), device.clock());
    let mut orchestrator =
        TransitionOrchestrator::new(LifecycleStageReader::new(device.efuse()), transport, TOKEN);
    let mut transcript = Transcript::default();

    let report = orchestrator.on_trigger(true, &mut transcript).expect("attempt ran");
    assert!(report.is_success());
    assert_eq!(device.programmed_fuses(), LifecycleFuses::RMA);
}

#[test]
fn busy_mailbox_returns_immediately() {
    let device = SimulatedDevice::new(LifecycleFuses::SECURE, ExecutorBehavior::Busy);
    let transport = MailboxTransport::new(device.mailbox(), device.clock());
    let mut orchestrator =
        TransitionOrchestrator::new(LifecycleStageReader::new(device.efuse()), transport, TOKEN);
    let mut transcript = Transcript::default();

    let report = orchestrator.on_trigger(true, &mut transcript).expect("attempt ran");
    assert_eq!(report.result, Err(TransitionError::ChannelBusy));
    assert_eq!(device.elapsed(), Duration::ZERO);
    assert!(!report.is_unconfirmed());
}

#[test]
fn hung_executor_times_out_with_short_bound() {
    let device = SimulatedDevice::new(LifecycleFuses::SECURE, ExecutorBehavior::Hang);
    let transport = MailboxTransport::new(device.mailbox(), device.clock());
    let mut orchestrator =
        TransitionOrchestrator::new(LifecycleStageReader::new(device.efuse()), transport, TOKEN)
            .with_timeout(Duration::from_secs(2));
    let mut transcript = Transcript::default();

    let report = orchestrator.on_trigger(true, &mut transcript).expect("attempt ran");
    assert_eq!(
        report.result,
        Err(TransitionError::Timeout {
            waited: Duration::from_secs(2)
        })
    );
    assert!(report.is_unconfirmed());
    assert_eq!(device.elapsed(), Duration::from_secs(2));
    assert!(device.is_locked());

    // The lock is still held, so a second trigger cannot post.
    let retry = orchestrator.on_trigger(true, &mut transcript).expect("attempt ran");
    assert_eq!(retry.result, Err(TransitionError::ChannelBusy));
}

#[test]
fn slow_executor_within_bound_with_coarse_polling() {
    let device = SimulatedDevice::new(
        LifecycleFuses::SECURE_WITH_DEBUG,
        ExecutorBehavior::Complete {
            latency: Duration::from_millis(2_500),
        },
    );
    let transport = MailboxTransport::new(device.mailbox(), device.clock())
        .with_poll_interval(Duration::from_millis(500));
    let mut orchestrator =
        TransitionOrchestrator::new(LifecycleStageReader::new(device.efuse()), transport, TOKEN)
            .with_timeout(Duration::from_secs(3));
    let mut transcript = Transcript::default();

    let report = orchestrator.on_trigger(true, &mut transcript).expect("attempt ran");
    assert!(report.is_success());
    assert_eq!(report.stage_before, LifecycleStage::SecureWithDebug);
    assert_eq!(device.elapsed(), Duration::from_millis(2_500));
}

#[test]
fn boundary_length_credential_is_dispatched() {
    let token = [b'x'; MAX_CREDENTIAL_LENGTH];
    let device = SimulatedDevice::new(LifecycleFuses::SECURE, ExecutorBehavior::default());
    let transport = MailboxTransport::new(device.mailbox(), device.clock());
    let mut orchestrator =
        TransitionOrchestrator::new(LifecycleStageReader::new(device.efuse()), transport, &token);
    let mut transcript = Transcript::default();

    let report = orchestrator.on_trigger(true, &mut transcript).expect("attempt ran");
    assert!(report.is_success());
    assert_eq!(device.posts(), 1);
}
