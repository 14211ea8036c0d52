// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Trigger-driven sequencing of a lifecycle transition attempt.
// Author: Lukas Bower

//! Transition state machine.
//!
//! `Idle -> Building -> Dispatching -> {Succeeded, Failed}`. Each confirmed
//! trigger runs one full attempt. Terminal states are informational: the next
//! trigger re-arms to `Idle` and starts over. Nothing is retried on its own.

use core::fmt::{self, Write as FmtWrite};
use core::time::Duration;

use heapless::{String as HeaplessString, Vec as HeaplessVec};
use log::{debug, info, warn};

use crate::error::{TransitionError, TransitionResult};
use crate::mailbox::{Delay, MailboxChannel, MailboxTransport, DEFAULT_TIMEOUT};
use crate::otp::{EfuseReader, LifecycleStage, LifecycleStageReader};
use crate::payload::{RequestPayload, TransitionRequest};

/// Capacity of a single diagnostic line.
pub const DIAGNOSTIC_LINE_CAP: usize = 160;

/// Appended to a diagnostic line cut at [`DIAGNOSTIC_LINE_CAP`].
pub const TRUNCATION_MARK: &str = "...";

/// Longest path through the state machine in one attempt.
const TRAIL_CAP: usize = 4;

/// Warning shown before the operator is asked to confirm.
pub const IRREVERSIBLE_WARNING: &str =
    "**Warning : After Device is in RMA, it cannot be moved to other LCS**";

/// Text sink for operator-facing diagnostics.
pub trait DiagnosticSink {
    /// Emit one line.
    fn line(&mut self, message: &str);
}

/// Progress of the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Waiting for a trigger.
    Idle,
    /// Packaging the credential.
    Building,
    /// Request posted; waiting for the executor.
    Dispatching,
    /// Executor reported success.
    Succeeded,
    /// Attempt failed.
    Failed,
}

impl OrchestratorState {
    /// Returns `true` for `Succeeded` and `Failed`.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Record of one transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionReport {
    /// One-based attempt counter.
    pub attempt: u32,
    /// Stage decoded immediately before the attempt.
    pub stage_before: LifecycleStage,
    /// Result returned by the builder or the transport.
    pub result: TransitionResult,
}

impl TransitionReport {
    /// Returns `true` when the executor confirmed the transition.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Returns `true` when the fuse state could not be confirmed.
    pub fn is_unconfirmed(&self) -> bool {
        matches!(&self.result, Err(err) if err.leaves_state_unconfirmed())
    }

    /// Operator-facing outcome text.
    pub fn summary(&self) -> &'static str {
        match self.result {
            Ok(_) => "Transition to RMA successful",
            Err(TransitionError::Timeout { .. }) => {
                "Transition to RMA unconfirmed; reset the device and re-read the lifecycle stage"
            }
            Err(_) => "Transition to RMA failed",
        }
    }
}

impl fmt::Display for TransitionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(status) => write!(f, "{} (status {status})", self.summary()),
            Err(err) => write!(f, "{} ({err})", self.summary()),
        }
    }
}

fn format_line(args: fmt::Arguments<'_>) -> HeaplessString<DIAGNOSTIC_LINE_CAP> {
    let mut line = HeaplessString::new();
    if FmtWrite::write_fmt(&mut line, args).is_err() {
        while line.len() > DIAGNOSTIC_LINE_CAP - TRUNCATION_MARK.len() {
            line.pop();
        }
        // Fits: the loop above left room for the mark.
        let _ = line.push_str(TRUNCATION_MARK);
    }
    line
}

/// Runs transition attempts in response to an operator trigger.
pub struct TransitionOrchestrator<'c, E, M, D> {
    stage_reader: LifecycleStageReader<E>,
    transport: MailboxTransport<M, D>,
    credential: &'c [u8],
    timeout: Duration,
    state: OrchestratorState,
    trail: HeaplessVec<OrchestratorState, TRAIL_CAP>,
    attempts: u32,
}

impl<'c, E, M, D> TransitionOrchestrator<'c, E, M, D>
where
    E: EfuseReader,
    M: MailboxChannel,
    D: Delay,
{
    /// Assemble the orchestrator around its collaborators. The credential is
    /// copied into a fresh payload on every attempt.
    pub fn new(
        stage_reader: LifecycleStageReader<E>,
        transport: MailboxTransport<M, D>,
        credential: &'c [u8],
    ) -> Self {
        Self {
            stage_reader,
            transport,
            credential,
            timeout: DEFAULT_TIMEOUT,
            state: OrchestratorState::Idle,
            trail: HeaplessVec::new(),
            attempts: 0,
        }
    }

    /// Override the completion timeout handed to the transport.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Current state.
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// States entered by the latest attempt, starting at `Idle`. Empty until
    /// the first trigger.
    pub fn trail(&self) -> &[OrchestratorState] {
        &self.trail
    }

    /// Number of attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Completion timeout handed to the transport.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Decoded lifecycle stage.
    pub fn current_stage(&self) -> LifecycleStage {
        self.stage_reader.current_stage()
    }

    /// Borrow the transport, e.g. to inspect the mailbox handle.
    pub fn transport(&self) -> &MailboxTransport<M, D> {
        &self.transport
    }

    /// Report the lifecycle stage and the irreversibility warning.
    pub fn announce(&self, sink: &mut dyn DiagnosticSink) -> LifecycleStage {
        let stage = self.report_stage(sink);
        sink.line(IRREVERSIBLE_WARNING);
        stage
    }

    /// Handle the debounced trigger level. Returns a report when an attempt
    /// ran.
    pub fn on_trigger(
        &mut self,
        triggered: bool,
        sink: &mut dyn DiagnosticSink,
    ) -> Option<TransitionReport> {
        if !triggered {
            return None;
        }
        if self.state.is_terminal() {
            self.enter(OrchestratorState::Idle);
        }
        self.trail.clear();
        // Capacity covers Idle plus the three states below.
        let _ = self.trail.push(OrchestratorState::Idle);
        Some(self.attempt(sink))
    }

    fn enter(&mut self, next: OrchestratorState) {
        debug!("orchestrator {:?} -> {next:?}", self.state);
        self.state = next;
        if next != OrchestratorState::Idle {
            let _ = self.trail.push(next);
        }
    }

    fn attempt(&mut self, sink: &mut dyn DiagnosticSink) -> TransitionReport {
        self.attempts = self.attempts.saturating_add(1);
        let stage_before = self.report_stage(sink);
        info!("transition attempt {} from stage {stage_before}", self.attempts);

        self.enter(OrchestratorState::Building);
        let result = match RequestPayload::build(self.credential) {
            Ok(payload) => {
                self.enter(OrchestratorState::Dispatching);
                let request = TransitionRequest::transition_to_rma(&payload);
                self.transport.dispatch(&request, self.timeout)
            }
            Err(err) => Err(err),
        };

        self.enter(if result.is_ok() {
            OrchestratorState::Succeeded
        } else {
            OrchestratorState::Failed
        });
        let report = TransitionReport {
            attempt: self.attempts,
            stage_before,
            result,
        };
        if let Err(err) = &report.result {
            warn!("transition attempt {} failed: {}", report.attempt, err.label());
        }
        sink.line(format_line(format_args!("{report}")).as_str());
        report
    }

    /// Report the decoded lifecycle stage.
    pub fn report_stage(&self, sink: &mut dyn DiagnosticSink) -> LifecycleStage {
        let stage = self.current_stage();
        sink.line(format_line(format_args!("Life Cycle Stage : {stage}")).as_str());
        stage
    }
}
