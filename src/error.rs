// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Error taxonomy for a single RMA transition attempt.
// Author: Lukas Bower

use core::time::Duration;

use thiserror::Error;

use crate::mailbox::StatusWord;

/// Outcome of one dispatch: the executor's success status word or the reason
/// the attempt failed.
pub type TransitionResult = Result<StatusWord, TransitionError>;

/// Errors terminating a transition attempt. None of them are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The credential does not fit the fixed request payload.
    #[error("credential of {len} bytes exceeds the {max}-byte request payload")]
    PayloadTooLarge {
        /// Length of the rejected credential.
        len: usize,
        /// Payload capacity.
        max: usize,
    },
    /// The mailbox was already locked by another pending transaction.
    #[error("mailbox is locked by a pending transaction")]
    ChannelBusy,
    /// The executor did not release the mailbox lock in time. The fuse state
    /// is unconfirmed.
    #[error("executor did not release the mailbox within {waited:?}")]
    Timeout {
        /// Time spent polling before giving up.
        waited: Duration,
    },
    /// The executor completed and returned a non-success status word.
    #[error("executor reported failure status {status}")]
    ExecutorReportedFailure {
        /// Raw status word written back by the executor.
        status: StatusWord,
    },
}

impl TransitionError {
    /// Returns `true` when the device state after the attempt is unknown.
    ///
    /// Only a timeout leaves the fuse state open: the executor may still
    /// complete after polling stopped. Every other error is reported before
    /// or after the executor has definitively finished.
    pub const fn leaves_state_unconfirmed(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Short label used in diagnostics.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::PayloadTooLarge { .. } => "payload-too-large",
            Self::ChannelBusy => "channel-busy",
            Self::Timeout { .. } => "timeout",
            Self::ExecutorReportedFailure { .. } => "executor-failure",
        }
    }
}
