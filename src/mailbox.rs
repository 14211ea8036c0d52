// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Synchronous request/response exchange over the system-call mailbox.
// Author: Lukas Bower

//! Mailbox transport to the privileged boot-time executor.
//!
//! The executor runs on a fixed code path in another privilege domain. Its
//! only completion signal is the release of the mailbox lock, after which the
//! status word is available in the descriptor. The transport therefore posts
//! once, polls the lock at a fixed interval and gives up after a hard bound.
//! It never clears the lock itself and never retries.

use core::fmt;
use core::time::Duration;

use log::{debug, info, warn};

use crate::error::{TransitionError, TransitionResult};
use crate::payload::TransitionRequest;

/// Mask selecting the status nibble of the returned word.
pub const STATUS_MASK: u32 = 0xF000_0000;
/// Status nibble reported when the command completed without errors.
pub const STATUS_SUCCESS: u32 = 0xA000_0000;
/// Upper bound on waiting for the executor to release the lock.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Interval between lock checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Word written back by the executor into the descriptor's opcode field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord(u32);

impl StatusWord {
    /// Wrap a raw status word.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw word for diagnostics.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Top nibble of the word, still in position.
    pub const fn status(self) -> u32 {
        self.0 & STATUS_MASK
    }

    /// Returns `true` when the status nibble matches [`STATUS_SUCCESS`].
    pub const fn is_success(self) -> bool {
        self.status() == STATUS_SUCCESS
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Platform access to the shared system-call mailbox.
pub trait MailboxChannel {
    /// Acquire the lock and post `request`. Returns `false` when the lock is
    /// already held.
    fn post(&mut self, request: &TransitionRequest<'_>) -> bool;

    /// Returns `true` while the lock is held.
    fn is_locked(&self) -> bool;

    /// Status word currently in the posted descriptor.
    fn status_word(&self) -> u32;
}

/// Blocking delay used between lock checks.
pub trait Delay {
    /// Wait for `interval`.
    fn delay(&mut self, interval: Duration);
}

/// Owner of the mailbox handle. At most one request is outstanding at a time.
#[derive(Debug)]
pub struct MailboxTransport<M, D> {
    channel: M,
    delay: D,
    poll_interval: Duration,
}

impl<M: MailboxChannel, D: Delay> MailboxTransport<M, D> {
    /// Take ownership of the mailbox and the delay source.
    pub fn new(channel: M, delay: D) -> Self {
        Self {
            channel,
            delay,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the lock polling interval. Intervals below one millisecond
    /// are raised to one millisecond.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Configured lock polling interval.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Borrow the mailbox handle.
    pub fn channel(&self) -> &M {
        &self.channel
    }

    /// Release the mailbox handle and delay source.
    pub fn into_parts(self) -> (M, D) {
        (self.channel, self.delay)
    }

    /// Post `request` and block until the executor answers or `timeout`
    /// elapses. The lock is checked at every poll interval and once more at
    /// exactly `timeout`; the wait never exceeds `timeout`.
    ///
    /// A busy mailbox fails immediately with [`TransitionError::ChannelBusy`].
    /// On [`TransitionError::Timeout`] the lock is left held.
    pub fn dispatch(
        &mut self,
        request: &TransitionRequest<'_>,
        timeout: Duration,
    ) -> TransitionResult {
        info!(
            "posting opcode {:#010x} with {}-byte credential",
            request.opcode(),
            request.payload().len()
        );
        if !self.channel.post(request) {
            warn!("mailbox lock already held; request not posted");
            return Err(TransitionError::ChannelBusy);
        }

        let mut waited = Duration::ZERO;
        while self.channel.is_locked() {
            if waited >= timeout {
                warn!("executor still holds the mailbox after {waited:?}");
                return Err(TransitionError::Timeout { waited });
            }
            // The last sleep is shortened so the bound is never overrun.
            let step = self.poll_interval.min(timeout - waited);
            self.delay.delay(step);
            waited = waited.saturating_add(step);
            debug!("mailbox poll after {waited:?}");
        }

        let status = StatusWord::new(self.channel.status_word());
        if status.is_success() {
            info!("executor completed with status {status}");
            Ok(status)
        } else {
            warn!("executor rejected request with status {status}");
            Err(TransitionError::ExecutorReportedFailure { status })
        }
    }
}
