// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: In-process model of the lifecycle eFuses and the privileged executor.
// Author: Lukas Bower

//! Deterministic device model for host runs and tests.
//!
//! A [`SimulatedDevice`] holds the eFuse bits, the mailbox lock and a model of
//! the boot-time executor. The executor completes a posted request once the
//! simulated clock has advanced past its latency. A successful transition
//! programs the RMA bit, which becomes readable only after [`SimulatedDevice::reset`].
//!
//! The handles returned by [`SimulatedDevice::efuse`], [`SimulatedDevice::mailbox`]
//! and [`SimulatedDevice::clock`] borrow the device and can be handed to the
//! stage reader and transport at the same time.

use core::cell::Cell;
use core::time::Duration;

use log::{debug, info};

use crate::mailbox::{Delay, MailboxChannel, STATUS_MASK, STATUS_SUCCESS};
use crate::otp::{EfuseReader, LifecycleFuses, LIFECYCLE_EFUSE_BYTE};
use crate::payload::{TransitionRequest, OPCODE_TRANSITION_TO_RMA};

/// Status written for an operation code the executor does not implement.
pub const SIM_STATUS_INVALID_OPCODE: u32 = 0xF000_0001;
/// Status written when the authorization token is refused.
pub const SIM_STATUS_INVALID_CREDENTIAL: u32 = 0xF000_0002;
/// Status written when the device is already in RMA.
pub const SIM_STATUS_ALREADY_RMA: u32 = 0xF000_0003;

/// How the simulated executor reacts to a posted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorBehavior {
    /// Process the request after `latency` of simulated time.
    Complete {
        /// Simulated time between post and lock release.
        latency: Duration,
    },
    /// Accept the request and never release the lock.
    Hang,
    /// The lock is held by another transaction before anything is posted.
    Busy,
}

impl Default for ExecutorBehavior {
    fn default() -> Self {
        Self::Complete {
            latency: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    opcode: u32,
    credential_len: usize,
    due: Duration,
}

/// Simulated device: eFuse block, mailbox and executor.
#[derive(Debug)]
pub struct SimulatedDevice {
    visible: Cell<LifecycleFuses>,
    programmed: Cell<LifecycleFuses>,
    behavior: ExecutorBehavior,
    status_override: Option<u32>,
    reject_credential: bool,
    locked: Cell<bool>,
    status: Cell<u32>,
    pending: Cell<Option<Pending>>,
    now: Cell<Duration>,
    posts: Cell<u32>,
}

impl SimulatedDevice {
    /// Device with the given lifecycle bits and executor behaviour.
    pub fn new(fuses: LifecycleFuses, behavior: ExecutorBehavior) -> Self {
        let device = Self {
            visible: Cell::new(fuses),
            programmed: Cell::new(fuses),
            behavior,
            status_override: None,
            reject_credential: false,
            locked: Cell::new(false),
            status: Cell::new(0),
            pending: Cell::new(None),
            now: Cell::new(Duration::ZERO),
            posts: Cell::new(0),
        };
        if behavior == ExecutorBehavior::Busy {
            device.locked.set(true);
        }
        device
    }

    /// Force the status word the executor writes on completion.
    ///
    /// A forced success status burns the RMA bit like a genuine success.
    #[must_use]
    pub fn with_status_override(mut self, status: u32) -> Self {
        self.status_override = Some(status);
        self
    }

    /// Make the executor refuse every authorization token.
    #[must_use]
    pub fn rejecting_credentials(mut self) -> Self {
        self.reject_credential = true;
        self
    }

    /// eFuse accessor.
    pub fn efuse(&self) -> SimEfuse<'_> {
        SimEfuse { device: self }
    }

    /// Mailbox handle.
    pub fn mailbox(&self) -> SimMailbox<'_> {
        SimMailbox { device: self }
    }

    /// Simulated clock; each delay advances device time.
    pub fn clock(&self) -> SimClock<'_> {
        SimClock { device: self }
    }

    /// Lifecycle bits as seen by software until the next reset.
    pub fn visible_fuses(&self) -> LifecycleFuses {
        self.visible.get()
    }

    /// Lifecycle bits physically programmed.
    pub fn programmed_fuses(&self) -> LifecycleFuses {
        self.programmed.get()
    }

    /// Simulated time elapsed since construction or the last reset.
    pub fn elapsed(&self) -> Duration {
        self.now.get()
    }

    /// Number of requests accepted by the mailbox.
    pub fn posts(&self) -> u32 {
        self.posts.get()
    }

    /// Returns `true` while the mailbox lock is held.
    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    /// Reset the device: programmed fuses become visible and the mailbox is
    /// released. A busy executor re-asserts its lock.
    pub fn reset(&self) {
        self.visible.set(self.programmed.get());
        self.pending.set(None);
        self.status.set(0);
        self.now.set(Duration::ZERO);
        self.locked.set(self.behavior == ExecutorBehavior::Busy);
        info!("simulated device reset; fuses {:#06b}", self.visible.get().bits());
    }

    fn advance(&self, by: Duration) {
        self.now.set(self.now.get().saturating_add(by));
        self.service();
    }

    fn service(&self) {
        let Some(pending) = self.pending.get() else {
            return;
        };
        if self.now.get() < pending.due {
            return;
        }
        self.pending.set(None);
        let status = self.execute(pending);
        debug!("simulated executor finished with status {status:#010x}");
        self.status.set(status);
        self.locked.set(false);
    }

    fn execute(&self, pending: Pending) -> u32 {
        let status = if pending.opcode != OPCODE_TRANSITION_TO_RMA {
            SIM_STATUS_INVALID_OPCODE
        } else if self.programmed.get().contains(LifecycleFuses::RMA) {
            SIM_STATUS_ALREADY_RMA
        } else if self.reject_credential || pending.credential_len == 0 {
            SIM_STATUS_INVALID_CREDENTIAL
        } else {
            STATUS_SUCCESS
        };
        let status = self.status_override.unwrap_or(status);
        if status & STATUS_MASK == STATUS_SUCCESS {
            self.programmed.set(self.programmed.get() | LifecycleFuses::RMA);
        }
        status
    }
}

/// eFuse view of a [`SimulatedDevice`].
#[derive(Debug, Clone, Copy)]
pub struct SimEfuse<'a> {
    device: &'a SimulatedDevice,
}

impl EfuseReader for SimEfuse<'_> {
    fn read_bit(&self, offset: u32) -> bool {
        let base = LIFECYCLE_EFUSE_BYTE * 8;
        if !(base..base + 8).contains(&offset) {
            return false;
        }
        self.device.visible.get().bits() & (1 << (offset - base)) != 0
    }
}

/// Mailbox view of a [`SimulatedDevice`].
#[derive(Debug)]
pub struct SimMailbox<'a> {
    device: &'a SimulatedDevice,
}

impl MailboxChannel for SimMailbox<'_> {
    fn post(&mut self, request: &TransitionRequest<'_>) -> bool {
        let device = self.device;
        if device.locked.get() {
            return false;
        }
        device.locked.set(true);
        device.posts.set(device.posts.get() + 1);
        device.status.set(request.opcode());
        if let ExecutorBehavior::Complete { latency } = device.behavior {
            device.pending.set(Some(Pending {
                opcode: request.opcode(),
                credential_len: request.payload().len(),
                due: device.now.get().saturating_add(latency),
            }));
            device.service();
        }
        true
    }

    fn is_locked(&self) -> bool {
        self.device.locked.get()
    }

    fn status_word(&self) -> u32 {
        self.device.status.get()
    }
}

/// Clock view of a [`SimulatedDevice`]; delays cost no wall time.
#[derive(Debug)]
pub struct SimClock<'a> {
    device: &'a SimulatedDevice,
}

impl Delay for SimClock<'_> {
    fn delay(&mut self, interval: Duration) {
        self.device.advance(interval);
    }
}
