// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Decode the device lifecycle stage from the OTP eFuse block.
// Author: Lukas Bower

use core::fmt;

use bitflags::bitflags;
use log::debug;

/// Byte index of the lifecycle stage field inside the eFuse map.
pub const LIFECYCLE_EFUSE_BYTE: u32 = 0x2B;

/// Read-only access to individual eFuse bits.
///
/// Reads are infallible and free of side effects; an unprogrammed bit reads
/// as `false`.
pub trait EfuseReader {
    /// Returns the programmed state of the eFuse bit at `offset`.
    fn read_bit(&self, offset: u32) -> bool;
}

impl<T: EfuseReader + ?Sized> EfuseReader for &T {
    fn read_bit(&self, offset: u32) -> bool {
        (**self).read_bit(offset)
    }
}

bitflags! {
    /// Raw lifecycle bits sampled from [`LIFECYCLE_EFUSE_BYTE`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LifecycleFuses: u8 {
        /// Device left the factory provisioning flow.
        const NORMAL = 1 << 0;
        /// Secure stage with the debug port left open.
        const SECURE_WITH_DEBUG = 1 << 1;
        /// Secure stage, debug locked.
        const SECURE = 1 << 2;
        /// Return Material Authorization. Terminal.
        const RMA = 1 << 3;
    }
}

impl LifecycleFuses {
    /// Absolute eFuse bit offset of a single-bit flag.
    ///
    /// Returns `None` for the empty set or for combinations of several bits.
    pub fn efuse_offset(self) -> Option<u32> {
        if self.bits().count_ones() != 1 {
            return None;
        }
        Some(LIFECYCLE_EFUSE_BYTE * 8 + self.bits().trailing_zeros())
    }

    /// Samples all four lifecycle bits through `reader`.
    pub fn sample<R: EfuseReader + ?Sized>(reader: &R) -> Self {
        let mut fuses = Self::empty();
        for flag in Self::all().iter() {
            if let Some(offset) = flag.efuse_offset() {
                if reader.read_bit(offset) {
                    fuses |= flag;
                }
            }
        }
        fuses
    }
}

/// Security posture of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStage {
    /// Unsecured, default stage.
    Normal,
    /// Secure boot enforced, debug locked.
    Secure,
    /// Secure boot enforced, debug port open.
    SecureWithDebug,
    /// Return Material Authorization.
    Rma,
}

impl LifecycleStage {
    /// Decodes the stage with most-restrictive-state-wins priority.
    ///
    /// Several bits may read as set while a device is between transitions;
    /// the order below resolves every combination.
    pub fn decode(fuses: LifecycleFuses) -> Self {
        if fuses.contains(LifecycleFuses::RMA) {
            Self::Rma
        } else if fuses.contains(LifecycleFuses::SECURE_WITH_DEBUG) {
            Self::SecureWithDebug
        } else if fuses.contains(LifecycleFuses::SECURE) {
            Self::Secure
        } else {
            Self::Normal
        }
    }

    /// Text shown on the debug console.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Secure => "SECURE",
            Self::SecureWithDebug => "SECURE_DEBUG",
            Self::Rma => "RMA",
        }
    }

    /// Returns `true` for stages no transition can leave.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rma)
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads the current [`LifecycleStage`] from an [`EfuseReader`].
#[derive(Debug, Clone)]
pub struct LifecycleStageReader<R> {
    efuse: R,
}

impl<R: EfuseReader> LifecycleStageReader<R> {
    /// Wrap the platform eFuse accessor.
    pub const fn new(efuse: R) -> Self {
        Self { efuse }
    }

    /// Raw lifecycle bits as currently programmed.
    pub fn fuses(&self) -> LifecycleFuses {
        LifecycleFuses::sample(&self.efuse)
    }

    /// Decoded lifecycle stage.
    pub fn current_stage(&self) -> LifecycleStage {
        let fuses = self.fuses();
        let stage = LifecycleStage::decode(fuses);
        debug!("lifecycle fuses {:#06b} decode to {stage}", fuses.bits());
        stage
    }

    /// Borrow the underlying accessor.
    pub fn efuse(&self) -> &R {
        &self.efuse
    }
}
