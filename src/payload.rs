// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Fixed-capacity request payload carrying the RMA authorization token.
// Author: Lukas Bower

use core::fmt;

use crate::error::TransitionError;

/// Capacity of the credential buffer handed to the executor.
pub const MAX_CREDENTIAL_LENGTH: usize = 367;

/// System-call operation code requesting the transition to RMA.
pub const OPCODE_TRANSITION_TO_RMA: u32 = 0x3B00_0000;

/// Credential block read by the privileged executor.
///
/// The layout matches the executor's parameter block: a 32-bit length
/// followed by the token bytes. Bytes past `length` are always zero.
#[repr(C)]
#[derive(Clone, PartialEq, Eq)]
pub struct RequestPayload {
    length: u32,
    credential: [u8; MAX_CREDENTIAL_LENGTH],
}

impl RequestPayload {
    /// Copies `credential` into a zeroed payload and records its length.
    pub fn build(credential: &[u8]) -> Result<Self, TransitionError> {
        if credential.len() > MAX_CREDENTIAL_LENGTH {
            return Err(TransitionError::PayloadTooLarge {
                len: credential.len(),
                max: MAX_CREDENTIAL_LENGTH,
            });
        }
        let mut payload = Self {
            length: 0,
            credential: [0; MAX_CREDENTIAL_LENGTH],
        };
        payload.credential[..credential.len()].copy_from_slice(credential);
        // Bounded by MAX_CREDENTIAL_LENGTH above.
        payload.length = credential.len() as u32;
        Ok(payload)
    }

    /// Recorded credential length in bytes.
    pub const fn len(&self) -> usize {
        self.length as usize
    }

    /// Returns `true` when no credential bytes were supplied.
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Credential bytes, without the zero padding.
    pub fn credential(&self) -> &[u8] {
        &self.credential[..self.len()]
    }

    /// Full fixed-size buffer including padding.
    pub fn raw_buffer(&self) -> &[u8; MAX_CREDENTIAL_LENGTH] {
        &self.credential
    }
}

impl fmt::Debug for RequestPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Token bytes stay out of logs.
        f.debug_struct("RequestPayload")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Descriptor posted to the mailbox: operation code plus payload reference.
///
/// Borrowing the payload keeps it immutable for as long as the request
/// exists.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRequest<'a> {
    opcode: u32,
    payload: &'a RequestPayload,
}

impl<'a> TransitionRequest<'a> {
    /// Request to move the device into the RMA stage.
    pub const fn transition_to_rma(payload: &'a RequestPayload) -> Self {
        Self {
            opcode: OPCODE_TRANSITION_TO_RMA,
            payload,
        }
    }

    /// Operation code written into the descriptor.
    pub const fn opcode(&self) -> u32 {
        self.opcode
    }

    /// Parameter block referenced by the descriptor.
    pub const fn payload(&self) -> &'a RequestPayload {
        self.payload
    }
}
