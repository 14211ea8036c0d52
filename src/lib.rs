// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Root library for the RMA lifecycle transition protocol.
// Author: Lukas Bower
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! One-way lifecycle transition to RMA over the system-call mailbox.
//!
//! The crate decodes the lifecycle stage from the OTP eFuse bits, packages the
//! pre-issued authorization token into the fixed-size request payload, hands
//! the request to the privileged boot-time executor through the shared
//! mailbox and waits for the status word under a bounded timeout.
//!
//! Platform access is expressed through [`otp::EfuseReader`],
//! [`mailbox::MailboxChannel`] and [`mailbox::Delay`]. The [`sim`] module
//! provides an in-process device model implementing all three.

/// Protocol error taxonomy.
pub mod error;
/// OTP eFuse lifecycle decode.
pub mod otp;
/// Request payload and request descriptor.
pub mod payload;
/// Mailbox transport with bounded completion polling.
pub mod mailbox;
/// Trigger-driven transition state machine.
pub mod orchestrator;
/// Simulated OTP block and privileged executor.
pub mod sim;

/// TOML configuration for the host tool.
#[cfg(feature = "std")]
pub mod config;

pub use error::{TransitionError, TransitionResult};
pub use mailbox::{Delay, MailboxChannel, MailboxTransport, StatusWord};
pub use orchestrator::{DiagnosticSink, OrchestratorState, TransitionOrchestrator, TransitionReport};
pub use otp::{EfuseReader, LifecycleFuses, LifecycleStage, LifecycleStageReader};
pub use payload::{RequestPayload, TransitionRequest, MAX_CREDENTIAL_LENGTH};
