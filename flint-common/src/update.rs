// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Staged update session.
//!
//! Drives the engine the way an OTA or DFU caller does:
//! - `begin`: erase the staging slot for an image of known size
//! - `write`: append received bytes, strictly in order
//! - `finish`: validate every staged module, then apply each one
//!
//! A failed session leaves the running firmware untouched; staged bytes
//! stay inert until the next `begin`.

use heapless::Vec;
use thiserror::Error;

use crate::applier::{ApplyError, ApplyOutcome, ModuleUpdateApplier};
use crate::fmt::{info, warn};
use crate::layout::Platform;
use crate::locator::{LocateError, ModuleLocator, PlatformAccessor, MAX_COMBINED_MODULES};
use crate::mal::{MalError, MediaAccessDispatcher, TRANSFER_BUFFER_SIZE};
use crate::module_info::{ModuleFunction, ModuleInfoFlags};
use crate::validator::{
    ModuleValidator, ValidateError, ValidatedModule, ValidationChecks, ValidationOptions,
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateError {
    #[error("operation not valid in the current session state")]
    BadState,
    #[error("image size {size} does not fit the staging area ({max} bytes)")]
    InvalidSize { size: u32, max: u32 },
    #[error("expected offset {expected}, got {got}")]
    OutOfOrder { expected: u32, got: u32 },
    #[error("write past the announced image size")]
    Overflow,
    #[error("received {received} of {expected} bytes")]
    Incomplete { expected: u32, received: u32 },
    #[error("no module found in the staged image")]
    ModuleNotFound,
    #[error("staged module failed its integrity check")]
    IntegrityCheckFailed,
    #[error("staged module has unsatisfied dependencies")]
    DependencyCheckFailed,
    #[error("staged module does not fit its destination")]
    InvalidAddress,
    #[error("staged module targets another platform")]
    InvalidPlatform,
    #[error("staged module flags are incompatible with its layout")]
    InvalidFormat,
    #[error("{0:?} modules are not supported")]
    Unsupported(ModuleFunction),
    #[error(transparent)]
    Mal(#[from] MalError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

impl From<ValidateError> for UpdateError {
    fn from(e: ValidateError) -> Self {
        match e {
            ValidateError::NoMatchingBounds(_) => UpdateError::InvalidAddress,
            ValidateError::Locate(LocateError::MalformedHeader { .. }) => {
                UpdateError::ModuleNotFound
            }
            ValidateError::Locate(LocateError::PlatformQueryFailed { identity, .. }) => {
                UpdateError::Unsupported(identity.function)
            }
        }
    }
}

impl UpdateError {
    /// First missing guarantee, by priority.
    fn from_checks(checks: &ValidationChecks) -> Option<Self> {
        if checks.integrity == Some(false) {
            return Some(UpdateError::IntegrityCheckFailed);
        }
        if checks.dependencies == Some(false) || checks.dependencies_full == Some(false) {
            return Some(UpdateError::DependencyCheckFailed);
        }
        if checks.range == Some(false) {
            return Some(UpdateError::InvalidAddress);
        }
        if checks.platform == Some(false) {
            return Some(UpdateError::InvalidPlatform);
        }
        None
    }
}

/// Session states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for a new update to start.
    Idle,
    /// Receiving image bytes into the staging slot.
    Receiving { expected_size: u32, bytes_received: u32 },
}

pub struct UpdateSession<'a> {
    platform: &'a Platform,
    state: SessionState,
}

impl<'a> UpdateSession<'a> {
    pub fn new(platform: &'a Platform) -> Self {
        Self {
            platform,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Erase staging and start receiving an image of `size` bytes.
    pub fn begin(
        &mut self,
        mal: &mut MediaAccessDispatcher<'_>,
        size: u32,
    ) -> Result<(), UpdateError> {
        if self.state != SessionState::Idle {
            return Err(UpdateError::BadState);
        }
        let staging = &self.platform.staging;
        let max = staging.size();
        if size == 0 || size > max {
            return Err(UpdateError::InvalidSize { size, max });
        }

        mal.erase_range(staging.start_address, size)?;
        info!(
            "update: staging {} bytes at 0x{:08x}",
            size,
            staging.start_address
        );
        self.state = SessionState::Receiving {
            expected_size: size,
            bytes_received: 0,
        };
        Ok(())
    }

    /// Append `data` at `offset` of the staged image.
    pub fn write(
        &mut self,
        mal: &mut MediaAccessDispatcher<'_>,
        offset: u32,
        data: &[u8],
    ) -> Result<(), UpdateError> {
        let SessionState::Receiving {
            expected_size,
            ref mut bytes_received,
        } = self.state
        else {
            return Err(UpdateError::BadState);
        };

        if offset != *bytes_received {
            return Err(UpdateError::OutOfOrder {
                expected: *bytes_received,
                got: offset,
            });
        }
        let data_len = data.len() as u32;
        if *bytes_received + data_len > expected_size {
            return Err(UpdateError::Overflow);
        }

        let base = self.platform.staging.start_address + offset;
        let mut written = 0;
        for block in data.chunks(TRANSFER_BUFFER_SIZE) {
            mal.program(base + written, block)?;
            written += block.len() as u32;
        }

        *bytes_received += data_len;
        Ok(())
    }

    /// Drop the session. Staged bytes are left as they are.
    pub fn abort(&mut self) {
        if self.state != SessionState::Idle {
            info!("update: aborted");
        }
        self.state = SessionState::Idle;
    }

    /// Locate and validate everything in staging without applying it.
    pub fn validate(
        &self,
        mal: &mut MediaAccessDispatcher<'_>,
        accessor: &mut dyn PlatformAccessor,
        dependencies_optional: bool,
    ) -> Result<Vec<ValidatedModule, MAX_COMBINED_MODULES>, UpdateError> {
        let staged = ModuleLocator::new(self.platform, &mut *accessor)
            .locate_all(mal, &self.platform.staging)
            .map_err(ValidateError::from)?;

        let options = ValidationOptions {
            integrity: true,
            dependencies_optional,
            full_dependencies: true,
        };
        let mut validator = ModuleValidator::new(self.platform, accessor);
        let mut validated = Vec::new();
        for module in staged {
            let header = &module.header;
            let flags = header.flags;
            if flags.intersects(ModuleInfoFlags::DROP_MODULE_INFO | ModuleInfoFlags::COMPRESSED)
                && module.header_offset() != 0
            {
                return Err(UpdateError::InvalidFormat);
            }
            if flags.contains(ModuleInfoFlags::COMPRESSED) {
                return Err(UpdateError::Unsupported(header.function));
            }

            let result = validator.validate(mal, module, options)?;
            if let Some(e) = UpdateError::from_checks(&result.checks) {
                warn!(
                    "update: {:?} rejected: attempted=0x{:02x} passed=0x{:02x}",
                    result.header().identity(),
                    result.checks_attempted().bits(),
                    result.checks_passed().bits()
                );
                return Err(e);
            }
            // Capacity matches `locate_all`.
            let _ = validated.push(result);
        }
        Ok(validated)
    }

    /// Validate and apply the received image.
    pub fn finish(
        &mut self,
        mal: &mut MediaAccessDispatcher<'_>,
        accessor: &mut dyn PlatformAccessor,
        dependencies_optional: bool,
    ) -> Result<ApplyOutcome, UpdateError> {
        let SessionState::Receiving {
            expected_size,
            bytes_received,
        } = self.state
        else {
            return Err(UpdateError::BadState);
        };
        if bytes_received != expected_size {
            return Err(UpdateError::Incomplete {
                expected: expected_size,
                received: bytes_received,
            });
        }
        self.state = SessionState::Idle;

        let modules = self.validate(mal, &mut *accessor, dependencies_optional)?;
        let mut applier = ModuleUpdateApplier::new(self.platform, accessor);
        for module in &modules {
            applier.apply(mal, module)?;
        }
        info!("update: {} module(s) applied, restart pending", modules.len());
        Ok(ApplyOutcome::AppliedPendingRestart)
    }
}
