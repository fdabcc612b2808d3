// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Copy a validated, staged module to the slot it runs from.

use thiserror::Error;

use crate::fmt::{info, warn};
use crate::layout::{ModuleStore, Platform};
use crate::locator::{PlatformAccessor, PlatformError};
use crate::mal::{MalError, MediaAccessDispatcher};
use crate::module_info::{ModuleFunction, ModuleInfoFlags, CHECKSUM_SIZE, MODULE_HEADER_SIZE};
use crate::validator::ValidatedModule;

/// Bytes moved per read/program step.
pub const COPY_CHUNK_SIZE: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApplyOutcome {
    /// The new module takes effect after the next reset.
    AppliedPendingRestart,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApplyError {
    #[error("module integrity was not verified")]
    IntegrityRequired,
    #[error("module does not fit its slot")]
    RangeRequired,
    #[error("destination 0x{address:08x}+{length} is not a valid target")]
    InvalidDestination { address: u32, length: u32 },
    #[error("module flags are incompatible with its layout")]
    InvalidFormat,
    #[error("{0:?} modules cannot be applied")]
    UnsupportedModule(ModuleFunction),
    #[error(transparent)]
    Mal(#[from] MalError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

pub struct ModuleUpdateApplier<'a> {
    platform: &'a Platform,
    accessor: &'a mut dyn PlatformAccessor,
}

impl<'a> ModuleUpdateApplier<'a> {
    pub fn new(platform: &'a Platform, accessor: &'a mut dyn PlatformAccessor) -> Self {
        Self { platform, accessor }
    }

    /// Install `validated` into its destination slot.
    ///
    /// Requires the integrity check to have passed. Platform and dependency
    /// results are left to the caller's policy.
    pub fn apply(
        &mut self,
        mal: &mut MediaAccessDispatcher<'_>,
        validated: &ValidatedModule,
    ) -> Result<ApplyOutcome, ApplyError> {
        if validated.checks.integrity != Some(true) {
            return Err(ApplyError::IntegrityRequired);
        }
        if validated.checks.range != Some(true) {
            return Err(ApplyError::RangeRequired);
        }

        let header = validated.header();
        if header.flags.contains(ModuleInfoFlags::COMPRESSED) {
            return Err(ApplyError::UnsupportedModule(header.function));
        }

        if validated.destination.location == ModuleStore::Coprocessor {
            return self.apply_to_coprocessor(mal, validated);
        }

        let drop_header = header.flags.contains(ModuleInfoFlags::DROP_MODULE_INFO);
        if drop_header && validated.module.header_offset() != 0 {
            return Err(ApplyError::InvalidFormat);
        }

        let mut source = validated.module.address();
        let mut length = header.length() + CHECKSUM_SIZE;
        if drop_header {
            source += MODULE_HEADER_SIZE as u32;
            length -= MODULE_HEADER_SIZE as u32;
        }
        let destination = header.start_address;

        let slot = &validated.destination;
        let invalid = ApplyError::InvalidDestination {
            address: destination,
            length,
        };
        let dest_end = destination as u64 + length as u64;
        if destination < slot.start_address || dest_end > slot.end_address as u64 {
            return Err(invalid);
        }
        let source_end = source as u64 + length as u64;
        if (source as u64) < dest_end && (destination as u64) < source_end {
            warn!("apply: source 0x{:08x} overlaps destination", source);
            return Err(invalid);
        }
        if self.platform.region_for(destination).is_none() {
            return Err(invalid);
        }

        info!(
            "apply: copying {} bytes 0x{:08x} -> 0x{:08x}",
            length,
            source,
            destination
        );

        mal.erase_range(destination, length)?;
        let mut chunk = [0u8; COPY_CHUNK_SIZE];
        let mut copied = 0u32;
        while copied < length {
            let n = (length - copied).min(COPY_CHUNK_SIZE as u32);
            let buf = &mut chunk[..n as usize];
            mal.read_into(source + copied, buf)?;
            mal.program(destination + copied, buf)?;
            copied += n;
        }

        info!("apply: {:?} v{} installed", header.identity(), header.version);
        Ok(ApplyOutcome::AppliedPendingRestart)
    }

    fn apply_to_coprocessor(
        &mut self,
        mal: &mut MediaAccessDispatcher<'_>,
        validated: &ValidatedModule,
    ) -> Result<ApplyOutcome, ApplyError> {
        let header = validated.header();
        if !self.accessor.is_updatable(header.mcu) {
            warn!("apply: no update path for {:?}", header.mcu);
            return Err(ApplyError::UnsupportedModule(header.function));
        }
        self.accessor.update_module(mal, &validated.module)?;
        info!("apply: {:?} handed to co-processor", header.identity());
        Ok(ApplyOutcome::AppliedPendingRestart)
    }
}
