// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Module discovery.
//!
//! [`ModuleLocator`] turns a [`ModuleBounds`] slot into a [`LocatedModule`]:
//! either by parsing the header stored in flash or, for firmware that does
//! not describe itself, by asking the [`PlatformAccessor`].

use heapless::Vec;
use thiserror::Error;

use crate::fmt::{debug, warn};
use crate::layout::{ModuleBounds, ModuleStore, Platform};
use crate::mal::MediaAccessDispatcher;
use crate::module_info::{
    header_offset, McuTarget, ModuleHeader, ModuleIdentity, ModuleInfoFlags, CHECKSUM_SIZE,
    MODULE_HEADER_SIZE, MODULE_SUFFIX_SIZE,
};

/// Most modules a single combined image may carry.
pub const MAX_COMBINED_MODULES: usize = 2;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlatformError {
    #[error("operation not supported for this module")]
    Unsupported,
    #[error("co-processor did not answer the version query")]
    QueryFailed,
    #[error("co-processor rejected the update")]
    UpdateFailed,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LocateError {
    #[error("no valid module header at 0x{address:08x}")]
    MalformedHeader { address: u32 },
    #[error("platform query for {identity:?} failed: {source}")]
    PlatformQueryFailed {
        identity: ModuleIdentity,
        source: PlatformError,
    },
}

/// Platform hooks for firmware the engine cannot read itself.
pub trait PlatformAccessor {
    /// Synthesize a header for a module that has none in local flash.
    fn fetch_module_info(
        &mut self,
        identity: &ModuleIdentity,
    ) -> Result<ModuleHeader, PlatformError>;

    /// Whether firmware for `mcu` can be updated through this accessor.
    fn is_updatable(&self, _mcu: McuTarget) -> bool {
        false
    }

    /// Hand a staged module to its co-processor.
    fn update_module(
        &mut self,
        _mal: &mut MediaAccessDispatcher<'_>,
        _module: &LocatedModule,
    ) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }
}

/// Accessor for devices with no co-processor.
pub struct NoCoprocessor;

impl PlatformAccessor for NoCoprocessor {
    fn fetch_module_info(
        &mut self,
        _identity: &ModuleIdentity,
    ) -> Result<ModuleHeader, PlatformError> {
        Err(PlatformError::Unsupported)
    }
}

/// Where a header came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderSource {
    /// Parsed from flash, `header_offset` bytes after the slot start.
    Flash { header_offset: u32 },
    /// Synthesized by the platform accessor.
    Platform,
}

/// A module found in a slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocatedModule {
    /// Slot the module was found in (staging, main, factory, ...).
    pub bounds: ModuleBounds,
    pub header: ModuleHeader,
    pub source: HeaderSource,
}

impl LocatedModule {
    /// Address of the first image byte in the slot it was found in.
    pub fn address(&self) -> u32 {
        self.bounds.start_address
    }

    /// Address of the stored CRC in the slot it was found in.
    pub fn checksum_address(&self) -> u32 {
        self.address() + self.header.length()
    }

    pub fn header_offset(&self) -> u32 {
        match self.source {
            HeaderSource::Flash { header_offset } => header_offset,
            HeaderSource::Platform => 0,
        }
    }

    /// Whether the image bytes can be read through the MAL.
    pub fn is_locally_readable(&self) -> bool {
        matches!(self.source, HeaderSource::Flash { .. })
            && self.bounds.location != ModuleStore::Coprocessor
    }
}

pub struct ModuleLocator<'a> {
    platform: &'a Platform,
    accessor: &'a mut dyn PlatformAccessor,
}

impl<'a> ModuleLocator<'a> {
    pub fn new(platform: &'a Platform, accessor: &'a mut dyn PlatformAccessor) -> Self {
        Self { platform, accessor }
    }

    pub fn platform(&self) -> &'a Platform {
        self.platform
    }

    /// Find the module occupying `bounds`.
    pub fn locate(
        &mut self,
        mal: &mut MediaAccessDispatcher<'_>,
        bounds: &ModuleBounds,
    ) -> Result<LocatedModule, LocateError> {
        let identity = bounds.identity;
        if bounds.location == ModuleStore::Coprocessor || !identity.function.is_self_describing() {
            let header = self.accessor.fetch_module_info(&identity).map_err(|source| {
                warn!("locate: platform query for {:?} failed: {:?}", identity, source);
                LocateError::PlatformQueryFailed { identity, source }
            })?;
            if header.end_address <= header.start_address {
                warn!(
                    "locate: platform header for {:?} has an inverted range",
                    identity
                );
                return Err(LocateError::MalformedHeader {
                    address: bounds.start_address,
                });
            }
            return Ok(LocatedModule {
                bounds: *bounds,
                header,
                source: HeaderSource::Platform,
            });
        }

        let address = bounds.start_address;
        let malformed = LocateError::MalformedHeader { address };

        let mut word = [0u8; 4];
        mal.read_into(address, &mut word).map_err(|e| {
            debug!("locate: 0x{:08x} unreadable: {:?}", address, e);
            malformed
        })?;
        let header_offset = header_offset(u32::from_le_bytes(word));

        let mut raw = [0u8; MODULE_HEADER_SIZE];
        mal.read_into(address + header_offset, &mut raw)
            .map_err(|_| malformed)?;
        let header = ModuleHeader::parse(&raw).map_err(|e| {
            debug!("locate: no header at 0x{:08x}: {:?}", address, e);
            malformed
        })?;

        let length = header.length();
        let minimum = header_offset + (MODULE_HEADER_SIZE + MODULE_SUFFIX_SIZE) as u32;
        let fits = self
            .platform
            .region_for(address)
            .map(|region| {
                let end = region.offset_of(address) as u64 + length as u64 + CHECKSUM_SIZE as u64;
                end <= region.size() as u64
            })
            .unwrap_or(false);
        if length < minimum || !fits {
            warn!(
                "locate: header at 0x{:08x} claims {} bytes, outside the medium",
                address,
                length
            );
            return Err(malformed);
        }

        Ok(LocatedModule {
            bounds: *bounds,
            header,
            source: HeaderSource::Flash { header_offset },
        })
    }

    /// Walk a staging slot that may hold several modules back to back.
    pub fn locate_all(
        &mut self,
        mal: &mut MediaAccessDispatcher<'_>,
        bounds: &ModuleBounds,
    ) -> Result<Vec<LocatedModule, MAX_COMBINED_MODULES>, LocateError> {
        let mut modules = Vec::new();
        let mut slot = *bounds;
        loop {
            let module = self.locate(mal, &slot)?;
            let next = module.checksum_address() + CHECKSUM_SIZE;
            let combined = module.header.flags.contains(ModuleInfoFlags::COMBINED);
            if modules.push(module).is_err() {
                return Err(LocateError::MalformedHeader {
                    address: slot.start_address,
                });
            }
            if !combined {
                return Ok(modules);
            }
            if next >= bounds.end_address {
                return Err(LocateError::MalformedHeader { address: next });
            }
            slot = slot.rebased(next);
        }
    }
}
