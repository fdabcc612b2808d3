// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Compiled-in memory layout: media regions, protected ranges and module slots.
//!
//! These tables are the single source of truth for where each medium is
//! mapped and where a module of a given identity may live.

use crate::flash::MediumKind;
use crate::module_info::{McuTarget, ModuleFunction, ModuleIdentity};

// --- Media ---

pub const INTERNAL_FLASH_BASE: u32 = 0x0800_0000;
pub const INTERNAL_FLASH_SIZE: u32 = 1024 * 1024; // 1MB
pub const INTERNAL_FLASH_SECTOR_SIZE: u32 = 16 * 1024;

pub const SERIAL_FLASH_BASE: u32 = 0x8000_0000;
pub const SERIAL_FLASH_SIZE: u32 = 4 * 1024 * 1024; // 4MB
pub const SERIAL_FLASH_SECTOR_SIZE: u32 = 4096;

pub const DEFAULT_PLATFORM_ID: u16 = 6;

/// Address window owned by one physical medium.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MediaRegion {
    pub base_address: u32,
    pub mask: u32,
    pub kind: MediumKind,
}

impl MediaRegion {
    pub fn contains(&self, address: u32) -> bool {
        address & self.mask == self.base_address
    }

    /// Size of the window described by the mask.
    pub fn size(&self) -> u32 {
        (!self.mask).wrapping_add(1)
    }

    pub fn offset_of(&self, address: u32) -> u32 {
        address - self.base_address
    }
}

pub const MEDIA_REGIONS: [MediaRegion; 2] = [
    MediaRegion {
        base_address: INTERNAL_FLASH_BASE,
        mask: !(INTERNAL_FLASH_SIZE - 1),
        kind: MediumKind::InternalFlash,
    },
    MediaRegion {
        base_address: SERIAL_FLASH_BASE,
        mask: !(SERIAL_FLASH_SIZE - 1),
        kind: MediumKind::SerialFlash,
    },
];

/// Half-open address range that may not be erased or written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProtectedRange {
    pub start: u32,
    pub end: u32,
}

impl ProtectedRange {
    pub fn overlaps(&self, address: u32, length: u32) -> bool {
        let end = address.saturating_add(length.max(1));
        address < self.end && self.start < end
    }
}

pub const PROTECTED_RANGES: [ProtectedRange; 2] = [
    // Bootloader and device configuration
    ProtectedRange {
        start: INTERNAL_FLASH_BASE,
        end: 0x0800_C000,
    },
    // Serial flash keys and reserved area
    ProtectedRange {
        start: SERIAL_FLASH_BASE,
        end: 0x8000_4000,
    },
];

// --- Module slots ---

/// Where a module slot lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModuleStore {
    /// The slot the module runs from.
    Main,
    /// Factory reset copy.
    Factory,
    /// Staging area for received images.
    Scratchpad,
    /// Firmware owned by another MCU; not locally addressable.
    Coprocessor,
}

/// Compiled-in slot a module of a given identity may occupy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModuleBounds {
    pub start_address: u32,
    pub end_address: u32,
    pub location: ModuleStore,
    pub identity: ModuleIdentity,
}

impl ModuleBounds {
    pub const fn new(
        start_address: u32,
        end_address: u32,
        location: ModuleStore,
        function: ModuleFunction,
        index: u8,
        mcu: McuTarget,
    ) -> Self {
        Self {
            start_address,
            end_address,
            location,
            identity: ModuleIdentity::new(function, index, mcu),
        }
    }

    pub fn size(&self) -> u32 {
        self.end_address - self.start_address
    }

    pub fn contains(&self, address: u32) -> bool {
        address >= self.start_address && address <= self.end_address
    }

    /// Same slot relocated to `start_address` (used when walking combined images).
    pub fn rebased(&self, start_address: u32) -> Self {
        Self {
            start_address,
            ..*self
        }
    }
}

pub const BOOTLOADER: ModuleBounds = ModuleBounds::new(
    0x0800_0000,
    0x0800_4000,
    ModuleStore::Main,
    ModuleFunction::Bootloader,
    0,
    McuTarget::PRIMARY,
);

pub const RADIO_STACK: ModuleBounds = ModuleBounds::new(
    0x0800_C000,
    0x0802_0000,
    ModuleStore::Main,
    ModuleFunction::RadioStack,
    0,
    McuTarget::PRIMARY,
);

pub const SYSTEM_PART_1: ModuleBounds = ModuleBounds::new(
    0x0802_0000,
    0x0806_0000,
    ModuleStore::Main,
    ModuleFunction::SystemPart,
    1,
    McuTarget::PRIMARY,
);

pub const SYSTEM_PART_2: ModuleBounds = ModuleBounds::new(
    0x0806_0000,
    0x080A_0000,
    ModuleStore::Main,
    ModuleFunction::SystemPart,
    2,
    McuTarget::PRIMARY,
);

pub const USER_PART: ModuleBounds = ModuleBounds::new(
    0x080A_0000,
    0x080E_0000,
    ModuleStore::Main,
    ModuleFunction::UserPart,
    1,
    McuTarget::PRIMARY,
);

pub const FACTORY_USER_PART: ModuleBounds = ModuleBounds::new(
    0x8014_0000,
    0x8018_0000,
    ModuleStore::Factory,
    ModuleFunction::UserPart,
    1,
    McuTarget::PRIMARY,
);

pub const NCP_FIRMWARE: ModuleBounds = ModuleBounds::new(
    0x0000_0000,
    0x0020_0000,
    ModuleStore::Coprocessor,
    ModuleFunction::NcpFirmware,
    0,
    McuTarget::NCP,
);

pub const OTA_STAGING: ModuleBounds = ModuleBounds::new(
    0x8004_0000,
    0x8014_0000,
    ModuleStore::Scratchpad,
    ModuleFunction::None,
    0,
    McuTarget::ANY,
);

/// Module slots in lookup order. Main slots precede their factory copies.
pub const MODULE_BOUNDS: [ModuleBounds; 7] = [
    BOOTLOADER,
    RADIO_STACK,
    SYSTEM_PART_1,
    SYSTEM_PART_2,
    USER_PART,
    FACTORY_USER_PART,
    NCP_FIRMWARE,
];

/// Device description handed to every engine component.
#[derive(Clone, Copy, Debug)]
pub struct Platform {
    pub platform_id: u16,
    pub regions: &'static [MediaRegion],
    pub protected: &'static [ProtectedRange],
    pub modules: &'static [ModuleBounds],
    pub staging: ModuleBounds,
}

impl Platform {
    pub const DEFAULT: Platform = Platform {
        platform_id: DEFAULT_PLATFORM_ID,
        regions: &MEDIA_REGIONS,
        protected: &PROTECTED_RANGES,
        modules: &MODULE_BOUNDS,
        staging: OTA_STAGING,
    };

    pub fn region_for(&self, address: u32) -> Option<&'static MediaRegion> {
        self.regions.iter().find(|r| r.contains(address))
    }

    pub fn is_protected(&self, address: u32, length: u32) -> bool {
        self.protected.iter().any(|p| p.overlaps(address, length))
    }

    /// First slot whose identity matches.
    pub fn find_bounds(&self, identity: &ModuleIdentity) -> Option<&'static ModuleBounds> {
        self.modules.iter().find(|b| b.identity.matches(identity))
    }

    /// First slot in `location` whose identity matches.
    pub fn find_bounds_in(
        &self,
        identity: &ModuleIdentity,
        location: ModuleStore,
    ) -> Option<&'static ModuleBounds> {
        self.modules
            .iter()
            .find(|b| b.location == location && b.identity.matches(identity))
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_sizes_follow_masks() {
        assert_eq!(MEDIA_REGIONS[0].size(), INTERNAL_FLASH_SIZE);
        assert_eq!(MEDIA_REGIONS[1].size(), SERIAL_FLASH_SIZE);
    }

    #[test]
    fn test_protected_range_edges() {
        let range = ProtectedRange {
            start: 0x100,
            end: 0x200,
        };
        assert!(range.overlaps(0x1FF, 1));
        assert!(range.overlaps(0x0F0, 0x20));
        assert!(!range.overlaps(0x200, 0x100));
        assert!(!range.overlaps(0x0F0, 0x10));
    }
}
