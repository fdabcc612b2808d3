// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Module header and suffix wire formats.
//!
//! A module image is laid out as:
//!
//! ```text
//! [vector table (optional, 0x200)] [header 24B] [body ...] [suffix 36B] | [crc32 BE 4B]
//! ^ start_address                                                       ^ end_address
//! ```
//!
//! All header fields are little-endian. The CRC-32 at `end_address` covers
//! `[start_address, end_address)` and is stored big-endian.

use bitflags::bitflags;
use heapless::Vec;
use thiserror::Error;

/// Size of the module header record.
pub const MODULE_HEADER_SIZE: usize = 24;

/// Size of the security suffix that closes the image body.
pub const MODULE_SUFFIX_SIZE: usize = 36;

/// Size of the CRC-32 stored after the image.
pub const CHECKSUM_SIZE: u32 = 4;

/// Offset of the header when the image starts with a vector table.
pub const VECTOR_TABLE_SIZE: u32 = 0x200;

/// Mask applied to the first image word to recognise an initial stack pointer.
pub const STACK_POINTER_MASK: u32 = 0xFFF0_0000;

/// SRAM base an initial stack pointer points into.
pub const SRAM_BASE: u32 = 0x2000_0000;

/// Maximum number of dependency records in a header.
pub const MAX_DEPENDENCIES: usize = 2;

/// What a module is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ModuleFunction {
    None = 0,
    Resource = 1,
    Bootloader = 2,
    MonoFirmware = 3,
    SystemPart = 4,
    UserPart = 5,
    Settings = 6,
    NcpFirmware = 7,
    RadioStack = 8,
    Asset = 9,
}

impl ModuleFunction {
    /// Whether images of this kind carry their own header in flash.
    ///
    /// Radio stacks and network co-processor firmware do not; their headers
    /// are synthesized by the platform accessor.
    pub fn is_self_describing(self) -> bool {
        !matches!(self, ModuleFunction::RadioStack | ModuleFunction::NcpFirmware)
    }
}

impl TryFrom<u8> for ModuleFunction {
    type Error = HeaderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ModuleFunction::None,
            1 => ModuleFunction::Resource,
            2 => ModuleFunction::Bootloader,
            3 => ModuleFunction::MonoFirmware,
            4 => ModuleFunction::SystemPart,
            5 => ModuleFunction::UserPart,
            6 => ModuleFunction::Settings,
            7 => ModuleFunction::NcpFirmware,
            8 => ModuleFunction::RadioStack,
            9 => ModuleFunction::Asset,
            other => return Err(HeaderError::UnknownFunction(other)),
        })
    }
}

/// MCU a module is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct McuTarget(pub u8);

impl McuTarget {
    /// Wildcard: matches every MCU.
    pub const ANY: McuTarget = McuTarget(0);
    /// The application MCU running this engine.
    pub const PRIMARY: McuTarget = McuTarget(1);
    /// Wi-Fi network co-processor.
    pub const NCP: McuTarget = McuTarget(2);

    pub fn matches(self, other: McuTarget) -> bool {
        self == McuTarget::ANY || other == McuTarget::ANY || self == other
    }
}

/// The name of a module slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModuleIdentity {
    pub function: ModuleFunction,
    pub index: u8,
    pub mcu: McuTarget,
}

impl ModuleIdentity {
    pub const fn new(function: ModuleFunction, index: u8, mcu: McuTarget) -> Self {
        Self {
            function,
            index,
            mcu,
        }
    }

    pub fn matches(&self, other: &ModuleIdentity) -> bool {
        self.function == other.function && self.index == other.index && self.mcu.matches(other.mcu)
    }
}

bitflags! {
    /// Per-module flags carried in the header.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ModuleInfoFlags: u8 {
        /// The header is not copied to the destination.
        const DROP_MODULE_INFO = 0x01;
        /// The body is compressed.
        const COMPRESSED = 0x02;
        /// Another module follows this one in the same image.
        const COMBINED = 0x04;
    }
}

/// A requirement on another installed module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Dependency {
    pub function: ModuleFunction,
    pub index: u8,
    pub min_version: u16,
}

impl Dependency {
    fn parse(bytes: &[u8]) -> Result<Option<Self>, HeaderError> {
        let function = ModuleFunction::try_from(bytes[0])?;
        if function == ModuleFunction::None {
            return Ok(None);
        }
        Ok(Some(Self {
            function,
            index: bytes[1],
            min_version: u16::from_le_bytes([bytes[2], bytes[3]]),
        }))
    }

    fn encode(dep: Option<&Dependency>, out: &mut [u8]) {
        match dep {
            Some(d) => {
                out[0] = d.function as u8;
                out[1] = d.index;
                out[2..4].copy_from_slice(&d.min_version.to_le_bytes());
            }
            None => out[..4].fill(0),
        }
    }
}

/// Why a header could not be parsed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeaderError {
    #[error("unknown module function {0}")]
    UnknownFunction(u8),
    #[error("header area is erased")]
    Erased,
    #[error("end address 0x{end:08x} is not after start address 0x{start:08x}")]
    InvertedRange { start: u32, end: u32 },
}

/// Offset of the header inside an image whose first word is `first_word`.
///
/// Images that start with an initial stack pointer (a vector table) carry
/// their header after the table.
pub fn header_offset(first_word: u32) -> u32 {
    if first_word & STACK_POINTER_MASK == SRAM_BASE {
        VECTOR_TABLE_SIZE
    } else {
        0
    }
}

/// Parsed module header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleHeader {
    pub start_address: u32,
    pub end_address: u32,
    pub version: u16,
    pub platform_id: u16,
    pub function: ModuleFunction,
    pub index: u8,
    pub mcu: McuTarget,
    pub flags: ModuleInfoFlags,
    pub dependencies: Vec<Dependency, MAX_DEPENDENCIES>,
}

impl ModuleHeader {
    /// Parse a header record.
    pub fn parse(bytes: &[u8; MODULE_HEADER_SIZE]) -> Result<Self, HeaderError> {
        if bytes.iter().all(|&b| b == 0xFF) || bytes.iter().all(|&b| b == 0x00) {
            return Err(HeaderError::Erased);
        }

        let word = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let half = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);

        let start_address = word(0);
        let end_address = word(4);
        if end_address <= start_address {
            return Err(HeaderError::InvertedRange {
                start: start_address,
                end: end_address,
            });
        }

        let mut dependencies = Vec::new();
        for record in [&bytes[16..20], &bytes[20..24]] {
            if let Some(dep) = Dependency::parse(record)? {
                // Capacity equals the number of records.
                let _ = dependencies.push(dep);
            }
        }

        Ok(Self {
            start_address,
            end_address,
            mcu: McuTarget(bytes[8]),
            flags: ModuleInfoFlags::from_bits_retain(bytes[9]),
            version: half(10),
            platform_id: half(12),
            function: ModuleFunction::try_from(bytes[14])?,
            index: bytes[15],
            dependencies,
        })
    }

    /// Encode the header record.
    pub fn to_bytes(&self) -> [u8; MODULE_HEADER_SIZE] {
        let mut out = [0u8; MODULE_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.start_address.to_le_bytes());
        out[4..8].copy_from_slice(&self.end_address.to_le_bytes());
        out[8] = self.mcu.0;
        out[9] = self.flags.bits();
        out[10..12].copy_from_slice(&self.version.to_le_bytes());
        out[12..14].copy_from_slice(&self.platform_id.to_le_bytes());
        out[14] = self.function as u8;
        out[15] = self.index;
        Dependency::encode(self.dependencies.first(), &mut out[16..20]);
        Dependency::encode(self.dependencies.get(1), &mut out[20..24]);
        out
    }

    /// Image length, excluding the trailing CRC.
    pub fn length(&self) -> u32 {
        self.end_address.saturating_sub(self.start_address)
    }

    pub fn identity(&self) -> ModuleIdentity {
        ModuleIdentity::new(self.function, self.index, self.mcu)
    }

    pub fn depends_on(&self, function: ModuleFunction, index: u8) -> Option<&Dependency> {
        self.dependencies
            .iter()
            .find(|d| d.function == function && d.index == index)
    }
}

/// Security suffix stored in the last bytes of the image body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleSuffix {
    pub sha256: [u8; 32],
    pub size: u16,
}

impl ModuleSuffix {
    pub fn parse(bytes: &[u8; MODULE_SUFFIX_SIZE]) -> Self {
        let mut sha256 = [0u8; 32];
        sha256.copy_from_slice(&bytes[2..34]);
        Self {
            sha256,
            size: u16::from_le_bytes([bytes[34], bytes[35]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; MODULE_SUFFIX_SIZE] {
        let mut out = [0u8; MODULE_SUFFIX_SIZE];
        out[2..34].copy_from_slice(&self.sha256);
        out[34..36].copy_from_slice(&self.size.to_le_bytes());
        out
    }
}

/// Integrity trailer of a module: stored CRC plus the security suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChecksumSuffix {
    pub crc32: u32,
    pub suffix: ModuleSuffix,
}
