// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Shared fixtures: a RAM-backed device, an image builder and a fake
//! co-processor accessor.

#![allow(dead_code)]

use flint_common::flash::{MediumKind, CRC32};
use flint_common::layout::{
    Platform, INTERNAL_FLASH_BASE, INTERNAL_FLASH_SECTOR_SIZE, INTERNAL_FLASH_SIZE,
    SERIAL_FLASH_BASE, SERIAL_FLASH_SECTOR_SIZE, SERIAL_FLASH_SIZE,
};
use flint_common::locator::{LocatedModule, PlatformAccessor, PlatformError};
use flint_common::mal::MediaAccessDispatcher;
use flint_common::mem_flash::MemFlash;
use flint_common::module_info::{
    Dependency, McuTarget, ModuleFunction, ModuleHeader, ModuleIdentity, ModuleInfoFlags,
    ModuleSuffix, CHECKSUM_SIZE, MODULE_HEADER_SIZE, MODULE_SUFFIX_SIZE, VECTOR_TABLE_SIZE,
};

pub const PLATFORM: Platform = Platform::DEFAULT;

/// Backing storage for both media, erased.
pub struct Rig {
    pub internal: Vec<u8>,
    pub serial: Vec<u8>,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            internal: vec![0xFF; INTERNAL_FLASH_SIZE as usize],
            serial: vec![0xFF; SERIAL_FLASH_SIZE as usize],
        }
    }

    fn locate(&mut self, address: u32) -> (&mut Vec<u8>, usize) {
        if address >= SERIAL_FLASH_BASE {
            (&mut self.serial, (address - SERIAL_FLASH_BASE) as usize)
        } else {
            (&mut self.internal, (address - INTERNAL_FLASH_BASE) as usize)
        }
    }

    /// Place bytes directly, as a programmer would.
    pub fn install(&mut self, address: u32, bytes: &[u8]) {
        let (storage, offset) = self.locate(address);
        storage[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn flip(&mut self, address: u32) {
        let (storage, offset) = self.locate(address);
        storage[offset] ^= 0xFF;
    }

    pub fn bytes(&mut self, address: u32, length: usize) -> Vec<u8> {
        let (storage, offset) = self.locate(address);
        storage[offset..offset + length].to_vec()
    }

    pub fn devices(&mut self) -> (MemFlash<'_>, MemFlash<'_>) {
        (
            MemFlash::new(
                MediumKind::InternalFlash,
                &mut self.internal,
                INTERNAL_FLASH_SECTOR_SIZE,
            ),
            MemFlash::new(
                MediumKind::SerialFlash,
                &mut self.serial,
                SERIAL_FLASH_SECTOR_SIZE,
            ),
        )
    }
}

/// MAL over both devices.
pub fn dispatcher<'a>(
    internal: &'a mut MemFlash<'_>,
    serial: &'a mut MemFlash<'_>,
) -> MediaAccessDispatcher<'a> {
    let mut mal = MediaAccessDispatcher::new(&PLATFORM);
    mal.attach(internal);
    mal.attach(serial);
    mal
}

pub fn header(function: ModuleFunction, index: u8, start: u32, end: u32) -> ModuleHeader {
    ModuleHeader {
        start_address: start,
        end_address: end,
        version: 1,
        platform_id: PLATFORM.platform_id,
        function,
        index,
        mcu: McuTarget::PRIMARY,
        flags: ModuleInfoFlags::empty(),
        dependencies: heapless::Vec::new(),
    }
}

pub fn system_part(index: u8, version: u16) -> ModuleHeader {
    let start = if index == 1 { 0x0802_0000 } else { 0x0806_0000 };
    let mut h = header(ModuleFunction::SystemPart, index, start, start + 0x1_FFFC);
    h.version = version;
    h
}

/// Small user module (4 KiB image including the CRC).
pub fn user_part(version: u16) -> ModuleHeader {
    let start = 0x080A_0000;
    let mut h = header(ModuleFunction::UserPart, 1, start, start + 0x0FFC);
    h.version = version;
    h
}

pub fn with_dependency(
    mut h: ModuleHeader,
    function: ModuleFunction,
    index: u8,
    min: u16,
) -> ModuleHeader {
    h.dependencies
        .push(Dependency {
            function,
            index,
            min_version: min,
        })
        .unwrap();
    h
}

fn finish_image(mut image: Vec<u8>) -> Vec<u8> {
    let body_end = image.len() - CHECKSUM_SIZE as usize;
    let suffix = ModuleSuffix {
        sha256: [0xA5; 32],
        size: MODULE_SUFFIX_SIZE as u16,
    };
    image[body_end - MODULE_SUFFIX_SIZE..body_end].copy_from_slice(&suffix.to_bytes());
    let crc = CRC32.checksum(&image[..body_end]);
    image[body_end..].copy_from_slice(&crc.to_be_bytes());
    image
}

fn body(length: usize) -> Vec<u8> {
    (0..length).map(|i| (i * 7 + 3) as u8).collect()
}

/// Complete image (header, body, suffix, CRC) for `h`.
pub fn build_image(h: &ModuleHeader) -> Vec<u8> {
    let mut image = body((h.length() + CHECKSUM_SIZE) as usize);
    image[..MODULE_HEADER_SIZE].copy_from_slice(&h.to_bytes());
    finish_image(image)
}

/// Image whose header follows a vector table.
pub fn build_image_with_vector_table(h: &ModuleHeader) -> Vec<u8> {
    let mut image = body((h.length() + CHECKSUM_SIZE) as usize);
    image[..4].copy_from_slice(&0x2002_0000u32.to_le_bytes());
    let at = VECTOR_TABLE_SIZE as usize;
    image[at..at + MODULE_HEADER_SIZE].copy_from_slice(&h.to_bytes());
    finish_image(image)
}

/// Co-processor accessor that reports a fixed firmware version.
pub struct FakeNcp {
    pub version: u16,
    pub updatable: bool,
    pub fail_query: bool,
    pub updates: Vec<(ModuleIdentity, u32)>,
}

impl FakeNcp {
    pub fn new(version: u16) -> Self {
        Self {
            version,
            updatable: true,
            fail_query: false,
            updates: Vec::new(),
        }
    }
}

impl PlatformAccessor for FakeNcp {
    fn fetch_module_info(
        &mut self,
        identity: &ModuleIdentity,
    ) -> Result<ModuleHeader, PlatformError> {
        if self.fail_query || identity.function != ModuleFunction::NcpFirmware {
            return Err(PlatformError::QueryFailed);
        }
        let mut h = header(ModuleFunction::NcpFirmware, 0, 0, 0x10_0000);
        h.mcu = McuTarget::NCP;
        h.version = self.version;
        Ok(h)
    }

    fn is_updatable(&self, mcu: McuTarget) -> bool {
        self.updatable && mcu == McuTarget::NCP
    }

    fn update_module(
        &mut self,
        mal: &mut MediaAccessDispatcher<'_>,
        module: &LocatedModule,
    ) -> Result<(), PlatformError> {
        let crc = mal
            .crc32(module.address(), module.header.length())
            .map_err(|_| PlatformError::UpdateFailed)?;
        self.updates.push((module.header.identity(), crc));
        self.version = module.header.version;
        Ok(())
    }
}

