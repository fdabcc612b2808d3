// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Simulated device: erased internal and serial flash held in memory.

use anyhow::{bail, Context, Result};

use flint_common::flash::MediumKind;
use flint_common::layout::{
    Platform, INTERNAL_FLASH_SECTOR_SIZE, INTERNAL_FLASH_SIZE, SERIAL_FLASH_SECTOR_SIZE,
    SERIAL_FLASH_SIZE,
};
use flint_common::mal::MediaAccessDispatcher;
use flint_common::mem_flash::MemFlash;
use flint_common::module_info::{header_offset, ModuleHeader, MODULE_HEADER_SIZE};

/// Decode the header of a module image file.
///
/// Returns the header and its offset inside the image.
pub fn image_header(image: &[u8]) -> Result<(ModuleHeader, u32)> {
    let first_word: [u8; 4] = image
        .get(..4)
        .context("image is shorter than one word")?
        .try_into()?;
    let offset = header_offset(u32::from_le_bytes(first_word));
    let at = offset as usize;
    let raw: &[u8; MODULE_HEADER_SIZE] = image
        .get(at..at + MODULE_HEADER_SIZE)
        .with_context(|| format!("image too short for a header at offset 0x{:x}", offset))?
        .try_into()?;
    let header = ModuleHeader::parse(raw).context("invalid module header")?;
    Ok((header, offset))
}

pub struct SimDevice {
    platform: Platform,
    internal: Vec<u8>,
    serial: Vec<u8>,
}

impl SimDevice {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            internal: vec![0xFF; INTERNAL_FLASH_SIZE as usize],
            serial: vec![0xFF; SERIAL_FLASH_SIZE as usize],
        }
    }

    fn storage(&mut self, address: u32, length: usize) -> Result<&mut [u8]> {
        let Some(region) = self.platform.region_for(address) else {
            bail!("0x{:08x} is not on any simulated medium", address);
        };
        let offset = region.offset_of(address) as usize;
        let storage = match region.kind {
            MediumKind::InternalFlash => &mut self.internal,
            MediumKind::SerialFlash => &mut self.serial,
        };
        storage
            .get_mut(offset..offset + length)
            .with_context(|| format!("0x{:08x}+{} runs past its medium", address, length))
    }

    /// Place `bytes` at `address` directly, as a factory programmer would.
    pub fn write(&mut self, address: u32, bytes: &[u8]) -> Result<()> {
        self.storage(address, bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    pub fn read(&mut self, address: u32, length: usize) -> Result<Vec<u8>> {
        Ok(self.storage(address, length)?.to_vec())
    }

    /// Install an image in the slot its header names.
    pub fn install(&mut self, image: &[u8]) -> Result<ModuleHeader> {
        let (header, _) = image_header(image)?;
        self.write(header.start_address, image)
            .with_context(|| format!("cannot install {:?}", header.identity()))?;
        Ok(header)
    }

    /// Run `f` with a MAL over the simulated media.
    pub fn with_mal<R>(&mut self, f: impl FnOnce(&mut MediaAccessDispatcher<'_>) -> R) -> R {
        let mut internal = MemFlash::new(
            MediumKind::InternalFlash,
            &mut self.internal,
            INTERNAL_FLASH_SECTOR_SIZE,
        );
        let mut serial = MemFlash::new(
            MediumKind::SerialFlash,
            &mut self.serial,
            SERIAL_FLASH_SECTOR_SIZE,
        );
        let mut mal = MediaAccessDispatcher::new(&self.platform);
        mal.attach(&mut internal);
        mal.attach(&mut serial);
        f(&mut mal)
    }
}
