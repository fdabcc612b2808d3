// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use indicatif::{ProgressBar, ProgressStyle};

use flint_common::dfu::{get_status, DfuOperation, DFU_TRANSFER_SIZE};
use flint_common::layout::Platform;
use flint_common::locator::{ModuleLocator, NoCoprocessor};
use flint_common::mal::MediaAccessDispatcher;
use flint_common::module_info::{
    ModuleHeader, ModuleInfoFlags, ModuleSuffix, CHECKSUM_SIZE, MODULE_SUFFIX_SIZE,
};
use flint_common::update::UpdateSession;
use flint_common::validator::{ModuleValidator, ValidatedModule, ValidationOptions};

use crate::sim::{image_header, SimDevice};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn read_image(file: &Path) -> Result<Vec<u8>> {
    fs::read(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn outcome(check: Option<bool>) -> &'static str {
    match check {
        Some(true) => "pass",
        Some(false) => "FAIL",
        None => "-",
    }
}

fn flag_names(flags: ModuleInfoFlags) -> String {
    if flags.is_empty() {
        return "none".into();
    }
    flags
        .iter_names()
        .map(|(name, _)| name)
        .collect::<Vec<_>>()
        .join(" | ")
}

fn print_header(header: &ModuleHeader) {
    println!("  Module:      {:?} #{}", header.function, header.index);
    println!("  Version:     {}", header.version);
    println!("  Platform:    {}", header.platform_id);
    println!("  MCU:         {}", header.mcu.0);
    println!(
        "  Address:     0x{:08x}..0x{:08x} ({} bytes)",
        header.start_address,
        header.end_address,
        header.length()
    );
    println!("  Flags:       {}", flag_names(header.flags));
    if header.dependencies.is_empty() {
        println!("  Depends on:  nothing");
    }
    for dep in &header.dependencies {
        println!(
            "  Depends on:  {:?} #{} >= v{}",
            dep.function, dep.index, dep.min_version
        );
    }
}

fn print_checks(validated: &ValidatedModule) {
    let checks = &validated.checks;
    println!(
        "  Destination: 0x{:08x}..0x{:08x} ({:?})",
        validated.destination.start_address,
        validated.destination.end_address,
        validated.destination.location
    );
    println!("  Range:             {}", outcome(checks.range));
    println!("  Platform:          {}", outcome(checks.platform));
    println!("  Dependencies:      {}", outcome(checks.dependencies));
    println!("  Integrity:         {}", outcome(checks.integrity));
    println!("  Dependents (full): {}", outcome(checks.dependencies_full));
}

/// Prepare a simulated device with the pre-installed modules.
fn device(platform: &Platform, installs: &[PathBuf]) -> Result<SimDevice> {
    let mut sim = SimDevice::new(*platform);
    for file in installs {
        let header = sim.install(&read_image(file)?)?;
        println!(
            "Installed:   {} -> {:?} v{}",
            file.display(),
            header.identity(),
            header.version
        );
    }
    Ok(sim)
}

/// Print the compiled-in layout.
pub fn layout(platform: &Platform) -> Result<()> {
    let mal = MediaAccessDispatcher::new(platform);

    println!("Platform ID: {}", platform.platform_id);
    println!();
    println!("Media:");
    for region in platform.regions {
        let erase = get_status(&mal, region.base_address, DfuOperation::Erase);
        let program = get_status(&mal, region.base_address, DfuOperation::Program);
        println!(
            "  0x{:08x}  {:>8} bytes  {:?} (poll: erase {} ms, program {} ms)",
            region.base_address,
            region.size(),
            region.kind,
            u32::from_le_bytes([erase[0], erase[1], erase[2], 0]),
            u32::from_le_bytes([program[0], program[1], program[2], 0])
        );
    }

    println!();
    println!("Protected:");
    for range in platform.protected {
        println!("  0x{:08x}..0x{:08x}", range.start, range.end);
    }

    println!();
    println!("Module slots:");
    for bounds in platform.modules.iter().chain([&platform.staging]) {
        println!(
            "  0x{:08x}..0x{:08x}  {:<12} {:?} #{} (mcu {})",
            bounds.start_address,
            bounds.end_address,
            format!("{:?}", bounds.location),
            bounds.identity.function,
            bounds.identity.index,
            bounds.identity.mcu.0
        );
    }

    Ok(())
}

/// Decode an image file and check its CRC.
pub fn inspect(file: &Path) -> Result<()> {
    let image = read_image(file)?;
    let (header, offset) = image_header(&image)?;

    println!("Image: {} ({} bytes)", file.display(), image.len());
    if offset != 0 {
        println!("  Header at:   0x{:x} (after vector table)", offset);
    }
    print_header(&header);

    let length = header.length() as usize;
    let Some(stored) = image.get(length..length + CHECKSUM_SIZE as usize) else {
        bail!(
            "image is {} bytes but its header describes {} plus a {}-byte CRC",
            image.len(),
            length,
            CHECKSUM_SIZE
        );
    };
    let stored = u32::from_be_bytes(stored.try_into()?);
    let computed = CRC32.checksum(&image[..length]);

    let suffix_start = length
        .checked_sub(MODULE_SUFFIX_SIZE)
        .context("module is too short to carry a suffix")?;
    let suffix: &[u8; MODULE_SUFFIX_SIZE] = image[suffix_start..length].try_into()?;
    let suffix = ModuleSuffix::parse(suffix);
    println!("  Suffix size: {}", suffix.size);
    println!(
        "  SHA-256:     {}",
        suffix
            .sha256
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
    );
    println!("  CRC32:       stored 0x{:08x}, computed 0x{:08x}", stored, computed);

    if stored != computed {
        bail!("CRC mismatch");
    }
    println!();
    println!("Image is intact.");
    Ok(())
}

/// Stage an image on a simulated device and validate every module in it.
pub fn validate(
    platform: &Platform,
    file: &Path,
    installs: &[PathBuf],
    options: ValidationOptions,
) -> Result<()> {
    let image = read_image(file)?;
    let mut sim = device(platform, installs)?;
    sim.write(platform.staging.start_address, &image)?;
    println!("Staged:      {} ({} bytes)", file.display(), image.len());

    let results = sim.with_mal(|mal| -> Result<Vec<ValidatedModule>> {
        let modules = ModuleLocator::new(platform, &mut NoCoprocessor)
            .locate_all(mal, &platform.staging)
            .context("no module found in the staged image")?;
        let mut accessor = NoCoprocessor;
        let mut validator = ModuleValidator::new(platform, &mut accessor);
        let mut results = Vec::new();
        for module in modules {
            results.push(validator.validate(mal, module, options)?);
        }
        Ok(results)
    })?;

    let mut rejected = 0;
    for validated in &results {
        println!();
        print_header(validated.header());
        print_checks(validated);
        let safe = validated.is_safe_to_boot() && validated.checks.failed().is_empty();
        if !safe {
            rejected += 1;
        }
        println!("  Verdict:     {}", if safe { "OK" } else { "REJECTED" });
    }

    if rejected > 0 {
        bail!("{} of {} module(s) rejected", rejected, results.len());
    }
    Ok(())
}

/// Run an update session on a simulated device.
pub fn apply(
    platform: &Platform,
    file: &Path,
    installs: &[PathBuf],
    deps_optional: bool,
    output: Option<&Path>,
) -> Result<()> {
    let image = read_image(file)?;
    let (header, _) = image_header(&image)?;
    let mut sim = device(platform, installs)?;
    println!("Image:       {} ({} bytes)", file.display(), image.len());
    println!();

    sim.with_mal(|mal| -> Result<()> {
        let mut session = UpdateSession::new(platform);
        session.begin(mal, image.len() as u32)?;

        let pb = ProgressBar::new(image.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                )?
                .progress_chars("#>-"),
        );

        let mut offset = 0u32;
        for chunk in image.chunks(DFU_TRANSFER_SIZE as usize) {
            if let Err(e) = session.write(mal, offset, chunk) {
                pb.abandon();
                bail!("write failed at offset {}: {}", offset, e);
            }
            offset += chunk.len() as u32;
            pb.set_position(offset as u64);
        }
        pb.finish_with_message("Transfer complete");

        let outcome = session
            .finish(mal, &mut NoCoprocessor, deps_optional)
            .context("update rejected")?;
        println!("Result:      {:?}", outcome);
        Ok(())
    })?;

    if let Some(output) = output {
        let slot = platform
            .find_bounds(&header.identity())
            .context("no slot for this module")?;
        if header.flags.contains(ModuleInfoFlags::COMBINED) {
            println!("Combined image: writing the slot of the first module only.");
        }
        let bytes = sim.read(slot.start_address, slot.size() as usize)?;
        fs::write(output, &bytes)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!("Slot 0x{:08x} written to {}", slot.start_address, output.display());
    }

    Ok(())
}
