// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Module validation.
//!
//! Every check is run and recorded; only a missing destination slot stops
//! validation outright. Each check ends up as one of:
//! - `None`: not attempted
//! - `Some(false)`: attempted and failed
//! - `Some(true)`: attempted and passed
//!
//! The [`ValidationFlags`] bitmasks are the storage/wire form of the same
//! information.

use bitflags::bitflags;
use thiserror::Error;

use crate::fmt::{debug, info};
use crate::layout::{ModuleBounds, ModuleStore, Platform};
use crate::locator::{LocateError, LocatedModule, ModuleLocator, PlatformAccessor};
use crate::mal::{MalError, MediaAccessDispatcher};
use crate::module_info::{
    ChecksumSuffix, Dependency, McuTarget, ModuleFunction, ModuleHeader, ModuleIdentity,
    ModuleSuffix, CHECKSUM_SIZE, MODULE_SUFFIX_SIZE,
};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ValidationFlags: u16 {
        const RANGE = 1 << 1;
        const PLATFORM = 1 << 2;
        const DEPENDENCIES = 1 << 3;
        const INTEGRITY = 1 << 4;
        const DEPENDENCIES_FULL = 1 << 5;
    }
}

/// Outcome of each check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ValidationChecks {
    pub range: Option<bool>,
    pub platform: Option<bool>,
    pub dependencies: Option<bool>,
    pub integrity: Option<bool>,
    pub dependencies_full: Option<bool>,
}

impl ValidationChecks {
    fn entries(&self) -> [(ValidationFlags, Option<bool>); 5] {
        [
            (ValidationFlags::RANGE, self.range),
            (ValidationFlags::PLATFORM, self.platform),
            (ValidationFlags::DEPENDENCIES, self.dependencies),
            (ValidationFlags::INTEGRITY, self.integrity),
            (ValidationFlags::DEPENDENCIES_FULL, self.dependencies_full),
        ]
    }

    fn collect(&self, keep: impl Fn(Option<bool>) -> bool) -> ValidationFlags {
        self.entries()
            .into_iter()
            .filter(|(_, outcome)| keep(*outcome))
            .fold(ValidationFlags::empty(), |acc, (flag, _)| acc | flag)
    }

    pub fn attempted(&self) -> ValidationFlags {
        self.collect(|o| o.is_some())
    }

    pub fn passed(&self) -> ValidationFlags {
        self.collect(|o| o == Some(true))
    }

    pub fn failed(&self) -> ValidationFlags {
        self.collect(|o| o == Some(false))
    }

    /// Rebuild from the bitmask pair.
    pub fn from_flags(attempted: ValidationFlags, passed: ValidationFlags) -> Self {
        let outcome = |flag| attempted.contains(flag).then(|| passed.contains(flag));
        Self {
            range: outcome(ValidationFlags::RANGE),
            platform: outcome(ValidationFlags::PLATFORM),
            dependencies: outcome(ValidationFlags::DEPENDENCIES),
            integrity: outcome(ValidationFlags::INTEGRITY),
            dependencies_full: outcome(ValidationFlags::DEPENDENCIES_FULL),
        }
    }
}

/// What the caller wants checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Recompute and compare the CRC.
    pub integrity: bool,
    /// A missing dependency leaves the check unset instead of failing it.
    pub dependencies_optional: bool,
    /// Also check installed modules that depend on this one.
    pub full_dependencies: bool,
}

impl ValidationOptions {
    pub const DEFAULT: ValidationOptions = ValidationOptions {
        integrity: true,
        dependencies_optional: false,
        full_dependencies: false,
    };
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Result of validating one located module. Never mutated; re-validate instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedModule {
    /// Slot the module is meant to run from.
    pub destination: ModuleBounds,
    pub module: LocatedModule,
    pub checksum: Option<ChecksumSuffix>,
    pub checks: ValidationChecks,
}

impl ValidatedModule {
    pub fn header(&self) -> &ModuleHeader {
        &self.module.header
    }

    pub fn checks_attempted(&self) -> ValidationFlags {
        self.checks.attempted()
    }

    pub fn checks_passed(&self) -> ValidationFlags {
        self.checks.passed()
    }

    /// Range and platform passed, and dependencies passed or were waived.
    pub fn is_safe_to_boot(&self) -> bool {
        self.checks.range == Some(true)
            && self.checks.platform == Some(true)
            && self.checks.dependencies != Some(false)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValidateError {
    #[error("no module slot for {0:?}")]
    NoMatchingBounds(ModuleIdentity),
    #[error(transparent)]
    Locate(#[from] LocateError),
}

pub struct ModuleValidator<'a> {
    locator: ModuleLocator<'a>,
}

impl<'a> ModuleValidator<'a> {
    pub fn new(platform: &'a Platform, accessor: &'a mut dyn PlatformAccessor) -> Self {
        Self {
            locator: ModuleLocator::new(platform, accessor),
        }
    }

    pub fn locator(&mut self) -> &mut ModuleLocator<'a> {
        &mut self.locator
    }

    /// Locate the module in `bounds` and validate it.
    pub fn fetch(
        &mut self,
        mal: &mut MediaAccessDispatcher<'_>,
        bounds: &ModuleBounds,
        options: ValidationOptions,
    ) -> Result<ValidatedModule, ValidateError> {
        let module = self.locator.locate(mal, bounds)?;
        self.validate(mal, module, options)
    }

    /// Run every check on a located module.
    pub fn validate(
        &mut self,
        mal: &mut MediaAccessDispatcher<'_>,
        module: LocatedModule,
        options: ValidationOptions,
    ) -> Result<ValidatedModule, ValidateError> {
        let platform = self.locator.platform();
        let identity = module.header.identity();
        let destination = *platform
            .find_bounds(&identity)
            .ok_or(ValidateError::NoMatchingBounds(identity))?;

        let mut checks = ValidationChecks {
            range: Some(destination.contains(module.header.end_address)),
            ..ValidationChecks::default()
        };
        let mut checksum = None;

        if checks.range == Some(true) {
            checks.platform = Some(module.header.platform_id == platform.platform_id);
            checks.dependencies = self.check_dependencies(mal, &module.header, options);
            if options.full_dependencies {
                checks.dependencies_full =
                    Some(self.check_dependents(mal, &module.header, &destination));
            }
            if options.integrity && module.is_locally_readable() {
                checksum = read_checksum(mal, &module).ok();
                let computed = mal.crc32(module.address(), module.header.length()).ok();
                checks.integrity = Some(match (computed, checksum) {
                    (Some(crc), Some(stored)) => crc == stored.crc32,
                    _ => false,
                });
            }
        }

        debug!(
            "validate: {:?} v{} attempted=0x{:02x} passed=0x{:02x}",
            identity,
            module.header.version,
            checks.attempted().bits(),
            checks.passed().bits()
        );

        Ok(ValidatedModule {
            destination,
            module,
            checksum,
            checks,
        })
    }

    /// Validate every compiled-in slot, reporting each through `report`.
    pub fn survey(
        &mut self,
        mal: &mut MediaAccessDispatcher<'_>,
        options: ValidationOptions,
        mut report: impl FnMut(&ModuleBounds, Result<ValidatedModule, ValidateError>),
    ) {
        let platform = self.locator.platform();
        for bounds in platform.modules {
            let result = self.fetch(mal, bounds, options);
            report(bounds, result);
        }
        info!("survey: {} slots checked", platform.modules.len());
    }

    fn check_dependencies(
        &mut self,
        mal: &mut MediaAccessDispatcher<'_>,
        header: &ModuleHeader,
        options: ValidationOptions,
    ) -> Option<bool> {
        let mut absent = false;
        for dependency in &header.dependencies {
            match self.installed_version(mal, dependency) {
                Some(version) if version >= dependency.min_version => {}
                Some(version) => {
                    debug!(
                        "validate: dependency {:?}/{} needs v{}, found v{}",
                        dependency.function,
                        dependency.index,
                        dependency.min_version,
                        version
                    );
                    return Some(false);
                }
                None => absent = true,
            }
        }
        match (absent, options.dependencies_optional) {
            (false, _) => Some(true),
            (true, true) => None,
            (true, false) => Some(false),
        }
    }

    /// Whether replacing the system part in `destination` keeps every
    /// installed system part that depends on it satisfied. Other modules pass.
    fn check_dependents(
        &mut self,
        mal: &mut MediaAccessDispatcher<'_>,
        header: &ModuleHeader,
        destination: &ModuleBounds,
    ) -> bool {
        if header.function != ModuleFunction::SystemPart {
            return true;
        }
        let platform = self.locator.platform();
        for bounds in platform.modules {
            if bounds.location != ModuleStore::Main
                || bounds.identity.function != ModuleFunction::SystemPart
                || bounds == destination
            {
                continue;
            }
            let Ok(installed) = self.locator.locate(mal, bounds) else {
                continue;
            };
            if let Some(dep) = installed.header.depends_on(header.function, header.index) {
                if header.version < dep.min_version {
                    debug!(
                        "validate: installed {:?} needs v{} of the replaced module",
                        installed.header.identity(),
                        dep.min_version
                    );
                    return false;
                }
            }
        }
        true
    }

    fn installed_version(
        &mut self,
        mal: &mut MediaAccessDispatcher<'_>,
        dependency: &Dependency,
    ) -> Option<u16> {
        let identity = ModuleIdentity::new(dependency.function, dependency.index, McuTarget::ANY);
        let bounds = self
            .locator
            .platform()
            .find_bounds_in(&identity, ModuleStore::Main)?;
        let found = self.locator.locate(mal, bounds).ok()?;
        (found.header.function == dependency.function && found.header.index == dependency.index)
            .then_some(found.header.version)
    }
}

fn read_checksum(
    mal: &mut MediaAccessDispatcher<'_>,
    module: &LocatedModule,
) -> Result<ChecksumSuffix, MalError> {
    let crc_address = module.checksum_address();
    let mut crc = [0u8; CHECKSUM_SIZE as usize];
    mal.read_into(crc_address, &mut crc)?;
    let mut suffix = [0u8; MODULE_SUFFIX_SIZE];
    mal.read_into(crc_address - MODULE_SUFFIX_SIZE as u32, &mut suffix)?;
    Ok(ChecksumSuffix {
        crc32: u32::from_be_bytes(crc),
        suffix: ModuleSuffix::parse(&suffix),
    })
}
