// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware update engine for modular devices.
//!
//! Write-then-trust pipeline for candidate firmware modules:
//! media access ([`mal`]) -> discovery ([`locator`]) -> checks ([`validator`])
//! -> installation ([`applier`]).
//!
//! This crate supports both `no_std` (embedded) and `std` (host) environments:
//! - Default: `no_std`, no logging backend
//! - `std` feature: host builds, logs through the `log` facade
//! - `defmt` feature: logs through `defmt` on the device

#![cfg_attr(not(feature = "std"), no_std)]

pub(crate) mod fmt;

pub mod applier;
pub mod dfu;
pub mod flash;
pub mod layout;
pub mod locator;
pub mod mal;
pub mod mem_flash;
pub mod module_info;
pub mod update;
pub mod validator;

// Re-export commonly used types
pub use applier::{ApplyError, ApplyOutcome, ModuleUpdateApplier};
pub use flash::{FlashDevice, FlashError, MediumKind};
pub use layout::{ModuleBounds, ModuleStore, Platform};
pub use locator::{LocateError, LocatedModule, ModuleLocator, NoCoprocessor, PlatformAccessor};
pub use mal::{MalError, MediaAccessDispatcher};
pub use mem_flash::MemFlash;
pub use module_info::{Dependency, McuTarget, ModuleFunction, ModuleHeader, ModuleIdentity};
pub use update::{UpdateError, UpdateSession};
pub use validator::{
    ModuleValidator, ValidateError, ValidatedModule, ValidationChecks, ValidationFlags,
    ValidationOptions,
};
