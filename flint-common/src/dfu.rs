// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! DFU (and ST DfuSe) request helpers for a bootloader-resident responder.
//!
//! The USB framing is handled elsewhere; this module covers the parts of the
//! protocol that touch the MAL: GetStatus timing, DfuSe commands and block
//! addressing.

use thiserror::Error;

use crate::mal::{MalError, MediaAccessDispatcher};

/// Length of a DFU_GETSTATUS reply.
pub const DFU_STATUS_SIZE: usize = 6;

/// Largest value the 24-bit poll timeout field can carry.
pub const MAX_POLL_TIMEOUT_MS: u32 = 0x00FF_FFFF;

/// Transfer size advertised in the DFU functional descriptor.
pub const DFU_TRANSFER_SIZE: u32 = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DfuStatusCode {
    Ok = 0x00,
    ErrTarget = 0x01,
    ErrFile = 0x02,
    ErrWrite = 0x03,
    ErrErase = 0x04,
    ErrCheckErased = 0x05,
    ErrProg = 0x06,
    ErrVerify = 0x07,
    ErrAddress = 0x08,
    ErrNotDone = 0x09,
    ErrFirmware = 0x0A,
    ErrVendor = 0x0B,
    ErrUsbr = 0x0C,
    ErrPor = 0x0D,
    ErrUnknown = 0x0E,
    ErrStalledPkt = 0x0F,
}

impl From<MalError> for DfuStatusCode {
    fn from(e: MalError) -> Self {
        match e {
            MalError::UnknownMedium(_) | MalError::Protected(_) | MalError::OutOfRange { .. } => {
                DfuStatusCode::ErrAddress
            }
            MalError::DeviceUnavailable(_) => DfuStatusCode::ErrTarget,
            MalError::LengthExceeded(_) => DfuStatusCode::ErrStalledPkt,
            MalError::EraseFailed(_) => DfuStatusCode::ErrErase,
            MalError::WriteFailed(_) => DfuStatusCode::ErrWrite,
            MalError::VerifyFailed(_) => DfuStatusCode::ErrVerify,
            MalError::ReadFailed(_) => DfuStatusCode::ErrUnknown,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DfuState {
    AppIdle = 0,
    AppDetach = 1,
    DfuIdle = 2,
    DnloadSync = 3,
    DnBusy = 4,
    DnloadIdle = 5,
    ManifestSync = 6,
    Manifest = 7,
    ManifestWaitReset = 8,
    UploadIdle = 9,
    Error = 10,
}

/// Kind of operation a GetStatus poll is waiting on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuOperation {
    Erase,
    Program,
}

/// DFU_GETSTATUS reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DfuStatus {
    pub status: DfuStatusCode,
    pub poll_timeout_ms: u32,
    pub state: DfuState,
    pub string_index: u8,
}

impl DfuStatus {
    /// Status reported while `op` at `address` is in progress.
    pub fn busy(mal: &MediaAccessDispatcher<'_>, address: u32, op: DfuOperation) -> Self {
        Self {
            status: DfuStatusCode::Ok,
            poll_timeout_ms: poll_timeout_ms(mal, address, op),
            state: DfuState::DnBusy,
            string_index: 0,
        }
    }

    pub fn error(status: DfuStatusCode) -> Self {
        Self {
            status,
            poll_timeout_ms: 0,
            state: DfuState::Error,
            string_index: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; DFU_STATUS_SIZE] {
        let timeout = poll_timeout_bytes(self.poll_timeout_ms);
        [
            self.status as u8,
            timeout[0],
            timeout[1],
            timeout[2],
            self.state as u8,
            self.string_index,
        ]
    }
}

/// Encode milliseconds as the 3-byte little-endian bwPollTimeout field.
pub fn poll_timeout_bytes(ms: u32) -> [u8; 3] {
    let b = ms.min(MAX_POLL_TIMEOUT_MS).to_le_bytes();
    [b[0], b[1], b[2]]
}

fn poll_timeout_ms(mal: &MediaAccessDispatcher<'_>, address: u32, op: DfuOperation) -> u32 {
    let duration = mal.polling_time(address, op == DfuOperation::Erase);
    u32::try_from(duration.as_millis()).unwrap_or(MAX_POLL_TIMEOUT_MS)
}

/// bwPollTimeout bytes for `op` at `address`.
pub fn get_status(mal: &MediaAccessDispatcher<'_>, address: u32, op: DfuOperation) -> [u8; 3] {
    poll_timeout_bytes(poll_timeout_ms(mal, address, op))
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuError {
    #[error("empty DfuSe command")]
    Empty,
    #[error("unknown DfuSe command 0x{0:02x}")]
    UnknownCommand(u8),
    #[error("DfuSe command 0x{0:02x} has a malformed payload")]
    BadLength(u8),
}

/// Commands sent in block 0 of a DfuSe download.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuseCommand {
    GetCommands,
    SetAddressPointer(u32),
    /// Erase the sector at the address, or the whole device when absent.
    Erase(Option<u32>),
    ReadUnprotect,
}

impl DfuseCommand {
    pub const GET_COMMANDS: u8 = 0x00;
    pub const SET_ADDRESS_POINTER: u8 = 0x21;
    pub const ERASE: u8 = 0x41;
    pub const READ_UNPROTECT: u8 = 0x92;

    pub fn parse(payload: &[u8]) -> Result<Self, DfuError> {
        let (&code, rest) = payload.split_first().ok_or(DfuError::Empty)?;
        let address = || -> Result<u32, DfuError> {
            let bytes: [u8; 4] = rest.try_into().map_err(|_| DfuError::BadLength(code))?;
            Ok(u32::from_le_bytes(bytes))
        };
        match code {
            Self::GET_COMMANDS if rest.is_empty() => Ok(DfuseCommand::GetCommands),
            Self::SET_ADDRESS_POINTER => Ok(DfuseCommand::SetAddressPointer(address()?)),
            Self::ERASE if rest.is_empty() => Ok(DfuseCommand::Erase(None)),
            Self::ERASE => Ok(DfuseCommand::Erase(Some(address()?))),
            Self::READ_UNPROTECT if rest.is_empty() => Ok(DfuseCommand::ReadUnprotect),
            Self::GET_COMMANDS | Self::READ_UNPROTECT => Err(DfuError::BadLength(code)),
            other => Err(DfuError::UnknownCommand(other)),
        }
    }

    /// Run a memory command against the MAL, updating the address pointer.
    pub fn execute(
        &self,
        mal: &mut MediaAccessDispatcher<'_>,
        pointer: &mut u32,
    ) -> Result<(), DfuStatusCode> {
        match *self {
            DfuseCommand::SetAddressPointer(address) => {
                mal.resolve(address)?;
                *pointer = address;
                Ok(())
            }
            DfuseCommand::Erase(Some(address)) => {
                mal.erase(address)?;
                Ok(())
            }
            DfuseCommand::Erase(None) | DfuseCommand::ReadUnprotect => {
                Err(DfuStatusCode::ErrTarget)
            }
            DfuseCommand::GetCommands => Ok(()),
        }
    }
}

/// Flash address of download/upload block `block` (blocks 0 and 1 are
/// reserved for commands).
pub fn block_address(block: u16, transfer_size: u32, pointer: u32) -> Option<u32> {
    let index = block.checked_sub(2)? as u32;
    index
        .checked_mul(transfer_size)
        .and_then(|offset| pointer.checked_add(offset))
}
