// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

mod common;

use common::{dispatcher, Rig, PLATFORM};
use flint_common::dfu::{
    block_address, get_status, poll_timeout_bytes, DfuError, DfuOperation, DfuState, DfuStatus,
    DfuStatusCode, DfuseCommand, DFU_TRANSFER_SIZE, MAX_POLL_TIMEOUT_MS,
};
use flint_common::flash::MediumKind;
use flint_common::mal::{MalError, MediaAccessDispatcher};

const INTERNAL: u32 = 0x0802_0000;
const SERIAL: u32 = 0x8004_0000;
const UNMAPPED: u32 = 0x4000_0000;

// --- Poll timeout encoding ---

#[test]
fn test_poll_timeout_little_endian() {
    assert_eq!(poll_timeout_bytes(0), [0, 0, 0]);
    assert_eq!(poll_timeout_bytes(50), [50, 0, 0]);
    assert_eq!(poll_timeout_bytes(0x0001_0203), [0x03, 0x02, 0x01]);
    assert_eq!(poll_timeout_bytes(MAX_POLL_TIMEOUT_MS), [0xFF, 0xFF, 0xFF]);
}

#[test]
fn test_poll_timeout_saturates() {
    assert_eq!(poll_timeout_bytes(0x0100_0000), [0xFF, 0xFF, 0xFF]);
    assert_eq!(poll_timeout_bytes(u32::MAX), [0xFF, 0xFF, 0xFF]);
}

#[test]
fn test_get_status_per_medium() {
    let mal = MediaAccessDispatcher::new(&PLATFORM);
    assert_eq!(get_status(&mal, INTERNAL, DfuOperation::Erase), [50, 0, 0]);
    assert_eq!(get_status(&mal, INTERNAL, DfuOperation::Program), [50, 0, 0]);
    assert_eq!(get_status(&mal, SERIAL, DfuOperation::Erase), [100, 0, 0]);
    assert_eq!(get_status(&mal, SERIAL, DfuOperation::Program), [10, 0, 0]);
}

#[test]
fn test_get_status_unknown_address_uses_fallback() {
    let mal = MediaAccessDispatcher::new(&PLATFORM);
    assert_eq!(get_status(&mal, UNMAPPED, DfuOperation::Erase), [100, 0, 0]);
    assert_eq!(get_status(&mal, UNMAPPED, DfuOperation::Program), [50, 0, 0]);
}

// --- GetStatus reply ---

#[test]
fn test_busy_status_bytes() {
    let mal = MediaAccessDispatcher::new(&PLATFORM);
    let status = DfuStatus::busy(&mal, SERIAL, DfuOperation::Erase);
    assert_eq!(status.state, DfuState::DnBusy);
    assert_eq!(status.to_bytes(), [0x00, 100, 0, 0, 4, 0]);
}

#[test]
fn test_error_status_bytes() {
    let status = DfuStatus::error(DfuStatusCode::ErrVerify);
    assert_eq!(status.to_bytes(), [0x07, 0, 0, 0, 10, 0]);
}

#[test]
fn test_mal_errors_map_to_status_codes() {
    let cases = [
        (MalError::UnknownMedium(0), DfuStatusCode::ErrAddress),
        (MalError::Protected(0), DfuStatusCode::ErrAddress),
        (
            MalError::OutOfRange {
                address: 0,
                length: 1,
            },
            DfuStatusCode::ErrAddress,
        ),
        (
            MalError::DeviceUnavailable(MediumKind::SerialFlash),
            DfuStatusCode::ErrTarget,
        ),
        (MalError::LengthExceeded(5000), DfuStatusCode::ErrStalledPkt),
        (MalError::EraseFailed(0), DfuStatusCode::ErrErase),
        (MalError::WriteFailed(0), DfuStatusCode::ErrWrite),
        (MalError::VerifyFailed(0), DfuStatusCode::ErrVerify),
        (MalError::ReadFailed(0), DfuStatusCode::ErrUnknown),
    ];
    for (error, code) in cases {
        assert_eq!(DfuStatusCode::from(error), code, "{:?}", error);
    }
}

// --- DfuSe commands ---

#[test]
fn test_parse_dfuse_commands() {
    assert_eq!(DfuseCommand::parse(&[0x00]), Ok(DfuseCommand::GetCommands));
    assert_eq!(
        DfuseCommand::parse(&[0x21, 0x00, 0x00, 0x04, 0x80]),
        Ok(DfuseCommand::SetAddressPointer(0x8004_0000))
    );
    assert_eq!(
        DfuseCommand::parse(&[0x41, 0x00, 0x00, 0x02, 0x08]),
        Ok(DfuseCommand::Erase(Some(0x0802_0000)))
    );
    assert_eq!(DfuseCommand::parse(&[0x41]), Ok(DfuseCommand::Erase(None)));
    assert_eq!(DfuseCommand::parse(&[0x92]), Ok(DfuseCommand::ReadUnprotect));
}

#[test]
fn test_parse_rejects_malformed_commands() {
    assert_eq!(DfuseCommand::parse(&[]), Err(DfuError::Empty));
    assert_eq!(
        DfuseCommand::parse(&[0x21, 0x00, 0x00]),
        Err(DfuError::BadLength(0x21))
    );
    assert_eq!(
        DfuseCommand::parse(&[0x41, 1, 2, 3, 4, 5]),
        Err(DfuError::BadLength(0x41))
    );
    assert_eq!(
        DfuseCommand::parse(&[0x00, 0x01]),
        Err(DfuError::BadLength(0x00))
    );
    assert_eq!(
        DfuseCommand::parse(&[0x55]),
        Err(DfuError::UnknownCommand(0x55))
    );
}

#[test]
fn test_execute_set_address_pointer() {
    let mut rig = Rig::new();
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut pointer = 0;

    DfuseCommand::SetAddressPointer(SERIAL)
        .execute(&mut mal, &mut pointer)
        .unwrap();
    assert_eq!(pointer, SERIAL);

    assert_eq!(
        DfuseCommand::SetAddressPointer(UNMAPPED).execute(&mut mal, &mut pointer),
        Err(DfuStatusCode::ErrAddress)
    );
    assert_eq!(pointer, SERIAL);
}

#[test]
fn test_execute_erase() {
    let mut rig = Rig::new();
    rig.install(SERIAL, &[0u8; 16]);
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut pointer = 0;

    DfuseCommand::Erase(Some(SERIAL))
        .execute(&mut mal, &mut pointer)
        .unwrap();
    assert!(mal.read(SERIAL, 16).unwrap().iter().all(|&b| b == 0xFF));

    assert_eq!(
        DfuseCommand::Erase(Some(0x0800_0000)).execute(&mut mal, &mut pointer),
        Err(DfuStatusCode::ErrAddress)
    );
    assert_eq!(
        DfuseCommand::Erase(None).execute(&mut mal, &mut pointer),
        Err(DfuStatusCode::ErrTarget)
    );
}

// --- Block addressing ---

#[test]
fn test_block_address() {
    assert_eq!(block_address(0, DFU_TRANSFER_SIZE, SERIAL), None);
    assert_eq!(block_address(1, DFU_TRANSFER_SIZE, SERIAL), None);
    assert_eq!(block_address(2, DFU_TRANSFER_SIZE, SERIAL), Some(SERIAL));
    assert_eq!(
        block_address(5, DFU_TRANSFER_SIZE, SERIAL),
        Some(SERIAL + 3 * DFU_TRANSFER_SIZE)
    );
    assert_eq!(block_address(u16::MAX, DFU_TRANSFER_SIZE, u32::MAX - 10), None);
}
