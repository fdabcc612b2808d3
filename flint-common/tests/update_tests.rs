// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Update session: the receive/validate/apply flow as a DFU or OTA caller
//! drives it.

mod common;

use common::{
    build_image, dispatcher, system_part, user_part, with_dependency, FakeNcp, Rig, PLATFORM,
};
use flint_common::applier::ApplyOutcome;
use flint_common::layout::{OTA_STAGING, SYSTEM_PART_1, USER_PART};
use flint_common::locator::NoCoprocessor;
use flint_common::mal::{MediaAccessDispatcher, TRANSFER_BUFFER_SIZE};
use flint_common::module_info::{ModuleFunction, ModuleInfoFlags};
use flint_common::update::{SessionState, UpdateError, UpdateSession};

const STAGING: u32 = OTA_STAGING.start_address;

/// Send `image` in DFU-sized blocks.
fn send(
    session: &mut UpdateSession<'_>,
    mal: &mut MediaAccessDispatcher<'_>,
    image: &[u8],
) -> Result<(), UpdateError> {
    session.begin(mal, image.len() as u32)?;
    let mut offset = 0;
    for block in image.chunks(1024) {
        session.write(mal, offset, block)?;
        offset += block.len() as u32;
    }
    Ok(())
}

// --- Full sessions ---

#[test]
fn test_session_installs_module() {
    let image = build_image(&user_part(3));
    let mut rig = Rig::new();
    {
        let (mut internal, mut serial) = rig.devices();
        let mut mal = dispatcher(&mut internal, &mut serial);
        let mut session = UpdateSession::new(&PLATFORM);
        send(&mut session, &mut mal, &image).unwrap();
        assert_eq!(
            session.state(),
            SessionState::Receiving {
                expected_size: image.len() as u32,
                bytes_received: image.len() as u32,
            }
        );
        assert_eq!(
            session.finish(&mut mal, &mut NoCoprocessor, false),
            Ok(ApplyOutcome::AppliedPendingRestart)
        );
        assert_eq!(session.state(), SessionState::Idle);
    }
    assert_eq!(rig.bytes(STAGING, image.len()), image);
    assert_eq!(rig.bytes(USER_PART.start_address, image.len()), image);
}

#[test]
fn test_session_accepts_blocks_larger_than_transfer_buffer() {
    let image = build_image(&system_part(1, 1));
    let mut rig = Rig::new();
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut session = UpdateSession::new(&PLATFORM);

    session.begin(&mut mal, image.len() as u32).unwrap();
    let split = TRANSFER_BUFFER_SIZE * 3 + 17;
    session.write(&mut mal, 0, &image[..split]).unwrap();
    session
        .write(&mut mal, split as u32, &image[split..])
        .unwrap();
    assert_eq!(
        session.finish(&mut mal, &mut NoCoprocessor, false),
        Ok(ApplyOutcome::AppliedPendingRestart)
    );
    drop(mal);
    let offset = (SYSTEM_PART_1.start_address - 0x0800_0000) as usize;
    assert_eq!(&internal.contents()[offset..offset + image.len()], &image[..]);
}

#[test]
fn test_session_installs_combined_image() {
    let mut first = system_part(1, 2);
    first.flags = ModuleInfoFlags::COMBINED;
    let first_image = build_image(&first);
    let second_image = build_image(&user_part(4));
    let mut image = first_image.clone();
    image.extend_from_slice(&second_image);

    let mut rig = Rig::new();
    {
        let (mut internal, mut serial) = rig.devices();
        let mut mal = dispatcher(&mut internal, &mut serial);
        let mut session = UpdateSession::new(&PLATFORM);
        send(&mut session, &mut mal, &image).unwrap();

        let staged = session.validate(&mut mal, &mut NoCoprocessor, false).unwrap();
        assert_eq!(staged.len(), 2);
        session.finish(&mut mal, &mut NoCoprocessor, false).unwrap();
    }
    assert_eq!(
        rig.bytes(SYSTEM_PART_1.start_address, first_image.len()),
        first_image
    );
    assert_eq!(
        rig.bytes(USER_PART.start_address, second_image.len()),
        second_image
    );
}

#[test]
fn test_session_updates_coprocessor() {
    let mut h = common::header(ModuleFunction::NcpFirmware, 0, 0, 0x1FFC);
    h.mcu = flint_common::module_info::McuTarget::NCP;
    h.version = 12;
    let image = build_image(&h);

    let mut rig = Rig::new();
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut ncp = FakeNcp::new(11);
    let mut session = UpdateSession::new(&PLATFORM);
    send(&mut session, &mut mal, &image).unwrap();
    session.finish(&mut mal, &mut ncp, false).unwrap();
    assert_eq!(ncp.version, 12);
    assert_eq!(ncp.updates.len(), 1);
}

// --- Session state ---

#[test]
fn test_write_and_finish_require_begin() {
    let mut rig = Rig::new();
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut session = UpdateSession::new(&PLATFORM);

    assert_eq!(session.write(&mut mal, 0, &[1]), Err(UpdateError::BadState));
    assert_eq!(
        session.finish(&mut mal, &mut NoCoprocessor, false),
        Err(UpdateError::BadState)
    );
}

#[test]
fn test_begin_twice_is_bad_state() {
    let mut rig = Rig::new();
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut session = UpdateSession::new(&PLATFORM);

    session.begin(&mut mal, 128).unwrap();
    assert_eq!(session.begin(&mut mal, 128), Err(UpdateError::BadState));
}

#[test]
fn test_begin_rejects_bad_sizes() {
    let mut rig = Rig::new();
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut session = UpdateSession::new(&PLATFORM);
    let max = OTA_STAGING.size();

    assert_eq!(
        session.begin(&mut mal, 0),
        Err(UpdateError::InvalidSize { size: 0, max })
    );
    assert_eq!(
        session.begin(&mut mal, max + 1),
        Err(UpdateError::InvalidSize { size: max + 1, max })
    );
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_out_of_order_write_rejected() {
    let mut rig = Rig::new();
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut session = UpdateSession::new(&PLATFORM);

    session.begin(&mut mal, 64).unwrap();
    session.write(&mut mal, 0, &[0u8; 16]).unwrap();
    assert_eq!(
        session.write(&mut mal, 32, &[0u8; 16]),
        Err(UpdateError::OutOfOrder {
            expected: 16,
            got: 32
        })
    );
    assert_eq!(
        session.write(&mut mal, 0, &[0u8; 16]),
        Err(UpdateError::OutOfOrder {
            expected: 16,
            got: 0
        })
    );
}

#[test]
fn test_write_past_size_rejected() {
    let mut rig = Rig::new();
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut session = UpdateSession::new(&PLATFORM);

    session.begin(&mut mal, 16).unwrap();
    assert_eq!(
        session.write(&mut mal, 0, &[0u8; 17]),
        Err(UpdateError::Overflow)
    );
}

#[test]
fn test_incomplete_image_keeps_receiving() {
    let image = build_image(&user_part(1));
    let mut rig = Rig::new();
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut session = UpdateSession::new(&PLATFORM);

    session.begin(&mut mal, image.len() as u32).unwrap();
    session.write(&mut mal, 0, &image[..100]).unwrap();
    assert_eq!(
        session.finish(&mut mal, &mut NoCoprocessor, false),
        Err(UpdateError::Incomplete {
            expected: image.len() as u32,
            received: 100
        })
    );

    session.write(&mut mal, 100, &image[100..]).unwrap();
    assert_eq!(
        session.finish(&mut mal, &mut NoCoprocessor, false),
        Ok(ApplyOutcome::AppliedPendingRestart)
    );
}

#[test]
fn test_abort_returns_to_idle() {
    let mut rig = Rig::new();
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut session = UpdateSession::new(&PLATFORM);

    session.begin(&mut mal, 64).unwrap();
    session.abort();
    assert_eq!(session.state(), SessionState::Idle);
    session.begin(&mut mal, 64).unwrap();
}

// --- Rejected images ---

#[test]
fn test_wrong_platform_rejected() {
    let mut h = user_part(1);
    h.platform_id = 1;
    let image = build_image(&h);
    let mut rig = Rig::new();
    {
        let (mut internal, mut serial) = rig.devices();
        let mut mal = dispatcher(&mut internal, &mut serial);
        let mut session = UpdateSession::new(&PLATFORM);
        send(&mut session, &mut mal, &image).unwrap();
        assert_eq!(
            session.finish(&mut mal, &mut NoCoprocessor, false),
            Err(UpdateError::InvalidPlatform)
        );
        assert_eq!(session.state(), SessionState::Idle);
    }
    assert!(rig
        .bytes(USER_PART.start_address, image.len())
        .iter()
        .all(|&b| b == 0xFF));
}

#[test]
fn test_corrupted_transfer_rejected() {
    let mut image = build_image(&user_part(1));
    image[200] ^= 0x01;
    let mut rig = Rig::new();
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut session = UpdateSession::new(&PLATFORM);

    send(&mut session, &mut mal, &image).unwrap();
    assert_eq!(
        session.finish(&mut mal, &mut NoCoprocessor, false),
        Err(UpdateError::IntegrityCheckFailed)
    );
}

#[test]
fn test_unmet_dependency_rejected_unless_optional() {
    let h = with_dependency(system_part(2, 1), ModuleFunction::SystemPart, 1, 3);
    let image = build_image(&h);
    let mut rig = Rig::new();
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut session = UpdateSession::new(&PLATFORM);

    send(&mut session, &mut mal, &image).unwrap();
    assert_eq!(
        session.validate(&mut mal, &mut NoCoprocessor, false).err(),
        Some(UpdateError::DependencyCheckFailed)
    );
    assert_eq!(
        session.finish(&mut mal, &mut NoCoprocessor, true),
        Ok(ApplyOutcome::AppliedPendingRestart)
    );
}

#[test]
fn test_garbage_image_not_found() {
    let mut rig = Rig::new();
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut session = UpdateSession::new(&PLATFORM);

    send(&mut session, &mut mal, &[0xFFu8; 256]).unwrap();
    assert_eq!(
        session.finish(&mut mal, &mut NoCoprocessor, false),
        Err(UpdateError::ModuleNotFound)
    );
}

#[test]
fn test_compressed_image_unsupported() {
    let mut h = user_part(1);
    h.flags = ModuleInfoFlags::COMPRESSED;
    let image = build_image(&h);
    let mut rig = Rig::new();
    let (mut internal, mut serial) = rig.devices();
    let mut mal = dispatcher(&mut internal, &mut serial);
    let mut session = UpdateSession::new(&PLATFORM);

    send(&mut session, &mut mal, &image).unwrap();
    assert_eq!(
        session.finish(&mut mal, &mut NoCoprocessor, false),
        Err(UpdateError::Unsupported(ModuleFunction::UserPart))
    );
}
