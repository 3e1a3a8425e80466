//! End-to-end OTA flows against the mock flash, boot manager and NVS.

use otadash::app::events::AppEvent;
use otadash::error::{BootError, FlashError, OtaError};
use otadash::ota::PartitionSlot;
use otadash::ota::orchestrator::UpdateState;
use otadash::ota::version_store::VersionStore;

use crate::mock_hw::{BUILD_VERSION, MockNvs, RecordingSink, Rig, RigOptions, firmware_image};

// ── Fresh device ──────────────────────────────────────────────

#[test]
fn fresh_device_self_registers_running_slot_only() {
    let rig = Rig::new(PartitionSlot::Factory);

    assert_eq!(rig.ctx.current_version().as_str(), BUILD_VERSION);
    assert_eq!(
        rig.ctx.store().get_version(PartitionSlot::OtaA).as_str(),
        "Unknown"
    );
    assert_eq!(
        rig.ctx.store().get_version(PartitionSlot::OtaB).as_str(),
        "Unknown"
    );
    assert_eq!(rig.ctx.last_update_timestamp(), "Never");
    assert_eq!(rig.ctx.last_written_version().as_str(), "Unknown");
    assert!(
        rig.sink
            .events
            .contains(&AppEvent::SelfRegistered(PartitionSlot::Factory))
    );
}

#[test]
fn reboot_keeps_existing_record() {
    let nvs = MockNvs::new();
    let mut sink = RecordingSink::new();
    let mut store = VersionStore::open(nvs.clone(), PartitionSlot::OtaA, "build-a", 10, &mut sink);
    store
        .record_version(PartitionSlot::OtaA, "2.0.0 (Jan  2 2025 10:00:00)")
        .unwrap();

    // Same storage, new boot: the uploaded version wins over the build string.
    let reopened = VersionStore::open(nvs, PartitionSlot::OtaA, "build-b", 10, &mut sink);
    assert_eq!(
        reopened.get_version(PartitionSlot::OtaA).as_str(),
        "2.0.0 (Jan  2 2025 10:00:00)"
    );
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::SelfRegistered(_))),
        1
    );
}

#[test]
fn recorded_versions_read_back_for_every_slot() {
    let mut sink = RecordingSink::new();
    let mut store = VersionStore::open(MockNvs::new(), PartitionSlot::Factory, BUILD_VERSION, 10, &mut sink);
    for (slot, v) in [
        (PartitionSlot::Factory, "f-1"),
        (PartitionSlot::OtaA, "a-2"),
        (PartitionSlot::OtaB, "b-3"),
    ] {
        store.record_version(slot, v).unwrap();
        assert_eq!(store.get_version(slot).as_str(), v);
    }
}

// ── Upload ────────────────────────────────────────────────────

#[test]
fn upload_commits_to_inactive_slot_and_schedules_reboot() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    let img = firmware_image("2.1.0", "Feb 10 2025", "08:30:00", 8_000);

    assert_eq!(rig.upload("fw.bin", &img, 1024, 42_000), Ok(PartitionSlot::OtaA));

    assert_eq!(rig.ctx.state(), UpdateState::RebootPending);
    assert_eq!(rig.ctx.boot_manager().boot_slot(), PartitionSlot::OtaA);
    assert_eq!(rig.ctx.flash().written, img);
    assert_eq!(
        rig.ctx.store().get_version(PartitionSlot::OtaA).as_str(),
        "2.1.0 (Feb 10 2025 08:30:00)"
    );
    assert_eq!(rig.ctx.last_written_version().as_str(), "2.1.0 (Feb 10 2025 08:30:00)");
    assert_eq!(rig.ctx.last_update_timestamp(), "42000");
    // Still running the old image until the restart.
    assert_eq!(rig.ctx.current_version().as_str(), BUILD_VERSION);
    assert!(rig.drain_reboot(42_000));
}

#[test]
fn upload_from_ota_a_targets_ota_b() {
    let mut rig = Rig::new(PartitionSlot::OtaA);
    let img = firmware_image("3.0.0", "", "", 100);
    assert_eq!(rig.upload("fw.bin", &img, 64, 1), Ok(PartitionSlot::OtaB));
    assert_eq!(rig.ctx.store().get_version(PartitionSlot::OtaB).as_str(), "3.0.0");
}

#[test]
fn image_without_descriptor_is_recorded_under_filename() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    let mut img = vec![0u8; 2_000];
    img[0] = 0xE9;
    rig.upload("nightly-build.bin", &img, 500, 7).unwrap();
    assert_eq!(
        rig.ctx.store().get_version(PartitionSlot::OtaA).as_str(),
        "nightly-build.bin"
    );
}

#[test]
fn flash_failure_mid_stream_leaves_running_record_untouched() {
    let mut rig = Rig::with(
        PartitionSlot::Factory,
        RigOptions {
            fail_at_chunk: Some(3),
            ..Default::default()
        },
    );
    let img = firmware_image("9.9.9", "", "", 4_000);

    let err = rig.upload("fw.bin", &img, 512, 10).unwrap_err();
    assert_eq!(err, OtaError::FlashWriteFailed(FlashError::WriteFailed));
    assert_eq!(rig.ctx.state(), UpdateState::Failed(err));
    assert_eq!(rig.ctx.current_version().as_str(), BUILD_VERSION);
    assert_eq!(
        rig.ctx.store().get_version(PartitionSlot::OtaA).as_str(),
        "Unknown"
    );
    assert_eq!(rig.ctx.boot_manager().boot_slot(), PartitionSlot::Factory);
    assert!(!rig.ctx.flash().is_armed());
    assert!(rig.ctx.history().is_empty());
    assert_eq!(rig.ctx.poll_actions(10_000), None);
    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::UploadFailed { .. })),
        1
    );
}

#[test]
fn empty_upload_fails_and_records_nothing() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    assert_eq!(
        rig.upload("empty.bin", &[], 64, 5),
        Err(OtaError::FlashWriteFailed(FlashError::NothingWritten))
    );
    assert!(rig.ctx.history().is_empty());
    assert_eq!(rig.ctx.last_update_timestamp(), "Never");
    assert!(matches!(rig.ctx.state(), UpdateState::Failed(_)));
}

#[test]
fn invalid_image_is_rejected_at_finalize() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    assert_eq!(
        rig.upload("junk.bin", &[0x00; 300], 100, 5),
        Err(OtaError::FlashWriteFailed(FlashError::InvalidImage))
    );
    assert_eq!(rig.ctx.boot_manager().boot_slot(), PartitionSlot::Factory);
}

#[test]
fn failed_upload_can_be_retried() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    rig.ctx.begin_upload("fw.bin", &mut rig.sink).unwrap();
    rig.ctx.upload_chunk(&[0xE9; 100], &mut rig.sink).unwrap();
    assert_eq!(rig.ctx.abort_upload(&mut rig.sink), OtaError::TransferAborted);

    let img = firmware_image("2.0.0", "", "", 10);
    assert_eq!(rig.upload("fw.bin", &img, 64, 9), Ok(PartitionSlot::OtaA));
}

#[test]
fn restart_of_active_session_abandons_previous_bytes() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    rig.ctx.begin_upload("first.bin", &mut rig.sink).unwrap();
    rig.ctx.upload_chunk(&[0xAA; 50], &mut rig.sink).unwrap();

    let img = firmware_image("4.0.0", "", "", 20);
    assert_eq!(rig.upload("second.bin", &img, 64, 3), Ok(PartitionSlot::OtaA));
    assert_eq!(rig.ctx.flash().written, img);
}

#[test]
fn second_upload_refused_while_reboot_pending() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    let img = firmware_image("2.0.0", "", "", 10);
    rig.upload("fw.bin", &img, 64, 1).unwrap();
    assert_eq!(
        rig.ctx.begin_upload("again.bin", &mut rig.sink),
        Err(OtaError::RebootPending)
    );
    assert_eq!(rig.ctx.state(), UpdateState::RebootPending);
}

#[test]
fn chunk_without_session_is_not_receiving() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    assert_eq!(
        rig.ctx.upload_chunk(b"stray", &mut rig.sink),
        Err(OtaError::NotReceiving)
    );
    assert_eq!(
        rig.ctx.finish_upload(0, &mut rig.sink),
        Err(OtaError::NotReceiving)
    );
}

// ── History ───────────────────────────────────────────────────

#[test]
fn history_keeps_append_order_and_caps() {
    let mut sink = RecordingSink::new();
    let mut store = VersionStore::open(MockNvs::new(), PartitionSlot::Factory, BUILD_VERSION, 3, &mut sink);
    for i in 0..5u64 {
        store
            .record_update(PartitionSlot::OtaA, &format!("v{i}"), i * 1000)
            .unwrap();
    }
    let versions: Vec<_> = store
        .get_history()
        .iter()
        .map(|e| e.version.as_str().to_owned())
        .collect();
    assert_eq!(versions, ["v2", "v3", "v4"]);
}

#[test]
fn committed_upload_is_appended_to_history() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    let img = firmware_image("2.0.0", "", "", 10);
    rig.upload("fw.bin", &img, 64, 1_234).unwrap();

    let history = rig.ctx.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].slot, PartitionSlot::OtaA);
    assert_eq!(history[0].timestamp_ms, 1_234);
    assert_eq!(history[0].to_string(), "2.0.0 -> ota_0 at 1234 ms");
}

// ── Partition switch ──────────────────────────────────────────

#[test]
fn switching_to_running_slot_schedules_reboot() {
    let mut rig = Rig::new(PartitionSlot::OtaA);
    assert_eq!(
        rig.ctx.switch_partition("ota_0", 100, &mut rig.sink),
        Ok(PartitionSlot::OtaA)
    );
    assert_eq!(rig.ctx.state(), UpdateState::RebootPending);
    assert!(rig.sink.events.contains(&AppEvent::RebootScheduled));
    assert!(rig.drain_reboot(100));
}

#[test]
fn switching_to_factory_moves_boot_target() {
    let mut rig = Rig::new(PartitionSlot::OtaB);
    rig.ctx.switch_partition("factory", 0, &mut rig.sink).unwrap();
    assert_eq!(rig.ctx.boot_manager().boot_slot(), PartitionSlot::Factory);
    assert!(
        rig.sink
            .events
            .contains(&AppEvent::BootTargetChanged(PartitionSlot::Factory))
    );
}

#[test]
fn unknown_partition_name_is_not_found() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    assert_eq!(
        rig.ctx.switch_partition("ota_2", 0, &mut rig.sink),
        Err(OtaError::PartitionNotFound)
    );
    assert_eq!(rig.ctx.state(), UpdateState::Idle);
    assert_eq!(rig.ctx.poll_actions(10_000), None);
}

#[test]
fn partition_missing_from_table_is_not_found() {
    let mut rig = Rig::with(
        PartitionSlot::Factory,
        RigOptions {
            missing: Some(PartitionSlot::OtaB),
            ..Default::default()
        },
    );
    assert_eq!(
        rig.ctx.switch_partition("ota_1", 0, &mut rig.sink),
        Err(OtaError::PartitionNotFound)
    );
}

#[test]
fn rejected_boot_commit_is_reported() {
    let mut rig = Rig::with(
        PartitionSlot::Factory,
        RigOptions {
            reject_boot: true,
            ..Default::default()
        },
    );
    assert_eq!(
        rig.ctx.switch_partition("ota_0", 0, &mut rig.sink),
        Err(OtaError::BootCommitFailed(BootError::FlashFailed))
    );
    assert_eq!(rig.ctx.poll_actions(10_000), None);
}

// ── Store unavailable ─────────────────────────────────────────

#[test]
fn unavailable_store_yields_sentinels() {
    let rig = Rig::with(
        PartitionSlot::OtaA,
        RigOptions {
            nvs_down: true,
            ..Default::default()
        },
    );
    assert_eq!(rig.ctx.current_version().as_str(), BUILD_VERSION);
    assert_eq!(
        rig.ctx.store().get_version(PartitionSlot::Factory).as_str(),
        "Unknown"
    );
    assert_eq!(rig.ctx.last_update_timestamp(), "Never");
    assert!(rig.ctx.history().is_empty());
    assert!(
        !rig.sink
            .events
            .iter()
            .any(|e| matches!(e, AppEvent::SelfRegistered(_)))
    );
}

#[test]
fn upload_succeeds_when_store_fails_mid_flight() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    rig.nvs_down.set(true);
    let img = firmware_image("5.0.0", "", "", 100);
    assert_eq!(rig.upload("fw.bin", &img, 64, 1), Ok(PartitionSlot::OtaA));
    assert_eq!(rig.ctx.boot_manager().boot_slot(), PartitionSlot::OtaA);
    assert_eq!(rig.ctx.state(), UpdateState::RebootPending);

    rig.nvs_down.set(false);
    assert_eq!(
        rig.ctx.store().get_version(PartitionSlot::OtaA).as_str(),
        "Unknown"
    );
}

// ── Events ────────────────────────────────────────────────────

#[test]
fn upload_emits_lifecycle_events_in_order() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    rig.sink.events.clear();
    let img = firmware_image("2.0.0", "", "", 200 * 1024);
    rig.upload("fw.bin", &img, 4096, 1).unwrap();

    let ev = &rig.sink.events;
    assert_eq!(
        ev.first(),
        Some(&AppEvent::UploadStarted {
            target: PartitionSlot::OtaA
        })
    );
    assert_eq!(ev.last(), Some(&AppEvent::RebootScheduled));
    assert_eq!(
        rig.sink
            .count(|e| matches!(e, AppEvent::UploadProgress { .. })),
        3
    );
    assert!(ev.iter().any(|e| matches!(
        e,
        AppEvent::UploadCommitted {
            slot: PartitionSlot::OtaA,
            ..
        }
    )));
}
