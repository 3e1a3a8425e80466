//! HTTP handlers invoked directly, without a server.

use otadash::adapters::gpio::{LedBank, SimPin};
use otadash::app::events::AppEvent;
use otadash::ota::PartitionSlot;
use otadash::ota::orchestrator::UpdateState;
use otadash::web::routes::{self, UploadRequest, query_param};

use crate::mock_hw::{
    BOUNDARY, BUILD_VERSION, MockNvs, RecordingSink, Rig, RigOptions, broken_reader, firmware_image,
    multipart_body, multipart_content_type, reader,
};

fn post_update(rig: &mut Rig, content_type: &str, body: &[u8], step: usize) -> routes::HttpResponse {
    let mut buf = vec![0u8; 1024];
    routes::update(
        &mut rig.ctx,
        UploadRequest {
            content_type: Some(content_type),
            content_len: Some(body.len() as u64),
        },
        &mut buf,
        reader(body, step),
        || 60_000,
        &mut rig.sink,
    )
}

// ── /update ───────────────────────────────────────────────────

#[test]
fn multipart_upload_succeeds_for_any_read_size() {
    let img = firmware_image("2.0.0", "Jan  2 2025", "10:00:00", 6_000);
    let body = multipart_body("fw.bin", &img);
    for step in [1, 13, 100, 1024] {
        let mut rig = Rig::new(PartitionSlot::Factory);
        let resp = post_update(&mut rig, &multipart_content_type(), &body, step);
        assert_eq!(resp.status, 200, "step {step}");
        assert_eq!(resp.body, "Update OK");
        assert_eq!(rig.ctx.flash().written, img, "step {step}");
        assert_eq!(rig.ctx.state(), UpdateState::RebootPending);
    }
}

#[test]
fn raw_octet_stream_upload_succeeds() {
    let mut rig = Rig::new(PartitionSlot::OtaB);
    let img = firmware_image("7.0.0", "", "", 3_000);
    let resp = post_update(&mut rig, "application/octet-stream", &img, 500);
    assert_eq!(resp.status, 200);
    assert_eq!(rig.ctx.store().get_version(PartitionSlot::OtaA).as_str(), "7.0.0");
}

#[test]
fn truncated_multipart_body_aborts_transfer() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    let img = firmware_image("2.0.0", "", "", 4_000);
    let body = multipart_body("fw.bin", &img);
    let cut = &body[..body.len() - 100];

    let mut buf = vec![0u8; 256];
    let resp = routes::update(
        &mut rig.ctx,
        UploadRequest {
            content_type: Some(&multipart_content_type()),
            content_len: None,
        },
        &mut buf,
        reader(cut, 256),
        || 0,
        &mut rig.sink,
    );
    assert_eq!(resp.status, 500);
    assert_eq!(resp.body, "Update Failed: transfer aborted by client");
    assert!(!rig.ctx.flash().is_armed());
    assert_eq!(rig.ctx.current_version().as_str(), BUILD_VERSION);
}

#[test]
fn connection_error_mid_body_aborts_transfer() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    let img = firmware_image("2.0.0", "", "", 4_000);
    let body = multipart_body("fw.bin", &img);

    let mut buf = vec![0u8; 512];
    let resp = routes::update(
        &mut rig.ctx,
        UploadRequest {
            content_type: Some(&multipart_content_type()),
            content_len: Some(body.len() as u64),
        },
        &mut buf,
        broken_reader(&body, 512, 2_000),
        || 0,
        &mut rig.sink,
    );
    assert_eq!(resp.status, 500);
    assert_eq!(
        rig.ctx.state(),
        UpdateState::Failed(otadash::error::OtaError::TransferAborted)
    );
    assert_eq!(rig.ctx.flash().aborts, 1);
}

#[test]
fn short_raw_body_aborts_transfer() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    let img = firmware_image("2.0.0", "", "", 1_000);
    let mut buf = vec![0u8; 128];
    let resp = routes::update(
        &mut rig.ctx,
        UploadRequest {
            content_type: Some("application/octet-stream"),
            content_len: Some(img.len() as u64 + 500),
        },
        &mut buf,
        reader(&img, 128),
        || 0,
        &mut rig.sink,
    );
    assert_eq!(resp.status, 500);
    assert!(rig.ctx.history().is_empty());
}

#[test]
fn flash_failure_reports_reason() {
    let mut rig = Rig::with(
        PartitionSlot::Factory,
        RigOptions {
            fail_at_chunk: Some(1),
            ..Default::default()
        },
    );
    let img = firmware_image("2.0.0", "", "", 5_000);
    let body = multipart_body("fw.bin", &img);
    let resp = post_update(&mut rig, &multipart_content_type(), &body, 700);
    assert_eq!(resp.status, 500);
    assert_eq!(resp.body, "Update Failed: flash write failed: chunk write rejected");
    assert_eq!(rig.ctx.current_version().as_str(), BUILD_VERSION);
}

#[test]
fn upload_during_pending_reboot_is_503() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    let img = firmware_image("2.0.0", "", "", 100);
    let body = multipart_body("fw.bin", &img);
    assert_eq!(post_update(&mut rig, &multipart_content_type(), &body, 64).status, 200);

    let resp = post_update(&mut rig, &multipart_content_type(), &body, 64);
    assert_eq!(resp.status, 503);
    assert_eq!(resp.body, "Update Failed: reboot pending");
}

#[test]
fn empty_file_field_is_500() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    let body = multipart_body("empty.bin", &[]);
    let resp = post_update(&mut rig, &multipart_content_type(), &body, 64);
    assert_eq!(resp.status, 500);
    assert_eq!(resp.body, "Update Failed: flash write failed: empty image");
}

#[test]
fn only_update_field_is_flashed() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    let img = firmware_image("3.1.0", "", "", 2_000);
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"notes\"; filename=\"notes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\nhello\r\n"
    )
    .into_bytes();
    body.extend_from_slice(&multipart_body("fw.bin", &img));

    let resp = post_update(&mut rig, &multipart_content_type(), &body, 64);
    assert_eq!(resp.status, 200);
    assert_eq!(rig.ctx.flash().written, img);
    assert_eq!(rig.ctx.session().filename.as_str(), "fw.bin");
    assert_eq!(rig.ctx.store().get_version(PartitionSlot::OtaA).as_str(), "3.1.0");
}

#[test]
fn malformed_multipart_is_400() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    let resp = post_update(&mut rig, "multipart/form-data", b"whatever", 64);
    assert_eq!(resp.status, 400);

    let other_field = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n--{BOUNDARY}--\r\n"
    );
    let resp = post_update(&mut rig, &multipart_content_type(), other_field.as_bytes(), 64);
    assert_eq!(resp.status, 400);
    assert_eq!(rig.ctx.state(), UpdateState::Idle);
}

// ── OTA queries ───────────────────────────────────────────────

#[test]
fn version_routes_on_fresh_device() {
    let rig = Rig::new(PartitionSlot::Factory);
    assert_eq!(routes::current_version(&rig.ctx).body, BUILD_VERSION);
    assert_eq!(routes::ota_version(&rig.ctx).body, "Unknown");
    assert_eq!(routes::ota_time(&rig.ctx).body, "Never");
    assert_eq!(routes::ota_history(&rig.ctx).body, "[]");
    assert_eq!(routes::current_version(&rig.ctx).content_type, routes::TEXT_PLAIN);
}

#[test]
fn ota_versions_lists_all_slots() {
    let rig = Rig::new(PartitionSlot::Factory);
    let resp = routes::ota_versions(&rig.ctx);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.content_type, routes::APPLICATION_JSON);
    let rows: serde_json::Value = serde_json::from_str(&resp.body).unwrap();
    assert_eq!(
        rows,
        serde_json::json!([
            { "partition": "factory", "label": "Factory: 1.0.0 (host) [running]" },
            { "partition": "ota_0", "label": "OTA 0: Unknown" },
            { "partition": "ota_1", "label": "OTA 1: Unknown" },
        ])
    );
}

#[test]
fn queries_after_upload() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    let img = firmware_image("2.0.0", "", "", 100);
    post_update(&mut rig, &multipart_content_type(), &multipart_body("fw.bin", &img), 64);

    assert_eq!(routes::ota_version(&rig.ctx).body, "2.0.0");
    assert_eq!(routes::ota_time(&rig.ctx).body, "60000");
    let history: Vec<String> = serde_json::from_str(&routes::ota_history(&rig.ctx).body).unwrap();
    assert_eq!(history, ["2.0.0 -> ota_0 at 60000 ms"]);

    let status: serde_json::Value = serde_json::from_str(&routes::ota_status(&rig.ctx).body).unwrap();
    assert_eq!(status["state"], "rebooting");
    assert_eq!(status["bytes"], img.len() as u64);
}

#[test]
fn ota_status_reports_failure_reason() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    post_update(&mut rig, &multipart_content_type(), &multipart_body("x.bin", &[]), 64);
    let status: serde_json::Value = serde_json::from_str(&routes::ota_status(&rig.ctx).body).unwrap();
    assert_eq!(status["state"], "failed");
    assert_eq!(status["error"], "flash write failed: empty image");
}

// ── /switch_partition ─────────────────────────────────────────

#[test]
fn switch_partition_status_codes() {
    let mut rig = Rig::new(PartitionSlot::Factory);
    let mut sink = RecordingSink::new();

    assert_eq!(routes::switch_partition(&mut rig.ctx, "/switch_partition", 0, &mut sink).status, 400);
    assert_eq!(
        routes::switch_partition(&mut rig.ctx, "/switch_partition?target=", 0, &mut sink).status,
        400
    );
    assert_eq!(
        routes::switch_partition(&mut rig.ctx, "/switch_partition?target=ota_2", 0, &mut sink).status,
        404
    );

    let ok = routes::switch_partition(&mut rig.ctx, "/switch_partition?target=ota_0", 0, &mut sink);
    assert_eq!(ok.status, 200);
    assert_eq!(ok.body, "Boot partition set to ota_0. Rebooting...");
    assert!(sink.events.contains(&AppEvent::RebootScheduled));
}

#[test]
fn switch_partition_commit_failure_is_500() {
    let mut rig = Rig::with(
        PartitionSlot::Factory,
        RigOptions {
            reject_boot: true,
            ..Default::default()
        },
    );
    let resp = routes::switch_partition(&mut rig.ctx, "/switch_partition?target=ota_1", 0, &mut rig.sink);
    assert_eq!(resp.status, 500);
    assert!(resp.body.starts_with("Switch Failed: boot commit failed"));
}

// ── Dashboard ─────────────────────────────────────────────────

fn leds() -> LedBank<SimPin> {
    LedBank::new([SimPin::default(); 2], [2, 5])
}

#[test]
fn led_routes_toggle_and_report() {
    let mut bank = leds();
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();

    let resp = routes::led(&mut bank, &mut nvs, 1, true, &mut sink);
    assert_eq!(resp.status, 200);
    let v: serde_json::Value = serde_json::from_str(&resp.body).unwrap();
    assert_eq!(v, serde_json::json!({ "led": 1, "status": "on" }));

    let v: serde_json::Value = serde_json::from_str(&routes::status(&bank).body).unwrap();
    assert_eq!(v, serde_json::json!({ "led1": true, "led2": false }));
    assert!(sink.events.contains(&AppEvent::LedChanged { led: 1, on: true }));
    assert_eq!(nvs.raw("gpio", "led1"), Some(vec![1]));
}

#[test]
fn gpio_route_validates_arguments() {
    let mut bank = leds();
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::new();

    let missing = routes::gpio(&mut bank, &mut nvs, "/gpio?pin=2", &mut sink);
    assert_eq!((missing.status, missing.body.as_ref()), (400, "Missing pin or state"));
    assert_eq!(routes::gpio(&mut bank, &mut nvs, "/gpio?pin=x&state=on", &mut sink).status, 400);
    assert_eq!(routes::gpio(&mut bank, &mut nvs, "/gpio?pin=2&state=maybe", &mut sink).status, 400);
    assert_eq!(routes::gpio(&mut bank, &mut nvs, "/gpio?pin=13&state=on", &mut sink).status, 400);

    let ok = routes::gpio(&mut bank, &mut nvs, "/gpio?pin=5&state=on", &mut sink);
    assert_eq!(ok.status, 200);
    let v: serde_json::Value = serde_json::from_str(&ok.body).unwrap();
    assert_eq!(v, serde_json::json!({ "pin": 5, "state": "on" }));
    assert_eq!(bank.states(), [false, true]);
}

#[test]
fn temperature_has_two_decimals() {
    assert_eq!(routes::temperature(45.0).body, "45.00");
    assert_eq!(routes::temperature(-3.456).body, "-3.46");
}

#[test]
fn index_and_fallback() {
    let page = routes::index();
    assert_eq!(page.content_type, routes::TEXT_HTML);
    assert!(page.body.contains("ESP32 Web Dashboard"));

    let nf = routes::not_found();
    assert_eq!((nf.status, nf.body.as_ref()), (404, "Not found"));
}

#[test]
fn query_param_lookup() {
    assert_eq!(query_param("/x?a=1&b=2", "b"), Some("2"));
    assert_eq!(query_param("/x?a=1&flag", "flag"), Some(""));
    assert_eq!(query_param("/x?a=1", "c"), None);
    assert_eq!(query_param("/x", "a"), None);
}
