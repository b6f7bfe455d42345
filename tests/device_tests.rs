// SPDX-License-Identifier: MPL-2.0

//! Integration tests for device lifecycle and stream management

use std::thread;
use std::time::Duration;

use depthsense::driver::DeviceSelector;
use depthsense::driver::synthetic::SyntheticDriver;
use depthsense::errors::{DeviceError, StreamError};
use depthsense::{DepthStream, Device, IrStream};

#[test]
fn test_invalid_index_carries_device_listing() {
    let driver = SyntheticDriver::new();
    let err = Device::open(&driver, DeviceSelector::Index(5)).unwrap_err();

    match &err {
        DeviceError::InvalidIndex { index, available } => {
            assert_eq!(*index, 5);
            assert_eq!(available.len(), 1);
        }
        other => panic!("expected InvalidIndex, got {:?}", other),
    }

    // The rendered message doubles as the diagnostics listing.
    let message = err.to_string();
    assert!(message.contains("Synthetic Carmine"), "message: {}", message);
}

#[test]
fn test_exit_is_idempotent() {
    let driver = SyntheticDriver::new();
    let mut device = Device::open(&driver, DeviceSelector::AnyDevice).unwrap();
    assert!(device.is_open());

    device.exit();
    assert!(!device.is_open());
    device.exit(); // must be safe to call again
    assert!(!device.is_open());
}

#[test]
fn test_streams_register_and_deregister() {
    let driver = SyntheticDriver::new();
    let mut device = Device::open(&driver, DeviceSelector::AnyDevice).unwrap();

    let depth = DepthStream::setup(&device).unwrap();
    let _ir = IrStream::setup(&device).unwrap();
    assert_eq!(device.stream_count(), 2);

    depth.exit();
    assert_eq!(device.stream_count(), 1);

    device.exit();
    assert_eq!(device.stream_count(), 0);
}

#[test]
fn test_rejected_mode_preserves_previous_mode() {
    let driver = SyntheticDriver::new();
    let mut device = Device::open(&driver, DeviceSelector::AnyDevice).unwrap();
    let depth = DepthStream::setup(&device).unwrap();

    let before = depth.video_mode();
    let err = depth.set_size(123, 45).unwrap_err();
    assert!(matches!(err, StreamError::ModeRejected { .. }));
    assert_eq!(depth.video_mode(), before, "prior mode must stay in effect");

    depth.set_size(320, 240).unwrap();
    assert_eq!(depth.width(), 320);
    assert_eq!(depth.height(), 240);

    device.exit();
}

#[test]
fn test_recording_start_is_noop_while_active() {
    let base = std::env::temp_dir().join(format!("depthsense_rec_{}", std::process::id()));
    let first = base.with_extension("a.session.json");
    let second = base.with_extension("b.session.json");

    let driver = SyntheticDriver::new();
    let mut device = Device::open(&driver, DeviceSelector::AnyDevice).unwrap();

    // Stopping with no active recording must be a no-op.
    device.stop_recording();
    assert!(!device.is_recording());

    let active = device.start_recording(Some(first.clone())).unwrap();
    assert_eq!(active, first);
    assert!(device.is_recording());

    // A second start while recording keeps the active session.
    let still_active = device.start_recording(Some(second.clone())).unwrap();
    assert_eq!(still_active, first);

    device.stop_recording();
    assert!(!device.is_recording());
    assert!(first.exists());
    assert!(!second.exists());

    device.exit();
    let _ = std::fs::remove_file(&first);
}

#[test]
fn test_acquisition_produces_a_frame_edge() {
    let driver = SyntheticDriver::unpaced();
    let mut device = Device::open(&driver, DeviceSelector::AnyDevice).unwrap();

    let depth = DepthStream::setup(&device).unwrap();
    depth.set_size(320, 240).unwrap();
    depth.start().unwrap();
    device.start();

    let mut saw_edge = false;
    for _ in 0..500 {
        device.update();
        if depth.is_frame_new() {
            saw_edge = true;
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    assert!(saw_edge, "acquisition thread never produced a frame edge");

    let dims = depth.pixel_dims().unwrap();
    assert_eq!((dims.width, dims.height), (320, 240));
    assert_eq!(depth.raw_pixels().len(), 320 * 240);

    // World lookup goes through the stream's intrinsics.
    let world = depth.world_at(160, 120).unwrap();
    assert!(world.z > 0.0);

    device.exit();
}
