// SPDX-License-Identifier: MPL-2.0

//! End-to-end tests over recorded sessions

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use depthsense::constants::JOINT_COUNT;
use depthsense::driver::session::{
    SessionDocument, SessionDriver, SessionFrame, SessionPixels, SessionStream,
    SessionTrackerFrame, SessionTrackerTrack,
};
use depthsense::driver::synthetic::SyntheticDriver;
use depthsense::driver::{
    DeviceDescriptor, DeviceSelector, FrameFormat, JointPose, Point3, SensorType, SkeletonState,
    UserObservation, VideoMode,
};
use depthsense::tracker::UserTracker;
use depthsense::{DepthStream, Device};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "depthsense_{}_{}.session.json",
        std::process::id(),
        name
    ))
}

fn recorded_session_with_tracked_user() -> SessionDocument {
    let mode = VideoMode {
        width: 4,
        height: 4,
        fps: 30,
    };
    let depth_frame = |i: u64| SessionFrame {
        timestamp_us: i * 33_333,
        format: FrameFormat::DepthMm,
        pixels: SessionPixels::Shorts(vec![800 + i as u16 * 10; 16]),
    };
    let observation = |is_new: bool, skeleton: SkeletonState| UserObservation {
        id: 1,
        is_new,
        is_lost: false,
        is_visible: true,
        center_of_mass: Point3::new(0.0, 0.0, 1500.0),
        skeleton,
        joints: [JointPose::default(); JOINT_COUNT],
    };

    SessionDocument {
        device: DeviceDescriptor {
            name: "Recorded Carmine".to_string(),
            vendor: "test".to_string(),
            uri: "file:e2e".to_string(),
        },
        streams: vec![SessionStream {
            sensor: SensorType::Depth,
            mode,
            frames: (0..3).map(depth_frame).collect(),
        }],
        tracker: Some(SessionTrackerTrack {
            mode,
            frames: vec![
                SessionTrackerFrame {
                    timestamp_us: 0,
                    observations: vec![observation(true, SkeletonState::Calibrating)],
                    depth: SessionPixels::Shorts(vec![800; 16]),
                    floor: None,
                },
                SessionTrackerFrame {
                    timestamp_us: 33_333,
                    observations: vec![observation(false, SkeletonState::Tracked)],
                    depth: SessionPixels::Shorts(vec![810; 16]),
                    floor: None,
                },
                SessionTrackerFrame {
                    timestamp_us: 66_666,
                    observations: vec![observation(false, SkeletonState::Tracked)],
                    depth: SessionPixels::Shorts(vec![820; 16]),
                    floor: None,
                },
            ],
        }),
    }
}

#[test]
fn test_replayed_session_streams_and_tracks() {
    let path = temp_path("e2e");
    recorded_session_with_tracked_user().save(&path).unwrap();

    let driver = SessionDriver::unpaced();
    let mut device = Device::open(&driver, DeviceSelector::SessionPath(path.clone())).unwrap();

    let depth = DepthStream::setup(&device).unwrap();
    depth.start().unwrap();

    let mut tracker = UserTracker::setup(&device).unwrap();
    tracker.start();
    device.start();

    // The consumer tick observes the frame-new edge eventually.
    let mut saw_edge = false;
    for _ in 0..500 {
        device.update();
        if depth.is_frame_new() {
            saw_edge = true;
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    assert!(saw_edge, "no frame edge observed from the replayed stream");

    // Front-buffer dimensions equal the recorded stream's negotiated mode.
    assert_eq!(
        depth.video_mode(),
        VideoMode {
            width: 4,
            height: 4,
            fps: 30
        }
    );
    let dims = depth.pixel_dims().unwrap();
    assert_eq!((dims.width, dims.height, dims.channels), (4, 4, 1));
    assert_eq!(depth.raw_pixels().len(), 16);
    assert!(depth.world_at(2, 2).is_some());

    // The recorded user ends up tracked.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if tracker.user_count() == 1 {
            let user = tracker.user_by_index(0).unwrap();
            if user.lock().unwrap().status().contains("Tracking!") {
                break;
            }
        }
        assert!(Instant::now() < deadline, "recorded user never tracked");
        thread::sleep(Duration::from_millis(5));
    }

    tracker.exit();
    device.exit();
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_record_then_replay_round_trip() {
    let path = temp_path("roundtrip");

    // Capture a short session from the synthetic device at recorded pacing.
    {
        let driver = SyntheticDriver::new();
        let mut device = Device::open(&driver, DeviceSelector::AnyDevice).unwrap();
        let depth = DepthStream::setup(&device).unwrap();
        depth.set_size(320, 240).unwrap();
        depth.start().unwrap();
        device.start();

        device.start_recording(Some(path.clone())).unwrap();
        thread::sleep(Duration::from_millis(200));
        device.stop_recording();
        device.exit();
    }

    // The document preserves the stream geometry.
    let document = SessionDocument::load(&path).unwrap();
    assert_eq!(document.streams.len(), 1);
    assert_eq!(document.streams[0].sensor, SensorType::Depth);
    assert_eq!(
        document.streams[0].mode,
        VideoMode {
            width: 320,
            height: 240,
            fps: 30
        }
    );
    assert!(
        !document.streams[0].frames.is_empty(),
        "recording captured no frames"
    );

    // And the session opens again with the same negotiated mode.
    let driver = SessionDriver::unpaced();
    let mut device = Device::open(&driver, DeviceSelector::SessionPath(path.clone())).unwrap();
    let depth = DepthStream::setup(&device).unwrap();
    assert_eq!(
        depth.video_mode(),
        VideoMode {
            width: 320,
            height: 240,
            fps: 30
        }
    );

    device.exit();
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_opening_a_missing_session_fails_cleanly() {
    let driver = SessionDriver::new();
    let missing = temp_path("does-not-exist");
    assert!(Device::open(&driver, DeviceSelector::SessionPath(missing)).is_err());
}
