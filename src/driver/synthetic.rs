// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic sensor driver
//!
//! Deterministic pseudo-devices that need no hardware: the depth stream is a
//! sliding millimeter ramp, IR is a shifting interference field, color is a
//! coordinate gradient, and the user tracker scripts a single person who
//! appears, calibrates and becomes tracked. Used by the CLI when no session
//! file is given and by end-to-end tests.

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::constants::{DEPTH_MIN_USABLE_MM, JOINT_COUNT};
use crate::driver::{
    DeviceDescriptor, DeviceHandle, DeviceSelector, FloorPlane, FrameFormat, JointPose, Point3,
    RecorderSink, SensorDriver, SensorFrame, SensorType, SkeletonState, StreamHandle,
    TrackerFrame, TrackerHandle, UserId, UserObservation, VideoMode, pinhole_depth_to_world,
    session::SessionRecorder,
};
use crate::errors::{DriverError, DriverResult};

const SUPPORTED_MODES: [VideoMode; 3] = [
    VideoMode {
        width: 640,
        height: 480,
        fps: 30,
    },
    VideoMode {
        width: 320,
        height: 240,
        fps: 30,
    },
    VideoMode {
        width: 320,
        height: 240,
        fps: 60,
    },
];

const TRACKER_MODE: VideoMode = VideoMode {
    width: 320,
    height: 240,
    fps: 30,
};

/// Scripted user: appears at this frame, tracked a few frames later
const USER_APPEARS_AT: u64 = 2;
const USER_TRACKED_AT: u64 = 5;
const SCRIPTED_USER_ID: UserId = 1;

/// Driver exposing one synthetic device
pub struct SyntheticDriver {
    paced: bool,
}

impl SyntheticDriver {
    /// Frames delivered at the negotiated frame rate
    pub fn new() -> Self {
        Self { paced: true }
    }

    /// Every poll yields a frame; used by tests
    pub fn unpaced() -> Self {
        Self { paced: false }
    }

    fn descriptor() -> DeviceDescriptor {
        DeviceDescriptor {
            name: "Synthetic Carmine".to_string(),
            vendor: "depthsense".to_string(),
            uri: "synthetic:0".to_string(),
        }
    }
}

impl Default for SyntheticDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorDriver for SyntheticDriver {
    fn devices(&self) -> Vec<DeviceDescriptor> {
        vec![Self::descriptor()]
    }

    fn open(&self, selector: &DeviceSelector) -> DriverResult<Box<dyn DeviceHandle>> {
        match selector {
            DeviceSelector::AnyDevice | DeviceSelector::Index(0) => {
                Ok(Box::new(SyntheticDevice {
                    descriptor: Self::descriptor(),
                    paced: self.paced,
                    registration: false,
                }))
            }
            DeviceSelector::Index(index) => Err(DriverError::DeviceNotFound(format!(
                "synthetic device index {} does not exist",
                index
            ))),
            DeviceSelector::SessionPath(_) => Err(DriverError::DeviceNotFound(
                "the synthetic driver cannot open recorded sessions".to_string(),
            )),
        }
    }
}

struct SyntheticDevice {
    descriptor: DeviceDescriptor,
    paced: bool,
    registration: bool,
}

impl DeviceHandle for SyntheticDevice {
    fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor.clone()
    }

    fn create_stream(&mut self, sensor: SensorType) -> DriverResult<Box<dyn StreamHandle>> {
        Ok(Box::new(SyntheticStream {
            sensor,
            mode: SUPPORTED_MODES[0],
            mirror: false,
            started: false,
            paced: self.paced,
            frame_index: 0,
            next_due: None,
        }))
    }

    fn set_depth_color_sync(&mut self, _enabled: bool) -> DriverResult<()> {
        Ok(())
    }

    fn registration_supported(&self) -> bool {
        true
    }

    fn set_registration_enabled(&mut self, enabled: bool) -> DriverResult<()> {
        self.registration = enabled;
        Ok(())
    }

    fn registration_enabled(&self) -> bool {
        self.registration
    }

    fn create_recorder(&mut self, path: &Path) -> DriverResult<Box<dyn RecorderSink>> {
        Ok(Box::new(SessionRecorder::create(
            path.to_path_buf(),
            self.descriptor.clone(),
        )))
    }

    fn create_user_tracker(&mut self) -> DriverResult<Box<dyn TrackerHandle>> {
        Ok(Box::new(SyntheticTracker {
            paced: self.paced,
            frame_index: 0,
            next_due: None,
            smoothing: 0.0,
            tracking: HashSet::new(),
        }))
    }
}

struct SyntheticStream {
    sensor: SensorType,
    mode: VideoMode,
    mirror: bool,
    started: bool,
    paced: bool,
    frame_index: u64,
    next_due: Option<Instant>,
}

impl SyntheticStream {
    fn frame_due(&mut self) -> bool {
        if !self.paced {
            return true;
        }
        let period = Duration::from_micros(1_000_000 / self.mode.fps as u64);
        let now = Instant::now();
        match self.next_due {
            Some(due) if now < due => false,
            Some(due) => {
                self.next_due = Some(due + period);
                true
            }
            None => {
                self.next_due = Some(now + period);
                true
            }
        }
    }
}

impl StreamHandle for SyntheticStream {
    fn sensor_type(&self) -> SensorType {
        self.sensor
    }

    fn video_mode(&self) -> VideoMode {
        self.mode
    }

    fn set_video_mode(&mut self, mode: VideoMode) -> DriverResult<()> {
        if SUPPORTED_MODES.contains(&mode) {
            self.mode = mode;
            Ok(())
        } else {
            Err(DriverError::ModeNotSupported(mode))
        }
    }

    fn set_mirroring(&mut self, enabled: bool) -> DriverResult<()> {
        self.mirror = enabled;
        Ok(())
    }

    fn mirroring(&self) -> bool {
        self.mirror
    }

    fn start(&mut self) -> DriverResult<()> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
    }

    fn poll_frame(&mut self) -> DriverResult<Option<SensorFrame>> {
        if !self.started || !self.frame_due() {
            return Ok(None);
        }

        let t = self.frame_index;
        self.frame_index += 1;

        let (format, data) = match self.sensor {
            SensorType::Depth => (FrameFormat::DepthMm, depth_plane(self.mode, t, self.mirror)),
            SensorType::Ir => (FrameFormat::Gray16, ir_plane(self.mode, t, self.mirror)),
            SensorType::Color => (FrameFormat::Rgb888, color_plane(self.mode, t, self.mirror)),
        };

        Ok(Some(SensorFrame {
            sensor: self.sensor,
            mode: self.mode,
            format,
            data,
            timestamp_us: t * 1_000_000 / self.mode.fps as u64,
        }))
    }

    fn depth_to_world(&self, x: u32, y: u32, depth_mm: u16) -> Point3 {
        pinhole_depth_to_world(&self.mode, x, y, depth_mm)
    }
}

fn effective_x(x: u32, width: u32, mirror: bool) -> u32 {
    if mirror { width - 1 - x } else { x }
}

/// Sliding millimeter ramp across the image, shifting one column per frame
fn depth_plane(mode: VideoMode, t: u64, mirror: bool) -> Vec<u8> {
    let mut data = Vec::with_capacity(mode.pixel_count() * 2);
    for _y in 0..mode.height {
        for x in 0..mode.width {
            let sx = effective_x(x, mode.width, mirror) as u64;
            let phase = (sx + t) % mode.width as u64;
            let mm = DEPTH_MIN_USABLE_MM as u64 + phase * 3500 / mode.width as u64;
            data.extend_from_slice(&(mm as u16).to_le_bytes());
        }
    }
    data
}

/// 10-bit interference pattern, drifting per frame
fn ir_plane(mode: VideoMode, t: u64, mirror: bool) -> Vec<u8> {
    let mut data = Vec::with_capacity(mode.pixel_count() * 2);
    for y in 0..mode.height {
        for x in 0..mode.width {
            let sx = effective_x(x, mode.width, mirror) as u64;
            let v = ((sx ^ y as u64) + t) & 0x03FF;
            data.extend_from_slice(&(v as u16).to_le_bytes());
        }
    }
    data
}

/// Coordinate gradient with a temporal blue channel
fn color_plane(mode: VideoMode, t: u64, mirror: bool) -> Vec<u8> {
    let mut data = Vec::with_capacity(mode.pixel_count() * 3);
    for y in 0..mode.height {
        for x in 0..mode.width {
            let sx = effective_x(x, mode.width, mirror);
            data.push((sx * 255 / mode.width.max(1)) as u8);
            data.push((y * 255 / mode.height.max(1)) as u8);
            data.push((t % 256) as u8);
        }
    }
    data
}

struct SyntheticTracker {
    paced: bool,
    frame_index: u64,
    next_due: Option<Instant>,
    smoothing: f32,
    tracking: HashSet<UserId>,
}

impl SyntheticTracker {
    fn frame_due(&mut self) -> bool {
        if !self.paced {
            return true;
        }
        let period = Duration::from_micros(1_000_000 / TRACKER_MODE.fps as u64);
        let now = Instant::now();
        match self.next_due {
            Some(due) if now < due => false,
            Some(due) => {
                self.next_due = Some(due + period);
                true
            }
            None => {
                self.next_due = Some(now + period);
                true
            }
        }
    }
}

impl TrackerHandle for SyntheticTracker {
    fn poll_frame(&mut self) -> DriverResult<Option<TrackerFrame>> {
        if !self.frame_due() {
            return Ok(None);
        }

        let t = self.frame_index;
        self.frame_index += 1;

        let mut observations = Vec::new();
        if t >= USER_APPEARS_AT {
            let skeleton = if t < USER_TRACKED_AT {
                SkeletonState::Calibrating
            } else {
                SkeletonState::Tracked
            };
            let com = Point3::new(((t % 200) as f32) - 100.0, 0.0, 2000.0);
            observations.push(UserObservation {
                id: SCRIPTED_USER_ID,
                is_new: t == USER_APPEARS_AT,
                is_lost: false,
                is_visible: true,
                center_of_mass: com,
                skeleton,
                joints: t_pose(com, skeleton == SkeletonState::Tracked),
            });
        }

        let timestamp_us = t * 1_000_000 / TRACKER_MODE.fps as u64;
        Ok(Some(TrackerFrame {
            observations,
            depth: SensorFrame {
                sensor: SensorType::Depth,
                mode: TRACKER_MODE,
                format: FrameFormat::DepthMm,
                data: depth_plane(TRACKER_MODE, t, false),
                timestamp_us,
            },
            floor: Some(FloorPlane {
                point: Point3::new(0.0, -900.0, 2000.0),
                normal: Point3::new(0.0, 1.0, 0.0),
                confidence: 0.9,
            }),
            timestamp_us,
        }))
    }

    fn start_skeleton_tracking(&mut self, id: UserId) -> DriverResult<()> {
        debug!(id, "synthetic skeleton tracking started");
        self.tracking.insert(id);
        Ok(())
    }

    fn stop_skeleton_tracking(&mut self, id: UserId) -> DriverResult<()> {
        debug!(id, "synthetic skeleton tracking stopped");
        self.tracking.remove(&id);
        Ok(())
    }

    fn set_smoothing_factor(&mut self, factor: f32) {
        self.smoothing = factor;
    }

    fn smoothing_factor(&self) -> f32 {
        self.smoothing
    }
}

/// Joint poses of a person standing in a T-pose around the center of mass
fn t_pose(com: Point3, tracked: bool) -> [JointPose; JOINT_COUNT] {
    // Offsets follow the observation joint order: head, neck, shoulders,
    // elbows, hands, torso, hips, knees, feet.
    const OFFSETS: [(f32, f32); JOINT_COUNT] = [
        (0.0, 650.0),     // head
        (0.0, 500.0),     // neck
        (-200.0, 450.0),  // left shoulder
        (200.0, 450.0),   // right shoulder
        (-450.0, 450.0),  // left elbow
        (450.0, 450.0),   // right elbow
        (-700.0, 450.0),  // left hand
        (700.0, 450.0),   // right hand
        (0.0, 0.0),       // torso
        (-120.0, -350.0), // left hip
        (120.0, -350.0),  // right hip
        (-120.0, -750.0), // left knee
        (120.0, -750.0),  // right knee
        (-120.0, -1150.0), // left foot
        (120.0, -1150.0), // right foot
    ];

    let confidence = if tracked { 1.0 } else { 0.0 };
    OFFSETS.map(|(dx, dy)| JointPose {
        position: Point3::new(com.x + dx, com.y + dy, com.z),
        orientation: Default::default(),
        position_confidence: confidence,
        orientation_confidence: confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpaced_stream_yields_every_poll() {
        let mut device = SyntheticDriver::unpaced()
            .open(&DeviceSelector::AnyDevice)
            .unwrap();
        let mut stream = device.create_stream(SensorType::Depth).unwrap();
        stream.start().unwrap();

        let first = stream.poll_frame().unwrap().unwrap();
        let second = stream.poll_frame().unwrap().unwrap();
        assert_eq!(first.data.len(), first.expected_len());
        assert!(second.timestamp_us > first.timestamp_us);
    }

    #[test]
    fn test_stopped_stream_yields_nothing() {
        let mut device = SyntheticDriver::unpaced()
            .open(&DeviceSelector::AnyDevice)
            .unwrap();
        let mut stream = device.create_stream(SensorType::Ir).unwrap();
        assert!(stream.poll_frame().unwrap().is_none());
    }

    #[test]
    fn test_unsupported_mode_is_rejected() {
        let mut device = SyntheticDriver::unpaced()
            .open(&DeviceSelector::AnyDevice)
            .unwrap();
        let mut stream = device.create_stream(SensorType::Depth).unwrap();
        let before = stream.video_mode();
        let rejected = VideoMode {
            width: 123,
            height: 45,
            fps: 7,
        };
        assert!(stream.set_video_mode(rejected).is_err());
        assert_eq!(stream.video_mode(), before);
    }

    #[test]
    fn test_scripted_user_becomes_tracked() {
        let mut device = SyntheticDriver::unpaced()
            .open(&DeviceSelector::AnyDevice)
            .unwrap();
        let mut tracker = device.create_user_tracker().unwrap();

        let mut new_seen = 0;
        let mut tracked_seen = false;
        for _ in 0..10 {
            let frame = tracker.poll_frame().unwrap().unwrap();
            for obs in &frame.observations {
                if obs.is_new {
                    new_seen += 1;
                }
                if obs.skeleton == SkeletonState::Tracked {
                    tracked_seen = true;
                }
            }
        }
        assert_eq!(new_seen, 1, "the scripted user must appear exactly once");
        assert!(tracked_seen);
    }

    #[test]
    fn test_mirror_flips_the_depth_ramp() {
        let mode = VideoMode {
            width: 4,
            height: 1,
            fps: 30,
        };
        let plain = depth_plane(mode, 0, false);
        let mirrored = depth_plane(mode, 0, true);
        assert_eq!(&plain[0..2], &mirrored[6..8]);
    }
}
