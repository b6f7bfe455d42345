// SPDX-License-Identifier: GPL-3.0-only

//! Sensor-driver and tracking-middleware boundary
//!
//! The core never talks to hardware directly. Everything it needs from the
//! outside world is expressed as trait objects defined here:
//!
//! - [`SensorDriver`]: device enumeration and open-by-selector
//! - [`DeviceHandle`]: per-sensor sub-stream creation, sync/registration
//!   toggles, recorder and user-tracker creation
//! - [`StreamHandle`]: video-mode negotiation, mirroring, non-blocking frame
//!   polling, depth-to-world conversion
//! - [`TrackerHandle`]: per-frame user observations and skeleton tracking
//!   start/stop
//!
//! Two in-tree implementations exist: [`synthetic`] (deterministic pseudo
//! devices, no hardware required) and [`session`] (record/replay of captured
//! sessions). A real driver binding would implement the same traits.

pub mod session;
pub mod synthetic;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::JOINT_COUNT;
use crate::errors::DriverResult;

/// Sensor channel kinds a device can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorType {
    /// Depth sensor producing raw millimeter distances
    Depth,
    /// Infrared luminance sensor
    Ir,
    /// RGB color sensor
    Color,
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorType::Depth => write!(f, "depth"),
            SensorType::Ir => write!(f, "ir"),
            SensorType::Color => write!(f, "color"),
        }
    }
}

/// Negotiated resolution and frame rate of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMode {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoMode {
    /// Number of pixels per frame
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for VideoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} @ {}fps", self.width, self.height, self.fps)
    }
}

/// Raw pixel layout of a sensor frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// 8-bit single-channel luminance
    Gray8,
    /// 16-bit single-channel luminance (little-endian)
    Gray16,
    /// 24-bit packed RGB
    Rgb888,
    /// 16-bit millimeter distances (little-endian)
    DepthMm,
}

impl FrameFormat {
    /// Bytes per pixel for this layout
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Gray8 => 1,
            FrameFormat::Gray16 | FrameFormat::DepthMm => 2,
            FrameFormat::Rgb888 => 3,
        }
    }
}

/// One frame as read from a driver sub-stream
#[derive(Debug, Clone)]
pub struct SensorFrame {
    pub sensor: SensorType,
    pub mode: VideoMode,
    pub format: FrameFormat,
    /// Raw pixel bytes; multi-byte formats are little-endian
    pub data: Vec<u8>,
    /// Producer-side timestamp in microseconds
    pub timestamp_us: u64,
}

impl SensorFrame {
    /// Byte length a full (uncropped) frame of this mode/format must have
    pub fn expected_len(&self) -> usize {
        self.mode.pixel_count() * self.format.bytes_per_pixel()
    }
}

/// Identity of an enumerable device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub name: String,
    pub vendor: String,
    pub uri: String,
}

/// How to pick the device to open
#[derive(Debug, Clone)]
pub enum DeviceSelector {
    /// First available device
    AnyDevice,
    /// Zero-based enumeration index
    Index(usize),
    /// Recorded session file (opaque to the core, owned by the driver)
    SessionPath(PathBuf),
}

/// Stable per-user identifier assigned by the tracking middleware
///
/// Reused only after the id's lost observation has been delivered.
pub type UserId = u16;

/// 3-D point or vector in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Joint orientation as a quaternion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// Position and orientation of one joint, with per-component confidence
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointPose {
    pub position: Point3,
    pub orientation: Quaternion,
    pub position_confidence: f32,
    pub orientation_confidence: f32,
}

/// Why skeleton calibration failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationFailure {
    NotInPose,
    Hands,
    Legs,
    Head,
    Torso,
}

impl fmt::Display for CalibrationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationFailure::NotInPose => write!(f, "not in pose"),
            CalibrationFailure::Hands => write!(f, "hands"),
            CalibrationFailure::Legs => write!(f, "legs"),
            CalibrationFailure::Head => write!(f, "head"),
            CalibrationFailure::Torso => write!(f, "torso"),
        }
    }
}

/// Skeleton calibration state reported per observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SkeletonState {
    /// Skeleton tracking is not running for this user
    #[default]
    None,
    /// Calibration in progress
    Calibrating,
    /// Skeleton is tracked; joint poses are valid
    Tracked,
    /// Calibration failed, discriminated by sub-reason
    CalibrationFailed(CalibrationFailure),
}

/// One per-frame observation of a user by the tracking middleware
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserObservation {
    pub id: UserId,
    /// First observation of this id
    pub is_new: bool,
    /// Final observation of this id; the id may be reused afterwards
    pub is_lost: bool,
    pub is_visible: bool,
    pub center_of_mass: Point3,
    pub skeleton: SkeletonState,
    pub joints: [JointPose; JOINT_COUNT],
}

/// Estimated floor plane of the scene
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloorPlane {
    pub point: Point3,
    pub normal: Point3,
    pub confidence: f32,
}

/// One tracker frame: user observations plus the depth plane they came from
#[derive(Debug, Clone)]
pub struct TrackerFrame {
    pub observations: Vec<UserObservation>,
    pub depth: SensorFrame,
    pub floor: Option<FloorPlane>,
    pub timestamp_us: u64,
}

/// Entry point of a sensor driver: enumeration and open-by-selector
pub trait SensorDriver: Send + Sync {
    /// List available devices without opening any handle
    fn devices(&self) -> Vec<DeviceDescriptor>;

    /// Open a device by selector
    fn open(&self, selector: &DeviceSelector) -> DriverResult<Box<dyn DeviceHandle>>;
}

/// An open device: sub-stream creation plus device-wide toggles
pub trait DeviceHandle: Send {
    fn descriptor(&self) -> DeviceDescriptor;

    /// Create a sub-stream for one sensor type
    fn create_stream(&mut self, sensor: SensorType) -> DriverResult<Box<dyn StreamHandle>>;

    /// Enable or disable depth/color timestamp synchronization
    fn set_depth_color_sync(&mut self, enabled: bool) -> DriverResult<()>;

    /// Whether depth-to-color registration is available on this device
    fn registration_supported(&self) -> bool;

    fn set_registration_enabled(&mut self, enabled: bool) -> DriverResult<()>;

    fn registration_enabled(&self) -> bool;

    /// Create a recorder sink writing to the given session path
    fn create_recorder(&mut self, path: &Path) -> DriverResult<Box<dyn RecorderSink>>;

    /// Bind the tracking middleware to this device
    fn create_user_tracker(&mut self) -> DriverResult<Box<dyn TrackerHandle>>;
}

/// An open sub-stream of one sensor
pub trait StreamHandle: Send {
    fn sensor_type(&self) -> SensorType;

    fn video_mode(&self) -> VideoMode;

    /// Negotiate a new video mode; on rejection the previous mode stays
    /// active and an error is returned
    fn set_video_mode(&mut self, mode: VideoMode) -> DriverResult<()>;

    fn set_mirroring(&mut self, enabled: bool) -> DriverResult<()>;

    fn mirroring(&self) -> bool;

    /// Begin producing frames
    fn start(&mut self) -> DriverResult<()>;

    /// Stop producing frames; no frame is readable afterwards
    fn stop(&mut self);

    /// Read one frame if ready; never blocks
    fn poll_frame(&mut self) -> DriverResult<Option<SensorFrame>>;

    /// Project a depth pixel into world coordinates using the stream's
    /// intrinsic calibration
    fn depth_to_world(&self, x: u32, y: u32, depth_mm: u16) -> Point3;
}

/// Recorder sink the device forwards captured frames into
pub trait RecorderSink: Send {
    /// Register a stream that will contribute frames
    fn attach(&mut self, sensor: SensorType, mode: VideoMode) -> DriverResult<()>;

    /// Append one captured frame
    fn write_frame(&mut self, frame: &SensorFrame) -> DriverResult<()>;

    /// Flush and close the session file
    fn finish(&mut self) -> DriverResult<()>;
}

/// The tracking-middleware handle bound to an open device
pub trait TrackerHandle: Send {
    /// Read one tracker frame if ready; never blocks
    fn poll_frame(&mut self) -> DriverResult<Option<TrackerFrame>>;

    /// Ask the middleware to begin deriving a skeleton for this id
    fn start_skeleton_tracking(&mut self, id: UserId) -> DriverResult<()>;

    /// Stop deriving a skeleton for this id
    fn stop_skeleton_tracking(&mut self, id: UserId) -> DriverResult<()>;

    fn set_smoothing_factor(&mut self, factor: f32);

    fn smoothing_factor(&self) -> f32;
}

// Field of view of the reference sensor, used by the in-tree drivers for
// the pinhole depth-to-world projection.
const HORIZONTAL_FOV_RAD: f32 = 1.0144;
const VERTICAL_FOV_RAD: f32 = 0.7898;

/// Pinhole projection of a depth pixel into world millimeters
///
/// Shared by the in-tree drivers; a hardware driver would substitute its
/// device calibration here.
pub(crate) fn pinhole_depth_to_world(mode: &VideoMode, x: u32, y: u32, depth_mm: u16) -> Point3 {
    let z = depth_mm as f32;
    let w = mode.width as f32;
    let h = mode.height as f32;
    let fx = w / (2.0 * (HORIZONTAL_FOV_RAD / 2.0).tan());
    let fy = h / (2.0 * (VERTICAL_FOV_RAD / 2.0).tan());
    Point3 {
        x: (x as f32 - w / 2.0) * z / fx,
        y: -(y as f32 - h / 2.0) * z / fy,
        z,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_expected_len() {
        let frame = SensorFrame {
            sensor: SensorType::Depth,
            mode: VideoMode {
                width: 4,
                height: 2,
                fps: 30,
            },
            format: FrameFormat::DepthMm,
            data: vec![0; 16],
            timestamp_us: 0,
        };
        assert_eq!(frame.expected_len(), 16);
    }

    #[test]
    fn test_pinhole_center_pixel_projects_onto_axis() {
        let mode = VideoMode {
            width: 640,
            height: 480,
            fps: 30,
        };
        let p = pinhole_depth_to_world(&mode, 320, 240, 2000);
        assert_eq!(p.x, 0.0);
        assert_eq!(p.y, 0.0);
        assert_eq!(p.z, 2000.0);
    }

    #[test]
    fn test_pinhole_left_of_center_is_negative_x() {
        let mode = VideoMode {
            width: 640,
            height: 480,
            fps: 30,
        };
        let p = pinhole_depth_to_world(&mode, 0, 240, 1000);
        assert!(p.x < 0.0);
        assert_eq!(p.z, 1000.0);
    }
}
