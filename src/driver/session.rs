// SPDX-License-Identifier: GPL-3.0-only

//! Recorded-session driver: capture to and replay from session documents
//!
//! A session is a serde_json document holding the device identity, every
//! recorded stream with its frames, and optionally a tracker track. The
//! format belongs to this driver alone; the core treats session paths as
//! opaque and passes them straight through.
//!
//! Replay paces frames by their recorded timestamps; pacing can be disabled
//! (every poll yields the next frame) for tests and batch processing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::driver::{
    DeviceDescriptor, DeviceHandle, DeviceSelector, FloorPlane, FrameFormat, Point3,
    RecorderSink, SensorDriver, SensorFrame, SensorType, StreamHandle, TrackerFrame,
    TrackerHandle, UserId, UserObservation, VideoMode, pinhole_depth_to_world,
};
use crate::errors::{DriverError, DriverResult};
use crate::format_converters::bytes_as_u16;

/// Pixel payload of one recorded frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionPixels {
    /// 8-bit formats, raw bytes
    Bytes(Vec<u8>),
    /// 16-bit formats, one element per pixel
    Shorts(Vec<u16>),
}

impl SessionPixels {
    fn from_frame(frame: &SensorFrame) -> Self {
        if frame.format.bytes_per_pixel() == 2 {
            SessionPixels::Shorts(bytes_as_u16(&frame.data).into_owned())
        } else {
            SessionPixels::Bytes(frame.data.clone())
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            SessionPixels::Bytes(bytes) => bytes.clone(),
            SessionPixels::Shorts(shorts) => bytemuck::cast_slice(shorts).to_vec(),
        }
    }
}

/// One recorded frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFrame {
    pub timestamp_us: u64,
    pub format: FrameFormat,
    pub pixels: SessionPixels,
}

/// One recorded stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStream {
    pub sensor: SensorType,
    pub mode: VideoMode,
    pub frames: Vec<SessionFrame>,
}

/// One recorded tracker frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTrackerFrame {
    pub timestamp_us: u64,
    pub observations: Vec<UserObservation>,
    pub depth: SessionPixels,
    pub floor: Option<FloorPlane>,
}

/// The tracker track of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTrackerTrack {
    pub mode: VideoMode,
    pub frames: Vec<SessionTrackerFrame>,
}

/// A full recorded session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    pub device: DeviceDescriptor,
    pub streams: Vec<SessionStream>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<SessionTrackerTrack>,
}

impl SessionDocument {
    pub fn load(path: &Path) -> DriverResult<SessionDocument> {
        let text = fs::read_to_string(path)
            .map_err(|err| DriverError::Io(format!("{}: {}", path.display(), err)))?;
        serde_json::from_str(&text)
            .map_err(|err| DriverError::InvalidData(format!("{}: {}", path.display(), err)))
    }

    pub fn save(&self, path: &Path) -> DriverResult<()> {
        let text = serde_json::to_string(self)
            .map_err(|err| DriverError::InvalidData(err.to_string()))?;
        fs::write(path, text).map_err(|err| DriverError::Io(format!("{}: {}", path.display(), err)))
    }
}

/// Driver replaying recorded sessions
pub struct SessionDriver {
    paced: bool,
}

impl SessionDriver {
    /// Frames delivered at their recorded timing
    pub fn new() -> Self {
        Self { paced: true }
    }

    /// Every poll yields the next recorded frame; used by tests
    pub fn unpaced() -> Self {
        Self { paced: false }
    }
}

impl Default for SessionDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorDriver for SessionDriver {
    fn devices(&self) -> Vec<DeviceDescriptor> {
        // Sessions are opened by path, not enumerated.
        Vec::new()
    }

    fn open(&self, selector: &DeviceSelector) -> DriverResult<Box<dyn DeviceHandle>> {
        match selector {
            DeviceSelector::SessionPath(path) => {
                let document = Arc::new(SessionDocument::load(path)?);
                debug!(path = %path.display(), streams = document.streams.len(), "session opened");
                Ok(Box::new(SessionDevice {
                    document,
                    paced: self.paced,
                    registration: false,
                }))
            }
            _ => Err(DriverError::DeviceNotFound(
                "the session driver opens recorded sessions by path".to_string(),
            )),
        }
    }
}

struct SessionDevice {
    document: Arc<SessionDocument>,
    paced: bool,
    registration: bool,
}

impl DeviceHandle for SessionDevice {
    fn descriptor(&self) -> DeviceDescriptor {
        self.document.device.clone()
    }

    fn create_stream(&mut self, sensor: SensorType) -> DriverResult<Box<dyn StreamHandle>> {
        let index = self
            .document
            .streams
            .iter()
            .position(|s| s.sensor == sensor)
            .ok_or(DriverError::UnsupportedSensor(sensor))?;

        let mode = self.document.streams[index].mode;
        Ok(Box::new(SessionStreamHandle {
            document: Arc::clone(&self.document),
            stream_index: index,
            sensor,
            mode,
            cursor: 0,
            started: false,
            paced: self.paced,
            started_at: None,
            mirror: false,
        }))
    }

    fn set_depth_color_sync(&mut self, _enabled: bool) -> DriverResult<()> {
        Ok(())
    }

    fn registration_supported(&self) -> bool {
        false
    }

    fn set_registration_enabled(&mut self, enabled: bool) -> DriverResult<()> {
        if enabled {
            return Err(DriverError::Other(
                "recorded sessions do not support registration".to_string(),
            ));
        }
        self.registration = false;
        Ok(())
    }

    fn registration_enabled(&self) -> bool {
        self.registration
    }

    fn create_recorder(&mut self, path: &Path) -> DriverResult<Box<dyn RecorderSink>> {
        Ok(Box::new(SessionRecorder::create(
            path.to_path_buf(),
            self.descriptor(),
        )))
    }

    fn create_user_tracker(&mut self) -> DriverResult<Box<dyn TrackerHandle>> {
        if self.document.tracker.is_none() {
            return Err(DriverError::Other(
                "recorded session has no tracker track".to_string(),
            ));
        }
        Ok(Box::new(SessionTrackerHandle {
            document: Arc::clone(&self.document),
            cursor: 0,
            paced: self.paced,
            started_at: None,
            smoothing: 0.0,
        }))
    }
}

struct SessionStreamHandle {
    document: Arc<SessionDocument>,
    stream_index: usize,
    sensor: SensorType,
    mode: VideoMode,
    cursor: usize,
    started: bool,
    paced: bool,
    started_at: Option<Instant>,
    mirror: bool,
}

impl StreamHandle for SessionStreamHandle {
    fn sensor_type(&self) -> SensorType {
        self.sensor
    }

    fn video_mode(&self) -> VideoMode {
        self.mode
    }

    fn set_video_mode(&mut self, mode: VideoMode) -> DriverResult<()> {
        // A replay is fixed to the mode it was captured with.
        if mode == self.mode {
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
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
    }

    fn poll_frame(&mut self) -> DriverResult<Option<SensorFrame>> {
        if !self.started {
            return Ok(None);
        }

        let stream = &self.document.streams[self.stream_index];
        let Some(frame) = stream.frames.get(self.cursor) else {
            return Ok(None); // end of session
        };

        if self.paced {
            let base = stream.frames[0].timestamp_us;
            let due_us = frame.timestamp_us.saturating_sub(base);
            let elapsed_us = self
                .started_at
                .map(|t| t.elapsed().as_micros() as u64)
                .unwrap_or(0);
            if elapsed_us < due_us {
                return Ok(None);
            }
        }

        self.cursor += 1;
        let mut data = frame.pixels.to_bytes();
        if self.mirror {
            mirror_rows(&mut data, self.mode, frame.format.bytes_per_pixel());
        }

        Ok(Some(SensorFrame {
            sensor: self.sensor,
            mode: self.mode,
            format: frame.format,
            data,
            timestamp_us: frame.timestamp_us,
        }))
    }

    fn depth_to_world(&self, x: u32, y: u32, depth_mm: u16) -> Point3 {
        pinhole_depth_to_world(&self.mode, x, y, depth_mm)
    }
}

/// Horizontally flip each row in place
fn mirror_rows(data: &mut [u8], mode: VideoMode, bytes_per_pixel: usize) {
    let row_bytes = mode.width as usize * bytes_per_pixel;
    for row in data.chunks_exact_mut(row_bytes) {
        let mut left = 0;
        let mut right = mode.width as usize - 1;
        while left < right {
            for b in 0..bytes_per_pixel {
                row.swap(left * bytes_per_pixel + b, right * bytes_per_pixel + b);
            }
            left += 1;
            right -= 1;
        }
    }
}

struct SessionTrackerHandle {
    document: Arc<SessionDocument>,
    cursor: usize,
    paced: bool,
    started_at: Option<Instant>,
    smoothing: f32,
}

impl TrackerHandle for SessionTrackerHandle {
    fn poll_frame(&mut self) -> DriverResult<Option<TrackerFrame>> {
        let track = self
            .document
            .tracker
            .as_ref()
            .ok_or_else(|| DriverError::Other("session has no tracker track".to_string()))?;

        let Some(frame) = track.frames.get(self.cursor) else {
            return Ok(None);
        };

        if self.paced {
            let started_at = *self.started_at.get_or_insert_with(Instant::now);
            let base = track.frames[0].timestamp_us;
            let due_us = frame.timestamp_us.saturating_sub(base);
            if (started_at.elapsed().as_micros() as u64) < due_us {
                return Ok(None);
            }
        }

        self.cursor += 1;
        Ok(Some(TrackerFrame {
            observations: frame.observations.clone(),
            depth: SensorFrame {
                sensor: SensorType::Depth,
                mode: track.mode,
                format: FrameFormat::DepthMm,
                data: frame.depth.to_bytes(),
                timestamp_us: frame.timestamp_us,
            },
            floor: frame.floor,
            timestamp_us: frame.timestamp_us,
        }))
    }

    fn start_skeleton_tracking(&mut self, id: UserId) -> DriverResult<()> {
        debug!(id, "session replay: skeleton tracking start requested");
        Ok(())
    }

    fn stop_skeleton_tracking(&mut self, id: UserId) -> DriverResult<()> {
        debug!(id, "session replay: skeleton tracking stop requested");
        Ok(())
    }

    fn set_smoothing_factor(&mut self, factor: f32) {
        self.smoothing = factor;
    }

    fn smoothing_factor(&self) -> f32 {
        self.smoothing
    }
}

/// Recorder sink writing captured streams into a session document
pub struct SessionRecorder {
    path: PathBuf,
    device: DeviceDescriptor,
    streams: Vec<SessionStream>,
    finished: bool,
}

impl SessionRecorder {
    pub(crate) fn create(path: PathBuf, device: DeviceDescriptor) -> Self {
        Self {
            path,
            device,
            streams: Vec::new(),
            finished: false,
        }
    }
}

impl RecorderSink for SessionRecorder {
    fn attach(&mut self, sensor: SensorType, mode: VideoMode) -> DriverResult<()> {
        if self.streams.iter().any(|s| s.sensor == sensor) {
            return Ok(());
        }
        self.streams.push(SessionStream {
            sensor,
            mode,
            frames: Vec::new(),
        });
        Ok(())
    }

    fn write_frame(&mut self, frame: &SensorFrame) -> DriverResult<()> {
        let stream = match self.streams.iter_mut().find(|s| s.sensor == frame.sensor) {
            Some(stream) => stream,
            None => {
                // A stream registered after recording started; attach late.
                debug!(sensor = %frame.sensor, "attaching stream to running recording");
                self.streams.push(SessionStream {
                    sensor: frame.sensor,
                    mode: frame.mode,
                    frames: Vec::new(),
                });
                self.streams.last_mut().unwrap()
            }
        };

        stream.frames.push(SessionFrame {
            timestamp_us: frame.timestamp_us,
            format: frame.format,
            pixels: SessionPixels::from_frame(frame),
        });
        Ok(())
    }

    fn finish(&mut self) -> DriverResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let document = SessionDocument {
            device: self.device.clone(),
            streams: std::mem::take(&mut self.streams),
            tracker: None,
        };
        document.save(&self.path)
    }
}

impl Drop for SessionRecorder {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.finish() {
                warn!(path = %self.path.display(), error = %err, "failed to finalize session on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_session() -> SessionDocument {
        SessionDocument {
            device: DeviceDescriptor {
                name: "Recorded".to_string(),
                vendor: "test".to_string(),
                uri: "file:test".to_string(),
            },
            streams: vec![SessionStream {
                sensor: SensorType::Depth,
                mode: VideoMode {
                    width: 2,
                    height: 2,
                    fps: 30,
                },
                frames: vec![
                    SessionFrame {
                        timestamp_us: 0,
                        format: FrameFormat::DepthMm,
                        pixels: SessionPixels::Shorts(vec![500, 1000, 1500, 2000]),
                    },
                    SessionFrame {
                        timestamp_us: 33_333,
                        format: FrameFormat::DepthMm,
                        pixels: SessionPixels::Shorts(vec![600, 1100, 1600, 2100]),
                    },
                ],
            }],
            tracker: None,
        }
    }

    #[test]
    fn test_document_round_trip() {
        let doc = tiny_session();
        let text = serde_json::to_string(&doc).unwrap();
        let back: SessionDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(back.streams[0].mode, doc.streams[0].mode);
        assert_eq!(back.streams[0].frames.len(), 2);
    }

    #[test]
    fn test_unpaced_replay_yields_frames_in_order() {
        let mut device = SessionDevice {
            document: Arc::new(tiny_session()),
            paced: false,
            registration: false,
        };
        let mut stream = device.create_stream(SensorType::Depth).unwrap();
        stream.start().unwrap();

        let first = stream.poll_frame().unwrap().unwrap();
        let second = stream.poll_frame().unwrap().unwrap();
        assert_eq!(first.timestamp_us, 0);
        assert_eq!(second.timestamp_us, 33_333);
        assert_eq!(first.data, vec![244, 1, 232, 3, 220, 5, 208, 7]);
        assert!(stream.poll_frame().unwrap().is_none(), "session must end");
    }

    #[test]
    fn test_missing_sensor_is_unsupported() {
        let mut device = SessionDevice {
            document: Arc::new(tiny_session()),
            paced: false,
            registration: false,
        };
        assert!(matches!(
            device.create_stream(SensorType::Color),
            Err(DriverError::UnsupportedSensor(SensorType::Color))
        ));
    }

    #[test]
    fn test_mirror_rows_flips_pixels() {
        let mode = VideoMode {
            width: 3,
            height: 1,
            fps: 30,
        };
        let mut data = vec![1u8, 2, 3];
        mirror_rows(&mut data, mode, 1);
        assert_eq!(data, vec![3, 2, 1]);
    }
}
