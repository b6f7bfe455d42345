// SPDX-License-Identifier: GPL-3.0-only

//! Sensor streams
//!
//! Each stream wraps one driver sub-stream, decodes raw frames into a typed
//! double-buffered pixel plane, and tracks the producer-side timestamp the
//! device's `update()` turns into the consumer-visible "frame is new" edge.
//!
//! Three concrete variants exist — [`DepthStream`], [`IrStream`] and
//! [`ColorStream`] — sharing a [`StreamCore`] and unified for the acquisition
//! loop behind the crate-private [`AcquireStream`] trait. Decode behavior is
//! the only variant-specific part and is selected once at stream creation.

mod color;
mod depth;
mod ir;

pub use color::ColorStream;
pub use depth::DepthStream;
pub use ir::IrStream;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{info, warn};

use crate::device::{Device, DeviceShared, RecordingState};
use crate::driver::{SensorFrame, SensorType, StreamHandle, VideoMode};
use crate::errors::{StreamError, StreamResult};

/// Acquisition-side view of a stream, held in the device's collection
pub(crate) trait AcquireStream: Send + Sync {
    /// Poll the driver once; decode, swap and timestamp if a frame was ready.
    /// Returns whether a frame was consumed.
    fn acquire_one(&self, recorder: &Mutex<Option<RecordingState>>) -> bool;

    /// Recompute the consumer-visible frame-new edge
    fn update_edge(&self);

    /// Stop the native sub-stream; idempotent
    fn shutdown(&self);

    fn sensor_type(&self) -> SensorType;

    fn current_mode(&self) -> VideoMode;
}

/// State shared by all stream variants
pub(crate) struct StreamCore {
    sensor: SensorType,
    handle: Mutex<Box<dyn StreamHandle>>,
    device: Weak<DeviceShared>,
    /// Cache of the last negotiated mode
    mode: Mutex<VideoMode>,
    producer_timestamp_us: AtomicU64,
    consumer_timestamp_us: AtomicU64,
    frame_new: AtomicBool,
    exited: AtomicBool,
}

impl StreamCore {
    /// Create the native sub-stream and prime it: mirroring off, mode cached
    pub(crate) fn setup(device: &Device, sensor: SensorType) -> StreamResult<Self> {
        let shared = device.shared();
        let mut device_handle = shared.handle.lock().unwrap();
        let handle = device_handle.as_mut().ok_or(StreamError::DeviceGone)?;

        let mut stream = handle.create_stream(sensor)?;
        stream.set_mirroring(false)?;
        let mode = stream.video_mode();

        info!(sensor = %sensor, mode = %mode, "stream created");

        Ok(Self {
            sensor,
            handle: Mutex::new(stream),
            device: Arc::downgrade(shared),
            mode: Mutex::new(mode),
            producer_timestamp_us: AtomicU64::new(0),
            consumer_timestamp_us: AtomicU64::new(0),
            frame_new: AtomicBool::new(false),
            exited: AtomicBool::new(false),
        })
    }

    pub(crate) fn sensor_type(&self) -> SensorType {
        self.sensor
    }

    pub(crate) fn video_mode(&self) -> VideoMode {
        *self.mode.lock().unwrap()
    }

    pub(crate) fn width(&self) -> u32 {
        self.video_mode().width
    }

    pub(crate) fn height(&self) -> u32 {
        self.video_mode().height
    }

    pub(crate) fn fps(&self) -> u32 {
        self.video_mode().fps
    }

    pub(crate) fn set_size(&self, width: u32, height: u32) -> StreamResult<()> {
        let mut mode = self.video_mode();
        mode.width = width;
        mode.height = height;
        self.apply_mode(mode)
    }

    pub(crate) fn set_fps(&self, fps: u32) -> StreamResult<()> {
        let mut mode = self.video_mode();
        mode.fps = fps;
        self.apply_mode(mode)
    }

    /// Negotiate a mode change; on rejection the previous mode stays active
    fn apply_mode(&self, requested: VideoMode) -> StreamResult<()> {
        let mut handle = self.handle.lock().unwrap();
        match handle.set_video_mode(requested) {
            Ok(()) => {
                *self.mode.lock().unwrap() = handle.video_mode();
                Ok(())
            }
            Err(err) => {
                let current = handle.video_mode();
                warn!(sensor = %self.sensor, requested = %requested, error = %err, "mode change rejected");
                Err(StreamError::ModeRejected { requested, current })
            }
        }
    }

    pub(crate) fn set_mirror(&self, enabled: bool) -> StreamResult<()> {
        self.handle.lock().unwrap().set_mirroring(enabled)?;
        Ok(())
    }

    pub(crate) fn mirror(&self) -> bool {
        self.handle.lock().unwrap().mirroring()
    }

    pub(crate) fn start(&self) -> StreamResult<()> {
        self.handle.lock().unwrap().start()?;
        Ok(())
    }

    pub(crate) fn is_frame_new(&self) -> bool {
        self.frame_new.load(Ordering::Acquire)
    }

    pub(crate) fn with_handle<R>(&self, f: impl FnOnce(&mut dyn StreamHandle) -> R) -> R {
        let mut handle = self.handle.lock().unwrap();
        f(&mut **handle)
    }

    /// Poll, verify, decode and record one frame
    ///
    /// `decode` runs with the raw frame after the full-frame invariant check;
    /// it writes the back plane and swaps.
    pub(crate) fn acquire_with<F>(
        &self,
        recorder: &Mutex<Option<RecordingState>>,
        decode: F,
    ) -> bool
    where
        F: FnOnce(&SensorFrame),
    {
        if self.exited.load(Ordering::SeqCst) {
            return false;
        }

        let frame = {
            let mut handle = self.handle.lock().unwrap();
            match handle.poll_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return false,
                Err(err) => {
                    warn!(sensor = %self.sensor, error = %err, "frame read failed, dropping frame");
                    return false;
                }
            }
        };

        check_full_frame(&frame);
        decode(&frame);
        self.producer_timestamp_us
            .store(frame.timestamp_us, Ordering::Release);

        if let Some(recording) = recorder.lock().unwrap().as_mut() {
            if let Err(err) = recording.sink.write_frame(&frame) {
                warn!(sensor = %self.sensor, error = %err, "failed to record frame");
            }
        }

        true
    }

    /// Frame-new edge: the producer timestamp changed since the consumer
    /// last observed it; observing advances the consumer side
    pub(crate) fn update_edge(&self) {
        let produced = self.producer_timestamp_us.load(Ordering::Acquire);
        let seen = self.consumer_timestamp_us.swap(produced, Ordering::AcqRel);
        self.frame_new.store(produced != seen, Ordering::Release);
    }

    /// Stop the native sub-stream exactly once
    pub(crate) fn shutdown(&self) {
        if self.exited.swap(true, Ordering::SeqCst) {
            return;
        }
        self.handle.lock().unwrap().stop();
        info!(sensor = %self.sensor, "stream exited");
    }

    /// Consumer-initiated exit: leave the owning device's collection, then
    /// stop the sub-stream
    pub(crate) fn exit_from_device(&self, me: &Arc<dyn AcquireStream>) {
        if let Some(shared) = self.device.upgrade() {
            shared.remove_stream(me);
        }
        self.shutdown();
    }
}

/// Fatal invariant: the driver must always deliver full frames
///
/// A cropped frame reaching the decode path means a precondition the core
/// relies on has been broken upstream; this is not recoverable.
pub(crate) fn check_full_frame(frame: &SensorFrame) {
    let expected = frame.expected_len();
    if frame.data.len() != expected {
        panic!(
            "{} frame buffer is {} bytes but mode {} requires {}; cropped frames are not supported",
            frame.sensor,
            frame.data.len(),
            frame.mode,
            expected
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::FrameFormat;

    // Minimal handle so a StreamCore can exist without a device
    struct NullHandle;

    impl StreamHandle for NullHandle {
        fn sensor_type(&self) -> SensorType {
            SensorType::Depth
        }
        fn video_mode(&self) -> VideoMode {
            VideoMode {
                width: 0,
                height: 0,
                fps: 0,
            }
        }
        fn set_video_mode(&mut self, _mode: VideoMode) -> crate::errors::DriverResult<()> {
            Ok(())
        }
        fn set_mirroring(&mut self, _enabled: bool) -> crate::errors::DriverResult<()> {
            Ok(())
        }
        fn mirroring(&self) -> bool {
            false
        }
        fn start(&mut self) -> crate::errors::DriverResult<()> {
            Ok(())
        }
        fn stop(&mut self) {}
        fn poll_frame(&mut self) -> crate::errors::DriverResult<Option<SensorFrame>> {
            Ok(None)
        }
        fn depth_to_world(&self, _x: u32, _y: u32, depth_mm: u16) -> crate::driver::Point3 {
            crate::driver::Point3::new(0.0, 0.0, depth_mm as f32)
        }
    }

    fn bare_core() -> StreamCore {
        StreamCore {
            sensor: SensorType::Depth,
            handle: Mutex::new(Box::new(NullHandle)),
            device: Weak::new(),
            mode: Mutex::new(VideoMode {
                width: 0,
                height: 0,
                fps: 0,
            }),
            producer_timestamp_us: AtomicU64::new(0),
            consumer_timestamp_us: AtomicU64::new(0),
            frame_new: AtomicBool::new(false),
            exited: AtomicBool::new(false),
        }
    }

    #[test]
    fn test_frame_new_edge_fires_only_on_timestamp_change() {
        let core = bare_core();

        // Initial observation of timestamp 100.
        core.producer_timestamp_us.store(100, Ordering::Release);
        core.update_edge();

        // Producer timestamps across the next three ticks: 100, 100, 250.
        let mut edges = Vec::new();
        for ts in [100u64, 100, 250] {
            core.producer_timestamp_us.store(ts, Ordering::Release);
            core.update_edge();
            edges.push(core.is_frame_new());
        }
        assert_eq!(edges, vec![false, false, true]);
    }

    #[test]
    fn test_edge_clears_after_acknowledgement() {
        let core = bare_core();
        core.producer_timestamp_us.store(42, Ordering::Release);
        core.update_edge();
        assert!(core.is_frame_new());
        core.update_edge();
        assert!(!core.is_frame_new(), "edge must clear once acknowledged");
    }

    #[test]
    #[should_panic(expected = "cropped frames are not supported")]
    fn test_cropped_frame_is_fatal() {
        check_full_frame(&SensorFrame {
            sensor: SensorType::Depth,
            mode: VideoMode {
                width: 4,
                height: 4,
                fps: 30,
            },
            format: FrameFormat::DepthMm,
            data: vec![0; 3],
            timestamp_us: 0,
        });
    }
}
