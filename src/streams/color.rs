// SPDX-License-Identifier: GPL-3.0-only

//! Color stream: channel-interleaved 24-bit RGB plane

use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::device::{Device, RecordingState};
use crate::double_buffer::{DoubleBuffer, FrontGuard, PlaneDims};
use crate::driver::{FrameFormat, SensorFrame, SensorType, VideoMode};
use crate::errors::StreamResult;
use crate::streams::{AcquireStream, StreamCore};

pub(crate) struct ColorInner {
    core: StreamCore,
    pixels: DoubleBuffer<u8>,
}

impl ColorInner {
    fn decode(&self, frame: &SensorFrame) {
        // Only 24-bit packed RGB is accepted; anything else is dropped.
        match frame.format {
            FrameFormat::Rgb888 => {
                self.pixels.allocate(frame.mode.width, frame.mode.height, 3);
                let mut back = self.pixels.back();
                if back.len() == frame.data.len() {
                    back.copy_from_slice(&frame.data);
                    drop(back);
                    self.pixels.swap();
                } else {
                    warn!(mode = %frame.mode, "color frame does not match allocated plane, dropping frame");
                }
            }
            other => {
                warn!(format = ?other, "unexpected color pixel format, dropping frame");
            }
        }
    }
}

impl AcquireStream for ColorInner {
    fn acquire_one(&self, recorder: &Mutex<Option<RecordingState>>) -> bool {
        self.core.acquire_with(recorder, |frame| self.decode(frame))
    }

    fn update_edge(&self) {
        self.core.update_edge();
    }

    fn shutdown(&self) {
        self.core.shutdown();
    }

    fn sensor_type(&self) -> SensorType {
        self.core.sensor_type()
    }

    fn current_mode(&self) -> VideoMode {
        self.core.video_mode()
    }
}

/// Color sub-stream of an open device
pub struct ColorStream {
    inner: Arc<ColorInner>,
}

impl ColorStream {
    /// Create the color sub-stream and register it with the device
    pub fn setup(device: &Device) -> StreamResult<Self> {
        let core = StreamCore::setup(device, SensorType::Color)?;
        let inner = Arc::new(ColorInner {
            core,
            pixels: DoubleBuffer::new(),
        });
        device.register_stream(inner.clone());
        Ok(Self { inner })
    }

    pub fn start(&self) -> StreamResult<()> {
        self.inner.core.start()
    }

    /// Stop the sub-stream and remove it from the owning device
    pub fn exit(&self) {
        let me: Arc<dyn AcquireStream> = self.inner.clone();
        self.inner.core.exit_from_device(&me);
    }

    pub fn width(&self) -> u32 {
        self.inner.core.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.core.height()
    }

    pub fn fps(&self) -> u32 {
        self.inner.core.fps()
    }

    pub fn video_mode(&self) -> VideoMode {
        self.inner.core.video_mode()
    }

    pub fn set_size(&self, width: u32, height: u32) -> StreamResult<()> {
        self.inner.core.set_size(width, height)
    }

    pub fn set_fps(&self, fps: u32) -> StreamResult<()> {
        self.inner.core.set_fps(fps)
    }

    pub fn set_mirror(&self, enabled: bool) -> StreamResult<()> {
        self.inner.core.set_mirror(enabled)
    }

    pub fn mirror(&self) -> bool {
        self.inner.core.mirror()
    }

    pub fn is_frame_new(&self) -> bool {
        self.inner.core.is_frame_new()
    }

    /// Interleaved RGB front plane; empty until the first frame decoded
    pub fn pixels(&self) -> FrontGuard<'_, u8> {
        self.inner.pixels.front()
    }

    pub fn pixel_dims(&self) -> Option<PlaneDims> {
        self.inner.pixels.dims()
    }
}
