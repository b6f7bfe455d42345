// SPDX-License-Identifier: GPL-3.0-only

//! Infrared stream: 8-bit luminance plane

use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::device::{Device, RecordingState};
use crate::double_buffer::{DoubleBuffer, FrontGuard, PlaneDims};
use crate::driver::{FrameFormat, SensorFrame, SensorType, VideoMode};
use crate::errors::StreamResult;
use crate::format_converters::{bytes_as_u16, ir16_to_gray8_into};
use crate::streams::{AcquireStream, StreamCore};

pub(crate) struct IrInner {
    core: StreamCore,
    pixels: DoubleBuffer<u8>,
}

impl IrInner {
    fn decode(&self, frame: &SensorFrame) {
        self.pixels.allocate(frame.mode.width, frame.mode.height, 1);
        let mut back = self.pixels.back();

        match frame.format {
            // 8-bit gray passes through unchanged.
            FrameFormat::Gray8 if back.len() == frame.data.len() => {
                back.copy_from_slice(&frame.data);
                drop(back);
                self.pixels.swap();
            }
            // 16-bit gray is range-reduced into the 8-bit luminance plane.
            FrameFormat::Gray16 => {
                let shorts = bytes_as_u16(&frame.data);
                if back.len() == shorts.len() {
                    ir16_to_gray8_into(&shorts, &mut back);
                    drop(back);
                    self.pixels.swap();
                } else {
                    warn!(mode = %frame.mode, "ir frame does not match allocated plane, dropping frame");
                }
            }
            FrameFormat::Gray8 => {
                warn!(mode = %frame.mode, "ir frame does not match allocated plane, dropping frame");
            }
            other => {
                warn!(format = ?other, "unexpected ir pixel format, dropping frame");
            }
        }
    }
}

impl AcquireStream for IrInner {
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

/// Infrared sub-stream of an open device
pub struct IrStream {
    inner: Arc<IrInner>,
}

impl IrStream {
    /// Create the IR sub-stream and register it with the device
    pub fn setup(device: &Device) -> StreamResult<Self> {
        let core = StreamCore::setup(device, SensorType::Ir)?;
        let inner = Arc::new(IrInner {
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

    /// 8-bit luminance front plane; empty until the first frame decoded
    pub fn pixels(&self) -> FrontGuard<'_, u8> {
        self.inner.pixels.front()
    }

    pub fn pixel_dims(&self) -> Option<PlaneDims> {
        self.inner.pixels.dims()
    }
}
