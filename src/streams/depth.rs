// SPDX-License-Identifier: GPL-3.0-only

//! Depth stream: raw millimeter distances with on-demand 8-bit views

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU16, Ordering};

use tracing::warn;

use crate::constants::{DEPTH_MAX_USABLE_MM, DEPTH_MIN_USABLE_MM};
use crate::device::{Device, RecordingState};
use crate::double_buffer::{DoubleBuffer, FrontGuard, PlaneDims};
use crate::driver::{FrameFormat, Point3, SensorFrame, SensorType, VideoMode};
use crate::errors::StreamResult;
use crate::format_converters::{bytes_as_u16, remap_depth_to_range};
use crate::streams::{AcquireStream, StreamCore};

pub(crate) struct DepthInner {
    core: StreamCore,
    pixels: DoubleBuffer<u16>,
    near_clip: AtomicU16,
    far_clip: AtomicU16,
}

impl DepthInner {
    fn decode(&self, frame: &SensorFrame) {
        match frame.format {
            FrameFormat::DepthMm | FrameFormat::Gray16 => {
                let shorts = bytes_as_u16(&frame.data);
                self.pixels.allocate(frame.mode.width, frame.mode.height, 1);
                let mut back = self.pixels.back();
                if back.len() == shorts.len() {
                    back.copy_from_slice(&shorts);
                    drop(back);
                    self.pixels.swap();
                } else {
                    warn!(mode = %frame.mode, "depth frame does not match allocated plane, dropping frame");
                }
            }
            other => {
                warn!(format = ?other, "unexpected depth pixel format, dropping frame");
            }
        }
    }
}

impl AcquireStream for DepthInner {
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

/// Depth sub-stream of an open device
///
/// The front plane holds raw 16-bit millimeter distances. 8-bit views are
/// derived on demand by [`remapped_pixels`](Self::remapped_pixels); the remap
/// is never cached, so calls with different bounds are independent.
pub struct DepthStream {
    inner: Arc<DepthInner>,
}

impl DepthStream {
    /// Create the depth sub-stream and register it with the device
    pub fn setup(device: &Device) -> StreamResult<Self> {
        let core = StreamCore::setup(device, SensorType::Depth)?;
        let inner = Arc::new(DepthInner {
            core,
            pixels: DoubleBuffer::new(),
            near_clip: AtomicU16::new(DEPTH_MIN_USABLE_MM),
            far_clip: AtomicU16::new(DEPTH_MAX_USABLE_MM),
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

    /// Raw front plane in millimeters; empty until the first frame decoded
    pub fn raw_pixels(&self) -> FrontGuard<'_, u16> {
        self.inner.pixels.front()
    }

    /// Dimensions of the decoded plane, fixed by the first frame
    pub fn pixel_dims(&self) -> Option<PlaneDims> {
        self.inner.pixels.dims()
    }

    /// Default clipping bounds applied by [`remapped`](Self::remapped)
    pub fn set_depth_clipping(&self, near_mm: u16, far_mm: u16) {
        self.inner.near_clip.store(near_mm, Ordering::Relaxed);
        self.inner.far_clip.store(far_mm, Ordering::Relaxed);
    }

    /// 8-bit view of the front plane using the stored clipping bounds
    pub fn remapped(&self) -> Vec<u8> {
        let near = self.inner.near_clip.load(Ordering::Relaxed);
        let far = self.inner.far_clip.load(Ordering::Relaxed);
        self.remapped_pixels(near, far, false)
    }

    /// 8-bit view of the front plane with explicit bounds
    pub fn remapped_pixels(&self, near_mm: u16, far_mm: u16, invert: bool) -> Vec<u8> {
        remap_depth_to_range(&self.raw_pixels(), near_mm, far_mm, invert)
    }

    /// World coordinates of the given pixel, using the current front-plane
    /// depth and the stream's intrinsic calibration
    pub fn world_at(&self, x: u32, y: u32) -> Option<Point3> {
        let dims = self.inner.pixels.dims()?;
        if x >= dims.width || y >= dims.height {
            return None;
        }
        let depth_mm = {
            let front = self.inner.pixels.front();
            front[(y * dims.width + x) as usize]
        };
        Some(
            self.inner
                .core
                .with_handle(|handle| handle.depth_to_world(x, y, depth_mm)),
        )
    }
}
