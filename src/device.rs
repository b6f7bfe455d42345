// SPDX-License-Identifier: GPL-3.0-only

//! Device lifecycle and the acquisition thread
//!
//! A [`Device`] owns the opened driver handle and the collection of active
//! streams. [`Device::start`] spawns the acquisition loop, which polls every
//! registered stream with a bounded wait and hands ready frames to the
//! stream's decoder. The main-thread [`Device::update`] turns producer-side
//! timestamps into the consumer-visible frame-new edge; it never blocks
//! beyond uncontended mutex acquisition.
//!
//! # Teardown ordering
//!
//! `exit()` stops any active recording, signals and joins the acquisition
//! thread, exits every still-registered stream exactly once, and only then
//! tears down the native device handle — the loop can never dereference a
//! closed handle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::constants::ACQUISITION_IDLE_WAIT;
use crate::driver::{
    DeviceDescriptor, DeviceHandle, DeviceSelector, RecorderSink, SensorDriver,
};
use crate::errors::{DeviceError, DeviceResult};
use crate::frame_loop::{LoopAction, PollLoop};
use crate::streams::AcquireStream;

/// An in-flight session recording
pub(crate) struct RecordingState {
    pub(crate) sink: Box<dyn RecorderSink>,
    pub(crate) path: PathBuf,
}

/// State shared between the device, its streams and the acquisition thread
pub(crate) struct DeviceShared {
    /// Native handle; `None` once the device has exited
    pub(crate) handle: Mutex<Option<Box<dyn DeviceHandle>>>,
    streams: Mutex<Vec<Arc<dyn AcquireStream>>>,
    pub(crate) recorder: Mutex<Option<RecordingState>>,
    open: AtomicBool,
    descriptor: DeviceDescriptor,
}

impl DeviceShared {
    pub(crate) fn remove_stream(&self, stream: &Arc<dyn AcquireStream>) {
        self.streams
            .lock()
            .unwrap()
            .retain(|s| !Arc::ptr_eq(s, stream));
    }
}

/// An open sensor device
pub struct Device {
    shared: Arc<DeviceShared>,
    acquisition: Option<PollLoop>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("descriptor", &self.shared.descriptor)
            .field("is_open", &self.is_open())
            .finish()
    }
}

impl Device {
    /// List available devices without opening any handle
    pub fn list_devices(driver: &dyn SensorDriver) -> Vec<DeviceDescriptor> {
        driver.devices()
    }

    /// Open a device by selector
    ///
    /// Fails without leaving partial state: an out-of-range index carries the
    /// available-device listing, and a handle that cannot enable depth/color
    /// synchronization is closed again before the error is returned.
    pub fn open(driver: &dyn SensorDriver, selector: DeviceSelector) -> DeviceResult<Device> {
        let available = driver.devices();
        match &selector {
            DeviceSelector::AnyDevice if available.is_empty() => {
                return Err(DeviceError::NoDevices);
            }
            DeviceSelector::Index(index) if *index >= available.len() => {
                return Err(DeviceError::InvalidIndex {
                    index: *index,
                    available,
                });
            }
            _ => {}
        }

        let mut handle = driver.open(&selector).map_err(DeviceError::OpenFailed)?;
        handle
            .set_depth_color_sync(true)
            .map_err(DeviceError::OpenFailed)?;

        let descriptor = handle.descriptor();
        info!(device = %descriptor.name, uri = %descriptor.uri, "device opened");

        Ok(Device {
            shared: Arc::new(DeviceShared {
                handle: Mutex::new(Some(handle)),
                streams: Mutex::new(Vec::new()),
                recorder: Mutex::new(None),
                open: AtomicBool::new(true),
                descriptor,
            }),
            acquisition: None,
        })
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.shared.descriptor
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Number of currently registered streams
    pub fn stream_count(&self) -> usize {
        self.shared.streams.lock().unwrap().len()
    }

    /// Spawn the acquisition thread; no-op while one is already running
    pub fn start(&mut self) {
        if self
            .acquisition
            .as_ref()
            .map(|l| l.is_running())
            .unwrap_or(false)
        {
            return;
        }

        let shared = Arc::clone(&self.shared);
        self.acquisition = Some(PollLoop::start(
            "acquisition",
            ACQUISITION_IDLE_WAIT,
            move || {
                if !shared.open.load(Ordering::SeqCst) {
                    return LoopAction::Stop;
                }
                let streams: Vec<_> = shared.streams.lock().unwrap().clone();
                if streams.is_empty() {
                    return LoopAction::Idle;
                }
                let mut produced = false;
                for stream in &streams {
                    if stream.acquire_one(&shared.recorder) {
                        produced = true;
                    }
                }
                if produced {
                    LoopAction::Produced
                } else {
                    LoopAction::Idle
                }
            },
        ));
    }

    /// Per-tick edge recomputation
    ///
    /// Compares each stream's producer-side timestamp against the timestamp
    /// the consumer last observed, then advances the consumer side. This
    /// decouples "a frame was captured" from "the consumer acknowledged it"
    /// without a queue.
    pub fn update(&self) {
        let streams: Vec<_> = self.shared.streams.lock().unwrap().clone();
        for stream in &streams {
            stream.update_edge();
        }
    }

    /// Whether the device supports depth-to-color registration
    pub fn registration_supported(&self) -> bool {
        self.shared
            .handle
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| h.registration_supported())
            .unwrap_or(false)
    }

    pub fn set_registration_enabled(&self, enabled: bool) -> DeviceResult<()> {
        let mut guard = self.shared.handle.lock().unwrap();
        let handle = guard.as_mut().ok_or(DeviceError::NotOpen)?;
        handle
            .set_registration_enabled(enabled)
            .map_err(DeviceError::OpenFailed)
    }

    pub fn registration_enabled(&self) -> bool {
        self.shared
            .handle
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| h.registration_enabled())
            .unwrap_or(false)
    }

    /// Attach every registered stream to a recorder sink
    ///
    /// A second call while a recording is active is a no-op and returns the
    /// active recording's path. Without an explicit path a timestamped
    /// filename in the working directory is used.
    pub fn start_recording(&self, path: Option<PathBuf>) -> DeviceResult<PathBuf> {
        let mut slot = self.shared.recorder.lock().unwrap();
        if let Some(active) = slot.as_ref() {
            return Ok(active.path.clone());
        }

        let path = path.unwrap_or_else(default_recording_path);

        let mut handle_guard = self.shared.handle.lock().unwrap();
        let handle = handle_guard.as_mut().ok_or(DeviceError::NotOpen)?;
        let mut sink = handle
            .create_recorder(&path)
            .map_err(DeviceError::Recording)?;

        for stream in self.shared.streams.lock().unwrap().iter() {
            sink.attach(stream.sensor_type(), stream.current_mode())
                .map_err(DeviceError::Recording)?;
        }

        info!(path = %path.display(), "recording started");
        *slot = Some(RecordingState {
            sink,
            path: path.clone(),
        });
        Ok(path)
    }

    /// Finalize the active recording; no-op when none is active
    pub fn stop_recording(&self) {
        let mut slot = self.shared.recorder.lock().unwrap();
        if let Some(mut recording) = slot.take() {
            if let Err(err) = recording.sink.finish() {
                warn!(error = %err, "failed to finalize recording");
            }
            info!(path = %recording.path.display(), "recording stopped");
        }
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recorder.lock().unwrap().is_some()
    }

    /// Exit the device; safe to call multiple times
    pub fn exit(&mut self) {
        if !self.shared.open.swap(false, Ordering::SeqCst) {
            return;
        }

        self.stop_recording();

        // Join the acquisition thread before any native teardown.
        if let Some(mut acquisition) = self.acquisition.take() {
            acquisition.stop();
        }

        let streams: Vec<_> = {
            let mut guard = self.shared.streams.lock().unwrap();
            std::mem::take(&mut *guard)
        };
        for stream in &streams {
            stream.shutdown();
        }

        *self.shared.handle.lock().unwrap() = None;
        info!(device = %self.shared.descriptor.name, "device exited");
    }

    pub(crate) fn shared(&self) -> &Arc<DeviceShared> {
        &self.shared
    }

    pub(crate) fn register_stream(&self, stream: Arc<dyn AcquireStream>) {
        self.shared.streams.lock().unwrap().push(stream);
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.exit();
    }
}

fn default_recording_path() -> PathBuf {
    PathBuf::from(format!(
        "{}.session.json",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}
