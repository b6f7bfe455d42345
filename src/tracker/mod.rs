// SPDX-License-Identifier: GPL-3.0-only

//! User tracker: registry, lifecycle events and the tracker poll loop
//!
//! The tracker consumes per-frame user observations from the tracking
//! middleware on its own poll loop, independent of the device's acquisition
//! thread. Per user id the observations drive a small state machine:
//!
//! ```text
//! unknown --(is_new)--> tracked --(is_lost)--> removed
//! tracked --(neither)--> tracked   (joint data refreshed)
//! ```
//!
//! On discovery a [`User`] is allocated, inserted into the registry and
//! skeleton tracking is requested from the middleware; on loss the "user
//! lost" event is emitted strictly before the registry entry is erased, so
//! subscribers can read final state. All registry mutation and the snapshot
//! list rebuild happen under a single mutex held for one frame's processing;
//! consumer reads take the same mutex.
//!
//! Each tracker frame also carries the depth plane it was derived from,
//! which is decoded into the tracker's own double buffer.

mod user;

pub use user::{Joint, JointType, User};

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::constants::{ACQUISITION_IDLE_WAIT, DEFAULT_SMOOTHING_FACTOR};
use crate::device::Device;
use crate::double_buffer::{DoubleBuffer, FrontGuard, PlaneDims};
use crate::driver::{
    FloorPlane, FrameFormat, SensorFrame, TrackerFrame, TrackerHandle, UserId,
};
use crate::errors::{TrackerError, TrackerResult};
use crate::format_converters::{bytes_as_u16, remap_depth_to_range};
use crate::frame_loop::{LoopAction, PollLoop};
use crate::streams::check_full_frame;

/// Shared handle to a tracked user
pub type UserRef = Arc<Mutex<User>>;

/// Lifecycle notification fanned out to subscribers
#[derive(Clone)]
pub enum UserEvent {
    /// A user entered the registry; carries the new user
    Discovered(UserRef),
    /// A user left the registry; carries the outgoing user with final state
    Lost(UserRef),
}

/// Registry plus the insertion-ordered snapshot used for indexed iteration
#[derive(Default)]
struct TrackerState {
    users: HashMap<UserId, UserRef>,
    order: Vec<UserRef>,
}

struct TrackerInner {
    handle: Mutex<Box<dyn TrackerHandle>>,
    state: Mutex<TrackerState>,
    pixels: DoubleBuffer<u16>,
    floor: Mutex<Option<FloorPlane>>,
    subscribers: Mutex<Vec<mpsc::Sender<UserEvent>>>,
}

impl TrackerInner {
    /// Apply one tracker frame: registry update under the state mutex, then
    /// the depth plane decode
    fn process_frame(&self, handle: &mut dyn TrackerHandle, frame: TrackerFrame) {
        {
            let mut state = self.state.lock().unwrap();
            state.order.clear();

            for obs in &frame.observations {
                let user = if obs.is_new {
                    let user: UserRef = Arc::new(Mutex::new(User::new(obs.id)));
                    state.users.insert(obs.id, Arc::clone(&user));
                    if let Err(err) = handle.start_skeleton_tracking(obs.id) {
                        warn!(id = obs.id, error = %err, "failed to start skeleton tracking");
                    }
                    user
                } else if obs.is_lost {
                    if let Some(user) = state.users.get(&obs.id).cloned() {
                        // Subscribers read final state; erase strictly after.
                        self.emit(UserEvent::Lost(Arc::clone(&user)));
                        if let Err(err) = handle.stop_skeleton_tracking(obs.id) {
                            warn!(id = obs.id, error = %err, "failed to stop skeleton tracking");
                        }
                        state.users.remove(&obs.id);
                        debug!(id = obs.id, "user lost");
                    }
                    continue;
                } else {
                    match state.users.get(&obs.id).cloned() {
                        Some(user) => user,
                        None => {
                            warn!(id = obs.id, "observation for unknown user, skipping");
                            continue;
                        }
                    }
                };

                user.lock().unwrap().apply_observation(obs);
                state.order.push(Arc::clone(&user));

                if obs.is_new {
                    debug!(id = obs.id, "user discovered");
                    self.emit(UserEvent::Discovered(user));
                }
            }
        }

        self.decode_depth(&frame.depth);
        *self.floor.lock().unwrap() = frame.floor;
    }

    fn decode_depth(&self, frame: &SensorFrame) {
        check_full_frame(frame);
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
                    warn!(mode = %frame.mode, "tracker depth frame does not match allocated plane, dropping frame");
                }
            }
            other => {
                warn!(format = ?other, "unexpected tracker depth format, dropping frame");
            }
        }
    }

    fn emit(&self, event: UserEvent) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Tracks users over the depth stream of an open device
pub struct UserTracker {
    inner: Arc<TrackerInner>,
    poll: Option<PollLoop>,
}

impl UserTracker {
    /// Bind the tracking middleware to the device
    ///
    /// No frame is processed until [`start`](Self::start) is called, so
    /// subscribers attached in between cannot miss the first discovery.
    pub fn setup(device: &Device) -> TrackerResult<UserTracker> {
        let shared = device.shared();
        let mut guard = shared.handle.lock().unwrap();
        let device_handle = guard.as_mut().ok_or(TrackerError::DeviceGone)?;
        let mut handle = device_handle
            .create_user_tracker()
            .map_err(TrackerError::CreateFailed)?;
        handle.set_smoothing_factor(DEFAULT_SMOOTHING_FACTOR);
        drop(guard);

        let inner = Arc::new(TrackerInner {
            handle: Mutex::new(handle),
            state: Mutex::new(TrackerState::default()),
            pixels: DoubleBuffer::new(),
            floor: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
        });

        info!("user tracker created");
        Ok(UserTracker { inner, poll: None })
    }

    /// Spawn the tracker poll loop; no-op while one is already running
    pub fn start(&mut self) {
        if self.poll.as_ref().map(|p| p.is_running()).unwrap_or(false) {
            return;
        }

        let poll_inner = Arc::clone(&self.inner);
        self.poll = Some(PollLoop::start(
            "user-tracker",
            ACQUISITION_IDLE_WAIT,
            move || {
                let mut handle = poll_inner.handle.lock().unwrap();
                match handle.poll_frame() {
                    Ok(Some(frame)) => {
                        poll_inner.process_frame(&mut **handle, frame);
                        LoopAction::Produced
                    }
                    Ok(None) => LoopAction::Idle,
                    Err(err) => {
                        warn!(error = %err, "tracker frame read failed, dropping frame");
                        LoopAction::Idle
                    }
                }
            },
        ));
        info!("user tracker started");
    }

    /// Users present in the last processed frame
    pub fn user_count(&self) -> usize {
        self.inner.state.lock().unwrap().order.len()
    }

    /// Indexed access into the last frame's snapshot list
    pub fn user_by_index(&self, index: usize) -> Option<UserRef> {
        self.inner.state.lock().unwrap().order.get(index).cloned()
    }

    /// Lookup by middleware-assigned id
    pub fn user_by_id(&self, id: UserId) -> Option<UserRef> {
        self.inner.state.lock().unwrap().users.get(&id).cloned()
    }

    /// Subscribe to discovered/lost notifications
    ///
    /// Dropped receivers are pruned on the next emission.
    pub fn subscribe(&self) -> mpsc::Receiver<UserEvent> {
        let (tx, rx) = mpsc::channel();
        self.inner.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub fn set_smoothing_factor(&self, factor: f32) {
        self.inner
            .handle
            .lock()
            .unwrap()
            .set_smoothing_factor(factor);
    }

    pub fn smoothing_factor(&self) -> f32 {
        self.inner.handle.lock().unwrap().smoothing_factor()
    }

    /// Floor plane estimate from the last tracker frame
    pub fn floor(&self) -> Option<FloorPlane> {
        *self.inner.floor.lock().unwrap()
    }

    /// Raw depth front plane of the last tracker frame
    pub fn depth_pixels(&self) -> FrontGuard<'_, u16> {
        self.inner.pixels.front()
    }

    pub fn depth_dims(&self) -> Option<PlaneDims> {
        self.inner.pixels.dims()
    }

    /// 8-bit view of the tracker's depth plane; per-call, never cached
    pub fn remapped_depth(&self, near_mm: u16, far_mm: u16, invert: bool) -> Vec<u8> {
        remap_depth_to_range(&self.depth_pixels(), near_mm, far_mm, invert)
    }

    /// Evict all users without destroying the tracker
    pub fn clear(&self) {
        let mut handle = self.inner.handle.lock().unwrap();
        let mut state = self.inner.state.lock().unwrap();
        for id in state.users.keys() {
            let _ = handle.stop_skeleton_tracking(*id);
        }
        state.users.clear();
        state.order.clear();
    }

    /// Stop the poll loop and release all users; safe to call multiple times
    pub fn exit(&mut self) {
        if let Some(mut poll) = self.poll.take() {
            poll.stop();
        }

        let mut handle = self.inner.handle.lock().unwrap();
        let mut state = self.inner.state.lock().unwrap();
        for id in state.users.keys() {
            let _ = handle.stop_skeleton_tracking(*id);
        }
        state.users.clear();
        state.order.clear();
        info!("user tracker exited");
    }
}

impl Drop for UserTracker {
    fn drop(&mut self) {
        self.exit();
    }
}
