// SPDX-License-Identifier: GPL-3.0-only

//! Crate-wide constants

use std::time::Duration;

use crate::driver::VideoMode;

/// Number of joints in a tracked skeleton
pub const JOINT_COUNT: usize = 15;

/// Lower bound of the usable depth range in millimeters
///
/// Values below this are clamped by the remap utility's default clipping.
pub const DEPTH_MIN_USABLE_MM: u16 = 500;

/// Upper bound of the usable depth range in millimeters
pub const DEPTH_MAX_USABLE_MM: u16 = 4000;

/// Default skeleton smoothing factor applied to a new user tracker
pub const DEFAULT_SMOOTHING_FACTOR: f32 = 0.9;

/// Bounded wait between acquisition polls when no stream was ready
///
/// Short enough that a stop signal is observed promptly, long enough to
/// avoid busy-waiting the acquisition thread.
pub const ACQUISITION_IDLE_WAIT: Duration = Duration::from_millis(2);

/// Default video mode negotiated for depth and IR streams
pub const DEFAULT_DEPTH_MODE: VideoMode = VideoMode {
    width: 640,
    height: 480,
    fps: 30,
};

/// Default video mode negotiated for color streams
pub const DEFAULT_COLOR_MODE: VideoMode = VideoMode {
    width: 640,
    height: 480,
    fps: 30,
};
