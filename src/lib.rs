// SPDX-License-Identifier: MPL-2.0

//! depthsense - depth/IR/color sensor streaming and skeleton tracking
//!
//! This library streams synchronized frames from a 3-D sensor device and
//! derives tracked-user skeletons from the depth stream, for real-time
//! visualization and interaction applications.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`device`]: device lifecycle and the acquisition thread
//! - [`streams`]: typed depth/IR/color streams over double-buffered planes
//! - [`tracker`]: the user registry, lifecycle events and skeleton joints
//! - [`driver`]: the sensor-driver and tracking-middleware trait boundary,
//!   with synthetic and recorded-session implementations in tree
//! - [`double_buffer`]: tear-free two-slot pixel storage
//! - [`format_converters`]: stateless depth remap and pixel conversions
//! - [`config`]: user configuration handling
//!
//! # Example
//!
//! ```no_run
//! use depthsense::driver::synthetic::SyntheticDriver;
//! use depthsense::driver::DeviceSelector;
//! use depthsense::{DepthStream, Device};
//!
//! let driver = SyntheticDriver::new();
//! let mut device = Device::open(&driver, DeviceSelector::AnyDevice).unwrap();
//! let depth = DepthStream::setup(&device).unwrap();
//! depth.start().unwrap();
//! device.start();
//!
//! loop {
//!     device.update();
//!     if depth.is_frame_new() {
//!         let gray = depth.remapped();
//!         // hand `gray` to the renderer
//!         let _ = gray;
//!     }
//! }
//! ```

pub mod config;
pub mod constants;
pub mod device;
pub mod double_buffer;
pub mod driver;
pub mod errors;
pub mod format_converters;
mod frame_loop;
pub mod streams;
pub mod tracker;

// Re-export commonly used types
pub use config::Config;
pub use device::Device;
pub use double_buffer::DoubleBuffer;
pub use driver::{DeviceSelector, SensorType, VideoMode};
pub use streams::{ColorStream, DepthStream, IrStream};
pub use tracker::{Joint, JointType, User, UserEvent, UserRef, UserTracker};
