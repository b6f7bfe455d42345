// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for sensor operations
//!
//! This module provides command-line functionality for:
//! - Listing available devices
//! - Streaming depth/IR/color frames with per-second statistics
//! - Tracking users and printing lifecycle events
//! - Recording sessions for later replay

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use depthsense::driver::session::SessionDriver;
use depthsense::driver::synthetic::SyntheticDriver;
use depthsense::driver::DeviceSelector;
use depthsense::tracker::UserTracker;
use depthsense::{ColorStream, Config, DepthStream, Device, IrStream, UserEvent};

/// List all available devices
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let driver = SyntheticDriver::new();
    let devices = Device::list_devices(&driver);

    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    println!("Available devices:");
    for (index, device) in devices.iter().enumerate() {
        println!("  [{}] {} [{}] ({})", index, device.name, device.vendor, device.uri);
    }
    println!();
    println!("Recorded sessions can be opened with --session <path>.");
    Ok(())
}

/// Open either a recorded session or an enumerated device
fn open_selected(
    session: Option<PathBuf>,
    device_index: usize,
) -> Result<Device, Box<dyn std::error::Error>> {
    let device = match session {
        Some(path) => {
            let driver = SessionDriver::new();
            Device::open(&driver, DeviceSelector::SessionPath(path))?
        }
        None => {
            let driver = SyntheticDriver::new();
            Device::open(&driver, DeviceSelector::Index(device_index))?
        }
    };
    println!("Using device: {}", device.descriptor().name);
    Ok(device)
}

fn install_stop_flag() -> Result<Arc<AtomicBool>, Box<dyn std::error::Error>> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || stop_handler.store(true, Ordering::SeqCst))?;
    Ok(stop)
}

/// Stream frames and print per-second statistics
pub fn stream(
    session: Option<PathBuf>,
    device_index: usize,
    duration_secs: u64,
    with_ir: bool,
    with_color: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    let mut device = open_selected(session, device_index)?;

    let depth = DepthStream::setup(&device)?;
    depth.set_depth_clipping(config.depth_near_mm, config.depth_far_mm);
    depth.start()?;

    let ir = if with_ir {
        let ir = IrStream::setup(&device)?;
        ir.start()?;
        Some(ir)
    } else {
        None
    };
    let color = if with_color {
        let color = ColorStream::setup(&device)?;
        color.start()?;
        Some(color)
    } else {
        None
    };

    device.start();

    let stop = install_stop_flag()?;
    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    let mut depth_frames = 0u32;
    let mut ir_frames = 0u32;
    let mut color_frames = 0u32;
    let mut last_report = Instant::now();

    while !stop.load(Ordering::SeqCst) && Instant::now() < deadline {
        device.update();

        if depth.is_frame_new() {
            depth_frames += 1;
        }
        if ir.as_ref().map(|s| s.is_frame_new()).unwrap_or(false) {
            ir_frames += 1;
        }
        if color.as_ref().map(|s| s.is_frame_new()).unwrap_or(false) {
            color_frames += 1;
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            let mut line = format!(
                "depth {}x{}: {} fps",
                depth.width(),
                depth.height(),
                depth_frames
            );
            if let Some(ir) = &ir {
                line += &format!(" | ir {}x{}: {} fps", ir.width(), ir.height(), ir_frames);
            }
            if let Some(color) = &color {
                line += &format!(
                    " | color {}x{}: {} fps",
                    color.width(),
                    color.height(),
                    color_frames
                );
            }
            println!("{}", line);

            depth_frames = 0;
            ir_frames = 0;
            color_frames = 0;
            last_report = Instant::now();
        }

        thread::sleep(Duration::from_millis(16));
    }

    device.exit();
    Ok(())
}

/// Track users and print lifecycle events and statuses
pub fn track(
    session: Option<PathBuf>,
    device_index: usize,
    duration_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    let mut device = open_selected(session, device_index)?;
    device.start();

    let mut tracker = UserTracker::setup(&device)?;
    tracker.set_smoothing_factor(config.smoothing_factor);
    let events = tracker.subscribe();
    tracker.start();

    let stop = install_stop_flag()?;
    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    let mut last_report = Instant::now();

    while !stop.load(Ordering::SeqCst) && Instant::now() < deadline {
        while let Ok(event) = events.try_recv() {
            match event {
                UserEvent::Discovered(user) => {
                    println!("user {} discovered", user.lock().unwrap().id());
                }
                UserEvent::Lost(user) => {
                    println!("user {} lost", user.lock().unwrap().id());
                }
            }
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            println!("tracking {} user(s)", tracker.user_count());
            for index in 0..tracker.user_count() {
                if let Some(user) = tracker.user_by_index(index) {
                    let user = user.lock().unwrap();
                    println!("{}", user.status().replace('\n', " "));
                }
            }
            last_report = Instant::now();
        }

        thread::sleep(Duration::from_millis(16));
    }

    tracker.exit();
    device.exit();
    Ok(())
}

/// Stream and record a session for later replay
pub fn record(
    session: Option<PathBuf>,
    device_index: usize,
    duration_secs: u64,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut device = open_selected(session, device_index)?;

    let depth = DepthStream::setup(&device)?;
    depth.start()?;
    device.start();

    let path = device.start_recording(output)?;
    println!("Recording to {}", path.display());

    let stop = install_stop_flag()?;
    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    while !stop.load(Ordering::SeqCst) && Instant::now() < deadline {
        device.update();
        thread::sleep(Duration::from_millis(16));
    }

    device.stop_recording();
    device.exit();
    println!("Saved {}", path.display());
    Ok(())
}
