// SPDX-License-Identifier: MPL-2.0

//! Error types for the sensor streaming and tracking pipeline

use std::fmt;

use crate::driver::{DeviceDescriptor, SensorType, VideoMode};

/// Result type alias for driver-boundary operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Result type alias for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Result type alias for stream operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Result type alias for user-tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Result type alias for configuration load/save
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors surfaced across the sensor-driver boundary
#[derive(Debug, Clone)]
pub enum DriverError {
    /// No device matched the selector
    DeviceNotFound(String),
    /// The opened device has no sensor of the requested type
    UnsupportedSensor(SensorType),
    /// The requested video mode was rejected; the previous mode is still active
    ModeNotSupported(VideoMode),
    /// A frame could not be read (transient; the frame is dropped)
    FrameRead(String),
    /// Session file or device I/O failure
    Io(String),
    /// Malformed session or frame data
    InvalidData(String),
    /// Other driver errors
    Other(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            DriverError::UnsupportedSensor(sensor) => {
                write!(f, "Sensor type not supported by device: {}", sensor)
            }
            DriverError::ModeNotSupported(mode) => write!(f, "Video mode not supported: {}", mode),
            DriverError::FrameRead(msg) => write!(f, "Frame read failed: {}", msg),
            DriverError::Io(msg) => write!(f, "I/O error: {}", msg),
            DriverError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
            DriverError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for DriverError {}

/// Errors from opening or controlling a device
#[derive(Debug, Clone)]
pub enum DeviceError {
    /// No devices are available to open
    NoDevices,
    /// Enumeration index out of range; carries the available devices so the
    /// caller can print a listing
    InvalidIndex {
        index: usize,
        available: Vec<DeviceDescriptor>,
    },
    /// The driver failed to open or configure the device
    OpenFailed(DriverError),
    /// The device has already been exited
    NotOpen,
    /// Attaching the recorder failed
    Recording(DriverError),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NoDevices => write!(f, "No devices available"),
            DeviceError::InvalidIndex { index, available } => {
                write!(f, "Invalid device index {}; {} available", index, available.len())?;
                for (i, dev) in available.iter().enumerate() {
                    write!(f, "\n  [{}] {} [{}] ({})", i, dev.name, dev.vendor, dev.uri)?;
                }
                Ok(())
            }
            DeviceError::OpenFailed(err) => write!(f, "Failed to open device: {}", err),
            DeviceError::NotOpen => write!(f, "Device is not open"),
            DeviceError::Recording(err) => write!(f, "Recording failed: {}", err),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Errors from stream setup and mode changes
#[derive(Debug, Clone)]
pub enum StreamError {
    /// The device does not expose the requested sensor type
    UnsupportedSensor(SensorType),
    /// Mode change rejected; the stream keeps its previous mode
    ModeRejected {
        requested: VideoMode,
        current: VideoMode,
    },
    /// The owning device has been exited
    DeviceGone,
    /// Driver-level failure
    Driver(DriverError),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::UnsupportedSensor(sensor) => {
                write!(f, "Device has no {} sensor", sensor)
            }
            StreamError::ModeRejected { requested, current } => {
                write!(f, "Mode {} rejected, keeping {}", requested, current)
            }
            StreamError::DeviceGone => write!(f, "Owning device has been exited"),
            StreamError::Driver(err) => write!(f, "Driver error: {}", err),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<DriverError> for StreamError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::UnsupportedSensor(sensor) => StreamError::UnsupportedSensor(sensor),
            other => StreamError::Driver(other),
        }
    }
}

/// Errors from user-tracker setup
#[derive(Debug, Clone)]
pub enum TrackerError {
    /// The tracking middleware could not be bound to the device
    CreateFailed(DriverError),
    /// The owning device has been exited
    DeviceGone,
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::CreateFailed(err) => write!(f, "Failed to create user tracker: {}", err),
            TrackerError::DeviceGone => write!(f, "Owning device has been exited"),
        }
    }
}

impl std::error::Error for TrackerError {}

/// Errors from configuration persistence
#[derive(Debug)]
pub enum ConfigError {
    /// Filesystem failure reading or writing the config file
    Io(std::io::Error),
    /// The config file exists but could not be parsed
    Parse(serde_json::Error),
    /// No config directory is available on this system
    NoConfigDir,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "Config I/O error: {}", err),
            ConfigError::Parse(err) => write!(f, "Config parse error: {}", err),
            ConfigError::NoConfigDir => write!(f, "No config directory available"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}
