use thiserror::Error;

use crate::core::types::{AlarmId, DeviceId};

#[derive(Error, Debug)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown device type: {0}")]
    UnknownDeviceType(String),

    #[error("dependency cycle among devices: {0:?}")]
    DependencyCycle(Vec<DeviceId>),

    #[error("invalid action for device {device}: {reason}")]
    InvalidAction { device: DeviceId, reason: String },

    #[error("alarm not found: {0:?}")]
    AlarmNotFound(AlarmId),

    #[error("clock misuse: {0}")]
    ClockMisuse(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
