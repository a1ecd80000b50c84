use crate::value::ParameterAddress;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while declaring or validating a fixed-layout schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema declares {declared} bytes but writes {written}")]
    LayoutMismatch { declared: usize, written: usize },

    #[error("schema declares no fields")]
    Empty,

    #[error("payload ended after {available} bytes, {required} required")]
    Truncated { required: usize, available: usize },
}

/// Errors raised while constructing an exchange slot.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("exchange region holds {provided} bytes, schema requires {required} (payload + state byte)")]
    RegionTooSmall { required: usize, provided: usize },

    #[error("invalid schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("shared memory: {0}")]
    SharedMemory(String),
}

/// A change notification that does not fit the current project snapshot.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpdateError {
    #[error("unknown audio unit {0}")]
    UnknownAudioUnit(Uuid),

    #[error("unknown device {0}")]
    UnknownDevice(Uuid),

    #[error("unknown track {0}")]
    UnknownTrack(Uuid),

    #[error("unknown clip {0}")]
    UnknownClip(Uuid),

    #[error("unknown region {0}")]
    UnknownRegion(Uuid),

    #[error("unknown parameter {} of {}", .0.parameter, .0.device)]
    UnknownParameter(ParameterAddress),

    #[error("identity {0} already exists")]
    DuplicateIdentity(Uuid),

    #[error("invalid value: {0}")]
    InvalidValue(String),
}

pub type Result<T, E = ExchangeError> = std::result::Result<T, E>;
