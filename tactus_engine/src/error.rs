use tactus_shared::{ExchangeError, SchemaError, UpdateError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("processing graph contains a cycle through {processor}")]
    Cycle { processor: String },

    #[error("edge {source_name} -> {target} is already registered")]
    DuplicateEdge { source_name: String, target: String },

    #[error("processor is not registered")]
    UnknownProcessor,

    #[error("audio unit {uuid} is missing a required adapter: {what}")]
    MissingAdapter { uuid: Uuid, what: &'static str },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error("project decode failed: {0}")]
    Project(#[from] bincode::Error),

    #[error("export configuration: {0}")]
    ExportConfig(#[from] serde_json::Error),

    #[error("Manual Panic")]
    Panic,
}

pub type Result<T> = std::result::Result<T, EngineError>;
