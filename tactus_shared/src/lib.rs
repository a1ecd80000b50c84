//! Types shared by the real-time engine and its controller.

pub mod error;
pub mod exchange;
pub mod ppqn;
pub mod project;
pub mod schema;
pub mod state;
pub mod value;

pub use error::{ExchangeError, SchemaError, UpdateError};
pub use exchange::{ExchangeRegion, ShmemConfig, SyncReader, SyncWriter};
pub use ppqn::Ppqn;
pub use project::{Project, ProjectUpdate};
pub use state::EngineState;
pub use value::{AutomationLane, ParameterAddress, ValueMapping};

/// Number of samples rendered per callback.
pub const RENDER_QUANTUM: usize = 128;
