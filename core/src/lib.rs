pub mod config;
pub mod copy;
pub mod errors;
pub mod loader;
pub mod provision;
pub mod schema;
pub mod sink;
pub mod source;
pub mod table;
pub mod telemetry;

pub use config::SinkConfig;
pub use errors::{LoadError, Result};
pub use loader::{LoadRequest, LoadSummary, load};
pub use provision::WriteMode;
pub use schema::{ColumnSpec, ScalarType};
