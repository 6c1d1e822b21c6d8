pub mod loader;
pub mod schema;

pub use loader::{default_path, load_from_path, load_from_str, load_or_default, ConfigError};
pub use schema::{
    EngineConfig, Engines, FeederConfig, LabConfig, RouterConfig, StateConfig, ValidationError,
    ValidationIssue,
};
