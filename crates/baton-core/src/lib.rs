pub mod config;
pub mod context;
pub mod error;

pub use config::BatonConfig;
pub use context::BridgeContext;
pub use error::{BatonError, Result};
