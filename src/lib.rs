pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod server;
pub mod source;

pub use config::GatewayConfig;
pub use error::{Error, Result};
