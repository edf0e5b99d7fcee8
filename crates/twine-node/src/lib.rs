//! Bootstrap pieces for the twine node daemon: configuration, logging and
//! error types. The binary in `main.rs` wires them together.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::NodeError;
