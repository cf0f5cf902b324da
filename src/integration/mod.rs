//! Session-level wiring
//!
//! Configuration shared by the worker and the backends.

pub mod config;

pub use config::PlayerConfig;
