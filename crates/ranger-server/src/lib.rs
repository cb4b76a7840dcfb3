//! # Ranger Server - Component Loader
//!
//! Wires the server together: configuration, the dependency-ordered
//! component loader, and the root cancellation context every protocol
//! server and request descends from.

pub mod config;
pub mod loader;

pub use config::ServerConfig;
pub use loader::Loader;
