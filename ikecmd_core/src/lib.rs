//! Core of ikecmd.
//!
//! This crate turns a handful of command-line options into a complete IKE
//! connection descriptor and drives its one-shot submission to the tunnel
//! daemon. It also carries the configuration and logging shared by the
//! ikecmd components.

pub mod config;
pub mod connection;
pub mod logging;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigError};
pub use connection::{
    CmdOption, ConnectionDescriptor, ConnectionError, ConnectionOptions, InitiationJob, Profile,
};
