//! SDN controller daemon.
//!
//! Wires the policy library to a transport event stream: configuration
//! loading, per-connection task dispatch and directive output.

pub mod commands;
pub mod config;
pub mod daemon;
pub mod error;
pub mod events;
pub mod installer;

pub use config::{ControllerSettings, SdnctlConfig, DEFAULT_CONFIG_PATH};
pub use daemon::{ConnectionReport, ControllerDaemon, DaemonConfig};
pub use error::{DaemonError, Result};
pub use events::{forward_events, parse_line, EventRecord};
pub use installer::JsonLinesInstaller;
