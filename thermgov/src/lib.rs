//! Thermal governor for multi-core processors.
//!
//! Samples die temperature once per tick and reacts in two ways: it caps
//! the maximum CPU frequency with hysteresis, and it brings cores online or
//! takes them offline according to topology-specific temperature bands.
//! Two one-shot safety latches gate the risky transitions so the system
//! never ends up with core 0 disabled on a platform that needs it.
//!
//! The hardware is reached only through the collaborator traits in [`hw`];
//! the daemon wires them to sysfs, tests wire them to [`hw::sim`].

pub mod api;
pub mod api_client;
pub mod config;
pub mod error;
pub mod hw;
pub mod thermal;
pub mod tracing;
pub mod tunables;
pub mod types;
