//! Rancher exporter - common library
//!
//! Resource record types, the closed state enumerations and logging setup
//! shared by the exporter binary and its tests.

#![forbid(unsafe_code)]

pub mod logging;
pub mod resources;
pub mod states;

pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use resources::{Pagination, ResourceCollection, ResourceKind, ResourceRecord};
pub use states::{
    AgentState, HealthState, HostState, ServiceState, StackState, StateSet, normalize_state,
};
