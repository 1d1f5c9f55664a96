//! Ember daemon
//!
//! Wires the core crates into a running daemon: a unix-socket ingress that
//! feeds the log buffer, and a control socket serving queries, buffer
//! management, statistics and persist job control.
//!
//! ```text
//! hilogInput ──frames──> [IngressServer] ──insert──> [LogBuffer]
//!                                                        │
//! hilogControl <──replies── [ControlServer] ──query──────┤
//!                                │                       │
//!                                └──start/stop──> [PersisterRegistry]
//! ```

pub mod control;
pub mod control_proto;
pub mod ingress;
pub mod service;

pub use service::Daemon;
