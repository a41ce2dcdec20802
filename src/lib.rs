//! Quiesce - graceful shutdown coordination for network servers.
//!
//! A server reports its connection lifecycle to a [`ShutdownCoordinator`]. When
//! shutdown is requested, the coordinator clears its advisory accept flag, waits
//! for the live connections to drain (bounded by a grace period) and then runs
//! the registered cleanup hooks exactly once, whether or not the drain finished
//! in time. The outcome tells the caller which exit code to use.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use quiesce::{ConnectionEvent, FnHook, ShutdownCoordinator};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let coordinator = Arc::new(ShutdownCoordinator::new(
//!     2000,
//!     vec![FnHook::boxed("flush", || Ok(()))],
//! )?);
//! coordinator.set_accepting(true);
//!
//! // The server reports every connection transition.
//! coordinator.record_connection_event(ConnectionEvent::Opened);
//! coordinator.record_connection_event(ConnectionEvent::Closed);
//!
//! // Later, from the signal handler:
//! let exit_code = match coordinator.on_stop().await {
//!     Ok(()) => 0,
//!     Err(e) => e.exit_code(),
//! };
//! # let _ = exit_code;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while
//! keeping the coordination logic inside `core`. The `axum` integration lives in
//! `adapters::tracking_listener`, which reports connection opens and closes
//! without any change to request handlers.
//!
//! # Error Handling
//! Coordinator APIs return [`ShutdownError`]. Hooks and the binary use
//! `eyre::Result<T>` with `WrapErr` context. Hook failures are logged, never
//! returned.
pub mod adapters;
pub mod config;
pub mod core;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub use crate::{
    adapters::{CommandHook, FnHook, TrackingListener},
    core::{ConnectionEvent, CoordinatorState, ShutdownCoordinator, ShutdownError},
    ports::ShutdownHook,
    utils::ConnectionGuard,
};
