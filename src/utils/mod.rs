pub mod connection_guard;
pub mod signal_handler;

pub use connection_guard::ConnectionGuard;
pub use signal_handler::{ShutdownSignal, run_signal_handler};
