pub mod connection;
pub mod coordinator;
pub mod error;

pub use connection::{ConnectionEvent, LiveConnections};
pub use coordinator::{CoordinatorState, ShutdownCoordinator};
pub use error::{EXIT_FORCED, ShutdownError};
