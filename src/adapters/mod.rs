pub mod hooks;
pub mod http_server;
pub mod tracking_listener;

pub use hooks::{CommandHook, FnHook, command_hooks};
pub use http_server::{AppState, build_router};
pub use tracking_listener::{TrackedStream, TrackingListener};
