pub mod shutdown_hook;

pub use shutdown_hook::ShutdownHook;
