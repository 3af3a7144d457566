pub mod core;
pub mod config;

// Message routing and shared state
pub mod bus;
pub mod notify;
pub mod workspace;

// Agent lifecycle
pub mod runtime;
pub mod agents;

// Optional components
pub mod logging;
pub mod monitor;
