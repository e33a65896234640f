pub mod api;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod scheduler;
pub mod server;
pub mod shutdown;
