pub mod config;
pub mod envelope;
pub mod error;
pub mod forwarder;
pub mod payload;
pub mod server;
pub mod shutdown;
pub mod sse;
