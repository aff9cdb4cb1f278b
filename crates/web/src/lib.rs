//! suiterun web front end
//!
//! Exposes the execution pipeline over HTTP: a WebSocket that streams one
//! run's events as frames, and an NDJSON endpoint for plain HTTP clients.

pub mod run_socket;
pub mod server;

pub use run_socket::RunSocket;
pub use server::WebServer;
