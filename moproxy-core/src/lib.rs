//! moproxy - a reverse proxy that serves each path from the first origin that has it
//!
//! Requests are forwarded to a prioritized list of origin servers. The first
//! origin answering `200 OK` has its body streamed back to the client; when
//! every origin fails the client receives `404 Not Found`.
//!
//! The main components are organized into the following modules:
//! - `origin`: Origin descriptors, the origin list and URL resolution
//! - `service`: The fallback forwarder and its hyper service
//! - `server`: HTTP server implementation

pub mod origin;
pub mod server;
pub mod service;
