//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, accept stream, external close)
//!     → Hand off to the gRPC server
//! ```
//!
//! # Design Decisions
//! - Binding happens before any service reports SERVING
//! - The accept stream can be closed from outside the server task

pub mod listener;

pub use listener::{CloseHandle, Listener, ListenerError};
