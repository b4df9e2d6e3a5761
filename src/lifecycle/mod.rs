//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Bind listener → Register services → Serve
//!
//! Shutdown (shutdown.rs):
//!     Trigger → NOT_SERVING → Stop accept → Drain in-flight calls → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     Second signal  → Forced exit
//!
//! State (state.rs):
//!     Starting → Serving → Draining → Stopped
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then listener, then health
//! - Drain has a deadline: remaining calls are dropped after it

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use state::{Lifecycle, LifecycleState};
