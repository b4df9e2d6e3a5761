//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Composition root (grpc/server.rs):
//!     startup  → set_serving(service)
//!     drain    → set_all_not_serving()
//!
//! grpc.health.v1.Health (grpc/health.rs):
//!     Check(name) → query(name)
//!     Watch(name) → watch(name), one message per transition
//! ```
//!
//! # Design Decisions
//! - Status is owned by `HealthRegistry`, not a bare global
//! - Each service's status sits in a watch channel, so writes are atomic
//!   swaps and readers never block writers
//! - Unknown names are reported, never invented as SERVING

pub mod state;

pub use state::HealthRegistry;
