//! LiveKit bridge subsystem.
//!
//! # Data Flow
//! ```text
//! gRPC call (service.rs)
//!     JoinRoom / LeaveRoom → session table → RoomBackend::join / leave
//!     StreamAudio          → RoomBackend::publish (inbound)
//!                          ← RoomBackend::subscribe (target's audio)
//!     PlayAudio / StopAudio → playback table → RoomBackend::play
//! ```
//!
//! # Design Decisions
//! - Media is behind the `RoomBackend` trait; `LoopbackBackend` keeps
//!   rooms in-process
//! - Audio frames are PCM16LE and passed through untouched

pub mod backend;
pub mod loopback;
pub mod service;
pub mod types;

pub use backend::RoomBackend;
pub use loopback::LoopbackBackend;
pub use service::LiveKitBridgeService;
pub use types::{AudioFrame, BackendError, JoinParams, Membership, PlaybackEvent, PlaybackRequest};
