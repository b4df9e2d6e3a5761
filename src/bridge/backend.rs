//! Media backend abstraction.
//!
//! # Responsibilities
//! - Join and leave rooms on behalf of users
//! - Publish user audio into the room
//! - Deliver the target participant's audio back to the user
//! - Play remote audio files into the room
//!
//! # Design Decisions
//! - The gRPC handler owns sessions; the backend owns media
//! - Implementations must tolerate concurrent calls for different users

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::bridge::types::{
    AudioFrame, BackendError, JoinParams, Membership, PlaybackEvent, PlaybackRequest,
};

/// Capability the bridge service needs from a real-time media server.
#[async_trait]
pub trait RoomBackend: Send + Sync + 'static {
    /// Join `params.room_name`, replacing any earlier membership of the user.
    async fn join(&self, params: &JoinParams) -> Result<Membership, BackendError>;

    /// Leave the user's current room.
    async fn leave(&self, user_id: &str) -> Result<(), BackendError>;

    /// Publish one frame of the user's audio.
    async fn publish(&self, user_id: &str, frame: AudioFrame) -> Result<(), BackendError>;

    /// Frames spoken by the user's target identity. Ends when the user
    /// leaves or the room closes.
    async fn subscribe(&self, user_id: &str) -> Result<mpsc::Receiver<AudioFrame>, BackendError>;

    /// Play `request` into the user's room, reporting progress on `events`.
    ///
    /// Returns once a terminal event has been sent. The future may be
    /// dropped at any point to cancel playback.
    async fn play(
        &self,
        user_id: &str,
        request: PlaybackRequest,
        events: mpsc::Sender<PlaybackEvent>,
    ) -> Result<(), BackendError>;
}
