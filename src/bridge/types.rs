//! Bridge domain types and error definitions.

use std::collections::HashMap;

use thiserror::Error;

/// Parameters for joining a room on behalf of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinParams {
    pub user_id: String,
    pub room_name: String,
    /// Access token issued for this user and room.
    pub token: String,
    pub livekit_url: String,
    /// Participant whose audio is streamed back to the user.
    pub target_identity: String,
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub participant_id: String,
    pub participant_count: u32,
}

/// One chunk of PCM16LE audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u32,
    pub timestamp_ms: i64,
}

/// Server-side playback of a remote audio file into the room.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub request_id: String,
    pub url: String,
    pub volume: f32,
}

/// Progress of a playback, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started {
        duration_ms: Option<i64>,
    },
    Progress {
        position_ms: i64,
    },
    Completed {
        duration_ms: Option<i64>,
        metadata: HashMap<String, String>,
    },
    Failed {
        error: String,
    },
}

/// Errors raised by a [`RoomBackend`](crate::bridge::RoomBackend).
#[derive(Debug, Error)]
pub enum BackendError {
    /// The user has no room membership.
    #[error("user {0} has not joined a room")]
    NotJoined(String),

    /// Connecting to the media server failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Fetching or rendering playback audio failed.
    #[error("playback failed: {0}")]
    Playback(String),

    /// The room or stream was torn down.
    #[error("room closed")]
    Closed,
}
