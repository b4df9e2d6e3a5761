//! In-process room backend.
//!
//! Rooms exist only inside this process. Audio published by a member is
//! delivered to every member of the same room whose target identity is the
//! speaker, so a user targeting themselves hears their own audio back.
//! Playback fetches the source over HTTP and reports completion without
//! rendering any audio.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, watch};

use crate::bridge::backend::RoomBackend;
use crate::bridge::types::{
    AudioFrame, BackendError, JoinParams, Membership, PlaybackEvent, PlaybackRequest,
};

/// Frames buffered per room before slow subscribers start lagging.
const ROOM_BUFFER: usize = 256;

/// Frames buffered per subscriber.
const SUBSCRIBER_BUFFER: usize = 64;

#[derive(Debug, Clone)]
struct Member {
    room: String,
    target_identity: String,
    /// Flipped to `true` when this membership ends.
    left: Arc<watch::Sender<bool>>,
}

impl Member {
    fn new(room: &str, target_identity: &str) -> Self {
        let (left, _) = watch::channel(false);
        Self {
            room: room.to_string(),
            target_identity: target_identity.to_string(),
            left: Arc::new(left),
        }
    }

    fn end(&self) {
        self.left.send_replace(true);
    }
}

#[derive(Debug, Clone)]
struct Spoken {
    speaker: String,
    frame: AudioFrame,
}

/// Room backend that routes audio between members of the same process.
pub struct LoopbackBackend {
    members: DashMap<String, Member>,
    rooms: DashMap<String, broadcast::Sender<Spoken>>,
    http: reqwest::Client,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self {
            members: DashMap::new(),
            rooms: DashMap::new(),
            http: reqwest::Client::new(),
        }
    }

    fn room_size(&self, room: &str) -> usize {
        self.members.iter().filter(|m| m.room == room).count()
    }

    fn remove_member(&self, user_id: &str) -> Option<Member> {
        let (_, member) = self.members.remove(user_id)?;
        member.end();
        let closed = self
            .rooms
            .remove_if(&member.room, |_, _| self.room_size(&member.room) == 0);
        if closed.is_some() {
            tracing::debug!(room = %member.room, "Room closed");
        }
        Some(member)
    }

    fn room_sender(&self, user_id: &str) -> Result<broadcast::Sender<Spoken>, BackendError> {
        let member = self
            .members
            .get(user_id)
            .map(|m| m.clone())
            .ok_or_else(|| BackendError::NotJoined(user_id.to_string()))?;
        self.rooms
            .get(&member.room)
            .map(|tx| tx.clone())
            .ok_or(BackendError::Closed)
    }
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomBackend for LoopbackBackend {
    async fn join(&self, params: &JoinParams) -> Result<Membership, BackendError> {
        self.remove_member(&params.user_id);

        // Insert the member before the room so a concurrent leave never
        // sees this room empty.
        let member = Member::new(&params.room_name, &params.target_identity);
        if let Some(previous) = self.members.insert(params.user_id.clone(), member) {
            previous.end();
        }
        self.rooms
            .entry(params.room_name.clone())
            .or_insert_with(|| broadcast::channel(ROOM_BUFFER).0);

        Ok(Membership {
            participant_id: format!("PA_{}", uuid::Uuid::new_v4().simple()),
            participant_count: self.room_size(&params.room_name) as u32,
        })
    }

    async fn leave(&self, user_id: &str) -> Result<(), BackendError> {
        self.remove_member(user_id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotJoined(user_id.to_string()))
    }

    async fn publish(&self, user_id: &str, frame: AudioFrame) -> Result<(), BackendError> {
        let room = self.room_sender(user_id)?;
        // No subscribers is not an error.
        let _ = room.send(Spoken {
            speaker: user_id.to_string(),
            frame,
        });
        Ok(())
    }

    async fn subscribe(&self, user_id: &str) -> Result<mpsc::Receiver<AudioFrame>, BackendError> {
        let (target, mut left) = self
            .members
            .get(user_id)
            .map(|m| (m.target_identity.clone(), m.left.subscribe()))
            .ok_or_else(|| BackendError::NotJoined(user_id.to_string()))?;
        let mut room = self.room_sender(user_id)?.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    biased;
                    _ = left.wait_for(|left| *left) => break,
                    received = room.recv() => received,
                };
                match received {
                    Ok(spoken) if spoken.speaker == target => {
                        if tx.send(spoken.frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(user_id = %user_id, skipped, "Subscriber lagging, frames dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!(user_id = %user_id, "Audio subscription ended");
        });

        Ok(rx)
    }

    async fn play(
        &self,
        user_id: &str,
        request: PlaybackRequest,
        events: mpsc::Sender<PlaybackEvent>,
    ) -> Result<(), BackendError> {
        if !self.members.contains_key(user_id) {
            return Err(BackendError::NotJoined(user_id.to_string()));
        }

        let _ = events.send(PlaybackEvent::Started { duration_ms: None }).await;

        let outcome = match self.http.get(&request.url).send().await {
            Ok(response) if response.status().is_success() => {
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("application/octet-stream")
                    .to_string();
                match response.bytes().await {
                    Ok(body) => {
                        let mut metadata = HashMap::new();
                        metadata.insert("bytes".to_string(), body.len().to_string());
                        metadata.insert("content_type".to_string(), content_type);
                        metadata.insert("volume".to_string(), request.volume.to_string());
                        PlaybackEvent::Completed {
                            duration_ms: None,
                            metadata,
                        }
                    }
                    Err(e) => PlaybackEvent::Failed {
                        error: e.to_string(),
                    },
                }
            }
            Ok(response) => PlaybackEvent::Failed {
                error: format!("source returned HTTP {}", response.status()),
            },
            Err(e) => PlaybackEvent::Failed {
                error: e.to_string(),
            },
        };

        tracing::debug!(
            user_id = %user_id,
            request_id = %request.request_id,
            event = ?outcome,
            "Loopback playback finished"
        );
        let _ = events.send(outcome).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn params(user: &str, room: &str, target: &str) -> JoinParams {
        JoinParams {
            user_id: user.to_string(),
            room_name: room.to_string(),
            token: "token".to_string(),
            livekit_url: "wss://lk.example.com".to_string(),
            target_identity: target.to_string(),
        }
    }

    fn frame(byte: u8) -> AudioFrame {
        AudioFrame {
            pcm: vec![byte; 320],
            sample_rate: 16_000,
            channels: 1,
            timestamp_ms: 0,
        }
    }

    #[tokio::test]
    async fn join_counts_participants() {
        let backend = LoopbackBackend::new();
        let a = backend.join(&params("a", "room", "a")).await.unwrap();
        let b = backend.join(&params("b", "room", "b")).await.unwrap();

        assert_eq!(a.participant_count, 1);
        assert_eq!(b.participant_count, 2);
        assert_ne!(a.participant_id, b.participant_id);
    }

    #[tokio::test]
    async fn rejoin_moves_rooms() {
        let backend = LoopbackBackend::new();
        backend.join(&params("a", "one", "a")).await.unwrap();
        backend.join(&params("a", "two", "a")).await.unwrap();

        assert_eq!(backend.room_size("one"), 0);
        assert!(backend.rooms.get("one").is_none());
        assert_eq!(backend.room_size("two"), 1);
    }

    #[tokio::test]
    async fn leave_unknown_user_fails() {
        let backend = LoopbackBackend::new();
        assert!(matches!(
            backend.leave("ghost").await,
            Err(BackendError::NotJoined(_))
        ));
    }

    #[tokio::test]
    async fn routes_target_audio_only() {
        let backend = LoopbackBackend::new();
        backend.join(&params("listener", "room", "speaker")).await.unwrap();
        backend.join(&params("speaker", "room", "speaker")).await.unwrap();
        backend.join(&params("other", "room", "other")).await.unwrap();

        let mut rx = backend.subscribe("listener").await.unwrap();
        backend.publish("other", frame(1)).await.unwrap();
        backend.publish("speaker", frame(2)).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.pcm[0], 2);
    }

    #[tokio::test]
    async fn subscription_ends_when_room_closes() {
        let backend = LoopbackBackend::new();
        backend.join(&params("a", "room", "a")).await.unwrap();
        let mut rx = backend.subscribe("a").await.unwrap();

        backend.leave("a").await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn leaving_ends_subscription_while_room_stays_open() {
        let backend = LoopbackBackend::new();
        backend.join(&params("alice", "room", "bob")).await.unwrap();
        backend.join(&params("bob", "room", "bob")).await.unwrap();
        let mut rx = backend.subscribe("alice").await.unwrap();

        backend.publish("bob", frame(1)).await.unwrap();
        let heard = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(heard.unwrap().pcm[0], 1);

        backend.leave("alice").await.unwrap();
        backend.publish("bob", frame(9)).await.unwrap();
        let after = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert!(after.is_none());
    }

    #[tokio::test]
    async fn rejoining_elsewhere_ends_old_subscription() {
        let backend = LoopbackBackend::new();
        backend.join(&params("alice", "one", "bob")).await.unwrap();
        backend.join(&params("bob", "one", "bob")).await.unwrap();
        let mut old = backend.subscribe("alice").await.unwrap();

        backend.join(&params("alice", "two", "bob")).await.unwrap();
        backend.publish("bob", frame(3)).await.unwrap();
        let after = tokio::time::timeout(Duration::from_secs(1), old.recv())
            .await
            .unwrap();
        assert!(after.is_none());
        assert_eq!(backend.room_size("one"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn join_survives_concurrent_leave_of_last_member() {
        let backend = Arc::new(LoopbackBackend::new());
        for round in 0..200 {
            let room = format!("room-{}", round);
            backend.join(&params("b", &room, "b")).await.unwrap();

            let joiner = {
                let backend = Arc::clone(&backend);
                let room = room.clone();
                tokio::spawn(async move { backend.join(&params("a", &room, "a")).await })
            };
            let leaver = {
                let backend = Arc::clone(&backend);
                tokio::spawn(async move { backend.leave("b").await })
            };
            joiner.await.unwrap().unwrap();
            leaver.await.unwrap().unwrap();

            backend.publish("a", frame(0)).await.unwrap();
            backend.leave("a").await.unwrap();
        }
    }

    #[tokio::test]
    async fn play_unreachable_source_fails() {
        let backend = LoopbackBackend::new();
        backend.join(&params("a", "room", "a")).await.unwrap();
        let (tx, mut rx) = mpsc::channel(4);

        let request = PlaybackRequest {
            request_id: "r1".to_string(),
            url: "http://127.0.0.1:1/missing.mp3".to_string(),
            volume: 1.0,
        };
        backend.play("a", request, tx).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            PlaybackEvent::Started { duration_ms: None }
        );
        assert!(matches!(rx.recv().await.unwrap(), PlaybackEvent::Failed { .. }));
    }
}
