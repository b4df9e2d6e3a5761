//! `mentra.livekit.bridge.LiveKitBridge` handler.
//!
//! # Responsibilities
//! - Track one room session per user
//! - Relay audio between the caller's stream and the media backend
//! - Run, stop and report server-side playbacks
//!
//! # Design Decisions
//! - Request validation failures are gRPC statuses; backend failures on
//!   JoinRoom/LeaveRoom are reported in the response body (`success=false`)
//! - A second JoinRoom for a user replaces the first session
//! - Stopped playbacks end with a FAILED event carrying the stop reason

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};

use crate::bridge::backend::RoomBackend;
use crate::bridge::types::{
    AudioFrame, BackendError, JoinParams, PlaybackEvent, PlaybackRequest,
};
use crate::config::validation::validate_livekit_url;
use crate::config::BridgeConfig;
use crate::observability::metrics;
use crate::proto::bridge::play_audio_event::EventType;
use crate::proto::bridge::{
    AudioChunk, JoinRoomRequest, JoinRoomResponse, LeaveRoomRequest, LeaveRoomResponse,
    PlayAudioEvent, PlayAudioRequest, StopAudioRequest, StopAudioResponse,
};
use crate::proto::LiveKitBridge;

/// Events buffered per playback stream.
const PLAYBACK_EVENT_BUFFER: usize = 16;

static PLAYBACK_SEQ: AtomicU64 = AtomicU64::new(1);

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

#[derive(Debug, Clone)]
struct Session {
    room_name: String,
    livekit_url: String,
    target_identity: String,
    participant_id: String,
}

struct ActivePlayback {
    user_id: String,
    seq: u64,
    cancel: oneshot::Sender<String>,
}

/// Bridge service delegating media to a [`RoomBackend`].
pub struct LiveKitBridgeService<B> {
    config: Arc<BridgeConfig>,
    backend: Arc<B>,
    sessions: Arc<DashMap<String, Session>>,
    playbacks: Arc<DashMap<String, ActivePlayback>>,
}

impl<B: RoomBackend> LiveKitBridgeService<B> {
    pub fn new(config: Arc<BridgeConfig>, backend: B) -> Self {
        Self {
            config,
            backend: Arc::new(backend),
            sessions: Arc::new(DashMap::new()),
            playbacks: Arc::new(DashMap::new()),
        }
    }

    /// Number of users currently in a room.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Number of playbacks still running.
    pub fn active_playbacks(&self) -> usize {
        self.playbacks.len()
    }

    /// Cancel the user's playbacks (all, or only `request_id`).
    ///
    /// Returns the ids that were stopped.
    fn stop_playbacks(&self, user_id: &str, request_id: Option<&str>, reason: &str) -> Vec<String> {
        let ids: Vec<String> = self
            .playbacks
            .iter()
            .filter(|p| p.user_id == user_id && request_id.map_or(true, |id| p.key() == id))
            .map(|p| p.key().clone())
            .collect();

        let mut stopped = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((id, playback)) = self.playbacks.remove(&id) {
                let _ = playback.cancel.send(reason.to_string());
                stopped.push(id);
            }
        }
        stopped
    }

    /// Stop playbacks, drop the session and leave the backend room.
    async fn end_session(&self, user_id: &str, reason: &str) -> Result<(), BackendError> {
        self.stop_playbacks(user_id, None, reason);
        let session = self.sessions.remove(user_id);
        metrics::record_leave(self.sessions.len());

        if let Some((_, session)) = session {
            tracing::info!(
                user_id = %user_id,
                room = %session.room_name,
                livekit_url = %session.livekit_url,
                participant_id = %session.participant_id,
                reason = %reason,
                "Session ended"
            );
        }
        self.backend.leave(user_id).await
    }
}

fn required(value: &str, field: &str) -> Result<(), Status> {
    if value.trim().is_empty() {
        Err(Status::invalid_argument(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

fn backend_status(err: BackendError) -> Status {
    match err {
        BackendError::NotJoined(_) => Status::failed_precondition(err.to_string()),
        BackendError::Closed => Status::aborted(err.to_string()),
        BackendError::Connect(_) => Status::unavailable(err.to_string()),
        BackendError::Playback(_) => Status::internal(err.to_string()),
    }
}

fn frame_from_chunk(chunk: AudioChunk) -> AudioFrame {
    AudioFrame {
        pcm: chunk.pcm_data,
        sample_rate: chunk.sample_rate.max(0) as u32,
        channels: chunk.channels.max(0) as u32,
        timestamp_ms: chunk.timestamp_ms,
    }
}

fn playback_event_to_proto(event: PlaybackEvent, request_id: &str) -> PlayAudioEvent {
    let mut out = PlayAudioEvent {
        request_id: request_id.to_string(),
        ..Default::default()
    };
    match event {
        PlaybackEvent::Started { duration_ms } => {
            out.r#type = EventType::Started.into();
            out.duration_ms = duration_ms.unwrap_or_default();
        }
        PlaybackEvent::Progress { position_ms } => {
            out.r#type = EventType::Progress.into();
            out.position_ms = position_ms;
        }
        PlaybackEvent::Completed {
            duration_ms,
            metadata,
        } => {
            out.r#type = EventType::Completed.into();
            out.duration_ms = duration_ms.unwrap_or_default();
            out.metadata = metadata;
        }
        PlaybackEvent::Failed { error } => {
            out.r#type = EventType::Failed.into();
            out.error = error;
        }
    }
    out
}

#[tonic::async_trait]
impl<B: RoomBackend> LiveKitBridge for LiveKitBridgeService<B> {
    async fn join_room(
        &self,
        request: Request<JoinRoomRequest>,
    ) -> Result<Response<JoinRoomResponse>, Status> {
        let req = request.into_inner();
        required(&req.user_id, "user_id")?;
        required(&req.room_name, "room_name")?;

        let livekit_url = if req.livekit_url.trim().is_empty() {
            self.config.livekit.url.clone()
        } else {
            req.livekit_url
        };
        validate_livekit_url(&livekit_url).map_err(|e| Status::invalid_argument(e.to_string()))?;

        let target_identity = if req.target_identity.trim().is_empty() {
            req.user_id.clone()
        } else {
            req.target_identity
        };

        if self.sessions.contains_key(&req.user_id) {
            tracing::warn!(user_id = %req.user_id, "Already in a room, leaving first");
            if let Err(e) = self.end_session(&req.user_id, "replaced by new JoinRoom").await {
                tracing::debug!(user_id = %req.user_id, error = %e, "Leave before rejoin failed");
            }
        }

        let params = JoinParams {
            user_id: req.user_id.clone(),
            room_name: req.room_name.clone(),
            token: req.token,
            livekit_url: livekit_url.clone(),
            target_identity: target_identity.clone(),
        };

        match self.backend.join(&params).await {
            Ok(membership) => {
                self.sessions.insert(
                    req.user_id.clone(),
                    Session {
                        room_name: req.room_name.clone(),
                        livekit_url,
                        target_identity,
                        participant_id: membership.participant_id.clone(),
                    },
                );
                metrics::record_join(self.sessions.len());
                tracing::info!(
                    user_id = %req.user_id,
                    room = %req.room_name,
                    participant_id = %membership.participant_id,
                    participant_count = membership.participant_count,
                    "Joined room"
                );

                Ok(Response::new(JoinRoomResponse {
                    success: true,
                    error: String::new(),
                    participant_id: membership.participant_id,
                    participant_count: membership.participant_count as i32,
                }))
            }
            Err(e) => {
                metrics::record_join_failure();
                tracing::warn!(user_id = %req.user_id, room = %req.room_name, error = %e, "JoinRoom failed");
                Ok(Response::new(JoinRoomResponse {
                    success: false,
                    error: e.to_string(),
                    ..Default::default()
                }))
            }
        }
    }

    async fn leave_room(
        &self,
        request: Request<LeaveRoomRequest>,
    ) -> Result<Response<LeaveRoomResponse>, Status> {
        let req = request.into_inner();
        required(&req.user_id, "user_id")?;

        if !self.sessions.contains_key(&req.user_id) {
            return Ok(Response::new(LeaveRoomResponse {
                success: false,
                error: format!("no active session for user {}", req.user_id),
            }));
        }

        let reason = if req.reason.is_empty() {
            "LeaveRoom"
        } else {
            req.reason.as_str()
        };
        let response = match self.end_session(&req.user_id, reason).await {
            Ok(()) => LeaveRoomResponse {
                success: true,
                error: String::new(),
            },
            Err(e) => LeaveRoomResponse {
                success: false,
                error: e.to_string(),
            },
        };
        Ok(Response::new(response))
    }

    type StreamAudioStream = ResponseStream<AudioChunk>;

    async fn stream_audio(
        &self,
        request: Request<Streaming<AudioChunk>>,
    ) -> Result<Response<Self::StreamAudioStream>, Status> {
        let mut inbound = request.into_inner();

        let first = inbound
            .message()
            .await?
            .ok_or_else(|| Status::invalid_argument("audio stream closed before identifying the user"))?;
        required(&first.user_id, "user_id")?;
        let user_id = first.user_id.clone();

        let session = self
            .sessions
            .get(&user_id)
            .map(|s| s.clone())
            .ok_or_else(|| {
                Status::failed_precondition(format!("user {} has not joined a room", user_id))
            })?;

        let frames = self.backend.subscribe(&user_id).await.map_err(backend_status)?;

        let backend = Arc::clone(&self.backend);
        let publisher = user_id.clone();
        tokio::spawn(async move {
            let mut relayed = 0u64;
            let mut next = Some(first);
            loop {
                let chunk = match next.take() {
                    Some(chunk) => chunk,
                    None => match inbound.message().await {
                        Ok(Some(chunk)) => chunk,
                        Ok(None) => break,
                        Err(status) => {
                            tracing::debug!(user_id = %publisher, error = %status, "Inbound audio stream error");
                            break;
                        }
                    },
                };
                if chunk.pcm_data.is_empty() {
                    continue;
                }

                metrics::record_audio("inbound", chunk.pcm_data.len());
                if let Err(e) = backend.publish(&publisher, frame_from_chunk(chunk)).await {
                    tracing::debug!(user_id = %publisher, error = %e, "Publish failed, closing inbound audio");
                    break;
                }
                relayed += 1;
            }
            tracing::info!(user_id = %publisher, chunks = relayed, "Inbound audio stream ended");
        });

        tracing::info!(
            user_id = %user_id,
            target = %session.target_identity,
            "Audio stream started"
        );

        let speaker = session.target_identity;
        let outbound = ReceiverStream::new(frames).map(move |frame| {
            metrics::record_audio("outbound", frame.pcm.len());
            Ok(AudioChunk {
                pcm_data: frame.pcm,
                sample_rate: frame.sample_rate as i32,
                channels: frame.channels as i32,
                timestamp_ms: frame.timestamp_ms,
                user_id: speaker.clone(),
            })
        });

        Ok(Response::new(Box::pin(outbound)))
    }

    type PlayAudioStream = ResponseStream<PlayAudioEvent>;

    async fn play_audio(
        &self,
        request: Request<PlayAudioRequest>,
    ) -> Result<Response<Self::PlayAudioStream>, Status> {
        let req = request.into_inner();
        required(&req.request_id, "request_id")?;
        required(&req.audio_url, "audio_url")?;
        required(&req.user_id, "user_id")?;

        if !self.sessions.contains_key(&req.user_id) {
            return Err(Status::failed_precondition(format!(
                "user {} has not joined a room",
                req.user_id
            )));
        }
        if self.playbacks.contains_key(&req.request_id) {
            return Err(Status::already_exists(format!(
                "playback {} is already running",
                req.request_id
            )));
        }

        if req.stop_other {
            let stopped = self.stop_playbacks(&req.user_id, None, "superseded by a new playback");
            if !stopped.is_empty() {
                tracing::debug!(user_id = %req.user_id, stopped = ?stopped, "Stopped other playbacks");
            }
        }

        let (events_tx, events_rx) = mpsc::channel(PLAYBACK_EVENT_BUFFER);
        let (cancel_tx, cancel_rx) = oneshot::channel::<String>();
        let seq = PLAYBACK_SEQ.fetch_add(1, Ordering::Relaxed);
        match self.playbacks.entry(req.request_id.clone()) {
            Entry::Occupied(_) => {
                return Err(Status::already_exists(format!(
                    "playback {} is already running",
                    req.request_id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(ActivePlayback {
                    user_id: req.user_id.clone(),
                    seq,
                    cancel: cancel_tx,
                });
            }
        }

        tracing::info!(
            user_id = %req.user_id,
            request_id = %req.request_id,
            url = %req.audio_url,
            volume = req.volume,
            "Playback requested"
        );

        let backend = Arc::clone(&self.backend);
        let playbacks = Arc::clone(&self.playbacks);
        let user_id = req.user_id.clone();
        let request_id = req.request_id.clone();
        let playback = PlaybackRequest {
            request_id: req.request_id.clone(),
            url: req.audio_url,
            volume: req.volume,
        };
        tokio::spawn(async move {
            let (backend_tx, mut backend_rx) = mpsc::channel(PLAYBACK_EVENT_BUFFER);
            let play = backend.play(&user_id, playback, backend_tx);
            tokio::pin!(play);
            let mut cancel_rx = cancel_rx;
            let mut play_done = false;

            // Forward backend events until a terminal one, a stop, or the
            // caller going away.
            let outcome = loop {
                tokio::select! {
                    event = backend_rx.recv() => match event {
                        Some(event) => {
                            let outcome = match &event {
                                PlaybackEvent::Completed { .. } => Some("completed"),
                                PlaybackEvent::Failed { .. } => Some("failed"),
                                _ => None,
                            };
                            if events_tx.send(event).await.is_err() {
                                break "abandoned";
                            }
                            if let Some(outcome) = outcome {
                                break outcome;
                            }
                        }
                        None => {
                            let _ = events_tx
                                .send(PlaybackEvent::Failed {
                                    error: "playback ended without a result".to_string(),
                                })
                                .await;
                            break "failed";
                        }
                    },
                    result = &mut play, if !play_done => {
                        play_done = true;
                        if let Err(e) = result {
                            let _ = events_tx.send(PlaybackEvent::Failed { error: e.to_string() }).await;
                            break "failed";
                        }
                    }
                    reason = &mut cancel_rx => {
                        let reason = reason.unwrap_or_else(|_| "cancelled".to_string());
                        let _ = events_tx
                            .send(PlaybackEvent::Failed {
                                error: format!("stopped: {}", reason),
                            })
                            .await;
                        break "stopped";
                    }
                    _ = events_tx.closed() => break "abandoned",
                }
            };

            playbacks.remove_if(&request_id, |_, p| p.seq == seq);
            metrics::record_playback(outcome);
            tracing::debug!(request_id = %request_id, outcome, "Playback finished");
        });

        let request_id = req.request_id;
        let events = ReceiverStream::new(events_rx)
            .map(move |event| Ok(playback_event_to_proto(event, &request_id)));

        Ok(Response::new(Box::pin(events)))
    }

    async fn stop_audio(
        &self,
        request: Request<StopAudioRequest>,
    ) -> Result<Response<StopAudioResponse>, Status> {
        let req = request.into_inner();
        required(&req.user_id, "user_id")?;

        let reason = if req.reason.is_empty() {
            "StopAudio"
        } else {
            req.reason.as_str()
        };
        let target = (!req.request_id.is_empty()).then_some(req.request_id.as_str());
        let stopped = self.stop_playbacks(&req.user_id, target, reason);

        if stopped.is_empty() {
            return Ok(Response::new(StopAudioResponse {
                success: false,
                stopped_request_id: String::new(),
                error: "no matching playback".to_string(),
            }));
        }

        tracing::info!(user_id = %req.user_id, stopped = ?stopped, reason = %reason, "Playback stopped");
        Ok(Response::new(StopAudioResponse {
            success: true,
            stopped_request_id: stopped.join(","),
            error: String::new(),
        }))
    }
}
