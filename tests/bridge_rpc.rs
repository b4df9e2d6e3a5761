//! End-to-end tests of the bridge RPCs over a real connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use livekit_bridge::grpc::BRIDGE_SERVICE_NAME;
use livekit_bridge::proto::bridge::live_kit_bridge_client::LiveKitBridgeClient;
use livekit_bridge::proto::bridge::play_audio_event::EventType;
use livekit_bridge::proto::bridge::{
    AudioChunk, JoinRoomRequest, LeaveRoomRequest, PlayAudioRequest,
};
use livekit_bridge::{LiveKitBridgeService, LoopbackBackend};

mod common;

async fn start_bridge() -> (common::RunningServer, LiveKitBridgeClient<tonic::transport::Channel>) {
    let config = common::test_config();
    let bridge = LiveKitBridgeService::new(Arc::new(config.clone()), LoopbackBackend::new());
    let server = common::start_server_with(config, bridge).await;
    common::wait_for_serving(&server, BRIDGE_SERVICE_NAME).await;
    let client = LiveKitBridgeClient::new(common::connect(&server).await);
    (server, client)
}

fn join(user: &str, room: &str) -> JoinRoomRequest {
    JoinRoomRequest {
        user_id: user.to_string(),
        room_name: room.to_string(),
        token: "token".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn join_stream_and_leave() {
    let (_server, mut client) = start_bridge().await;

    let joined = client.join_room(join("alice", "room-1")).await.unwrap().into_inner();
    assert!(joined.success, "{}", joined.error);
    assert_eq!(joined.participant_count, 1);

    let (tx, rx) = mpsc::channel(4);
    tx.send(AudioChunk {
        pcm_data: vec![7u8; 640],
        sample_rate: 16_000,
        channels: 1,
        timestamp_ms: 1,
        user_id: "alice".to_string(),
    })
    .await
    .unwrap();

    let mut echoed = client
        .stream_audio(ReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();
    let chunk = tokio::time::timeout(Duration::from_secs(2), echoed.message())
        .await
        .expect("no audio returned")
        .unwrap()
        .unwrap();
    assert_eq!(chunk.pcm_data, vec![7u8; 640]);
    assert_eq!(chunk.user_id, "alice");
    assert_eq!(chunk.sample_rate, 16_000);

    drop(tx);
    let left = client
        .leave_room(LeaveRoomRequest {
            user_id: "alice".to_string(),
            reason: "User disconnected".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(left.success);

    let again = client
        .leave_room(LeaveRoomRequest {
            user_id: "alice".to_string(),
            reason: String::new(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(!again.success);
}

#[tokio::test]
async fn stream_without_session_is_rejected() {
    let (_server, mut client) = start_bridge().await;

    let chunk = AudioChunk {
        user_id: "bob".to_string(),
        ..Default::default()
    };
    let status = client
        .stream_audio(tokio_stream::iter(vec![chunk]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::FailedPrecondition);
}

#[tokio::test]
async fn playback_of_unreachable_source_fails() {
    let (_server, mut client) = start_bridge().await;
    client.join_room(join("carol", "room-2")).await.unwrap();

    let mut events = client
        .play_audio(PlayAudioRequest {
            request_id: "req-1".to_string(),
            audio_url: "http://127.0.0.1:1/tts.mp3".to_string(),
            volume: 0.8,
            stop_other: false,
            user_id: "carol".to_string(),
        })
        .await
        .unwrap()
        .into_inner();

    let started = events.message().await.unwrap().unwrap();
    assert_eq!(started.r#type(), EventType::Started);
    assert_eq!(started.request_id, "req-1");

    let failed = events.message().await.unwrap().unwrap();
    assert_eq!(failed.r#type(), EventType::Failed);
    assert!(!failed.error.is_empty());
    assert!(events.message().await.unwrap().is_none());
}

fn chunk(user: &str, byte: u8) -> AudioChunk {
    AudioChunk {
        pcm_data: vec![byte; 320],
        sample_rate: 16_000,
        channels: 1,
        timestamp_ms: 0,
        user_id: user.to_string(),
    }
}

#[tokio::test]
async fn listener_hears_target_until_leaving() {
    let (_server, mut client) = start_bridge().await;

    let mut alice_join = join("alice", "room-3");
    alice_join.target_identity = "bob".to_string();
    assert!(client.join_room(alice_join).await.unwrap().into_inner().success);
    assert!(client.join_room(join("bob", "room-3")).await.unwrap().into_inner().success);

    // Alice identifies herself without audio and listens for bob.
    let (alice_tx, alice_rx) = mpsc::channel(4);
    alice_tx.send(chunk("alice", 0)).await.unwrap();
    let mut alice_hears = client
        .stream_audio(ReceiverStream::new(alice_rx))
        .await
        .unwrap()
        .into_inner();

    let (bob_tx, bob_rx) = mpsc::channel(4);
    bob_tx.send(chunk("bob", 5)).await.unwrap();
    let _bob_hears = client
        .stream_audio(ReceiverStream::new(bob_rx))
        .await
        .unwrap()
        .into_inner();

    let heard = tokio::time::timeout(Duration::from_secs(2), alice_hears.message())
        .await
        .expect("alice heard nothing")
        .unwrap()
        .unwrap();
    assert_eq!(heard.user_id, "bob");
    assert_eq!(heard.pcm_data, vec![5u8; 320]);

    let left = client
        .leave_room(LeaveRoomRequest {
            user_id: "alice".to_string(),
            reason: "User disconnected".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(left.success);

    bob_tx.send(chunk("bob", 6)).await.unwrap();
    let after = tokio::time::timeout(Duration::from_secs(2), alice_hears.message())
        .await
        .expect("alice's stream stayed open after leaving")
        .unwrap();
    assert!(after.is_none());
    drop(alice_tx);
}

#[tokio::test]
async fn rejoining_another_room_ends_old_audio_stream() {
    let (_server, mut client) = start_bridge().await;

    let mut alice_join = join("alice", "room-4");
    alice_join.target_identity = "bob".to_string();
    client.join_room(alice_join.clone()).await.unwrap();
    client.join_room(join("bob", "room-4")).await.unwrap();

    let (alice_tx, alice_rx) = mpsc::channel(4);
    alice_tx.send(chunk("alice", 0)).await.unwrap();
    let mut alice_hears = client
        .stream_audio(ReceiverStream::new(alice_rx))
        .await
        .unwrap()
        .into_inner();

    alice_join.room_name = "room-5".to_string();
    assert!(client.join_room(alice_join).await.unwrap().into_inner().success);

    let (bob_tx, bob_rx) = mpsc::channel(4);
    bob_tx.send(chunk("bob", 8)).await.unwrap();
    let _bob_hears = client
        .stream_audio(ReceiverStream::new(bob_rx))
        .await
        .unwrap()
        .into_inner();

    let after = tokio::time::timeout(Duration::from_secs(2), alice_hears.message())
        .await
        .expect("old stream stayed open after rejoin")
        .unwrap();
    assert!(after.is_none());
    drop(alice_tx);
}
