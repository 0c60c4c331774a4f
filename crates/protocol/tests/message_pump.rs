// Copyright (C) 2023 Entropy Cryptography Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! The relay client and the message pump against a test relay
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use keysign_protocol::{
    engine::RelayMessenger, errors::EngineErr, KeysignRequest, KeysignResponse, MessagePump,
    Messenger, RelayClient, RelayMessage, SessionCipher, ThresholdEngine,
};
use keysign_testing_utils::{constants::TEST_SESSION_KEY, spawn_relay};
use serial_test::serial;

/// Records the frames it is fed
#[derive(Default)]
struct RecordingEngine {
    frames: Mutex<Vec<String>>,
}

impl ThresholdEngine for RecordingEngine {
    fn keysign_ecdsa(&self, _request: &KeysignRequest) -> Result<KeysignResponse, EngineErr> {
        Err(EngineErr::Protocol("not signing".to_string()))
    }

    fn keysign_eddsa(&self, _request: &KeysignRequest) -> Result<KeysignResponse, EngineErr> {
        Err(EngineErr::Protocol("not signing".to_string()))
    }

    fn apply_data(&self, frame: &str) -> Result<(), EngineErr> {
        self.frames.lock().unwrap().push(frame.to_string());
        Ok(())
    }
}

fn frame(
    cipher: &SessionCipher,
    from: &str,
    to: &str,
    sequence_no: u64,
    body: &str,
) -> RelayMessage {
    RelayMessage {
        session_id: "pump".to_string(),
        from: from.to_string(),
        to: vec![to.to_string()],
        body: cipher.encrypt(body.as_bytes()).unwrap(),
        hash: format!("{from}-{sequence_no}"),
        sequence_no,
    }
}

#[tokio::test]
#[serial]
async fn test_join_and_start_session() {
    let relay = spawn_relay().await.unwrap();
    let client = RelayClient::new(&relay.url).unwrap();

    assert!(client.list_participants("setup").await.unwrap().is_empty());
    assert_eq!(client.started_committee("setup").await.unwrap(), None);

    client.join("setup", "alice").await.unwrap();
    client.join("setup", "bob").await.unwrap();
    client.join("setup", "alice").await.unwrap();
    assert_eq!(client.list_participants("setup").await.unwrap(), vec!["alice", "bob"]);

    let committee = vec!["alice".to_string(), "bob".to_string()];
    client.start_session("setup", &committee).await.unwrap();
    assert_eq!(client.started_committee("setup").await.unwrap(), Some(committee));

    client.end_session("setup").await.unwrap();
    assert!(client.list_participants("setup").await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_frames_are_scoped_to_their_message_id() {
    let relay = spawn_relay().await.unwrap();
    let client = RelayClient::new(&relay.url).unwrap();
    let cipher = SessionCipher::from_hex(TEST_SESSION_KEY).unwrap();

    client
        .post_message("pump", Some("round-1"), &frame(&cipher, "bob", "alice", 0, "a"))
        .await
        .unwrap();
    client
        .post_message("pump", Some("round-2"), &frame(&cipher, "bob", "alice", 1, "b"))
        .await
        .unwrap();

    let round_one = client.poll_messages("pump", "alice", Some("round-1")).await.unwrap();
    assert_eq!(round_one.len(), 1);
    assert_eq!(cipher.decrypt(&round_one[0].body).unwrap(), b"a");
    assert!(client.poll_messages("pump", "bob", Some("round-1")).await.unwrap().is_empty());

    client.delete_message("pump", "alice", &round_one[0].hash, Some("round-1")).await.unwrap();
    assert!(client.poll_messages("pump", "alice", Some("round-1")).await.unwrap().is_empty());
    assert_eq!(client.poll_messages("pump", "alice", Some("round-2")).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_pump_applies_frames_in_sequence_order_until_stopped() {
    let relay = spawn_relay().await.unwrap();
    let client = RelayClient::new(&relay.url).unwrap();
    let cipher = SessionCipher::from_hex(TEST_SESSION_KEY).unwrap();
    let engine = Arc::new(RecordingEngine::default());

    // Posted out of order
    for (sequence_no, body) in [(2, "third"), (0, "first"), (1, "second")] {
        client
            .post_message("pump", Some("round"), &frame(&cipher, "bob", "alice", sequence_no, body))
            .await
            .unwrap();
    }

    let mut pump = MessagePump::new(
        client.clone(),
        cipher.clone(),
        "pump",
        "alice",
        engine.clone(),
        Duration::from_millis(20),
    );
    pump.start("round").await;
    assert_eq!(pump.message_id(), Some("round"));

    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.frames.lock().unwrap().len() < 3 || relay.state.pending_messages() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(*engine.frames.lock().unwrap(), vec!["first", "second", "third"]);

    pump.stop().await;
    assert!(!pump.is_running());
    // Stopping again is a no-op
    pump.stop().await;

    // Nothing is consumed once stopped
    client
        .post_message("pump", Some("round"), &frame(&cipher, "bob", "alice", 3, "late"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.frames.lock().unwrap().len(), 3);
    assert_eq!(relay.state.pending_messages(), 1);
}

#[tokio::test]
#[serial]
async fn test_pump_restarts_on_a_new_round() {
    let relay = spawn_relay().await.unwrap();
    let client = RelayClient::new(&relay.url).unwrap();
    let cipher = SessionCipher::from_hex(TEST_SESSION_KEY).unwrap();
    let engine = Arc::new(RecordingEngine::default());

    client
        .post_message("pump", Some("round-1"), &frame(&cipher, "bob", "alice", 0, "one"))
        .await
        .unwrap();
    client
        .post_message("pump", Some("round-2"), &frame(&cipher, "bob", "alice", 1, "two"))
        .await
        .unwrap();

    let poll = Duration::from_millis(20);
    let mut pump = MessagePump::new(client, cipher, "pump", "alice", engine.clone(), poll);
    pump.start("round-2").await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.frames.lock().unwrap().is_empty() || relay.state.pending_messages() > 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    pump.stop().await;

    // Frames for other rounds are left alone
    assert_eq!(*engine.frames.lock().unwrap(), vec!["two"]);
    assert_eq!(relay.state.pending_messages(), 1);
}

#[tokio::test]
#[serial]
async fn test_frames_sharing_a_hash_from_different_senders_are_both_applied() {
    let relay = spawn_relay().await.unwrap();
    let client = RelayClient::new(&relay.url).unwrap();
    let cipher = SessionCipher::from_hex(TEST_SESSION_KEY).unwrap();
    let engine = Arc::new(RecordingEngine::default());

    for (sequence_no, from) in [(0, "bob"), (1, "carol")] {
        let mut message = frame(&cipher, from, "alice", sequence_no, from);
        message.hash = "shared".to_string();
        client.post_message("pump", Some("round"), &message).await.unwrap();
    }

    let poll = Duration::from_millis(20);
    let mut pump = MessagePump::new(client, cipher, "pump", "alice", engine.clone(), poll);
    pump.start("round").await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.frames.lock().unwrap().len() < 2 || relay.state.pending_messages() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    pump.stop().await;

    assert_eq!(*engine.frames.lock().unwrap(), vec!["bob", "carol"]);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_closed_messenger_refuses_frames() {
    let relay = spawn_relay().await.unwrap();
    let client = RelayClient::new(&relay.url).unwrap();
    let cipher = SessionCipher::from_hex(TEST_SESSION_KEY).unwrap();

    let messenger = Arc::new(RelayMessenger::new(client, "pump", cipher).unwrap());
    messenger.set_message_id(Some("round".to_string()));

    let sender = messenger.clone();
    tokio::task::spawn_blocking(move || sender.send("alice", "bob", "before"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(relay.state.posted_messages(), 1);

    messenger.close();
    assert!(messenger.is_closed());
    assert_eq!(messenger.message_id(), None);

    let sender = messenger.clone();
    let refused =
        tokio::task::spawn_blocking(move || sender.send("alice", "bob", "after")).await.unwrap();
    assert!(matches!(refused, Err(EngineErr::SessionClosed)));
    assert_eq!(relay.state.posted_messages(), 1);
}
