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

//! Feeds inbound relay frames for the current signing round into the engine
use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    engine::ThresholdEngine, errors::EngineErr, protocol_transport::RelayClient,
    sign_and_encrypt::SessionCipher,
};

/// Polls the relay for one round at a time. Only one poll loop runs per pump.
pub struct MessagePump {
    relay: RelayClient,
    cipher: SessionCipher,
    session_id: String,
    local_party_id: String,
    engine: Arc<dyn ThresholdEngine>,
    poll_interval: Duration,
    running: Option<RunningPump>,
}

struct RunningPump {
    message_id: String,
    stop_signal_tx: mpsc::Sender<()>,
    join_handle: JoinHandle<()>,
}

/// What the poll loop needs, moved into its task
struct PumpContext {
    relay: RelayClient,
    cipher: SessionCipher,
    session_id: String,
    local_party_id: String,
    message_id: String,
    engine: Arc<dyn ThresholdEngine>,
    /// Frames applied this round by sender and hash, in case a delete did not reach the relay
    applied: HashSet<(String, String)>,
}

impl MessagePump {
    pub fn new(
        relay: RelayClient,
        cipher: SessionCipher,
        session_id: &str,
        local_party_id: &str,
        engine: Arc<dyn ThresholdEngine>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            relay,
            cipher,
            session_id: session_id.to_string(),
            local_party_id: local_party_id.to_string(),
            engine,
            poll_interval,
            running: None,
        }
    }

    /// Start pumping frames for `message_id`, stopping any previous round first
    pub async fn start(&mut self, message_id: &str) {
        self.stop().await;

        let mut context = PumpContext {
            relay: self.relay.clone(),
            cipher: self.cipher.clone(),
            session_id: self.session_id.clone(),
            local_party_id: self.local_party_id.clone(),
            message_id: message_id.to_string(),
            engine: self.engine.clone(),
            applied: HashSet::new(),
        };
        let poll_interval = self.poll_interval;
        let (stop_signal_tx, mut stop_signal_rx) = mpsc::channel::<()>(1);
        let join_handle = tokio::spawn(async move {
            tracing::debug!("Message pump started for {}", context.message_id);
            loop {
                tokio::select! {
                    result = context.pull_once() => {
                        if let Err(err) = result {
                            let message_id = &context.message_id;
                            tracing::warn!("Failed to pull frames for {message_id}: {err}");
                        }
                    }
                    _ = stop_signal_rx.recv() => break,
                }
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = stop_signal_rx.recv() => break,
                }
            }
            tracing::debug!("Message pump stopped for {}", context.message_id);
        });

        self.running =
            Some(RunningPump { message_id: message_id.to_string(), stop_signal_tx, join_handle });
    }

    /// Stop the current round's poll loop and wait for it to exit.
    ///
    /// Safe to call any number of times, and when the loop has already exited.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else { return };
        // An error here means the loop already exited
        let _ = running.stop_signal_tx.try_send(());
        if let Err(err) = running.join_handle.await {
            tracing::warn!("Message pump for {} ended abnormally: {err}", running.message_id);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|running| !running.join_handle.is_finished())
    }

    /// Message id of the round being pumped
    pub fn message_id(&self) -> Option<&str> {
        self.running.as_ref().map(|running| running.message_id.as_str())
    }
}

impl Drop for MessagePump {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.join_handle.abort();
        }
    }
}

impl PumpContext {
    /// Apply every waiting frame in sequence order and delete it from the relay
    async fn pull_once(&mut self) -> Result<(), EngineErr> {
        let mut messages = self
            .relay
            .poll_messages(&self.session_id, &self.local_party_id, Some(&self.message_id))
            .await?;
        messages.sort_by_key(|message| message.sequence_no);

        for message in messages {
            if message.from == self.local_party_id {
                continue;
            }
            if self.applied.insert((message.from.clone(), message.hash.clone())) {
                self.apply(&message.body, &message.hash, &message.from);
            }
            self.relay
                .delete_message(
                    &self.session_id,
                    &self.local_party_id,
                    &message.hash,
                    Some(&self.message_id),
                )
                .await?;
        }
        Ok(())
    }

    fn apply(&self, body: &str, hash: &str, from: &str) {
        let frame = match self.cipher.decrypt(body) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!("Dropping frame {hash} from {from}: {err}");
                return;
            },
        };
        if let Err(err) = self.engine.apply_data(&String::from_utf8_lossy(&frame)) {
            tracing::warn!("Engine rejected frame {hash} from {from}: {err}");
        }
    }
}
