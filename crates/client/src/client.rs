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

//! Running a keysign end to end: signing rounds over the relay, assembly and broadcast.
//! Used by wallet front ends and the test-cli
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use futures::Stream;
use keysign_protocol::{
    execute_protocol::SigningTarget, KeysignService, RelayClient, RetryPolicy,
    ThresholdEngineFactory,
};
use keysign_shared::{
    constants::{COMPLETION_LINGER_MILLIS, MESSAGE_POLL_INTERVAL_MILLIS},
    KeyType, KeysignPayload, SigningSession, Vault,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    broadcast::BroadcastDispatcher,
    chains::{assemble_signed_transactions, pre_signed_image_hashes},
    config::Configuration,
    discovery::session_closed,
    errors::{ChainError, ClientError},
};

/// Progress of a keysign, as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeysignEvent {
    CreatingInstance,
    /// Round `index` of `total` started
    SigningRound { index: usize, total: usize },
    /// The transaction id of the last transaction the keysign produced
    Finished(String),
    Error(String),
}

/// Everything a device needs to take part in one keysign
#[derive(Debug, Clone)]
pub struct KeysignParams {
    pub vault: Vault,
    pub session: SigningSession,
    /// Hex messages, in signing order
    pub messages: Vec<String>,
    pub key_type: KeyType,
    pub payload: KeysignPayload,
}

impl KeysignParams {
    /// Parameters signing exactly the messages `payload` needs
    pub fn for_payload(
        vault: &Vault,
        session: &SigningSession,
        payload: &KeysignPayload,
    ) -> Result<Self, ChainError> {
        Ok(Self {
            vault: vault.clone(),
            session: session.clone(),
            messages: pre_signed_image_hashes(vault, payload)?,
            key_type: payload.coin.chain.key_type(),
            payload: payload.clone(),
        })
    }

    /// The initiating device starts the session, broadcasts the result and ends the session
    pub fn is_initiate_device(&self) -> bool {
        self.session.committee.first() == Some(&self.vault.local_party_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeysignOptions {
    pub retry_policy: RetryPolicy,
    pub poll_interval: Duration,
    /// How long to keep the session open after the last round
    pub linger: Duration,
}

impl Default for KeysignOptions {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            poll_interval: Duration::from_millis(MESSAGE_POLL_INTERVAL_MILLIS),
            linger: Duration::from_millis(COMPLETION_LINGER_MILLIS),
        }
    }
}

impl From<&Configuration> for KeysignOptions {
    fn from(config: &Configuration) -> Self {
        Self { retry_policy: config.retry_policy, ..Default::default() }
    }
}

/// A running keysign. Yields [KeysignEvent]s until it finishes or fails.
pub struct KeysignHandle {
    events: UnboundedReceiverStream<KeysignEvent>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<Vec<String>, ClientError>>,
}

impl KeysignHandle {
    /// Tear down the session. The round in flight and any pending retry are abandoned.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait for the keysign to end, returning the ids of the broadcast transactions, or the
    /// hashes of the assembled ones on devices which do not broadcast
    pub async fn join(self) -> Result<Vec<String>, ClientError> {
        self.task.await.map_err(|_| ClientError::Cancelled)?
    }
}

impl Stream for KeysignHandle {
    type Item = KeysignEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

/// Start a keysign for a session whose committee is already known
pub fn start_keysign(
    params: KeysignParams,
    factory: Arc<dyn ThresholdEngineFactory>,
    dispatcher: Arc<BroadcastDispatcher>,
    options: KeysignOptions,
) -> KeysignHandle {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let result =
            run_keysign(&params, factory.as_ref(), &dispatcher, options, shutdown_rx, &events_tx)
                .await;
        let event = match &result {
            Ok(tx_ids) => KeysignEvent::Finished(tx_ids.last().cloned().unwrap_or_default()),
            Err(err) => {
                tracing::error!("Keysign failed: {err}");
                KeysignEvent::Error(err.to_string())
            },
        };
        let _ = events_tx.send(event);
        result
    });

    KeysignHandle { events: UnboundedReceiverStream::new(events_rx), shutdown: shutdown_tx, task }
}

#[tracing::instrument(
    skip_all,
    fields(session_id = %params.session.session_id, party_id = %params.vault.local_party_id),
    level = tracing::Level::DEBUG
)]
async fn run_keysign(
    params: &KeysignParams,
    factory: &dyn ThresholdEngineFactory,
    dispatcher: &BroadcastDispatcher,
    options: KeysignOptions,
    mut shutdown: watch::Receiver<bool>,
    events: &mpsc::UnboundedSender<KeysignEvent>,
) -> Result<Vec<String>, ClientError> {
    let KeysignParams { vault, session, messages, key_type, payload } = params;
    let chain = payload.coin.chain;
    if *key_type != chain.key_type() {
        let reason = format!("{chain} does not sign with {key_type}");
        return Err(ChainError::InvalidPayload(reason).into());
    }
    if pre_signed_image_hashes(vault, payload)? != *messages {
        let reason = "messages do not match the payload".to_string();
        return Err(ChainError::InvalidPayload(reason).into());
    }

    let _ = events.send(KeysignEvent::CreatingInstance);
    let target = SigningTarget::new(vault, &session.committee, *key_type, chain.derivation_path())?;
    let mut service = KeysignService::with_poll_interval(
        session,
        vault,
        factory,
        options.retry_policy,
        options.poll_interval,
        shutdown.clone(),
    )?;

    let total = messages.len();
    let signed = service
        .sign_messages(&target, messages, |index| {
            let _ = events.send(KeysignEvent::SigningRound { index, total });
        })
        .await;
    service.close().await;
    let signatures = signed?;

    let transactions = assemble_signed_transactions(vault, payload, &signatures)?;
    let tx_ids = if params.is_initiate_device() {
        dispatcher.broadcast_all(chain, &transactions).await?
    } else {
        transactions.into_iter().map(|transaction| transaction.transaction_hash).collect()
    };

    if params.is_initiate_device() {
        // Peers may still be reading the last round's frames
        tokio::select! {
            _ = tokio::time::sleep(options.linger) => {},
            _ = session_closed(&mut shutdown) => {},
        }
        let relay = RelayClient::new(&session.server_address)?;
        if let Err(err) = relay.end_session(&session.session_id).await {
            tracing::warn!("Could not end session: {err}");
        }
    }
    Ok(tx_ids)
}
