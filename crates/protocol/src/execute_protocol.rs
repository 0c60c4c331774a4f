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

//! Drives the signing rounds of a keysign.
//!
//! Messages are signed strictly one after another. Each round owns the message pump for its
//! duration and moves through `Idle -> Signing -> {Verifying, Completed, Failed}`, where a failed
//! signing attempt is cross-checked with the relay's completion record before being retried.
use std::{sync::Arc, time::Duration};

use keysign_shared::{
    constants::{MAX_SIGNING_RETRIES, MESSAGE_POLL_INTERVAL_MILLIS, RETRY_BACKOFF_MILLIS},
    KeyType, SigningSession, Vault,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{
    derivation::SignerPublicKey,
    engine::{RelayMessenger, ThresholdEngineFactory, VaultStateAccessor},
    errors::KeysignErr,
    message_id,
    message_pump::MessagePump,
    protocol_transport::RelayClient,
    sign_and_encrypt::SessionCipher,
    signing_driver::SigningDriver,
    verifier::CompletionVerifier,
    KeysignResponse, SignatureTable,
};

/// How failed signing attempts are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_SIGNING_RETRIES,
            backoff: Duration::from_millis(RETRY_BACKOFF_MILLIS),
        }
    }
}

/// Per message round state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Idle,
    Signing,
    Verifying,
    Completed,
    Failed,
}

/// The account a keysign signs for
#[derive(Debug, Clone)]
pub struct SigningTarget {
    pub vault: Vault,
    pub committee: Vec<String>,
    pub key_type: KeyType,
    pub derivation_path: String,
    /// Every signature must verify against this
    pub signer: SignerPublicKey,
}

impl SigningTarget {
    pub fn new(
        vault: &Vault,
        committee: &[String],
        key_type: KeyType,
        derivation_path: &str,
    ) -> Result<Self, KeysignErr> {
        Ok(Self {
            vault: vault.clone(),
            committee: committee.to_vec(),
            key_type,
            derivation_path: derivation_path.to_string(),
            signer: SignerPublicKey::for_vault(vault, key_type, derivation_path)?,
        })
    }
}

/// One engine instance wired to a relay session, signing messages with bounded retries
pub struct KeysignService {
    session_id: String,
    messenger: Arc<RelayMessenger>,
    driver: SigningDriver,
    pump: MessagePump,
    verifier: CompletionVerifier,
    policy: RetryPolicy,
    shutdown: watch::Receiver<bool>,
}

impl KeysignService {
    /// Create the engine instance for a session.
    ///
    /// Setting `shutdown` to `true` abandons the round in flight and any pending retry.
    pub fn new(
        session: &SigningSession,
        vault: &Vault,
        factory: &dyn ThresholdEngineFactory,
        policy: RetryPolicy,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, KeysignErr> {
        Self::with_poll_interval(
            session,
            vault,
            factory,
            policy,
            Duration::from_millis(MESSAGE_POLL_INTERVAL_MILLIS),
            shutdown,
        )
    }

    pub fn with_poll_interval(
        session: &SigningSession,
        vault: &Vault,
        factory: &dyn ThresholdEngineFactory,
        policy: RetryPolicy,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, KeysignErr> {
        let relay = RelayClient::new(&session.server_address)?;
        let cipher = SessionCipher::from_hex(&session.encryption_key_hex)?;
        let messenger =
            Arc::new(RelayMessenger::new(relay.clone(), &session.session_id, cipher.clone())?);
        let is_initiate_device = session.committee.first() == Some(&vault.local_party_id);
        let engine = factory.new_service(
            messenger.clone(),
            Arc::new(VaultStateAccessor::new(vault.clone())),
            is_initiate_device,
        )?;

        Ok(Self {
            session_id: session.session_id.clone(),
            messenger,
            driver: SigningDriver::new(engine.clone()),
            pump: MessagePump::new(
                relay.clone(),
                cipher,
                &session.session_id,
                &vault.local_party_id,
                engine,
                poll_interval,
            ),
            verifier: CompletionVerifier::new(relay, &session.session_id),
            policy,
            shutdown,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Sign every message in order. The first message which fails aborts the rest.
    ///
    /// `on_round` is called with the index of each message as its round starts.
    pub async fn sign_messages(
        &mut self,
        target: &SigningTarget,
        messages: &[String],
        mut on_round: impl FnMut(usize),
    ) -> Result<SignatureTable, KeysignErr> {
        let mut table = SignatureTable::new();
        for (index, message) in messages.iter().enumerate() {
            on_round(index);
            self.sign_message(target, message, &mut table).await?;
        }
        Ok(table)
    }

    /// Run the round for one message, recording its verified signature in `table`
    #[tracing::instrument(
        skip_all,
        fields(session_id = %self.session_id, message = %message),
        level = tracing::Level::DEBUG
    )]
    pub async fn sign_message(
        &mut self,
        target: &SigningTarget,
        message: &str,
        table: &mut SignatureTable,
    ) -> Result<(), KeysignErr> {
        let message_id = message_id(message);
        let mut state = RoundState::Idle;
        let mut attempt = 0;

        loop {
            attempt += 1;
            transition(&mut state, RoundState::Signing);
            self.messenger.set_message_id(Some(message_id.clone()));
            self.pump.start(&message_id).await;

            let outcome = tokio::select! {
                outcome = self.driver.sign(
                    &target.vault,
                    &target.committee,
                    &target.derivation_path,
                    message,
                    target.key_type,
                ) => outcome,
                _ = closed(&mut self.shutdown) => {
                    self.close().await;
                    return Err(KeysignErr::Cancelled);
                }
            };
            self.pump.stop().await;

            let error = match outcome {
                Ok(response) => {
                    if let Err(source) = target.signer.verify(message, &response) {
                        transition(&mut state, RoundState::Failed);
                        return Err(KeysignErr::SignatureMismatch {
                            message: message.to_string(),
                            source,
                        });
                    }
                    table.insert(message, response.clone())?;
                    transition(&mut state, RoundState::Completed);
                    if let Err(err) = self.verifier.mark_complete(message, &response).await {
                        tracing::warn!("Could not mark {message} complete on the relay: {err}");
                    }
                    return Ok(());
                },
                Err(error) => error,
            };

            tracing::warn!("Signing attempt {attempt} failed: {error}");
            transition(&mut state, RoundState::Verifying);
            if let Some(response) = self.completed_by_peer(target, message).await {
                tracing::info!("A peer already signed {message}");
                table.insert(message, response)?;
                transition(&mut state, RoundState::Completed);
                return Ok(());
            }

            if attempt > self.policy.max_retries {
                transition(&mut state, RoundState::Failed);
                return Err(KeysignErr::RetriesExhausted { attempts: attempt, source: error });
            }

            tokio::select! {
                _ = tokio::time::sleep(self.policy.backoff) => {}
                _ = closed(&mut self.shutdown) => {
                    self.close().await;
                    return Err(KeysignErr::Cancelled);
                }
            }
        }
    }

    /// Stop pumping frames and refuse any the engine still sends.
    ///
    /// A round abandoned mid-protocol keeps its blocking engine call until the engine next
    /// sends, which then fails with [crate::errors::EngineErr::SessionClosed].
    pub async fn close(&mut self) {
        self.messenger.close();
        self.pump.stop().await;
    }

    /// A verified signature some peer recorded on the relay
    async fn completed_by_peer(
        &self,
        target: &SigningTarget,
        message: &str,
    ) -> Option<KeysignResponse> {
        match self.verifier.check_complete(message).await {
            Ok(Some(response)) => match target.signer.verify(message, &response) {
                Ok(()) => Some(response),
                Err(err) => {
                    tracing::warn!("Ignoring completion record for {message}: {err}");
                    None
                },
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!("Could not check completion of {message}: {err}");
                None
            },
        }
    }
}

fn transition(state: &mut RoundState, next: RoundState) {
    tracing::debug!("{:?} -> {:?}", state, next);
    *state = next;
}

/// Resolves once the session is closed. Never resolves if nobody can close it.
async fn closed(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
