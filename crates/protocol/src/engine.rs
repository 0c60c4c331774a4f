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

//! The boundary with the external threshold signing engine.
//!
//! The engine runs a signing protocol synchronously. It sends frames to peers through a
//! [Messenger] and receives theirs through [ThresholdEngine::apply_data], which the message pump
//! calls as frames arrive from the relay.
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, RwLock,
};

use keysign_shared::Vault;
use md5::{Digest, Md5};
use tokio::runtime::Handle;

use crate::{
    errors::EngineErr, protocol_transport::RelayClient, sign_and_encrypt::SessionCipher,
    KeysignResponse, RelayMessage,
};

/// Request handed to the engine for one message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeysignRequest {
    pub local_party_key: String,
    /// Comma separated committee party ids
    pub keysign_committee_keys: String,
    /// base64 of the message bytes
    pub message_to_sign: String,
    pub derive_path: String,
    pub pub_key: String,
}

/// Outbound frames from the engine
pub trait Messenger: Send + Sync {
    fn send(&self, from: &str, to: &str, body: &str) -> Result<(), EngineErr>;
}

/// Gives the engine access to the local keyshare
pub trait LocalStateAccessor: Send + Sync {
    fn get_local_state(&self, pub_key: &str) -> Result<String, EngineErr>;
    fn save_local_state(&self, pub_key: &str, state: &str) -> Result<(), EngineErr>;
}

/// One instance of the threshold engine, bound to a messenger and keyshare store
pub trait ThresholdEngine: Send + Sync {
    /// Run ECDSA signing. Blocks until the protocol finishes or fails.
    fn keysign_ecdsa(&self, request: &KeysignRequest) -> Result<KeysignResponse, EngineErr>;
    /// Run EdDSA signing. Blocks until the protocol finishes or fails.
    fn keysign_eddsa(&self, request: &KeysignRequest) -> Result<KeysignResponse, EngineErr>;
    /// Feed a decrypted inbound frame into the running protocol
    fn apply_data(&self, frame: &str) -> Result<(), EngineErr>;
}

/// Creates engine instances, `newService` in the engine's own terms
pub trait ThresholdEngineFactory: Send + Sync {
    fn new_service(
        &self,
        messenger: Arc<dyn Messenger>,
        state: Arc<dyn LocalStateAccessor>,
        is_initiate_device: bool,
    ) -> Result<Arc<dyn ThresholdEngine>, EngineErr>;
}

/// Serves keyshares out of a vault. Keysign never changes them so saves are dropped.
#[derive(Debug, Clone)]
pub struct VaultStateAccessor {
    vault: Vault,
}

impl VaultStateAccessor {
    pub fn new(vault: Vault) -> Self {
        Self { vault }
    }
}

impl LocalStateAccessor for VaultStateAccessor {
    fn get_local_state(&self, pub_key: &str) -> Result<String, EngineErr> {
        self.vault
            .key_shares
            .iter()
            .find(|share| share.pub_key == pub_key)
            .map(|share| share.keyshare.clone())
            .ok_or_else(|| EngineErr::MissingKeyShare(pub_key.to_string()))
    }

    fn save_local_state(&self, _pub_key: &str, _state: &str) -> Result<(), EngineErr> {
        Ok(())
    }
}

/// Encrypts engine frames and posts them to the relay under the current round's message id
pub struct RelayMessenger {
    relay: RelayClient,
    session_id: String,
    cipher: SessionCipher,
    message_id: RwLock<Option<String>>,
    sequence_no: AtomicU64,
    /// Set once the session is torn down. Frames are refused from then on.
    closed: AtomicBool,
    runtime: Handle,
}

impl RelayMessenger {
    /// Must be created from within a tokio runtime, frames are posted on it
    pub fn new(
        relay: RelayClient,
        session_id: &str,
        cipher: SessionCipher,
    ) -> Result<Self, EngineErr> {
        Ok(Self {
            relay,
            session_id: session_id.to_string(),
            cipher,
            message_id: RwLock::new(None),
            sequence_no: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            runtime: Handle::try_current()?,
        })
    }

    /// Route subsequent frames to a signing round
    pub fn set_message_id(&self, message_id: Option<String>) {
        *self.message_id.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = message_id;
    }

    pub fn message_id(&self) -> Option<String> {
        self.message_id.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Refuse every later frame, so an engine still running a round fails on its next send
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.set_message_id(None);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Messenger for RelayMessenger {
    /// Called from the engine's blocking thread, never from async context
    fn send(&self, from: &str, to: &str, body: &str) -> Result<(), EngineErr> {
        if self.is_closed() {
            return Err(EngineErr::SessionClosed);
        }
        let message = RelayMessage {
            session_id: self.session_id.clone(),
            from: from.to_string(),
            to: vec![to.to_string()],
            body: self.cipher.encrypt(body.as_bytes())?,
            hash: hex::encode(Md5::digest(body.as_bytes())),
            sequence_no: self.sequence_no.fetch_add(1, Ordering::SeqCst),
        };
        let message_id = self.message_id();
        tracing::trace!("Sending frame {} to {}", message.sequence_no, to);
        self.runtime.block_on(self.relay.post_message(
            &self.session_id,
            message_id.as_deref(),
            &message,
        ))?;
        Ok(())
    }
}
