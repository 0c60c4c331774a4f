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

//! Threshold engines for tests.
//!
//! [LocalEngineFactory] stands in for the MPC library. Every party holds the whole key and signs
//! deterministically, but a party only signs once it has heard from every other committee member
//! through the relay. That exercises the same transport, pump and retry paths as the real engine.
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc, Mutex,
    },
    time::{Duration, Instant},
};

use base64::prelude::{Engine, BASE64_STANDARD};
use ed25519_dalek::Signer;
use k256::ecdsa::SigningKey;
use keysign_protocol::{
    derivation::derive_public_key, errors::EngineErr, KeysignRequest, KeysignResponse,
    LocalStateAccessor, Messenger, ThresholdEngine, ThresholdEngineFactory,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// How long a local engine waits for its peers by default
pub const LOCAL_ENGINE_TIMEOUT: Duration = Duration::from_secs(10);

/// Keyshare format understood by the local engine: the full secret
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalKeyShare {
    /// ECDSA secret scalar or Ed25519 seed, hex
    pub secret: String,
    /// Chain code for ECDSA derivation, hex
    #[serde(default)]
    pub chain_code: String,
}

/// A frame announcing that a party has joined the round for a message
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ReadyFrame {
    from: String,
    message: String,
}

#[derive(Clone)]
pub struct LocalEngineFactory {
    timeout: Duration,
}

impl Default for LocalEngineFactory {
    fn default() -> Self {
        Self { timeout: LOCAL_ENGINE_TIMEOUT }
    }
}

impl LocalEngineFactory {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ThresholdEngineFactory for LocalEngineFactory {
    fn new_service(
        &self,
        messenger: Arc<dyn Messenger>,
        state: Arc<dyn LocalStateAccessor>,
        _is_initiate_device: bool,
    ) -> Result<Arc<dyn ThresholdEngine>, EngineErr> {
        let (inbox_tx, inbox_rx) = mpsc::channel();
        Ok(Arc::new(LocalThresholdEngine {
            messenger,
            state,
            inbox_tx,
            inbox_rx: Mutex::new(inbox_rx),
            timeout: self.timeout,
        }))
    }
}

pub struct LocalThresholdEngine {
    messenger: Arc<dyn Messenger>,
    state: Arc<dyn LocalStateAccessor>,
    inbox_tx: mpsc::Sender<ReadyFrame>,
    inbox_rx: Mutex<mpsc::Receiver<ReadyFrame>>,
    timeout: Duration,
}

impl LocalThresholdEngine {
    /// Tell every peer we are in the round for this message, then wait to hear from all of them
    fn exchange_ready(&self, request: &KeysignRequest) -> Result<(), EngineErr> {
        let frame = serde_json::to_string(&ReadyFrame {
            from: request.local_party_key.clone(),
            message: request.message_to_sign.clone(),
        })
        .map_err(|e| EngineErr::Protocol(e.to_string()))?;

        let mut waiting: HashSet<&str> = request
            .keysign_committee_keys
            .split(',')
            .filter(|party| !party.is_empty() && *party != request.local_party_key)
            .collect();
        for peer in &waiting {
            self.messenger.send(&request.local_party_key, peer, &frame)?;
        }

        let inbox = self.inbox_rx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let deadline = Instant::now() + self.timeout;
        while !waiting.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let frame = inbox.recv_timeout(remaining).map_err(|_| {
                EngineErr::Timeout(format!("frames from {}", sorted_parties(&waiting)))
            })?;
            if frame.message == request.message_to_sign {
                waiting.remove(frame.from.as_str());
            }
        }
        Ok(())
    }

    fn key_share(&self, request: &KeysignRequest) -> Result<LocalKeyShare, EngineErr> {
        let state = self.state.get_local_state(&request.pub_key)?;
        serde_json::from_str(&state).map_err(|e| EngineErr::Protocol(e.to_string()))
    }
}

impl ThresholdEngine for LocalThresholdEngine {
    fn keysign_ecdsa(&self, request: &KeysignRequest) -> Result<KeysignResponse, EngineErr> {
        self.exchange_ready(request)?;
        let share = self.key_share(request)?;
        let derived = derive_public_key(&request.pub_key, &share.chain_code, &request.derive_path)
            .map_err(|e| EngineErr::Protocol(e.to_string()))?;

        let mut secret = hex::decode(&share.secret)?;
        let root = SigningKey::from_slice(&secret).map_err(|e| EngineErr::Protocol(e.to_string()));
        secret.zeroize();
        let child_secret = *root?.as_nonzero_scalar().as_ref() + derived.tweak;
        let child = SigningKey::from_bytes(&child_secret.to_bytes())
            .map_err(|e| EngineErr::Protocol(e.to_string()))?;

        let prehash = BASE64_STANDARD
            .decode(&request.message_to_sign)
            .map_err(|e| EngineErr::Protocol(e.to_string()))?;
        let (signature, recovery_id) = child
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| EngineErr::Protocol(e.to_string()))?;
        Ok(ecdsa_response(&request.message_to_sign, &signature, recovery_id))
    }

    fn keysign_eddsa(&self, request: &KeysignRequest) -> Result<KeysignResponse, EngineErr> {
        self.exchange_ready(request)?;
        let share = self.key_share(request)?;
        let seed: [u8; 32] = hex::decode(&share.secret)?
            .try_into()
            .map_err(|_| EngineErr::Protocol("Ed25519 seed must be 32 bytes".to_string()))?;
        let key = ed25519_dalek::SigningKey::from_bytes(&seed);

        let message = BASE64_STANDARD
            .decode(&request.message_to_sign)
            .map_err(|e| EngineErr::Protocol(e.to_string()))?;
        Ok(eddsa_response(&request.message_to_sign, &key.sign(&message)))
    }

    fn apply_data(&self, frame: &str) -> Result<(), EngineErr> {
        let frame: ReadyFrame =
            serde_json::from_str(frame).map_err(|e| EngineErr::Protocol(e.to_string()))?;
        self.inbox_tx.send(frame).map_err(|e| EngineErr::Protocol(e.to_string()))
    }
}

/// Format an ECDSA signature the way the engine reports it
pub fn ecdsa_response(
    msg: &str,
    signature: &k256::ecdsa::Signature,
    recovery_id: k256::ecdsa::RecoveryId,
) -> KeysignResponse {
    let bytes = signature.to_bytes();
    KeysignResponse {
        msg: msg.to_string(),
        r: hex::encode(&bytes[..32]),
        s: hex::encode(&bytes[32..]),
        der_signature: hex::encode(signature.to_der().as_bytes()),
        recovery_id: format!("{:02x}", recovery_id.to_byte()),
    }
}

/// Format an Ed25519 signature the way the engine reports it, scalars big endian
pub fn eddsa_response(msg: &str, signature: &ed25519_dalek::Signature) -> KeysignResponse {
    let mut r = signature.r_bytes().to_vec();
    let mut s = signature.s_bytes().to_vec();
    r.reverse();
    s.reverse();
    KeysignResponse {
        msg: msg.to_string(),
        r: hex::encode(r),
        s: hex::encode(s),
        der_signature: String::new(),
        recovery_id: String::new(),
    }
}

fn sorted_parties(parties: &HashSet<&str>) -> String {
    let mut parties: Vec<&str> = parties.iter().copied().collect();
    parties.sort();
    parties.join(", ")
}

/// Creates engines which fail every signing attempt, counting how often they were asked
#[derive(Clone, Default)]
pub struct FailingEngineFactory {
    pub attempts: Arc<AtomicUsize>,
}

impl FailingEngineFactory {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ThresholdEngineFactory for FailingEngineFactory {
    fn new_service(
        &self,
        _messenger: Arc<dyn Messenger>,
        _state: Arc<dyn LocalStateAccessor>,
        _is_initiate_device: bool,
    ) -> Result<Arc<dyn ThresholdEngine>, EngineErr> {
        Ok(Arc::new(FailingEngine { attempts: self.attempts.clone() }))
    }
}

struct FailingEngine {
    attempts: Arc<AtomicUsize>,
}

impl FailingEngine {
    fn fail(&self) -> Result<KeysignResponse, EngineErr> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        Err(EngineErr::Timeout(format!("peers, attempt {attempt}")))
    }
}

impl ThresholdEngine for FailingEngine {
    fn keysign_ecdsa(&self, _request: &KeysignRequest) -> Result<KeysignResponse, EngineErr> {
        self.fail()
    }

    fn keysign_eddsa(&self, _request: &KeysignRequest) -> Result<KeysignResponse, EngineErr> {
        self.fail()
    }

    fn apply_data(&self, _frame: &str) -> Result<(), EngineErr> {
        Ok(())
    }
}

/// Creates engines whose peers never answer. Each keeps resending its frame until the
/// messenger refuses it, then reports that refusal.
#[derive(Clone, Default)]
pub struct StalledEngineFactory {
    pub refusal: Arc<Mutex<Option<String>>>,
}

impl StalledEngineFactory {
    /// Why the engine gave up, once it has
    pub fn refusal(&self) -> Option<String> {
        self.refusal.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

impl ThresholdEngineFactory for StalledEngineFactory {
    fn new_service(
        &self,
        messenger: Arc<dyn Messenger>,
        _state: Arc<dyn LocalStateAccessor>,
        _is_initiate_device: bool,
    ) -> Result<Arc<dyn ThresholdEngine>, EngineErr> {
        Ok(Arc::new(StalledEngine { messenger, refusal: self.refusal.clone() }))
    }
}

struct StalledEngine {
    messenger: Arc<dyn Messenger>,
    refusal: Arc<Mutex<Option<String>>>,
}

impl StalledEngine {
    fn resend(&self, request: &KeysignRequest) -> Result<KeysignResponse, EngineErr> {
        loop {
            for peer in request.keysign_committee_keys.split(',') {
                if peer.is_empty() || peer == request.local_party_key {
                    continue;
                }
                if let Err(err) = self.messenger.send(&request.local_party_key, peer, "ready") {
                    *self.refusal.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
                        Some(err.to_string());
                    return Err(err);
                }
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

impl ThresholdEngine for StalledEngine {
    fn keysign_ecdsa(&self, request: &KeysignRequest) -> Result<KeysignResponse, EngineErr> {
        self.resend(request)
    }

    fn keysign_eddsa(&self, request: &KeysignRequest) -> Result<KeysignResponse, EngineErr> {
        self.resend(request)
    }

    fn apply_data(&self, _frame: &str) -> Result<(), EngineErr> {
        Ok(())
    }
}
