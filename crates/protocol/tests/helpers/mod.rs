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

//! Helpers for running committees of [KeysignService]s against a test relay
use std::time::Duration;

use keysign_protocol::{
    errors::KeysignErr, execute_protocol::SigningTarget, KeysignService, RetryPolicy,
    SignatureTable, ThresholdEngineFactory,
};
use keysign_shared::{KeyType, Vault};
use keysign_testing_utils::{constants::TEST_PARTIES, test_session};
use sha2::{Digest, Sha256};
use tokio::sync::watch;

pub const ETH_PATH: &str = "m/44'/60'/0'/0/0";

pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Retries quickly so failure paths finish fast
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy { max_retries: 3, backoff: Duration::from_millis(10) }
}

pub fn committee(size: usize) -> Vec<String> {
    TEST_PARTIES[..size].to_vec()
}

/// A 32 byte hex digest to sign
pub fn digest(seed: &str) -> String {
    hex::encode(Sha256::digest(seed.as_bytes()))
}

/// Run one party of a keysign to completion
#[allow(clippy::too_many_arguments)]
pub async fn run_party(
    relay_url: String,
    session_id: String,
    committee: Vec<String>,
    vault: Vault,
    messages: Vec<String>,
    key_type: KeyType,
    derivation_path: &str,
    factory: impl ThresholdEngineFactory,
    policy: RetryPolicy,
) -> Result<SignatureTable, KeysignErr> {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let session = test_session(&relay_url, &session_id, &committee);
    let mut service = KeysignService::with_poll_interval(
        &session,
        &vault,
        &factory,
        policy,
        POLL_INTERVAL,
        shutdown_rx,
    )?;
    let target = SigningTarget::new(&vault, &committee, key_type, derivation_path)?;
    let result = service.sign_messages(&target, &messages, |_| {}).await;
    service.close().await;
    result
}
