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

//! Test vaults and direct signing with the test keys
use base64::prelude::{Engine, BASE64_STANDARD};
use ed25519_dalek::Signer;
use k256::ecdsa::SigningKey;
use keysign_protocol::{derivation::derive_public_key, KeysignResponse, SignatureTable};
use keysign_shared::{KeyShare, KeyType, SigningSession, Vault};

use crate::{
    constants::{
        TEST_CHAIN_CODE, TEST_ECDSA_PUBLIC_KEY, TEST_ECDSA_SECRET, TEST_EDDSA_PUBLIC_KEY,
        TEST_EDDSA_SEED, TEST_PARTIES, TEST_SESSION_KEY,
    },
    engine::{ecdsa_response, eddsa_response, LocalKeyShare},
};

/// The test vault as seen by `local_party_id`
pub fn test_vault(local_party_id: &str) -> Vault {
    let ecdsa_share = LocalKeyShare {
        secret: hex::encode(TEST_ECDSA_SECRET),
        chain_code: TEST_CHAIN_CODE.to_string(),
    };
    let eddsa_share =
        LocalKeyShare { secret: hex::encode(TEST_EDDSA_SEED), chain_code: String::new() };
    Vault {
        name: "Test Vault".to_string(),
        pub_key_ecdsa: TEST_ECDSA_PUBLIC_KEY.to_string(),
        pub_key_eddsa: TEST_EDDSA_PUBLIC_KEY.to_string(),
        hex_chain_code: TEST_CHAIN_CODE.to_string(),
        local_party_id: local_party_id.to_string(),
        signers: TEST_PARTIES.clone(),
        key_shares: vec![
            KeyShare {
                pub_key: TEST_ECDSA_PUBLIC_KEY.to_string(),
                keyshare: serde_json::json!(ecdsa_share).to_string(),
            },
            KeyShare {
                pub_key: TEST_EDDSA_PUBLIC_KEY.to_string(),
                keyshare: serde_json::json!(eddsa_share).to_string(),
            },
        ],
    }
}

/// The test vault with keyshares which do not belong to its public keys
pub fn test_vault_with_wrong_shares(local_party_id: &str) -> Vault {
    let mut vault = test_vault(local_party_id);
    for share in vault.key_shares.iter_mut() {
        let wrong = LocalKeyShare {
            secret: hex::encode([0x17u8; 32]),
            chain_code: TEST_CHAIN_CODE.to_string(),
        };
        share.keyshare = serde_json::json!(wrong).to_string();
    }
    vault
}

pub fn test_session(
    server_address: &str,
    session_id: &str,
    committee: &[String],
) -> SigningSession {
    SigningSession {
        session_id: session_id.to_string(),
        encryption_key_hex: TEST_SESSION_KEY.to_string(),
        server_address: server_address.to_string(),
        committee: committee.to_vec(),
    }
}

/// Sign a hex message with the test vault's key for `derivation_path`, as the committee would
pub fn sign_with_test_vault(
    message: &str,
    key_type: KeyType,
    derivation_path: &str,
) -> anyhow::Result<KeysignResponse> {
    let bytes = hex::decode(message)?;
    let msg = BASE64_STANDARD.encode(&bytes);
    match key_type {
        KeyType::Ecdsa => {
            let derived =
                derive_public_key(TEST_ECDSA_PUBLIC_KEY, TEST_CHAIN_CODE, derivation_path)?;
            let root = SigningKey::from_slice(&TEST_ECDSA_SECRET)?;
            let child = SigningKey::from_bytes(
                &(*root.as_nonzero_scalar().as_ref() + derived.tweak).to_bytes(),
            )?;
            let (signature, recovery_id) = child.sign_prehash_recoverable(&bytes)?;
            Ok(ecdsa_response(&msg, &signature, recovery_id))
        },
        KeyType::Eddsa => {
            let key = ed25519_dalek::SigningKey::from_bytes(&TEST_EDDSA_SEED);
            Ok(eddsa_response(&msg, &key.sign(&bytes)))
        },
    }
}

/// A signature table covering `messages`
pub fn signature_table_for(
    messages: &[String],
    key_type: KeyType,
    derivation_path: &str,
) -> anyhow::Result<SignatureTable> {
    let mut table = SignatureTable::new();
    for message in messages {
        table.insert(message, sign_with_test_vault(message, key_type, derivation_path)?)?;
    }
    Ok(table)
}

/// Public key of the test vault's account on a chain, hex
pub fn test_account_public_key(key_type: KeyType, derivation_path: &str) -> anyhow::Result<String> {
    Ok(match key_type {
        KeyType::Ecdsa => keysign_protocol::derivation::derive_public_key_hex(
            TEST_ECDSA_PUBLIC_KEY,
            TEST_CHAIN_CODE,
            derivation_path,
        )?,
        KeyType::Eddsa => TEST_EDDSA_PUBLIC_KEY.to_string(),
    })
}

/// Log to stdout in tests, once
pub fn setup_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .with_test_writer()
        .try_init();
}
