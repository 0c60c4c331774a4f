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

//! Relay transport, message pump and signing round execution for threshold keysign
pub mod derivation;
pub mod engine;
pub mod errors;
pub mod execute_protocol;
pub mod message_pump;
pub mod protocol_transport;
pub mod sign_and_encrypt;
pub mod signing_driver;
pub mod verifier;

use std::collections::{btree_map::Entry, BTreeMap};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

pub use derivation::SignerPublicKey;
pub use engine::{
    KeysignRequest, LocalStateAccessor, Messenger, ThresholdEngine, ThresholdEngineFactory,
};
use errors::KeysignErr;
pub use execute_protocol::{KeysignService, RetryPolicy};
pub use message_pump::MessagePump;
pub use protocol_transport::{RelayClient, RelayMessage};
pub use sign_and_encrypt::SessionCipher;
pub use signing_driver::SigningDriver;
pub use verifier::CompletionVerifier;

/// The threshold engine's output for one message, as exchanged with the relay
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysignResponse {
    /// The message that was signed, base64
    pub msg: String,
    /// Hex, big endian
    pub r: String,
    /// Hex, big endian
    pub s: String,
    /// Hex, empty for EdDSA
    #[serde(default)]
    pub der_signature: String,
    /// Hex, empty for EdDSA
    #[serde(default)]
    pub recovery_id: String,
}

impl KeysignResponse {
    /// Whether two responses carry the same signature
    pub fn same_signature(&self, other: &KeysignResponse) -> bool {
        self.r.eq_ignore_ascii_case(&other.r) && self.s.eq_ignore_ascii_case(&other.s)
    }
}

/// Signatures collected during one keysign, keyed by the hex message that was signed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignatureTable(BTreeMap<String, KeysignResponse>);

impl SignatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signature for a message.
    ///
    /// Re-recording the same signature is a no-op, recording a different one is an error.
    pub fn insert(&mut self, message: &str, response: KeysignResponse) -> Result<(), KeysignErr> {
        match self.0.entry(message.to_lowercase()) {
            Entry::Vacant(entry) => {
                entry.insert(response);
                Ok(())
            },
            Entry::Occupied(entry) if entry.get().same_signature(&response) => Ok(()),
            Entry::Occupied(_) => Err(KeysignErr::ConflictingSignature(message.to_string())),
        }
    }

    pub fn get(&self, message: &str) -> Option<&KeysignResponse> {
        self.0.get(&message.to_lowercase())
    }

    pub fn contains(&self, message: &str) -> bool {
        self.0.contains_key(&message.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &KeysignResponse)> {
        self.0.iter()
    }
}

/// Relay routing key for a message to sign.
///
/// This is the md5 of the hex message. It only addresses frames and completion records on the
/// relay, the signed digest is the message itself.
pub fn message_id(message: &str) -> String {
    hex::encode(Md5::digest(message.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(r: &str, s: &str) -> KeysignResponse {
        KeysignResponse {
            msg: String::new(),
            r: r.to_string(),
            s: s.to_string(),
            der_signature: String::new(),
            recovery_id: "00".to_string(),
        }
    }

    #[test]
    fn test_signature_table_holds_one_signature_per_message() {
        let mut table = SignatureTable::new();
        table.insert("AABB", response("01", "02")).unwrap();
        // Same signature again, different case
        table.insert("aabb", response("01", "02")).unwrap();
        assert_eq!(table.len(), 1);

        let err = table.insert("aabb", response("01", "03")).unwrap_err();
        assert!(matches!(err, KeysignErr::ConflictingSignature(_)));
        assert_eq!(table.get("AaBb").unwrap().s, "02");
    }

    #[test]
    fn test_message_id_is_md5_of_hex_message() {
        assert_eq!(message_id(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(message_id("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
