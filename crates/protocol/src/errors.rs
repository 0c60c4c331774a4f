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

use thiserror::Error;

use crate::protocol_transport::errors::RelayErr;

/// An error from the threshold engine or the glue around it
#[derive(Debug, Error)]
pub enum EngineErr {
    #[error("Threshold engine error: {0}")]
    Protocol(String),
    #[error("Timed out waiting for {0}")]
    Timeout(String),
    #[error("No keyshare for public key {0}")]
    MissingKeyShare(String),
    #[error("Hex decode: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("Relay: {0}")]
    Relay(#[from] RelayErr),
    #[error("Encryption: {0}")]
    Encryption(#[from] EncryptionErr),
    #[error("Signing task panic or cancellation: {0}")]
    JoinHandle(#[from] tokio::task::JoinError),
    #[error("The session was closed while the engine was running")]
    SessionClosed,
    #[error("Must be called from within a tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// An error encrypting or decrypting a relay frame
#[derive(Debug, Error)]
pub enum EncryptionErr {
    #[error("Bad session key: {0}")]
    Key(String),
    #[error("Hex decode: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("Base64 decode: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Encryption failed: {0}")]
    Encryption(String),
    #[error("Decryption failed: {0}")]
    Decryption(String),
    #[error("Ciphertext too short to contain a nonce")]
    TooShort,
}

/// An error deriving a public key or checking a signature against it
#[derive(Debug, Error)]
pub enum VerificationErr {
    #[error("Hex decode: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("Invalid chain code, expected 32 bytes got {0}")]
    InvalidChainCode(usize),
    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),
    #[error("Key derivation produced an invalid key at index {0}")]
    Derivation(u32),
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),
    #[error("Signature does not verify against the expected public key")]
    Mismatch,
    #[error("No recovery id recovers the expected public key")]
    RecoveryId,
}

/// A fatal error for a keysign
#[derive(Debug, Error)]
pub enum KeysignErr {
    #[error("Signing failed after {attempts} attempts: {source}")]
    RetriesExhausted { attempts: u32, source: EngineErr },
    #[error("Signature for {message} failed verification: {source}")]
    SignatureMismatch { message: String, source: VerificationErr },
    #[error("A different signature is already recorded for {0}")]
    ConflictingSignature(String),
    #[error("The keysign session was closed")]
    Cancelled,
    #[error("Could not create the threshold engine: {0}")]
    Engine(#[from] EngineErr),
    #[error("Signing key: {0}")]
    SigningKey(#[from] VerificationErr),
    #[error("Relay: {0}")]
    Relay(#[from] RelayErr),
    #[error("Session encryption: {0}")]
    Encryption(#[from] EncryptionErr),
}
