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

use keysign_protocol::{
    errors::{KeysignErr, VerificationErr},
    protocol_transport::errors::RelayErr,
};
use keysign_shared::Chain;
use thiserror::Error;

/// An error building or assembling a chain transaction
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("No signature for message {0}")]
    MissingSignature(String),
    #[error("Signature for message {message} does not verify: {source}")]
    VerificationFailed {
        message: String,
        #[source]
        source: VerificationErr,
    },
    #[error("Coin public key {coin} is not the vault key derived for {chain} ({derived})")]
    PublicKeyMismatch { chain: Chain, coin: String, derived: String },
    #[error("Invalid {chain} address: {address}")]
    InvalidAddress { chain: Chain, address: String },
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("Amount {0} does not fit the chain's amount type")]
    AmountOverflow(u128),
    #[error("Memo is {0} bytes, too long for an OP_RETURN output")]
    MemoTooLong(usize),
    #[error("{0} is not a supported swap source")]
    UnsupportedSwap(Chain),
    #[error("Key derivation: {0}")]
    Derivation(#[from] VerificationErr),
    #[error("Hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// An error submitting a signed transaction
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{chain} node rejected the transaction: {reason}")]
    Rejected { chain: Chain, reason: String },
    #[error("Unexpected response from {chain} node: {response}")]
    UnexpectedResponse { chain: Chain, response: String },
    #[error("No submission endpoint configured for {0}")]
    NoEndpoint(Chain),
    #[error("This keysign already submitted its transaction")]
    AlreadyBroadcast,
    #[error("Raw transaction is not valid for {chain}: {reason}")]
    InvalidTransaction { chain: Chain, reason: String },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// An error running a keysign end to end
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Keysign: {0}")]
    Keysign(#[from] KeysignErr),
    #[error("Transaction: {0}")]
    Chain(#[from] ChainError),
    #[error("Broadcast: {0}")]
    Broadcast(#[from] BroadcastError),
    #[error("Relay: {0}")]
    Relay(#[from] RelayErr),
    #[error("Timed out waiting for the session to start")]
    SetupTimeout,
    #[error("Session was closed")]
    Cancelled,
    #[error("{0} is not in the vault's signer roster")]
    UnknownParty(String),
    #[error("{0} was left out of the session's committee")]
    NotInCommittee(String),
    #[error("Configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}
