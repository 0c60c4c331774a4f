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

//! Chain Transaction Builders.
//!
//! Each chain family has a [TransactionBuilder] which computes the digests the vault has to sign
//! and assembles the signed transaction once every digest has a signature. Builders are picked
//! from the payload by [builder_for]: swap payloads go through the swap builder, which rewrites
//! them onto the source chain's family builder.
pub mod address;
pub mod cosmos;
pub mod evm;
pub mod solana;
pub mod swaps;
pub mod utxo;

use k256::ecdsa::{RecoveryId, Signature};
use keysign_protocol::{
    derivation::{verify_ecdsa, verify_eddsa, SignerPublicKey},
    SignatureTable,
};
use keysign_shared::{Chain, ChainFamily, KeysignPayload, SignedTransactionResult, Vault};

use crate::errors::ChainError;

/// Builds and assembles transactions for one chain family
pub trait TransactionBuilder: Send + Sync {
    /// Hex messages to sign, in the order they are signed
    fn pre_signed_image_hashes(
        &self,
        account: &Account,
        payload: &KeysignPayload,
    ) -> Result<Vec<String>, ChainError>;

    /// Serialize the signed transaction, checking every signature it uses
    fn assemble_signed(
        &self,
        account: &Account,
        payload: &KeysignPayload,
        signatures: &SignatureTable,
    ) -> Result<SignedTransactionResult, ChainError>;
}

/// Pick the builder for a payload
pub fn builder_for(payload: &KeysignPayload) -> &'static dyn TransactionBuilder {
    if payload.swap_payload.is_some() {
        return &swaps::ThorchainSwapBuilder;
    }
    family_builder(payload.coin.chain)
}

pub(crate) fn family_builder(chain: Chain) -> &'static dyn TransactionBuilder {
    match chain.family() {
        ChainFamily::Utxo => &utxo::UtxoBuilder,
        ChainFamily::Evm => &evm::EvmBuilder,
        ChainFamily::Cosmos => &cosmos::CosmosBuilder,
        ChainFamily::Solana => &solana::SolanaBuilder,
    }
}

/// Every message the vault signs for a payload: the approval first if there is one, then the
/// transaction itself
pub fn pre_signed_image_hashes(
    vault: &Vault,
    payload: &KeysignPayload,
) -> Result<Vec<String>, ChainError> {
    let account = Account::for_payload(vault, payload)?;
    let mut hashes = Vec::new();
    if payload.approve_payload.is_some() {
        hashes.extend(evm::ApproveBuilder.pre_signed_image_hashes(&account, payload)?);
    }
    hashes.extend(builder_for(payload).pre_signed_image_hashes(&account, payload)?);
    Ok(hashes)
}

/// Signed transactions for a payload, in broadcast order
pub fn assemble_signed_transactions(
    vault: &Vault,
    payload: &KeysignPayload,
    signatures: &SignatureTable,
) -> Result<Vec<SignedTransactionResult>, ChainError> {
    let account = Account::for_payload(vault, payload)?;
    let mut transactions = Vec::new();
    if payload.approve_payload.is_some() {
        transactions.push(evm::ApproveBuilder.assemble_signed(&account, payload, signatures)?);
    }
    transactions.push(builder_for(payload).assemble_signed(&account, payload, signatures)?);
    Ok(transactions)
}

/// The vault account a payload spends from
#[derive(Debug, Clone)]
pub struct Account {
    pub chain: Chain,
    pub signer: SignerPublicKey,
}

impl Account {
    /// Derive the account key from the vault and check the payload's coin belongs to it
    pub fn for_payload(vault: &Vault, payload: &KeysignPayload) -> Result<Self, ChainError> {
        if !payload.vault_pub_key_ecdsa.eq_ignore_ascii_case(&vault.pub_key_ecdsa) {
            return Err(ChainError::InvalidPayload(format!(
                "payload is for vault {}",
                payload.vault_pub_key_ecdsa
            )));
        }
        let chain = payload.coin.chain;
        let signer = SignerPublicKey::for_vault(vault, chain.key_type(), chain.derivation_path())?;
        let derived = hex::encode(signer.to_bytes());
        if !derived.eq_ignore_ascii_case(&payload.coin.hex_public_key) {
            return Err(ChainError::PublicKeyMismatch {
                chain,
                coin: payload.coin.hex_public_key.clone(),
                derived,
            });
        }
        Ok(Self { chain, signer })
    }

    /// Compressed SEC1 for ECDSA chains, the raw key for Solana
    pub fn public_key(&self) -> Vec<u8> {
        self.signer.to_bytes()
    }

    /// Look up and verify the signature over a digest
    pub fn ecdsa_signature(
        &self,
        digest: &[u8],
        signatures: &SignatureTable,
    ) -> Result<(Signature, RecoveryId), ChainError> {
        let message = hex::encode(digest);
        let response =
            signatures.get(&message).ok_or_else(|| ChainError::MissingSignature(message.clone()))?;
        let SignerPublicKey::Ecdsa(key) = &self.signer else {
            let reason = format!("{} does not sign with ECDSA", self.chain);
            return Err(ChainError::InvalidPayload(reason));
        };
        verify_ecdsa(key, digest, response)
            .map_err(|source| ChainError::VerificationFailed { message, source })
    }

    /// Look up and verify the signature over a message
    pub fn eddsa_signature(
        &self,
        message_bytes: &[u8],
        signatures: &SignatureTable,
    ) -> Result<ed25519_dalek::Signature, ChainError> {
        let message = hex::encode(message_bytes);
        let response =
            signatures.get(&message).ok_or_else(|| ChainError::MissingSignature(message.clone()))?;
        let SignerPublicKey::Eddsa(key) = &self.signer else {
            let reason = format!("{} does not sign with EdDSA", self.chain);
            return Err(ChainError::InvalidPayload(reason));
        };
        verify_eddsa(key, message_bytes, response)
            .map_err(|source| ChainError::VerificationFailed { message, source })
    }
}

/// Amounts in payloads are u128, UTXO and Cosmos amounts are u64
pub(crate) fn amount_u64(amount: u128) -> Result<u64, ChainError> {
    u64::try_from(amount).map_err(|_| ChainError::AmountOverflow(amount))
}

/// The payload memo, if it is not blank
pub(crate) fn memo(payload: &KeysignPayload) -> Option<&str> {
    payload.memo.as_deref().filter(|memo| !memo.is_empty())
}
