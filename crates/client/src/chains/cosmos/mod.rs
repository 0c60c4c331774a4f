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

//! Cosmos-SDK transactions signed in SIGN_MODE_DIRECT
pub mod proto;

use base64::prelude::{Engine, BASE64_STANDARD};
use keysign_protocol::SignatureTable;
use keysign_shared::{
    constants::{COSMOS_GAS_LIMIT, MAYACHAIN_GAS_LIMIT, THORCHAIN_GAS_LIMIT},
    BlockChainSpecific, Chain, KeysignPayload, SignedTransactionResult,
};
use prost::Message;
use serde::{Deserialize, Serialize};

use self::proto::{
    Any, AuthInfo, Coin, Fee, ModeInfo, ModeInfoSingle, MsgSend, PubKey, SignDoc, SignerInfo,
    ThorchainMsgSend, TxBody, TxRaw, BANK_MSG_SEND_TYPE_URL, SECP256K1_PUBKEY_TYPE_URL,
    SIGN_MODE_DIRECT, THORCHAIN_MSG_SEND_TYPE_URL,
};
use super::{
    address::{cosmos_account, cosmos_address},
    amount_u64, memo, Account, TransactionBuilder,
};
use crate::{errors::ChainError, util::Hasher};

/// Body of a `POST /cosmos/tx/v1beta1/txs` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastTxRequest {
    pub tx_bytes: String,
    pub mode: String,
}

/// Fee denomination of a chain's native asset
pub fn native_denom(chain: Chain) -> Option<&'static str> {
    match chain {
        Chain::ThorChain => Some("rune"),
        Chain::MayaChain => Some("cacao"),
        Chain::GaiaChain => Some("uatom"),
        Chain::Kujira => Some("ukuji"),
        _ => None,
    }
}

/// A transaction with its body and auth info fixed
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
    pub body_bytes: Vec<u8>,
    pub auth_info_bytes: Vec<u8>,
    pub chain_id: String,
    pub account_number: u64,
}

impl UnsignedTransaction {
    /// Wrap messages into a transaction for the payload's account
    pub fn new(
        account: &Account,
        payload: &KeysignPayload,
        messages: Vec<Any>,
        memo: &str,
    ) -> Result<Self, ChainError> {
        let chain = account.chain;
        let (account_number, sequence, fee) = match (chain, &payload.chain_specific) {
            (Chain::ThorChain, BlockChainSpecific::ThorChain { account_number, sequence }) => {
                let fee = Fee { gas_limit: THORCHAIN_GAS_LIMIT, ..Default::default() };
                (*account_number, *sequence, fee)
            },
            (Chain::MayaChain, BlockChainSpecific::MayaChain { account_number, sequence }) => {
                let fee = Fee {
                    amount: vec![Coin {
                        denom: denom(chain)?.to_string(),
                        amount: MAYACHAIN_GAS_LIMIT.to_string(),
                    }],
                    gas_limit: MAYACHAIN_GAS_LIMIT,
                    ..Default::default()
                };
                (*account_number, *sequence, fee)
            },
            (
                Chain::GaiaChain | Chain::Kujira,
                BlockChainSpecific::Cosmos { account_number, sequence, gas },
            ) => {
                let fee = Fee {
                    amount: vec![Coin {
                        denom: denom(chain)?.to_string(),
                        amount: gas.to_string(),
                    }],
                    gas_limit: COSMOS_GAS_LIMIT,
                    ..Default::default()
                };
                (*account_number, *sequence, fee)
            },
            _ => return Err(ChainError::InvalidPayload(format!("{chain} needs Cosmos parameters"))),
        };
        let chain_id = chain
            .cosmos_chain_id()
            .ok_or_else(|| ChainError::InvalidPayload(format!("{chain} is not a Cosmos chain")))?;

        let body = TxBody { messages, memo: memo.to_string(), timeout_height: 0 };
        let auth_info = AuthInfo {
            signer_infos: vec![SignerInfo {
                public_key: Some(Any::pack(
                    SECP256K1_PUBKEY_TYPE_URL,
                    &PubKey { key: account.public_key() },
                )),
                mode_info: Some(ModeInfo {
                    single: Some(ModeInfoSingle { mode: SIGN_MODE_DIRECT }),
                }),
                sequence,
            }],
            fee: Some(fee),
        };
        Ok(Self {
            body_bytes: body.encode_to_vec(),
            auth_info_bytes: auth_info.encode_to_vec(),
            chain_id: chain_id.to_string(),
            account_number,
        })
    }

    /// sha256 of the SignDoc
    pub fn sighash(&self) -> [u8; 32] {
        let sign_doc = SignDoc {
            body_bytes: self.body_bytes.clone(),
            auth_info_bytes: self.auth_info_bytes.clone(),
            chain_id: self.chain_id.clone(),
            account_number: self.account_number,
        };
        Hasher::sha256(&sign_doc.encode_to_vec())
    }

    /// Attach the vault's signature, producing the broadcast request
    pub fn assemble(
        &self,
        account: &Account,
        signatures: &SignatureTable,
    ) -> Result<SignedTransactionResult, ChainError> {
        let (signature, _) = account.ecdsa_signature(&self.sighash(), signatures)?;
        let tx_raw = TxRaw {
            body_bytes: self.body_bytes.clone(),
            auth_info_bytes: self.auth_info_bytes.clone(),
            signatures: vec![signature.to_bytes().to_vec()],
        }
        .encode_to_vec();
        let transaction_hash = hex::encode_upper(Hasher::sha256(&tx_raw));
        let request = BroadcastTxRequest {
            tx_bytes: BASE64_STANDARD.encode(&tx_raw),
            mode: "BROADCAST_MODE_SYNC".to_string(),
        };
        tracing::debug!("Assembled {} transaction {transaction_hash}", account.chain);
        Ok(SignedTransactionResult {
            raw_transaction: serde_json::to_string(&request)?,
            transaction_hash,
        })
    }
}

fn denom(chain: Chain) -> Result<&'static str, ChainError> {
    native_denom(chain)
        .ok_or_else(|| ChainError::InvalidPayload(format!("{chain} has no native denom")))
}

/// Denomination a payload moves: the native asset, or the token's denom
fn payload_denom(payload: &KeysignPayload) -> Result<String, ChainError> {
    if payload.coin.is_native_token {
        Ok(denom(payload.coin.chain)?.to_string())
    } else {
        Ok(payload.coin.contract_address.clone())
    }
}

/// Check the payload spends from the vault's own account, returning the account bytes
pub fn source_account(account: &Account, payload: &KeysignPayload) -> Result<Vec<u8>, ChainError> {
    let chain = account.chain;
    let expected = cosmos_address(chain, &account.public_key())?;
    if expected != payload.coin.address {
        return Err(ChainError::InvalidAddress { chain, address: payload.coin.address.clone() });
    }
    cosmos_account(chain, &payload.coin.address)
}

/// A send of `amount` to `to_address`, in the message type the chain expects
pub fn send_message(
    account: &Account,
    payload: &KeysignPayload,
    to_address: &str,
    amount: u128,
) -> Result<Any, ChainError> {
    let chain = account.chain;
    let from = source_account(account, payload)?;
    let amount =
        vec![Coin { denom: payload_denom(payload)?, amount: amount_u64(amount)?.to_string() }];
    Ok(match chain {
        Chain::ThorChain | Chain::MayaChain => Any::pack(
            THORCHAIN_MSG_SEND_TYPE_URL,
            &ThorchainMsgSend {
                from_address: from,
                to_address: cosmos_account(chain, to_address)?,
                amount,
            },
        ),
        _ => {
            // Validates the destination prefix
            cosmos_account(chain, to_address)?;
            Any::pack(
                BANK_MSG_SEND_TYPE_URL,
                &MsgSend {
                    from_address: payload.coin.address.clone(),
                    to_address: to_address.to_string(),
                    amount,
                },
            )
        },
    })
}

/// Bank sends on Cosmos Hub, Kujira, THORChain and MayaChain
pub struct CosmosBuilder;

impl CosmosBuilder {
    fn transaction(
        account: &Account,
        payload: &KeysignPayload,
    ) -> Result<UnsignedTransaction, ChainError> {
        let message = send_message(account, payload, &payload.to_address, payload.to_amount)?;
        UnsignedTransaction::new(account, payload, vec![message], memo(payload).unwrap_or_default())
    }
}

impl TransactionBuilder for CosmosBuilder {
    fn pre_signed_image_hashes(
        &self,
        account: &Account,
        payload: &KeysignPayload,
    ) -> Result<Vec<String>, ChainError> {
        Ok(vec![hex::encode(Self::transaction(account, payload)?.sighash())])
    }

    fn assemble_signed(
        &self,
        account: &Account,
        payload: &KeysignPayload,
        signatures: &SignatureTable,
    ) -> Result<SignedTransactionResult, ChainError> {
        Self::transaction(account, payload)?.assemble(account, signatures)
    }
}
