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

use serde::{Deserialize, Serialize};

use crate::{chain::Chain, KeyType};

/// A keyshare held by the local device, stored by the vault layer and handed opaquely to the
/// threshold engine
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyShare {
    pub pub_key: String,
    pub keyshare: String,
}

/// The local device's view of a TSS vault
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vault {
    pub name: String,
    /// Compressed secp256k1 aggregate public key, hex
    pub pub_key_ecdsa: String,
    /// Ed25519 aggregate public key, hex
    pub pub_key_eddsa: String,
    /// BIP-32 chain code for deriving ECDSA child keys, hex
    pub hex_chain_code: String,
    pub local_party_id: String,
    /// Ordered roster of every party holding a share
    pub signers: Vec<String>,
    pub key_shares: Vec<KeyShare>,
}

impl Vault {
    /// Public key the engine signs with for a given key type
    pub fn public_key(&self, key_type: KeyType) -> &str {
        match key_type {
            KeyType::Ecdsa => &self.pub_key_ecdsa,
            KeyType::Eddsa => &self.pub_key_eddsa,
        }
    }

    pub fn key_share(&self, key_type: KeyType) -> Option<&KeyShare> {
        let pub_key = self.public_key(key_type);
        self.key_shares.iter().find(|share| share.pub_key == pub_key)
    }
}

/// An asset on a chain
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Coin {
    pub chain: Chain,
    pub ticker: String,
    pub address: String,
    pub decimals: u32,
    /// Derived public key the address belongs to, hex
    pub hex_public_key: String,
    /// Token contract, empty for native assets
    #[serde(default)]
    pub contract_address: String,
    pub is_native_token: bool,
}

/// An unspent output owned by the coin's address
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UtxoInfo {
    /// Transaction id in display (big endian) order
    pub hash: String,
    pub amount: u64,
    pub index: u32,
}

/// Chain family specific parameters fetched by the wallet before signing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BlockChainSpecific {
    #[serde(rename_all = "camelCase")]
    Utxo { byte_fee: u64, send_max_amount: bool },
    #[serde(rename_all = "camelCase")]
    Ethereum { max_fee_per_gas_wei: u128, priority_fee_wei: u128, nonce: u64, gas_limit: u64 },
    #[serde(rename_all = "camelCase")]
    ThorChain { account_number: u64, sequence: u64 },
    #[serde(rename_all = "camelCase")]
    MayaChain { account_number: u64, sequence: u64 },
    #[serde(rename_all = "camelCase")]
    Cosmos { account_number: u64, sequence: u64, gas: u64 },
    #[serde(rename_all = "camelCase")]
    Solana { recent_block_hash: String, priority_fee: u64 },
}

/// A THORChain swap routed through an inbound vault on the source chain
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThorChainSwapPayload {
    pub from_address: String,
    pub from_coin: Coin,
    pub to_coin: Coin,
    /// Inbound vault on the source chain
    pub vault_address: String,
    /// Router contract, only for EVM sources
    #[serde(default)]
    pub router_address: Option<String>,
    pub from_amount: u128,
    /// Minimum accepted output in the destination asset's base units
    pub to_amount_limit: String,
    pub streaming_interval: String,
    pub streaming_quantity: String,
    /// Unix time after which the router rejects the deposit
    pub expiration_time: u64,
    pub is_affiliate: bool,
}

/// An ERC-20 allowance to grant before a token swap
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Erc20ApprovePayload {
    pub amount: u128,
    pub spender: String,
}

/// Chain agnostic description of a transaction to sign
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeysignPayload {
    pub coin: Coin,
    pub to_address: String,
    pub to_amount: u128,
    pub chain_specific: BlockChainSpecific,
    #[serde(default)]
    pub utxos: Vec<UtxoInfo>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub swap_payload: Option<ThorChainSwapPayload>,
    #[serde(default)]
    pub approve_payload: Option<Erc20ApprovePayload>,
    pub vault_pub_key_ecdsa: String,
    pub vault_local_party_id: String,
}

/// Parameters of one keysign session on the relay
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningSession {
    pub session_id: String,
    /// AES-256 key shared out of band by the initiating device, hex
    pub encryption_key_hex: String,
    pub server_address: String,
    pub committee: Vec<String>,
}

/// A fully signed transaction ready for broadcast
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransactionResult {
    /// Chain native encoding: hex for UTXO and EVM, base58 for Solana, broadcast JSON for Cosmos
    pub raw_transaction: String,
    pub transaction_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_deserializes_from_wallet_json() {
        let json = r#"{
            "coin": {
                "chain": "bitcoin",
                "ticker": "BTC",
                "address": "bc1qxyz",
                "decimals": 8,
                "hexPublicKey": "02aa",
                "isNativeToken": true
            },
            "toAddress": "bc1qabc",
            "toAmount": 1000,
            "chainSpecific": { "type": "utxo", "byteFee": 20, "sendMaxAmount": false },
            "utxos": [{ "hash": "00", "amount": 5000, "index": 1 }],
            "vaultPubKeyEcdsa": "02bb",
            "vaultLocalPartyId": "iphone-1"
        }"#;
        let payload: KeysignPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.coin.chain, Chain::Bitcoin);
        assert_eq!(
            payload.chain_specific,
            BlockChainSpecific::Utxo { byte_fee: 20, send_max_amount: false }
        );
        assert_eq!(payload.utxos[0].index, 1);
        assert!(payload.memo.is_none());
        assert!(payload.coin.contract_address.is_empty());
    }

    #[test]
    fn test_vault_key_share_lookup() {
        let vault = Vault {
            name: "vault".into(),
            pub_key_ecdsa: "ecdsa".into(),
            pub_key_eddsa: "eddsa".into(),
            hex_chain_code: String::new(),
            local_party_id: "a".into(),
            signers: vec!["a".into(), "b".into()],
            key_shares: vec![KeyShare { pub_key: "eddsa".into(), keyshare: "share".into() }],
        };
        assert_eq!(vault.key_share(KeyType::Eddsa).unwrap().keyshare, "share");
        assert!(vault.key_share(KeyType::Ecdsa).is_none());
    }
}
