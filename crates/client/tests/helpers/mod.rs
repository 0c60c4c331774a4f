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

//! Fixtures for client tests: payloads spending from the test vault and a chain API which never
//! touches the network
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers_core::{types::Address, utils::public_key_to_address};
use k256::ecdsa::VerifyingKey;
use keysign_client::{
    chains::address::{cosmos_address, utxo_address},
    BroadcastError, ChainApi,
};
use keysign_shared::{BlockChainSpecific, Chain, ChainFamily, Coin, KeysignPayload, UtxoInfo};
use keysign_testing_utils::{constants::TEST_ECDSA_PUBLIC_KEY, test_account_public_key};

pub const ETH_RECIPIENT: &str = "0x000000000000000000000000000000000000dEaD";
pub const USDC_CONTRACT: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
pub const THORCHAIN_ROUTER: &str = "0xD37BbE5744D730a1d98d8DC97c42F0Ca46aD7146";
pub const ETH_INBOUND_VAULT: &str = "0x1e4b4d5b3a2f6c7d8e9f0a1b2c3d4e5f60718293";
pub const SOLANA_BLOCKHASH: &str = "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N";

/// The test vault's coin on a chain
pub fn coin(chain: Chain) -> Coin {
    let hex_public_key =
        test_account_public_key(chain.key_type(), chain.derivation_path()).unwrap();
    let public_key = hex::decode(&hex_public_key).unwrap();
    let address = match chain.family() {
        ChainFamily::Utxo => utxo_address(chain, &public_key).unwrap(),
        ChainFamily::Cosmos => cosmos_address(chain, &public_key).unwrap(),
        ChainFamily::Evm => format!("{:?}", evm_address(&public_key)),
        ChainFamily::Solana => bs58::encode(&public_key).into_string(),
    };
    Coin {
        chain,
        ticker: chain.ticker().to_string(),
        address,
        decimals: 8,
        hex_public_key,
        contract_address: String::new(),
        is_native_token: true,
    }
}

pub fn evm_address(public_key: &[u8]) -> Address {
    public_key_to_address(&VerifyingKey::from_sec1_bytes(public_key).unwrap())
}

pub fn usdc() -> Coin {
    Coin {
        ticker: "USDC".to_string(),
        decimals: 6,
        contract_address: USDC_CONTRACT.to_string(),
        is_native_token: false,
        ..coin(Chain::Ethereum)
    }
}

pub fn payload(
    coin: Coin,
    to_address: &str,
    to_amount: u128,
    chain_specific: BlockChainSpecific,
) -> KeysignPayload {
    KeysignPayload {
        coin,
        to_address: to_address.to_string(),
        to_amount,
        chain_specific,
        utxos: Vec::new(),
        memo: None,
        swap_payload: None,
        approve_payload: None,
        vault_pub_key_ecdsa: TEST_ECDSA_PUBLIC_KEY.to_string(),
        vault_local_party_id: String::new(),
    }
}

pub fn ethereum_fees(nonce: u64) -> BlockChainSpecific {
    BlockChainSpecific::Ethereum {
        max_fee_per_gas_wei: 30_000_000_000,
        priority_fee_wei: 1_000_000_000,
        nonce,
        gas_limit: 120_000,
    }
}

pub fn eth_transfer() -> KeysignPayload {
    payload(coin(Chain::Ethereum), ETH_RECIPIENT, 10_000_000_000_000_000, ethereum_fees(7))
}

/// Spends two outputs sent to the vault's native segwit address
pub fn btc_transfer() -> KeysignPayload {
    let mut payload = payload(
        coin(Chain::Bitcoin),
        "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
        70_000,
        BlockChainSpecific::Utxo { byte_fee: 10, send_max_amount: false },
    );
    payload.utxos = vec![
        UtxoInfo {
            hash: "69395ff759d6513d3e23cb75a20d5514f41022fc3d6a70bfe0b8ece6fe6588fe".to_string(),
            amount: 60_000,
            index: 0,
        },
        UtxoInfo {
            hash: "5c8a462a5f7a842bd8c997c179c3e10efa083c4e9cce27ddcd3433be619a6292".to_string(),
            amount: 50_000,
            index: 1,
        },
    ];
    payload
}

pub fn solana_transfer(priority_fee: u64) -> KeysignPayload {
    payload(
        coin(Chain::Solana),
        "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM",
        250_000_000,
        BlockChainSpecific::Solana {
            recent_block_hash: SOLANA_BLOCKHASH.to_string(),
            priority_fee,
        },
    )
}

/// A [ChainApi] recording what it was asked to submit
#[derive(Default)]
pub struct MockChainApi {
    submissions: Mutex<Vec<(Chain, String)>>,
    reject: bool,
}

impl MockChainApi {
    pub fn rejecting() -> Self {
        Self { reject: true, ..Default::default() }
    }

    pub fn submissions(&self) -> Vec<(Chain, String)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainApi for MockChainApi {
    async fn broadcast_transaction(
        &self,
        chain: Chain,
        raw_transaction: &str,
    ) -> Result<String, BroadcastError> {
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push((chain, raw_transaction.to_string()));
        if self.reject {
            return Err(BroadcastError::Rejected { chain, reason: "mempool full".to_string() });
        }
        Ok(format!("{chain}-tx-{}", submissions.len()))
    }
}

pub fn mock_api() -> Arc<MockChainApi> {
    Arc::new(MockChainApi::default())
}
