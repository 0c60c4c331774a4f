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

//! Client configuration
use std::{collections::BTreeMap, path::Path, time::Duration};

use keysign_protocol::RetryPolicy;
use keysign_shared::{
    constants::{DEFAULT_RELAY_URL, RELAY_REQUEST_TIMEOUT_SECONDS},
    Chain,
};
use serde::{Deserialize, Serialize};

use crate::errors::ClientError;

/// Where to reach the relay and each chain, and how hard to retry signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub relay_url: String,
    /// Submission endpoint per chain: Blockchair API base for UTXO chains, JSON-RPC for EVM and
    /// Solana, LCD for Cosmos-SDK chains
    pub endpoints: BTreeMap<Chain, String>,
    pub request_timeout_seconds: u64,
    pub retry_policy: RetryPolicy,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            endpoints: default_endpoints(),
            request_timeout_seconds: RELAY_REQUEST_TIMEOUT_SECONDS,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl Configuration {
    /// Load a JSON configuration. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn endpoint(&self, chain: Chain) -> Option<&str> {
        self.endpoints.get(&chain).map(String::as_str)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn default_endpoints() -> BTreeMap<Chain, String> {
    [
        (Chain::Bitcoin, "https://api.blockchair.com/bitcoin"),
        (Chain::BitcoinCash, "https://api.blockchair.com/bitcoin-cash"),
        (Chain::Litecoin, "https://api.blockchair.com/litecoin"),
        (Chain::Dogecoin, "https://api.blockchair.com/dogecoin"),
        (Chain::Dash, "https://api.blockchair.com/dash"),
        (Chain::Ethereum, "https://ethereum-rpc.publicnode.com"),
        (Chain::Avalanche, "https://avalanche-c-chain-rpc.publicnode.com"),
        (Chain::BscChain, "https://bsc-rpc.publicnode.com"),
        (Chain::Polygon, "https://polygon-bor-rpc.publicnode.com"),
        (Chain::Optimism, "https://optimism-rpc.publicnode.com"),
        (Chain::Arbitrum, "https://arbitrum-one-rpc.publicnode.com"),
        (Chain::Base, "https://base-rpc.publicnode.com"),
        (Chain::Blast, "https://rpc.blast.io"),
        (Chain::CronosChain, "https://cronos-evm-rpc.publicnode.com"),
        (Chain::ThorChain, "https://thornode.ninerealms.com"),
        (Chain::MayaChain, "https://mayanode.mayachain.info"),
        (Chain::GaiaChain, "https://cosmos-rest.publicnode.com"),
        (Chain::Kujira, "https://kujira-rest.publicnode.com"),
        (Chain::Solana, "https://api.mainnet-beta.solana.com"),
    ]
    .into_iter()
    .map(|(chain, url)| (chain, url.to_string()))
    .collect()
}
