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

//! The closed set of chains a vault can sign for
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Signature scheme used by a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum KeyType {
    #[serde(rename = "ECDSA")]
    #[strum(serialize = "ECDSA")]
    Ecdsa,
    #[serde(rename = "EdDSA")]
    #[strum(serialize = "EdDSA")]
    Eddsa,
}

/// Groups chains which share a transaction format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ChainFamily {
    Utxo,
    Evm,
    Cosmos,
    Solana,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString, EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Chain {
    ThorChain,
    MayaChain,
    Bitcoin,
    BitcoinCash,
    Litecoin,
    Dogecoin,
    Dash,
    GaiaChain,
    Kujira,
    Ethereum,
    Avalanche,
    BscChain,
    Polygon,
    Optimism,
    Arbitrum,
    Base,
    Blast,
    CronosChain,
    Solana,
}

impl Chain {
    pub fn family(&self) -> ChainFamily {
        match self {
            Chain::Bitcoin
            | Chain::BitcoinCash
            | Chain::Litecoin
            | Chain::Dogecoin
            | Chain::Dash => ChainFamily::Utxo,
            Chain::Ethereum
            | Chain::Avalanche
            | Chain::BscChain
            | Chain::Polygon
            | Chain::Optimism
            | Chain::Arbitrum
            | Chain::Base
            | Chain::Blast
            | Chain::CronosChain => ChainFamily::Evm,
            Chain::ThorChain | Chain::MayaChain | Chain::GaiaChain | Chain::Kujira => {
                ChainFamily::Cosmos
            },
            Chain::Solana => ChainFamily::Solana,
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Chain::Solana => KeyType::Eddsa,
            _ => KeyType::Ecdsa,
        }
    }

    /// Ticker of the chain's native asset
    pub fn ticker(&self) -> &'static str {
        match self {
            Chain::ThorChain => "RUNE",
            Chain::MayaChain => "CACAO",
            Chain::Bitcoin => "BTC",
            Chain::BitcoinCash => "BCH",
            Chain::Litecoin => "LTC",
            Chain::Dogecoin => "DOGE",
            Chain::Dash => "DASH",
            Chain::GaiaChain => "ATOM",
            Chain::Kujira => "KUJI",
            Chain::Ethereum | Chain::Optimism | Chain::Arbitrum | Chain::Base | Chain::Blast => {
                "ETH"
            },
            Chain::Avalanche => "AVAX",
            Chain::BscChain => "BNB",
            Chain::Polygon => "MATIC",
            Chain::CronosChain => "CRO",
            Chain::Solana => "SOL",
        }
    }

    /// BIP-44 style derivation path used for the chain's address
    pub fn derivation_path(&self) -> &'static str {
        match self {
            Chain::ThorChain | Chain::MayaChain => "m/44'/931'/0'/0/0",
            Chain::Bitcoin => "m/84'/0'/0'/0/0",
            Chain::BitcoinCash => "m/44'/145'/0'/0/0",
            Chain::Litecoin => "m/84'/2'/0'/0/0",
            Chain::Dogecoin => "m/44'/3'/0'/0/0",
            Chain::Dash => "m/44'/5'/0'/0/0",
            Chain::GaiaChain | Chain::Kujira => "m/44'/118'/0'/0/0",
            Chain::Solana => "m/44'/501'/0'/0'",
            // Every EVM chain shares the Ethereum account
            _ => "m/44'/60'/0'/0/0",
        }
    }

    /// EIP-155 chain id for EVM chains
    pub fn evm_chain_id(&self) -> Option<u64> {
        match self {
            Chain::Ethereum => Some(1),
            Chain::Optimism => Some(10),
            Chain::CronosChain => Some(25),
            Chain::BscChain => Some(56),
            Chain::Polygon => Some(137),
            Chain::Base => Some(8453),
            Chain::Arbitrum => Some(42161),
            Chain::Avalanche => Some(43114),
            Chain::Blast => Some(81457),
            _ => None,
        }
    }

    /// Cosmos-SDK chain id and bech32 prefix
    pub fn cosmos_chain_id(&self) -> Option<&'static str> {
        match self {
            Chain::ThorChain => Some("thorchain-1"),
            Chain::MayaChain => Some("mayachain-mainnet-v1"),
            Chain::GaiaChain => Some("cosmoshub-4"),
            Chain::Kujira => Some("kaiyo-1"),
            _ => None,
        }
    }

    /// Smallest spendable output on UTXO chains
    pub fn dust_limit(&self) -> Option<u64> {
        match self {
            Chain::Bitcoin | Chain::BitcoinCash | Chain::Litecoin | Chain::Dash => Some(546),
            Chain::Dogecoin => Some(1_000_000),
            _ => None,
        }
    }

    /// Asset chain identifier used in THORChain swap memos
    pub fn swap_asset_chain(&self) -> Option<&'static str> {
        match self {
            Chain::ThorChain => Some("THOR"),
            Chain::Bitcoin => Some("BTC"),
            Chain::BitcoinCash => Some("BCH"),
            Chain::Litecoin => Some("LTC"),
            Chain::Dogecoin => Some("DOGE"),
            Chain::GaiaChain => Some("GAIA"),
            Chain::Ethereum => Some("ETH"),
            Chain::Avalanche => Some("AVAX"),
            Chain::BscChain => Some("BSC"),
            Chain::Base => Some("BASE"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_chain_names_round_trip_through_serde_and_strum() {
        for chain in Chain::iter() {
            let json = serde_json::to_string(&chain).unwrap();
            assert_eq!(json, format!("\"{chain}\""));
            assert_eq!(Chain::from_str(&chain.to_string()).unwrap(), chain);
        }
        assert_eq!(Chain::from_str("thorChain").unwrap(), Chain::ThorChain);
        assert_eq!(Chain::from_str("bscChain").unwrap(), Chain::BscChain);
    }

    #[test]
    fn test_only_solana_uses_eddsa() {
        let eddsa: Vec<Chain> = Chain::iter().filter(|c| c.key_type() == KeyType::Eddsa).collect();
        assert_eq!(eddsa, vec![Chain::Solana]);
    }

    #[test]
    fn test_every_evm_chain_has_a_chain_id() {
        for chain in Chain::iter().filter(|c| c.family() == ChainFamily::Evm) {
            assert!(chain.evm_chain_id().is_some(), "{chain} has no chain id");
        }
        for chain in Chain::iter().filter(|c| c.family() == ChainFamily::Cosmos) {
            assert!(chain.cosmos_chain_id().is_some(), "{chain} has no chain id");
        }
    }
}
