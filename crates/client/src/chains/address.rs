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

//! Address encodings for UTXO and Cosmos-SDK chains
use bech32::{segwit, Bech32, Hrp};
use bitcoin::{
    hashes::Hash, PubkeyHash, ScriptBuf, ScriptHash, WPubkeyHash, WitnessProgram, WitnessVersion,
};
use keysign_shared::Chain;

use crate::{errors::ChainError, util::Hasher};

const CASHADDR_PREFIX: &str = "bitcoincash";
const CASHADDR_CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Pay to witness public key hash
pub fn p2wpkh_script(pubkey_hash: &[u8; 20]) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array(*pubkey_hash))
}

/// Pay to public key hash
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> ScriptBuf {
    ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(*pubkey_hash))
}

/// Pay to script hash
pub fn p2sh_script(script_hash: &[u8; 20]) -> ScriptBuf {
    ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(*script_hash))
}

fn segwit_hrp(chain: Chain) -> Option<&'static str> {
    match chain {
        Chain::Bitcoin => Some("bc"),
        Chain::Litecoin => Some("ltc"),
        _ => None,
    }
}

/// Base58check version bytes, pay to public key hash then pay to script hash
fn base58_versions(chain: Chain) -> Option<(u8, &'static [u8])> {
    match chain {
        Chain::Bitcoin | Chain::BitcoinCash => Some((0x00, &[0x05])),
        Chain::Litecoin => Some((0x30, &[0x32, 0x05])),
        Chain::Dogecoin => Some((0x1e, &[0x16])),
        Chain::Dash => Some((0x4c, &[0x10])),
        _ => None,
    }
}

/// The output script paying to `address` on a UTXO chain
pub fn utxo_script_pubkey(chain: Chain, address: &str) -> Result<ScriptBuf, ChainError> {
    let invalid = || ChainError::InvalidAddress { chain, address: address.to_string() };

    if let Some(expected_hrp) = segwit_hrp(chain) {
        if let Ok((hrp, version, program)) = segwit::decode(address) {
            if !hrp.as_str().eq_ignore_ascii_case(expected_hrp) {
                return Err(invalid());
            }
            let version = WitnessVersion::try_from(version.to_u8()).map_err(|_| invalid())?;
            let program = WitnessProgram::new(version, &program).map_err(|_| invalid())?;
            return Ok(ScriptBuf::new_witness_program(&program));
        }
    }

    if chain == Chain::BitcoinCash {
        if let Some((version, hash)) = decode_cashaddr(address) {
            return match version {
                0x00 => Ok(p2pkh_script(&hash)),
                0x08 => Ok(p2sh_script(&hash)),
                _ => Err(invalid()),
            };
        }
    }

    let (p2pkh_version, p2sh_versions) = base58_versions(chain).ok_or_else(invalid)?;
    let decoded = bs58::decode(address).with_check(None).into_vec().map_err(|_| invalid())?;
    let (version, hash) = decoded.split_first().ok_or_else(invalid)?;
    let hash: [u8; 20] = hash.try_into().map_err(|_| invalid())?;
    if *version == p2pkh_version {
        Ok(p2pkh_script(&hash))
    } else if p2sh_versions.contains(version) {
        Ok(p2sh_script(&hash))
    } else {
        Err(invalid())
    }
}

/// The script the vault's own key spends from: native segwit where the chain has it
pub fn own_script_pubkey(chain: Chain, public_key: &[u8]) -> ScriptBuf {
    match segwit_hrp(chain) {
        Some(_) => ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(public_key)),
        None => ScriptBuf::new_p2pkh(&PubkeyHash::hash(public_key)),
    }
}

/// The vault's receive address for a compressed public key
pub fn utxo_address(chain: Chain, public_key: &[u8]) -> Result<String, ChainError> {
    let hash = Hasher::hash160(public_key);
    if let Some(hrp) = segwit_hrp(chain) {
        let hrp = Hrp::parse_unchecked(hrp);
        return segwit::encode_v0(hrp, &hash)
            .map_err(|e| ChainError::InvalidPayload(e.to_string()));
    }
    if chain == Chain::BitcoinCash {
        return Ok(encode_cashaddr(0x00, &hash));
    }
    let (version, _) = base58_versions(chain).ok_or_else(|| ChainError::InvalidAddress {
        chain,
        address: hex::encode(public_key),
    })?;
    Ok(bs58::encode(hash).with_check_version(version).into_string())
}

/// Bech32 prefix of account addresses
pub fn cosmos_hrp(chain: Chain) -> Option<&'static str> {
    match chain {
        Chain::ThorChain => Some("thor"),
        Chain::MayaChain => Some("maya"),
        Chain::GaiaChain => Some("cosmos"),
        Chain::Kujira => Some("kujira"),
        _ => None,
    }
}

/// The 20 byte account behind a Cosmos-SDK address, checking its prefix
pub fn cosmos_account(chain: Chain, address: &str) -> Result<Vec<u8>, ChainError> {
    let invalid = || ChainError::InvalidAddress { chain, address: address.to_string() };
    let expected = cosmos_hrp(chain).ok_or_else(invalid)?;
    let (hrp, data) = bech32::decode(address).map_err(|_| invalid())?;
    if hrp.as_str() != expected || data.len() != 20 {
        return Err(invalid());
    }
    Ok(data)
}

/// Account address of a compressed secp256k1 key
pub fn cosmos_address(chain: Chain, public_key: &[u8]) -> Result<String, ChainError> {
    let hrp = cosmos_hrp(chain).ok_or_else(|| ChainError::InvalidAddress {
        chain,
        address: hex::encode(public_key),
    })?;
    bech32::encode::<Bech32>(Hrp::parse_unchecked(hrp), &Hasher::hash160(public_key))
        .map_err(|e| ChainError::InvalidPayload(e.to_string()))
}

fn cashaddr_polymod(values: impl IntoIterator<Item = u8>) -> u64 {
    const GENERATORS: [u64; 5] =
        [0x98f2bc8e61, 0x79b76d99e2, 0xf33e5fb3c4, 0xae2eabe2a8, 0x1e4f43e470];
    let mut checksum: u64 = 1;
    for value in values {
        let top = checksum >> 35;
        checksum = ((checksum & 0x07_ffff_ffff) << 5) ^ u64::from(value);
        for (bit, generator) in GENERATORS.iter().enumerate() {
            if (top >> bit) & 1 == 1 {
                checksum ^= generator;
            }
        }
    }
    checksum ^ 1
}

fn cashaddr_prefix_values() -> impl Iterator<Item = u8> {
    CASHADDR_PREFIX.bytes().map(|b| b & 0x1f).chain(std::iter::once(0))
}

/// Regroup a bit stream, e.g. bytes into 5 bit words
fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let mut accumulator: u32 = 0;
    let mut bits = 0;
    let max = (1 << to) - 1;
    let mut output = Vec::new();
    for value in data {
        if u32::from(*value) >> from != 0 {
            return None;
        }
        accumulator = (accumulator << from) | u32::from(*value);
        bits += from;
        while bits >= to {
            bits -= to;
            output.push(((accumulator >> bits) & max) as u8);
        }
    }
    if pad {
        if bits > 0 {
            output.push(((accumulator << (to - bits)) & max) as u8);
        }
    } else if bits >= from || (accumulator << (to - bits)) & max != 0 {
        return None;
    }
    Some(output)
}

fn encode_cashaddr(version: u8, hash: &[u8; 20]) -> String {
    let mut payload = vec![version];
    payload.extend_from_slice(hash);
    let mut words = convert_bits(&payload, 8, 5, true).unwrap_or_default();
    let checksum =
        cashaddr_polymod(cashaddr_prefix_values().chain(words.iter().copied()).chain([0; 8]));
    words.extend((0..8).map(|i| ((checksum >> (5 * (7 - i))) & 0x1f) as u8));
    let body: String = words.iter().map(|w| CASHADDR_CHARSET[*w as usize] as char).collect();
    format!("{CASHADDR_PREFIX}:{body}")
}

/// Version byte and hash of a cashaddr, with or without its prefix
fn decode_cashaddr(address: &str) -> Option<(u8, [u8; 20])> {
    let lower = address.to_lowercase();
    let body = lower.strip_prefix("bitcoincash:").unwrap_or(&lower);
    let words = body
        .bytes()
        .map(|c| CASHADDR_CHARSET.iter().position(|x| *x == c).map(|p| p as u8))
        .collect::<Option<Vec<u8>>>()?;
    if words.len() < 8
        || cashaddr_polymod(cashaddr_prefix_values().chain(words.iter().copied())) != 0
    {
        return None;
    }
    let payload = convert_bits(&words[..words.len() - 8], 5, 8, false)?;
    let (version, hash) = payload.split_first()?;
    Some((*version, hash.try_into().ok()?))
}
