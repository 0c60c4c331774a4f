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

//! Public key derivation for TSS vaults and verification of the engine's signatures.
//!
//! TSS vaults only hold an aggregate public key, so derivation is always BIP-32 public (non
//! hardened) derivation. Hardened markers in a path are accepted and ignored.
use ed25519_dalek::Verifier;
use hmac::{Hmac, Mac};
use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, RecoveryId, Signature, VerifyingKey},
    elliptic_curve::{sec1::ToEncodedPoint, PrimeField},
    FieldBytes, ProjectivePoint, PublicKey, Scalar,
};
use keysign_shared::{KeyType, Vault};
use sha2::Sha512;

use crate::{errors::VerificationErr, KeysignResponse};

type HmacSha512 = Hmac<Sha512>;

/// A child of a vault's aggregate ECDSA key
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub public_key: PublicKey,
    /// Sum of the per-level tweaks. The child secret is the root secret plus this.
    pub tweak: Scalar,
    pub chain_code: [u8; 32],
}

/// Parses `m/44'/60'/0'/0/0` into its indices, dropping hardened markers
pub fn parse_derivation_path(path: &str) -> Result<Vec<u32>, VerificationErr> {
    let invalid = || VerificationErr::InvalidPath(path.to_string());
    let mut segments = path.split('/');
    if segments.next() != Some("m") {
        return Err(invalid());
    }
    segments
        .map(|segment| {
            let index: u32 =
                segment.trim_end_matches(['\'', 'h']).parse().map_err(|_| invalid())?;
            if index >= 1 << 31 {
                return Err(invalid());
            }
            Ok(index)
        })
        .collect()
}

/// Derive the public key for `path` from a compressed aggregate key and chain code
pub fn derive_public_key(
    public_key_hex: &str,
    chain_code_hex: &str,
    path: &str,
) -> Result<DerivedKey, VerificationErr> {
    let root = PublicKey::from_sec1_bytes(&hex::decode(public_key_hex)?)
        .map_err(|e| VerificationErr::InvalidPublicKey(e.to_string()))?;
    let chain_code_bytes = hex::decode(chain_code_hex)?;
    let mut chain_code: [u8; 32] = chain_code_bytes
        .as_slice()
        .try_into()
        .map_err(|_| VerificationErr::InvalidChainCode(chain_code_bytes.len()))?;

    let mut point = root.to_projective();
    let mut tweak = Scalar::ZERO;
    for index in parse_derivation_path(path)? {
        let mut mac = HmacSha512::new_from_slice(&chain_code)
            .map_err(|_| VerificationErr::InvalidChainCode(chain_code.len()))?;
        mac.update(point.to_affine().to_encoded_point(true).as_bytes());
        mac.update(&index.to_be_bytes());
        let output = mac.finalize().into_bytes();
        let (left, right) = output.split_at(32);

        let il: Option<Scalar> = Scalar::from_repr(*FieldBytes::from_slice(left)).into();
        let il = il.ok_or(VerificationErr::Derivation(index))?;
        point += ProjectivePoint::GENERATOR * il;
        if point == ProjectivePoint::IDENTITY {
            return Err(VerificationErr::Derivation(index));
        }
        tweak += il;
        chain_code.copy_from_slice(right);
    }

    let public_key = PublicKey::from_affine(point.to_affine())
        .map_err(|e| VerificationErr::InvalidPublicKey(e.to_string()))?;
    Ok(DerivedKey { public_key, tweak, chain_code })
}

/// Compressed hex public key of the chain account derived from a vault
pub fn derive_public_key_hex(
    public_key_hex: &str,
    chain_code_hex: &str,
    path: &str,
) -> Result<String, VerificationErr> {
    let derived = derive_public_key(public_key_hex, chain_code_hex, path)?;
    Ok(hex::encode(derived.public_key.to_encoded_point(true).as_bytes()))
}

/// The key every signature for a chain account must verify against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerPublicKey {
    Ecdsa(VerifyingKey),
    Eddsa(ed25519_dalek::VerifyingKey),
}

impl SignerPublicKey {
    /// Resolve the signing key for a vault account
    pub fn for_vault(
        vault: &Vault,
        key_type: KeyType,
        derivation_path: &str,
    ) -> Result<Self, VerificationErr> {
        match key_type {
            KeyType::Ecdsa => {
                let derived = derive_public_key(
                    &vault.pub_key_ecdsa,
                    &vault.hex_chain_code,
                    derivation_path,
                )?;
                Ok(Self::Ecdsa(VerifyingKey::from(derived.public_key)))
            },
            KeyType::Eddsa => Self::eddsa_from_hex(&vault.pub_key_eddsa),
        }
    }

    pub fn ecdsa_from_hex(public_key_hex: &str) -> Result<Self, VerificationErr> {
        let key = VerifyingKey::from_sec1_bytes(&hex::decode(public_key_hex)?)
            .map_err(|e| VerificationErr::InvalidPublicKey(e.to_string()))?;
        Ok(Self::Ecdsa(key))
    }

    pub fn eddsa_from_hex(public_key_hex: &str) -> Result<Self, VerificationErr> {
        let bytes: [u8; 32] = hex::decode(public_key_hex)?
            .try_into()
            .map_err(|_| VerificationErr::InvalidPublicKey(public_key_hex.to_string()))?;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|e| VerificationErr::InvalidPublicKey(e.to_string()))?;
        Ok(Self::Eddsa(key))
    }

    /// Compressed SEC1 for ECDSA, the raw 32 bytes for EdDSA
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ecdsa(key) => key.to_encoded_point(true).as_bytes().to_vec(),
            Self::Eddsa(key) => key.to_bytes().to_vec(),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Ecdsa(_) => KeyType::Ecdsa,
            Self::Eddsa(_) => KeyType::Eddsa,
        }
    }

    /// Check a signature response over a hex message
    pub fn verify(
        &self,
        message_hex: &str,
        response: &KeysignResponse,
    ) -> Result<(), VerificationErr> {
        let message = hex::decode(message_hex)?;
        match self {
            Self::Ecdsa(key) => verify_ecdsa(key, &message, response).map(|_| ()),
            Self::Eddsa(key) => verify_eddsa(key, &message, response).map(|_| ()),
        }
    }
}

/// Verify an ECDSA response over a prehashed message.
///
/// Returns the low-S signature and the recovery id which recovers `key` for it.
pub fn verify_ecdsa(
    key: &VerifyingKey,
    prehash: &[u8],
    response: &KeysignResponse,
) -> Result<(Signature, RecoveryId), VerificationErr> {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&be_bytes_32(&response.r)?);
    bytes[32..].copy_from_slice(&be_bytes_32(&response.s)?);
    let signature = Signature::from_slice(&bytes)
        .map_err(|e| VerificationErr::MalformedSignature(e.to_string()))?;

    // Normalizing s negates it, which flips the parity of the recovery id
    let (signature, flipped) = match signature.normalize_s() {
        Some(normalized) => (normalized, true),
        None => (signature, false),
    };
    key.verify_prehash(prehash, &signature).map_err(|_| VerificationErr::Mismatch)?;

    let reported = match response.recovery_id.as_str() {
        "" => 0,
        id => u8::from_str_radix(id, 16)
            .map_err(|_| VerificationErr::MalformedSignature(format!("recovery id {id}")))?,
    };
    let reported = (reported & 1) ^ u8::from(flipped);
    for candidate in [reported, reported ^ 1] {
        let Some(recovery_id) = RecoveryId::from_byte(candidate) else { continue };
        match VerifyingKey::recover_from_prehash(prehash, &signature, recovery_id) {
            Ok(recovered) if &recovered == key => return Ok((signature, recovery_id)),
            _ => continue,
        }
    }
    Err(VerificationErr::RecoveryId)
}

/// The 64 byte Ed25519 signature in an EdDSA response.
///
/// The engine reports `r` and `s` big endian, Ed25519 encodes both little endian.
pub fn eddsa_signature(
    response: &KeysignResponse,
) -> Result<ed25519_dalek::Signature, VerificationErr> {
    let mut r = be_bytes_32(&response.r)?;
    let mut s = be_bytes_32(&response.s)?;
    r.reverse();
    s.reverse();
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&r);
    bytes[32..].copy_from_slice(&s);
    Ok(ed25519_dalek::Signature::from_bytes(&bytes))
}

pub fn verify_eddsa(
    key: &ed25519_dalek::VerifyingKey,
    message: &[u8],
    response: &KeysignResponse,
) -> Result<ed25519_dalek::Signature, VerificationErr> {
    let signature = eddsa_signature(response)?;
    key.verify(message, &signature).map_err(|_| VerificationErr::Mismatch)?;
    Ok(signature)
}

/// Decode a big endian hex scalar, left padding to 32 bytes
fn be_bytes_32(value: &str) -> Result<[u8; 32], VerificationErr> {
    let bytes = hex::decode(value)?;
    if bytes.len() > 32 {
        return Err(VerificationErr::MalformedSignature(format!(
            "scalar is {} bytes",
            bytes.len()
        )));
    }
    let mut output = [0u8; 32];
    output[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(output)
}
