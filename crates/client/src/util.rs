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

//! Utilities
use bitcoin::hashes::{hash160, Hash};
use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// Produces a specific hash on a given message
pub struct Hasher;

impl Hasher {
    /// Produces the Keccak256 hash on a given message.
    ///
    /// In practice, if `data` is an RLP-serialized Ethereum transaction, this should produce the
    /// corrosponding transaction hash.
    pub fn keccak(data: &[u8]) -> [u8; 32] {
        let mut keccak = Keccak256::new();
        keccak.update(data);
        keccak.finalize().into()
    }

    pub fn sha256(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    /// RIPEMD160 of SHA256, the public key hash in addresses
    pub fn hash160(data: &[u8]) -> [u8; 20] {
        hash160::Hash::hash(data).to_byte_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_hashes() {
        assert_eq!(
            Hasher::keccak(b""),
            hex!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
        );
        assert_eq!(Hasher::hash160(b""), hex!("b472a266d0bd89c13706a4132ccfb16f7c3b9fcb"));
    }
}
