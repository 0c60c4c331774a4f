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

use hex_literal::hex;

/// Secret behind the test vault's ECDSA key.
/// Taken from https://docs.rs/k256/latest/k256/ecdsa/index.html
pub const TEST_ECDSA_SECRET: [u8; 32] =
    hex!("4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318");

/// Compressed public key for [TEST_ECDSA_SECRET]
pub const TEST_ECDSA_PUBLIC_KEY: &str =
    "024e3b81af9c2234cad09d679ce6035ed1392347ce64ce405f5dcd36228a25de6e";

/// Chain code of the test vault, from BIP-32 test vector 1
pub const TEST_CHAIN_CODE: &str =
    "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508";

/// Ed25519 seed of the test vault, RFC 8032 test 1
pub const TEST_EDDSA_SEED: [u8; 32] =
    hex!("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60");

/// Public key for [TEST_EDDSA_SEED]
pub const TEST_EDDSA_PUBLIC_KEY: &str =
    "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

/// AES-256 key for test sessions
pub const TEST_SESSION_KEY: &str =
    "5d2a7c1e9f3b8d4a6c0e2f4b6d8a0c2e4f6b8d0a2c4e6f8b0d2a4c6e8f0b2d4a";

lazy_static! {
    /// Parties of the test vault, in roster order
    pub static ref TEST_PARTIES: Vec<String> =
        vec!["iPhone-5C1".to_string(), "Pixel-8A2".to_string(), "MacBook-3F9".to_string()];
}
