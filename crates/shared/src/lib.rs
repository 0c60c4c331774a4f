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

//! Types shared by the keysign protocol, the client and test tooling
pub mod chain;
pub mod constants;
pub mod types;

pub use chain::{Chain, ChainFamily, KeyType};
pub use types::*;

/// The number of committee members needed to sign for a vault with `signers` parties.
///
/// This is `ceil(2n / 3)`, so a 2-of-2, 2-of-3, 3-of-4 and 4-of-5 split.
pub fn threshold(signers: usize) -> usize {
    (2 * signers).div_ceil(3)
}
