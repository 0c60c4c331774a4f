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

//! Transaction building, broadcasting and keysign orchestration for TSS vaults.
//!
//! The signing rounds themselves live in `keysign-protocol`. This crate decides what to sign for a
//! payload, gathers the committee, assembles the signed transactions and submits them.
pub mod broadcast;
pub mod chain_api;
pub mod chains;
pub mod client;
pub mod config;
pub mod discovery;
pub mod errors;
#[cfg(feature = "instrumentation")]
pub mod logger;
pub mod util;

pub use broadcast::BroadcastDispatcher;
pub use chain_api::{ChainApi, HttpChainApi};
pub use chains::{assemble_signed_transactions, pre_signed_image_hashes, TransactionBuilder};
pub use client::{start_keysign, KeysignEvent, KeysignHandle, KeysignOptions, KeysignParams};
pub use config::Configuration;
pub use discovery::PeerDiscovery;
pub use errors::{BroadcastError, ChainError, ClientError};
pub use util::Hasher;
