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

//! Protocol constants

/// Relay used when none is configured
pub const DEFAULT_RELAY_URL: &str = "https://api.vultisig.com/router";

/// Number of times a signing round is retried after the initial attempt
pub const MAX_SIGNING_RETRIES: u32 = 3;

/// Fixed delay between signing attempts
pub const RETRY_BACKOFF_MILLIS: u64 = 1000;

/// How often the message pump polls the relay for inbound frames
pub const MESSAGE_POLL_INTERVAL_MILLIS: u64 = 100;

/// How often peer discovery polls the relay for the session roster
pub const PARTICIPANT_POLL_INTERVAL_MILLIS: u64 = 1000;

/// Timeout for a single relay request
pub const RELAY_REQUEST_TIMEOUT_SECONDS: u64 = 10;

/// How long to wait for the initiating device to start a session
pub const SETUP_TIMEOUT_SECONDS: u64 = 120;

/// How long a party stays on the relay after its last round so peers can drain their frames
pub const COMPLETION_LINGER_MILLIS: u64 = 1000;

/// Header carrying the message id on relay requests
pub const MESSAGE_ID_HEADER: &str = "message_id";

/// THORChain transactions pay a flat network fee, this is the gas limit put in the auth info
pub const THORCHAIN_GAS_LIMIT: u64 = 20_000_000;

/// MayaChain gas limit, paid in cacao
pub const MAYACHAIN_GAS_LIMIT: u64 = 2_000_000_000;

/// Gas limit for Cosmos Hub and Kujira bank sends
pub const COSMOS_GAS_LIMIT: u64 = 200_000;

/// Maximum size of an OP_RETURN payload accepted by relaying nodes
pub const MAX_OP_RETURN_SIZE: usize = 80;

/// THORChain affiliate appended to swap memos
pub const THORCHAIN_AFFILIATE: &str = "va";

/// Affiliate fee in basis points
pub const THORCHAIN_AFFILIATE_FEE_BPS: u32 = 50;
