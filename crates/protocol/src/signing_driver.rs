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

//! Runs one signing protocol on the threshold engine
use std::sync::Arc;

use base64::prelude::{Engine, BASE64_STANDARD};
use keysign_shared::{KeyType, Vault};

use crate::{
    engine::{KeysignRequest, ThresholdEngine},
    errors::EngineErr,
    KeysignResponse,
};

/// Wraps an engine instance. Callers sign one message at a time.
#[derive(Clone)]
pub struct SigningDriver {
    engine: Arc<dyn ThresholdEngine>,
}

impl SigningDriver {
    pub fn new(engine: Arc<dyn ThresholdEngine>) -> Self {
        Self { engine }
    }

    /// Sign a hex message with the committee.
    ///
    /// The engine call blocks for the whole protocol, so it runs on the blocking pool.
    #[tracing::instrument(
        skip_all,
        fields(message = %message, key_type = %key_type, derivation_path = %derivation_path),
        level = tracing::Level::DEBUG
    )]
    pub async fn sign(
        &self,
        vault: &Vault,
        committee: &[String],
        derivation_path: &str,
        message: &str,
        key_type: KeyType,
    ) -> Result<KeysignResponse, EngineErr> {
        let request = KeysignRequest {
            local_party_key: vault.local_party_id.clone(),
            keysign_committee_keys: committee.join(","),
            message_to_sign: BASE64_STANDARD.encode(hex::decode(message)?),
            derive_path: derivation_path.to_string(),
            pub_key: vault.public_key(key_type).to_string(),
        };

        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || match key_type {
            KeyType::Ecdsa => engine.keysign_ecdsa(&request),
            KeyType::Eddsa => engine.keysign_eddsa(&request),
        })
        .await?
    }
}
