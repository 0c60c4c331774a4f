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

//! Lets a party learn that a peer already finished signing a message.
//!
//! A completion record is only a hint. Signatures fetched here are verified like any other
//! before they are used.
use crate::{
    message_id, protocol_transport::errors::RelayErr, protocol_transport::RelayClient,
    KeysignResponse,
};

#[derive(Clone, Debug)]
pub struct CompletionVerifier {
    relay: RelayClient,
    session_id: String,
}

impl CompletionVerifier {
    pub fn new(relay: RelayClient, session_id: &str) -> Self {
        Self { relay, session_id: session_id.to_string() }
    }

    /// Announce that the local party signed `message`
    pub async fn mark_complete(
        &self,
        message: &str,
        response: &KeysignResponse,
    ) -> Result<(), RelayErr> {
        self.relay.mark_keysign_complete(&self.session_id, &message_id(message), response).await
    }

    /// A signature some party recorded for `message`, if any
    pub async fn check_complete(&self, message: &str) -> Result<Option<KeysignResponse>, RelayErr> {
        self.relay.check_keysign_complete(&self.session_id, &message_id(message)).await
    }
}
