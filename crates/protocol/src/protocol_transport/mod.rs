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

//! Client for the relay which parties use to find each other and exchange encrypted frames
pub mod errors;

use std::time::Duration;

use keysign_shared::constants::{MESSAGE_ID_HEADER, RELAY_REQUEST_TIMEOUT_SECONDS};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::KeysignResponse;
use errors::RelayErr;

/// A frame as stored on the relay. The body is encrypted with the session key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub session_id: String,
    pub from: String,
    pub to: Vec<String>,
    /// base64(nonce || ciphertext)
    pub body: String,
    /// md5 of the plaintext frame, used to delete and deduplicate
    pub hash: String,
    pub sequence_no: u64,
}

/// Thin HTTP client for one relay server
#[derive(Clone, Debug)]
pub struct RelayClient {
    client: reqwest::Client,
    server: String,
}

impl RelayClient {
    pub fn new(server: &str) -> Result<Self, RelayErr> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(RELAY_REQUEST_TIMEOUT_SECONDS))
            .build()?;
        Ok(Self { client, server: server.trim_end_matches('/').to_string() })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Register the local party in a session
    #[tracing::instrument(skip(self), level = tracing::Level::DEBUG)]
    pub async fn join(&self, session_id: &str, party_id: &str) -> Result<(), RelayErr> {
        let url = format!("{}/{}", self.server, session_id);
        send(self.client.post(&url).json(&[party_id]), &url).await?;
        Ok(())
    }

    /// Parties which have joined a session so far
    #[tracing::instrument(skip(self), level = tracing::Level::DEBUG)]
    pub async fn list_participants(&self, session_id: &str) -> Result<Vec<String>, RelayErr> {
        let url = format!("{}/{}", self.server, session_id);
        match send_allow_missing(self.client.get(&url), &url).await? {
            Some(response) => Ok(response.json().await?),
            None => Ok(Vec::new()),
        }
    }

    /// Announce the committee which will sign, releasing the other parties into the session
    #[tracing::instrument(skip(self), level = tracing::Level::DEBUG)]
    pub async fn start_session(
        &self,
        session_id: &str,
        committee: &[String],
    ) -> Result<(), RelayErr> {
        let url = format!("{}/start/{}", self.server, session_id);
        send(self.client.post(&url).json(committee), &url).await?;
        Ok(())
    }

    /// The committee announced by the initiating party, if the session has started
    #[tracing::instrument(skip(self), level = tracing::Level::DEBUG)]
    pub async fn started_committee(
        &self,
        session_id: &str,
    ) -> Result<Option<Vec<String>>, RelayErr> {
        let url = format!("{}/start/{}", self.server, session_id);
        match send_allow_missing(self.client.get(&url), &url).await? {
            Some(response) => {
                let committee: Vec<String> = response.json().await?;
                Ok(if committee.is_empty() { None } else { Some(committee) })
            },
            None => Ok(None),
        }
    }

    /// Remove the session and everything stored under it
    #[tracing::instrument(skip(self), level = tracing::Level::DEBUG)]
    pub async fn end_session(&self, session_id: &str) -> Result<(), RelayErr> {
        let url = format!("{}/{}", self.server, session_id);
        send_allow_missing(self.client.delete(&url), &url).await?;
        Ok(())
    }

    /// Upload a frame for the parties in `message.to`
    #[tracing::instrument(
        skip_all,
        fields(
            session_id = %session_id,
            message_id = ?message_id,
            from = %message.from,
            sequence_no = message.sequence_no
        ),
        level = tracing::Level::DEBUG
    )]
    pub async fn post_message(
        &self,
        session_id: &str,
        message_id: Option<&str>,
        message: &RelayMessage,
    ) -> Result<(), RelayErr> {
        let url = format!("{}/message/{}", self.server, session_id);
        send(with_message_id(self.client.post(&url), message_id).json(message), &url).await?;
        Ok(())
    }

    /// Frames waiting for `party_id`. Does not block when there are none.
    #[tracing::instrument(skip(self), level = tracing::Level::TRACE)]
    pub async fn poll_messages(
        &self,
        session_id: &str,
        party_id: &str,
        message_id: Option<&str>,
    ) -> Result<Vec<RelayMessage>, RelayErr> {
        let url = format!("{}/message/{}/{}", self.server, session_id, party_id);
        match send_allow_missing(with_message_id(self.client.get(&url), message_id), &url).await? {
            Some(response) => Ok(response.json().await?),
            None => Ok(Vec::new()),
        }
    }

    /// Delete a frame once it has been applied
    #[tracing::instrument(skip(self), level = tracing::Level::TRACE)]
    pub async fn delete_message(
        &self,
        session_id: &str,
        party_id: &str,
        hash: &str,
        message_id: Option<&str>,
    ) -> Result<(), RelayErr> {
        let url = format!("{}/message/{}/{}/{}", self.server, session_id, party_id, hash);
        send_allow_missing(with_message_id(self.client.delete(&url), message_id), &url).await?;
        Ok(())
    }

    /// Record that a message has been signed
    #[tracing::instrument(skip(self, response), level = tracing::Level::DEBUG)]
    pub async fn mark_keysign_complete(
        &self,
        session_id: &str,
        message_id: &str,
        response: &KeysignResponse,
    ) -> Result<(), RelayErr> {
        let url = format!("{}/complete/{}/keysign", self.server, session_id);
        send(with_message_id(self.client.post(&url), Some(message_id)).json(response), &url)
            .await?;
        Ok(())
    }

    /// A signature recorded for a message by any party, if there is one
    #[tracing::instrument(skip(self), level = tracing::Level::DEBUG)]
    pub async fn check_keysign_complete(
        &self,
        session_id: &str,
        message_id: &str,
    ) -> Result<Option<KeysignResponse>, RelayErr> {
        let url = format!("{}/complete/{}/keysign", self.server, session_id);
        match send_allow_missing(with_message_id(self.client.get(&url), Some(message_id)), &url)
            .await?
        {
            Some(response) => Ok(Some(response.json().await?)),
            None => Ok(None),
        }
    }
}

fn with_message_id(request: RequestBuilder, message_id: Option<&str>) -> RequestBuilder {
    match message_id {
        Some(message_id) => request.header(MESSAGE_ID_HEADER, message_id),
        None => request,
    }
}

async fn send(request: RequestBuilder, url: &str) -> Result<Response, RelayErr> {
    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(RelayErr::UnexpectedStatus { url: url.to_string(), status: response.status() });
    }
    Ok(response)
}

/// Like [send] but maps 404 to `None`
async fn send_allow_missing(
    request: RequestBuilder,
    url: &str,
) -> Result<Option<Response>, RelayErr> {
    let response = request.send().await?;
    match response.status() {
        StatusCode::NOT_FOUND => Ok(None),
        status if status.is_success() => Ok(Some(response)),
        status => Err(RelayErr::UnexpectedStatus { url: url.to_string(), status }),
    }
}
