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

//! Finding the committee for a keysign session.
//!
//! The initiating device waits for enough of the vault's parties to join and then starts the
//! session with them as the committee. Every other device waits for the committee to be posted.
use std::time::Duration;

use backoff::ExponentialBackoff;
use keysign_protocol::RelayClient;
use keysign_shared::{
    constants::{PARTICIPANT_POLL_INTERVAL_MILLIS, SETUP_TIMEOUT_SECONDS},
    threshold, Vault,
};
use tokio::sync::watch;

use crate::errors::ClientError;

pub struct PeerDiscovery {
    relay: RelayClient,
    session_id: String,
    local_party_id: String,
    /// The vault's signers, in roster order
    roster: Vec<String>,
    poll_interval: Duration,
    setup_timeout: Duration,
}

impl PeerDiscovery {
    pub fn new(relay: RelayClient, session_id: &str, vault: &Vault) -> Self {
        Self {
            relay,
            session_id: session_id.to_string(),
            local_party_id: vault.local_party_id.clone(),
            roster: vault.signers.clone(),
            poll_interval: Duration::from_millis(PARTICIPANT_POLL_INTERVAL_MILLIS),
            setup_timeout: Duration::from_secs(SETUP_TIMEOUT_SECONDS),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_setup_timeout(mut self, setup_timeout: Duration) -> Self {
        self.setup_timeout = setup_timeout;
        self
    }

    /// Parties needed before a keysign may start
    pub fn threshold(&self) -> usize {
        threshold(self.roster.len())
    }

    /// Admit every joined party which holds a share. The local party leads, the rest follow in
    /// roster order.
    pub fn admitted(&self, participants: &[String]) -> Vec<String> {
        let peers = self
            .roster
            .iter()
            .filter(|party| **party != self.local_party_id && participants.contains(party));
        std::iter::once(&self.local_party_id).chain(peers).cloned().collect()
    }

    /// Register the local party with the relay
    pub async fn join(&self) -> Result<(), ClientError> {
        if !self.roster.contains(&self.local_party_id) {
            return Err(ClientError::UnknownParty(self.local_party_id.clone()));
        }
        self.relay.join(&self.session_id, &self.local_party_id).await?;
        Ok(())
    }

    /// As the initiating device, start the session once enough parties have joined.
    ///
    /// The threshold is checked again whenever the set of joined parties changes. `on_change` sees
    /// each new selection. Returns the committee the session was started with.
    #[tracing::instrument(
        skip_all,
        fields(session_id = %self.session_id, party_id = %self.local_party_id),
        level = tracing::Level::DEBUG
    )]
    pub async fn start_when_ready(
        &self,
        mut shutdown: watch::Receiver<bool>,
        mut on_change: impl FnMut(&[String]),
    ) -> Result<Vec<String>, ClientError> {
        self.join().await?;
        let threshold = self.threshold();
        let mut selection: Option<Vec<String>> = None;
        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {},
                _ = session_closed(&mut shutdown) => return Err(ClientError::Cancelled),
            }
            let participants = match self.relay.list_participants(&self.session_id).await {
                Ok(participants) => participants,
                Err(err) => {
                    tracing::warn!("Could not list participants: {err}");
                    continue;
                },
            };
            let admitted = self.admitted(&participants);
            if selection.as_ref() == Some(&admitted) {
                continue;
            }
            tracing::debug!("{} of {threshold} parties needed: {admitted:?}", admitted.len());
            on_change(&admitted);
            if admitted.len() >= threshold {
                self.relay.start_session(&self.session_id, &admitted).await?;
                tracing::info!("Started session with {admitted:?}");
                return Ok(admitted);
            }
            selection = Some(admitted);
        }
    }

    /// As a joining device, wait for the initiating device to start the session
    #[tracing::instrument(
        skip_all,
        fields(session_id = %self.session_id, party_id = %self.local_party_id),
        level = tracing::Level::DEBUG
    )]
    pub async fn wait_for_start(&self) -> Result<Vec<String>, ClientError> {
        self.join().await?;

        let mut backoff = ExponentialBackoff::default();
        backoff.initial_interval = self.poll_interval;
        backoff.max_interval = self.poll_interval * 4;
        backoff.max_elapsed_time = Some(self.setup_timeout);

        let started = || async {
            match self.relay.started_committee(&self.session_id).await {
                Ok(Some(committee)) => Ok(committee),
                Ok(None) => Err(backoff::Error::transient(ClientError::SetupTimeout)),
                Err(err) => {
                    tracing::warn!("Could not check session start: {err}");
                    Err(backoff::Error::transient(ClientError::from(err)))
                },
            }
        };
        let committee = backoff::future::retry(backoff, started)
            .await
            .map_err(|_| ClientError::SetupTimeout)?;

        if !committee.contains(&self.local_party_id) {
            return Err(ClientError::NotInCommittee(self.local_party_id.clone()));
        }
        Ok(committee)
    }
}

/// Resolves once `shutdown` is set. Pends forever if nobody can set it.
pub(crate) async fn session_closed(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|closed| *closed).await.is_err() {
        std::future::pending::<()>().await;
    }
}
