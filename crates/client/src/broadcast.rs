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

//! Routes signed transactions to their chain. Submission is never retried.
use std::{collections::HashSet, sync::Arc};

use keysign_shared::{Chain, SignedTransactionResult};
use tokio::sync::Mutex;

use crate::{chain_api::ChainApi, errors::BroadcastError};

/// Broadcasts the transactions of one keysign attempt.
///
/// Each signed transaction is submitted at most once, however often the caller asks.
pub struct BroadcastDispatcher {
    api: Arc<dyn ChainApi>,
    submitted: Mutex<HashSet<String>>,
}

impl BroadcastDispatcher {
    pub fn new(api: Arc<dyn ChainApi>) -> Self {
        Self { api, submitted: Mutex::new(HashSet::new()) }
    }

    /// Submit a signed transaction, returning the chain's transaction id
    #[tracing::instrument(
        skip_all,
        fields(chain = %chain, transaction_hash = %transaction.transaction_hash),
        level = tracing::Level::DEBUG
    )]
    pub async fn broadcast(
        &self,
        chain: Chain,
        transaction: &SignedTransactionResult,
    ) -> Result<String, BroadcastError> {
        // Held across the submission so a concurrent call cannot slip in
        let mut submitted = self.submitted.lock().await;
        if !submitted.insert(transaction.transaction_hash.clone()) {
            return Err(BroadcastError::AlreadyBroadcast);
        }
        let tx_id = self.api.broadcast_transaction(chain, &transaction.raw_transaction).await?;
        tracing::info!("Broadcast {chain} transaction {tx_id}");
        Ok(tx_id)
    }

    /// Submit transactions in order, stopping at the first failure
    pub async fn broadcast_all(
        &self,
        chain: Chain,
        transactions: &[SignedTransactionResult],
    ) -> Result<Vec<String>, BroadcastError> {
        let mut tx_ids = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            tx_ids.push(self.broadcast(chain, transaction).await?);
        }
        Ok(tx_ids)
    }

    pub async fn was_submitted(&self, transaction: &SignedTransactionResult) -> bool {
        self.submitted.lock().await.contains(&transaction.transaction_hash)
    }
}
