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

//! Submission APIs of each chain family
use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::prelude::{Engine, BASE64_STANDARD};
use keysign_shared::{Chain, ChainFamily};
use serde::Deserialize;
use serde_json::json;

use crate::{config::Configuration, errors::BroadcastError};

/// Submits a signed transaction to a chain
#[async_trait]
pub trait ChainApi: Send + Sync {
    /// Submit a raw transaction in the encoding its builder produced, returning the chain's
    /// transaction id
    async fn broadcast_transaction(
        &self,
        chain: Chain,
        raw_transaction: &str,
    ) -> Result<String, BroadcastError>;
}

/// [ChainApi] over the public HTTP APIs configured for each chain
#[derive(Debug, Clone)]
pub struct HttpChainApi {
    client: reqwest::Client,
    endpoints: BTreeMap<Chain, String>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BlockchairResponse {
    data: Option<BlockchairPush>,
    context: Option<BlockchairContext>,
}

#[derive(Debug, Deserialize)]
struct BlockchairPush {
    transaction_hash: String,
}

#[derive(Debug, Deserialize)]
struct BlockchairContext {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CosmosBroadcastResponse {
    tx_response: Option<CosmosTxResponse>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CosmosTxResponse {
    txhash: String,
    code: u32,
    #[serde(default)]
    raw_log: String,
}

impl HttpChainApi {
    pub fn new(config: &Configuration) -> Result<Self, BroadcastError> {
        let client = reqwest::Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self { client, endpoints: config.endpoints.clone() })
    }

    fn endpoint(&self, chain: Chain) -> Result<&str, BroadcastError> {
        self.endpoints
            .get(&chain)
            .map(|url| url.trim_end_matches('/'))
            .ok_or(BroadcastError::NoEndpoint(chain))
    }

    async fn json_rpc(
        &self,
        chain: Chain,
        method: &str,
        params: serde_json::Value,
    ) -> Result<String, BroadcastError> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let response: RpcResponse<String> =
            self.client.post(self.endpoint(chain)?).json(&body).send().await?.json().await?;
        match response {
            RpcResponse { error: Some(error), .. } => Err(BroadcastError::Rejected {
                chain,
                reason: format!("{} ({})", error.message, error.code),
            }),
            RpcResponse { result: Some(tx_id), .. } => Ok(tx_id),
            _ => Err(BroadcastError::UnexpectedResponse { chain, response: method.to_string() }),
        }
    }

    async fn blockchair_push(&self, chain: Chain, raw: &str) -> Result<String, BroadcastError> {
        let url = format!("{}/push/transaction", self.endpoint(chain)?);
        let response = self.client.post(url).json(&json!({ "data": raw })).send().await?;
        let status = response.status();
        let text = response.text().await?;
        let parsed: BlockchairResponse = serde_json::from_str(&text)
            .map_err(|_| BroadcastError::UnexpectedResponse { chain, response: text.clone() })?;
        if let Some(reason) = parsed.context.and_then(|context| context.error) {
            return Err(BroadcastError::Rejected { chain, reason });
        }
        match parsed.data {
            Some(push) if status.is_success() => Ok(push.transaction_hash),
            _ => Err(BroadcastError::UnexpectedResponse { chain, response: text }),
        }
    }

    async fn cosmos_broadcast(
        &self,
        chain: Chain,
        request: &str,
    ) -> Result<String, BroadcastError> {
        let url = format!("{}/cosmos/tx/v1beta1/txs", self.endpoint(chain)?);
        let body: serde_json::Value = serde_json::from_str(request).map_err(|e| {
            BroadcastError::InvalidTransaction { chain, reason: e.to_string() }
        })?;
        let response: CosmosBroadcastResponse =
            self.client.post(url).json(&body).send().await?.json().await?;
        match response {
            CosmosBroadcastResponse { tx_response: Some(tx), .. } if tx.code == 0 => Ok(tx.txhash),
            CosmosBroadcastResponse { tx_response: Some(tx), .. } => Err(BroadcastError::Rejected {
                chain,
                reason: format!("code {}: {}", tx.code, tx.raw_log),
            }),
            CosmosBroadcastResponse { message, .. } => Err(BroadcastError::Rejected {
                chain,
                reason: message.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl ChainApi for HttpChainApi {
    #[tracing::instrument(skip(self, raw_transaction), level = tracing::Level::DEBUG)]
    async fn broadcast_transaction(
        &self,
        chain: Chain,
        raw_transaction: &str,
    ) -> Result<String, BroadcastError> {
        match chain.family() {
            ChainFamily::Utxo => self.blockchair_push(chain, raw_transaction).await,
            ChainFamily::Evm => {
                let raw = format!("0x{}", raw_transaction.trim_start_matches("0x"));
                self.json_rpc(chain, "eth_sendRawTransaction", json!([raw])).await
            },
            ChainFamily::Cosmos => self.cosmos_broadcast(chain, raw_transaction).await,
            ChainFamily::Solana => {
                let bytes = bs58::decode(raw_transaction).into_vec().map_err(|e| {
                    BroadcastError::InvalidTransaction { chain, reason: e.to_string() }
                })?;
                let params = json!([BASE64_STANDARD.encode(bytes), { "encoding": "base64" }]);
                self.json_rpc(chain, "sendTransaction", params).await
            },
        }
    }
}
