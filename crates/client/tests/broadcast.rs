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

//! Submitting signed transactions, against a mock chain API and a local HTTP server
mod helpers;

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use axum::{extract::State, routing::post, Json, Router};
use base64::prelude::{Engine, BASE64_STANDARD};
use helpers::{mock_api, MockChainApi};
use keysign_client::{BroadcastDispatcher, BroadcastError, ChainApi, Configuration, HttpChainApi};
use keysign_shared::{Chain, SignedTransactionResult};
use serde_json::{json, Value};
use tokio::net::TcpListener;

fn signed(raw: &str, hash: &str) -> SignedTransactionResult {
    SignedTransactionResult { raw_transaction: raw.to_string(), transaction_hash: hash.to_string() }
}

#[tokio::test]
async fn test_transaction_is_submitted_once() {
    let api = mock_api();
    let dispatcher = BroadcastDispatcher::new(api.clone());
    let transaction = signed("02f8", "0xabc");

    assert_eq!(dispatcher.broadcast(Chain::Ethereum, &transaction).await.unwrap(), "ethereum-tx-1");
    assert!(dispatcher.was_submitted(&transaction).await);
    assert!(matches!(
        dispatcher.broadcast(Chain::Ethereum, &transaction).await,
        Err(BroadcastError::AlreadyBroadcast)
    ));
    assert_eq!(api.submissions().len(), 1);

    // A different transaction is still sent
    dispatcher.broadcast(Chain::Ethereum, &signed("02f9", "0xdef")).await.unwrap();
    assert_eq!(api.submissions().len(), 2);
}

#[tokio::test]
async fn test_rejected_transaction_is_not_resubmitted() {
    let api = Arc::new(MockChainApi::rejecting());
    let dispatcher = BroadcastDispatcher::new(api.clone());
    let transaction = signed("0100", "f00d");

    assert!(matches!(
        dispatcher.broadcast(Chain::Bitcoin, &transaction).await,
        Err(BroadcastError::Rejected { chain: Chain::Bitcoin, .. })
    ));
    assert!(matches!(
        dispatcher.broadcast(Chain::Bitcoin, &transaction).await,
        Err(BroadcastError::AlreadyBroadcast)
    ));
    assert_eq!(api.submissions().len(), 1);
}

#[tokio::test]
async fn test_concurrent_broadcasts_submit_once() {
    let api = mock_api();
    let dispatcher = Arc::new(BroadcastDispatcher::new(api.clone()));
    let transaction = signed("raw", "hash");

    let attempts = (0..8).map(|_| {
        let dispatcher = dispatcher.clone();
        let transaction = transaction.clone();
        async move { dispatcher.broadcast(Chain::Solana, &transaction).await }
    });
    let results = futures::future::join_all(attempts).await;
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert_eq!(api.submissions().len(), 1);
}

#[tokio::test]
async fn test_broadcast_all_stops_at_first_failure() {
    let api = Arc::new(MockChainApi::rejecting());
    let dispatcher = BroadcastDispatcher::new(api.clone());
    let transactions = vec![signed("approve", "0x01"), signed("swap", "0x02")];

    assert!(dispatcher.broadcast_all(Chain::Ethereum, &transactions).await.is_err());
    assert_eq!(api.submissions(), vec![(Chain::Ethereum, "approve".to_string())]);
    assert!(!dispatcher.was_submitted(&transactions[1]).await);
}

type Requests = Arc<Mutex<Vec<Value>>>;

async fn blockchair(State(requests): State<Requests>, Json(body): Json<Value>) -> Json<Value> {
    requests.lock().unwrap().push(body);
    Json(json!({ "data": { "transaction_hash": "b1t" }, "context": { "code": 200 } }))
}

async fn json_rpc(State(requests): State<Requests>, Json(body): Json<Value>) -> Json<Value> {
    let result = match body["method"].as_str() {
        Some("eth_sendRawTransaction") => json!({ "jsonrpc": "2.0", "id": 1, "result": "0xe7h" }),
        _ => json!({ "jsonrpc": "2.0", "id": 1, "result": "s0l" }),
    };
    requests.lock().unwrap().push(body);
    Json(result)
}

async fn cosmos_accepting(
    State(requests): State<Requests>,
    Json(body): Json<Value>,
) -> Json<Value> {
    requests.lock().unwrap().push(body);
    Json(json!({ "tx_response": { "txhash": "C0FFEE", "code": 0, "raw_log": "" } }))
}

async fn cosmos_rejecting(Json(_): Json<Value>) -> Json<Value> {
    Json(json!({ "tx_response": { "txhash": "BAD", "code": 5, "raw_log": "insufficient funds" } }))
}

/// A local server playing every chain's submission API
async fn spawn_chain_server() -> (String, Requests) {
    let requests = Requests::default();
    let app = Router::new()
        .route("/btc/push/transaction", post(blockchair))
        .route("/eth", post(json_rpc))
        .route("/sol", post(json_rpc))
        .route("/gaia/cosmos/tx/v1beta1/txs", post(cosmos_accepting))
        .route("/thor/cosmos/tx/v1beta1/txs", post(cosmos_rejecting))
        .with_state(requests.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (url, requests)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_http_chain_api_speaks_each_family() {
    let (url, requests) = spawn_chain_server().await;
    let endpoints: BTreeMap<Chain, String> = [
        (Chain::Bitcoin, "btc"),
        (Chain::Ethereum, "eth"),
        (Chain::Solana, "sol"),
        (Chain::GaiaChain, "gaia/"),
        (Chain::ThorChain, "thor"),
    ]
    .into_iter()
    .map(|(chain, path)| (chain, format!("{url}/{path}")))
    .collect();
    let api = HttpChainApi::new(&Configuration { endpoints, ..Default::default() }).unwrap();

    assert_eq!(api.broadcast_transaction(Chain::Bitcoin, "0100abcd").await.unwrap(), "b1t");
    assert_eq!(api.broadcast_transaction(Chain::Ethereum, "02f8aa").await.unwrap(), "0xe7h");
    let solana_raw = bs58::encode([1u8, 2, 3]).into_string();
    assert_eq!(api.broadcast_transaction(Chain::Solana, &solana_raw).await.unwrap(), "s0l");
    let cosmos_raw = json!({ "tx_bytes": "AAEC", "mode": "BROADCAST_MODE_SYNC" }).to_string();
    assert_eq!(api.broadcast_transaction(Chain::GaiaChain, &cosmos_raw).await.unwrap(), "C0FFEE");

    match api.broadcast_transaction(Chain::ThorChain, &cosmos_raw).await {
        Err(BroadcastError::Rejected { chain: Chain::ThorChain, reason }) => {
            assert!(reason.contains("insufficient funds"))
        },
        other => panic!("Expected a rejection, got {other:?}"),
    }
    assert!(matches!(
        api.broadcast_transaction(Chain::Polygon, "02").await,
        Err(BroadcastError::NoEndpoint(Chain::Polygon))
    ));

    let requests = requests.lock().unwrap();
    assert_eq!(requests[0], json!({ "data": "0100abcd" }));
    assert_eq!(requests[1]["method"], "eth_sendRawTransaction");
    assert_eq!(requests[1]["params"], json!(["0x02f8aa"]));
    assert_eq!(requests[2]["method"], "sendTransaction");
    assert_eq!(requests[2]["params"][0], BASE64_STANDARD.encode([1u8, 2, 3]));
    assert_eq!(requests[2]["params"][1], json!({ "encoding": "base64" }));
    assert_eq!(requests[3]["tx_bytes"], "AAEC");
}
