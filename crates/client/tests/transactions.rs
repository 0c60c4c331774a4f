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

//! Building, signing and assembling transactions for each chain family with the test vault
mod helpers;

use base64::prelude::{Engine, BASE64_STANDARD};
use ed25519_dalek::Verifier;
use ethers_core::{
    types::{Transaction, U256},
    utils::{
        id,
        rlp::{Decodable, Rlp},
    },
};
use helpers::{
    btc_transfer, coin, eth_transfer, ethereum_fees, evm_address, payload, solana_transfer, usdc,
    ETH_INBOUND_VAULT, THORCHAIN_ROUTER, USDC_CONTRACT,
};
use k256::ecdsa::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey};
use keysign_client::{
    assemble_signed_transactions,
    chains::{
        address::cosmos_account,
        cosmos::{
            proto::{
                AuthInfo, MsgDeposit, MsgSend, ThorchainMsgSend, TxBody, TxRaw,
                BANK_MSG_SEND_TYPE_URL, THORCHAIN_MSG_DEPOSIT_TYPE_URL,
                THORCHAIN_MSG_SEND_TYPE_URL,
            },
            BroadcastTxRequest,
        },
    },
    pre_signed_image_hashes, ChainError, Hasher,
};
use keysign_protocol::SignatureTable;
use keysign_shared::{
    constants::{COSMOS_GAS_LIMIT, MAYACHAIN_GAS_LIMIT, THORCHAIN_GAS_LIMIT},
    BlockChainSpecific, Chain, Coin, Erc20ApprovePayload, KeysignPayload, SignedTransactionResult,
    ThorChainSwapPayload, UtxoInfo,
};
use keysign_testing_utils::{
    constants::{TEST_ECDSA_PUBLIC_KEY, TEST_EDDSA_PUBLIC_KEY, TEST_PARTIES},
    sign_with_test_vault, signature_table_for, test_vault,
};
use prost::Message;

/// Sign every message a payload needs with the test vault and assemble the result
fn sign_and_assemble(payload: &KeysignPayload) -> Vec<SignedTransactionResult> {
    let vault = test_vault(&TEST_PARTIES[0]);
    let chain = payload.coin.chain;
    let hashes = pre_signed_image_hashes(&vault, payload).unwrap();
    let table = signature_table_for(&hashes, chain.key_type(), chain.derivation_path()).unwrap();
    assemble_signed_transactions(&vault, payload, &table).unwrap()
}

fn decode_evm(transaction: &SignedTransactionResult) -> Transaction {
    let raw = hex::decode(&transaction.raw_transaction).unwrap();
    Transaction::decode(&Rlp::new(&raw)).unwrap()
}

fn decode_utxo(transaction: &SignedTransactionResult) -> bitcoin::Transaction {
    let raw = hex::decode(&transaction.raw_transaction).unwrap();
    let decoded: bitcoin::Transaction = bitcoin::consensus::deserialize(&raw).unwrap();
    assert_eq!(decoded.compute_txid().to_string(), transaction.transaction_hash);
    decoded
}

fn decode_cosmos(transaction: &SignedTransactionResult) -> (TxRaw, TxBody, AuthInfo) {
    let request: BroadcastTxRequest = serde_json::from_str(&transaction.raw_transaction).unwrap();
    assert_eq!(request.mode, "BROADCAST_MODE_SYNC");
    let tx_bytes = BASE64_STANDARD.decode(request.tx_bytes).unwrap();
    assert_eq!(transaction.transaction_hash, hex::encode_upper(Hasher::sha256(&tx_bytes)));
    let tx_raw = TxRaw::decode(tx_bytes.as_slice()).unwrap();
    let body = TxBody::decode(tx_raw.body_bytes.as_slice()).unwrap();
    let auth_info = AuthInfo::decode(tx_raw.auth_info_bytes.as_slice()).unwrap();
    (tx_raw, body, auth_info)
}

fn swap(
    from_coin: Coin,
    to_coin: Coin,
    vault_address: &str,
    from_amount: u128,
) -> ThorChainSwapPayload {
    ThorChainSwapPayload {
        from_address: from_coin.address.clone(),
        from_coin,
        to_coin,
        vault_address: vault_address.to_string(),
        router_address: None,
        from_amount,
        to_amount_limit: "0".to_string(),
        streaming_interval: "1".to_string(),
        streaming_quantity: "0".to_string(),
        expiration_time: 1_900_000_000,
        is_affiliate: false,
    }
}

#[test]
fn test_bitcoin_transaction_spends_every_utxo() {
    let payload = btc_transfer();
    assert_eq!(payload.coin.address, "bc1q9evuhtdxhuupyz4ylgh5afuqrpecc6zf5dcdn8");
    assert_eq!(
        payload.coin.hex_public_key,
        "0296493c52f0ef9ae9c3e049d2893d0ddb2b2d146bf2e379414962d7c866d54e26"
    );

    let hashes = pre_signed_image_hashes(&test_vault(&TEST_PARTIES[0]), &payload).unwrap();
    assert_eq!(
        hashes,
        vec![
            "a3e3bb191a48466fde44a72da36268c191ef40623e677b8f30879c8d649024eb",
            "c6abb431f8a75123dfcd577f64ea51b53f320370269724571e8522dc3ee1b7c1",
        ]
    );

    let transactions = sign_and_assemble(&payload);
    assert_eq!(transactions.len(), 1);
    let transaction = &transactions[0];
    // The segwit txid does not cover the witnesses
    assert_eq!(
        transaction.transaction_hash,
        "0f774ba8a528e92d7148d05769deb2116f41cbff89dbdb5077a81928b2cd7da1"
    );
    // Version, segwit marker and flag, two inputs
    assert!(transaction.raw_transaction.starts_with("01000000000102"));
    // 110000 in, 70000 out, 2090 fee leaves 37910 change
    assert!(transaction.raw_transaction.contains(&hex::encode(70_000u64.to_le_bytes())));
    assert!(transaction.raw_transaction.contains(&hex::encode(37_910u64.to_le_bytes())));
    assert!(transaction.raw_transaction.ends_with("00000000"));

    let decoded = decode_utxo(transaction);
    assert_eq!(decoded.input.len(), 2);
    for input in &decoded.input {
        assert!(input.script_sig.is_empty());
        let witness = input.witness.to_vec();
        assert_eq!(witness.len(), 2);
        assert_eq!(witness[0].last(), Some(&0x01));
        assert_eq!(hex::encode(&witness[1]), payload.coin.hex_public_key);
    }
}

#[test]
fn test_legacy_utxo_chains_sign_in_script_sig() {
    for (chain, sighash_type) in
        [(Chain::Dogecoin, 0x01), (Chain::Dash, 0x01), (Chain::BitcoinCash, 0x41)]
    {
        let from = coin(chain);
        let mut payload = payload(
            from.clone(),
            &from.address,
            5_000_000_000,
            BlockChainSpecific::Utxo { byte_fee: 100, send_max_amount: false },
        );
        payload.utxos = vec![UtxoInfo {
            hash: "5c8a462a5f7a842bd8c997c179c3e10efa083c4e9cce27ddcd3433be619a6292".to_string(),
            amount: 10_000_000_000,
            index: 3,
        }];

        let transactions = sign_and_assemble(&payload);
        let decoded = decode_utxo(&transactions[0]);
        assert_eq!(decoded.input[0].previous_output.vout, 3);
        assert!(decoded.input[0].witness.is_empty());
        // Destination and change
        assert_eq!(decoded.output.len(), 2);
        assert_eq!(decoded.output[0].value.to_sat(), 5_000_000_000);

        let pushes = decoded.input[0]
            .script_sig
            .instructions()
            .map(|instruction| instruction.unwrap().push_bytes().unwrap().as_bytes().to_vec())
            .collect::<Vec<_>>();
        assert_eq!(pushes.len(), 2, "{chain}");
        assert_eq!(pushes[0].last(), Some(&sighash_type), "{chain}");
        assert_eq!(hex::encode(&pushes[1]), from.hex_public_key);
    }
}

#[test]
fn test_utxo_assembly_needs_every_input_signed() {
    let vault = test_vault(&TEST_PARTIES[0]);
    let payload = btc_transfer();
    let hashes = pre_signed_image_hashes(&vault, &payload).unwrap();
    let path = Chain::Bitcoin.derivation_path();

    let partial = signature_table_for(&hashes[..1], Chain::Bitcoin.key_type(), path).unwrap();
    match assemble_signed_transactions(&vault, &payload, &partial) {
        Err(ChainError::MissingSignature(message)) => assert_eq!(message, hashes[1]),
        other => panic!("Expected a missing signature, got {other:?}"),
    }

    // A valid signature, but over the other input's digest
    let second = sign_with_test_vault(&hashes[1], Chain::Bitcoin.key_type(), path).unwrap();
    let mut swapped = SignatureTable::new();
    swapped.insert(&hashes[0], second.clone()).unwrap();
    swapped.insert(&hashes[1], second).unwrap();
    assert!(matches!(
        assemble_signed_transactions(&vault, &payload, &swapped),
        Err(ChainError::VerificationFailed { .. })
    ));

    // Signed by the vault, but with the Ethereum account's key
    let wrong_key =
        signature_table_for(&hashes, Chain::Bitcoin.key_type(), Chain::Ethereum.derivation_path())
            .unwrap();
    assert!(matches!(
        assemble_signed_transactions(&vault, &payload, &wrong_key),
        Err(ChainError::VerificationFailed { .. })
    ));
}

#[test]
fn test_bitcoin_swap_carries_memo() {
    let mut payload = btc_transfer();
    let inbound = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
    let destination = coin(Chain::Ethereum);
    payload.swap_payload = Some(swap(payload.coin.clone(), destination.clone(), inbound, 50_000));

    let transactions = sign_and_assemble(&payload);
    let memo = format!("=:ETH.ETH:{}:0/1/0", destination.address);
    let op_return = format!("6a{:02x}{}", memo.len(), hex::encode(&memo));
    assert!(transactions[0].raw_transaction.contains(&op_return));
    assert!(transactions[0].raw_transaction.contains(&hex::encode(50_000u64.to_le_bytes())));
}

#[test]
fn test_utxo_amounts_beyond_the_balance_are_rejected() {
    let vault = test_vault(&TEST_PARTIES[0]);

    let mut oversized = btc_transfer();
    oversized.to_amount = u128::from(u64::MAX);
    assert!(matches!(
        pre_signed_image_hashes(&vault, &oversized),
        Err(ChainError::InsufficientFunds { available: 110_000, .. })
    ));

    let mut huge_fee = btc_transfer();
    huge_fee.chain_specific =
        BlockChainSpecific::Utxo { byte_fee: u64::MAX, send_max_amount: true };
    assert!(matches!(
        pre_signed_image_hashes(&vault, &huge_fee),
        Err(ChainError::AmountOverflow(_))
    ));

    let mut huge_balance = btc_transfer();
    huge_balance.utxos[1].amount = u64::MAX;
    assert!(matches!(
        pre_signed_image_hashes(&vault, &huge_balance),
        Err(ChainError::AmountOverflow(_))
    ));
}

#[test]
fn test_payload_must_belong_to_the_vault() {
    let vault = test_vault(&TEST_PARTIES[0]);

    let mut wrong_account = btc_transfer();
    wrong_account.coin.hex_public_key = coin(Chain::Ethereum).hex_public_key;
    assert!(matches!(
        pre_signed_image_hashes(&vault, &wrong_account),
        Err(ChainError::PublicKeyMismatch { chain: Chain::Bitcoin, .. })
    ));

    let mut wrong_vault = btc_transfer();
    wrong_vault.vault_pub_key_ecdsa = coin(Chain::Ethereum).hex_public_key;
    assert!(matches!(
        pre_signed_image_hashes(&vault, &wrong_vault),
        Err(ChainError::InvalidPayload(_))
    ));

    let mut wrong_address = eth_transfer();
    wrong_address.coin.address = helpers::ETH_RECIPIENT.to_string();
    assert!(matches!(
        pre_signed_image_hashes(&vault, &wrong_address),
        Err(ChainError::InvalidAddress { chain: Chain::Ethereum, .. })
    ));
}

#[test]
fn test_eth_transfer_recovers_to_vault_address() {
    let payload = eth_transfer();
    let transactions = sign_and_assemble(&payload);
    assert_eq!(transactions.len(), 1);

    let raw = hex::decode(&transactions[0].raw_transaction).unwrap();
    assert_eq!(raw[0], 0x02);
    let expected_hash = format!("0x{}", hex::encode(Hasher::keccak(&raw)));
    assert_eq!(transactions[0].transaction_hash, expected_hash);

    let transaction = decode_evm(&transactions[0]);
    let vault_address = evm_address(&hex::decode(&payload.coin.hex_public_key).unwrap());
    assert_eq!(transaction.recover_from().unwrap(), vault_address);
    assert_eq!(transaction.nonce, U256::from(7));
    assert_eq!(transaction.value, U256::from(payload.to_amount));
    assert_eq!(transaction.chain_id, Some(U256::from(1)));
    assert!(transaction.input.is_empty());
}

#[test]
fn test_erc20_transfer_calls_token_contract() {
    let payload = payload(usdc(), helpers::ETH_RECIPIENT, 25_000_000, ethereum_fees(3));
    let transaction = decode_evm(&sign_and_assemble(&payload)[0]);
    assert_eq!(format!("{:?}", transaction.to.unwrap()), USDC_CONTRACT.to_lowercase());
    assert_eq!(transaction.value, U256::zero());
    assert_eq!(&transaction.input[..4], &id("transfer(address,uint256)"));
}

#[test]
fn test_token_swap_is_approved_first() {
    let mut payload = payload(usdc(), "", 0, ethereum_fees(11));
    let mut swap = swap(usdc(), coin(Chain::Bitcoin), ETH_INBOUND_VAULT, 25_000_000);
    swap.router_address = Some(THORCHAIN_ROUTER.to_string());
    payload.swap_payload = Some(swap);
    payload.approve_payload =
        Some(Erc20ApprovePayload { amount: 25_000_000, spender: THORCHAIN_ROUTER.to_string() });

    let hashes = pre_signed_image_hashes(&test_vault(&TEST_PARTIES[0]), &payload).unwrap();
    assert_eq!(hashes.len(), 2);

    let transactions = sign_and_assemble(&payload);
    assert_eq!(transactions.len(), 2);
    let vault_address = evm_address(&hex::decode(&payload.coin.hex_public_key).unwrap());

    let approve = decode_evm(&transactions[0]);
    assert_eq!(approve.nonce, U256::from(11));
    assert_eq!(format!("{:?}", approve.to.unwrap()), USDC_CONTRACT.to_lowercase());
    assert_eq!(&approve.input[..4], &id("approve(address,uint256)"));
    assert_eq!(approve.recover_from().unwrap(), vault_address);

    let deposit = decode_evm(&transactions[1]);
    assert_eq!(deposit.nonce, U256::from(12));
    assert_eq!(format!("{:?}", deposit.to.unwrap()), THORCHAIN_ROUTER.to_lowercase());
    assert_eq!(
        &deposit.input[..4],
        &id("depositWithExpiry(address,address,uint256,string,uint256)")
    );
    assert_eq!(deposit.value, U256::zero());
    assert_eq!(deposit.recover_from().unwrap(), vault_address);
}

#[test]
fn test_cosmos_hub_send() {
    let mut payload = payload(
        coin(Chain::GaiaChain),
        "cosmos1w508d6qejxtdg4y5r3zarvary0c5xw7k6ah60c",
        1_000_000,
        BlockChainSpecific::Cosmos { account_number: 1234, sequence: 5, gas: 7500 },
    );
    payload.memo = Some("rent".to_string());
    let hashes = pre_signed_image_hashes(&test_vault(&TEST_PARTIES[0]), &payload).unwrap();

    let (tx_raw, body, auth_info) = decode_cosmos(&sign_and_assemble(&payload)[0]);
    assert_eq!(body.memo, "rent");
    assert_eq!(body.messages[0].type_url, BANK_MSG_SEND_TYPE_URL);
    let send = MsgSend::decode(body.messages[0].value.as_slice()).unwrap();
    assert_eq!(send.from_address, payload.coin.address);
    assert_eq!(send.to_address, payload.to_address);
    assert_eq!(send.amount[0].denom, "uatom");
    assert_eq!(send.amount[0].amount, "1000000");

    let fee = auth_info.fee.unwrap();
    assert_eq!(fee.gas_limit, COSMOS_GAS_LIMIT);
    assert_eq!(fee.amount[0].amount, "7500");
    assert_eq!(auth_info.signer_infos[0].sequence, 5);

    let key = VerifyingKey::from_sec1_bytes(&hex::decode(&payload.coin.hex_public_key).unwrap())
        .unwrap();
    let signature = Signature::from_slice(&tx_raw.signatures[0]).unwrap();
    key.verify_prehash(&hex::decode(&hashes[0]).unwrap(), &signature).unwrap();
}

#[test]
fn test_thorchain_and_mayachain_fees() {
    let thor = coin(Chain::ThorChain);
    let maya = coin(Chain::MayaChain);
    assert!(thor.address.starts_with("thor1"));
    assert!(maya.address.starts_with("maya1"));

    let thor_send = payload(
        thor.clone(),
        &thor.address,
        100_000_000,
        BlockChainSpecific::ThorChain { account_number: 77, sequence: 0 },
    );
    let (_, body, auth_info) = decode_cosmos(&sign_and_assemble(&thor_send)[0]);
    assert_eq!(body.messages[0].type_url, THORCHAIN_MSG_SEND_TYPE_URL);
    let send = ThorchainMsgSend::decode(body.messages[0].value.as_slice()).unwrap();
    assert_eq!(send.from_address, cosmos_account(Chain::ThorChain, &thor.address).unwrap());
    assert_eq!(send.amount[0].denom, "rune");
    let fee = auth_info.fee.unwrap();
    assert_eq!(fee.gas_limit, THORCHAIN_GAS_LIMIT);
    assert!(fee.amount.is_empty());

    let maya_send = payload(
        maya.clone(),
        &maya.address,
        100_000_000,
        BlockChainSpecific::MayaChain { account_number: 78, sequence: 1 },
    );
    let (_, body, auth_info) = decode_cosmos(&sign_and_assemble(&maya_send)[0]);
    assert_eq!(body.messages[0].type_url, THORCHAIN_MSG_SEND_TYPE_URL);
    let fee = auth_info.fee.unwrap();
    assert_eq!(fee.gas_limit, MAYACHAIN_GAS_LIMIT);
    assert_eq!(fee.amount[0].denom, "cacao");
    assert_eq!(fee.amount[0].amount, MAYACHAIN_GAS_LIMIT.to_string());
}

#[test]
fn test_thorchain_swap_is_a_deposit() {
    let thor = coin(Chain::ThorChain);
    let destination = coin(Chain::Bitcoin);
    let mut payload = payload(
        thor.clone(),
        "",
        0,
        BlockChainSpecific::ThorChain { account_number: 77, sequence: 3 },
    );
    payload.swap_payload = Some(swap(thor.clone(), destination.clone(), "", 500_000_000));

    let (_, body, _) = decode_cosmos(&sign_and_assemble(&payload)[0]);
    assert_eq!(body.messages[0].type_url, THORCHAIN_MSG_DEPOSIT_TYPE_URL);
    let deposit = MsgDeposit::decode(body.messages[0].value.as_slice()).unwrap();
    assert_eq!(deposit.memo, format!("=:BTC.BTC:{}:0/1/0", destination.address));
    assert_eq!(deposit.coins[0].amount, "500000000");
    assert_eq!(deposit.coins[0].asset.as_ref().unwrap().symbol, "RUNE");
    assert_eq!(deposit.signer, cosmos_account(Chain::ThorChain, &thor.address).unwrap());
}

#[test]
fn test_solana_transfer() {
    let payload = solana_transfer(5_000);
    assert_eq!(payload.coin.hex_public_key, TEST_EDDSA_PUBLIC_KEY);
    let hashes = pre_signed_image_hashes(&test_vault(&TEST_PARTIES[0]), &payload).unwrap();
    let message = hex::decode(&hashes[0]).unwrap();
    // One signer, no read only signers, system and compute budget programs read only
    assert_eq!(&message[..4], &[1, 0, 2, 4]);

    let transactions = sign_and_assemble(&payload);
    let raw = bs58::decode(&transactions[0].raw_transaction).into_vec().unwrap();
    assert_eq!(raw[0], 1);
    assert_eq!(&raw[65..], message.as_slice());

    let signature = ed25519_dalek::Signature::from_slice(&raw[1..65]).unwrap();
    let key: [u8; 32] = hex::decode(TEST_EDDSA_PUBLIC_KEY).unwrap().try_into().unwrap();
    ed25519_dalek::VerifyingKey::from_bytes(&key).unwrap().verify(&message, &signature).unwrap();
    assert_eq!(transactions[0].transaction_hash, bs58::encode(&raw[1..65]).into_string());

    // Without a priority fee there is no compute budget instruction
    let hashes =
        pre_signed_image_hashes(&test_vault(&TEST_PARTIES[0]), &solana_transfer(0)).unwrap();
    assert_eq!(&hex::decode(&hashes[0]).unwrap()[..4], &[1, 0, 1, 3]);
}

#[test]
fn test_unsupported_payloads() {
    let vault = test_vault(&TEST_PARTIES[0]);

    let mut spl = solana_transfer(0);
    spl.coin.is_native_token = false;
    spl.coin.contract_address = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string();
    assert!(matches!(pre_signed_image_hashes(&vault, &spl), Err(ChainError::InvalidPayload(_))));

    let mut solana_swap = solana_transfer(0);
    solana_swap.swap_payload =
        Some(swap(solana_swap.coin.clone(), coin(Chain::Bitcoin), "", 1_000_000));
    assert!(matches!(
        pre_signed_image_hashes(&vault, &solana_swap),
        Err(ChainError::UnsupportedSwap(Chain::Solana))
    ));

    // The vault key on a Solana payload is never the ECDSA one
    assert_ne!(solana_swap.coin.hex_public_key, TEST_ECDSA_PUBLIC_KEY);
}
