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

//! Solana native transfers, signed with the vault's EdDSA key
use keysign_protocol::SignatureTable;
use keysign_shared::{BlockChainSpecific, Chain, KeysignPayload, SignedTransactionResult};

use super::{amount_u64, Account, TransactionBuilder};
use crate::errors::ChainError;

pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
pub const COMPUTE_BUDGET_PROGRAM_ID: &str = "ComputeBudget111111111111111111111111111111";

const SYSTEM_TRANSFER: u32 = 2;
const SET_COMPUTE_UNIT_PRICE: u8 = 3;

struct Instruction {
    program_index: u8,
    accounts: Vec<u8>,
    data: Vec<u8>,
}

/// Decode a base58 account key or blockhash
pub fn decode_key(chain: Chain, key: &str) -> Result<[u8; 32], ChainError> {
    bs58::decode(key)
        .into_vec()
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| ChainError::InvalidAddress { chain, address: key.to_string() })
}

/// The legacy message of a transfer, which is what gets signed
pub fn transfer_message(
    account: &Account,
    payload: &KeysignPayload,
) -> Result<Vec<u8>, ChainError> {
    let chain = account.chain;
    let BlockChainSpecific::Solana { recent_block_hash, priority_fee } = &payload.chain_specific
    else {
        return Err(ChainError::InvalidPayload(format!("{chain} needs Solana parameters")));
    };
    if !payload.coin.is_native_token {
        return Err(ChainError::InvalidPayload("SPL token transfers are not supported".to_string()));
    }

    let from: [u8; 32] = account
        .public_key()
        .try_into()
        .map_err(|_| ChainError::InvalidPayload("Solana keys are 32 bytes".to_string()))?;
    if decode_key(chain, &payload.coin.address)? != from {
        return Err(ChainError::InvalidAddress { chain, address: payload.coin.address.clone() });
    }
    let to = decode_key(chain, &payload.to_address)?;
    let blockhash = decode_key(chain, recent_block_hash)?;
    let lamports = amount_u64(payload.to_amount)?;

    // Signer, then writable, then read only program accounts
    let mut keys = vec![from, to, decode_key(chain, SYSTEM_PROGRAM_ID)?];
    let mut instructions = Vec::new();
    if *priority_fee > 0 {
        keys.push(decode_key(chain, COMPUTE_BUDGET_PROGRAM_ID)?);
        let mut data = vec![SET_COMPUTE_UNIT_PRICE];
        data.extend_from_slice(&priority_fee.to_le_bytes());
        instructions.push(Instruction { program_index: 3, accounts: Vec::new(), data });
    }
    let mut data = SYSTEM_TRANSFER.to_le_bytes().to_vec();
    data.extend_from_slice(&lamports.to_le_bytes());
    instructions.push(Instruction { program_index: 2, accounts: vec![0, 1], data });

    let readonly_unsigned = (keys.len() - 2) as u8;
    let mut message = vec![1, 0, readonly_unsigned];
    write_compact_u16(&mut message, keys.len());
    for key in &keys {
        message.extend_from_slice(key);
    }
    message.extend_from_slice(&blockhash);
    write_compact_u16(&mut message, instructions.len());
    for instruction in instructions {
        message.push(instruction.program_index);
        write_compact_u16(&mut message, instruction.accounts.len());
        message.extend_from_slice(&instruction.accounts);
        write_compact_u16(&mut message, instruction.data.len());
        message.extend_from_slice(&instruction.data);
    }
    Ok(message)
}

fn write_compact_u16(out: &mut Vec<u8>, value: usize) {
    let mut value = value;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Native SOL transfers
pub struct SolanaBuilder;

impl TransactionBuilder for SolanaBuilder {
    fn pre_signed_image_hashes(
        &self,
        account: &Account,
        payload: &KeysignPayload,
    ) -> Result<Vec<String>, ChainError> {
        Ok(vec![hex::encode(transfer_message(account, payload)?)])
    }

    fn assemble_signed(
        &self,
        account: &Account,
        payload: &KeysignPayload,
        signatures: &SignatureTable,
    ) -> Result<SignedTransactionResult, ChainError> {
        let message = transfer_message(account, payload)?;
        let signature = account.eddsa_signature(&message, signatures)?.to_bytes();

        let mut transaction = Vec::new();
        write_compact_u16(&mut transaction, 1);
        transaction.extend_from_slice(&signature);
        transaction.extend_from_slice(&message);
        let transaction_hash = bs58::encode(signature).into_string();
        tracing::debug!("Assembled Solana transaction {transaction_hash}");
        Ok(SignedTransactionResult {
            raw_transaction: bs58::encode(transaction).into_string(),
            transaction_hash,
        })
    }
}
