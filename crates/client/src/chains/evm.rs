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

//! EIP-1559 transactions for EVM chains: native transfers, ERC-20 transfers and approvals
use ethers_core::{
    abi::{encode, Token},
    types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, Eip1559TransactionRequest,
        Signature, U256,
    },
    utils::{id, public_key_to_address},
};
use keysign_protocol::{derivation::SignerPublicKey, SignatureTable};
use keysign_shared::{BlockChainSpecific, Chain, KeysignPayload, SignedTransactionResult};

use super::{Account, TransactionBuilder};
use crate::{errors::ChainError, util::Hasher};

/// A contract call or value transfer, before fees and nonce are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmCall {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl EvmCall {
    /// Call `signature` on `contract` with ABI encoded `args`
    pub fn contract(contract: Address, signature: &str, args: &[Token]) -> Self {
        let mut data = id(signature).to_vec();
        data.extend(encode(args));
        Self { to: contract, value: U256::zero(), data: data.into() }
    }
}

pub fn parse_address(chain: Chain, address: &str) -> Result<Address, ChainError> {
    let invalid = || ChainError::InvalidAddress { chain, address: address.to_string() };
    let bytes = hex::decode(address.strip_prefix("0x").unwrap_or(address)).map_err(|_| invalid())?;
    if bytes.len() != 20 {
        return Err(invalid());
    }
    Ok(Address::from_slice(&bytes))
}

/// The transfer a plain payload describes
pub fn transfer_call(payload: &KeysignPayload) -> Result<EvmCall, ChainError> {
    let chain = payload.coin.chain;
    let to = parse_address(chain, &payload.to_address)?;
    let amount = U256::from(payload.to_amount);
    if payload.coin.is_native_token {
        let data = payload.memo.as_deref().map(|memo| memo.as_bytes().to_vec()).unwrap_or_default();
        return Ok(EvmCall { to, value: amount, data: data.into() });
    }
    let contract = parse_address(chain, &payload.coin.contract_address)?;
    Ok(EvmCall::contract(
        contract,
        "transfer(address,uint256)",
        &[Token::Address(to), Token::Uint(amount)],
    ))
}

/// The allowance a payload grants ahead of a token swap
pub fn approve_call(payload: &KeysignPayload) -> Result<EvmCall, ChainError> {
    let chain = payload.coin.chain;
    let approve = payload
        .approve_payload
        .as_ref()
        .ok_or_else(|| ChainError::InvalidPayload("no approve payload".to_string()))?;
    let contract = parse_address(chain, &payload.coin.contract_address)?;
    Ok(EvmCall::contract(
        contract,
        "approve(address,uint256)",
        &[
            Token::Address(parse_address(chain, &approve.spender)?),
            Token::Uint(U256::from(approve.amount)),
        ],
    ))
}

/// Wrap a call into a typed transaction for the payload's account.
///
/// The approval of a payload takes its nonce, the main transaction the next one.
pub fn typed_transaction(
    account: &Account,
    payload: &KeysignPayload,
    call: EvmCall,
    is_approval: bool,
) -> Result<TypedTransaction, ChainError> {
    let chain = account.chain;
    let BlockChainSpecific::Ethereum { max_fee_per_gas_wei, priority_fee_wei, nonce, gas_limit } =
        payload.chain_specific
    else {
        return Err(ChainError::InvalidPayload(format!("{chain} needs EVM parameters")));
    };
    let chain_id = chain
        .evm_chain_id()
        .ok_or_else(|| ChainError::InvalidPayload(format!("{chain} is not an EVM chain")))?;

    let SignerPublicKey::Ecdsa(key) = &account.signer else {
        return Err(ChainError::InvalidPayload(format!("{chain} does not sign with ECDSA")));
    };
    let from = public_key_to_address(key);
    if parse_address(chain, &payload.coin.address)? != from {
        return Err(ChainError::InvalidAddress { chain, address: payload.coin.address.clone() });
    }

    let nonce = match (is_approval, payload.approve_payload.is_some()) {
        (false, true) => nonce + 1,
        _ => nonce,
    };
    let request = Eip1559TransactionRequest::new()
        .from(from)
        .to(call.to)
        .value(call.value)
        .data(call.data)
        .nonce(nonce)
        .gas(gas_limit)
        .max_fee_per_gas(max_fee_per_gas_wei)
        .max_priority_fee_per_gas(priority_fee_wei)
        .chain_id(chain_id);
    Ok(TypedTransaction::Eip1559(request))
}

/// Digest of a typed transaction, hex
pub fn sighash(transaction: &TypedTransaction) -> String {
    hex::encode(transaction.sighash().as_bytes())
}

/// Attach the vault's signature to a typed transaction
pub fn assemble(
    account: &Account,
    transaction: &TypedTransaction,
    signatures: &SignatureTable,
) -> Result<SignedTransactionResult, ChainError> {
    let digest = transaction.sighash();
    let (signature, recovery_id) = account.ecdsa_signature(digest.as_bytes(), signatures)?;
    let signature = Signature {
        r: U256::from_big_endian(&signature.r().to_bytes()),
        s: U256::from_big_endian(&signature.s().to_bytes()),
        v: recovery_id.to_byte().into(),
    };
    let raw = transaction.rlp_signed(&signature);
    let transaction_hash = format!("0x{}", hex::encode(Hasher::keccak(&raw)));
    tracing::debug!("Assembled {} transaction {transaction_hash}", account.chain);
    Ok(SignedTransactionResult { raw_transaction: hex::encode(raw), transaction_hash })
}

/// Native and ERC-20 transfers
pub struct EvmBuilder;

impl TransactionBuilder for EvmBuilder {
    fn pre_signed_image_hashes(
        &self,
        account: &Account,
        payload: &KeysignPayload,
    ) -> Result<Vec<String>, ChainError> {
        let transaction = typed_transaction(account, payload, transfer_call(payload)?, false)?;
        Ok(vec![sighash(&transaction)])
    }

    fn assemble_signed(
        &self,
        account: &Account,
        payload: &KeysignPayload,
        signatures: &SignatureTable,
    ) -> Result<SignedTransactionResult, ChainError> {
        let transaction = typed_transaction(account, payload, transfer_call(payload)?, false)?;
        assemble(account, &transaction, signatures)
    }
}

/// The ERC-20 approval sent ahead of a token swap
pub struct ApproveBuilder;

impl TransactionBuilder for ApproveBuilder {
    fn pre_signed_image_hashes(
        &self,
        account: &Account,
        payload: &KeysignPayload,
    ) -> Result<Vec<String>, ChainError> {
        let transaction = typed_transaction(account, payload, approve_call(payload)?, true)?;
        Ok(vec![sighash(&transaction)])
    }

    fn assemble_signed(
        &self,
        account: &Account,
        payload: &KeysignPayload,
        signatures: &SignatureTable,
    ) -> Result<SignedTransactionResult, ChainError> {
        let transaction = typed_transaction(account, payload, approve_call(payload)?, true)?;
        assemble(account, &transaction, signatures)
    }
}
