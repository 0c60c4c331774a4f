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

//! THORChain swaps.
//!
//! A swap is a transfer on the source chain to THORChain's inbound vault, carrying the swap
//! instruction as a memo. The payload is rewritten into that transfer and handed to the source
//! chain's builder, except on THORChain itself (a `MsgDeposit`) and EVM chains (a router call).
use ethers_core::{
    abi::Token,
    types::{Address, U256},
};
use keysign_protocol::SignatureTable;
use keysign_shared::{
    constants::{THORCHAIN_AFFILIATE, THORCHAIN_AFFILIATE_FEE_BPS},
    Chain, ChainFamily, Coin, KeysignPayload, SignedTransactionResult, ThorChainSwapPayload,
};

use super::{
    amount_u64,
    cosmos::{
        self,
        proto::{Any, MsgDeposit, ThorchainAsset, ThorchainCoin, THORCHAIN_MSG_DEPOSIT_TYPE_URL},
    },
    evm::{self, EvmCall},
    family_builder, Account, TransactionBuilder,
};
use crate::errors::ChainError;

/// THORChain asset notation of a coin, `CHAIN.TICKER` or `CHAIN.TICKER-CONTRACT` for tokens
pub fn asset_name(coin: &Coin) -> Result<String, ChainError> {
    let chain = coin.chain.swap_asset_chain().ok_or(ChainError::UnsupportedSwap(coin.chain))?;
    if coin.is_native_token {
        Ok(format!("{chain}.{}", coin.ticker))
    } else {
        Ok(format!("{chain}.{}-{}", coin.ticker, coin.contract_address.to_uppercase()))
    }
}

/// The swap instruction THORChain reads from the inbound transfer
pub fn swap_memo(swap: &ThorChainSwapPayload) -> Result<String, ChainError> {
    let mut memo = format!(
        "=:{}:{}:{}/{}/{}",
        asset_name(&swap.to_coin)?,
        swap.to_coin.address,
        swap.to_amount_limit,
        swap.streaming_interval,
        swap.streaming_quantity,
    );
    if swap.is_affiliate {
        memo.push_str(&format!(":{THORCHAIN_AFFILIATE}:{THORCHAIN_AFFILIATE_FEE_BPS}"));
    }
    Ok(memo)
}

/// Whether THORChain swaps can start from this chain
pub fn is_swap_source(chain: Chain) -> bool {
    !matches!(chain, Chain::Solana | Chain::Dash | Chain::Kujira | Chain::MayaChain)
        && chain.swap_asset_chain().is_some()
}

fn swap_payload(payload: &KeysignPayload) -> Result<&ThorChainSwapPayload, ChainError> {
    let swap = payload
        .swap_payload
        .as_ref()
        .ok_or_else(|| ChainError::InvalidPayload("no swap payload".to_string()))?;
    if swap.from_coin.chain != payload.coin.chain {
        return Err(ChainError::InvalidPayload(format!(
            "swap from {} signed on {}",
            swap.from_coin.chain, payload.coin.chain
        )));
    }
    if !is_swap_source(payload.coin.chain) {
        return Err(ChainError::UnsupportedSwap(payload.coin.chain));
    }
    Ok(swap)
}

/// The plain transfer to the inbound vault a UTXO or Cosmos Hub swap becomes
pub fn inbound_transfer(payload: &KeysignPayload) -> Result<KeysignPayload, ChainError> {
    let swap = swap_payload(payload)?;
    Ok(KeysignPayload {
        to_address: swap.vault_address.clone(),
        to_amount: swap.from_amount,
        memo: Some(swap_memo(swap)?),
        swap_payload: None,
        approve_payload: None,
        ..payload.clone()
    })
}

/// `depositWithExpiry` on the THORChain router
pub fn router_deposit(chain: Chain, swap: &ThorChainSwapPayload) -> Result<EvmCall, ChainError> {
    let router = swap
        .router_address
        .as_deref()
        .ok_or_else(|| ChainError::InvalidPayload("EVM swaps need a router".to_string()))?;
    let (asset, value) = if swap.from_coin.is_native_token {
        (Address::zero(), U256::from(swap.from_amount))
    } else {
        (evm::parse_address(chain, &swap.from_coin.contract_address)?, U256::zero())
    };
    let mut call = EvmCall::contract(
        evm::parse_address(chain, router)?,
        "depositWithExpiry(address,address,uint256,string,uint256)",
        &[
            Token::Address(evm::parse_address(chain, &swap.vault_address)?),
            Token::Address(asset),
            Token::Uint(U256::from(swap.from_amount)),
            Token::String(swap_memo(swap)?),
            Token::Uint(U256::from(swap.expiration_time)),
        ],
    );
    call.value = value;
    Ok(call)
}

fn deposit_transaction(
    account: &Account,
    payload: &KeysignPayload,
    swap: &ThorChainSwapPayload,
) -> Result<cosmos::UnsignedTransaction, ChainError> {
    let deposit = MsgDeposit {
        coins: vec![ThorchainCoin {
            asset: Some(ThorchainAsset {
                chain: "THOR".to_string(),
                symbol: "RUNE".to_string(),
                ticker: "RUNE".to_string(),
                synth: false,
            }),
            amount: amount_u64(swap.from_amount)?.to_string(),
            decimals: 0,
        }],
        memo: swap_memo(swap)?,
        signer: cosmos::source_account(account, payload)?,
    };
    let message = Any::pack(THORCHAIN_MSG_DEPOSIT_TYPE_URL, &deposit);
    cosmos::UnsignedTransaction::new(account, payload, vec![message], "")
}

/// Swaps through THORChain from any supported source chain
pub struct ThorchainSwapBuilder;

impl TransactionBuilder for ThorchainSwapBuilder {
    fn pre_signed_image_hashes(
        &self,
        account: &Account,
        payload: &KeysignPayload,
    ) -> Result<Vec<String>, ChainError> {
        let swap = swap_payload(payload)?;
        match account.chain.family() {
            ChainFamily::Evm => {
                let call = router_deposit(account.chain, swap)?;
                Ok(vec![evm::sighash(&evm::typed_transaction(account, payload, call, false)?)])
            },
            _ if account.chain == Chain::ThorChain => {
                Ok(vec![hex::encode(deposit_transaction(account, payload, swap)?.sighash())])
            },
            _ => family_builder(account.chain)
                .pre_signed_image_hashes(account, &inbound_transfer(payload)?),
        }
    }

    fn assemble_signed(
        &self,
        account: &Account,
        payload: &KeysignPayload,
        signatures: &SignatureTable,
    ) -> Result<SignedTransactionResult, ChainError> {
        let swap = swap_payload(payload)?;
        match account.chain.family() {
            ChainFamily::Evm => {
                let call = router_deposit(account.chain, swap)?;
                let transaction = evm::typed_transaction(account, payload, call, false)?;
                evm::assemble(account, &transaction, signatures)
            },
            _ if account.chain == Chain::ThorChain => {
                deposit_transaction(account, payload, swap)?.assemble(account, signatures)
            },
            _ => family_builder(account.chain).assemble_signed(
                account,
                &inbound_transfer(payload)?,
                signatures,
            ),
        }
    }
}
