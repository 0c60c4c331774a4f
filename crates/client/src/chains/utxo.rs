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

//! Bitcoin style transactions: one signature per spent input
use bitcoin::{
    absolute::LockTime,
    consensus,
    hashes::{sha256d, Hash},
    script::{Builder, PushBytesBuf},
    sighash::{EcdsaSighashType, SighashCache},
    transaction::Version,
    Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use keysign_protocol::SignatureTable;
use keysign_shared::{
    constants::MAX_OP_RETURN_SIZE, BlockChainSpecific, Chain, KeysignPayload,
    SignedTransactionResult,
};

use super::{
    address::{own_script_pubkey, utxo_script_pubkey},
    amount_u64, memo, Account, TransactionBuilder,
};
use crate::errors::ChainError;

const SIGHASH_FORKID: u32 = 0x40;

/// How inputs are signed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SighashScheme {
    /// BIP-143, spending native segwit outputs
    Segwit,
    /// BIP-143 digest with the fork id flag, legacy serialization
    ForkId,
    /// Original transaction digest, legacy serialization
    Legacy,
}

impl SighashScheme {
    pub fn for_chain(chain: Chain) -> Self {
        match chain {
            Chain::Bitcoin | Chain::Litecoin => SighashScheme::Segwit,
            Chain::BitcoinCash => SighashScheme::ForkId,
            _ => SighashScheme::Legacy,
        }
    }

    fn sighash_type(&self) -> u32 {
        match self {
            SighashScheme::ForkId => EcdsaSighashType::All.to_u32() | SIGHASH_FORKID,
            _ => EcdsaSighashType::All.to_u32(),
        }
    }
}

/// A transaction with every input and output decided, awaiting signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub scheme: SighashScheme,
    pub transaction: Transaction,
    /// Value of each spent output, in input order
    pub spent_amounts: Vec<Amount>,
    /// Script of the outputs being spent
    pub own_script: ScriptBuf,
    pub fee: u64,
}

impl UnsignedTransaction {
    /// Choose inputs and outputs for a payload.
    ///
    /// Every listed UTXO is spent, in order. Outputs are the destination, then change unless it
    /// would be dust, then the memo as an `OP_RETURN`.
    pub fn plan(account: &Account, payload: &KeysignPayload) -> Result<Self, ChainError> {
        let chain = account.chain;
        let BlockChainSpecific::Utxo { byte_fee, send_max_amount } = payload.chain_specific else {
            return Err(ChainError::InvalidPayload(format!("{chain} needs UTXO parameters")));
        };
        if payload.utxos.is_empty() {
            return Err(ChainError::InvalidPayload("no UTXOs to spend".to_string()));
        }

        let own_script = own_script_pubkey(chain, &account.public_key());
        if utxo_script_pubkey(chain, &payload.coin.address)? != own_script {
            return Err(ChainError::InvalidAddress { chain, address: payload.coin.address.clone() });
        }

        let input = payload
            .utxos
            .iter()
            .map(|utxo| {
                let txid = utxo
                    .hash
                    .parse::<Txid>()
                    .map_err(|_| ChainError::InvalidPayload(format!("UTXO hash {}", utxo.hash)))?;
                Ok(TxIn {
                    previous_output: OutPoint { txid, vout: utxo.index },
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::default(),
                })
            })
            .collect::<Result<Vec<_>, ChainError>>()?;
        let spent_amounts =
            payload.utxos.iter().map(|utxo| Amount::from_sat(utxo.amount)).collect::<Vec<_>>();
        let available = payload
            .utxos
            .iter()
            .try_fold(0u64, |sum, utxo| sum.checked_add(utxo.amount))
            .ok_or_else(|| {
                ChainError::AmountOverflow(payload.utxos.iter().map(|u| u128::from(u.amount)).sum())
            })?;

        let mut destination = TxOut {
            value: Amount::ZERO,
            script_pubkey: utxo_script_pubkey(chain, &payload.to_address)?,
        };
        let op_return = memo(payload).map(op_return_output).transpose()?;
        let scheme = SighashScheme::for_chain(chain);
        let dust = chain.dust_limit().unwrap_or(0);
        let fee_for = |outputs: &[&TxOut]| {
            let size = estimate_size(scheme, input.len(), outputs);
            byte_fee
                .checked_mul(size)
                .ok_or(ChainError::AmountOverflow(u128::from(byte_fee) * u128::from(size)))
        };

        let mut change = TxOut { value: Amount::ZERO, script_pubkey: own_script.clone() };
        let (mut output, fee) = if send_max_amount {
            let fee = fee_for(&with_memo(&[&destination], op_return.as_ref()))?;
            let value = available.checked_sub(fee).filter(|value| *value >= dust).ok_or(
                ChainError::InsufficientFunds { needed: fee.saturating_add(dust), available },
            )?;
            destination.value = Amount::from_sat(value);
            (vec![destination], fee)
        } else {
            let value = amount_u64(payload.to_amount)?;
            destination.value = Amount::from_sat(value);
            let fee = fee_for(&with_memo(&[&destination, &change], op_return.as_ref()))?;
            match value.checked_add(fee).and_then(|needed| available.checked_sub(needed)) {
                Some(remainder) if remainder >= dust => {
                    change.value = Amount::from_sat(remainder);
                    (vec![destination, change], fee)
                },
                _ => {
                    // Dust change is left to the miner
                    let fee = fee_for(&with_memo(&[&destination], op_return.as_ref()))?;
                    let insufficient = ChainError::InsufficientFunds {
                        needed: value.saturating_add(fee),
                        available,
                    };
                    let needed = value.checked_add(fee).ok_or(insufficient)?;
                    if available < needed {
                        return Err(ChainError::InsufficientFunds { needed, available });
                    }
                    (vec![destination], available - value)
                },
            }
        };
        output.extend(op_return);

        let transaction =
            Transaction { version: Version::ONE, lock_time: LockTime::ZERO, input, output };
        Ok(Self { scheme, transaction, spent_amounts, own_script, fee })
    }

    /// One digest per input, in input order
    pub fn sighashes(&self) -> Result<Vec<[u8; 32]>, ChainError> {
        let mut cache = SighashCache::new(&self.transaction);
        (0..self.transaction.input.len())
            .map(|index| self.sighash(&mut cache, index))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ChainError::InvalidPayload)
    }

    fn sighash(
        &self,
        cache: &mut SighashCache<&Transaction>,
        index: usize,
    ) -> Result<[u8; 32], String> {
        let amount = self.spent_amounts[index];
        match self.scheme {
            SighashScheme::Segwit => cache
                .p2wpkh_signature_hash(index, &self.own_script, amount, EcdsaSighashType::All)
                .map(|sighash| sighash.to_byte_array())
                .map_err(|e| e.to_string()),
            SighashScheme::Legacy => cache
                .legacy_signature_hash(index, &self.own_script, self.scheme.sighash_type())
                .map(|sighash| sighash.to_byte_array())
                .map_err(|e| e.to_string()),
            SighashScheme::ForkId => {
                // The BIP-143 preimage, committing to the fork id flag in its trailing type
                let mut preimage = Vec::new();
                cache
                    .segwit_v0_encode_signing_data_to(
                        &mut preimage,
                        index,
                        &self.own_script,
                        amount,
                        EcdsaSighashType::All,
                    )
                    .map_err(|e| e.to_string())?;
                let type_offset = preimage.len() - 4;
                preimage[type_offset..].copy_from_slice(&self.scheme.sighash_type().to_le_bytes());
                Ok(sha256d::Hash::hash(&preimage).to_byte_array())
            },
        }
    }
}

/// Builder for Bitcoin, Bitcoin Cash, Litecoin, Dogecoin and Dash
pub struct UtxoBuilder;

impl TransactionBuilder for UtxoBuilder {
    fn pre_signed_image_hashes(
        &self,
        account: &Account,
        payload: &KeysignPayload,
    ) -> Result<Vec<String>, ChainError> {
        let transaction = UnsignedTransaction::plan(account, payload)?;
        Ok(transaction.sighashes()?.iter().map(hex::encode).collect())
    }

    fn assemble_signed(
        &self,
        account: &Account,
        payload: &KeysignPayload,
        signatures: &SignatureTable,
    ) -> Result<SignedTransactionResult, ChainError> {
        let unsigned = UnsignedTransaction::plan(account, payload)?;
        let sighashes = unsigned.sighashes()?;
        let scheme = unsigned.scheme;
        let mut transaction = unsigned.transaction;
        let public_key = account.public_key();

        for (input, sighash) in transaction.input.iter_mut().zip(sighashes) {
            let (signature, _) = account.ecdsa_signature(&sighash, signatures)?;
            let mut der = signature.to_der().as_bytes().to_vec();
            der.push(scheme.sighash_type() as u8);
            match scheme {
                SighashScheme::Segwit => input.witness = Witness::from_slice(&[&der, &public_key]),
                _ => {
                    input.script_sig = Builder::new()
                        .push_slice(push_bytes(der)?)
                        .push_slice(push_bytes(public_key.clone())?)
                        .into_script()
                },
            }
        }

        let raw = consensus::serialize(&transaction);
        let transaction_hash = transaction.compute_txid().to_string();
        tracing::debug!("Assembled {} transaction {transaction_hash}", account.chain);
        Ok(SignedTransactionResult { raw_transaction: hex::encode(raw), transaction_hash })
    }
}

/// Virtual size estimate for fee calculation
fn estimate_size(scheme: SighashScheme, inputs: usize, outputs: &[&TxOut]) -> u64 {
    let outputs =
        outputs.iter().map(|output| 9 + output.script_pubkey.len() as u64).sum::<u64>();
    match scheme {
        SighashScheme::Segwit => 11 + 68 * inputs as u64 + outputs,
        _ => 10 + 148 * inputs as u64 + outputs,
    }
}

fn with_memo<'a>(outputs: &[&'a TxOut], op_return: Option<&'a TxOut>) -> Vec<&'a TxOut> {
    outputs.iter().copied().chain(op_return).collect()
}

fn op_return_output(memo: &str) -> Result<TxOut, ChainError> {
    if memo.len() > MAX_OP_RETURN_SIZE {
        return Err(ChainError::MemoTooLong(memo.len()));
    }
    let script_pubkey = ScriptBuf::new_op_return(push_bytes(memo.as_bytes().to_vec())?);
    Ok(TxOut { value: Amount::ZERO, script_pubkey })
}

fn push_bytes(data: Vec<u8>) -> Result<PushBytesBuf, ChainError> {
    PushBytesBuf::try_from(data).map_err(|e| ChainError::InvalidPayload(e.to_string()))
}
