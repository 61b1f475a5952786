//! Context-free and spent-output transaction checks

use crate::constants::*;
use crate::error::{ConsensusError, Result};
use crate::token::PREFIX_TOKEN;
use crate::types::*;
use std::collections::HashSet;

/// CheckTransaction: 𝒯𝒳 → {valid, invalid}
///
/// A transaction tx = (v, ins, outs, lt) is valid if and only if:
/// 1. |ins| > 0 ∧ |outs| > 0
/// 2. M_min_tx ≤ |tx| ≤ M_max_tx
/// 3. ∀o ∈ outs: o.value ≤ M_max ∧ Σ o.value ≤ M_max
/// 4. No two inputs spend the same outpoint
/// 5. Coinbase: 2 ≤ |ins[0].script| ≤ 100; otherwise no input spends the null outpoint
/// 6. ∀o ∈ outs with a token: token is well formed (amount > 0, |commitment| ≤ 40)
/// 7. ∀o ∈ outs without a token: o.script[0] ≠ PREFIX_TOKEN
pub fn check_transaction(tx: &Transaction) -> Result<ValidationResult> {
    // 1. Check inputs and outputs are not empty
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Ok(ValidationResult::Invalid("Empty inputs or outputs".to_string()));
    }

    // 2. Check serialized size bounds
    let tx_size = crate::codec::Encodable::serialized_size(tx);
    if tx_size > MAX_TX_SIZE {
        return Ok(ValidationResult::Invalid(format!(
            "Transaction too large: {} bytes",
            tx_size
        )));
    }
    if tx_size < MIN_TX_SIZE {
        return Ok(ValidationResult::Invalid(format!(
            "Transaction too small: {} bytes",
            tx_size
        )));
    }

    // 3. Check output values
    let mut total_output_value = 0u64;
    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value() > MAX_MONEY {
            return Ok(ValidationResult::Invalid(format!(
                "Invalid output value {} at index {}",
                output.value(),
                i
            )));
        }
        total_output_value += output.value();
        if total_output_value > MAX_MONEY {
            return Ok(ValidationResult::Invalid(
                "Total output value out of range".to_string(),
            ));
        }

        match output.token() {
            // 6. Token payload
            Some(token) => {
                if let Err(e) = token.validate() {
                    return Ok(ValidationResult::Invalid(format!(
                        "Invalid token at output {}: {}",
                        i, e
                    )));
                }
            }
            // 7. A plain script must not look like a token prefix
            None => {
                if output.script().as_bytes().first() == Some(&PREFIX_TOKEN) {
                    return Ok(ValidationResult::Invalid(format!(
                        "Output {} script starts with the token prefix",
                        i
                    )));
                }
            }
        }
    }

    // 4. Check for duplicate inputs
    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.prevout) {
            return Ok(ValidationResult::Invalid("Duplicate input".to_string()));
        }
    }

    // 5. Coinbase script size, or no null prevouts
    if tx.is_coinbase() {
        let script_len = tx.inputs[0].script.len();
        if !(MIN_COINBASE_SCRIPT_SIZE..=MAX_COINBASE_SCRIPT_SIZE).contains(&script_len) {
            return Ok(ValidationResult::Invalid(format!(
                "Coinbase script size {} out of range",
                script_len
            )));
        }
    } else if let Some(i) = tx.inputs.iter().position(|input| input.prevout.is_null()) {
        return Ok(ValidationResult::Invalid(format!(
            "Input {} spends the null outpoint",
            i
        )));
    }

    Ok(ValidationResult::Valid)
}

/// CheckTxInputs: 𝒯𝒳 × 𝒯* → {valid, invalid} × ℕ
///
/// For transaction tx spending outputs us (one per input, in order):
/// 1. If tx is coinbase: return (valid, 0)
/// 2. Let total_in = Σᵢ us[i].value, each and the sum within M_max
/// 3. Let total_out = Σₒ o.value, within M_max
/// 4. If total_in < total_out: return (invalid, 0)
/// 5. Return (valid, total_in - total_out)
pub fn check_tx_inputs(
    tx: &Transaction,
    spent_outputs: &[Output],
) -> Result<(ValidationResult, u64)> {
    if tx.is_coinbase() {
        return Ok((ValidationResult::Valid, 0));
    }

    if spent_outputs.len() != tx.inputs.len() {
        return Err(ConsensusError::TransactionValidation(format!(
            "{} spent outputs supplied for {} inputs",
            spent_outputs.len(),
            tx.inputs.len()
        )));
    }

    let mut total_input_value = 0u64;
    for (i, utxo) in spent_outputs.iter().enumerate() {
        if !utxo.is_valid() {
            return Ok((
                ValidationResult::Invalid(format!("Input {} spends a missing output", i)),
                0,
            ));
        }
        total_input_value = match total_input_value.checked_add(utxo.value()) {
            Some(total) if utxo.value() <= MAX_MONEY && total <= MAX_MONEY => total,
            _ => {
                return Ok((
                    ValidationResult::Invalid("Input value out of range".to_string()),
                    0,
                ))
            }
        };
    }

    let total_output_value = tx
        .outputs
        .iter()
        .try_fold(0u64, |total, output| {
            total
                .checked_add(output.value())
                .filter(|&sum| output.value() <= MAX_MONEY && sum <= MAX_MONEY)
        });
    let total_output_value = match total_output_value {
        Some(total) => total,
        None => {
            return Ok((
                ValidationResult::Invalid("Total output value out of range".to_string()),
                0,
            ))
        }
    };

    if total_input_value < total_output_value {
        return Ok((
            ValidationResult::Invalid("Insufficient input value".to_string()),
            0,
        ));
    }

    let fee = total_input_value - total_output_value;
    Ok((ValidationResult::Valid, fee))
}
