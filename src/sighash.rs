//! Signature hash computation
//!
//! Two algorithms:
//! - legacy: the original serialization of a modified transaction copy
//! - FORKID: BIP143-style preimage with separate hashes of prevouts, sequences
//!   and outputs, committing to the spent amount and, with CashTokens, the
//!   spent token data and optionally every spent output (SIGHASH_UTXOS)
//!
//! Both finish with double SHA-256.

use crate::codec::{ByteWriter, Encodable};
use crate::context::ScriptExecutionContext;
use crate::error::ScriptError;
use crate::flags::ScriptFlags;
use crate::hashing::double_sha256;
use crate::script::Script;
use crate::token::PREFIX_TOKEN;
use crate::types::{Hash, Output, Transaction};

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_UTXOS: u32 = 0x20;
pub const SIGHASH_FORKID: u32 = 0x40;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

const BASE_TYPE_MASK: u32 = 0x1f;

/// Digest signed by the legacy algorithm when the input or SINGLE output is missing.
pub const SIGHASH_ONE: Hash = {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
};

/// Output-commitment mode selected by the low bits of a hash type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseSigHash {
    All,
    None,
    Single,
    /// Not one of the three defined modes; the legacy algorithm treats it as ALL
    Unsupported(u32),
}

/// 32-bit hash type: the signature's trailing byte, plus the fork value in
/// bits 8.. when FORKID is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigHashType(u32);

impl SigHashType {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Hash type carried in the last byte of a transaction signature.
    pub fn from_signature(signature: &[u8]) -> Option<Self> {
        signature.last().map(|b| Self(u32::from(*b)))
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn with_fork_value(self, fork_value: u32) -> Self {
        Self((fork_value << 8) | (self.0 & 0xff))
    }

    pub fn fork_value(self) -> u32 {
        self.0 >> 8
    }

    pub fn base_type(self) -> BaseSigHash {
        match self.0 & BASE_TYPE_MASK {
            SIGHASH_ALL => BaseSigHash::All,
            SIGHASH_NONE => BaseSigHash::None,
            SIGHASH_SINGLE => BaseSigHash::Single,
            other => BaseSigHash::Unsupported(other),
        }
    }

    pub fn has_forkid(self) -> bool {
        self.0 & SIGHASH_FORKID != 0
    }

    pub fn has_anyone_can_pay(self) -> bool {
        self.0 & SIGHASH_ANYONECANPAY != 0
    }

    pub fn has_utxos(self) -> bool {
        self.0 & SIGHASH_UTXOS != 0
    }

    /// Base type is ALL, NONE or SINGLE once the modifier bits are removed.
    pub fn is_defined(self) -> bool {
        let base = self.0 & 0xff & !(SIGHASH_FORKID | SIGHASH_ANYONECANPAY | SIGHASH_UTXOS);
        (SIGHASH_ALL..=SIGHASH_SINGLE).contains(&base)
    }
}

/// compute_sighash: 𝒯𝒳 × ℕ × 𝕊 × 𝒯 × ℕ → ℍ
///
/// Digest a signature over input `ctx.input_index()` commits to, for
/// `script_code` (the executing script from the last OP_CODESEPARATOR).
/// The FORKID algorithm is used when both the flag and the hash type say so.
pub fn compute_sighash(
    ctx: &ScriptExecutionContext<'_>,
    script_code: &Script,
    hash_type: SigHashType,
    flags: ScriptFlags,
) -> Result<Hash, ScriptError> {
    if hash_type.has_forkid() && flags.contains(ScriptFlags::SIGHASH_FORKID) {
        forkid_sighash(ctx, script_code, hash_type, flags)
    } else {
        Ok(legacy_sighash(ctx.tx(), ctx.input_index(), script_code, hash_type))
    }
}

/// Legacy digest of a transaction copy.
///
/// Keeps the historical quirk: an out-of-range input, or SINGLE without a
/// matching output, signs [`SIGHASH_ONE`].
pub fn legacy_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    hash_type: SigHashType,
) -> Hash {
    let base = hash_type.base_type();
    if input_index >= tx.inputs.len() {
        return SIGHASH_ONE;
    }
    if base == BaseSigHash::Single && input_index >= tx.outputs.len() {
        return SIGHASH_ONE;
    }

    let anyone_can_pay = hash_type.has_anyone_can_pay();
    let blank_sequences = matches!(base, BaseSigHash::None | BaseSigHash::Single);
    let script_code = script_code.without_codeseparators();

    let mut w = ByteWriter::with_capacity(tx.serialized_size() + script_code.len() + 4);
    w.write_u32_le(tx.version);

    let signed_inputs: Vec<usize> = if anyone_can_pay {
        vec![input_index]
    } else {
        (0..tx.inputs.len()).collect()
    };
    w.write_varint(signed_inputs.len() as u64);
    for i in signed_inputs {
        let input = &tx.inputs[i];
        input.prevout.encode(&mut w);
        if i == input_index {
            script_code.encode(&mut w);
        } else {
            w.write_varint(0);
        }
        if i != input_index && blank_sequences {
            w.write_u32_le(0);
        } else {
            w.write_u32_le(input.sequence);
        }
    }

    match base {
        BaseSigHash::None => w.write_varint(0),
        BaseSigHash::Single => {
            w.write_varint(input_index as u64 + 1);
            for _ in 0..input_index {
                // Null output: value -1, empty script
                w.write_i64_le(-1);
                w.write_varint(0);
            }
            tx.outputs[input_index].encode(&mut w);
        }
        BaseSigHash::All | BaseSigHash::Unsupported(_) => {
            w.write_varint(tx.outputs.len() as u64);
            for output in &tx.outputs {
                output.encode(&mut w);
            }
        }
    }

    w.write_u32_le(tx.lock_time);
    w.write_u32_le(hash_type.raw());
    double_sha256(w.as_bytes())
}

pub fn hash_prevouts(tx: &Transaction) -> Hash {
    let mut w = ByteWriter::with_capacity(tx.inputs.len() * 36);
    for input in &tx.inputs {
        input.prevout.encode(&mut w);
    }
    double_sha256(w.as_bytes())
}

pub fn hash_sequence(tx: &Transaction) -> Hash {
    let mut w = ByteWriter::with_capacity(tx.inputs.len() * 4);
    for input in &tx.inputs {
        w.write_u32_le(input.sequence);
    }
    double_sha256(w.as_bytes())
}

pub fn hash_outputs(outputs: &[Output]) -> Hash {
    let mut w = ByteWriter::new();
    for output in outputs {
        output.encode(&mut w);
    }
    double_sha256(w.as_bytes())
}

fn forkid_sighash(
    ctx: &ScriptExecutionContext<'_>,
    script_code: &Script,
    hash_type: SigHashType,
    flags: ScriptFlags,
) -> Result<Hash, ScriptError> {
    let tx = ctx.tx();
    let input_index = ctx.input_index();
    let input = tx
        .inputs
        .get(input_index)
        .ok_or(ScriptError::InvalidTxInputIndex)?;
    let base = hash_type.base_type();
    let anyone_can_pay = hash_type.has_anyone_can_pay();
    let single_or_none = matches!(base, BaseSigHash::Single | BaseSigHash::None);
    let tokens = flags.contains(ScriptFlags::TOKENS);

    let zero = [0u8; 32];
    let prevouts = if anyone_can_pay { zero } else { hash_prevouts(tx) };
    let sequences = if anyone_can_pay || single_or_none {
        zero
    } else {
        hash_sequence(tx)
    };
    let outputs = match base {
        BaseSigHash::Single => match tx.outputs.get(input_index) {
            Some(output) => hash_outputs(std::slice::from_ref(output)),
            None => zero,
        },
        BaseSigHash::None => zero,
        BaseSigHash::All | BaseSigHash::Unsupported(_) => hash_outputs(&tx.outputs),
    };

    let mut w = ByteWriter::with_capacity(180 + script_code.len());
    w.write_u32_le(tx.version);
    w.write_bytes(&prevouts);
    if hash_type.has_utxos() {
        if !tokens || anyone_can_pay {
            return Err(ScriptError::SigHashType);
        }
        let spent = ctx.spent_outputs().ok_or(ScriptError::ContextUnavailable)?;
        w.write_bytes(&hash_outputs(spent));
    }
    w.write_bytes(&sequences);
    input.prevout.encode(&mut w);
    if tokens {
        if let Some(token) = ctx.spent_output().token() {
            w.write_u8(PREFIX_TOKEN);
            token.encode(&mut w);
        }
    }
    script_code.encode(&mut w);
    w.write_u64_le(ctx.spent_output().value());
    w.write_u32_le(input.sequence);
    w.write_bytes(&outputs);
    w.write_u32_le(tx.lock_time);
    w.write_u32_le(hash_type.raw());
    Ok(double_sha256(w.as_bytes()))
}
