//! Verification facade
//!
//! One input at a time: build the execution context, translate the public
//! verify flags, run the interpreter and collapse the terminal
//! [`ScriptError`] into a stable [`VerifyResult`] code.
//!
//! Every call allocates its own interpreter state and only borrows the
//! transaction, so inputs may be verified concurrently.

use crate::codec::Decodable;
use crate::config::ConsensusConfig;
use crate::context::ScriptExecutionContext;
use crate::error::ScriptError;
use crate::flags::ScriptFlags;
use crate::hashing::display_hash;
use crate::interpreter::{ExecutionMetrics, Interpreter};
use crate::signature::{Secp256k1Verifier, SignatureVerifier};
use crate::types::{Output, Transaction};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Public outcome of verifying one input.
///
/// Codes are stable; several internal error kinds share one code.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerifyResult {
    Ok = 0,

    // Caller input
    TxInvalid,
    TxInputIndex,
    SpentOutputsMismatch,

    // Final state
    EvalFalse,
    OpReturn,

    // Limits
    ScriptSize,
    PushSize,
    OpCount,
    StackSize,
    SigCount,
    PubkeyCount,
    VmLimits,

    // Failed verify operations
    Verify,
    EqualVerify,
    CheckMultiSigVerify,
    CheckSigVerify,
    NumEqualVerify,

    // Opcodes and stack
    BadOpcode,
    DisabledOpcode,
    InvalidStackOperation,
    InvalidAltstackOperation,
    UnbalancedConditional,
    InvalidNumber,
    InvalidOperand,

    // Locktime
    NegativeLocktime,
    UnsatisfiedLocktime,

    // Signatures and keys
    SigHashType,
    SigDer,
    MinimalData,
    SigPushOnly,
    SigHighS,
    PubkeyType,
    CleanStack,
    SigNullFail,
    SigEncoding,
    ForkId,

    DiscourageUpgradableNops,
    SigChecks,
    Introspection,
    TokenEncoding,
    P2shRecursion,
}

impl VerifyResult {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_success(self) -> bool {
        self == VerifyResult::Ok
    }
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

impl From<ScriptError> for VerifyResult {
    fn from(err: ScriptError) -> Self {
        use ScriptError as E;
        match err {
            E::Exhausted => VerifyResult::TxInvalid,
            E::TokenEncodingInvalid => VerifyResult::TokenEncoding,

            E::EvalFalse => VerifyResult::EvalFalse,
            E::OpReturn => VerifyResult::OpReturn,

            E::ScriptSize => VerifyResult::ScriptSize,
            E::PushSize => VerifyResult::PushSize,
            E::OpCount => VerifyResult::OpCount,
            E::StackSize => VerifyResult::StackSize,
            E::SigCount => VerifyResult::SigCount,
            E::PubkeyCount => VerifyResult::PubkeyCount,
            E::ConditionalStackDepth | E::OpCost | E::HashIterations => VerifyResult::VmLimits,

            E::Verify => VerifyResult::Verify,
            E::EqualVerify => VerifyResult::EqualVerify,
            E::CheckMultiSigVerify => VerifyResult::CheckMultiSigVerify,
            E::CheckSigVerify | E::CheckDataSigVerify => VerifyResult::CheckSigVerify,
            E::NumEqualVerify => VerifyResult::NumEqualVerify,

            E::BadOpcode => VerifyResult::BadOpcode,
            E::DisabledOpcode => VerifyResult::DisabledOpcode,
            E::InvalidStackOperation => VerifyResult::InvalidStackOperation,
            E::InvalidAltstackOperation => VerifyResult::InvalidAltstackOperation,
            E::UnbalancedConditional => VerifyResult::UnbalancedConditional,

            E::InvalidNumberRange
            | E::MinimalNumber
            | E::ImpossibleEncoding
            | E::DivByZero
            | E::ModByZero => VerifyResult::InvalidNumber,
            E::InvalidOperandSize
            | E::InvalidSplitRange
            | E::InvalidBitfieldSize
            | E::InvalidBitRange
            | E::InvalidBitCount => VerifyResult::InvalidOperand,

            E::NegativeLocktime => VerifyResult::NegativeLocktime,
            E::UnsatisfiedLocktime => VerifyResult::UnsatisfiedLocktime,

            E::SigHashType => VerifyResult::SigHashType,
            E::SigDer => VerifyResult::SigDer,
            E::MinimalData => VerifyResult::MinimalData,
            E::SigPushOnly => VerifyResult::SigPushOnly,
            E::SigHighS => VerifyResult::SigHighS,
            E::PubkeyType => VerifyResult::PubkeyType,
            E::CleanStack => VerifyResult::CleanStack,
            E::SigNullFail => VerifyResult::SigNullFail,
            E::SigBadLength | E::SigNonSchnorr => VerifyResult::SigEncoding,
            E::MustUseForkId | E::IllegalForkId => VerifyResult::ForkId,

            E::DiscourageUpgradableNops => VerifyResult::DiscourageUpgradableNops,
            E::InputSigChecks => VerifyResult::SigChecks,
            E::InvalidTxInputIndex | E::InvalidTxOutputIndex | E::ContextUnavailable => {
                VerifyResult::Introspection
            }
            E::P2SHRecursion => VerifyResult::P2shRecursion,
        }
    }
}

/// Outputs spent by the transaction under verification.
#[derive(Debug, Clone, Copy)]
pub enum SpentOutputs<'a> {
    /// Only the output spent by the verified input
    Single(&'a Output),
    /// One output per input, in input order
    All(&'a [Output]),
}

impl<'a> SpentOutputs<'a> {
    fn context(
        self,
        tx: &'a Transaction,
        input_index: usize,
    ) -> Result<ScriptExecutionContext<'a>, ScriptError> {
        match self {
            SpentOutputs::Single(prevout) => ScriptExecutionContext::new(tx, input_index, prevout),
            SpentOutputs::All(outputs) => {
                ScriptExecutionContext::with_spent_outputs(tx, input_index, outputs)
            }
        }
    }
}

/// Run the unlocking, locking and redeem scripts of one input.
pub fn verify_script_with(
    tx: &Transaction,
    input_index: usize,
    spent: SpentOutputs<'_>,
    flags: u32,
    config: &ConsensusConfig,
    verifier: &dyn SignatureVerifier,
) -> Result<ExecutionMetrics, ScriptError> {
    let ctx = spent.context(tx, input_index)?;
    let script_flags = ScriptFlags::from_verify_flags_with(flags, config);
    let interpreter = Interpreter::new(script_flags, verifier)
        .with_context(ctx)
        .with_limits(config.limits.clone())
        .with_fork_id(config.fork_id);
    interpreter.verify_script(&ctx.input().script, ctx.spent_output().script())
}

/// Facade entry point shared by the free functions and `CashConsensus`.
pub(crate) fn verify_input(
    tx: &Transaction,
    input_index: usize,
    spent: SpentOutputs<'_>,
    flags: u32,
    config: &ConsensusConfig,
    verifier: &dyn SignatureVerifier,
) -> VerifyResult {
    if input_index >= tx.inputs.len() {
        debug!(
            "input index {} out of range for {} inputs",
            input_index,
            tx.inputs.len()
        );
        return VerifyResult::TxInputIndex;
    }
    if let SpentOutputs::All(outputs) = spent {
        if outputs.len() != tx.inputs.len() {
            debug!(
                "{} spent outputs supplied for {} inputs",
                outputs.len(),
                tx.inputs.len()
            );
            return VerifyResult::SpentOutputsMismatch;
        }
    }

    match verify_script_with(tx, input_index, spent, flags, config, verifier) {
        Ok(_) => VerifyResult::Ok,
        Err(err) => {
            debug!(
                "input {} of {} failed verification: {}",
                input_index,
                display_hash(&tx.txid()),
                err
            );
            VerifyResult::from(err)
        }
    }
}

/// Decode a transaction strictly, then verify one of its inputs.
pub(crate) fn verify_input_bytes(
    tx_bytes: &[u8],
    input_index: usize,
    prevout: &Output,
    flags: u32,
    config: &ConsensusConfig,
    verifier: &dyn SignatureVerifier,
) -> VerifyResult {
    match Transaction::from_bytes(tx_bytes, true) {
        Ok(tx) => verify_input(
            &tx,
            input_index,
            SpentOutputs::Single(prevout),
            flags,
            config,
            verifier,
        ),
        Err(err) => {
            debug!("transaction failed to decode: {}", err);
            VerifyResult::TxInvalid
        }
    }
}

/// Verify input `input_index` of `tx` spending `prevout` under `flags`.
///
/// # Examples
///
/// ```
/// use cash_consensus::script::Script;
/// use cash_consensus::types::{Input, OutPoint, Output, Transaction};
/// use cash_consensus::verify::{verify, VerifyResult};
///
/// let tx = Transaction {
///     version: 2,
///     inputs: vec![Input {
///         prevout: OutPoint { hash: [1u8; 32], index: 0 },
///         script: Script::new(vec![0x51]), // OP_1
///         sequence: 0xffffffff,
///     }],
///     outputs: vec![Output::new(1000, Script::new(vec![0x51]))],
///     lock_time: 0,
/// };
/// let prevout = Output::new(2000, Script::new(vec![0x51, 0x87])); // OP_1 OP_EQUAL
/// assert_eq!(verify(&tx, 0, &prevout, 0), VerifyResult::Ok);
/// ```
pub fn verify(tx: &Transaction, input_index: usize, prevout: &Output, flags: u32) -> VerifyResult {
    let verifier = Secp256k1Verifier::new();
    verify_input(
        tx,
        input_index,
        SpentOutputs::Single(prevout),
        flags,
        &ConsensusConfig::default(),
        &verifier,
    )
}

/// Like [`verify`], with the outputs spent by every input available to
/// introspection and `SIGHASH_UTXOS`.
pub fn verify_with_spent_outputs(
    tx: &Transaction,
    input_index: usize,
    spent_outputs: &[Output],
    flags: u32,
) -> VerifyResult {
    let verifier = Secp256k1Verifier::new();
    verify_input(
        tx,
        input_index,
        SpentOutputs::All(spent_outputs),
        flags,
        &ConsensusConfig::default(),
        &verifier,
    )
}

/// Strictly decode `tx_bytes` (no trailing data), then [`verify`].
pub fn verify_bytes(tx_bytes: &[u8], input_index: usize, prevout: &Output, flags: u32) -> VerifyResult {
    let verifier = Secp256k1Verifier::new();
    verify_input_bytes(
        tx_bytes,
        input_index,
        prevout,
        flags,
        &ConsensusConfig::default(),
        &verifier,
    )
}

/// Like [`verify`], keeping the precise error and the work metrics.
pub fn verify_script_detailed(
    tx: &Transaction,
    input_index: usize,
    prevout: &Output,
    flags: u32,
) -> Result<ExecutionMetrics, ScriptError> {
    let verifier = Secp256k1Verifier::new();
    verify_script_with(
        tx,
        input_index,
        SpentOutputs::Single(prevout),
        flags,
        &ConsensusConfig::default(),
        &verifier,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encodable;
    use crate::flags::*;
    use crate::hashing::hash160;
    use crate::opcodes::*;
    use crate::script::{Script, ScriptBuilder};
    use crate::types::{Input, OutPoint};

    fn spending(script_sig: Script) -> Transaction {
        Transaction {
            version: 2,
            inputs: vec![Input {
                prevout: OutPoint {
                    hash: [3u8; 32],
                    index: 1,
                },
                script: script_sig,
                sequence: 0xffff_fffe,
            }],
            outputs: vec![Output::new(500, Script::new(vec![OP_1]))],
            lock_time: 0,
        }
    }

    fn p2sh_pair(redeem: &[u8]) -> (Script, Output) {
        let script_sig = ScriptBuilder::new().push_slice(redeem).into_script();
        let script_pubkey = ScriptBuilder::new()
            .push_opcode(OP_HASH160)
            .push_slice(&hash160(redeem))
            .push_opcode(OP_EQUAL)
            .into_script();
        (script_sig, Output::new(1000, script_pubkey))
    }

    #[test]
    fn test_true_and_false_results() {
        let tx = spending(Script::new(vec![OP_1, OP_2]));
        let add_to_3 = Output::new(1, Script::new(vec![OP_ADD, OP_3, OP_EQUAL]));
        assert_eq!(verify(&tx, 0, &add_to_3, 0), VerifyResult::Ok);

        let add_to_4 = Output::new(1, Script::new(vec![OP_ADD, OP_4, OP_EQUAL]));
        assert_eq!(verify(&tx, 0, &add_to_4, 0), VerifyResult::EvalFalse);
        assert_eq!(
            verify_script_detailed(&tx, 0, &add_to_4, 0),
            Err(ScriptError::EvalFalse)
        );
    }

    #[test]
    fn test_input_index_out_of_range() {
        let tx = spending(Script::new(vec![OP_1]));
        let prevout = Output::new(1, Script::default());
        assert_eq!(verify(&tx, 1, &prevout, 0), VerifyResult::TxInputIndex);
    }

    #[test]
    fn test_spent_outputs_mismatch() {
        let tx = spending(Script::new(vec![OP_1]));
        assert_eq!(
            verify_with_spent_outputs(&tx, 0, &[], 0),
            VerifyResult::SpentOutputsMismatch
        );
    }

    #[test]
    fn test_p2sh_redeem_script_is_evaluated() {
        let (script_sig, prevout) = p2sh_pair(&[OP_0]);
        let tx = spending(script_sig);
        // Hash matches, so only the P2SH rule catches the false redeem script
        assert_eq!(verify(&tx, 0, &prevout, 0), VerifyResult::Ok);
        assert_eq!(verify(&tx, 0, &prevout, VERIFY_P2SH), VerifyResult::EvalFalse);

        let (script_sig, prevout) = p2sh_pair(&[OP_1]);
        let tx = spending(script_sig);
        assert_eq!(verify(&tx, 0, &prevout, VERIFY_P2SH), VerifyResult::Ok);
    }

    #[test]
    fn test_p2sh_requires_push_only() {
        let redeem = [OP_1];
        let (_, prevout) = p2sh_pair(&redeem);
        let mut script_sig = vec![OP_NOP];
        script_sig.extend(ScriptBuilder::new().push_slice(&redeem).into_script().into_bytes());
        let tx = spending(Script::new(script_sig));
        assert_eq!(verify(&tx, 0, &prevout, VERIFY_P2SH), VerifyResult::SigPushOnly);
    }

    #[test]
    fn test_segwit_recovery_exemption() {
        // v0 witness program: OP_0 <20 bytes>
        let mut program = vec![OP_0, 20];
        program.extend_from_slice(&[0x42; 20]);
        let (script_sig, prevout) = p2sh_pair(&program);
        let tx = spending(script_sig);
        let flags = VERIFY_P2SH | VERIFY_CLEANSTACK;
        assert_eq!(verify(&tx, 0, &prevout, flags), VerifyResult::Ok);
        // Evaluated as a redeem script it leaves two items behind
        assert_eq!(
            verify(&tx, 0, &prevout, flags | VERIFY_DISALLOW_SEGWIT_RECOVERY),
            VerifyResult::CleanStack
        );
    }

    #[test]
    fn test_cleanstack() {
        let tx = spending(Script::new(vec![OP_1, OP_1]));
        let prevout = Output::new(1, Script::new(vec![OP_1]));
        assert_eq!(verify(&tx, 0, &prevout, VERIFY_P2SH), VerifyResult::Ok);
        assert_eq!(
            verify(&tx, 0, &prevout, VERIFY_P2SH | VERIFY_CLEANSTACK),
            VerifyResult::CleanStack
        );
    }

    #[test]
    fn test_sigpushonly() {
        let tx = spending(Script::new(vec![OP_1, OP_DUP]));
        let prevout = Output::new(1, Script::new(vec![OP_EQUAL]));
        assert_eq!(verify(&tx, 0, &prevout, 0), VerifyResult::Ok);
        assert_eq!(verify(&tx, 0, &prevout, VERIFY_SIGPUSHONLY), VerifyResult::SigPushOnly);
    }

    #[test]
    fn test_verify_bytes() {
        let tx = spending(Script::new(vec![OP_1]));
        let prevout = Output::new(1, Script::new(vec![OP_1, OP_EQUAL]));
        let mut bytes = Encodable::to_bytes(&tx);
        assert_eq!(verify_bytes(&bytes, 0, &prevout, 0), VerifyResult::Ok);
        bytes.push(0);
        assert_eq!(verify_bytes(&bytes, 0, &prevout, 0), VerifyResult::TxInvalid);
        assert_eq!(verify_bytes(&bytes[..10], 0, &prevout, 0), VerifyResult::TxInvalid);
    }

    #[test]
    fn test_metrics_reported() {
        let tx = spending(Script::new(vec![OP_1]));
        let prevout = Output::new(1, Script::new(vec![OP_SHA256, OP_SIZE, OP_NIP]));
        let metrics = verify_script_detailed(&tx, 0, &prevout, VERIFY_MAY2025).unwrap();
        assert_eq!(metrics.hash_iterations, 1);
        assert_eq!(metrics.sig_checks, 0);
        assert!(metrics.op_cost > 0);
    }

    #[test]
    fn test_disabled_rules_are_dropped() {
        let tx = spending(Script::new(vec![OP_1, OP_1]));
        let prevout = Output::new(1, Script::new(vec![OP_1]));
        let config = ConsensusConfig {
            enabled_rules: VERIFY_ALL_KNOWN & !VERIFY_CLEANSTACK,
            ..ConsensusConfig::default()
        };
        let verifier = Secp256k1Verifier::new();
        let result = verify_input(
            &tx,
            0,
            SpentOutputs::Single(&prevout),
            VERIFY_CLEANSTACK,
            &config,
            &verifier,
        );
        assert_eq!(result, VerifyResult::Ok);
    }

    #[test]
    fn test_error_mapping_collapses_categories() {
        assert_eq!(VerifyResult::from(ScriptError::DivByZero), VerifyResult::InvalidNumber);
        assert_eq!(VerifyResult::from(ScriptError::InvalidBitCount), VerifyResult::InvalidOperand);
        assert_eq!(VerifyResult::from(ScriptError::OpCost), VerifyResult::VmLimits);
        assert_eq!(VerifyResult::from(ScriptError::HashIterations), VerifyResult::VmLimits);
        assert_eq!(VerifyResult::from(ScriptError::IllegalForkId), VerifyResult::ForkId);
        assert_eq!(VerifyResult::from(ScriptError::Exhausted), VerifyResult::TxInvalid);
        assert_eq!(VerifyResult::from(ScriptError::OpCount), VerifyResult::OpCount);
        assert!(VerifyResult::Ok.is_success());
        assert_eq!(VerifyResult::Ok.code(), 0);
        assert!(!VerifyResult::from(ScriptError::EvalFalse).is_success());
    }
}
