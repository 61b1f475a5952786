//! # Cash-Consensus
//!
//! Bitcoin Cash script and transaction verification core.
//!
//! Given a transaction, one of its inputs and the output it spends, this crate
//! decides whether the unlocking script satisfies the locking script under a
//! caller-selected set of consensus rules. Everything is pure computation over
//! borrowed data: no I/O, no global state, no logger installed.
//!
//! ## Architecture
//!
//! The system is layered leaf-first:
//! - Byte codec and CashToken codec (`codec`, `token`)
//! - Chain primitives and scripts (`types`, `script`, `num`)
//! - Flag translation and configuration (`flags`, `config`)
//! - Signature hashing and checking (`sighash`, `signature`)
//! - Script interpreter (`interpreter`)
//! - Verification facade (`verify`, [`CashConsensus`])
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: All verification is deterministic and side-effect-free
//! 2. **Stable Public Flags**: External verify flags never change meaning; the
//!    interpreter's own flag layout stays private
//! 3. **Exact Version Pinning**: All consensus-critical dependencies pinned to exact versions
//! 4. **Typed Failures**: Every failure carries its specific error kind
//!
//! ## Usage
//!
//! ```rust
//! use cash_consensus::{verify, VerifyResult, VERIFY_STANDARD};
//! use cash_consensus::script::Script;
//! use cash_consensus::types::*;
//!
//! let tx = Transaction {
//!     version: 2,
//!     inputs: vec![Input {
//!         prevout: OutPoint { hash: [1; 32], index: 0 },
//!         script: Script::new(vec![0x51]), // OP_1
//!         sequence: 0xffffffff,
//!     }],
//!     outputs: vec![Output::new(1000, Script::new(vec![0x51]))],
//!     lock_time: 0,
//! };
//! let prevout = Output::new(2000, Script::new(vec![0x51, 0x87])); // OP_1 OP_EQUAL
//!
//! assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);
//! ```

pub mod codec;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod flags;
pub mod hashing;
pub mod interpreter;
pub mod num;
pub mod opcodes;
pub mod script;
pub mod sighash;
pub mod signature;
pub mod token;
pub mod transaction;
pub mod types;
pub mod verify;

// Re-export commonly used types
pub use codec::{Decodable, Encodable};
pub use config::{ConsensusConfig, ScriptLimits};
pub use constants::*;
pub use error::{CodecError, ConsensusError, CryptoError, Result, ScriptError};
pub use flags::*;
pub use interpreter::{ExecutionMetrics, Interpreter};
pub use script::Script;
pub use signature::{Secp256k1Verifier, SignatureScheme, SignatureVerifier};
pub use token::{Capability, TokenData};
pub use types::*;
pub use verify::{
    verify, verify_bytes, verify_script_detailed, verify_with_spent_outputs, SpentOutputs,
    VerifyResult,
};

/// Verification engine bound to one configuration and signature verifier
///
/// # Examples
///
/// ```
/// use cash_consensus::{CashConsensus, VerifyResult, VERIFY_P2SH};
/// use cash_consensus::script::Script;
/// use cash_consensus::types::*;
///
/// let consensus = CashConsensus::new();
///
/// let tx = Transaction {
///     version: 2,
///     inputs: vec![Input {
///         prevout: OutPoint { hash: [1; 32], index: 0 },
///         script: Script::new(vec![0x52, 0x53]), // OP_2 OP_3
///         sequence: 0xffffffff,
///     }],
///     outputs: vec![Output::new(1000, Script::new(vec![0x51]))],
///     lock_time: 0,
/// };
///
/// // OP_ADD OP_5 OP_EQUAL
/// let prevout = Output::new(2000, Script::new(vec![0x93, 0x55, 0x87]));
/// assert_eq!(consensus.verify(&tx, 0, &prevout, VERIFY_P2SH), VerifyResult::Ok);
///
/// // OP_ADD OP_4 OP_EQUAL
/// let prevout = Output::new(2000, Script::new(vec![0x93, 0x54, 0x87]));
/// assert_eq!(consensus.verify(&tx, 0, &prevout, VERIFY_P2SH), VerifyResult::EvalFalse);
/// ```
pub struct CashConsensus {
    config: ConsensusConfig,
    verifier: Box<dyn SignatureVerifier>,
}

impl CashConsensus {
    /// Create an engine with mainnet limits and the secp256k1 verifier
    ///
    /// # Examples
    ///
    /// ```
    /// use cash_consensus::CashConsensus;
    ///
    /// let consensus = CashConsensus::new();
    /// assert_eq!(consensus.config().fork_id, 0);
    /// ```
    pub fn new() -> Self {
        Self {
            config: ConsensusConfig::default(),
            verifier: Box::new(Secp256k1Verifier::new()),
        }
    }

    /// Create an engine from a validated configuration
    ///
    /// # Examples
    ///
    /// ```
    /// use cash_consensus::{CashConsensus, ConsensusConfig};
    ///
    /// let config = ConsensusConfig::from_json(r#"{ "limits": { "max_ops": 100 } }"#).unwrap();
    /// let consensus = CashConsensus::with_config(config).unwrap();
    /// assert_eq!(consensus.config().limits.max_ops, 100);
    /// ```
    pub fn with_config(config: ConsensusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            verifier: Box::new(Secp256k1Verifier::new()),
        })
    }

    /// Replace the signature verifier
    pub fn with_verifier(mut self, verifier: Box<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Validate a transaction according to context-free consensus rules
    ///
    /// # Examples
    ///
    /// ```
    /// use cash_consensus::CashConsensus;
    /// use cash_consensus::script::Script;
    /// use cash_consensus::types::*;
    ///
    /// let consensus = CashConsensus::new();
    /// let tx = Transaction {
    ///     version: 2,
    ///     inputs: vec![],
    ///     outputs: vec![Output::new(1000, Script::new(vec![0x51]))],
    ///     lock_time: 0,
    /// };
    ///
    /// let result = consensus.validate_transaction(&tx).unwrap();
    /// assert!(matches!(result, ValidationResult::Invalid(_)));
    /// ```
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<ValidationResult> {
        transaction::check_transaction(tx)
    }

    /// Validate transaction inputs against the outputs they spend, returning the fee
    ///
    /// # Examples
    ///
    /// ```
    /// use cash_consensus::CashConsensus;
    /// use cash_consensus::script::Script;
    /// use cash_consensus::types::*;
    ///
    /// let consensus = CashConsensus::new();
    /// let tx = Transaction {
    ///     version: 2,
    ///     inputs: vec![Input {
    ///         prevout: OutPoint { hash: [1; 32], index: 0 },
    ///         script: Script::default(),
    ///         sequence: 0xffffffff,
    ///     }],
    ///     outputs: vec![Output::new(900_000_000, Script::default())],
    ///     lock_time: 0,
    /// };
    /// let spent = vec![Output::new(1_000_000_000, Script::default())];
    ///
    /// let (result, fee) = consensus.validate_tx_inputs(&tx, &spent).unwrap();
    /// assert_eq!(result, ValidationResult::Valid);
    /// assert_eq!(fee, 100_000_000);
    /// ```
    pub fn validate_tx_inputs(
        &self,
        tx: &Transaction,
        spent_outputs: &[Output],
    ) -> Result<(ValidationResult, u64)> {
        transaction::check_tx_inputs(tx, spent_outputs)
    }

    /// Verify one input spending `prevout`
    pub fn verify(
        &self,
        tx: &Transaction,
        input_index: usize,
        prevout: &Output,
        flags: u32,
    ) -> VerifyResult {
        verify::verify_input(
            tx,
            input_index,
            SpentOutputs::Single(prevout),
            flags,
            &self.config,
            self.verifier.as_ref(),
        )
    }

    /// Verify one input with every spent output available
    pub fn verify_with_spent_outputs(
        &self,
        tx: &Transaction,
        input_index: usize,
        spent_outputs: &[Output],
        flags: u32,
    ) -> VerifyResult {
        verify::verify_input(
            tx,
            input_index,
            SpentOutputs::All(spent_outputs),
            flags,
            &self.config,
            self.verifier.as_ref(),
        )
    }

    /// Decode a serialized transaction strictly, then verify one input
    pub fn verify_bytes(
        &self,
        tx_bytes: &[u8],
        input_index: usize,
        prevout: &Output,
        flags: u32,
    ) -> VerifyResult {
        verify::verify_input_bytes(
            tx_bytes,
            input_index,
            prevout,
            flags,
            &self.config,
            self.verifier.as_ref(),
        )
    }

    /// Verify every input of `tx`; the first failure wins
    ///
    /// # Examples
    ///
    /// ```
    /// use cash_consensus::{CashConsensus, VerifyResult};
    /// use cash_consensus::script::Script;
    /// use cash_consensus::types::*;
    ///
    /// let consensus = CashConsensus::new();
    /// let input = |index| Input {
    ///     prevout: OutPoint { hash: [1; 32], index },
    ///     script: Script::new(vec![0x51]),
    ///     sequence: 0xffffffff,
    /// };
    /// let tx = Transaction {
    ///     version: 2,
    ///     inputs: vec![input(0), input(1)],
    ///     outputs: vec![Output::new(1000, Script::default())],
    ///     lock_time: 0,
    /// };
    /// let spent = vec![
    ///     Output::new(600, Script::new(vec![0x51, 0x87])),
    ///     Output::new(600, Script::new(vec![0x52, 0x87])),
    /// ];
    ///
    /// assert_eq!(consensus.verify_all_inputs(&tx, &spent, 0), Err((1, VerifyResult::EvalFalse)));
    /// ```
    pub fn verify_all_inputs(
        &self,
        tx: &Transaction,
        spent_outputs: &[Output],
        flags: u32,
    ) -> std::result::Result<(), (usize, VerifyResult)> {
        for input_index in 0..tx.inputs.len() {
            let result = self.verify_with_spent_outputs(tx, input_index, spent_outputs, flags);
            if !result.is_success() {
                return Err((input_index, result));
            }
        }
        Ok(())
    }

    /// Verify one input and keep the precise error and work metrics
    ///
    /// # Examples
    ///
    /// ```
    /// use cash_consensus::{CashConsensus, ScriptError};
    /// use cash_consensus::script::Script;
    /// use cash_consensus::types::*;
    ///
    /// let consensus = CashConsensus::new();
    /// let tx = Transaction {
    ///     version: 2,
    ///     inputs: vec![Input {
    ///         prevout: OutPoint { hash: [1; 32], index: 0 },
    ///         script: Script::new(vec![0x51]),
    ///         sequence: 0xffffffff,
    ///     }],
    ///     outputs: vec![Output::new(1000, Script::default())],
    ///     lock_time: 0,
    /// };
    /// let prevout = Output::new(2000, Script::new(vec![0x6a])); // OP_RETURN
    ///
    /// let result = consensus.verify_script_detailed(&tx, 0, &prevout, 0);
    /// assert_eq!(result, Err(ScriptError::OpReturn));
    /// ```
    pub fn verify_script_detailed(
        &self,
        tx: &Transaction,
        input_index: usize,
        prevout: &Output,
        flags: u32,
    ) -> std::result::Result<ExecutionMetrics, ScriptError> {
        verify::verify_script_with(
            tx,
            input_index,
            SpentOutputs::Single(prevout),
            flags,
            &self.config,
            self.verifier.as_ref(),
        )
    }

    /// Evaluate a script without transaction context
    ///
    /// # Examples
    ///
    /// ```
    /// use cash_consensus::CashConsensus;
    /// use cash_consensus::script::Script;
    ///
    /// let consensus = CashConsensus::new();
    ///
    /// // OP_1 OP_2 OP_ADD
    /// let stack = consensus.eval_script(&Script::new(vec![0x51, 0x52, 0x93]), 0).unwrap();
    /// assert_eq!(stack, vec![vec![3]]);
    /// ```
    pub fn eval_script(
        &self,
        script: &Script,
        flags: u32,
    ) -> std::result::Result<Vec<ByteString>, ScriptError> {
        let script_flags = ScriptFlags::from_verify_flags_with(flags, &self.config);
        let interpreter = Interpreter::new(script_flags, self.verifier.as_ref())
            .with_limits(self.config.limits.clone())
            .with_fork_id(self.config.fork_id);
        let mut stack = Vec::new();
        let mut metrics = ExecutionMetrics::default();
        interpreter.eval_script(&mut stack, script, &mut metrics)?;
        Ok(stack)
    }
}

impl Default for CashConsensus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CashConsensus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CashConsensus")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
