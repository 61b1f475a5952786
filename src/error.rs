//! Error types for serialization, script evaluation and consensus validation

use thiserror::Error;

/// Failures raised by the byte codec and everything decoded through it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unexpected end of data")]
    Exhausted,

    #[error("Read attempted on an invalidated cursor")]
    InvalidCursor,

    #[error("{0} trailing bytes after decoded value")]
    TrailingBytes(usize),

    #[error("Length prefix does not fit the platform size")]
    LengthOverflow,

    #[error("Invalid token encoding: {0}")]
    TokenEncodingInvalid(&'static str),
}

/// Every way evaluation of a script can halt without success.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptError {
    // Decoding
    #[error("Ran out of bytes while decoding")]
    Exhausted,
    #[error("Invalid token encoding")]
    TokenEncodingInvalid,

    // Final state
    #[error("Script evaluated without error but finished with a false/empty top stack element")]
    EvalFalse,
    #[error("OP_RETURN was encountered")]
    OpReturn,

    // Limits
    #[error("Script is too big")]
    ScriptSize,
    #[error("Push value size limit exceeded")]
    PushSize,
    #[error("Operation limit exceeded")]
    OpCount,
    #[error("Stack size limit exceeded")]
    StackSize,
    #[error("Signature count negative or greater than pubkey count")]
    SigCount,
    #[error("Pubkey count negative or limit exceeded")]
    PubkeyCount,
    #[error("Conditional nesting limit exceeded")]
    ConditionalStackDepth,
    #[error("Operation cost budget exceeded")]
    OpCost,
    #[error("Hash digest iteration limit exceeded")]
    HashIterations,

    // Failed verify operations
    #[error("Script failed an OP_VERIFY operation")]
    Verify,
    #[error("Script failed an OP_EQUALVERIFY operation")]
    EqualVerify,
    #[error("Script failed an OP_CHECKMULTISIGVERIFY operation")]
    CheckMultiSigVerify,
    #[error("Script failed an OP_CHECKSIGVERIFY operation")]
    CheckSigVerify,
    #[error("Script failed an OP_CHECKDATASIGVERIFY operation")]
    CheckDataSigVerify,
    #[error("Script failed an OP_NUMEQUALVERIFY operation")]
    NumEqualVerify,

    // Logical/format/canonical errors
    #[error("Opcode missing or not understood")]
    BadOpcode,
    #[error("Attempted to use a disabled opcode")]
    DisabledOpcode,
    #[error("Operation not valid with the current stack size")]
    InvalidStackOperation,
    #[error("Operation not valid with the current altstack size")]
    InvalidAltstackOperation,
    #[error("Invalid OP_IF construction")]
    UnbalancedConditional,

    // Operands
    #[error("Invalid operand size")]
    InvalidOperandSize,
    #[error("Given operand is not a number within the valid range")]
    InvalidNumberRange,
    #[error("Number is not minimally encoded")]
    MinimalNumber,
    #[error("The requested encoding is impossible to satisfy")]
    ImpossibleEncoding,
    #[error("Invalid OP_SPLIT range")]
    InvalidSplitRange,
    #[error("Division by zero")]
    DivByZero,
    #[error("Modulo by zero")]
    ModByZero,

    // Locktime
    #[error("Negative locktime")]
    NegativeLocktime,
    #[error("Locktime requirement not satisfied")]
    UnsatisfiedLocktime,

    // Signature and pubkey encodings
    #[error("Signature hash type missing or not understood")]
    SigHashType,
    #[error("Non-canonical DER signature")]
    SigDer,
    #[error("Data push larger than necessary")]
    MinimalData,
    #[error("Only push operators allowed in signatures")]
    SigPushOnly,
    #[error("Non-canonical signature: S value is unnecessarily high")]
    SigHighS,
    #[error("Public key is neither compressed or uncompressed")]
    PubkeyType,
    #[error("Stack size must be exactly one after execution")]
    CleanStack,
    #[error("Signature must be zero for failed CHECK(MULTI)SIG operation")]
    SigNullFail,
    #[error("Signature cannot be 65 bytes in CHECKMULTISIG")]
    SigBadLength,
    #[error("Only Schnorr signatures allowed in this operation")]
    SigNonSchnorr,
    #[error("Signature must use SIGHASH_FORKID")]
    MustUseForkId,
    #[error("Illegal use of SIGHASH_FORKID")]
    IllegalForkId,

    // Schnorr multisig
    #[error("Bitfield size is invalid")]
    InvalidBitfieldSize,
    #[error("Bitfield bit out of the expected range")]
    InvalidBitRange,
    #[error("Bitfield does not have the expected number of set bits")]
    InvalidBitCount,

    #[error("NOPx reserved for soft-fork upgrades")]
    DiscourageUpgradableNops,

    #[error("Input SigChecks limit exceeded")]
    InputSigChecks,

    // Introspection
    #[error("Specified transaction input index is out of range")]
    InvalidTxInputIndex,
    #[error("Specified transaction output index is out of range")]
    InvalidTxOutputIndex,
    #[error("Execution context does not provide the requested spent output")]
    ContextUnavailable,

    #[error("P2SH redeem script evaluation nested too deeply")]
    P2SHRecursion,
}

impl From<CodecError> for ScriptError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::TokenEncodingInvalid(_) => ScriptError::TokenEncodingInvalid,
            CodecError::Exhausted
            | CodecError::InvalidCursor
            | CodecError::TrailingBytes(_)
            | CodecError::LengthOverflow => ScriptError::Exhausted,
        }
    }
}

/// Malformed inputs reported by a signature verifier.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid public key encoding")]
    InvalidPublicKey,

    #[error("Invalid signature encoding")]
    InvalidSignature,
}

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Transaction validation failed: {0}")]
    TransactionValidation(String),

    #[error("Script execution failed: {0}")]
    ScriptExecution(#[from] ScriptError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] CodecError),

    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] CryptoError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Consensus rule violation: {0}")]
    ConsensusRuleViolation(String),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
