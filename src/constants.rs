//! Consensus constants for the Bitcoin Cash rule set

/// Maximum money supply: 21,000,000 BCH in satoshis
pub const MAX_MONEY: u64 = 21_000_000 * 100_000_000;

/// Satoshis per BCH
pub const SATOSHIS_PER_COIN: u64 = 100_000_000;

/// Maximum transaction size: 1MB
pub const MAX_TX_SIZE: usize = 1_000_000;

/// Minimum transaction size (May 2023 rules)
pub const MIN_TX_SIZE: usize = 65;

/// Maximum script length
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum size of a single stack element
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum stack element size once the May 2025 VM limits apply
pub const MAY2025_MAX_SCRIPT_ELEMENT_SIZE: usize = 10_000;

/// Maximum combined size of stack and altstack during script execution
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of non-push operations in a script
pub const MAX_SCRIPT_OPS: usize = 201;

/// Maximum number of public keys in one CHECKMULTISIG
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Maximum nesting of IF/NOTIF once the May 2025 VM limits apply
pub const MAX_CONDITIONAL_STACK_DEPTH: usize = 100;

/// Maximum length of an NFT commitment
pub const MAX_TOKEN_COMMITMENT_LENGTH: usize = 40;

/// Script number operand width without 64-bit integers
pub const DEFAULT_SCRIPTNUM_SIZE: usize = 4;

/// Script number operand width with 64-bit integers
pub const BIG_SCRIPTNUM_SIZE: usize = 8;

/// Operand width for CHECKLOCKTIMEVERIFY / CHECKSEQUENCEVERIFY
pub const LOCKTIME_SCRIPTNUM_SIZE: usize = 5;

/// Lock time threshold: values below are block heights, above are timestamps
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number for final transaction input
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// Relative lock-time disabled when set (BIP68)
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// Relative lock-time is time-based when set (BIP68)
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// Relative lock-time value mask (BIP68)
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000ffff;

/// Unlocking bytecode allowance per signature check: `sigchecks * 43 - 60 <= len`
pub const SIGCHECKS_DENSITY_FACTOR: i64 = 43;
pub const SIGCHECKS_DENSITY_BONUS: i64 = 60;

/// Operation cost budget factor: `(41 + unlocking len) * 800`
pub const OPCOST_BUDGET_PER_BYTE: u64 = 800;
pub const OPCOST_FIXED_BYTES: u64 = 41;

/// Base cost of every evaluated instruction
pub const OPCOST_BASE_INSTRUCTION: u64 = 100;

/// Cost of one hash digest iteration
pub const OPCOST_HASH_ITERATION: u64 = 64;

/// Hash digest iteration allowance: `(41 + unlocking len) * 7 / 2`
pub const HASH_ITERATIONS_PER_BYTE_NUMERATOR: u64 = 7;
pub const HASH_ITERATIONS_PER_BYTE_DENOMINATOR: u64 = 2;

/// Cost of one signature check
pub const OPCOST_SIGCHECK: u64 = 26_000;

/// Spender height written into store records of unspent outputs
pub const NOT_SPENT: u32 = u32::MAX;

/// Output value reserved for "not found" placeholders
pub const NOT_FOUND_VALUE: u64 = u64::MAX;

/// Smallest/largest coinbase unlocking script
pub const MIN_COINBASE_SCRIPT_SIZE: usize = 2;
pub const MAX_COINBASE_SCRIPT_SIZE: usize = 100;
