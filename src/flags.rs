//! Verification flags
//!
//! Callers select consensus rules with the stable `VERIFY_*` bitmask. The
//! interpreter works on [`ScriptFlags`], a private numbering produced only by
//! [`verify_flags_to_script_flags`]. Unknown external bits are ignored so a
//! caller may pass flags for rules this engine does not know yet.

use crate::config::ConsensusConfig;
use std::ops::BitOr;

pub const VERIFY_NONE: u32 = 0;
/// Evaluate P2SH redeem scripts
pub const VERIFY_P2SH: u32 = 1 << 0;
/// Strict signature hash type and pubkey encodings
pub const VERIFY_STRICTENC: u32 = 1 << 1;
/// Strict DER signatures
pub const VERIFY_DERSIG: u32 = 1 << 2;
/// Low S values in ECDSA signatures
pub const VERIFY_LOW_S: u32 = 1 << 3;
/// Unlocking scripts may only push
pub const VERIFY_SIGPUSHONLY: u32 = 1 << 5;
/// Minimal pushes and minimally encoded numbers
pub const VERIFY_MINIMALDATA: u32 = 1 << 6;
/// Fail on NOP1, NOP4..NOP10
pub const VERIFY_DISCOURAGE_UPGRADABLE_NOPS: u32 = 1 << 7;
/// Exactly one stack element after evaluation
pub const VERIFY_CLEANSTACK: u32 = 1 << 8;
pub const VERIFY_CHECKLOCKTIMEVERIFY: u32 = 1 << 9;
pub const VERIFY_CHECKSEQUENCEVERIFY: u32 = 1 << 10;
/// Failed signature checks require empty signatures
pub const VERIFY_NULLFAIL: u32 = 1 << 14;
/// Replay-protected signature hashing
pub const VERIFY_SIGHASH_FORKID: u32 = 1 << 16;
/// Remove the segwit recovery exemption
pub const VERIFY_DISALLOW_SEGWIT_RECOVERY: u32 = 1 << 20;
/// Bitfield-driven Schnorr CHECKMULTISIG
pub const VERIFY_SCHNORR_MULTISIG: u32 = 1 << 21;
/// SigChecks density limit per input
pub const VERIFY_INPUT_SIGCHECKS: u32 = 1 << 22;
pub const VERIFY_ENFORCE_SIGCHECKS: u32 = 1 << 23;
pub const VERIFY_64_BIT_INTEGERS: u32 = 1 << 24;
pub const VERIFY_NATIVE_INTROSPECTION: u32 = 1 << 25;
/// 32-byte HASH256 P2SH
pub const VERIFY_P2SH_32: u32 = 1 << 26;
/// CashTokens
pub const VERIFY_TOKENS: u32 = 1 << 27;
/// VM limits and big integers
pub const VERIFY_MAY2025: u32 = 1 << 28;

/// Every external bit this engine understands.
pub const VERIFY_ALL_KNOWN: u32 = VERIFY_P2SH
    | VERIFY_STRICTENC
    | VERIFY_DERSIG
    | VERIFY_LOW_S
    | VERIFY_SIGPUSHONLY
    | VERIFY_MINIMALDATA
    | VERIFY_DISCOURAGE_UPGRADABLE_NOPS
    | VERIFY_CLEANSTACK
    | VERIFY_CHECKLOCKTIMEVERIFY
    | VERIFY_CHECKSEQUENCEVERIFY
    | VERIFY_NULLFAIL
    | VERIFY_SIGHASH_FORKID
    | VERIFY_DISALLOW_SEGWIT_RECOVERY
    | VERIFY_SCHNORR_MULTISIG
    | VERIFY_INPUT_SIGCHECKS
    | VERIFY_ENFORCE_SIGCHECKS
    | VERIFY_64_BIT_INTEGERS
    | VERIFY_NATIVE_INTROSPECTION
    | VERIFY_P2SH_32
    | VERIFY_TOKENS
    | VERIFY_MAY2025;

/// Consensus-mandatory rules for blocks after the May 2025 upgrade.
pub const VERIFY_MANDATORY: u32 = VERIFY_P2SH
    | VERIFY_STRICTENC
    | VERIFY_DERSIG
    | VERIFY_LOW_S
    | VERIFY_SIGPUSHONLY
    | VERIFY_CLEANSTACK
    | VERIFY_CHECKLOCKTIMEVERIFY
    | VERIFY_CHECKSEQUENCEVERIFY
    | VERIFY_NULLFAIL
    | VERIFY_SIGHASH_FORKID
    | VERIFY_SCHNORR_MULTISIG
    | VERIFY_INPUT_SIGCHECKS
    | VERIFY_ENFORCE_SIGCHECKS
    | VERIFY_64_BIT_INTEGERS
    | VERIFY_NATIVE_INTROSPECTION
    | VERIFY_P2SH_32
    | VERIFY_TOKENS
    | VERIFY_MAY2025;

/// Mandatory rules plus relay policy.
pub const VERIFY_STANDARD: u32 = VERIFY_MANDATORY
    | VERIFY_MINIMALDATA
    | VERIFY_DISCOURAGE_UPGRADABLE_NOPS
    | VERIFY_DISALLOW_SEGWIT_RECOVERY;

/// Internal interpreter flags. Only the translator builds these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScriptFlags(u32);

impl ScriptFlags {
    pub(crate) const P2SH: ScriptFlags = ScriptFlags(1 << 0);
    pub(crate) const STRICTENC: ScriptFlags = ScriptFlags(1 << 1);
    pub(crate) const DERSIG: ScriptFlags = ScriptFlags(1 << 2);
    pub(crate) const LOW_S: ScriptFlags = ScriptFlags(1 << 3);
    pub(crate) const NULLFAIL: ScriptFlags = ScriptFlags(1 << 4);
    pub(crate) const SIGPUSHONLY: ScriptFlags = ScriptFlags(1 << 5);
    pub(crate) const MINIMALDATA: ScriptFlags = ScriptFlags(1 << 6);
    pub(crate) const DISCOURAGE_UPGRADABLE_NOPS: ScriptFlags = ScriptFlags(1 << 7);
    pub(crate) const CLEANSTACK: ScriptFlags = ScriptFlags(1 << 8);
    pub(crate) const CHECKLOCKTIMEVERIFY: ScriptFlags = ScriptFlags(1 << 9);
    pub(crate) const CHECKSEQUENCEVERIFY: ScriptFlags = ScriptFlags(1 << 10);
    pub(crate) const SIGHASH_FORKID: ScriptFlags = ScriptFlags(1 << 11);
    pub(crate) const DISALLOW_SEGWIT_RECOVERY: ScriptFlags = ScriptFlags(1 << 12);
    pub(crate) const SCHNORR_MULTISIG: ScriptFlags = ScriptFlags(1 << 13);
    pub(crate) const INPUT_SIGCHECKS: ScriptFlags = ScriptFlags(1 << 14);
    pub(crate) const ENFORCE_SIGCHECKS: ScriptFlags = ScriptFlags(1 << 15);
    pub(crate) const INTEGERS_64_BIT: ScriptFlags = ScriptFlags(1 << 16);
    pub(crate) const NATIVE_INTROSPECTION: ScriptFlags = ScriptFlags(1 << 17);
    pub(crate) const P2SH_32: ScriptFlags = ScriptFlags(1 << 18);
    pub(crate) const TOKENS: ScriptFlags = ScriptFlags(1 << 19);
    pub(crate) const MAY2025: ScriptFlags = ScriptFlags(1 << 20);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn contains(self, other: ScriptFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Translate external verify flags.
    pub fn from_verify_flags(verify_flags: u32) -> Self {
        Self(verify_flags_to_script_flags(verify_flags))
    }

    /// Translate external verify flags, dropping rules the configuration disables.
    pub fn from_verify_flags_with(verify_flags: u32, config: &ConsensusConfig) -> Self {
        Self::from_verify_flags(verify_flags & config.enabled_rules)
    }

    /// Whether the rule named by an external `VERIFY_*` bit is active.
    pub fn has(self, verify_flag: u32) -> bool {
        let wanted = verify_flags_to_script_flags(verify_flag);
        wanted != 0 && self.0 & wanted == wanted
    }
}

impl BitOr for ScriptFlags {
    type Output = ScriptFlags;

    fn bitor(self, rhs: ScriptFlags) -> ScriptFlags {
        ScriptFlags(self.0 | rhs.0)
    }
}

const FLAG_MAP: &[(u32, ScriptFlags)] = &[
    (VERIFY_P2SH, ScriptFlags::P2SH),
    (VERIFY_STRICTENC, ScriptFlags::STRICTENC),
    (VERIFY_DERSIG, ScriptFlags::DERSIG),
    (VERIFY_LOW_S, ScriptFlags::LOW_S),
    (VERIFY_SIGPUSHONLY, ScriptFlags::SIGPUSHONLY),
    (VERIFY_MINIMALDATA, ScriptFlags::MINIMALDATA),
    (VERIFY_DISCOURAGE_UPGRADABLE_NOPS, ScriptFlags::DISCOURAGE_UPGRADABLE_NOPS),
    (VERIFY_CLEANSTACK, ScriptFlags::CLEANSTACK),
    (VERIFY_CHECKLOCKTIMEVERIFY, ScriptFlags::CHECKLOCKTIMEVERIFY),
    (VERIFY_CHECKSEQUENCEVERIFY, ScriptFlags::CHECKSEQUENCEVERIFY),
    (VERIFY_NULLFAIL, ScriptFlags::NULLFAIL),
    (VERIFY_SIGHASH_FORKID, ScriptFlags::SIGHASH_FORKID),
    (VERIFY_DISALLOW_SEGWIT_RECOVERY, ScriptFlags::DISALLOW_SEGWIT_RECOVERY),
    (VERIFY_SCHNORR_MULTISIG, ScriptFlags::SCHNORR_MULTISIG),
    (VERIFY_INPUT_SIGCHECKS, ScriptFlags::INPUT_SIGCHECKS),
    (VERIFY_ENFORCE_SIGCHECKS, ScriptFlags::ENFORCE_SIGCHECKS),
    (VERIFY_64_BIT_INTEGERS, ScriptFlags::INTEGERS_64_BIT),
    (VERIFY_NATIVE_INTROSPECTION, ScriptFlags::NATIVE_INTROSPECTION),
    (VERIFY_P2SH_32, ScriptFlags::P2SH_32),
    (VERIFY_TOKENS, ScriptFlags::TOKENS),
    (VERIFY_MAY2025, ScriptFlags::MAY2025),
];

/// verify_flags_to_script_flags: 𝔹³² → 𝔹³²
///
/// internal = ⋁ { map(b) | b ∈ external ∩ known }
pub fn verify_flags_to_script_flags(external: u32) -> u32 {
    FLAG_MAP
        .iter()
        .filter(|(bit, _)| external & bit != 0)
        .fold(0, |acc, (_, internal)| acc | internal.0)
}
