//! Script opcode constants
//!
//! Values follow the Bitcoin Cash script instruction set, including the
//! re-enabled splice/bitwise opcodes, OP_CHECKDATASIG, OP_REVERSEBYTES and
//! the native/token introspection range.

// ============================================================================
// PUSH DATA OPCODES (0x00 - 0x4e)
// ============================================================================

/// OP_0 / OP_FALSE - Push empty array
pub const OP_0: u8 = 0x00;
pub const OP_FALSE: u8 = 0x00;

/// Largest direct-push opcode (pushes the next 75 bytes)
pub const OP_PUSHBYTES_75: u8 = 0x4b;

/// OP_PUSHDATA1 - Next byte is the data length
pub const OP_PUSHDATA1: u8 = 0x4c;

/// OP_PUSHDATA2 - Next 2 bytes (little-endian) are the data length
pub const OP_PUSHDATA2: u8 = 0x4d;

/// OP_PUSHDATA4 - Next 4 bytes (little-endian) are the data length
pub const OP_PUSHDATA4: u8 = 0x4e;

// ============================================================================
// PUSH VALUE OPCODES (0x4f - 0x60)
// ============================================================================

pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_RESERVED: u8 = 0x50;
pub const OP_1: u8 = 0x51;
pub const OP_TRUE: u8 = 0x51;
pub const OP_2: u8 = 0x52;
pub const OP_3: u8 = 0x53;
pub const OP_4: u8 = 0x54;
pub const OP_5: u8 = 0x55;
pub const OP_6: u8 = 0x56;
pub const OP_7: u8 = 0x57;
pub const OP_8: u8 = 0x58;
pub const OP_9: u8 = 0x59;
pub const OP_10: u8 = 0x5a;
pub const OP_11: u8 = 0x5b;
pub const OP_12: u8 = 0x5c;
pub const OP_13: u8 = 0x5d;
pub const OP_14: u8 = 0x5e;
pub const OP_15: u8 = 0x5f;
pub const OP_16: u8 = 0x60;

// ============================================================================
// FLOW CONTROL (0x61 - 0x6a)
// ============================================================================

pub const OP_NOP: u8 = 0x61;
/// OP_VER - Reserved, fails when executed
pub const OP_VER: u8 = 0x62;
pub const OP_IF: u8 = 0x63;
pub const OP_NOTIF: u8 = 0x64;
/// OP_VERIF - Fails even in an unexecuted branch
pub const OP_VERIF: u8 = 0x65;
/// OP_VERNOTIF - Fails even in an unexecuted branch
pub const OP_VERNOTIF: u8 = 0x66;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;

// ============================================================================
// STACK OPERATIONS (0x6b - 0x7d)
// ============================================================================

pub const OP_TOALTSTACK: u8 = 0x6b;
pub const OP_FROMALTSTACK: u8 = 0x6c;
pub const OP_2DROP: u8 = 0x6d;
pub const OP_2DUP: u8 = 0x6e;
pub const OP_3DUP: u8 = 0x6f;
pub const OP_2OVER: u8 = 0x70;
pub const OP_2ROT: u8 = 0x71;
pub const OP_2SWAP: u8 = 0x72;
pub const OP_IFDUP: u8 = 0x73;
pub const OP_DEPTH: u8 = 0x74;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_NIP: u8 = 0x77;
pub const OP_OVER: u8 = 0x78;
pub const OP_PICK: u8 = 0x79;
pub const OP_ROLL: u8 = 0x7a;
pub const OP_ROT: u8 = 0x7b;
pub const OP_SWAP: u8 = 0x7c;
pub const OP_TUCK: u8 = 0x7d;

// ============================================================================
// SPLICE OPERATIONS (0x7e - 0x82)
// ============================================================================

pub const OP_CAT: u8 = 0x7e;
/// OP_SPLIT - Formerly OP_SUBSTR
pub const OP_SPLIT: u8 = 0x7f;
/// OP_NUM2BIN - Formerly OP_LEFT
pub const OP_NUM2BIN: u8 = 0x80;
/// OP_BIN2NUM - Formerly OP_RIGHT
pub const OP_BIN2NUM: u8 = 0x81;
pub const OP_SIZE: u8 = 0x82;

// ============================================================================
// BITWISE LOGIC (0x83 - 0x8a)
// ============================================================================

/// OP_INVERT - Disabled
pub const OP_INVERT: u8 = 0x83;
pub const OP_AND: u8 = 0x84;
pub const OP_OR: u8 = 0x85;
pub const OP_XOR: u8 = 0x86;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_RESERVED1: u8 = 0x89;
pub const OP_RESERVED2: u8 = 0x8a;

// ============================================================================
// ARITHMETIC (0x8b - 0xa5)
// ============================================================================

pub const OP_1ADD: u8 = 0x8b;
pub const OP_1SUB: u8 = 0x8c;
/// OP_2MUL - Disabled
pub const OP_2MUL: u8 = 0x8d;
/// OP_2DIV - Disabled
pub const OP_2DIV: u8 = 0x8e;
pub const OP_NEGATE: u8 = 0x8f;
pub const OP_ABS: u8 = 0x90;
pub const OP_NOT: u8 = 0x91;
pub const OP_0NOTEQUAL: u8 = 0x92;
pub const OP_ADD: u8 = 0x93;
pub const OP_SUB: u8 = 0x94;
/// OP_MUL - Enabled together with 64-bit integers
pub const OP_MUL: u8 = 0x95;
pub const OP_DIV: u8 = 0x96;
pub const OP_MOD: u8 = 0x97;
/// OP_LSHIFT - Disabled
pub const OP_LSHIFT: u8 = 0x98;
/// OP_RSHIFT - Disabled
pub const OP_RSHIFT: u8 = 0x99;
pub const OP_BOOLAND: u8 = 0x9a;
pub const OP_BOOLOR: u8 = 0x9b;
pub const OP_NUMEQUAL: u8 = 0x9c;
pub const OP_NUMEQUALVERIFY: u8 = 0x9d;
pub const OP_NUMNOTEQUAL: u8 = 0x9e;
pub const OP_LESSTHAN: u8 = 0x9f;
pub const OP_GREATERTHAN: u8 = 0xa0;
pub const OP_LESSTHANOREQUAL: u8 = 0xa1;
pub const OP_GREATERTHANOREQUAL: u8 = 0xa2;
pub const OP_MIN: u8 = 0xa3;
pub const OP_MAX: u8 = 0xa4;
pub const OP_WITHIN: u8 = 0xa5;

// ============================================================================
// CRYPTO (0xa6 - 0xaf)
// ============================================================================

pub const OP_RIPEMD160: u8 = 0xa6;
pub const OP_SHA1: u8 = 0xa7;
pub const OP_SHA256: u8 = 0xa8;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_HASH256: u8 = 0xaa;
pub const OP_CODESEPARATOR: u8 = 0xab;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

// ============================================================================
// EXPANSION / LOCKTIME (0xb0 - 0xb9)
// ============================================================================

pub const OP_NOP1: u8 = 0xb0;
/// OP_CHECKLOCKTIMEVERIFY - Formerly OP_NOP2
pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
/// OP_CHECKSEQUENCEVERIFY - Formerly OP_NOP3
pub const OP_CHECKSEQUENCEVERIFY: u8 = 0xb2;
pub const OP_NOP4: u8 = 0xb3;
pub const OP_NOP5: u8 = 0xb4;
pub const OP_NOP6: u8 = 0xb5;
pub const OP_NOP7: u8 = 0xb6;
pub const OP_NOP8: u8 = 0xb7;
pub const OP_NOP9: u8 = 0xb8;
pub const OP_NOP10: u8 = 0xb9;

// ============================================================================
// DATA SIGNATURES AND BYTE ORDER (0xba - 0xbc)
// ============================================================================

pub const OP_CHECKDATASIG: u8 = 0xba;
pub const OP_CHECKDATASIGVERIFY: u8 = 0xbb;
pub const OP_REVERSEBYTES: u8 = 0xbc;

// ============================================================================
// NATIVE INTROSPECTION (0xc0 - 0xcd)
// ============================================================================

pub const OP_INPUTINDEX: u8 = 0xc0;
pub const OP_ACTIVEBYTECODE: u8 = 0xc1;
pub const OP_TXVERSION: u8 = 0xc2;
pub const OP_TXINPUTCOUNT: u8 = 0xc3;
pub const OP_TXOUTPUTCOUNT: u8 = 0xc4;
pub const OP_TXLOCKTIME: u8 = 0xc5;
pub const OP_UTXOVALUE: u8 = 0xc6;
pub const OP_UTXOBYTECODE: u8 = 0xc7;
pub const OP_OUTPOINTTXHASH: u8 = 0xc8;
pub const OP_OUTPOINTINDEX: u8 = 0xc9;
pub const OP_INPUTBYTECODE: u8 = 0xca;
pub const OP_INPUTSEQUENCENUMBER: u8 = 0xcb;
pub const OP_OUTPUTVALUE: u8 = 0xcc;
pub const OP_OUTPUTBYTECODE: u8 = 0xcd;

// ============================================================================
// TOKEN INTROSPECTION (0xce - 0xd3)
// ============================================================================

pub const OP_UTXOTOKENCATEGORY: u8 = 0xce;
pub const OP_UTXOTOKENCOMMITMENT: u8 = 0xcf;
pub const OP_UTXOTOKENAMOUNT: u8 = 0xd0;
pub const OP_OUTPUTTOKENCATEGORY: u8 = 0xd1;
pub const OP_OUTPUTTOKENCOMMITMENT: u8 = 0xd2;
pub const OP_OUTPUTTOKENAMOUNT: u8 = 0xd3;

/// Opcodes that fail the script wherever they appear, executed or not.
pub fn is_disabled(opcode: u8) -> bool {
    matches!(
        opcode,
        OP_INVERT | OP_2MUL | OP_2DIV | OP_LSHIFT | OP_RSHIFT
    )
}

/// Push opcodes: direct pushes, PUSHDATA1/2/4, OP_1NEGATE, OP_RESERVED and OP_1..OP_16.
///
/// OP_RESERVED counts as a push for push-only checks even though executing it fails.
pub fn is_push(opcode: u8) -> bool {
    opcode <= OP_16
}

/// Small integer value of OP_0 and OP_1..OP_16.
pub fn small_int_value(opcode: u8) -> Option<u8> {
    match opcode {
        OP_0 => Some(0),
        OP_1..=OP_16 => Some(opcode - OP_1 + 1),
        _ => None,
    }
}

const NAMES: &[(u8, &str)] = &[
    (OP_1NEGATE, "OP_1NEGATE"),
    (OP_RESERVED, "OP_RESERVED"),
    (OP_NOP, "OP_NOP"),
    (OP_VER, "OP_VER"),
    (OP_IF, "OP_IF"),
    (OP_NOTIF, "OP_NOTIF"),
    (OP_VERIF, "OP_VERIF"),
    (OP_VERNOTIF, "OP_VERNOTIF"),
    (OP_ELSE, "OP_ELSE"),
    (OP_ENDIF, "OP_ENDIF"),
    (OP_VERIFY, "OP_VERIFY"),
    (OP_RETURN, "OP_RETURN"),
    (OP_TOALTSTACK, "OP_TOALTSTACK"),
    (OP_FROMALTSTACK, "OP_FROMALTSTACK"),
    (OP_2DROP, "OP_2DROP"),
    (OP_2DUP, "OP_2DUP"),
    (OP_3DUP, "OP_3DUP"),
    (OP_2OVER, "OP_2OVER"),
    (OP_2ROT, "OP_2ROT"),
    (OP_2SWAP, "OP_2SWAP"),
    (OP_IFDUP, "OP_IFDUP"),
    (OP_DEPTH, "OP_DEPTH"),
    (OP_DROP, "OP_DROP"),
    (OP_DUP, "OP_DUP"),
    (OP_NIP, "OP_NIP"),
    (OP_OVER, "OP_OVER"),
    (OP_PICK, "OP_PICK"),
    (OP_ROLL, "OP_ROLL"),
    (OP_ROT, "OP_ROT"),
    (OP_SWAP, "OP_SWAP"),
    (OP_TUCK, "OP_TUCK"),
    (OP_CAT, "OP_CAT"),
    (OP_SPLIT, "OP_SPLIT"),
    (OP_NUM2BIN, "OP_NUM2BIN"),
    (OP_BIN2NUM, "OP_BIN2NUM"),
    (OP_SIZE, "OP_SIZE"),
    (OP_INVERT, "OP_INVERT"),
    (OP_AND, "OP_AND"),
    (OP_OR, "OP_OR"),
    (OP_XOR, "OP_XOR"),
    (OP_EQUAL, "OP_EQUAL"),
    (OP_EQUALVERIFY, "OP_EQUALVERIFY"),
    (OP_RESERVED1, "OP_RESERVED1"),
    (OP_RESERVED2, "OP_RESERVED2"),
    (OP_1ADD, "OP_1ADD"),
    (OP_1SUB, "OP_1SUB"),
    (OP_2MUL, "OP_2MUL"),
    (OP_2DIV, "OP_2DIV"),
    (OP_NEGATE, "OP_NEGATE"),
    (OP_ABS, "OP_ABS"),
    (OP_NOT, "OP_NOT"),
    (OP_0NOTEQUAL, "OP_0NOTEQUAL"),
    (OP_ADD, "OP_ADD"),
    (OP_SUB, "OP_SUB"),
    (OP_MUL, "OP_MUL"),
    (OP_DIV, "OP_DIV"),
    (OP_MOD, "OP_MOD"),
    (OP_LSHIFT, "OP_LSHIFT"),
    (OP_RSHIFT, "OP_RSHIFT"),
    (OP_BOOLAND, "OP_BOOLAND"),
    (OP_BOOLOR, "OP_BOOLOR"),
    (OP_NUMEQUAL, "OP_NUMEQUAL"),
    (OP_NUMEQUALVERIFY, "OP_NUMEQUALVERIFY"),
    (OP_NUMNOTEQUAL, "OP_NUMNOTEQUAL"),
    (OP_LESSTHAN, "OP_LESSTHAN"),
    (OP_GREATERTHAN, "OP_GREATERTHAN"),
    (OP_LESSTHANOREQUAL, "OP_LESSTHANOREQUAL"),
    (OP_GREATERTHANOREQUAL, "OP_GREATERTHANOREQUAL"),
    (OP_MIN, "OP_MIN"),
    (OP_MAX, "OP_MAX"),
    (OP_WITHIN, "OP_WITHIN"),
    (OP_RIPEMD160, "OP_RIPEMD160"),
    (OP_SHA1, "OP_SHA1"),
    (OP_SHA256, "OP_SHA256"),
    (OP_HASH160, "OP_HASH160"),
    (OP_HASH256, "OP_HASH256"),
    (OP_CODESEPARATOR, "OP_CODESEPARATOR"),
    (OP_CHECKSIG, "OP_CHECKSIG"),
    (OP_CHECKSIGVERIFY, "OP_CHECKSIGVERIFY"),
    (OP_CHECKMULTISIG, "OP_CHECKMULTISIG"),
    (OP_CHECKMULTISIGVERIFY, "OP_CHECKMULTISIGVERIFY"),
    (OP_NOP1, "OP_NOP1"),
    (OP_CHECKLOCKTIMEVERIFY, "OP_CHECKLOCKTIMEVERIFY"),
    (OP_CHECKSEQUENCEVERIFY, "OP_CHECKSEQUENCEVERIFY"),
    (OP_NOP4, "OP_NOP4"),
    (OP_NOP5, "OP_NOP5"),
    (OP_NOP6, "OP_NOP6"),
    (OP_NOP7, "OP_NOP7"),
    (OP_NOP8, "OP_NOP8"),
    (OP_NOP9, "OP_NOP9"),
    (OP_NOP10, "OP_NOP10"),
    (OP_CHECKDATASIG, "OP_CHECKDATASIG"),
    (OP_CHECKDATASIGVERIFY, "OP_CHECKDATASIGVERIFY"),
    (OP_REVERSEBYTES, "OP_REVERSEBYTES"),
    (OP_INPUTINDEX, "OP_INPUTINDEX"),
    (OP_ACTIVEBYTECODE, "OP_ACTIVEBYTECODE"),
    (OP_TXVERSION, "OP_TXVERSION"),
    (OP_TXINPUTCOUNT, "OP_TXINPUTCOUNT"),
    (OP_TXOUTPUTCOUNT, "OP_TXOUTPUTCOUNT"),
    (OP_TXLOCKTIME, "OP_TXLOCKTIME"),
    (OP_UTXOVALUE, "OP_UTXOVALUE"),
    (OP_UTXOBYTECODE, "OP_UTXOBYTECODE"),
    (OP_OUTPOINTTXHASH, "OP_OUTPOINTTXHASH"),
    (OP_OUTPOINTINDEX, "OP_OUTPOINTINDEX"),
    (OP_INPUTBYTECODE, "OP_INPUTBYTECODE"),
    (OP_INPUTSEQUENCENUMBER, "OP_INPUTSEQUENCENUMBER"),
    (OP_OUTPUTVALUE, "OP_OUTPUTVALUE"),
    (OP_OUTPUTBYTECODE, "OP_OUTPUTBYTECODE"),
    (OP_UTXOTOKENCATEGORY, "OP_UTXOTOKENCATEGORY"),
    (OP_UTXOTOKENCOMMITMENT, "OP_UTXOTOKENCOMMITMENT"),
    (OP_UTXOTOKENAMOUNT, "OP_UTXOTOKENAMOUNT"),
    (OP_OUTPUTTOKENCATEGORY, "OP_OUTPUTTOKENCATEGORY"),
    (OP_OUTPUTTOKENCOMMITMENT, "OP_OUTPUTTOKENCOMMITMENT"),
    (OP_OUTPUTTOKENAMOUNT, "OP_OUTPUTTOKENAMOUNT"),
    (OP_PUSHDATA1, "OP_PUSHDATA1"),
    (OP_PUSHDATA2, "OP_PUSHDATA2"),
    (OP_PUSHDATA4, "OP_PUSHDATA4"),
    (OP_0, "OP_0"),
    (OP_1, "OP_1"),
    (OP_2, "OP_2"),
    (OP_3, "OP_3"),
    (OP_4, "OP_4"),
    (OP_5, "OP_5"),
    (OP_6, "OP_6"),
    (OP_7, "OP_7"),
    (OP_8, "OP_8"),
    (OP_9, "OP_9"),
    (OP_10, "OP_10"),
    (OP_11, "OP_11"),
    (OP_12, "OP_12"),
    (OP_13, "OP_13"),
    (OP_14, "OP_14"),
    (OP_15, "OP_15"),
    (OP_16, "OP_16"),
];

/// Mnemonic for an opcode, `"OP_UNKNOWN"` for unassigned values.
pub fn opcode_name(opcode: u8) -> &'static str {
    match opcode {
        0x01..=OP_PUSHBYTES_75 => "OP_PUSHBYTES",
        _ => NAMES
            .iter()
            .find(|(op, _)| *op == opcode)
            .map_or("OP_UNKNOWN", |(_, name)| name),
    }
}
