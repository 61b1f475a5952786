//! End-to-end input verification with real signatures

mod common;

use cash_consensus::codec::Encodable;
use cash_consensus::context::ScriptExecutionContext;
use cash_consensus::hashing::{double_sha256, sha256};
use cash_consensus::opcodes::*;
use cash_consensus::script::{Script, ScriptBuilder};
use cash_consensus::sighash::*;
use cash_consensus::*;
use common::*;

fn p2pkh_spend(key: &Key, hash_type: u32, flags: u32, schnorr: bool) -> (Transaction, Output) {
    let prevout = Output::new(100_000, p2pkh(&key.pubkey()));
    let mut tx = spending_tx();
    let digest = sighash(&tx, &prevout, prevout.script(), hash_type, flags);
    let raw = if schnorr {
        key.sign_schnorr(&digest)
    } else {
        key.sign_ecdsa(&digest)
    };
    tx.inputs[0].script = ScriptBuilder::new()
        .push_slice(&with_hash_type(raw, hash_type))
        .push_slice(&key.pubkey())
        .into_script();
    (tx, prevout)
}

#[test]
fn test_p2pkh_ecdsa_forkid() {
    let key = Key::new(0x11);
    let (tx, prevout) = p2pkh_spend(&key, SIGHASH_ALL | SIGHASH_FORKID, VERIFY_STANDARD, false);
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_MANDATORY), VerifyResult::Ok);
}

#[test]
fn test_p2pkh_schnorr_forkid() {
    let key = Key::new(0x12);
    let (tx, prevout) = p2pkh_spend(&key, SIGHASH_ALL | SIGHASH_FORKID, VERIFY_STANDARD, true);
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);

    let metrics = verify_script_detailed(&tx, 0, &prevout, VERIFY_STANDARD).unwrap();
    assert_eq!(metrics.sig_checks, 1);
}

#[test]
fn test_tampered_output_fails() {
    let key = Key::new(0x13);
    let (mut tx, prevout) = p2pkh_spend(&key, SIGHASH_ALL | SIGHASH_FORKID, VERIFY_STANDARD, false);
    tx.outputs[0].set_value(89_999);
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::SigNullFail);
    // Without NULLFAIL the failed check just leaves false behind
    let lax = VERIFY_P2SH | VERIFY_STRICTENC | VERIFY_SIGHASH_FORKID;
    assert_eq!(verify(&tx, 0, &prevout, lax), VerifyResult::EvalFalse);
}

#[test]
fn test_wrong_key_fails_equalverify() {
    let key = Key::new(0x14);
    let (tx, _) = p2pkh_spend(&key, SIGHASH_ALL | SIGHASH_FORKID, VERIFY_STANDARD, false);
    let other = Output::new(100_000, p2pkh(&Key::new(0x15).pubkey()));
    assert_eq!(verify(&tx, 0, &other, VERIFY_STANDARD), VerifyResult::EqualVerify);
}

#[test]
fn test_forkid_required() {
    let key = Key::new(0x16);
    // Legacy digest, no FORKID bit
    let (tx, prevout) = p2pkh_spend(&key, SIGHASH_ALL, 0, false);
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::ForkId);
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_P2SH | VERIFY_STRICTENC), VerifyResult::Ok);
}

#[test]
fn test_forkid_illegal_before_activation() {
    let key = Key::new(0x17);
    let hash_type = SIGHASH_ALL | SIGHASH_FORKID;
    // With the FORKID rule off the legacy digest covers the raw 0x41 type
    let (tx, prevout) = p2pkh_spend(&key, hash_type, 0, false);
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_P2SH | VERIFY_STRICTENC), VerifyResult::ForkId);
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_P2SH), VerifyResult::Ok);
}

#[test]
fn test_sighash_single_anyonecanpay() {
    let key = Key::new(0x18);
    let hash_type = SIGHASH_SINGLE | SIGHASH_ANYONECANPAY | SIGHASH_FORKID;
    let (mut tx, prevout) = p2pkh_spend(&key, hash_type, VERIFY_STANDARD, true);
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);

    // Extra inputs and outputs are not covered
    tx.inputs.push(Input {
        prevout: OutPoint {
            hash: [0xcd; 32],
            index: 7,
        },
        script: Script::default(),
        sequence: 0,
    });
    tx.outputs.push(Output::new(1, Script::new(vec![OP_RETURN])));
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);
}

#[test]
fn test_p2sh_schnorr_multisig_bitfield() {
    let keys: Vec<Key> = (0x21..0x24).map(Key::new).collect();
    let redeem = ScriptBuilder::new()
        .push_opcode(OP_2)
        .push_slice(&keys[0].pubkey())
        .push_slice(&keys[1].pubkey())
        .push_slice(&keys[2].pubkey())
        .push_opcode(OP_3)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script();
    let prevout = Output::new(50_000, p2sh(&redeem));
    let hash_type = SIGHASH_ALL | SIGHASH_FORKID;

    let build = |bitfield: i64| {
        let mut tx = spending_tx();
        let digest = sighash(&tx, &prevout, &redeem, hash_type, VERIFY_STANDARD);
        tx.inputs[0].script = ScriptBuilder::new()
            .push_int(bitfield)
            .push_slice(&with_hash_type(keys[0].sign_schnorr(&digest), hash_type))
            .push_slice(&with_hash_type(keys[2].sign_schnorr(&digest), hash_type))
            .push_slice(redeem.as_bytes())
            .into_script();
        tx
    };

    // Keys 0 and 2 signed: bits 0b101
    let tx = build(0b101);
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);
    let metrics = verify_script_detailed(&tx, 0, &prevout, VERIFY_STANDARD).unwrap();
    assert_eq!(metrics.sig_checks, 2);

    // Three bits for two signatures
    let tx = build(0b111);
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::InvalidOperand);

    // Bits select the wrong keys
    let tx = build(0b011);
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::SigNullFail);
}

#[test]
fn test_bare_legacy_multisig() {
    let keys = [Key::new(0x31), Key::new(0x32)];
    let script_pubkey = ScriptBuilder::new()
        .push_opcode(OP_1)
        .push_slice(&keys[0].pubkey())
        .push_slice(&keys[1].pubkey())
        .push_opcode(OP_2)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script();
    let prevout = Output::new(50_000, script_pubkey.clone());
    let hash_type = SIGHASH_ALL | SIGHASH_FORKID;

    let mut tx = spending_tx();
    let digest = sighash(&tx, &prevout, &script_pubkey, hash_type, VERIFY_STANDARD);
    tx.inputs[0].script = ScriptBuilder::new()
        .push_opcode(OP_0)
        .push_slice(&with_hash_type(keys[1].sign_ecdsa(&digest), hash_type))
        .into_script();

    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);
    // Legacy mode charges one check per key
    let metrics = verify_script_detailed(&tx, 0, &prevout, VERIFY_STANDARD).unwrap();
    assert_eq!(metrics.sig_checks, 2);
}

#[test]
fn test_checkdatasig() {
    let key = Key::new(0x41);
    let message = b"oracle price 42".to_vec();
    let script_pubkey = ScriptBuilder::new()
        .push_slice(&message)
        .push_slice(&key.pubkey())
        .push_opcode(OP_CHECKDATASIG)
        .into_script();
    let prevout = Output::new(10_000, script_pubkey);
    let digest = sha256(&message);

    for sig in [key.sign_ecdsa(&digest), key.sign_schnorr(&digest)] {
        let mut tx = spending_tx();
        tx.inputs[0].script = ScriptBuilder::new().push_slice(&sig).into_script();
        assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);
    }

    let mut tx = spending_tx();
    let wrong = key.sign_schnorr(&sha256(b"another message"));
    tx.inputs[0].script = ScriptBuilder::new().push_slice(&wrong).into_script();
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::SigNullFail);
}

#[test]
fn test_checklocktimeverify_spend() {
    let script_pubkey = ScriptBuilder::new()
        .push_int(100)
        .push_opcode(OP_CHECKLOCKTIMEVERIFY)
        .push_opcode(OP_DROP)
        .push_opcode(OP_1)
        .into_script();
    let prevout = Output::new(10_000, script_pubkey);

    let mut tx = spending_tx();
    tx.lock_time = 100;
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);

    tx.lock_time = 99;
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::UnsatisfiedLocktime);

    // Time-based lock cannot satisfy a height-based operand
    tx.lock_time = LOCKTIME_THRESHOLD + 1;
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::UnsatisfiedLocktime);
}

#[test]
fn test_checksequenceverify_spend() {
    let script_pubkey = ScriptBuilder::new()
        .push_int(10)
        .push_opcode(OP_CHECKSEQUENCEVERIFY)
        .push_opcode(OP_DROP)
        .push_opcode(OP_1)
        .into_script();
    let prevout = Output::new(10_000, script_pubkey);

    let mut tx = spending_tx();
    tx.inputs[0].sequence = 10;
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);
    tx.inputs[0].sequence = 9;
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::UnsatisfiedLocktime);
    tx.inputs[0].sequence = 10;
    tx.version = 1;
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::UnsatisfiedLocktime);
}

#[test]
fn test_output_value_covenant() {
    let script_pubkey = ScriptBuilder::new()
        .push_opcode(OP_0)
        .push_opcode(OP_OUTPUTVALUE)
        .push_int(90_000)
        .push_opcode(OP_GREATERTHANOREQUAL)
        .into_script();
    let prevout = Output::new(100_000, script_pubkey);

    let mut tx = spending_tx();
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);
    tx.outputs[0].set_value(80_000);
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::EvalFalse);
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_P2SH), VerifyResult::BadOpcode);
}

#[test]
fn test_token_amount_introspection() {
    let script_pubkey = ScriptBuilder::new()
        .push_opcode(OP_INPUTINDEX)
        .push_opcode(OP_UTXOTOKENAMOUNT)
        .push_opcode(OP_5)
        .push_opcode(OP_NUMEQUAL)
        .into_script();
    let prevout = Output::with_token(
        1000,
        script_pubkey,
        TokenData::fungible([0x42; 32], 5),
    );
    let tx = spending_tx();
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);
    assert_eq!(
        verify(&tx, 0, &prevout, VERIFY_STANDARD & !VERIFY_TOKENS),
        VerifyResult::BadOpcode
    );
}

#[test]
fn test_token_category_introspection() {
    let category = [0x24; 32];
    let mut expected = category.to_vec();
    expected.push(Capability::Minting.to_byte());
    let script_pubkey = ScriptBuilder::new()
        .push_opcode(OP_0)
        .push_opcode(OP_UTXOTOKENCATEGORY)
        .push_slice(&expected)
        .push_opcode(OP_EQUAL)
        .into_script();
    let prevout = Output::with_token(
        1000,
        script_pubkey,
        TokenData::non_fungible(category, Capability::Minting, vec![1, 2, 3]),
    );
    assert_eq!(verify(&spending_tx(), 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);
}

#[test]
fn test_sighash_utxos_needs_all_spent_outputs() {
    let key = Key::new(0x51);
    let prevout = Output::new(100_000, p2pkh(&key.pubkey()));
    let spent = vec![prevout.clone()];
    let hash_type = SIGHASH_ALL | SIGHASH_UTXOS | SIGHASH_FORKID;

    let mut tx = spending_tx();
    let ctx = ScriptExecutionContext::with_spent_outputs(&tx, 0, &spent).unwrap();
    let digest = compute_sighash(
        &ctx,
        prevout.script(),
        SigHashType::from_raw(hash_type),
        ScriptFlags::from_verify_flags(VERIFY_STANDARD),
    )
    .unwrap();
    tx.inputs[0].script = ScriptBuilder::new()
        .push_slice(&with_hash_type(key.sign_schnorr(&digest), hash_type))
        .push_slice(&key.pubkey())
        .into_script();

    assert_eq!(
        verify_with_spent_outputs(&tx, 0, &spent, VERIFY_STANDARD),
        VerifyResult::Ok
    );
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::Introspection);
    assert_eq!(
        verify_with_spent_outputs(&tx, 0, &spent, VERIFY_STANDARD & !VERIFY_TOKENS),
        VerifyResult::SigHashType
    );
}

#[test]
fn test_custom_fork_id() {
    let key = Key::new(0x61);
    let fork_id = 0x00beef;
    let prevout = Output::new(100_000, p2pkh(&key.pubkey()));
    let hash_type = SIGHASH_ALL | SIGHASH_FORKID;

    let mut tx = spending_tx();
    let ctx = ScriptExecutionContext::new(&tx, 0, &prevout).unwrap();
    let digest = compute_sighash(
        &ctx,
        prevout.script(),
        SigHashType::from_raw(hash_type).with_fork_value(fork_id),
        ScriptFlags::from_verify_flags(VERIFY_STANDARD),
    )
    .unwrap();
    tx.inputs[0].script = ScriptBuilder::new()
        .push_slice(&with_hash_type(key.sign_ecdsa(&digest), hash_type))
        .push_slice(&key.pubkey())
        .into_script();

    let config = ConsensusConfig {
        fork_id,
        ..ConsensusConfig::default()
    };
    let engine = CashConsensus::with_config(config).unwrap();
    assert_eq!(engine.verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);
    // A replayed signature under the default fork value fails
    assert_eq!(verify(&tx, 0, &prevout, VERIFY_STANDARD), VerifyResult::SigNullFail);
}

#[test]
fn test_p2sh32() {
    let redeem = Script::new(vec![OP_0]);
    let script_pubkey = ScriptBuilder::new()
        .push_opcode(OP_HASH256)
        .push_slice(&double_sha256(redeem.as_bytes()))
        .push_opcode(OP_EQUAL)
        .into_script();
    let prevout = Output::new(1000, script_pubkey);
    let mut tx = spending_tx();
    tx.inputs[0].script = ScriptBuilder::new().push_slice(redeem.as_bytes()).into_script();

    assert_eq!(verify(&tx, 0, &prevout, VERIFY_P2SH), VerifyResult::Ok);
    assert_eq!(
        verify(&tx, 0, &prevout, VERIFY_P2SH | VERIFY_P2SH_32),
        VerifyResult::EvalFalse
    );
}

#[test]
fn test_verify_bytes_round_trip() {
    let key = Key::new(0x71);
    let (tx, prevout) = p2pkh_spend(&key, SIGHASH_ALL | SIGHASH_FORKID, VERIFY_STANDARD, true);
    let bytes = Encodable::to_bytes(&tx);
    assert_eq!(verify_bytes(&bytes, 0, &prevout, VERIFY_STANDARD), VerifyResult::Ok);
    assert_eq!(verify_bytes(&bytes, 1, &prevout, VERIFY_STANDARD), VerifyResult::TxInputIndex);
    assert_eq!(
        verify_bytes(&bytes[..bytes.len() - 1], 0, &prevout, VERIFY_STANDARD),
        VerifyResult::TxInvalid
    );
}

#[test]
fn test_concurrent_verification() {
    let engine = &CashConsensus::new();
    let spends: Vec<(Transaction, Output)> = (0x81..0x89)
        .map(|seed| {
            let hash_type = SIGHASH_ALL | SIGHASH_FORKID;
            p2pkh_spend(&Key::new(seed), hash_type, VERIFY_STANDARD, seed % 2 == 0)
        })
        .collect();

    std::thread::scope(|scope| {
        let handles: Vec<_> = spends
            .iter()
            .map(|(tx, prevout)| scope.spawn(move || engine.verify(tx, 0, prevout, VERIFY_STANDARD)))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), VerifyResult::Ok);
        }
    });
}
