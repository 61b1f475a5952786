//! Context-free script evaluation

use cash_consensus::interpreter::eval_script;
use cash_consensus::opcodes::*;
use cash_consensus::script::ScriptBuilder;
use cash_consensus::*;

fn script(ops: &[u8]) -> Script {
    Script::new(ops.to_vec())
}

fn run(script_pubkey: &Script, flags: u32) -> std::result::Result<ExecutionMetrics, ScriptError> {
    let verifier = Secp256k1Verifier::new();
    Interpreter::new(ScriptFlags::from_verify_flags(flags), &verifier)
        .verify_script(&Script::default(), script_pubkey)
}

#[test]
fn test_equal_leaves_single_true() {
    let mut stack = Vec::new();
    eval_script(
        &script(&[OP_1, OP_1, OP_EQUAL]),
        &mut stack,
        ScriptFlags::from_verify_flags(VERIFY_STANDARD),
    )
    .unwrap();
    assert_eq!(stack, vec![vec![1u8]]);

    assert!(run(&script(&[OP_1, OP_1, OP_EQUAL]), VERIFY_STANDARD).is_ok());
}

#[test]
fn test_add_then_equal() {
    assert!(run(&script(&[OP_1, OP_2, OP_ADD, OP_3, OP_EQUAL]), VERIFY_STANDARD).is_ok());
    assert_eq!(
        run(&script(&[OP_1, OP_2, OP_ADD, OP_4, OP_EQUAL]), VERIFY_STANDARD),
        Err(ScriptError::EvalFalse)
    );
}

#[test]
fn test_false_result_differs_from_execution_error() {
    assert_eq!(run(&script(&[OP_0]), VERIFY_NONE), Err(ScriptError::EvalFalse));
    assert_eq!(run(&script(&[OP_ADD]), VERIFY_NONE), Err(ScriptError::InvalidStackOperation));
    assert_eq!(run(&Script::default(), VERIFY_NONE), Err(ScriptError::EvalFalse));
}

#[test]
fn test_op_count_limit() {
    let mut ops = vec![OP_1];
    ops.extend(std::iter::repeat(OP_NOP).take(201));
    assert!(run(&script(&ops), VERIFY_NONE).is_ok());

    ops.push(OP_NOP);
    assert_eq!(run(&script(&ops), VERIFY_NONE), Err(ScriptError::OpCount));
}

#[test]
fn test_pushes_do_not_count_as_ops() {
    let mut builder = ScriptBuilder::new();
    for i in 0..300 {
        builder = builder.push_int(i % 16 + 1);
    }
    let mut stack = Vec::new();
    eval_script(&builder.into_script(), &mut stack, ScriptFlags::empty()).unwrap();
    assert_eq!(stack.len(), 300);
}

#[test]
fn test_cleanstack_requires_one_element() {
    let two = script(&[OP_1, OP_1]);
    assert!(run(&two, VERIFY_NONE).is_ok());
    assert_eq!(
        run(&two, VERIFY_P2SH | VERIFY_CLEANSTACK),
        Err(ScriptError::CleanStack)
    );
}

#[test]
fn test_disabled_opcode_in_unexecuted_branch() {
    let ops = script(&[OP_0, OP_IF, OP_INVERT, OP_ENDIF, OP_1]);
    assert_eq!(run(&ops, VERIFY_NONE), Err(ScriptError::DisabledOpcode));
}

#[test]
fn test_engine_eval_script_respects_config() {
    let engine = CashConsensus::new();
    let stack = engine
        .eval_script(&script(&[OP_2, OP_3, OP_MUL]), VERIFY_STANDARD)
        .unwrap();
    assert_eq!(stack, vec![vec![6u8]]);

    let mut config = ConsensusConfig::default();
    config.limits.max_ops = 1;
    let engine = CashConsensus::with_config(config).unwrap();
    assert_eq!(
        engine.eval_script(&script(&[OP_1, OP_NOP, OP_NOP]), VERIFY_NONE),
        Err(ScriptError::OpCount)
    );
}

#[test]
fn test_big_integer_arithmetic_under_may2025() {
    let big = ScriptBuilder::new()
        .push_slice(&[0xff; 9])
        .push_slice(&[0xff; 9])
        .push_opcode(OP_MUL)
        .push_opcode(OP_SIZE)
        .push_int(18)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_DROP)
        .push_opcode(OP_1)
        .into_script();
    assert!(run(&big, VERIFY_STANDARD).is_ok());
    assert_eq!(
        run(&big, VERIFY_STANDARD & !VERIFY_MAY2025),
        Err(ScriptError::InvalidNumberRange)
    );
}
