//! Script execution engine
//!
//! EvalScript: 𝕊 × 𝒮𝒯 × ℱ → 𝒮𝒯 | ScriptError
//!
//! Script execution follows a stack-based virtual machine:
//! 1. Fetch the next instruction from the lazy instruction sequence
//! 2. Enforce push size, operation count and opcode availability, executed or not
//! 3. Execute the opcode when every enclosing IF branch is taken
//! 4. Enforce stack depth and the operation cost budget after every step
//! 5. At the end every IF must be closed
//!
//! VerifyScript runs the unlocking script, the locking script and, for P2SH,
//! the redeem script, sharing one [`ExecutionMetrics`] across all three.

use crate::config::ScriptLimits;
use crate::constants::*;
use crate::context::ScriptExecutionContext;
use crate::error::ScriptError;
use crate::flags::ScriptFlags;
use crate::hashing::{digest_iterations, double_sha256, hash160, ripemd160, sha1, sha256};
use crate::num::{cast_to_bool, minimally_encode, NumberLimits, ScriptNum};
use crate::opcodes::*;
use crate::script::{Script, ScriptBuilder};
use crate::sighash::{compute_sighash, SigHashType};
use crate::signature::{
    check_data_signature_encoding, check_pubkey_encoding, check_transaction_ecdsa_signature_encoding,
    check_transaction_schnorr_signature_encoding, check_transaction_signature_encoding,
    Secp256k1Verifier, SignatureScheme, SignatureVerifier,
};
use crate::token::TokenData;
use crate::types::ByteString;
use log::trace;

/// Main and alternate stack element type.
pub type Stack = Vec<ByteString>;

/// Work performed while verifying one input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionMetrics {
    /// Signature checks, counted the way the SigChecks limit counts them
    pub sig_checks: u64,
    /// Accumulated operation cost (only charged under the May 2025 rules)
    pub op_cost: u64,
    /// Hash compression-function iterations
    pub hash_iterations: u64,
}

/// Evaluates scripts under one rule set for one input.
///
/// Holds only borrowed, immutable data: a single interpreter may be shared by
/// reference across threads, and every evaluation allocates its own stacks.
pub struct Interpreter<'a> {
    flags: ScriptFlags,
    limits: ScriptLimits,
    fork_id: u32,
    verifier: &'a dyn SignatureVerifier,
    context: Option<ScriptExecutionContext<'a>>,
}

impl<'a> Interpreter<'a> {
    /// Interpreter with consensus limits and no transaction context.
    pub fn new(flags: ScriptFlags, verifier: &'a dyn SignatureVerifier) -> Self {
        Self {
            flags,
            limits: ScriptLimits::default(),
            fork_id: 0,
            verifier,
            context: None,
        }
    }

    /// Attach the transaction being validated.
    pub fn with_context(mut self, context: ScriptExecutionContext<'a>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_limits(mut self, limits: ScriptLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_fork_id(mut self, fork_id: u32) -> Self {
        self.fork_id = fork_id;
        self
    }

    pub fn flags(&self) -> ScriptFlags {
        self.flags
    }

    pub fn context(&self) -> Option<&ScriptExecutionContext<'a>> {
        self.context.as_ref()
    }

    fn script_sig_len(&self) -> u64 {
        self.context
            .map_or(0, |ctx| ctx.input().script.len() as u64)
    }

    /// Operation cost allowance: `(41 + unlocking script length) * 800`.
    pub fn op_cost_budget(&self) -> u64 {
        (OPCOST_FIXED_BYTES + self.script_sig_len()) * OPCOST_BUDGET_PER_BYTE
    }

    /// Hash digest iteration allowance: `(41 + unlocking script length) * 7 / 2`.
    pub fn hash_iteration_limit(&self) -> u64 {
        (OPCOST_FIXED_BYTES + self.script_sig_len()) * HASH_ITERATIONS_PER_BYTE_NUMERATOR
            / HASH_ITERATIONS_PER_BYTE_DENOMINATOR
    }

    fn number_limits(&self) -> NumberLimits {
        if self.flags.contains(ScriptFlags::MAY2025) {
            let size = self.limits.may2025_max_element_size;
            NumberLimits {
                operand_size: size,
                result_size: Some(size),
            }
        } else if self.flags.contains(ScriptFlags::INTEGERS_64_BIT) {
            NumberLimits {
                operand_size: BIG_SCRIPTNUM_SIZE,
                result_size: Some(BIG_SCRIPTNUM_SIZE),
            }
        } else {
            NumberLimits {
                operand_size: DEFAULT_SCRIPTNUM_SIZE,
                result_size: None,
            }
        }
    }

    fn max_element_size(&self) -> usize {
        if self.flags.contains(ScriptFlags::MAY2025) {
            self.limits.may2025_max_element_size
        } else {
            self.limits.max_element_size
        }
    }

    /// Execute `script` on `stack`.
    pub fn eval_script(
        &self,
        stack: &mut Stack,
        script: &Script,
        metrics: &mut ExecutionMetrics,
    ) -> Result<(), ScriptError> {
        if script.len() > self.limits.max_script_size {
            return Err(ScriptError::ScriptSize);
        }
        let mut machine = Machine {
            interp: self,
            script,
            stack,
            altstack: Vec::new(),
            exec_stack: Vec::new(),
            op_count: 0,
            code_start: 0,
            metrics,
            may2025: self.flags.contains(ScriptFlags::MAY2025),
            minimal: self.flags.contains(ScriptFlags::MINIMALDATA),
            max_element: self.max_element_size(),
            numbers: self.number_limits(),
            budget: self.op_cost_budget(),
            hash_limit: self.hash_iteration_limit(),
        };
        machine.run()
    }

    /// VerifyScript: 𝕊 × 𝕊 × ℱ → ExecutionMetrics | ScriptError
    ///
    /// 1. Run the unlocking script on an empty stack
    /// 2. Run the locking script on the result; the top element must be true
    /// 3. For P2SH, run the redeem script on a copy of the unlocking result
    /// 4. Apply CLEANSTACK and the SigChecks density limit
    pub fn verify_script(
        &self,
        script_sig: &Script,
        script_pubkey: &Script,
    ) -> Result<ExecutionMetrics, ScriptError> {
        let flags = self.flags;
        let mut metrics = ExecutionMetrics::default();

        if flags.contains(ScriptFlags::SIGPUSHONLY) && !script_sig.is_push_only() {
            return Err(ScriptError::SigPushOnly);
        }

        let mut stack = Stack::new();
        self.eval_script(&mut stack, script_sig, &mut metrics)?;

        let stack_copy = if flags.contains(ScriptFlags::P2SH) {
            stack.clone()
        } else {
            Stack::new()
        };

        self.eval_script(&mut stack, script_pubkey, &mut metrics)?;
        require_true(&stack)?;

        let is_p2sh = flags.contains(ScriptFlags::P2SH)
            && (script_pubkey.is_p2sh20()
                || (flags.contains(ScriptFlags::P2SH_32) && script_pubkey.is_p2sh32()));

        if is_p2sh {
            if !script_sig.is_push_only() {
                return Err(ScriptError::SigPushOnly);
            }
            stack = stack_copy;

            // A lone witness program redeem script is an exempt recovery spend
            if !flags.contains(ScriptFlags::DISALLOW_SEGWIT_RECOVERY)
                && stack.len() == 1
                && Script::from_slice(&stack[0]).is_witness_program()
            {
                return Ok(metrics);
            }

            self.eval_redeem_script(&mut stack, &mut metrics, 1)?;
        }

        if flags.contains(ScriptFlags::CLEANSTACK) && stack.len() != 1 {
            return Err(ScriptError::CleanStack);
        }

        if flags.contains(ScriptFlags::INPUT_SIGCHECKS) {
            let allowed = script_sig.len() as i64;
            let used = metrics.sig_checks as i64 * SIGCHECKS_DENSITY_FACTOR - SIGCHECKS_DENSITY_BONUS;
            if used > allowed {
                return Err(ScriptError::InputSigChecks);
            }
        }

        Ok(metrics)
    }

    fn eval_redeem_script(
        &self,
        stack: &mut Stack,
        metrics: &mut ExecutionMetrics,
        depth: usize,
    ) -> Result<(), ScriptError> {
        if depth > 1 {
            return Err(ScriptError::P2SHRecursion);
        }
        let serialized = stack.pop().ok_or(ScriptError::InvalidStackOperation)?;
        let redeem_script = Script::new(serialized);
        self.eval_script(stack, &redeem_script, metrics)?;
        require_true(stack)
    }
}

fn require_true(stack: &Stack) -> Result<(), ScriptError> {
    match stack.last() {
        Some(top) if cast_to_bool(top) => Ok(()),
        _ => Err(ScriptError::EvalFalse),
    }
}

/// Evaluate a script without transaction context using the default verifier.
pub fn eval_script(script: &Script, stack: &mut Stack, flags: ScriptFlags) -> Result<(), ScriptError> {
    let verifier = Secp256k1Verifier::new();
    let mut metrics = ExecutionMetrics::default();
    Interpreter::new(flags, &verifier).eval_script(stack, script, &mut metrics)
}

/// Stack machine state for one script evaluation.
struct Machine<'m, 'a> {
    interp: &'m Interpreter<'a>,
    script: &'m Script,
    stack: &'m mut Stack,
    altstack: Stack,
    /// Branch-taken flag per open IF
    exec_stack: Vec<bool>,
    op_count: usize,
    /// Offset just past the last executed OP_CODESEPARATOR
    code_start: usize,
    metrics: &'m mut ExecutionMetrics,
    may2025: bool,
    minimal: bool,
    max_element: usize,
    numbers: NumberLimits,
    budget: u64,
    hash_limit: u64,
}

impl<'m, 'a> Machine<'m, 'a> {
    fn run(&mut self) -> Result<(), ScriptError> {
        let script = self.script;
        let mut instructions = script.instructions();
        while let Some(item) = instructions.next() {
            let instruction = item?;
            let opcode = instruction.opcode;
            let executing = self.exec_stack.iter().all(|taken| *taken);

            self.step(opcode, instruction.data, instruction.is_minimal_push(), executing, instructions.position())
                .map_err(|err| {
                    trace!(
                        "script failed at offset {} on {}: {}",
                        instruction.position,
                        opcode_name(opcode),
                        err
                    );
                    err
                })?;
        }

        if !self.exec_stack.is_empty() {
            return Err(ScriptError::UnbalancedConditional);
        }
        Ok(())
    }

    fn step(
        &mut self,
        opcode: u8,
        data: Option<&[u8]>,
        minimal_push: bool,
        executing: bool,
        next_position: usize,
    ) -> Result<(), ScriptError> {
        if let Some(data) = data {
            if data.len() > self.max_element {
                return Err(ScriptError::PushSize);
            }
        }

        if self.may2025 {
            self.metrics.op_cost += OPCOST_BASE_INSTRUCTION;
        }

        // Count non-push operations, executed or not
        if opcode > OP_16 {
            self.op_count += 1;
            if !self.may2025 && self.op_count > self.interp.limits.max_ops {
                return Err(ScriptError::OpCount);
            }
        }

        if self.is_disabled(opcode) {
            return Err(ScriptError::DisabledOpcode);
        }

        if executing && opcode <= OP_PUSHDATA4 {
            if self.minimal && !minimal_push {
                return Err(ScriptError::MinimalData);
            }
            self.push(data.unwrap_or_default().to_vec());
        } else if executing || (OP_IF..=OP_ENDIF).contains(&opcode) {
            self.execute_opcode(opcode, executing, next_position)?;
        }

        if self.stack.len() + self.altstack.len() > self.interp.limits.max_stack_size {
            return Err(ScriptError::StackSize);
        }
        if self.may2025 && self.metrics.op_cost > self.budget {
            return Err(ScriptError::OpCost);
        }
        Ok(())
    }

    fn is_disabled(&self, opcode: u8) -> bool {
        is_disabled(opcode)
            || (opcode == OP_MUL && !self.flag(ScriptFlags::INTEGERS_64_BIT) && !self.may2025)
    }

    fn flag(&self, flag: ScriptFlags) -> bool {
        self.interp.flags.contains(flag)
    }

    fn context(&self) -> Result<ScriptExecutionContext<'a>, ScriptError> {
        self.interp.context.ok_or(ScriptError::ContextUnavailable)
    }

    // ------------------------------------------------------------------
    // Stack helpers
    // ------------------------------------------------------------------

    fn require(&self, depth: usize) -> Result<(), ScriptError> {
        if self.stack.len() < depth {
            return Err(ScriptError::InvalidStackOperation);
        }
        Ok(())
    }

    /// Element `depth` positions from the top (1 = top).
    fn top(&self, depth: usize) -> Result<&ByteString, ScriptError> {
        self.require(depth)?;
        Ok(&self.stack[self.stack.len() - depth])
    }

    fn pop(&mut self) -> Result<ByteString, ScriptError> {
        self.stack.pop().ok_or(ScriptError::InvalidStackOperation)
    }

    fn push(&mut self, value: ByteString) {
        if self.may2025 {
            self.metrics.op_cost += value.len() as u64;
        }
        self.stack.push(value);
    }

    fn push_bool(&mut self, value: bool) {
        self.push(if value { vec![1] } else { Vec::new() });
    }

    /// Push data whose size is not bounded by its inputs.
    fn push_checked(&mut self, value: ByteString) -> Result<(), ScriptError> {
        if value.len() > self.max_element {
            return Err(ScriptError::PushSize);
        }
        self.push(value);
        Ok(())
    }

    fn push_num(&mut self, value: ScriptNum) -> Result<(), ScriptError> {
        let value = value.check_result(self.numbers)?;
        self.push(value.encode());
        Ok(())
    }

    fn pop_num(&mut self) -> Result<ScriptNum, ScriptError> {
        let top = self.pop()?;
        ScriptNum::decode(&top, self.minimal, self.numbers.operand_size)
    }

    fn pop_index(&mut self) -> Result<i64, ScriptError> {
        Ok(self.pop_num()?.to_i64_saturating())
    }

    fn charge_hash(&mut self, message_len: usize, two_rounds: bool) -> Result<(), ScriptError> {
        let iterations = digest_iterations(message_len) + u64::from(two_rounds);
        self.metrics.hash_iterations += iterations;
        if self.may2025 {
            self.metrics.op_cost += iterations * OPCOST_HASH_ITERATION;
            if self.metrics.hash_iterations > self.hash_limit {
                return Err(ScriptError::HashIterations);
            }
        }
        Ok(())
    }

    fn count_sig_checks(&mut self, count: u64) {
        self.metrics.sig_checks += count;
        if self.may2025 {
            self.metrics.op_cost += count * OPCOST_SIGCHECK;
        }
    }

    fn upgradable_nop(&self) -> Result<(), ScriptError> {
        if self.flag(ScriptFlags::DISCOURAGE_UPGRADABLE_NOPS) {
            return Err(ScriptError::DiscourageUpgradableNops);
        }
        Ok(())
    }

    fn verify_top(&mut self, error: ScriptError) -> Result<(), ScriptError> {
        if cast_to_bool(self.top(1)?) {
            self.pop()?;
            Ok(())
        } else {
            Err(error)
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn execute_opcode(
        &mut self,
        opcode: u8,
        executing: bool,
        next_position: usize,
    ) -> Result<(), ScriptError> {
        match opcode {
            // OP_1NEGATE, OP_1 to OP_16 - push small numbers
            OP_1NEGATE => self.push_num(ScriptNum::from_i64(-1))?,
            OP_1..=OP_16 => self.push_num(ScriptNum::from_i64(i64::from(opcode - OP_1 + 1)))?,

            // OP_NOP and upgradable NOPs
            OP_NOP => {}
            OP_NOP1 | OP_NOP4 | OP_NOP5 | OP_NOP6 | OP_NOP7 | OP_NOP8 | OP_NOP9 | OP_NOP10 => {
                self.upgradable_nop()?
            }

            // OP_IF / OP_NOTIF - open a branch, taken when the popped value is true (false)
            OP_IF | OP_NOTIF => {
                let mut taken = false;
                if executing {
                    let condition = self.pop().map_err(|_| ScriptError::UnbalancedConditional)?;
                    taken = cast_to_bool(&condition);
                    if opcode == OP_NOTIF {
                        taken = !taken;
                    }
                }
                self.exec_stack.push(taken);
                if self.may2025 && self.exec_stack.len() > self.interp.limits.max_conditional_depth {
                    return Err(ScriptError::ConditionalStackDepth);
                }
            }
            // OP_ELSE - flip the innermost branch
            OP_ELSE => {
                let last = self
                    .exec_stack
                    .last_mut()
                    .ok_or(ScriptError::UnbalancedConditional)?;
                *last = !*last;
            }
            // OP_ENDIF - close the innermost branch
            OP_ENDIF => {
                self.exec_stack
                    .pop()
                    .ok_or(ScriptError::UnbalancedConditional)?;
            }
            // OP_VERIFY - fail unless the top stack item is true
            OP_VERIFY => self.verify_top(ScriptError::Verify)?,
            // OP_RETURN - always fail
            OP_RETURN => return Err(ScriptError::OpReturn),

            OP_TOALTSTACK..=OP_TUCK => self.execute_stack_op(opcode)?,
            OP_CAT..=OP_SIZE | OP_REVERSEBYTES => self.execute_splice_op(opcode)?,
            OP_AND | OP_OR | OP_XOR | OP_EQUAL | OP_EQUALVERIFY => self.execute_bitwise_op(opcode)?,
            OP_1ADD..=OP_WITHIN => self.execute_arithmetic_op(opcode)?,

            OP_RIPEMD160 | OP_SHA1 | OP_SHA256 | OP_HASH160 | OP_HASH256 => {
                self.execute_hash_op(opcode)?
            }
            // OP_CODESEPARATOR - signatures commit to the script from here on
            OP_CODESEPARATOR => self.code_start = next_position,
            OP_CHECKSIG | OP_CHECKSIGVERIFY => self.execute_checksig(opcode)?,
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => self.execute_checkmultisig(opcode)?,
            OP_CHECKDATASIG | OP_CHECKDATASIGVERIFY => self.execute_checkdatasig(opcode)?,

            OP_CHECKLOCKTIMEVERIFY => self.execute_checklocktimeverify()?,
            OP_CHECKSEQUENCEVERIFY => self.execute_checksequenceverify()?,

            OP_INPUTINDEX..=OP_OUTPUTBYTECODE => {
                if !self.flag(ScriptFlags::NATIVE_INTROSPECTION) {
                    return Err(ScriptError::BadOpcode);
                }
                self.execute_introspection(opcode)?
            }
            OP_UTXOTOKENCATEGORY..=OP_OUTPUTTOKENAMOUNT => {
                if !self.flag(ScriptFlags::TOKENS) {
                    return Err(ScriptError::BadOpcode);
                }
                self.execute_token_introspection(opcode)?
            }

            // OP_RESERVED, OP_VER, OP_VERIF, OP_VERNOTIF, OP_RESERVED1/2 and unassigned
            _ => return Err(ScriptError::BadOpcode),
        }
        Ok(())
    }

    fn execute_stack_op(&mut self, opcode: u8) -> Result<(), ScriptError> {
        match opcode {
            // OP_TOALTSTACK - move top item to the alt stack
            OP_TOALTSTACK => {
                let value = self.pop()?;
                self.altstack.push(value);
            }
            // OP_FROMALTSTACK - move top alt stack item back
            OP_FROMALTSTACK => {
                let value = self
                    .altstack
                    .pop()
                    .ok_or(ScriptError::InvalidAltstackOperation)?;
                self.push(value);
            }
            // OP_2DROP - remove top 2 stack items
            OP_2DROP => {
                self.require(2)?;
                self.stack.truncate(self.stack.len() - 2);
            }
            // OP_2DUP - duplicate top 2 stack items
            OP_2DUP => {
                let (a, b) = (self.top(2)?.clone(), self.top(1)?.clone());
                self.push(a);
                self.push(b);
            }
            // OP_3DUP - duplicate top 3 stack items
            OP_3DUP => {
                let (a, b, c) = (self.top(3)?.clone(), self.top(2)?.clone(), self.top(1)?.clone());
                self.push(a);
                self.push(b);
                self.push(c);
            }
            // OP_2OVER - copy second pair of stack items to top
            OP_2OVER => {
                let (a, b) = (self.top(4)?.clone(), self.top(3)?.clone());
                self.push(a);
                self.push(b);
            }
            // OP_2ROT - move third pair of stack items to top
            OP_2ROT => {
                self.require(6)?;
                let at = self.stack.len() - 6;
                let a = self.stack.remove(at);
                let b = self.stack.remove(at);
                self.push(a);
                self.push(b);
            }
            // OP_2SWAP - swap top two pairs
            OP_2SWAP => {
                self.require(4)?;
                let len = self.stack.len();
                self.stack.swap(len - 4, len - 2);
                self.stack.swap(len - 3, len - 1);
            }
            // OP_IFDUP - duplicate top stack item if it's non-zero
            OP_IFDUP => {
                let top = self.top(1)?.clone();
                if cast_to_bool(&top) {
                    self.push(top);
                }
            }
            // OP_DEPTH - push stack size
            OP_DEPTH => {
                let depth = ScriptNum::from_u64(self.stack.len() as u64);
                self.push_num(depth)?;
            }
            // OP_DROP - remove top stack item
            OP_DROP => {
                self.pop()?;
            }
            // OP_DUP - duplicate top stack item
            OP_DUP => {
                let top = self.top(1)?.clone();
                self.push(top);
            }
            // OP_NIP - remove second-to-top stack item
            OP_NIP => {
                self.require(2)?;
                let at = self.stack.len() - 2;
                self.stack.remove(at);
            }
            // OP_OVER - copy second-to-top stack item to top
            OP_OVER => {
                let second = self.top(2)?.clone();
                self.push(second);
            }
            // OP_PICK / OP_ROLL - copy (move) the nth stack item to top
            OP_PICK | OP_ROLL => {
                self.require(2)?;
                let n = self.pop_index()?;
                if n < 0 || n as u64 >= self.stack.len() as u64 {
                    return Err(ScriptError::InvalidStackOperation);
                }
                let at = self.stack.len() - 1 - n as usize;
                let value = if opcode == OP_ROLL {
                    self.stack.remove(at)
                } else {
                    self.stack[at].clone()
                };
                self.push(value);
            }
            // OP_ROT - rotate top 3 stack items
            OP_ROT => {
                self.require(3)?;
                let len = self.stack.len();
                self.stack.swap(len - 3, len - 2);
                self.stack.swap(len - 2, len - 1);
            }
            // OP_SWAP - swap top 2 stack items
            OP_SWAP => {
                self.require(2)?;
                let len = self.stack.len();
                self.stack.swap(len - 2, len - 1);
            }
            // OP_TUCK - copy top stack item below the second-to-top
            OP_TUCK => {
                self.require(2)?;
                let top = self.top(1)?.clone();
                let at = self.stack.len() - 2;
                if self.may2025 {
                    self.metrics.op_cost += top.len() as u64;
                }
                self.stack.insert(at, top);
            }
            _ => return Err(ScriptError::BadOpcode),
        }
        Ok(())
    }

    fn execute_splice_op(&mut self, opcode: u8) -> Result<(), ScriptError> {
        match opcode {
            // OP_CAT - concatenate top two items
            OP_CAT => {
                self.require(2)?;
                if self.top(2)?.len() + self.top(1)?.len() > self.max_element {
                    return Err(ScriptError::PushSize);
                }
                let tail = self.pop()?;
                let mut head = self.pop()?;
                head.extend_from_slice(&tail);
                self.push(head);
            }
            // OP_SPLIT - split an item at a position
            OP_SPLIT => {
                self.require(2)?;
                let position = self.pop_index()?;
                let data = self.pop()?;
                if position < 0 || position as u64 > data.len() as u64 {
                    return Err(ScriptError::InvalidSplitRange);
                }
                let (left, right) = data.split_at(position as usize);
                let (left, right) = (left.to_vec(), right.to_vec());
                self.push(left);
                self.push(right);
            }
            // OP_NUM2BIN - encode a number into exactly `size` bytes
            OP_NUM2BIN => {
                self.require(2)?;
                let size = self.pop_index()?;
                if size < 0 || size as u64 > self.max_element as u64 {
                    return Err(ScriptError::PushSize);
                }
                let size = size as usize;
                let raw = self.pop()?;
                let mut bytes = minimally_encode(&raw);
                if bytes.len() > size {
                    return Err(ScriptError::ImpossibleEncoding);
                }
                if bytes.len() < size {
                    let mut sign = 0u8;
                    if let Some(last) = bytes.last_mut() {
                        sign = *last & 0x80;
                        *last &= 0x7f;
                    }
                    bytes.resize(size - 1, 0);
                    bytes.push(sign);
                }
                self.push(bytes);
            }
            // OP_BIN2NUM - minimally encode an arbitrary byte string as a number
            OP_BIN2NUM => {
                let raw = self.pop()?;
                let bytes = minimally_encode(&raw);
                if bytes.len() > self.numbers.operand_size {
                    return Err(ScriptError::InvalidNumberRange);
                }
                self.push(bytes);
            }
            // OP_SIZE - push size of top stack item
            OP_SIZE => {
                let size = ScriptNum::from_u64(self.top(1)?.len() as u64);
                self.push_num(size)?;
            }
            // OP_REVERSEBYTES - reverse the top item
            OP_REVERSEBYTES => {
                let mut data = self.pop()?;
                data.reverse();
                self.push(data);
            }
            _ => return Err(ScriptError::BadOpcode),
        }
        Ok(())
    }

    fn execute_bitwise_op(&mut self, opcode: u8) -> Result<(), ScriptError> {
        self.require(2)?;
        match opcode {
            OP_AND | OP_OR | OP_XOR => {
                if self.top(2)?.len() != self.top(1)?.len() {
                    return Err(ScriptError::InvalidOperandSize);
                }
                let right = self.pop()?;
                let mut left = self.pop()?;
                for (l, r) in left.iter_mut().zip(&right) {
                    match opcode {
                        OP_AND => *l &= r,
                        OP_OR => *l |= r,
                        _ => *l ^= r,
                    }
                }
                self.push(left);
            }
            // OP_EQUAL / OP_EQUALVERIFY - compare top two items
            _ => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push_bool(left == right);
                if opcode == OP_EQUALVERIFY {
                    self.verify_top(ScriptError::EqualVerify)?;
                }
            }
        }
        Ok(())
    }

    fn execute_arithmetic_op(&mut self, opcode: u8) -> Result<(), ScriptError> {
        match opcode {
            OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                let n = self.pop_num()?;
                let result = match opcode {
                    OP_1ADD => n.add_one(),
                    OP_1SUB => n.sub_one(),
                    OP_NEGATE => n.neg(),
                    OP_ABS => n.abs(),
                    OP_NOT => bool_num(n.is_zero()),
                    _ => bool_num(!n.is_zero()),
                };
                self.push_num(result)?;
            }
            // OP_WITHIN - x min max -- (min <= x < max)
            OP_WITHIN => {
                self.require(3)?;
                let max = self.pop_num()?;
                let min = self.pop_num()?;
                let x = self.pop_num()?;
                self.push_bool(min <= x && x < max);
            }
            _ => {
                self.require(2)?;
                // Quadratic operand-length cost
                if self.may2025 && matches!(opcode, OP_MUL | OP_DIV | OP_MOD) {
                    let product = self.top(1)?.len() * self.top(2)?.len();
                    self.metrics.op_cost += product as u64;
                }
                let b = self.pop_num()?;
                let a = self.pop_num()?;
                let result = match opcode {
                    OP_ADD => a.add(&b),
                    OP_SUB => a.sub(&b),
                    OP_MUL => a.mul(&b),
                    OP_DIV => a.div(&b).ok_or(ScriptError::DivByZero)?,
                    OP_MOD => a.rem(&b).ok_or(ScriptError::ModByZero)?,
                    OP_BOOLAND => bool_num(!a.is_zero() && !b.is_zero()),
                    OP_BOOLOR => bool_num(!a.is_zero() || !b.is_zero()),
                    OP_NUMEQUAL | OP_NUMEQUALVERIFY => bool_num(a == b),
                    OP_NUMNOTEQUAL => bool_num(a != b),
                    OP_LESSTHAN => bool_num(a < b),
                    OP_GREATERTHAN => bool_num(a > b),
                    OP_LESSTHANOREQUAL => bool_num(a <= b),
                    OP_GREATERTHANOREQUAL => bool_num(a >= b),
                    OP_MIN => a.min(b),
                    OP_MAX => a.max(b),
                    // OP_2MUL, OP_2DIV, OP_LSHIFT, OP_RSHIFT never get here
                    _ => return Err(ScriptError::DisabledOpcode),
                };
                self.push_num(result)?;
                if opcode == OP_NUMEQUALVERIFY {
                    self.verify_top(ScriptError::NumEqualVerify)?;
                }
            }
        }
        Ok(())
    }

    fn execute_hash_op(&mut self, opcode: u8) -> Result<(), ScriptError> {
        let data = self.pop()?;
        self.charge_hash(data.len(), matches!(opcode, OP_HASH160 | OP_HASH256))?;
        let digest = match opcode {
            // OP_RIPEMD160 - RIPEMD160(x)
            OP_RIPEMD160 => ripemd160(&data).to_vec(),
            // OP_SHA1 - SHA1(x)
            OP_SHA1 => sha1(&data).to_vec(),
            // OP_SHA256 - SHA256(x)
            OP_SHA256 => sha256(&data).to_vec(),
            // OP_HASH160 - RIPEMD160(SHA256(x))
            OP_HASH160 => hash160(&data).to_vec(),
            // OP_HASH256 - SHA256(SHA256(x))
            _ => double_sha256(&data).to_vec(),
        };
        self.push(digest);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Signatures
    // ------------------------------------------------------------------

    fn script_code(&self) -> Script {
        Script::from_slice(&self.script.as_bytes()[self.code_start..])
    }

    /// Legacy signatures cannot sign themselves: drop their push from the script code.
    fn cleanup_script_code(&self, script_code: Script, sig: &[u8]) -> Script {
        let forkid = SigHashType::from_signature(sig).map_or(false, |t| t.has_forkid());
        if self.flag(ScriptFlags::SIGHASH_FORKID) && forkid {
            return script_code;
        }
        let push = ScriptBuilder::new().push_slice(sig).into_script();
        script_code.find_and_delete(push.as_bytes())
    }

    /// Check a transaction signature (hash type byte last) against `pubkey`.
    fn check_sig(&self, sig: &[u8], pubkey: &[u8], script_code: &Script) -> Result<bool, ScriptError> {
        let Some((&hash_byte, raw)) = sig.split_last() else {
            return Ok(false);
        };
        let ctx = self.context()?;
        let mut hash_type = SigHashType::from_raw(u32::from(hash_byte));
        if hash_type.has_forkid() {
            hash_type = hash_type.with_fork_value(self.interp.fork_id);
        }
        let digest = compute_sighash(&ctx, script_code, hash_type, self.interp.flags)?;
        let scheme = SignatureScheme::for_signature(raw);
        Ok(self
            .interp
            .verifier
            .verify(scheme, pubkey, raw, &digest)
            .unwrap_or(false))
    }

    // OP_CHECKSIG / OP_CHECKSIGVERIFY - sig pubkey -- bool
    fn execute_checksig(&mut self, opcode: u8) -> Result<(), ScriptError> {
        self.require(2)?;
        let sig = self.top(2)?.clone();
        let pubkey = self.top(1)?.clone();

        check_transaction_signature_encoding(&sig, self.interp.flags)?;
        check_pubkey_encoding(&pubkey, self.interp.flags)?;

        let script_code = self.cleanup_script_code(self.script_code(), &sig);
        let success = self.check_sig(&sig, &pubkey, &script_code)?;
        if !success && self.flag(ScriptFlags::NULLFAIL) && !sig.is_empty() {
            return Err(ScriptError::SigNullFail);
        }
        if !sig.is_empty() {
            self.count_sig_checks(1);
        }

        self.pop()?;
        self.pop()?;
        self.push_bool(success);
        if opcode == OP_CHECKSIGVERIFY {
            self.verify_top(ScriptError::CheckSigVerify)?;
        }
        Ok(())
    }

    // OP_CHECKDATASIG / OP_CHECKDATASIGVERIFY - sig message pubkey -- bool
    fn execute_checkdatasig(&mut self, opcode: u8) -> Result<(), ScriptError> {
        self.require(3)?;
        let sig = self.top(3)?.clone();
        let message = self.top(2)?.clone();
        let pubkey = self.top(1)?.clone();

        check_data_signature_encoding(&sig, self.interp.flags)?;
        check_pubkey_encoding(&pubkey, self.interp.flags)?;

        let mut success = false;
        if !sig.is_empty() {
            self.charge_hash(message.len(), false)?;
            let digest = sha256(&message);
            let scheme = SignatureScheme::for_signature(&sig);
            success = self
                .interp
                .verifier
                .verify(scheme, &pubkey, &sig, &digest)
                .unwrap_or(false);
            self.count_sig_checks(1);
        }
        if !success && self.flag(ScriptFlags::NULLFAIL) && !sig.is_empty() {
            return Err(ScriptError::SigNullFail);
        }

        self.stack.truncate(self.stack.len() - 3);
        self.push_bool(success);
        if opcode == OP_CHECKDATASIGVERIFY {
            self.verify_top(ScriptError::CheckDataSigVerify)?;
        }
        Ok(())
    }

    // OP_CHECKMULTISIG / OP_CHECKMULTISIGVERIFY
    // dummy [sig ...] sig_count [pubkey ...] key_count -- bool
    fn execute_checkmultisig(&mut self, opcode: u8) -> Result<(), ScriptError> {
        let flags = self.interp.flags;

        let idx_key_count = 1usize;
        self.require(idx_key_count)?;
        let key_count = ScriptNum::decode(self.top(idx_key_count)?, self.minimal, self.numbers.operand_size)?
            .to_i64_saturating();
        if key_count < 0 || key_count as u64 > self.interp.limits.max_pubkeys_per_multisig as u64 {
            return Err(ScriptError::PubkeyCount);
        }
        let key_count = key_count as usize;
        if !self.may2025 {
            self.op_count += key_count;
            if self.op_count > self.interp.limits.max_ops {
                return Err(ScriptError::OpCount);
            }
        }

        let idx_top_key = idx_key_count + 1;
        let idx_sig_count = idx_top_key + key_count;
        self.require(idx_sig_count)?;
        let sig_count = ScriptNum::decode(self.top(idx_sig_count)?, self.minimal, self.numbers.operand_size)?
            .to_i64_saturating();
        if sig_count < 0 || sig_count as u64 > key_count as u64 {
            return Err(ScriptError::SigCount);
        }
        let sig_count = sig_count as usize;

        let idx_top_sig = idx_sig_count + 1;
        let idx_dummy = idx_top_sig + sig_count;
        self.require(idx_dummy)?;

        let mut script_code = self.script_code();
        for k in 0..sig_count {
            let sig = self.top(idx_top_sig + k)?.clone();
            script_code = self.cleanup_script_code(script_code, &sig);
        }

        let dummy = self.top(idx_dummy)?.clone();
        let success = if flags.contains(ScriptFlags::SCHNORR_MULTISIG) && !dummy.is_empty() {
            self.checkmultisig_schnorr(&dummy, key_count, sig_count, idx_top_key, idx_top_sig, &script_code)?
        } else {
            self.checkmultisig_legacy(key_count, sig_count, idx_top_key, idx_top_sig, &script_code)?
        };

        self.stack.truncate(self.stack.len() - idx_dummy);
        self.push_bool(success);
        if opcode == OP_CHECKMULTISIGVERIFY {
            self.verify_top(ScriptError::CheckMultiSigVerify)?;
        }
        Ok(())
    }

    /// Bitfield mode: bit i of the dummy selects key i (counted from the
    /// bottom); every selected key must have a valid Schnorr signature.
    fn checkmultisig_schnorr(
        &mut self,
        dummy: &[u8],
        key_count: usize,
        sig_count: usize,
        idx_top_key: usize,
        idx_top_sig: usize,
        script_code: &Script,
    ) -> Result<bool, ScriptError> {
        let bitfield = decode_bitfield(dummy, key_count)?;
        if bitfield.count_ones() as usize != sig_count {
            return Err(ScriptError::InvalidBitCount);
        }

        let idx_bottom_key = idx_top_key + key_count - 1;
        let idx_bottom_sig = idx_top_sig + sig_count - 1;
        let mut key = 0usize;
        for i in 0..sig_count {
            while bitfield >> key & 1 == 0 {
                key += 1;
            }
            if key >= key_count {
                return Err(ScriptError::InvalidBitRange);
            }
            let sig = self.top(idx_bottom_sig - i)?.clone();
            let pubkey = self.top(idx_bottom_key - key)?.clone();

            check_transaction_schnorr_signature_encoding(&sig, self.interp.flags)?;
            check_pubkey_encoding(&pubkey, self.interp.flags)?;

            if !self.check_sig(&sig, &pubkey, script_code)? {
                return Err(ScriptError::SigNullFail);
            }
            self.count_sig_checks(1);
            key += 1;
        }
        Ok(true)
    }

    /// Legacy mode: walk keys and signatures from the top, each signature
    /// must match a later key than the previous one.
    fn checkmultisig_legacy(
        &mut self,
        key_count: usize,
        sig_count: usize,
        idx_top_key: usize,
        idx_top_sig: usize,
        script_code: &Script,
    ) -> Result<bool, ScriptError> {
        let mut success = true;
        let (mut isig, mut sigs_left) = (idx_top_sig, sig_count);
        let (mut ikey, mut keys_left) = (idx_top_key, key_count);
        while success && sigs_left > 0 {
            let sig = self.top(isig)?.clone();
            let pubkey = self.top(ikey)?.clone();

            check_transaction_ecdsa_signature_encoding(&sig, self.interp.flags)?;
            check_pubkey_encoding(&pubkey, self.interp.flags)?;

            if self.check_sig(&sig, &pubkey, script_code)? {
                isig += 1;
                sigs_left -= 1;
            }
            ikey += 1;
            keys_left -= 1;

            // More signatures left than keys means some signature must fail
            if sigs_left > keys_left {
                success = false;
            }
        }

        let mut any_signature = false;
        for k in 0..sig_count {
            if !self.top(idx_top_sig + k)?.is_empty() {
                any_signature = true;
            }
        }
        if !success && self.flag(ScriptFlags::NULLFAIL) && any_signature {
            return Err(ScriptError::SigNullFail);
        }
        if any_signature {
            self.count_sig_checks(key_count as u64);
        }
        Ok(success)
    }

    // ------------------------------------------------------------------
    // Locktime
    // ------------------------------------------------------------------

    // OP_CHECKLOCKTIMEVERIFY - fail unless the transaction lock time reaches the operand
    fn execute_checklocktimeverify(&mut self) -> Result<(), ScriptError> {
        if !self.flag(ScriptFlags::CHECKLOCKTIMEVERIFY) {
            return self.upgradable_nop();
        }
        let lock_time = ScriptNum::decode(self.top(1)?, self.minimal, LOCKTIME_SCRIPTNUM_SIZE)?;
        if lock_time.is_negative() {
            return Err(ScriptError::NegativeLocktime);
        }
        let ctx = self.context()?;
        if !check_lock_time(&ctx, lock_time.to_i64_saturating()) {
            return Err(ScriptError::UnsatisfiedLocktime);
        }
        Ok(())
    }

    // OP_CHECKSEQUENCEVERIFY - fail unless the input's relative lock reaches the operand
    fn execute_checksequenceverify(&mut self) -> Result<(), ScriptError> {
        if !self.flag(ScriptFlags::CHECKSEQUENCEVERIFY) {
            return self.upgradable_nop();
        }
        let sequence = ScriptNum::decode(self.top(1)?, self.minimal, LOCKTIME_SCRIPTNUM_SIZE)?;
        if sequence.is_negative() {
            return Err(ScriptError::NegativeLocktime);
        }
        let sequence = sequence.to_i64_saturating();
        if sequence & i64::from(SEQUENCE_LOCKTIME_DISABLE_FLAG) != 0 {
            return Ok(());
        }
        let ctx = self.context()?;
        if !check_sequence(&ctx, sequence) {
            return Err(ScriptError::UnsatisfiedLocktime);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    fn pop_input_index(&mut self, ctx: &ScriptExecutionContext<'a>) -> Result<usize, ScriptError> {
        let index = self.pop_index()?;
        usize::try_from(index)
            .ok()
            .filter(|i| *i < ctx.tx().inputs.len())
            .ok_or(ScriptError::InvalidTxInputIndex)
    }

    fn pop_output_index(&mut self, ctx: &ScriptExecutionContext<'a>) -> Result<usize, ScriptError> {
        let index = self.pop_index()?;
        usize::try_from(index)
            .ok()
            .filter(|i| *i < ctx.tx().outputs.len())
            .ok_or(ScriptError::InvalidTxOutputIndex)
    }

    fn execute_introspection(&mut self, opcode: u8) -> Result<(), ScriptError> {
        let ctx = self.context()?;
        let tx = ctx.tx();
        match opcode {
            OP_INPUTINDEX => self.push_num(ScriptNum::from_u64(ctx.input_index() as u64))?,
            OP_ACTIVEBYTECODE => {
                let code = self.script_code().into_bytes();
                self.push_checked(code)?;
            }
            OP_TXVERSION => self.push_num(ScriptNum::from_i64(i64::from(tx.version as i32)))?,
            OP_TXINPUTCOUNT => self.push_num(ScriptNum::from_u64(tx.inputs.len() as u64))?,
            OP_TXOUTPUTCOUNT => self.push_num(ScriptNum::from_u64(tx.outputs.len() as u64))?,
            OP_TXLOCKTIME => self.push_num(ScriptNum::from_u64(u64::from(tx.lock_time)))?,
            OP_UTXOVALUE => {
                let index = self.pop_input_index(&ctx)?;
                let value = ctx.utxo(index)?.value();
                self.push_num(ScriptNum::from_u64(value))?;
            }
            OP_UTXOBYTECODE => {
                let index = self.pop_input_index(&ctx)?;
                let script = ctx.utxo(index)?.script().as_bytes().to_vec();
                self.push_checked(script)?;
            }
            OP_OUTPOINTTXHASH => {
                let index = self.pop_input_index(&ctx)?;
                self.push(tx.inputs[index].prevout.hash.to_vec());
            }
            OP_OUTPOINTINDEX => {
                let index = self.pop_input_index(&ctx)?;
                let prev_index = tx.inputs[index].prevout.index;
                self.push_num(ScriptNum::from_u64(u64::from(prev_index)))?;
            }
            OP_INPUTBYTECODE => {
                let index = self.pop_input_index(&ctx)?;
                self.push_checked(tx.inputs[index].script.as_bytes().to_vec())?;
            }
            OP_INPUTSEQUENCENUMBER => {
                let index = self.pop_input_index(&ctx)?;
                let sequence = tx.inputs[index].sequence;
                self.push_num(ScriptNum::from_u64(u64::from(sequence)))?;
            }
            OP_OUTPUTVALUE => {
                let index = self.pop_output_index(&ctx)?;
                self.push_num(ScriptNum::from_u64(tx.outputs[index].value()))?;
            }
            OP_OUTPUTBYTECODE => {
                let index = self.pop_output_index(&ctx)?;
                self.push_checked(tx.outputs[index].script().as_bytes().to_vec())?;
            }
            _ => return Err(ScriptError::BadOpcode),
        }
        Ok(())
    }

    fn execute_token_introspection(&mut self, opcode: u8) -> Result<(), ScriptError> {
        let ctx = self.context()?;
        let token = match opcode {
            OP_UTXOTOKENCATEGORY | OP_UTXOTOKENCOMMITMENT | OP_UTXOTOKENAMOUNT => {
                let index = self.pop_input_index(&ctx)?;
                ctx.utxo(index)?.token()
            }
            _ => {
                let index = self.pop_output_index(&ctx)?;
                ctx.tx().outputs[index].token()
            }
        };
        match opcode {
            OP_UTXOTOKENCATEGORY | OP_OUTPUTTOKENCATEGORY => self.push(token_category(token)),
            OP_UTXOTOKENCOMMITMENT | OP_OUTPUTTOKENCOMMITMENT => {
                self.push(token.map_or_else(Vec::new, |t| t.commitment().to_vec()))
            }
            _ => {
                let amount = token.map_or(0, TokenData::amount_or_zero);
                self.push_num(ScriptNum::from_i64(amount))?;
            }
        }
        Ok(())
    }
}

fn bool_num(value: bool) -> ScriptNum {
    ScriptNum::from_i64(i64::from(value))
}

/// Category id, followed by the capability byte for mutable and minting NFTs.
fn token_category(token: Option<&TokenData>) -> ByteString {
    let Some(token) = token else {
        return Vec::new();
    };
    let mut out = token.category.to_vec();
    match token.capability() {
        Some(capability) if capability.to_byte() != 0 => out.push(capability.to_byte()),
        _ => {}
    }
    out
}

/// Little-endian bitfield of exactly `(size + 7) / 8` bytes with no bit at or above `size`.
fn decode_bitfield(bytes: &[u8], size: usize) -> Result<u32, ScriptError> {
    if size > 32 || bytes.len() != (size + 7) / 8 {
        return Err(ScriptError::InvalidBitfieldSize);
    }
    let bitfield = bytes
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, byte)| acc | u32::from(*byte) << (8 * i));
    let mask = if size == 32 { u32::MAX } else { (1u32 << size) - 1 };
    if bitfield & mask != bitfield {
        return Err(ScriptError::InvalidBitRange);
    }
    Ok(bitfield)
}

/// Absolute lock: same kind (height or time), operand not in the future,
/// and the input not final.
fn check_lock_time(ctx: &ScriptExecutionContext<'_>, lock_time: i64) -> bool {
    let tx_lock_time = i64::from(ctx.tx().lock_time);
    let threshold = i64::from(LOCKTIME_THRESHOLD);
    let same_kind = (tx_lock_time < threshold && lock_time < threshold)
        || (tx_lock_time >= threshold && lock_time >= threshold);
    if !same_kind || lock_time > tx_lock_time {
        return false;
    }
    ctx.input().sequence != SEQUENCE_FINAL
}

/// Relative lock (BIP68 encoding), only for version 2+ transactions.
fn check_sequence(ctx: &ScriptExecutionContext<'_>, sequence: i64) -> bool {
    let tx_sequence = i64::from(ctx.input().sequence);
    if ctx.tx().version < 2 {
        return false;
    }
    if tx_sequence & i64::from(SEQUENCE_LOCKTIME_DISABLE_FLAG) != 0 {
        return false;
    }
    let type_flag = i64::from(SEQUENCE_LOCKTIME_TYPE_FLAG);
    let mask = type_flag | i64::from(SEQUENCE_LOCKTIME_MASK);
    let tx_masked = tx_sequence & mask;
    let masked = sequence & mask;
    let same_kind = (tx_masked < type_flag && masked < type_flag)
        || (tx_masked >= type_flag && masked >= type_flag);
    same_kind && masked <= tx_masked
}
