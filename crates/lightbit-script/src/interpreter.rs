//! Script execution.
//!
//! Executes parsed programs against a main stack, an alt stack and a
//! conditional stack, under the consensus limits: 1000 combined stack
//! elements, 520-byte elements, 201 counted operations, 4-byte numeric
//! operands and 10,000-byte programs.

use crate::error::{ScriptError, ScriptResult};
use crate::num::{cast_to_bool, decode_num_checked, encode_num};
use crate::opcodes::*;
use crate::script::{Chunk, Script, MAX_ELEMENT_SIZE, MAX_SCRIPT_SIZE};
use crate::stack::Stack;
use lightbit_core::{ecdsa_verify, hash160, ripemd160, sha256, sha256d, Transaction};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use sha1::{Digest, Sha1};
use std::collections::VecDeque;

/// Maximum combined size of the main and alt stacks.
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of counted operations per script.
pub const MAX_OPS_PER_SCRIPT: usize = 201;

/// Maximum public keys in one `OP_CHECKMULTISIG`.
pub const MAX_MULTISIG_KEYS: i64 = 20;

/// Conditional-stack entry. `Skip` marks a conditional opened inside a
/// branch that is not executing, so a later `OP_ELSE` cannot switch it on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cond {
    True,
    False,
    Skip,
}

/// Execute `script` against `stack`.
///
/// `tx` and `input_index` form the signature-checking context; they may be
/// absent for scripts that contain no signature operations.
pub fn execute_script(
    tx: Option<&Transaction>,
    input_index: usize,
    script: &Script,
    stack: &mut Stack,
) -> ScriptResult<()> {
    let mut alt_stack = Stack::new();
    let mut cond_stack: Vec<Cond> = Vec::new();
    let mut op_count = 0usize;
    let mut last_code_sep = 0usize;

    for chunk in script.chunks() {
        let should_execute = cond_stack.iter().all(|c| *c == Cond::True);
        match chunk {
            Chunk::Push { data, .. } => {
                if data.len() > MAX_ELEMENT_SIZE {
                    return Err(ScriptError::ElementTooLarge);
                }
                if should_execute {
                    stack.push(data.clone());
                }
            }
            Chunk::Op { opcode, offset } => {
                let opcode = *opcode;
                if opcode > OP_16 {
                    op_count += 1;
                    if op_count > MAX_OPS_PER_SCRIPT {
                        return Err(ScriptError::TooManyOperations);
                    }
                }
                // These fail even in branches that are not executing.
                if opcode == OP_VERIF || opcode == OP_VERNOTIF {
                    return Err(ScriptError::InvalidConditional);
                }
                if is_disabled(opcode) {
                    return Err(ScriptError::DisabledOpcode(op_name(opcode)));
                }

                match opcode {
                    OP_IF | OP_NOTIF => {
                        if should_execute {
                            let top = pop(stack, opcode)?;
                            let mut value = cast_to_bool(&top);
                            if opcode == OP_NOTIF {
                                value = !value;
                            }
                            cond_stack.push(if value { Cond::True } else { Cond::False });
                        } else {
                            cond_stack.push(Cond::Skip);
                        }
                    }
                    OP_ELSE => match cond_stack.last_mut() {
                        None => return Err(ScriptError::UnexpectedElse),
                        Some(cond) => {
                            *cond = match *cond {
                                Cond::True => Cond::False,
                                Cond::False => Cond::True,
                                Cond::Skip => Cond::Skip,
                            }
                        }
                    },
                    OP_ENDIF => {
                        if cond_stack.pop().is_none() {
                            return Err(ScriptError::UnexpectedEndIf);
                        }
                    }
                    _ if should_execute => execute_opcode(
                        tx,
                        input_index,
                        script,
                        opcode,
                        *offset,
                        stack,
                        &mut alt_stack,
                        &mut op_count,
                        &mut last_code_sep,
                    )?,
                    _ => {}
                }
            }
        }
        if stack.len() + alt_stack.len() > MAX_STACK_SIZE {
            return Err(ScriptError::StackSizeExceeded);
        }
    }

    if !cond_stack.is_empty() {
        return Err(ScriptError::UnterminatedConditional);
    }
    Ok(())
}

fn pop(stack: &mut Stack, opcode: u8) -> ScriptResult<Vec<u8>> {
    stack
        .pop()
        .ok_or(ScriptError::StackUnderflow(op_name(opcode)))
}

fn pop_num(stack: &mut Stack, opcode: u8) -> ScriptResult<BigInt> {
    decode_num_checked(&pop(stack, opcode)?)
}

fn pop_i64(stack: &mut Stack, opcode: u8) -> ScriptResult<i64> {
    pop_num(stack, opcode)?
        .to_i64()
        .ok_or(ScriptError::NumberTooLarge)
}

fn push_bool(stack: &mut Stack, value: bool) {
    stack.push(if value { vec![1] } else { Vec::new() });
}

fn push_num(stack: &mut Stack, value: &BigInt) {
    stack.push(encode_num(value));
}

#[allow(clippy::too_many_arguments)]
fn execute_opcode(
    tx: Option<&Transaction>,
    input_index: usize,
    script: &Script,
    opcode: u8,
    offset: usize,
    stack: &mut Stack,
    alt_stack: &mut Stack,
    op_count: &mut usize,
    last_code_sep: &mut usize,
) -> ScriptResult<()> {
    let underflow = || ScriptError::StackUnderflow(op_name(opcode));
    match opcode {
        OP_0 => stack.push(Vec::new()),
        OP_1NEGATE => push_num(stack, &BigInt::from(-1)),
        OP_1..=OP_16 => push_num(stack, &BigInt::from(opcode - OP_1 + 1)),

        OP_NOP | OP_NOP1..=OP_NOP10 => {}

        OP_VERIFY => {
            if !cast_to_bool(&pop(stack, opcode)?) {
                return Err(ScriptError::VerifyFailed);
            }
        }
        OP_RETURN => return Err(ScriptError::Return),

        OP_TOALTSTACK => alt_stack.push(pop(stack, opcode)?),
        OP_FROMALTSTACK => stack.push(alt_stack.pop().ok_or_else(underflow)?),

        OP_2DROP => {
            pop(stack, opcode)?;
            pop(stack, opcode)?;
        }
        OP_2DUP => {
            let second = stack.at(1).ok_or_else(underflow)?.clone();
            let first = stack.at(0).ok_or_else(underflow)?.clone();
            stack.push(second);
            stack.push(first);
        }
        OP_3DUP => {
            let third = stack.at(2).ok_or_else(underflow)?.clone();
            let second = stack.at(1).ok_or_else(underflow)?.clone();
            let first = stack.at(0).ok_or_else(underflow)?.clone();
            stack.push(third);
            stack.push(second);
            stack.push(first);
        }
        OP_2OVER => {
            let fourth = stack.at(3).ok_or_else(underflow)?.clone();
            let third = stack.at(2).ok_or_else(underflow)?.clone();
            stack.push(fourth);
            stack.push(third);
        }
        OP_2ROT => {
            let sixth = stack.remove_at(5).ok_or_else(underflow)?;
            let fifth = stack.remove_at(4).ok_or_else(underflow)?;
            stack.push(sixth);
            stack.push(fifth);
        }
        OP_2SWAP => {
            let fourth = stack.remove_at(3).ok_or_else(underflow)?;
            let third = stack.remove_at(2).ok_or_else(underflow)?;
            stack.push(fourth);
            stack.push(third);
        }
        OP_IFDUP => {
            let top = stack.top().ok_or_else(underflow)?;
            if cast_to_bool(top) {
                let copy = top.clone();
                stack.push(copy);
            }
        }
        OP_DEPTH => push_num(stack, &BigInt::from(stack.len())),
        OP_DROP => {
            pop(stack, opcode)?;
        }
        OP_DUP => {
            let top = stack.top().ok_or_else(underflow)?.clone();
            stack.push(top);
        }
        OP_NIP => {
            stack.remove_at(1).ok_or_else(underflow)?;
        }
        OP_OVER => {
            let second = stack.at(1).ok_or_else(underflow)?.clone();
            stack.push(second);
        }
        OP_PICK | OP_ROLL => {
            let n = pop_i64(stack, opcode)?;
            if n < 0 || n as usize >= stack.len() {
                return Err(underflow());
            }
            let element = if opcode == OP_PICK {
                stack.at(n as usize).ok_or_else(underflow)?.clone()
            } else {
                stack.remove_at(n as usize).ok_or_else(underflow)?
            };
            stack.push(element);
        }
        OP_ROT => {
            let third = stack.remove_at(2).ok_or_else(underflow)?;
            stack.push(third);
        }
        OP_SWAP => {
            let second = stack.remove_at(1).ok_or_else(underflow)?;
            stack.push(second);
        }
        OP_TUCK => {
            let first = pop(stack, opcode)?;
            let second = pop(stack, opcode)?;
            stack.push(first.clone());
            stack.push(second);
            stack.push(first);
        }

        OP_SIZE => {
            let len = stack.top().ok_or_else(underflow)?.len();
            push_num(stack, &BigInt::from(len));
        }

        OP_EQUAL => {
            let first = pop(stack, opcode)?;
            let second = pop(stack, opcode)?;
            push_bool(stack, first == second);
        }
        OP_EQUALVERIFY => {
            let first = pop(stack, opcode)?;
            let second = pop(stack, opcode)?;
            if first != second {
                return Err(ScriptError::EqualVerifyFailed);
            }
        }

        OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
            let value = pop_num(stack, opcode)?;
            let result = match opcode {
                OP_1ADD => value + 1,
                OP_1SUB => value - 1,
                OP_NEGATE => -value,
                OP_ABS => {
                    if value < BigInt::from(0) {
                        -value
                    } else {
                        value
                    }
                }
                OP_NOT => BigInt::from((value == BigInt::from(0)) as u8),
                _ => BigInt::from((value != BigInt::from(0)) as u8),
            };
            push_num(stack, &result);
        }

        OP_ADD | OP_SUB | OP_MIN | OP_MAX => {
            let num1 = pop_num(stack, opcode)?;
            let num2 = pop_num(stack, opcode)?;
            let result = match opcode {
                OP_ADD => num2 + num1,
                OP_SUB => num2 - num1,
                OP_MIN => num2.min(num1),
                _ => num2.max(num1),
            };
            push_num(stack, &result);
        }

        OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL | OP_NUMNOTEQUAL | OP_LESSTHAN | OP_GREATERTHAN
        | OP_LESSTHANOREQUAL | OP_GREATERTHANOREQUAL => {
            let num1 = pop_num(stack, opcode)?;
            let num2 = pop_num(stack, opcode)?;
            let zero = BigInt::from(0);
            let result = match opcode {
                OP_BOOLAND => num2 != zero && num1 != zero,
                OP_BOOLOR => num2 != zero || num1 != zero,
                OP_NUMEQUAL => num2 == num1,
                OP_NUMNOTEQUAL => num2 != num1,
                OP_LESSTHAN => num2 < num1,
                OP_GREATERTHAN => num2 > num1,
                OP_LESSTHANOREQUAL => num2 <= num1,
                _ => num2 >= num1,
            };
            push_bool(stack, result);
        }

        OP_NUMEQUALVERIFY => {
            let num1 = pop_num(stack, opcode)?;
            let num2 = pop_num(stack, opcode)?;
            if num2 != num1 {
                return Err(ScriptError::NumEqualVerifyFailed);
            }
        }

        OP_WITHIN => {
            let max = pop_num(stack, opcode)?;
            let min = pop_num(stack, opcode)?;
            let value = pop_num(stack, opcode)?;
            push_bool(stack, value >= min && value < max);
        }

        OP_RIPEMD160 => {
            let data = pop(stack, opcode)?;
            stack.push(ripemd160(&data).to_vec());
        }
        OP_SHA1 => {
            let data = pop(stack, opcode)?;
            stack.push(Sha1::digest(&data).to_vec());
        }
        OP_SHA256 => {
            let data = pop(stack, opcode)?;
            stack.push(sha256(&data).to_vec());
        }
        OP_HASH160 => {
            let data = pop(stack, opcode)?;
            stack.push(hash160(&data).to_vec());
        }
        OP_HASH256 => {
            let data = pop(stack, opcode)?;
            stack.push(sha256d(&data).as_bytes().to_vec());
        }

        OP_CODESEPARATOR => *last_code_sep = offset + 1,

        OP_CHECKSIG | OP_CHECKSIGVERIFY => {
            execute_check_sig(tx, input_index, script, stack, *last_code_sep, opcode)?;
        }
        OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
            execute_multi_sig(tx, input_index, script, stack, *last_code_sep, op_count, opcode)?;
        }

        _ => return Err(ScriptError::ReservedOpcode(op_name(opcode))),
    }
    Ok(())
}

/// Connected script for signature hashing: the program from the last code
/// separator onward, with every push of each signature and every remaining
/// `OP_CODESEPARATOR` removed.
fn connected_script(
    script: &Script,
    last_code_sep: usize,
    sigs: &[Vec<u8>],
) -> ScriptResult<Vec<u8>> {
    let mut connected = script.program()[last_code_sep..].to_vec();
    for sig in sigs {
        let mut pattern = Vec::with_capacity(sig.len() + 5);
        Script::write_push(&mut pattern, sig);
        connected = Script::remove_all_instances_of(&connected, &pattern)?;
    }
    Script::remove_all_instances_of_op(&connected, OP_CODESEPARATOR)
}

/// Verify one signature against one public key. Malformed signatures and
/// hashing failures yield `false`, never an error.
fn check_one_sig(tx: &Transaction, input_index: usize, connected: &[u8], sig: &[u8], pubkey: &[u8]) -> bool {
    if sig.is_empty() {
        return false;
    }
    let sighash = sig[sig.len() - 1];
    match tx.hash_for_signature(input_index, connected, sighash) {
        Ok(hash) => ecdsa_verify(hash.as_bytes(), &sig[..sig.len() - 1], pubkey),
        Err(_) => false,
    }
}

fn execute_check_sig(
    tx: Option<&Transaction>,
    input_index: usize,
    script: &Script,
    stack: &mut Stack,
    last_code_sep: usize,
    opcode: u8,
) -> ScriptResult<()> {
    let tx = tx.ok_or(ScriptError::MissingTransactionContext)?;
    let pubkey = pop(stack, opcode)?;
    let sig = pop(stack, opcode)?;

    let connected = connected_script(script, last_code_sep, std::slice::from_ref(&sig))?;
    let valid = check_one_sig(tx, input_index, &connected, &sig, &pubkey);

    if opcode == OP_CHECKSIGVERIFY {
        if !valid {
            return Err(ScriptError::CheckSigVerifyFailed);
        }
    } else {
        push_bool(stack, valid);
    }
    Ok(())
}

fn execute_multi_sig(
    tx: Option<&Transaction>,
    input_index: usize,
    script: &Script,
    stack: &mut Stack,
    last_code_sep: usize,
    op_count: &mut usize,
    opcode: u8,
) -> ScriptResult<()> {
    let tx = tx.ok_or(ScriptError::MissingTransactionContext)?;

    let pubkey_count = pop_i64(stack, opcode)?;
    if !(0..=MAX_MULTISIG_KEYS).contains(&pubkey_count) {
        return Err(ScriptError::PubKeyCountOutOfRange);
    }
    // Each declared key counts as one operation.
    *op_count += pubkey_count as usize;
    if *op_count > MAX_OPS_PER_SCRIPT {
        return Err(ScriptError::TooManyOperations);
    }

    let mut pubkeys = VecDeque::with_capacity(pubkey_count as usize);
    for _ in 0..pubkey_count {
        pubkeys.push_back(pop(stack, opcode)?);
    }

    let sig_count = pop_i64(stack, opcode)?;
    if sig_count < 0 || sig_count > pubkey_count {
        return Err(ScriptError::SigCountOutOfRange);
    }
    let mut sigs = VecDeque::with_capacity(sig_count as usize);
    for _ in 0..sig_count {
        sigs.push_back(pop(stack, opcode)?);
    }

    let connected =
        connected_script(script, last_code_sep, sigs.make_contiguous())?;

    // Single pass: a signature is consumed only when it verifies against
    // the current key; keys are consumed unconditionally.
    let mut valid = true;
    while !sigs.is_empty() {
        let Some(pubkey) = pubkeys.pop_front() else {
            valid = false;
            break;
        };
        let sig = sigs.front().cloned().unwrap_or_default();
        if check_one_sig(tx, input_index, &connected, &sig, &pubkey) {
            sigs.pop_front();
        }
        if sigs.len() > pubkeys.len() {
            valid = false;
            break;
        }
    }

    // The reference implementation pops one extra element here; scripts
    // supply a dummy value to feed the bug, and so do we.
    pop(stack, opcode)?;

    if opcode == OP_CHECKMULTISIGVERIFY {
        if !valid {
            return Err(ScriptError::CheckMultiSigVerifyFailed);
        }
    } else {
        push_bool(stack, valid);
    }
    Ok(())
}

impl Script {
    /// Run this unlocking script followed by `script_pubkey`, verifying that
    /// input `input_index` of `tx` correctly spends the output locked by
    /// `script_pubkey`.
    ///
    /// With `enforce_p2sh`, a `script_pubkey` matching the pay-to-script-hash
    /// template additionally requires this script to be push-only, and the
    /// deserialized inner script to execute to a true value.
    pub fn correctly_spends(
        &self,
        tx: &Transaction,
        input_index: usize,
        script_pubkey: &Script,
        enforce_p2sh: bool,
    ) -> ScriptResult<()> {
        if self.len() > MAX_SCRIPT_SIZE || script_pubkey.len() > MAX_SCRIPT_SIZE {
            return Err(ScriptError::ScriptTooLarge);
        }

        let mut stack = Stack::new();
        execute_script(Some(tx), input_index, self, &mut stack)?;

        // Snapshot before the locking script runs; the P2SH evaluation
        // starts from the unlocking script's results alone.
        let snapshot = if enforce_p2sh { Some(stack.clone()) } else { None };

        execute_script(Some(tx), input_index, script_pubkey, &mut stack)?;

        let top = stack.pop().ok_or(ScriptError::EmptyStack)?;
        if !cast_to_bool(&top) {
            return Err(ScriptError::NonTrueStack);
        }

        if let Some(mut p2sh_stack) = snapshot {
            if script_pubkey.is_pay_to_script_hash() {
                if !self.is_push_only() {
                    return Err(ScriptError::P2shScriptSigNotPushOnly);
                }
                let serialized = p2sh_stack.pop().ok_or(ScriptError::EmptyStack)?;
                let inner = Script::new(serialized)?;
                execute_script(Some(tx), input_index, &inner, &mut p2sh_stack)?;
                let top = p2sh_stack.pop().ok_or(ScriptError::EmptyStack)?;
                if !cast_to_bool(&top) {
                    return Err(ScriptError::NonTrueStack);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Builder;
    use lightbit_core::transaction::{OutPoint, TxIn, TxOut, SIGHASH_ALL};
    use lightbit_core::{hash160, Sha256dHash};
    use secp256k1::{Message, Secp256k1, SecretKey};

    fn run(script: Script) -> ScriptResult<Stack> {
        let mut stack = Stack::new();
        execute_script(None, 0, &script, &mut stack)?;
        Ok(stack)
    }

    fn run_program(bytes: Vec<u8>) -> ScriptResult<Stack> {
        run(Script::new(bytes)?)
    }

    #[test]
    fn test_arithmetic() {
        let stack = run(Builder::new()
            .push_int(2)
            .push_int(3)
            .op(OP_ADD)
            .into_script()
            .unwrap())
        .unwrap();
        assert_eq!(stack.as_slice(), &[vec![5]]);

        let stack = run(Builder::new()
            .push_int(2)
            .push_int(3)
            .op(OP_SUB)
            .into_script()
            .unwrap())
        .unwrap();
        // 2 - 3 = -1, encoded sign-magnitude.
        assert_eq!(stack.as_slice(), &[vec![0x81]]);
    }

    #[test]
    fn test_comparisons() {
        let stack = run(Builder::new()
            .push_int(2)
            .push_int(3)
            .op(OP_LESSTHAN)
            .into_script()
            .unwrap())
        .unwrap();
        assert_eq!(stack.as_slice(), &[vec![1]]);

        let stack = run(Builder::new()
            .push_int(5)
            .push_int(1)
            .push_int(10)
            .op(OP_WITHIN)
            .into_script()
            .unwrap())
        .unwrap();
        assert_eq!(stack.as_slice(), &[vec![1]]);
    }

    #[test]
    fn test_conditionals() {
        let stack = run(Builder::new()
            .push_int(1)
            .op(OP_IF)
            .push_int(2)
            .op(OP_ELSE)
            .push_int(3)
            .op(OP_ENDIF)
            .into_script()
            .unwrap())
        .unwrap();
        assert_eq!(stack.as_slice(), &[vec![2]]);

        let stack = run(Builder::new()
            .push_int(0)
            .op(OP_IF)
            .push_int(2)
            .op(OP_ELSE)
            .push_int(3)
            .op(OP_ENDIF)
            .into_script()
            .unwrap())
        .unwrap();
        assert_eq!(stack.as_slice(), &[vec![3]]);
    }

    #[test]
    fn test_nested_conditional_in_dead_branch() {
        // The inner IF/ELSE lives in a dead branch; its ELSE must not
        // resurrect execution.
        let stack = run(Builder::new()
            .push_int(0)
            .op(OP_IF)
            .push_int(0)
            .op(OP_IF)
            .push_int(10)
            .op(OP_ELSE)
            .push_int(11)
            .op(OP_ENDIF)
            .op(OP_ELSE)
            .push_int(12)
            .op(OP_ENDIF)
            .into_script()
            .unwrap())
        .unwrap();
        assert_eq!(stack.as_slice(), &[vec![12]]);
    }

    #[test]
    fn test_else_endif_without_if() {
        assert_eq!(
            run_program(vec![OP_ELSE]).unwrap_err(),
            ScriptError::UnexpectedElse
        );
        assert_eq!(
            run_program(vec![OP_ENDIF]).unwrap_err(),
            ScriptError::UnexpectedEndIf
        );
    }

    #[test]
    fn test_unterminated_if() {
        assert_eq!(
            run_program(vec![OP_1, OP_IF, OP_1]).unwrap_err(),
            ScriptError::UnterminatedConditional
        );
    }

    #[test]
    fn test_disabled_opcode_in_dead_branch() {
        assert_eq!(
            run_program(vec![OP_0, OP_IF, OP_CAT, OP_ENDIF, OP_1]).unwrap_err(),
            ScriptError::DisabledOpcode("OP_CAT")
        );
    }

    #[test]
    fn test_verif_fails_in_dead_branch() {
        assert_eq!(
            run_program(vec![OP_0, OP_IF, OP_VERIF, OP_ENDIF]).unwrap_err(),
            ScriptError::InvalidConditional
        );
    }

    #[test]
    fn test_numeric_operand_limit() {
        let err = run(Builder::new()
            .push_data(&[1, 2, 3, 4, 5])
            .op(OP_1ADD)
            .into_script()
            .unwrap())
        .unwrap_err();
        assert_eq!(err, ScriptError::NumberTooLarge);
        assert_eq!(
            err.to_string(),
            "Script attempted to use an integer larger than 4 bytes"
        );
    }

    #[test]
    fn test_op_count_limit() {
        let stack = run_program(vec![OP_1; 1]).unwrap();
        assert_eq!(stack.len(), 1);

        // 201 NOPs are fine, the 202nd is one too many.
        let mut program = vec![OP_NOP; 201];
        program.push(OP_1);
        assert!(run_program(program.clone()).is_ok());
        program.insert(0, OP_NOP);
        assert_eq!(
            run_program(program).unwrap_err(),
            ScriptError::TooManyOperations
        );
    }

    #[test]
    fn test_stack_size_limit() {
        // 1000 elements are fine; one more, via either stack, is not.
        let program = vec![OP_1; 1000];
        assert!(run_program(program).is_ok());

        let program = vec![OP_1; 1001];
        assert_eq!(
            run_program(program).unwrap_err(),
            ScriptError::StackSizeExceeded
        );

        let mut program = vec![OP_1; 1000];
        program.push(OP_DUP);
        program.push(OP_TOALTSTACK);
        assert_eq!(
            run_program(program).unwrap_err(),
            ScriptError::StackSizeExceeded
        );
    }

    #[test]
    fn test_element_size_limit() {
        let script = Builder::new().push_data(&[0xAA; 520]).into_script().unwrap();
        assert!(run(script).is_ok());

        let script = Builder::new().push_data(&[0xAA; 521]).into_script().unwrap();
        assert_eq!(run(script).unwrap_err(), ScriptError::ElementTooLarge);
    }

    #[test]
    fn test_stack_manipulation() {
        let stack = run(Builder::new()
            .push_int(1)
            .push_int(2)
            .push_int(3)
            .op(OP_ROT)
            .into_script()
            .unwrap())
        .unwrap();
        assert_eq!(stack.as_slice(), &[vec![2], vec![3], vec![1]]);

        let stack = run(Builder::new()
            .push_int(7)
            .push_int(8)
            .push_int(1)
            .op(OP_PICK)
            .into_script()
            .unwrap())
        .unwrap();
        assert_eq!(stack.as_slice(), &[vec![7], vec![8], vec![7]]);

        let stack = run(Builder::new()
            .push_int(7)
            .push_int(8)
            .push_int(1)
            .op(OP_ROLL)
            .into_script()
            .unwrap())
        .unwrap();
        assert_eq!(stack.as_slice(), &[vec![8], vec![7]]);
    }

    #[test]
    fn test_equal_uses_byte_content() {
        let stack = run(Builder::new()
            .push_data(&[1, 2, 3])
            .push_data(&[1, 2, 3])
            .op(OP_EQUAL)
            .into_script()
            .unwrap())
        .unwrap();
        assert_eq!(stack.as_slice(), &[vec![1]]);

        assert_eq!(
            run(Builder::new()
                .push_data(&[1])
                .push_data(&[2])
                .op(OP_EQUALVERIFY)
                .into_script()
                .unwrap())
            .unwrap_err(),
            ScriptError::EqualVerifyFailed
        );
    }

    #[test]
    fn test_reserved_opcode_only_fails_when_executed() {
        assert!(run_program(vec![OP_0, OP_IF, OP_RESERVED, OP_ENDIF, OP_1]).is_ok());
        assert_eq!(
            run_program(vec![OP_RESERVED]).unwrap_err(),
            ScriptError::ReservedOpcode("OP_RESERVED")
        );
    }

    // --- Signature checking -------------------------------------------------

    struct SpendFixture {
        tx: Transaction,
        secret: SecretKey,
        pubkey: Vec<u8>,
    }

    fn spend_fixture() -> SpendFixture {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[0x17; 32]).unwrap();
        let pubkey = secp256k1::PublicKey::from_secret_key(&secp, &secret)
            .serialize_uncompressed()
            .to_vec();

        let mut tx = Transaction::new();
        tx.add_input(TxIn::new(
            OutPoint {
                hash: Sha256dHash::from_bytes([0x11; 32]),
                index: 0,
            },
            Vec::new(),
        ));
        tx.add_output(TxOut::new(5_000_000_000, vec![OP_1]));
        SpendFixture { tx, secret, pubkey }
    }

    fn sign(tx: &Transaction, connected: &[u8], secret: &SecretKey) -> Vec<u8> {
        let secp = Secp256k1::new();
        let hash = tx.hash_for_signature(0, connected, SIGHASH_ALL).unwrap();
        let message = Message::from_digest_slice(hash.as_bytes()).unwrap();
        let mut sig = secp.sign_ecdsa(&message, secret).serialize_der().to_vec();
        sig.push(SIGHASH_ALL);
        sig
    }

    fn p2pkh_script(pubkey: &[u8]) -> Script {
        Builder::new()
            .op(OP_DUP)
            .op(OP_HASH160)
            .push_data(&hash160(pubkey))
            .op(OP_EQUALVERIFY)
            .op(OP_CHECKSIG)
            .into_script()
            .unwrap()
    }

    #[test]
    fn test_p2pkh_spend() {
        let fixture = spend_fixture();
        let script_pubkey = p2pkh_script(&fixture.pubkey);
        let sig = sign(&fixture.tx, script_pubkey.program(), &fixture.secret);

        let script_sig = Builder::new()
            .push_data(&sig)
            .push_data(&fixture.pubkey)
            .into_script()
            .unwrap();

        script_sig
            .correctly_spends(&fixture.tx, 0, &script_pubkey, true)
            .unwrap();
    }

    #[test]
    fn test_p2pkh_spend_rejects_corrupted_signature() {
        let fixture = spend_fixture();
        let script_pubkey = p2pkh_script(&fixture.pubkey);
        let mut sig = sign(&fixture.tx, script_pubkey.program(), &fixture.secret);
        // Corrupt a byte of the DER body, leaving the sighash byte alone.
        sig[10] ^= 0x01;

        let script_sig = Builder::new()
            .push_data(&sig)
            .push_data(&fixture.pubkey)
            .into_script()
            .unwrap();

        let err = script_sig
            .correctly_spends(&fixture.tx, 0, &script_pubkey, true)
            .unwrap_err();
        assert_eq!(err, ScriptError::NonTrueStack);
        assert_eq!(err.to_string(), "Script resulted in a non-true stack");
    }

    #[test]
    fn test_p2pkh_rejects_wrong_pubkey() {
        let fixture = spend_fixture();
        let script_pubkey = p2pkh_script(&fixture.pubkey);
        let sig = sign(&fixture.tx, script_pubkey.program(), &fixture.secret);

        let secp = Secp256k1::new();
        let other = secp256k1::PublicKey::from_secret_key(
            &secp,
            &SecretKey::from_slice(&[0x18; 32]).unwrap(),
        )
        .serialize_uncompressed()
        .to_vec();

        let script_sig = Builder::new()
            .push_data(&sig)
            .push_data(&other)
            .into_script()
            .unwrap();

        // The pubkey hash no longer matches.
        assert_eq!(
            script_sig
                .correctly_spends(&fixture.tx, 0, &script_pubkey, true)
                .unwrap_err(),
            ScriptError::EqualVerifyFailed
        );
    }

    #[test]
    fn test_checksig_after_code_separator() {
        let fixture = spend_fixture();
        let script_pubkey = Builder::new()
            .op(OP_CODESEPARATOR)
            .push_data(&fixture.pubkey)
            .op(OP_CHECKSIG)
            .into_script()
            .unwrap();

        // The connected script starts after the separator.
        let connected = &script_pubkey.program()[1..];
        let sig = sign(&fixture.tx, connected, &fixture.secret);

        let script_sig = Builder::new().push_data(&sig).into_script().unwrap();
        script_sig
            .correctly_spends(&fixture.tx, 0, &script_pubkey, true)
            .unwrap();
    }

    #[test]
    fn test_multisig_two_of_two() {
        let secp = Secp256k1::new();
        let fixture = spend_fixture();
        let secret2 = SecretKey::from_slice(&[0x19; 32]).unwrap();
        let pubkey2 = secp256k1::PublicKey::from_secret_key(&secp, &secret2)
            .serialize_uncompressed()
            .to_vec();

        let script_pubkey = Builder::new()
            .push_int(2)
            .push_data(&fixture.pubkey)
            .push_data(&pubkey2)
            .push_int(2)
            .op(OP_CHECKMULTISIG)
            .into_script()
            .unwrap();

        let sig1 = sign(&fixture.tx, script_pubkey.program(), &fixture.secret);
        let sig2 = sign(&fixture.tx, script_pubkey.program(), &secret2);

        // Signatures in key order, after the dummy element.
        let script_sig = Builder::new()
            .push_int(0)
            .push_data(&sig1)
            .push_data(&sig2)
            .into_script()
            .unwrap();
        script_sig
            .correctly_spends(&fixture.tx, 0, &script_pubkey, true)
            .unwrap();

        // Swapped signatures must not verify.
        let script_sig = Builder::new()
            .push_int(0)
            .push_data(&sig2)
            .push_data(&sig1)
            .into_script()
            .unwrap();
        assert_eq!(
            script_sig
                .correctly_spends(&fixture.tx, 0, &script_pubkey, true)
                .unwrap_err(),
            ScriptError::NonTrueStack
        );
    }

    #[test]
    fn test_multisig_one_of_two() {
        let secp = Secp256k1::new();
        let fixture = spend_fixture();
        let secret2 = SecretKey::from_slice(&[0x19; 32]).unwrap();
        let pubkey2 = secp256k1::PublicKey::from_secret_key(&secp, &secret2)
            .serialize_uncompressed()
            .to_vec();

        let script_pubkey = Builder::new()
            .push_int(1)
            .push_data(&fixture.pubkey)
            .push_data(&pubkey2)
            .push_int(2)
            .op(OP_CHECKMULTISIG)
            .into_script()
            .unwrap();

        // Either key's signature satisfies a 1-of-2.
        for secret in [&fixture.secret, &secret2] {
            let sig = sign(&fixture.tx, script_pubkey.program(), secret);
            let script_sig = Builder::new()
                .push_int(0)
                .push_data(&sig)
                .into_script()
                .unwrap();
            script_sig
                .correctly_spends(&fixture.tx, 0, &script_pubkey, true)
                .unwrap();
        }
    }

    #[test]
    fn test_multisig_key_count_range() {
        let fixture = spend_fixture();
        let script = Builder::new()
            .push_int(0)
            .push_int(21)
            .op(OP_CHECKMULTISIG)
            .into_script()
            .unwrap();
        let mut stack = Stack::new();
        assert_eq!(
            execute_script(Some(&fixture.tx), 0, &script, &mut stack).unwrap_err(),
            ScriptError::PubKeyCountOutOfRange
        );
    }

    #[test]
    fn test_checksig_without_context() {
        let script = Builder::new()
            .push_data(&[0x01])
            .push_data(&[0x02])
            .op(OP_CHECKSIG)
            .into_script()
            .unwrap();
        let mut stack = Stack::new();
        assert_eq!(
            execute_script(None, 0, &script, &mut stack).unwrap_err(),
            ScriptError::MissingTransactionContext
        );
    }

    #[test]
    fn test_checksig_malformed_signature_pushes_false() {
        let fixture = spend_fixture();
        let script_pubkey = Builder::new()
            .push_data(&fixture.pubkey)
            .op(OP_CHECKSIG)
            .into_script()
            .unwrap();
        let script_sig = Builder::new()
            .push_data(&[0xDE, 0xAD, 0xBE, 0xEF, SIGHASH_ALL])
            .into_script()
            .unwrap();
        // Malformed signatures return false rather than aborting.
        assert_eq!(
            script_sig
                .correctly_spends(&fixture.tx, 0, &script_pubkey, true)
                .unwrap_err(),
            ScriptError::NonTrueStack
        );
    }

    // --- P2SH ---------------------------------------------------------------

    fn p2sh_script_pubkey(inner: &[u8]) -> Script {
        Builder::new()
            .op(OP_HASH160)
            .push_data(&hash160(inner))
            .op(OP_EQUAL)
            .into_script()
            .unwrap()
    }

    #[test]
    fn test_p2sh_spend() {
        let fixture = spend_fixture();
        // Inner script: <n> OP_EQUAL satisfied by pushing n first.
        let inner = Builder::new().push_int(7).op(OP_EQUAL).into_bytes();
        let script_pubkey = p2sh_script_pubkey(&inner);

        let script_sig = Builder::new()
            .push_int(7)
            .push_data(&inner)
            .into_script()
            .unwrap();
        script_sig
            .correctly_spends(&fixture.tx, 0, &script_pubkey, true)
            .unwrap();

        // Wrong inner-script argument fails only when P2SH is enforced.
        let bad_sig = Builder::new()
            .push_int(8)
            .push_data(&inner)
            .into_script()
            .unwrap();
        assert_eq!(
            bad_sig
                .correctly_spends(&fixture.tx, 0, &script_pubkey, true)
                .unwrap_err(),
            ScriptError::NonTrueStack
        );
        bad_sig
            .correctly_spends(&fixture.tx, 0, &script_pubkey, false)
            .unwrap();
    }

    #[test]
    fn test_p2sh_rejects_non_push_script_sig() {
        let fixture = spend_fixture();
        let inner = Builder::new().push_int(7).op(OP_EQUAL).into_bytes();
        let script_pubkey = p2sh_script_pubkey(&inner);

        let script_sig = Builder::new()
            .push_int(3)
            .push_int(4)
            .op(OP_ADD)
            .push_data(&inner)
            .into_script()
            .unwrap();
        assert_eq!(
            script_sig
                .correctly_spends(&fixture.tx, 0, &script_pubkey, true)
                .unwrap_err(),
            ScriptError::P2shScriptSigNotPushOnly
        );
    }

    #[test]
    fn test_oversized_program_rejected() {
        let fixture = spend_fixture();
        let big = Script::new(vec![OP_NOP; MAX_SCRIPT_SIZE + 1]).unwrap();
        let ok = Builder::new().push_int(1).into_script().unwrap();
        assert_eq!(
            ok.correctly_spends(&fixture.tx, 0, &big, false).unwrap_err(),
            ScriptError::ScriptTooLarge
        );
    }
}
