//! Script programs and their chunked view.

use crate::error::{ScriptError, ScriptResult};
use crate::num::encode_num;
use crate::opcodes::*;
use num_bigint::BigInt;
use std::fmt;

/// Longest program the interpreter accepts.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Longest single stack element.
pub const MAX_ELEMENT_SIZE: usize = 520;

/// One parsed instruction: an opcode, or the data pushed by a push
/// instruction. Both record the offset of their leading byte in the
/// original program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// A non-push opcode.
    Op { opcode: u8, offset: usize },
    /// A data push; `data` is the pushed bytes.
    Push { data: Vec<u8>, offset: usize },
}

/// An immutable script program together with its parsed chunks.
#[derive(Clone, PartialEq, Eq)]
pub struct Script {
    program: Vec<u8>,
    chunks: Vec<Chunk>,
}

impl Script {
    /// Parse a program. Fails if a push runs past the end of the program.
    pub fn new(program: Vec<u8>) -> ScriptResult<Self> {
        let chunks = parse(&program)?;
        Ok(Self { program, chunks })
    }

    /// The raw program bytes.
    pub fn program(&self) -> &[u8] {
        &self.program
    }

    /// The parsed instructions.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Program length in bytes.
    pub fn len(&self) -> usize {
        self.program.len()
    }

    /// True for the empty program.
    pub fn is_empty(&self) -> bool {
        self.program.is_empty()
    }

    /// True iff the program matches the pay-to-script-hash template:
    /// `HASH160 <20 bytes> EQUAL`, 23 bytes total.
    pub fn is_pay_to_script_hash(&self) -> bool {
        self.program.len() == 23
            && self.program[0] == OP_HASH160
            && self.program[1] == 0x14
            && self.program[22] == OP_EQUAL
    }

    /// True iff every chunk is a push or a small-constant opcode
    /// (`<= OP_16`).
    pub fn is_push_only(&self) -> bool {
        self.chunks.iter().all(|chunk| match chunk {
            Chunk::Push { .. } => true,
            Chunk::Op { opcode, .. } => *opcode <= OP_16,
        })
    }

    /// Append the canonical push instruction for `data` to `out`.
    pub fn write_push(out: &mut Vec<u8>, data: &[u8]) {
        match data.len() {
            0..=0x4B => out.push(data.len() as u8),
            0x4C..=0xFF => {
                out.push(OP_PUSHDATA1);
                out.push(data.len() as u8);
            }
            0x100..=0xFFFF => {
                out.push(OP_PUSHDATA2);
                out.extend_from_slice(&(data.len() as u16).to_le_bytes());
            }
            _ => {
                out.push(OP_PUSHDATA4);
                out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            }
        }
        out.extend_from_slice(data);
    }

    /// Copy `program`, omitting every instruction whose starting bytes equal
    /// `pattern`.
    ///
    /// The scan advances instruction by instruction with the same push
    /// lengths the parser uses, so a byte sequence inside a push never
    /// matches.
    pub fn remove_all_instances_of(program: &[u8], pattern: &[u8]) -> ScriptResult<Vec<u8>> {
        let mut out = Vec::with_capacity(program.len());
        let mut cursor = 0usize;
        while cursor < program.len() {
            let matched = !pattern.is_empty() && program[cursor..].starts_with(pattern);
            let opcode = program[cursor];
            cursor += 1;
            let additional = match opcode {
                0x01..=0x4B => opcode as usize,
                OP_PUSHDATA1 => {
                    let len = *program.get(cursor).ok_or(ScriptError::UnexpectedEnd)? as usize;
                    1 + len
                }
                OP_PUSHDATA2 => {
                    if cursor + 2 > program.len() {
                        return Err(ScriptError::UnexpectedEnd);
                    }
                    let len =
                        u16::from_le_bytes([program[cursor], program[cursor + 1]]) as usize;
                    2 + len
                }
                OP_PUSHDATA4 => {
                    if cursor + 4 > program.len() {
                        return Err(ScriptError::UnexpectedEnd);
                    }
                    let len = u32::from_le_bytes([
                        program[cursor],
                        program[cursor + 1],
                        program[cursor + 2],
                        program[cursor + 3],
                    ]) as usize;
                    4 + len
                }
                _ => 0,
            };
            if cursor + additional > program.len() {
                return Err(ScriptError::UnexpectedEnd);
            }
            if !matched {
                out.push(opcode);
                out.extend_from_slice(&program[cursor..cursor + additional]);
            }
            cursor += additional;
        }
        Ok(out)
    }

    /// Copy `program`, omitting every occurrence of the single-byte opcode.
    pub fn remove_all_instances_of_op(program: &[u8], opcode: u8) -> ScriptResult<Vec<u8>> {
        Self::remove_all_instances_of(program, &[opcode])
    }
}

fn parse(program: &[u8]) -> ScriptResult<Vec<Chunk>> {
    let mut chunks = Vec::new();
    let mut cursor = 0usize;
    while cursor < program.len() {
        let offset = cursor;
        let opcode = program[cursor];
        cursor += 1;
        let data_len = match opcode {
            0x01..=0x4B => Some(opcode as usize),
            OP_PUSHDATA1 => {
                let len = *program.get(cursor).ok_or(ScriptError::UnexpectedEnd)? as usize;
                cursor += 1;
                Some(len)
            }
            OP_PUSHDATA2 => {
                if cursor + 2 > program.len() {
                    return Err(ScriptError::UnexpectedEnd);
                }
                let len = u16::from_le_bytes([program[cursor], program[cursor + 1]]) as usize;
                cursor += 2;
                Some(len)
            }
            OP_PUSHDATA4 => {
                if cursor + 4 > program.len() {
                    return Err(ScriptError::UnexpectedEnd);
                }
                let len = u32::from_le_bytes([
                    program[cursor],
                    program[cursor + 1],
                    program[cursor + 2],
                    program[cursor + 3],
                ]) as usize;
                cursor += 4;
                Some(len)
            }
            _ => None,
        };
        match data_len {
            Some(len) => {
                if cursor + len > program.len() {
                    return Err(ScriptError::UnexpectedEnd);
                }
                chunks.push(Chunk::Push {
                    data: program[cursor..cursor + len].to_vec(),
                    offset,
                });
                cursor += len;
            }
            None => chunks.push(Chunk::Op { opcode, offset }),
        }
    }
    Ok(chunks)
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script(")?;
        let mut first = true;
        for chunk in &self.chunks {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            match chunk {
                Chunk::Op { opcode, .. } => write!(f, "{}", op_name(*opcode))?,
                Chunk::Push { data, .. } => write!(f, "[{}]", hex::encode(data))?,
            }
        }
        write!(f, ")")
    }
}

/// Builds programs push by push, opcode by opcode.
#[derive(Debug, Default)]
pub struct Builder(Vec<u8>);

impl Builder {
    /// Start an empty program.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a bare opcode.
    pub fn op(mut self, opcode: u8) -> Self {
        self.0.push(opcode);
        self
    }

    /// Append a canonical data push.
    pub fn push_data(mut self, data: &[u8]) -> Self {
        Script::write_push(&mut self.0, data);
        self
    }

    /// Append the shortest push of a small integer, using the dedicated
    /// constant opcodes where they exist.
    pub fn push_int(mut self, value: i64) -> Self {
        match value {
            0 => self.0.push(OP_0),
            -1 => self.0.push(OP_1NEGATE),
            1..=16 => self.0.push(OP_1 + (value as u8 - 1)),
            _ => {
                let encoded = encode_num(&BigInt::from(value));
                Script::write_push(&mut self.0, &encoded);
            }
        }
        self
    }

    /// The raw program bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Parse the accumulated program.
    pub fn into_script(self) -> ScriptResult<Script> {
        Script::new(self.0)
    }
}
