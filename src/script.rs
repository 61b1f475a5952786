//! Script container and lazy instruction iteration
//!
//! A [`Script`] owns its bytes and is never mutated after construction.
//! [`Script::instructions`] walks it without copying; each call starts a
//! fresh pass.

use crate::codec::{varint_size, ByteReader, ByteWriter, Decodable, Encodable};
use crate::error::{CodecError, ScriptError};
use crate::num::encode_i64;
use crate::opcodes::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn instructions(&self) -> Instructions<'_> {
        Instructions::new(&self.0)
    }

    /// Every push in the script is complete.
    pub fn is_valid(&self) -> bool {
        self.instructions().all(|ins| ins.is_ok())
    }

    /// Only push operations (OP_RESERVED included), and well formed.
    pub fn is_push_only(&self) -> bool {
        self.instructions()
            .all(|ins| matches!(ins, Ok(ins) if is_push(ins.opcode)))
    }

    /// `OP_HASH160 <20 bytes> OP_EQUAL`
    pub fn is_p2sh20(&self) -> bool {
        let b = &self.0;
        b.len() == 23 && b[0] == OP_HASH160 && b[1] == 0x14 && b[22] == OP_EQUAL
    }

    /// `OP_HASH256 <32 bytes> OP_EQUAL`
    pub fn is_p2sh32(&self) -> bool {
        let b = &self.0;
        b.len() == 35 && b[0] == OP_HASH256 && b[1] == 0x20 && b[34] == OP_EQUAL
    }

    /// `<version> <2..40 byte program>` with a small-integer version.
    pub fn is_witness_program(&self) -> bool {
        let b = &self.0;
        if b.len() < 4 || b.len() > 42 {
            return false;
        }
        if b[0] != OP_0 && !(OP_1..=OP_16).contains(&b[0]) {
            return false;
        }
        usize::from(b[1]) + 2 == b.len()
    }

    /// Remove every occurrence of `needle` that starts on an instruction boundary.
    pub fn find_and_delete(&self, needle: &[u8]) -> Script {
        if needle.is_empty() {
            return self.clone();
        }
        let bytes = &self.0;
        let mut result = Vec::with_capacity(bytes.len());
        let mut found = false;
        let mut pc = 0;
        let mut kept_from = 0;
        loop {
            result.extend_from_slice(&bytes[kept_from..pc]);
            while bytes.len() - pc >= needle.len() && &bytes[pc..pc + needle.len()] == needle {
                pc += needle.len();
                found = true;
            }
            kept_from = pc;
            match next_instruction_end(bytes, pc) {
                Some(end) => pc = end,
                None => break,
            }
        }
        if !found {
            return self.clone();
        }
        result.extend_from_slice(&bytes[kept_from..]);
        Script(result)
    }

    /// Copy of the script with all OP_CODESEPARATOR instructions dropped.
    pub fn without_codeseparators(&self) -> Script {
        let mut out = Vec::with_capacity(self.0.len());
        let mut iter = self.instructions();
        let mut start = 0;
        while let Some(item) = iter.next() {
            match item {
                Ok(ins) if ins.opcode == OP_CODESEPARATOR => {
                    out.extend_from_slice(&self.0[start..ins.position]);
                    start = iter.position();
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
        out.extend_from_slice(&self.0[start..]);
        Script(out)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Script {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Encodable for Script {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_var_bytes(&self.0);
    }

    fn serialized_size(&self) -> usize {
        varint_size(self.0.len() as u64) + self.0.len()
    }
}

impl Decodable for Script {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self(reader.read_var_bytes()?.to_vec()))
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    pub opcode: u8,
    /// Inline data of OP_0, direct pushes and PUSHDATA1/2/4.
    pub data: Option<&'a [u8]>,
    /// Offset of the opcode byte within the script.
    pub position: usize,
}

impl<'a> Instruction<'a> {
    /// The data was pushed with the smallest possible opcode.
    pub fn is_minimal_push(&self) -> bool {
        let data = match self.data {
            Some(data) => data,
            None => return true,
        };
        match data.len() {
            0 => self.opcode == OP_0,
            1 if (1..=16).contains(&data[0]) => false,
            1 if data[0] == 0x81 => false,
            len if len <= OP_PUSHBYTES_75 as usize => self.opcode as usize == len,
            len if len <= 0xff => self.opcode == OP_PUSHDATA1,
            len if len <= 0xffff => self.opcode == OP_PUSHDATA2,
            _ => true,
        }
    }
}

/// Lazy instruction iterator. A truncated push yields one
/// `Err(ScriptError::BadOpcode)` and then ends.
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    bytes: &'a [u8],
    position: usize,
    done: bool,
}

impl<'a> Instructions<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            position: 0,
            done: false,
        }
    }

    /// Offset of the next instruction.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, ScriptError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.position >= self.bytes.len() {
            return None;
        }
        let start = self.position;
        match decode_instruction(self.bytes, start) {
            Some((instruction, end)) => {
                self.position = end;
                Some(Ok(instruction))
            }
            None => {
                self.done = true;
                Some(Err(ScriptError::BadOpcode))
            }
        }
    }
}

fn decode_instruction(bytes: &[u8], start: usize) -> Option<(Instruction<'_>, usize)> {
    let opcode = *bytes.get(start)?;
    let mut reader = ByteReader::new(&bytes[start + 1..]);
    let len = match opcode {
        OP_0..=OP_PUSHBYTES_75 => usize::from(opcode),
        OP_PUSHDATA1 => usize::from(reader.read_u8().ok()?),
        OP_PUSHDATA2 => usize::from(reader.read_u16_le().ok()?),
        OP_PUSHDATA4 => usize::try_from(reader.read_u32_le().ok()?).ok()?,
        _ => {
            return Some((
                Instruction {
                    opcode,
                    data: None,
                    position: start,
                },
                start + 1,
            ))
        }
    };
    let data = reader.read_bytes(len).ok()?;
    let end = start + 1 + reader.position();
    Some((
        Instruction {
            opcode,
            data: Some(data),
            position: start,
        },
        end,
    ))
}

fn next_instruction_end(bytes: &[u8], start: usize) -> Option<usize> {
    decode_instruction(bytes, start).map(|(_, end)| end)
}

/// Incremental script construction with minimal pushes.
#[derive(Debug, Clone, Default)]
pub struct ScriptBuilder {
    bytes: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_opcode(mut self, opcode: u8) -> Self {
        self.bytes.push(opcode);
        self
    }

    /// Push data with the smallest push opcode for its length.
    pub fn push_slice(mut self, data: &[u8]) -> Self {
        let len = data.len();
        if len <= OP_PUSHBYTES_75 as usize {
            self.bytes.push(len as u8);
        } else if len <= 0xff {
            self.bytes.push(OP_PUSHDATA1);
            self.bytes.push(len as u8);
        } else if len <= 0xffff {
            self.bytes.push(OP_PUSHDATA2);
            self.bytes.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.bytes.push(OP_PUSHDATA4);
            self.bytes.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.bytes.extend_from_slice(data);
        self
    }

    /// Push a number: OP_0, OP_1NEGATE and OP_1..OP_16 where possible.
    pub fn push_int(self, value: i64) -> Self {
        match value {
            0 => self.push_opcode(OP_0),
            -1 => self.push_opcode(OP_1NEGATE),
            1..=16 => self.push_opcode(OP_1 + (value as u8) - 1),
            _ => self.push_slice(&encode_i64(value)),
        }
    }

    pub fn into_script(self) -> Script {
        Script(self.bytes)
    }
}
