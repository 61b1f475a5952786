//! Chain primitives and their wire encoding

use crate::codec::{varint_size, ByteReader, ByteWriter, Decodable, Encodable};
use crate::constants::{NOT_FOUND_VALUE, NOT_SPENT};
use crate::error::CodecError;
use crate::hashing::double_sha256;
use crate::script::Script;
use crate::token::{TokenData, PREFIX_TOKEN};
use serde::{Deserialize, Serialize};

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// OutPoint: 𝒪 = ℍ × ℕ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    /// The prevout of a coinbase input.
    pub fn null() -> Self {
        Self {
            hash: [0u8; 32],
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index == u32::MAX && self.hash == [0u8; 32]
    }
}

impl Encodable for OutPoint {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_bytes(&self.hash);
        writer.write_u32_le(self.index);
    }

    fn serialized_size(&self) -> usize {
        36
    }
}

impl Decodable for OutPoint {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            hash: reader.read_hash()?,
            index: reader.read_u32_le()?,
        })
    }
}

/// Transaction Input: ℐ = 𝒪 × 𝕊 × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub prevout: OutPoint,
    pub script: Script,
    pub sequence: u32,
}

impl Encodable for Input {
    fn encode(&self, writer: &mut ByteWriter) {
        self.prevout.encode(writer);
        self.script.encode(writer);
        writer.write_u32_le(self.sequence);
    }

    fn serialized_size(&self) -> usize {
        self.prevout.serialized_size() + self.script.serialized_size() + 4
    }
}

impl Decodable for Input {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            prevout: OutPoint::decode(reader)?,
            script: Script::decode(reader)?,
            sequence: reader.read_u32_le()?,
        })
    }
}

/// Transaction Output: 𝒯 = ℕ × 𝕊 × 𝒦?
///
/// Immutable once built: setters replace a whole field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    value: u64,
    script: Script,
    token: Option<TokenData>,
}

impl Output {
    pub fn new(value: u64, script: Script) -> Self {
        Self {
            value,
            script,
            token: None,
        }
    }

    pub fn with_token(value: u64, script: Script, token: TokenData) -> Self {
        Self {
            value,
            script,
            token: Some(token),
        }
    }

    /// Placeholder for a missing output; never valid on the wire.
    pub fn not_found() -> Self {
        Self::new(NOT_FOUND_VALUE, Script::default())
    }

    pub fn is_valid(&self) -> bool {
        self.value != NOT_FOUND_VALUE
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn token(&self) -> Option<&TokenData> {
        self.token.as_ref()
    }

    pub fn set_value(&mut self, value: u64) {
        self.value = value;
    }

    pub fn set_script(&mut self, script: Script) {
        self.script = script;
    }

    pub fn set_token(&mut self, token: Option<TokenData>) {
        self.token = token;
    }

    /// Length of the script field: prefix + token + script, or just the script.
    fn script_field_len(&self) -> usize {
        match &self.token {
            Some(token) => 1 + token.serialized_size() + self.script.len(),
            None => self.script.len(),
        }
    }

    /// Wire form, or with `wire == false` the store record form, which prefixes
    /// a 4-byte spender height (written as unspent).
    pub fn to_bytes(&self, wire: bool) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(self.serialized_size(wire));
        if !wire {
            writer.write_u32_le(NOT_SPENT);
        }
        self.encode(&mut writer);
        writer.into_bytes()
    }

    pub fn serialized_size(&self, wire: bool) -> usize {
        let field = self.script_field_len();
        let record = if wire { 0 } else { 4 };
        record + 8 + varint_size(field as u64) + field
    }

    pub fn from_bytes(data: &[u8], wire: bool, strict: bool) -> Result<Self, CodecError> {
        let mut reader = ByteReader::new(data);
        if !wire {
            reader.read_u32_le()?;
        }
        let output = Self::decode(&mut reader)?;
        if strict && !reader.is_exhausted() {
            return Err(CodecError::TrailingBytes(reader.remaining()));
        }
        Ok(output)
    }
}

impl Encodable for Output {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u64_le(self.value);
        match &self.token {
            Some(token) => {
                writer.write_varint(self.script_field_len() as u64);
                writer.write_u8(PREFIX_TOKEN);
                token.encode(writer);
                writer.write_bytes(self.script.as_bytes());
            }
            None => self.script.encode(writer),
        }
    }

    fn serialized_size(&self) -> usize {
        Output::serialized_size(self, true)
    }
}

impl Decodable for Output {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let value = reader.read_u64_le()?;
        let field = reader.read_var_bytes()?;
        match field.split_first() {
            Some((&PREFIX_TOKEN, rest)) => {
                let mut inner = ByteReader::new(rest);
                let token = TokenData::decode(&mut inner)?;
                let script = Script::from_slice(inner.peek());
                Ok(Self::with_token(value, script, token))
            }
            _ => Ok(Self::new(value, Script::from_slice(field))),
        }
    }
}

/// Transaction: 𝒯𝒳 = ℕ × ℐ* × 𝒯* × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub lock_time: u32,
}

impl Transaction {
    /// Double SHA-256 of the wire encoding, in internal byte order.
    pub fn txid(&self) -> Hash {
        double_sha256(&Encodable::to_bytes(self))
    }

    /// Exactly one input spending the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }
}

// Smallest encodings, used to bound preallocation from untrusted counts
const MIN_INPUT_SIZE: usize = 41;
const MIN_OUTPUT_SIZE: usize = 9;

fn decode_list<T: Decodable>(
    reader: &mut ByteReader<'_>,
    min_item_size: usize,
) -> Result<Vec<T>, CodecError> {
    let count = reader.read_varint()?;
    let bound = reader.remaining() / min_item_size;
    let mut items = Vec::with_capacity((count as usize).min(bound));
    for _ in 0..count {
        items.push(T::decode(reader)?);
    }
    Ok(items)
}

impl Encodable for Transaction {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u32_le(self.version);
        writer.write_varint(self.inputs.len() as u64);
        for input in &self.inputs {
            input.encode(writer);
        }
        writer.write_varint(self.outputs.len() as u64);
        for output in &self.outputs {
            output.encode(writer);
        }
        writer.write_u32_le(self.lock_time);
    }

    fn serialized_size(&self) -> usize {
        4 + varint_size(self.inputs.len() as u64)
            + self.inputs.iter().map(Encodable::serialized_size).sum::<usize>()
            + varint_size(self.outputs.len() as u64)
            + self.outputs.iter().map(|o| o.serialized_size(true)).sum::<usize>()
            + 4
    }
}

impl Decodable for Transaction {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let version = reader.read_u32_le()?;
        let inputs = decode_list(reader, MIN_INPUT_SIZE)?;
        let outputs = decode_list(reader, MIN_OUTPUT_SIZE)?;
        let lock_time = reader.read_u32_le()?;
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }
}

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}
