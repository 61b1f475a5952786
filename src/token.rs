//! CashToken payload attached to transaction outputs
//!
//! Encoding: `category (32) | bitfield (1) | [commitment] | [amount]`
//!
//! Bitfield layout:
//! - 0x80 reserved, must be unset
//! - 0x40 HAS_COMMITMENT_LENGTH: a VarInt-prefixed commitment follows
//! - 0x20 HAS_NFT
//! - 0x10 HAS_AMOUNT: a VarInt fungible amount follows the commitment
//! - 0x0f NFT capability (0 none, 1 mutable, 2 minting)

use crate::codec::{varint_size, ByteReader, ByteWriter, Decodable, Encodable};
use crate::constants::MAX_TOKEN_COMMITMENT_LENGTH;
use crate::error::CodecError;
use crate::types::Hash;
use serde::{Deserialize, Serialize};

/// Prefix byte marking a token-carrying output script.
pub const PREFIX_TOKEN: u8 = 0xef;

const RESERVED_BIT: u8 = 0x80;
const HAS_COMMITMENT_LENGTH: u8 = 0x40;
const HAS_NFT: u8 = 0x20;
const HAS_AMOUNT: u8 = 0x10;
const CAPABILITY_MASK: u8 = 0x0f;

/// Capability of a non-fungible token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Capability {
    /// Immutable NFT
    #[default]
    None,
    /// Commitment may be changed by spending
    Mutable,
    /// May create new NFTs of the same category
    Minting,
}

impl Capability {
    pub fn to_byte(self) -> u8 {
        match self {
            Capability::None => 0,
            Capability::Mutable => 1,
            Capability::Minting => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Capability::None),
            1 => Some(Capability::Mutable),
            2 => Some(Capability::Minting),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NonFungibleToken {
    pub capability: Capability,
    pub commitment: Vec<u8>,
}

/// Token payload: a category id plus a fungible amount and/or an NFT.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenData {
    pub category: Hash,
    pub amount: Option<i64>,
    pub nft: Option<NonFungibleToken>,
}

impl TokenData {
    pub fn fungible(category: Hash, amount: i64) -> Self {
        Self {
            category,
            amount: Some(amount),
            nft: None,
        }
    }

    pub fn non_fungible(category: Hash, capability: Capability, commitment: Vec<u8>) -> Self {
        Self {
            category,
            amount: None,
            nft: Some(NonFungibleToken {
                capability,
                commitment,
            }),
        }
    }

    /// Fungible amount, zero when the token carries none.
    pub fn amount_or_zero(&self) -> i64 {
        self.amount.unwrap_or(0)
    }

    pub fn capability(&self) -> Option<Capability> {
        self.nft.as_ref().map(|nft| nft.capability)
    }

    pub fn commitment(&self) -> &[u8] {
        self.nft.as_ref().map_or(&[], |nft| nft.commitment.as_slice())
    }

    fn bitfield(&self) -> u8 {
        let mut bits = 0u8;
        if let Some(nft) = &self.nft {
            bits |= HAS_NFT | nft.capability.to_byte();
            if !nft.commitment.is_empty() {
                bits |= HAS_COMMITMENT_LENGTH;
            }
        }
        if self.amount.is_some() {
            bits |= HAS_AMOUNT;
        }
        bits
    }

    /// Check the structural rules a decoded token must satisfy.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.nft.is_none() && self.amount.is_none() {
            return Err(CodecError::TokenEncodingInvalid("token has neither nft nor amount"));
        }
        if let Some(amount) = self.amount {
            if amount <= 0 {
                return Err(CodecError::TokenEncodingInvalid("amount must be positive"));
            }
        }
        if self.commitment().len() > MAX_TOKEN_COMMITMENT_LENGTH {
            return Err(CodecError::TokenEncodingInvalid("commitment too long"));
        }
        Ok(())
    }
}

impl Encodable for TokenData {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_bytes(&self.category);
        writer.write_u8(self.bitfield());
        let commitment = self.commitment();
        if !commitment.is_empty() {
            writer.write_var_bytes(commitment);
        }
        if let Some(amount) = self.amount {
            writer.write_varint(amount as u64);
        }
    }

    fn serialized_size(&self) -> usize {
        let commitment = self.commitment();
        let mut size = 32 + 1;
        if !commitment.is_empty() {
            size += varint_size(commitment.len() as u64) + commitment.len();
        }
        if let Some(amount) = self.amount {
            size += varint_size(amount as u64);
        }
        size
    }
}

impl Decodable for TokenData {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let category = reader.read_hash()?;
        let bits = reader.read_u8()?;

        if bits & RESERVED_BIT != 0 {
            return Err(CodecError::TokenEncodingInvalid("reserved bit set"));
        }
        let capability = Capability::from_byte(bits & CAPABILITY_MASK)
            .ok_or(CodecError::TokenEncodingInvalid("unknown capability"))?;
        let has_nft = bits & HAS_NFT != 0;
        let has_commitment = bits & HAS_COMMITMENT_LENGTH != 0;
        let has_amount = bits & HAS_AMOUNT != 0;

        if !has_nft && (has_commitment || capability != Capability::None) {
            return Err(CodecError::TokenEncodingInvalid("nft fields without nft flag"));
        }
        if !has_nft && !has_amount {
            return Err(CodecError::TokenEncodingInvalid("token has neither nft nor amount"));
        }

        let commitment = if has_commitment {
            let bytes = reader.read_var_bytes()?;
            if bytes.is_empty() {
                return Err(CodecError::TokenEncodingInvalid("empty commitment"));
            }
            if bytes.len() > MAX_TOKEN_COMMITMENT_LENGTH {
                return Err(CodecError::TokenEncodingInvalid("commitment too long"));
            }
            bytes.to_vec()
        } else {
            Vec::new()
        };

        let amount = if has_amount {
            let raw = reader.read_varint()?;
            if raw == 0 || raw > i64::MAX as u64 {
                return Err(CodecError::TokenEncodingInvalid("amount out of range"));
            }
            Some(raw as i64)
        } else {
            None
        };

        Ok(Self {
            category,
            amount,
            nft: has_nft.then(|| NonFungibleToken {
                capability,
                commitment,
            }),
        })
    }
}
