//! Script numbers
//!
//! Little-endian sign-magnitude integers: the high bit of the last byte is
//! the sign, zero is the empty string. Values are held as [`BigInt`] so the
//! same code serves 4-byte, 64-bit and big-integer rule sets; the rule set
//! only decides how long operands may be and how large results may grow.

use crate::error::ScriptError;
use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::cmp::Ordering;

/// Operand and result bounds for arithmetic under a rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberLimits {
    /// Longest accepted operand encoding.
    pub operand_size: usize,
    /// Longest allowed result encoding; `None` leaves results unchecked.
    pub result_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScriptNum(BigInt);

impl ScriptNum {
    pub fn zero() -> Self {
        Self(BigInt::zero())
    }

    pub fn from_i64(value: i64) -> Self {
        Self(BigInt::from(value))
    }

    pub fn from_u64(value: u64) -> Self {
        Self(BigInt::from(value))
    }

    /// Decode a stack element as a number.
    pub fn decode(bytes: &[u8], require_minimal: bool, max_len: usize) -> Result<Self, ScriptError> {
        if bytes.len() > max_len {
            return Err(ScriptError::InvalidNumberRange);
        }
        if require_minimal && !is_minimally_encoded(bytes) {
            return Err(ScriptError::MinimalNumber);
        }
        Ok(Self::decode_unchecked(bytes))
    }

    /// Decode without length or minimality checks.
    pub fn decode_unchecked(bytes: &[u8]) -> Self {
        let Some((&last, rest)) = bytes.split_last() else {
            return Self::zero();
        };
        let mut magnitude = Vec::with_capacity(bytes.len());
        magnitude.extend_from_slice(rest);
        magnitude.push(last & 0x7f);
        let value = BigInt::from_bytes_le(Sign::Plus, &magnitude);
        if last & 0x80 != 0 {
            Self(-value)
        } else {
            Self(value)
        }
    }

    /// Minimal encoding.
    pub fn encode(&self) -> Vec<u8> {
        if self.0.is_zero() {
            return Vec::new();
        }
        let mut bytes = self.0.magnitude().to_bytes_le();
        let negative = self.0.is_negative();
        let last = bytes.len() - 1;
        if bytes[last] & 0x80 != 0 {
            bytes.push(if negative { 0x80 } else { 0x00 });
        } else if negative {
            bytes[last] |= 0x80;
        }
        bytes
    }

    /// Length of [`ScriptNum::encode`] without building it.
    pub fn encoded_len(&self) -> usize {
        if self.0.is_zero() {
            0
        } else {
            ((self.0.bits() + 1 + 7) / 8) as usize
        }
    }

    /// Fail with `InvalidNumberRange` when the value outgrows `limits`.
    pub fn check_result(self, limits: NumberLimits) -> Result<Self, ScriptError> {
        match limits.result_size {
            Some(max) if self.encoded_len() > max => Err(ScriptError::InvalidNumberRange),
            _ => Ok(self),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn to_i64(&self) -> Option<i64> {
        self.0.to_i64()
    }

    /// Saturating conversion for counts, indices and sizes.
    pub fn to_i64_saturating(&self) -> i64 {
        self.0.to_i64().unwrap_or(if self.0.is_negative() {
            i64::MIN
        } else {
            i64::MAX
        })
    }

    pub fn add(&self, other: &Self) -> Self {
        Self(&self.0 + &other.0)
    }

    pub fn sub(&self, other: &Self) -> Self {
        Self(&self.0 - &other.0)
    }

    pub fn mul(&self, other: &Self) -> Self {
        Self(&self.0 * &other.0)
    }

    /// Quotient truncated toward zero; `None` when dividing by zero.
    pub fn div(&self, other: &Self) -> Option<Self> {
        (!other.0.is_zero()).then(|| Self(&self.0 / &other.0))
    }

    /// Remainder with the sign of the dividend; `None` for a zero divisor.
    pub fn rem(&self, other: &Self) -> Option<Self> {
        (!other.0.is_zero()).then(|| Self(&self.0 % &other.0))
    }

    pub fn neg(&self) -> Self {
        Self(-&self.0)
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn add_one(&self) -> Self {
        Self(&self.0 + BigInt::one())
    }

    pub fn sub_one(&self) -> Self {
        Self(&self.0 - BigInt::one())
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// No unnecessary trailing zero byte and no negative zero.
pub fn is_minimally_encoded(bytes: &[u8]) -> bool {
    let Some((&last, rest)) = bytes.split_last() else {
        return true;
    };
    if last & 0x7f == 0 {
        // Only allowed when the previous byte needs its high bit for magnitude
        match rest.last() {
            Some(prev) if prev & 0x80 != 0 => {}
            _ => return false,
        }
    }
    true
}

/// Re-encode arbitrary bytes as the minimal number encoding of the same value.
pub fn minimally_encode(bytes: &[u8]) -> Vec<u8> {
    ScriptNum::decode_unchecked(bytes).encode()
}

/// Minimal encoding of an `i64`.
pub fn encode_i64(value: i64) -> Vec<u8> {
    ScriptNum::from_i64(value).encode()
}

/// Truthiness of a stack element: any non-zero byte except a lone sign bit in the last byte.
pub fn cast_to_bool(bytes: &[u8]) -> bool {
    for (i, byte) in bytes.iter().enumerate() {
        if *byte != 0 {
            // Negative zero
            if i == bytes.len() - 1 && *byte == 0x80 {
                return false;
            }
            return true;
        }
    }
    false
}
