use std::{fmt, str};

use alloy_primitives::FixedBytes;

use crate::errors::ParseError;

// 32-byte buf, useful for transfer hashes
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Buf32(pub FixedBytes<32>);

impl Buf32 {
    pub fn zero() -> Self {
        Self([0; 32].into())
    }

    /// Parses a `0x`-prefixed hex string holding exactly 32 bytes.
    pub fn from_prefixed_hex(s: &str) -> Result<Self, ParseError> {
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| ParseError::InvalidHash(s.to_string()))?;

        let mut array = [0u8; 32];
        hex::decode_to_slice(digits, &mut array)
            .map_err(|_| ParseError::InvalidHash(s.to_string()))?;

        Ok(array.into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }
}

impl From<[u8; 32]> for Buf32 {
    fn from(value: [u8; 32]) -> Self {
        Self(FixedBytes::from(value))
    }
}

impl From<Buf32> for [u8; 32] {
    fn from(value: Buf32) -> Self {
        value.0 .0
    }
}

impl fmt::Debug for Buf32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = [0; 64];
        hex::encode_to_slice(self.0, &mut buf).map_err(|_| fmt::Error)?;
        f.write_str(str::from_utf8(&buf).map_err(|_| fmt::Error)?)
    }
}

impl fmt::Display for Buf32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{self:?}")
    }
}
