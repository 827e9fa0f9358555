//! Digest newtypes: attribute digests, ledger roots, and projection roots.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TypeError;

fn parse_hex_32(s: &str) -> Result<[u8; 32], TypeError> {
    if s.len() != 64 {
        return Err(TypeError::InvalidDigest(s.to_string()));
    }
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        let pair = &s[i * 2..i * 2 + 2];
        *byte = u8::from_str_radix(pair, 16).map_err(|_| TypeError::InvalidDigest(s.to_string()))?;
    }
    Ok(out)
}

// Inline hex encoding to avoid adding the `hex` crate as a dependency of types.
fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

macro_rules! digest_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            pub const ZERO: Self = Self([0u8; 32]);

            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }

            /// Parse from a 64-character lowercase hex string.
            pub fn from_hex(s: &str) -> Result<Self, TypeError> {
                parse_hex_32(s).map(Self)
            }

            pub fn to_hex(&self) -> String {
                encode_hex(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), encode_hex(&self.0[..4]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }
    };
}

digest_type!(
    /// Digest of an externalized attribute payload. The ledger records only
    /// this digest; the secondary attribute store holds digest → value.
    AttrHash
);

digest_type!(
    /// Root of a ledger's cryptographic transaction accumulator.
    LedgerRoot
);

digest_type!(
    /// Root of a state projection at a batch boundary.
    StateRoot
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        bytes[31] = 0x01;
        let h = AttrHash::new(bytes);
        assert_eq!(AttrHash::from_hex(&h.to_hex()).unwrap(), h);
    }

    #[test]
    fn from_hex_rejects_bad_input() {
        assert!(AttrHash::from_hex("zz").is_err());
        assert!(AttrHash::from_hex(&"g".repeat(64)).is_err());
    }

    #[test]
    fn zero_is_zero() {
        assert!(StateRoot::ZERO.is_zero());
        assert!(!StateRoot::new([1u8; 32]).is_zero());
    }
}
