use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod encryption;

pub use encryption::{Encryption, EncryptionMode};

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("authentication required")]
    AuthenticationRequired,
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Document permission flags, the `/P` entry of the encryption dictionary.
/// Stored with the reserved bits forced to their mandated values so the
/// wire form is always conforming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions(u32);

/// Reserved bits that are always set.
const PERM_BASE: u32 = 0xFFFF_F0C0;

pub const PERM_PRINT: u32 = 1 << 2;
pub const PERM_MODIFY: u32 = 1 << 3;
pub const PERM_COPY: u32 = 1 << 4;
pub const PERM_ANNOTATE: u32 = 1 << 5;
pub const PERM_FILL_FORMS: u32 = 1 << 8;
pub const PERM_ACCESSIBILITY: u32 = 1 << 9;
pub const PERM_ASSEMBLE: u32 = 1 << 10;
pub const PERM_PRINT_HIGH_RES: u32 = 1 << 11;

const PERM_ALL_BITS: u32 = PERM_PRINT
    | PERM_MODIFY
    | PERM_COPY
    | PERM_ANNOTATE
    | PERM_FILL_FORMS
    | PERM_ACCESSIBILITY
    | PERM_ASSEMBLE
    | PERM_PRINT_HIGH_RES;

impl Permissions {
    pub fn none() -> Self {
        Permissions(PERM_BASE)
    }

    pub fn all() -> Self {
        Permissions(PERM_BASE | PERM_ALL_BITS)
    }

    pub fn from_bits(bits: u32) -> Self {
        Permissions(PERM_BASE | (bits & PERM_ALL_BITS))
    }

    /// Interpret a trailer `/P` value, which is written as a signed 32-bit
    /// integer.
    pub fn from_p(p: i64) -> Self {
        Permissions::from_bits(p as i64 as u32)
    }

    pub fn as_p(self) -> i64 {
        self.0 as i32 as i64
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn allows(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn grant(&mut self, bit: u32) {
        self.0 |= bit & PERM_ALL_BITS;
    }

    pub fn revoke(&mut self, bit: u32) {
        self.0 &= !(bit & PERM_ALL_BITS);
    }

    /// Human-readable names of every granted permission, in bit order.
    pub fn granted(self) -> Vec<&'static str> {
        const NAMES: [(u32, &str); 8] = [
            (PERM_PRINT, "print"),
            (PERM_MODIFY, "modify"),
            (PERM_COPY, "copy"),
            (PERM_ANNOTATE, "annotate"),
            (PERM_FILL_FORMS, "fill forms"),
            (PERM_ACCESSIBILITY, "extract for accessibility"),
            (PERM_ASSEMBLE, "assemble"),
            (PERM_PRINT_HIGH_RES, "print high resolution"),
        ];
        NAMES
            .iter()
            .filter(|(bit, _)| self.allows(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::none()
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let granted = self.granted();
        if granted.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", granted.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_bits_roundtrip_through_p() {
        let mut perms = Permissions::none();
        perms.grant(PERM_PRINT);
        perms.grant(PERM_COPY);
        let p = perms.as_p();
        assert!(p < 0); // high reserved bits set means negative as i32
        let back = Permissions::from_p(p);
        assert_eq!(back, perms);
        assert_eq!(back.granted(), vec!["print", "copy"]);
    }

    #[test]
    fn reserved_bits_always_present() {
        assert_eq!(Permissions::none().bits() & PERM_BASE, PERM_BASE);
        assert_eq!(Permissions::all().bits() & PERM_BASE, PERM_BASE);
    }
}
