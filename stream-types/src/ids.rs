//! Identity and keying types for FlashStream.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::WireError;

/// Alphabet for generated rendezvous identities.
const PEER_ID_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a generated rendezvous identity.
pub const GENERATED_PEER_ID_LEN: usize = 6;

/// Upper bound on an explicitly supplied identity.
pub const MAX_PEER_ID_LEN: usize = 32;

/// Characters that cannot appear in a file key.
const PATH_HOSTILE: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// The short public token an endpoint publishes through the rendezvous service.
///
/// Always stored upper-case. Generated ids are 6 alphanumeric characters;
/// caller-supplied ids are accepted case-insensitively.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Generate a fresh 6-character uppercase alphanumeric identity.
    pub fn generate() -> Self {
        let mut id = String::with_capacity(GENERATED_PEER_ID_LEN);
        let mut buf = [0u8; 16];
        while id.len() < GENERATED_PEER_ID_LEN {
            getrandom::getrandom(&mut buf).expect("getrandom failed");
            // 252 = 36 * 7; rejecting the tail keeps the distribution uniform
            for b in buf.iter().filter(|b| **b < 252) {
                if id.len() == GENERATED_PEER_ID_LEN {
                    break;
                }
                id.push(PEER_ID_ALPHABET[(*b % 36) as usize] as char);
            }
        }
        Self(id)
    }

    /// Parse a caller-supplied identity.
    ///
    /// Surrounding whitespace is trimmed and the result upper-cased. Only ASCII
    /// alphanumerics, `-` and `_` are accepted.
    pub fn parse(input: &str) -> Result<Self, WireError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_PEER_ID_LEN {
            return Err(WireError::InvalidPeerId(input.to_string()));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(WireError::InvalidPeerId(input.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Borrow the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for PeerId {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

/// Staging key for one file, derived from its declared name.
///
/// Control characters and path-hostile characters (`< > : " / \ | ? *`) are
/// replaced with `_`. Every other character, emoji included, is preserved.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileKey(String);

impl FileKey {
    /// Derive the key for a declared file name.
    pub fn from_name(name: &str) -> Self {
        let sanitized: String = name
            .chars()
            .map(|c| {
                if c.is_control() || PATH_HOSTILE.contains(&c) {
                    '_'
                } else {
                    c
                }
            })
            .collect();

        if sanitized.is_empty() {
            Self("untitled".to_string())
        } else {
            Self(sanitized)
        }
    }

    /// Wrap an already-sanitized key (e.g. read back from storage).
    pub fn from_stored(key: String) -> Self {
        Self(key)
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileKey({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_peer_id_shape() {
        for _ in 0..50 {
            let id = PeerId::generate();
            assert_eq!(id.as_str().len(), GENERATED_PEER_ID_LEN);
            assert!(id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn generated_peer_ids_differ() {
        let a = PeerId::generate();
        let b = PeerId::generate();
        // 36^6 possibilities; a collision here means the generator is broken
        assert_ne!(a, b);
    }

    #[test]
    fn peer_id_parse_is_case_insensitive() {
        let id = PeerId::parse("  ab12cd ").unwrap();
        assert_eq!(id.as_str(), "AB12CD");
        assert_eq!(id, "AB12CD".parse::<PeerId>().unwrap());
    }

    #[test]
    fn peer_id_parse_rejects_garbage() {
        assert!(PeerId::parse("").is_err());
        assert!(PeerId::parse("   ").is_err());
        assert!(PeerId::parse("has space").is_err());
        assert!(PeerId::parse("slash/id").is_err());
        assert!(PeerId::parse(&"A".repeat(MAX_PEER_ID_LEN + 1)).is_err());
    }

    #[test]
    fn file_key_replaces_path_hostile_characters() {
        let key = FileKey::from_name(r#"a<b>c:d"e/f\g|h?i*j.txt"#);
        assert_eq!(key.as_str(), "a_b_c_d_e_f_g_h_i_j.txt");
    }

    #[test]
    fn file_key_replaces_control_characters() {
        let key = FileKey::from_name("bad\u{0}name\n\t.bin");
        assert_eq!(key.as_str(), "bad_name__.bin");
    }

    #[test]
    fn file_key_preserves_unicode_and_emoji() {
        let key = FileKey::from_name("résumé 日本語 🚀.pdf");
        assert_eq!(key.as_str(), "résumé 日本語 🚀.pdf");
    }

    #[test]
    fn file_key_is_stable() {
        assert_eq!(FileKey::from_name("a.bin"), FileKey::from_name("a.bin"));
    }

    #[test]
    fn empty_name_gets_placeholder_key() {
        assert_eq!(FileKey::from_name("").as_str(), "untitled");
    }
}
