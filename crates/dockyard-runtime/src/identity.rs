//! Container identity scheme.
//!
//! An identity is `<logical-name><SEPARATOR><suffix>` where the suffix is
//! exactly [`SUFFIX_LEN`] characters of lowercase base32hex. Stripping the
//! last `SUFFIX_LEN + 1` characters of any identity recovers its logical
//! name; every rename-on-recreate path depends on that width.
//!
//! Suffixes are 12 bytes (4-byte big-endian unix seconds, 5 bytes of
//! per-process randomness, 3-byte wrapping counter) encoded as 20 base32hex
//! characters, so they are unique across processes and sort roughly by
//! creation time.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Separator between the logical name and the generated suffix.
pub const SEPARATOR: char = '-';

/// Width of the generated suffix in characters.
pub const SUFFIX_LEN: usize = 20;

const ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Errors for identities that do not match the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("identity {0:?} is too short to carry a logical name and suffix")]
    TooShort(String),

    #[error("identity {0:?} has no separator before its suffix")]
    MissingSeparator(String),

    #[error("identity {0:?} has a malformed suffix")]
    InvalidSuffix(String),

    #[error("logical name {0:?} must be non-empty and contain no whitespace")]
    InvalidName(String),
}

/// Build a fresh identity for `base`.
pub fn new_identity(base: &str) -> Result<String, IdentityError> {
    if base.is_empty() || base.chars().any(char::is_whitespace) {
        return Err(IdentityError::InvalidName(base.to_string()));
    }
    Ok(format!("{base}{SEPARATOR}{}", generate_suffix()))
}

/// Recover the logical name of `identity` by stripping its suffix.
pub fn logical_name(identity: &str) -> Result<&str, IdentityError> {
    let tail = SUFFIX_LEN + SEPARATOR.len_utf8();
    if identity.len() <= tail {
        return Err(IdentityError::TooShort(identity.to_string()));
    }
    let split = identity.len() - tail;
    if !identity.is_char_boundary(split) {
        return Err(IdentityError::InvalidSuffix(identity.to_string()));
    }
    let (name, rest) = identity.split_at(split);
    let suffix = rest
        .strip_prefix(SEPARATOR)
        .ok_or_else(|| IdentityError::MissingSeparator(identity.to_string()))?;
    if !is_valid_suffix(suffix) {
        return Err(IdentityError::InvalidSuffix(identity.to_string()));
    }
    Ok(name)
}

/// Whether `identity` has the `<name>-<suffix>` shape.
pub fn is_identity(identity: &str) -> bool {
    logical_name(identity).is_ok()
}

/// Generate a new unique suffix of exactly [`SUFFIX_LEN`] characters.
pub fn generate_suffix() -> String {
    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32;
    let counter = COUNTER
        .get_or_init(|| {
            let seed = uuid::Uuid::new_v4().as_u128() as u32;
            AtomicU32::new(seed)
        })
        .fetch_add(1, Ordering::Relaxed);

    let mut raw = [0u8; 12];
    raw[..4].copy_from_slice(&seconds.to_be_bytes());
    raw[4..9].copy_from_slice(process_bytes());
    raw[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
    encode(&raw)
}

fn process_bytes() -> &'static [u8; 5] {
    static PROCESS: OnceLock<[u8; 5]> = OnceLock::new();
    PROCESS.get_or_init(|| {
        let random = uuid::Uuid::new_v4();
        let mut bytes = [0u8; 5];
        bytes.copy_from_slice(&random.as_bytes()[..5]);
        bytes
    })
}

fn encode(raw: &[u8; 12]) -> String {
    // 96 bits, padded to 100 so they split into 20 five-bit groups.
    let bits = raw.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b)) << 4;
    (0..SUFFIX_LEN)
        .rev()
        .map(|group| ALPHABET[((bits >> (group * 5)) & 0x1f) as usize] as char)
        .collect()
}

fn is_valid_suffix(suffix: &str) -> bool {
    suffix.len() == SUFFIX_LEN && suffix.bytes().all(|b| ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn suffix_has_fixed_width() {
        for _ in 0..100 {
            let suffix = generate_suffix();
            assert_eq!(suffix.len(), SUFFIX_LEN);
            assert!(is_valid_suffix(&suffix));
        }
    }

    #[test]
    fn logical_name_round_trips() {
        for base in ["node", "svcA", "web", "my-api", "a"] {
            let id = new_identity(base).unwrap();
            assert_eq!(logical_name(&id).unwrap(), base);
        }
    }

    #[test]
    fn logical_name_of_fixed_identity() {
        assert_eq!(logical_name("svcA-abcdefghijklmnopqrst").unwrap(), "svcA");
    }

    #[test]
    fn identities_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| new_identity("web").unwrap()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn malformed_identities_are_rejected() {
        assert!(matches!(logical_name("web"), Err(IdentityError::TooShort(_))));
        assert!(matches!(
            logical_name("-abcdefghijklmnopqrst"),
            Err(IdentityError::TooShort(_))
        ));
        assert!(matches!(
            logical_name("webXabcdefghijklmnopqrst"),
            Err(IdentityError::MissingSeparator(_))
        ));
        assert!(matches!(
            logical_name("web-ABCDEFGHIJKLMNOPQRST"),
            Err(IdentityError::InvalidSuffix(_))
        ));
        assert!(matches!(
            logical_name("web-abcdefghijklmnopqrsz"),
            Err(IdentityError::InvalidSuffix(_))
        ));
        assert!(!is_identity("nodereg"));
    }

    #[test]
    fn invalid_base_names_are_rejected() {
        assert!(matches!(new_identity(""), Err(IdentityError::InvalidName(_))));
        assert!(matches!(new_identity("a b"), Err(IdentityError::InvalidName(_))));
    }

    #[test]
    fn multibyte_names_do_not_panic() {
        let id = new_identity("wéb").unwrap();
        assert_eq!(logical_name(&id).unwrap(), "wéb");
        assert!(logical_name("ééééééééééééééééééééé").is_err());
    }
}
