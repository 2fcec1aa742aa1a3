//! Object Identity
//!
//! Root objects carry a globally unique id: 26 characters of Crockford
//! base32 encoding a 48-bit millisecond timestamp followed by 80 bits of
//! per-process entropy mixed with a monotonic counter. Ids therefore sort
//! roughly by creation time and never collide within a process.
//!
//! Caller-supplied ids are validated against the same format at
//! construction time.

use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Crockford base32 alphabet (no I, L, O, U).
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Length of a canonical id.
pub const ID_LEN: usize = 26;

fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn process_seed() -> u64 {
    static SEED: OnceLock<u64> = OnceLock::new();
    *SEED.get_or_init(|| {
        let state = std::collections::hash_map::RandomState::new();
        let mut hasher = state.build_hasher();
        std::process::id().hash(&mut hasher);
        if let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) {
            now.as_nanos().hash(&mut hasher);
        }
        hasher.finish()
    })
}

/// Globally unique identifier of a root object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Generate a fresh id.
    pub fn random() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
        let hi = splitmix64(process_seed() ^ counter);
        let lo = splitmix64(hi ^ counter.rotate_left(32));

        // 48-bit timestamp | 80-bit entropy, encoded msb-first.
        let value: u128 = ((millis as u128 & 0xFFFF_FFFF_FFFF) << 80)
            | ((hi as u128 & 0xFFFF) << 64)
            | lo as u128;

        let mut out = String::with_capacity(ID_LEN);
        for i in 0..ID_LEN {
            let shift = 125 - 5 * i;
            let index = ((value >> shift) & 0x1F) as usize;
            out.push(ALPHABET[index] as char);
        }
        Self(out)
    }

    /// Validate and wrap a caller-supplied id.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != ID_LEN || !s.bytes().all(|b| ALPHABET.contains(&b)) {
            return Err(Error::InvalidId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_canonical() {
        let id = ObjectId::random();
        assert_eq!(id.as_str().len(), ID_LEN);
        assert!(id.as_str().bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn random_ids_are_unique() {
        let a = ObjectId::random();
        let b = ObjectId::random();
        let c = ObjectId::random();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn parse_accepts_generated_ids() {
        let id = ObjectId::random();
        let parsed = ObjectId::parse(id.as_str()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_bad_formats() {
        assert!(matches!(ObjectId::parse(""), Err(Error::InvalidId(_))));
        assert!(matches!(ObjectId::parse("too-short"), Err(Error::InvalidId(_))));
        // Right length, illegal characters (lowercase, excluded letters).
        assert!(matches!(
            ObjectId::parse("abcdefghijklmnopqrstuvwxyz"),
            Err(Error::InvalidId(_))
        ));
        assert!(matches!(
            ObjectId::parse("UUUUUUUUUUUUUUUUUUUUUUUUUU"),
            Err(Error::InvalidId(_))
        ));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ObjectId::random();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_str()));
    }
}
