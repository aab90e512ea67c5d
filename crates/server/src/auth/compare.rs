//! Constant-time comparison of secrets and signatures.
//!
//! Both sides are reduced to a SHA-256 digest before comparing, so the
//! comparison always runs over two 32-byte buffers. Neither the position of
//! the first differing byte nor a length mismatch changes the amount of work.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `message` under `key`.
#[must_use]
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length; the error arm is unreachable
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return Vec::new();
    };
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Compare two byte strings in constant time, returning a [`Choice`].
#[must_use]
pub fn digest_eq(expected: &[u8], provided: &[u8]) -> Choice {
    let expected = Sha256::digest(expected);
    let provided = Sha256::digest(provided);
    expected.as_slice().ct_eq(provided.as_slice())
}

/// Compare two byte strings in constant time.
#[must_use]
pub fn secure_eq(expected: &[u8], provided: &[u8]) -> bool {
    digest_eq(expected, provided).into()
}

/// Compare `provided` against every candidate without stopping at the first match.
#[must_use]
pub fn matches_any<I, T>(candidates: I, provided: &[u8]) -> bool
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    candidates
        .into_iter()
        .fold(Choice::from(0), |acc, candidate| {
            acc | digest_eq(candidate.as_ref(), provided)
        })
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_eq_equal() {
        assert!(secure_eq(b"hello", b"hello"));
        assert!(secure_eq(b"", b""));
    }

    #[test]
    fn test_secure_eq_not_equal() {
        assert!(!secure_eq(b"hello", b"world"));
        assert!(!secure_eq(b"hello", b"hell"));
        assert!(!secure_eq(b"hello", b"helloo"));
        assert!(!secure_eq(b"hello", b""));
    }

    #[test]
    fn test_secure_eq_same_length_mismatch() {
        let secret = b"s3cret-value-0001";
        assert!(!secure_eq(secret, b"s3cret-value-0002"));
        assert!(!secure_eq(secret, b"t3cret-value-0001"));
        assert!(!secure_eq(secret, &[0u8; 17]));
    }

    #[test]
    fn test_hmac_sha256_known_vector() {
        // RFC 4231 test case 2
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_matches_any() {
        let candidates = ["first", "second", "third"];
        assert!(matches_any(candidates, b"second"));
        assert!(matches_any(candidates, b"third"));
        assert!(!matches_any(candidates, b"fourth"));
        assert!(!matches_any(Vec::<&str>::new(), b""));
    }
}
