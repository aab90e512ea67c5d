//! AES-256-GCM sealing of credential plaintext.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, SecretBox};
use thiserror::Error;

/// Length of the vault key in bytes.
pub const KEY_LEN: usize = 32;

/// Errors parsing a [`VaultKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultKeyError {
    #[error("vault key must be 64 hex characters or base64")]
    Encoding,
    #[error("vault key must be {KEY_LEN} bytes, got {0}")]
    Length(usize),
    #[error("vault key must not be all zeros")]
    Zero,
    #[error("system randomness unavailable")]
    Random,
}

/// Errors from the cipher itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Authentication failed: wrong key, wrong tenant, or tampered data.
    #[error("ciphertext failed authentication")]
    Integrity,
    /// Sealing failed.
    #[error("encryption failed")]
    Seal,
    /// The key was rejected by the cipher.
    #[error("invalid cipher key")]
    Key,
}

/// The 256-bit vault encryption key.
pub struct VaultKey(SecretBox<[u8; KEY_LEN]>);

impl VaultKey {
    /// Parse a key from 64 hex characters or standard base64.
    ///
    /// # Errors
    ///
    /// Returns an error if the input decodes to anything but 32 non-zero bytes.
    pub fn parse(raw: &str) -> Result<Self, VaultKeyError> {
        let raw = raw.trim();
        let decoded = if raw.len() == KEY_LEN * 2 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            hex::decode(raw).map_err(|_| VaultKeyError::Encoding)?
        } else {
            STANDARD.decode(raw).map_err(|_| VaultKeyError::Encoding)?
        };

        let bytes: [u8; KEY_LEN] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| VaultKeyError::Length(decoded.len()))?;

        if bytes.iter().all(|b| *b == 0) {
            return Err(VaultKeyError::Zero);
        }

        Ok(Self(SecretBox::new(Box::new(bytes))))
    }

    /// Generate a fresh random key.
    ///
    /// # Errors
    ///
    /// Returns an error if the system random source fails.
    pub fn generate() -> Result<Self, VaultKeyError> {
        let mut bytes = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| VaultKeyError::Random)?;
        Ok(Self(SecretBox::new(Box::new(bytes))))
    }

    /// Base64 form, suitable for `VAULT_ENCRYPTION_KEY`.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0.expose_secret())
    }
}

impl Clone for VaultKey {
    fn clone(&self) -> Self {
        Self(SecretBox::new(Box::new(*self.0.expose_secret())))
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey([REDACTED])")
    }
}

/// Ciphertext with its appended tag, plus the nonce it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedToken {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

/// AEAD cipher bound to the vault key.
///
/// The additional authenticated data is the tenant's canonical shop domain,
/// so a sealed token only opens for the tenant it was sealed for.
pub struct VaultCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl VaultCipher {
    /// Bind a cipher to `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Key`] if the cipher rejects the key.
    pub fn new(key: &VaultKey) -> Result<Self, CipherError> {
        let unbound =
            UnboundKey::new(&AES_256_GCM, key.0.expose_secret()).map_err(|_| CipherError::Key)?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Seal `plaintext` under a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Seal`] if randomness or encryption fails.
    pub fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<SealedToken, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce).map_err(|_| CipherError::Seal)?;

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::from(aad),
                &mut in_out,
            )
            .map_err(|_| CipherError::Seal)?;

        Ok(SealedToken {
            ciphertext: in_out,
            nonce,
        })
    }

    /// Open a sealed blob (`ciphertext || tag`).
    ///
    /// Nothing is returned unless the tag verifies.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Integrity`] for a malformed nonce, a truncated
    /// blob, or any authentication failure.
    pub fn open(&self, aad: &[u8], nonce: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| CipherError::Integrity)?;
        if sealed.len() < AES_256_GCM.tag_len() {
            return Err(CipherError::Integrity);
        }

        let mut in_out = sealed.to_vec();
        let opened = self
            .key
            .open_in_place(Nonce::assume_unique_for_key(nonce), Aad::from(aad), &mut in_out)
            .map(|plaintext| plaintext.len());

        match opened {
            Ok(len) => {
                in_out.truncate(len);
                Ok(in_out)
            }
            Err(_) => {
                in_out.fill(0);
                Err(CipherError::Integrity)
            }
        }
    }
}

impl fmt::Debug for VaultCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultCipher")
            .field("algorithm", &"AES-256-GCM")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const HEX_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn cipher() -> VaultCipher {
        VaultCipher::new(&VaultKey::parse(HEX_KEY).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_hex_and_base64_agree() {
        let hex_key = VaultKey::parse(HEX_KEY).unwrap();
        let b64_key = VaultKey::parse(&hex_key.to_base64()).unwrap();
        assert_eq!(hex_key.to_base64(), b64_key.to_base64());
    }

    #[test]
    fn test_parse_rejects_bad_keys() {
        assert!(matches!(
            VaultKey::parse("not a key!"),
            Err(VaultKeyError::Encoding)
        ));
    }

    #[test]
    fn test_parse_rejects_wrong_length_and_zero() {
        assert!(matches!(
            VaultKey::parse(&STANDARD.encode([7u8; 16])),
            Err(VaultKeyError::Length(16))
        ));
        assert!(matches!(
            VaultKey::parse(&"00".repeat(32)),
            Err(VaultKeyError::Zero)
        ));
    }

    #[test]
    fn test_debug_redacts() {
        let key = VaultKey::parse(HEX_KEY).unwrap();
        assert_eq!(format!("{key:?}"), "VaultKey([REDACTED])");
    }

    #[test]
    fn test_generate_produces_distinct_keys() {
        let a = VaultKey::generate().unwrap();
        let b = VaultKey::generate().unwrap();
        assert_ne!(a.to_base64(), b.to_base64());
    }

    #[test]
    fn test_seal_open_round_trip() {
        let cipher = cipher();
        let sealed = cipher.seal(b"foo.myshopify.com", b"shpat_abc123").unwrap();

        assert_eq!(sealed.ciphertext.len(), b"shpat_abc123".len() + AES_256_GCM.tag_len());
        let opened = cipher
            .open(b"foo.myshopify.com", &sealed.nonce, &sealed.ciphertext)
            .unwrap();
        assert_eq!(opened, b"shpat_abc123");
    }

    #[test]
    fn test_nonces_are_fresh() {
        let cipher = cipher();
        let a = cipher.seal(b"shop", b"token").unwrap();
        let b = cipher.seal(b"shop", b"token").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_every_bit_flip_is_detected() {
        let cipher = cipher();
        let sealed = cipher.seal(b"shop", b"shpat_abc123").unwrap();

        for i in 0..sealed.ciphertext.len() * 8 {
            let mut tampered = sealed.ciphertext.clone();
            tampered[i / 8] ^= 1 << (i % 8);
            assert_eq!(
                cipher.open(b"shop", &sealed.nonce, &tampered),
                Err(CipherError::Integrity)
            );
        }

        for i in 0..NONCE_LEN * 8 {
            let mut nonce = sealed.nonce;
            nonce[i / 8] ^= 1 << (i % 8);
            assert_eq!(
                cipher.open(b"shop", &nonce, &sealed.ciphertext),
                Err(CipherError::Integrity)
            );
        }
    }

    #[test]
    fn test_wrong_aad_is_rejected() {
        let cipher = cipher();
        let sealed = cipher.seal(b"foo.myshopify.com", b"token").unwrap();
        assert_eq!(
            cipher.open(b"bar.myshopify.com", &sealed.nonce, &sealed.ciphertext),
            Err(CipherError::Integrity)
        );
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let sealed = cipher().seal(b"shop", b"token").unwrap();
        let other = VaultCipher::new(&VaultKey::generate().unwrap()).unwrap();
        assert_eq!(
            other.open(b"shop", &sealed.nonce, &sealed.ciphertext),
            Err(CipherError::Integrity)
        );
    }

    #[test]
    fn test_truncated_input_is_rejected() {
        let cipher = cipher();
        let sealed = cipher.seal(b"shop", b"token").unwrap();
        assert_eq!(
            cipher.open(b"shop", &sealed.nonce[..8], &sealed.ciphertext),
            Err(CipherError::Integrity)
        );
        assert_eq!(
            cipher.open(b"shop", &sealed.nonce, &sealed.ciphertext[..4]),
            Err(CipherError::Integrity)
        );
    }
}
