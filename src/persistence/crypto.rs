//! Crypto Codec Module
//!
//! AES-256-CBC encryption of individual persisted fields. Every call draws a
//! fresh IV and prepends it to the ciphertext, so identical plaintexts never
//! produce identical bytes on disk.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::error::{CacheError, Result};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Symmetric key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// IV length in bytes, one AES block
pub const IV_LEN: usize = 16;

// == Aes Codec ==
/// AES-256-CBC with PKCS#7 padding and a per-call random IV.
#[derive(Clone)]
pub struct AesCodec {
    key: [u8; KEY_LEN],
}

impl AesCodec {
    // == Constructor ==
    /// Creates a codec from a raw key.
    ///
    /// Fails with `InvalidConfig` unless the key is exactly [`KEY_LEN`] bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = key.try_into().map_err(|_| {
            CacheError::InvalidConfig(format!(
                "encryption key must be exactly {} bytes, got {}",
                KEY_LEN,
                key.len()
            ))
        })?;
        Ok(Self { key })
    }

    // == Encrypt ==
    /// Returns `iv || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext =
            Aes256CbcEnc::new(&self.key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        out
    }

    // == Decrypt ==
    /// Splits off the leading IV and decrypts the remainder.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < IV_LEN {
            return Err(CacheError::Decryption(format!(
                "ciphertext is {} bytes, shorter than the {}-byte IV",
                data.len(),
                IV_LEN
            )));
        }
        let (iv, body) = data.split_at(IV_LEN);
        if body.is_empty() || body.len() % IV_LEN != 0 {
            return Err(CacheError::Decryption(format!(
                "ciphertext body of {} bytes is not a whole number of blocks",
                body.len()
            )));
        }

        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| CacheError::Decryption("malformed IV".to_string()))?;
        Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| CacheError::Decryption("invalid padding".to_string()))
    }
}

impl std::fmt::Debug for AesCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesCodec(..)")
    }
}

// == Payload Codec ==
/// How key and value bytes are stored on disk.
///
/// Plain mode is a deployment choice; the framing is identical in both modes.
#[derive(Debug, Clone, Default)]
pub enum PayloadCodec {
    /// Raw bytes
    #[default]
    Plain,
    /// Each field encrypted independently
    Aes256Cbc(AesCodec),
}

impl PayloadCodec {
    /// Creates an encrypting codec.
    pub fn aes256(key: &[u8]) -> Result<Self> {
        AesCodec::new(key).map(Self::Aes256Cbc)
    }

    /// Returns true when stored bytes are ciphertext.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Aes256Cbc(_))
    }

    /// Converts a field into its stored form.
    pub fn encode(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Plain => data.to_vec(),
            Self::Aes256Cbc(aes) => aes.encrypt(data),
        }
    }

    /// Recovers a field from its stored form.
    pub fn decode(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        match self {
            Self::Plain => Ok(data),
            Self::Aes256Cbc(aes) => aes.decrypt(&data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8; KEY_LEN] = b"12345678901234567890123456789012";

    fn codec() -> AesCodec {
        AesCodec::new(KEY).unwrap()
    }

    #[test]
    fn test_roundtrip_empty() {
        let aes = codec();
        let ct = aes.encrypt(b"");
        // IV plus one full padding block
        assert_eq!(ct.len(), IV_LEN + 16);
        assert_eq!(aes.decrypt(&ct).unwrap(), b"");
    }

    #[test]
    fn test_roundtrip_block_aligned() {
        let aes = codec();
        let plaintext = [7u8; 32];
        let ct = aes.encrypt(&plaintext);
        assert_eq!(ct.len(), IV_LEN + 48);
        assert_eq!(aes.decrypt(&ct).unwrap(), plaintext);
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let aes = codec();
        let a = aes.encrypt(b"same plaintext");
        let b = aes.encrypt(b"same plaintext");
        assert_ne!(a[..IV_LEN], b[..IV_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_shorter_than_iv() {
        let aes = codec();
        let result = aes.decrypt(&[0u8; IV_LEN - 1]);
        assert!(matches!(result, Err(CacheError::Decryption(_))));
    }

    #[test]
    fn test_decrypt_iv_only() {
        let aes = codec();
        assert!(matches!(
            aes.decrypt(&[0u8; IV_LEN]),
            Err(CacheError::Decryption(_))
        ));
    }

    #[test]
    fn test_decrypt_partial_block() {
        let aes = codec();
        let mut ct = aes.encrypt(b"hello");
        ct.pop();
        assert!(matches!(aes.decrypt(&ct), Err(CacheError::Decryption(_))));
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails_or_differs() {
        let ct = codec().encrypt(b"top secret value");
        let other = AesCodec::new(b"abcdefghijabcdefghijabcdefghijab").unwrap();
        // A wrong key almost always breaks the padding; if it happens to
        // unpad, the plaintext still differs.
        match other.decrypt(&ct) {
            Ok(pt) => assert_ne!(pt, b"top secret value"),
            Err(e) => assert!(matches!(e, CacheError::Decryption(_))),
        }
    }

    #[test]
    fn test_key_length_enforced() {
        assert!(matches!(
            AesCodec::new(b"short"),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_plain_codec_is_identity() {
        let codec = PayloadCodec::Plain;
        assert!(!codec.is_encrypted());
        assert_eq!(codec.encode(b"a b\nc"), b"a b\nc");
        assert_eq!(codec.decode(b"a b\nc".to_vec()).unwrap(), b"a b\nc");
    }

    #[test]
    fn test_aes_payload_codec() {
        let codec = PayloadCodec::aes256(KEY).unwrap();
        assert!(codec.is_encrypted());
        let stored = codec.encode(b"value");
        assert_ne!(stored, b"value");
        assert_eq!(codec.decode(stored).unwrap(), b"value");
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let rendered = format!("{:?}", PayloadCodec::aes256(KEY).unwrap());
        assert!(!rendered.contains("1234567890"));
    }
}
