//! Stream-cipher factory and key schedule.
//!
//! Three named algorithms are supported: `rc4-128-md5`, `aes-128-cfb`,
//! `aes-256-cfb`. Key derivation is the EVP_BytesToKey-style schedule
//! needed for wire compatibility with existing deployments; it must not
//! be "improved" independently of the wire format.

use crate::error::CipherError;
use aes::{Aes128, Aes256};
use cipher::{InvalidLength, KeyIvInit, StreamCipher as _};
use md5::{Digest, Md5};
use rc4::{KeyInit as _, Rc4};
use std::str::FromStr;

type Aes128CfbEnc = cfb_mode::Encryptor<Aes128>;
type Aes128CfbDec = cfb_mode::Decryptor<Aes128>;
type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;
type Rc4_16 = Rc4<rc4::consts::U16>;

/// A one-directional keystream. Hides which concrete RustCrypto type
/// backs a given (method, direction) pair behind a single vtable.
trait KeyStream: Send {
    fn apply(&mut self, data: &mut [u8]);
}

macro_rules! impl_keystream {
    ($t:ty) => {
        impl KeyStream for $t {
            fn apply(&mut self, data: &mut [u8]) {
                self.apply_keystream(data);
            }
        }
    };
}

impl_keystream!(Rc4_16);
impl_keystream!(Aes128CfbEnc);
impl_keystream!(Aes128CfbDec);
impl_keystream!(Aes256CfbEnc);
impl_keystream!(Aes256CfbDec);

/// Supported encryption methods, named as on the wire / in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    Rc4Md5,
    Aes128Cfb,
    Aes256Cfb,
}

impl FromStr for CipherKind {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rc4-128-md5" => Ok(CipherKind::Rc4Md5),
            "aes-128-cfb" => Ok(CipherKind::Aes128Cfb),
            "aes-256-cfb" => Ok(CipherKind::Aes256Cfb),
            other => Err(CipherError::UnknownMethod(other.to_string())),
        }
    }
}

/// Immutable per-algorithm descriptor: key length and IV length.
#[derive(Debug, Clone, Copy)]
pub struct CipherMeta {
    kind: CipherKind,
    key_len: usize,
    iv_len: usize,
}

impl CipherMeta {
    pub fn for_kind(kind: CipherKind) -> Self {
        match kind {
            CipherKind::Rc4Md5 => CipherMeta {
                kind,
                key_len: 16,
                iv_len: 16,
            },
            CipherKind::Aes128Cfb => CipherMeta {
                kind,
                key_len: 16,
                iv_len: 16,
            },
            CipherKind::Aes256Cfb => CipherMeta {
                kind,
                key_len: 32,
                iv_len: 16,
            },
        }
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }

    pub fn iv_len(&self) -> usize {
        self.iv_len
    }

    fn new_stream(
        &self,
        derived_key: &[u8],
        iv: &[u8],
        is_encrypt: bool,
    ) -> Result<Box<dyn KeyStream>, CipherError> {
        let bad_len = |_: InvalidLength| CipherError::BadIvLength {
            expected: self.iv_len,
            got: iv.len(),
        };
        match self.kind {
            CipherKind::Rc4Md5 => {
                let mut hasher = Md5::new();
                hasher.update(derived_key);
                hasher.update(iv);
                let rc4_key = hasher.finalize();
                let stream = Rc4_16::new_from_slice(&rc4_key).map_err(bad_len)?;
                Ok(Box::new(stream))
            }
            CipherKind::Aes128Cfb if is_encrypt => {
                Ok(Box::new(Aes128CfbEnc::new_from_slices(derived_key, iv).map_err(bad_len)?))
            }
            CipherKind::Aes128Cfb => {
                Ok(Box::new(Aes128CfbDec::new_from_slices(derived_key, iv).map_err(bad_len)?))
            }
            CipherKind::Aes256Cfb if is_encrypt => {
                Ok(Box::new(Aes256CfbEnc::new_from_slices(derived_key, iv).map_err(bad_len)?))
            }
            CipherKind::Aes256Cfb => {
                Ok(Box::new(Aes256CfbDec::new_from_slices(derived_key, iv).map_err(bad_len)?))
            }
        }
    }
}

/// Owns a passphrase-derived key and the (at most) two lazily-initialized
/// direction streams for one connection.
pub struct Cipher {
    key: Vec<u8>,
    meta: CipherMeta,
    enc: Option<Box<dyn KeyStream>>,
    dec: Option<Box<dyn KeyStream>>,
}

impl Cipher {
    pub fn new(key: Vec<u8>, kind: CipherKind) -> Result<Self, CipherError> {
        if key.is_empty() {
            return Err(CipherError::EmptyKey);
        }
        Ok(Cipher {
            key,
            meta: CipherMeta::for_kind(kind),
            enc: None,
            dec: None,
        })
    }

    /// A fresh `Cipher` sharing this one's key/algorithm but with both
    /// direction streams un-initialized, for a new connection.
    pub fn clone_fresh(&self) -> Self {
        Cipher {
            key: self.key.clone(),
            meta: self.meta,
            enc: None,
            dec: None,
        }
    }

    pub fn iv_len(&self) -> usize {
        self.meta.iv_len()
    }

    pub fn is_enc_inited(&self) -> bool {
        self.enc.is_some()
    }

    pub fn is_dec_inited(&self) -> bool {
        self.dec.is_some()
    }

    /// EVP_BytesToKey-style schedule: repeatedly MD5 the previous digest
    /// concatenated with the passphrase until there is enough key material.
    fn derive_key(&self) -> Vec<u8> {
        const MD5_LEN: usize = 16;
        let key_len = self.meta.key_len();
        let count = (key_len - 1) / MD5_LEN + 1;

        let mut m = vec![0u8; count * MD5_LEN];
        m[..MD5_LEN].copy_from_slice(&Md5::digest(&self.key));

        let mut start = 0;
        for _ in 1..count {
            let prev_end = start + MD5_LEN;
            let mut d = Vec::with_capacity(MD5_LEN + self.key.len());
            d.extend_from_slice(&m[start..prev_end]);
            d.extend_from_slice(&self.key);
            let sum = Md5::digest(&d);
            start = prev_end;
            m[start..start + MD5_LEN].copy_from_slice(&sum);
        }
        m.truncate(key_len);
        m
    }

    /// Generate `2 * iv_len` random bytes. Only the last `iv_len` bytes
    /// are used to key the stream; the full prefix goes out on the wire.
    fn random_iv_prefix(&self) -> Result<Vec<u8>, CipherError> {
        let mut iv = vec![0u8; self.meta.iv_len() * 2];
        getrandom::getrandom(&mut iv).map_err(|e| CipherError::Rng(e.to_string()))?;
        Ok(iv)
    }

    pub fn new_zero_iv(&self) -> Vec<u8> {
        vec![0u8; self.meta.iv_len() * 2]
    }

    /// Initialize the encrypt stream, returning the IV prefix to send.
    pub fn init_enc(&mut self) -> Result<Vec<u8>, CipherError> {
        let iv_prefix = self.random_iv_prefix()?;
        let derived = self.derive_key();
        let iv = &iv_prefix[iv_prefix.len() - self.meta.iv_len()..];
        self.enc = Some(self.meta.new_stream(&derived, iv, true)?);
        Ok(iv_prefix)
    }

    /// Initialize the decrypt stream from a received IV prefix.
    pub fn init_dec(&mut self, iv_prefix: &[u8]) -> Result<(), CipherError> {
        let derived = self.derive_key();
        let iv = &iv_prefix[iv_prefix.len() - self.meta.iv_len()..];
        self.dec = Some(self.meta.new_stream(&derived, iv, false)?);
        Ok(())
    }

    pub fn encrypt(&mut self, data: &mut [u8]) {
        self.enc
            .as_mut()
            .expect("encrypt stream not initialized")
            .apply(data);
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        self.dec
            .as_mut()
            .expect("decrypt stream not initialized")
            .apply(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_methods() {
        assert_eq!(CipherKind::from_str("rc4-128-md5").unwrap(), CipherKind::Rc4Md5);
        assert_eq!(CipherKind::from_str("aes-128-cfb").unwrap(), CipherKind::Aes128Cfb);
        assert_eq!(CipherKind::from_str("aes-256-cfb").unwrap(), CipherKind::Aes256Cfb);
        assert!(CipherKind::from_str("rot13").is_err());
    }

    #[test]
    fn key_derivation_is_deterministic() {
        let c1 = Cipher::new(b"secret".to_vec(), CipherKind::Aes256Cfb).unwrap();
        let c2 = Cipher::new(b"secret".to_vec(), CipherKind::Aes256Cfb).unwrap();
        assert_eq!(c1.derive_key(), c2.derive_key());
        assert_eq!(c1.derive_key().len(), 32);
    }

    #[test]
    fn rejects_empty_key() {
        assert!(matches!(
            Cipher::new(Vec::new(), CipherKind::Rc4Md5),
            Err(CipherError::EmptyKey)
        ));
    }

    #[test]
    fn encrypt_then_decrypt_roundtrip_aes128() {
        for kind in [CipherKind::Rc4Md5, CipherKind::Aes128Cfb, CipherKind::Aes256Cfb] {
            let mut enc_side = Cipher::new(b"hunter2".to_vec(), kind).unwrap();
            let mut dec_side = Cipher::new(b"hunter2".to_vec(), kind).unwrap();

            let iv = enc_side.init_enc().unwrap();
            dec_side.init_dec(&iv).unwrap();

            let mut data = b"the quick brown fox".to_vec();
            let plaintext = data.clone();
            enc_side.encrypt(&mut data);
            assert_ne!(data, plaintext);

            dec_side.decrypt(&mut data);
            assert_eq!(data, plaintext);
        }
    }

    #[test]
    fn iv_prefix_is_twice_iv_len() {
        let mut c = Cipher::new(b"k".to_vec(), CipherKind::Aes128Cfb).unwrap();
        let iv = c.init_enc().unwrap();
        assert_eq!(iv.len(), 32);
    }
}
