use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::errors::Error;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const DEFAULT_KEY: [u8; 16] = *b"0123456789abcdef";
const DEFAULT_IV: [u8; 16] = *b"0123456789abcdef";

/// AES-128-CBC with PKCS#7 padding and base64 text, applied to the refresh token
/// at the storage boundary only.
#[derive(Clone)]
pub struct RefreshTokenCipher {
    key: [u8; 16],
    iv: [u8; 16],
}

impl Default for RefreshTokenCipher {
    fn default() -> Self {
        Self::new(DEFAULT_KEY, DEFAULT_IV)
    }
}

impl RefreshTokenCipher {
    pub fn new(key: [u8; 16], iv: [u8; 16]) -> Self {
        Self { key, iv }
    }

    pub fn encrypt(&self, plain_text: &str) -> String {
        let encrypted = Aes128CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plain_text.as_bytes());
        STANDARD.encode(encrypted)
    }

    pub fn decrypt(&self, cipher_text: &str) -> Result<String, Error> {
        let bytes = STANDARD
            .decode(cipher_text.trim())
            .map_err(|e| Error::Crypto(format!("refresh token is not valid base64: {e}")))?;
        let decrypted = Aes128CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&bytes)
            .map_err(|e| Error::Crypto(format!("refresh token decryption failed: {e}")))?;
        String::from_utf8(decrypted)
            .map_err(|e| Error::Crypto(format!("decrypted refresh token is not UTF-8: {e}")))
    }
}

impl std::fmt::Debug for RefreshTokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenCipher").finish_non_exhaustive()
    }
}
