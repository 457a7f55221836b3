//! Credential vault: authenticated encryption of OAuth tokens at rest.
//!
//! Sealed format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! The 256-bit key is derived from the operator passphrase with Argon2id and
//! a fixed application salt, so the same passphrase always opens tokens
//! sealed by a previous process.

use {
    argon2::{Algorithm, Argon2, Params, Version},
    chacha20poly1305::{
        ChaCha20Poly1305, Key, Nonce,
        aead::{Aead, KeyInit},
    },
    rand::RngCore,
    secrecy::{ExposeSecret, Secret},
    soulxbot_common::{Error, Result},
    zeroize::Zeroizing,
};

pub const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Salt used when the operator does not configure one.
pub const DEFAULT_SALT: &str = "soulxbot-credential-vault";

/// Symmetric token vault keyed from a passphrase.
#[derive(Clone)]
pub struct Vault {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").field("key", &"[REDACTED]").finish()
    }
}

impl Vault {
    /// Derive the vault key from `passphrase` with the default salt and
    /// Argon2id parameters.
    pub fn new(passphrase: &Secret<String>) -> Result<Self> {
        Self::with_salt(passphrase, DEFAULT_SALT)
    }

    pub fn with_salt(passphrase: &Secret<String>, salt: &str) -> Result<Self> {
        Self::with_params(passphrase, salt, Params::default())
    }

    /// Derive with explicit Argon2 cost parameters.
    pub fn with_params(passphrase: &Secret<String>, salt: &str, params: Params) -> Result<Self> {
        if passphrase.expose_secret().is_empty() {
            return Err(Error::Config("vault passphrase must not be empty".into()));
        }
        let key = derive_key(passphrase.expose_secret().as_bytes(), salt.as_bytes(), params)?;
        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.as_slice())),
        })
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| Error::AuthenticationFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt data produced by [`Vault::encrypt`].
    ///
    /// Truncated input, tampering and a key derived from another passphrase
    /// all fail with [`Error::AuthenticationFailed`].
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::AuthenticationFailed);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::AuthenticationFailed)
    }

    pub fn seal_token(&self, token: &Secret<String>) -> Result<Vec<u8>> {
        self.encrypt(token.expose_secret().as_bytes())
    }

    pub fn open_token(&self, sealed: &[u8]) -> Result<Secret<String>> {
        let plain = Zeroizing::new(self.decrypt(sealed)?);
        let token = String::from_utf8(plain.to_vec()).map_err(|_| Error::AuthenticationFailed)?;
        Ok(Secret::new(token))
    }
}

fn derive_key(passphrase: &[u8], salt: &[u8], params: Params) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(passphrase, salt, key.as_mut_slice())
        .map_err(|e| Error::Config(format!("vault key derivation failed: {e}")))?;
    Ok(key)
}

/// One-shot encryption with a key derived from `passphrase`.
pub fn encrypt(plaintext: &[u8], passphrase: &Secret<String>) -> Result<Vec<u8>> {
    Vault::new(passphrase)?.encrypt(plaintext)
}

/// One-shot decryption with a key derived from `passphrase`.
pub fn decrypt(sealed: &[u8], passphrase: &Secret<String>) -> Result<Vec<u8>> {
    Vault::new(passphrase)?.decrypt(sealed)
}

/// Cheap Argon2 parameters for tests in dependent crates.
#[doc(hidden)]
pub fn fast_vault(passphrase: &str) -> Result<Vault> {
    let params = Params::new(256, 1, 1, Some(KEY_LEN))
        .map_err(|e| Error::Config(format!("argon2 params: {e}")))?;
    Vault::with_params(&Secret::new(passphrase.to_string()), DEFAULT_SALT, params)
}
