//! Credential-at-rest envelope — spec §6/§3 `CredentialBundle`/I-K1.
//!
//! Key derivation: PBKDF2-HMAC-SHA-256, 100,000 iterations, 256-bit key.
//! Cipher: AES-256-GCM (authenticated). A failed authentication tag always
//! surfaces as [`CredentialError::InvalidPassphrase`] — never a panic, never
//! a partially-decrypted buffer.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

use crate::error::CredentialError;
use crate::types::{CredentialBundle, EncryptedEnvelope, StoredCredentials};

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;

fn derive_key(passphrase: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

/// Encrypt a [`CredentialBundle`] with `passphrase`, producing the on-disk envelope.
pub fn encrypt(bundle: &CredentialBundle, passphrase: &str) -> anyhow::Result<EncryptedEnvelope> {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut iv);

    let key_bytes = derive_key(passphrase, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let plaintext = serde_json::to_vec(bundle)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_ref())
        .map_err(|_| anyhow::anyhow!("encryption failure"))?;

    Ok(EncryptedEnvelope {
        data: ciphertext,
        salt: salt.to_vec(),
        iv: iv.to_vec(),
        encrypted: true,
    })
}

/// Decrypt an [`EncryptedEnvelope`] with `passphrase`.
///
/// Returns [`CredentialError::InvalidPassphrase`] when the AEAD tag fails to
/// verify — the only failure mode this function exposes, per I-K1.
pub fn decrypt(envelope: &EncryptedEnvelope, passphrase: &str) -> Result<CredentialBundle, CredentialError> {
    let key_bytes = derive_key(passphrase, &envelope.salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let nonce = Nonce::from_slice(&envelope.iv);

    let plaintext = cipher
        .decrypt(nonce, envelope.data.as_ref())
        .map_err(|_| CredentialError::InvalidPassphrase)?;

    serde_json::from_slice(&plaintext).map_err(|_| CredentialError::InvalidPassphrase)
}

/// Resolve a [`StoredCredentials`] record to a usable [`CredentialBundle`].
///
/// Plain bundles pass through `passphrase` unused. Encrypted bundles require
/// `passphrase` to be `Some` and correct.
pub fn resolve(stored: &StoredCredentials, passphrase: Option<&str>) -> Result<CredentialBundle, CredentialError> {
    match stored {
        StoredCredentials::Plain(bundle) => Ok(bundle.clone()),
        StoredCredentials::Encrypted(envelope) => {
            let passphrase = passphrase.ok_or(CredentialError::InvalidPassphrase)?;
            decrypt(envelope, passphrase)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_bundle() -> CredentialBundle {
        let mut secrets = HashMap::new();
        secrets.insert("openai".to_string(), "sk-test-123".to_string());
        secrets.insert("anthropic".to_string(), "sk-ant-456".to_string());
        CredentialBundle { secrets }
    }

    #[test]
    fn roundtrip_with_correct_passphrase() {
        let bundle = sample_bundle();
        let envelope = encrypt(&bundle, "correct horse battery staple").unwrap();
        let decrypted = decrypt(&envelope, "correct horse battery staple").unwrap();
        assert_eq!(decrypted.secrets, bundle.secrets);
    }

    #[test]
    fn wrong_passphrase_fails_with_invalid_passphrase() {
        let bundle = sample_bundle();
        let envelope = encrypt(&bundle, "right-password").unwrap();
        let err = decrypt(&envelope, "wrong-password").unwrap_err();
        assert!(matches!(err, CredentialError::InvalidPassphrase));
    }

    #[test]
    fn each_encryption_uses_a_fresh_salt_and_iv() {
        let bundle = sample_bundle();
        let a = encrypt(&bundle, "pw").unwrap();
        let b = encrypt(&bundle, "pw").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn resolve_plain_ignores_passphrase() {
        let stored = StoredCredentials::Plain(sample_bundle());
        let resolved = resolve(&stored, None).unwrap();
        assert_eq!(resolved.secrets, sample_bundle().secrets);
    }

    #[test]
    fn resolve_encrypted_without_passphrase_fails() {
        let envelope = encrypt(&sample_bundle(), "pw").unwrap();
        let stored = StoredCredentials::Encrypted(envelope);
        assert!(matches!(resolve(&stored, None), Err(CredentialError::InvalidPassphrase)));
    }
}
