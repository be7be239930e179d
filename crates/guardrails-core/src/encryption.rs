use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use guardrails_shared::{GuardrailsError, Result};
use rand::RngCore;
use std::path::Path;

const NONCE_LEN: usize = 12;

/// Encrypts `ProxyModelConfig.api_key_encrypted` at rest (§3, §9). A single 32-byte
/// key is persisted once at `<data_dir>/proxy_encryption.key`; each ciphertext
/// carries its own random nonce and is base64-packed as `nonce || ciphertext`,
/// grounded on `proxy_service.py`'s Fernet key-file pattern but using AEAD directly
/// (see DESIGN.md for the Fernet-to-AES-GCM substitution rationale).
pub struct ApiKeyCipher {
    cipher: Aes256Gcm,
}

impl ApiKeyCipher {
    pub fn load_or_create(data_dir: &str) -> Result<Self> {
        let path = Path::new(data_dir).join("proxy_encryption.key");

        let key_bytes = if path.exists() {
            let raw = std::fs::read(&path)
                .map_err(|e| GuardrailsError::ConfigError(format!("reading encryption key: {e}")))?;
            if raw.len() != 32 {
                return Err(GuardrailsError::ConfigError(
                    "proxy_encryption.key is not 32 bytes".to_string(),
                ));
            }
            raw
        } else {
            std::fs::create_dir_all(data_dir)
                .map_err(|e| GuardrailsError::ConfigError(format!("creating data dir: {e}")))?;
            let mut key = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut key);
            std::fs::write(&path, &key)
                .map_err(|e| GuardrailsError::ConfigError(format!("writing encryption key: {e}")))?;
            key
        };

        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| GuardrailsError::InternalError(format!("encryption failed: {e}")))?;

        let mut packed = nonce_bytes.to_vec();
        packed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(packed))
    }

    pub fn decrypt(&self, packed_b64: &str) -> Result<String> {
        let packed = BASE64
            .decode(packed_b64)
            .map_err(|e| GuardrailsError::InternalError(format!("invalid ciphertext encoding: {e}")))?;

        if packed.len() < NONCE_LEN {
            return Err(GuardrailsError::InternalError("ciphertext too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = packed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| GuardrailsError::InternalError(format!("decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| GuardrailsError::InternalError(format!("decrypted key is not utf8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_fresh_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let cipher = ApiKeyCipher::load_or_create(dir.path().to_str().unwrap()).unwrap();

        let ciphertext = cipher.encrypt("sk-upstream-secret").unwrap();
        assert_ne!(ciphertext, "sk-upstream-secret");
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), "sk-upstream-secret");
    }

    #[test]
    fn reuses_persisted_key_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();

        let cipher_a = ApiKeyCipher::load_or_create(path).unwrap();
        let ciphertext = cipher_a.encrypt("sk-upstream-secret").unwrap();

        let cipher_b = ApiKeyCipher::load_or_create(path).unwrap();
        assert_eq!(cipher_b.decrypt(&ciphertext).unwrap(), "sk-upstream-secret");
    }
}
