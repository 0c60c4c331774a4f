// Copyright (C) 2023 Entropy Cryptography Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Encryption of relay frames with the session's shared symmetric key.
//!
//! The relay is untrusted and only ever sees `base64(nonce || ciphertext)`.
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::prelude::{Engine, BASE64_STANDARD};
use zeroize::Zeroize;

use crate::errors::EncryptionErr;

const NONCE_LENGTH: usize = 12;

/// AES-256-GCM keyed with the session key
#[derive(Clone)]
pub struct SessionCipher {
    cipher: Aes256Gcm,
}

impl SessionCipher {
    /// Create from the hex session key shared by the initiating device
    pub fn from_hex(key_hex: &str) -> Result<Self, EncryptionErr> {
        let mut key = hex::decode(key_hex)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| EncryptionErr::Key(e.to_string()));
        key.zeroize();
        Ok(Self { cipher: cipher? })
    }

    /// Encrypts a frame, returning base64(nonce || ciphertext)
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, EncryptionErr> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng); // 96-bits; unique per message
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| EncryptionErr::Encryption(e.to_string()))?;
        let mut output = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        output.extend_from_slice(&nonce);
        output.extend_from_slice(&ciphertext);
        Ok(BASE64_STANDARD.encode(output))
    }

    /// Decrypts a frame produced by [SessionCipher::encrypt]
    pub fn decrypt(&self, body: &str) -> Result<Vec<u8>, EncryptionErr> {
        let input = BASE64_STANDARD.decode(body)?;
        if input.len() < NONCE_LENGTH {
            return Err(EncryptionErr::TooShort);
        }
        let (nonce, ciphertext) = input.split_at(NONCE_LENGTH);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| EncryptionErr::Decryption(e.to_string()))
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionCipher")
    }
}
