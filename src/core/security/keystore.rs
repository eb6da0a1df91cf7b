// Copyright (c) 2026 Emberchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Node wallet: secp256k1 ECDSA signing of entries.
//!
//! The key file holds the raw 32-byte secret and is written atomically with
//! 0600 permissions. Public keys travel as compressed SEC1 hex; signatures
//! as DER hex.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use thiserror::Error;
use zeroize::Zeroize;

use crate::core::types::{now_ms, Entry};
use serde_json::Value;
use uuid::Uuid;

/// Keystore errors.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("io")]
    Io,
    #[error("invalid key encoding")]
    InvalidKey,
    #[error("invalid signature encoding")]
    InvalidSignature,
    #[error("bad signature")]
    BadSignature,
    #[error("codec")]
    Codec,
}

fn set_private_perms_best_effort(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
}

/// Atomic write to disk (best-effort fsync, then rename).
fn atomic_write_private(path: &Path, bytes: &[u8]) -> Result<(), KeystoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|_| KeystoreError::Io)?;
    }

    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");

    {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .map_err(|_| KeystoreError::Io)?;
        f.write_all(bytes).map_err(|_| KeystoreError::Io)?;
        let _ = f.sync_all();
    }

    set_private_perms_best_effort(&tmp);
    fs::rename(&tmp, path).map_err(|_| KeystoreError::Io)?;
    set_private_perms_best_effort(path);
    Ok(())
}

/// File-backed secp256k1 wallet.
pub struct Wallet {
    signing_key: SigningKey,
}

impl Wallet {
    /// Generate an ephemeral wallet (tests, throwaway nodes).
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Load the key from `data_dir/wallet.key`, creating and persisting a
    /// fresh one if the file does not exist.
    pub fn load_or_create(data_dir: impl AsRef<Path>) -> Result<Self, KeystoreError> {
        let path: PathBuf = data_dir.as_ref().join("wallet.key");

        if path.exists() {
            let mut bytes = fs::read(&path).map_err(|_| KeystoreError::Io)?;
            let key = SigningKey::from_slice(&bytes).map_err(|_| KeystoreError::InvalidKey);
            bytes.zeroize();
            return Ok(Self { signing_key: key? });
        }

        let signing_key = SigningKey::random(&mut OsRng);
        let mut secret = signing_key.to_bytes().to_vec();
        let res = atomic_write_private(&path, &secret);
        secret.zeroize();
        res?;
        Ok(Self { signing_key })
    }

    /// Compressed SEC1 public key, lowercase hex. Used as sender identity.
    pub fn public_key_hex(&self) -> String {
        let point = self.signing_key.verifying_key().to_encoded_point(true);
        hex::encode(point.as_bytes())
    }

    /// Sign an entry's canonical payload; returns the DER signature in hex.
    ///
    /// The entry's `hash` must already be populated.
    pub fn sign_entry(&self, entry: &Entry) -> Result<String, KeystoreError> {
        let payload = entry.signing_preimage().map_err(|_| KeystoreError::Codec)?;
        let sig: Signature = self.signing_key.sign(payload.as_bytes());
        Ok(hex::encode(sig.to_der().as_bytes()))
    }

    /// Build a fully hashed and signed entry from this wallet.
    pub fn create_entry(
        &self,
        to: impl Into<String>,
        amount: u64,
        entry_type: impl Into<String>,
        data: Value,
    ) -> Result<Entry, KeystoreError> {
        let mut entry = Entry {
            entry_id: Uuid::new_v4().to_string(),
            from: self.public_key_hex(),
            to: to.into(),
            amount,
            entry_type: entry_type.into(),
            initiation_timestamp: now_ms(),
            data,
            hash: String::new(),
            signature: None,
        };
        entry.hash = entry.compute_hash().map_err(|_| KeystoreError::Codec)?;
        entry.signature = Some(self.sign_entry(&entry)?);
        Ok(entry)
    }
}

/// Verify a DER-hex ECDSA signature over `payload` against a compressed
/// SEC1 hex public key.
pub fn verify_entry_signature(
    public_key_hex: &str,
    payload: &str,
    signature_hex: &str,
) -> Result<(), KeystoreError> {
    let key_bytes = hex::decode(public_key_hex).map_err(|_| KeystoreError::InvalidKey)?;
    let key = VerifyingKey::from_sec1_bytes(&key_bytes).map_err(|_| KeystoreError::InvalidKey)?;

    let sig_bytes = hex::decode(signature_hex).map_err(|_| KeystoreError::InvalidSignature)?;
    let sig = Signature::from_der(&sig_bytes).map_err(|_| KeystoreError::InvalidSignature)?;

    key.verify(payload.as_bytes(), &sig)
        .map_err(|_| KeystoreError::BadSignature)
}
