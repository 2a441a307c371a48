//! External Signer
//!
//! Authorization proofs come from outside the helper: keys never enter this
//! process. The default implementation shells out to a ckb-cli compatible
//! binary; tests substitute their own [`Signer`].

use async_trait::async_trait;
use tracing::debug;

use crate::error::{HelperError, HelperResult};
use crate::types::{decode_hex, encode_hex, SIGNATURE_LEN};

/// Produces recoverable secp256k1 signatures over sighash messages
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign `message` with the key behind `owner` (a CKB address)
    async fn sign_recoverable(
        &self,
        owner: &str,
        message: &[u8; 32],
    ) -> HelperResult<[u8; SIGNATURE_LEN]>;
}

/// Signer shelling out to `ckb-cli util sign-message`
pub struct CkbCliSigner {
    binary: String,
}

impl CkbCliSigner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Signer for CkbCliSigner {
    async fn sign_recoverable(
        &self,
        owner: &str,
        message: &[u8; 32],
    ) -> HelperResult<[u8; SIGNATURE_LEN]> {
        debug!("requesting signature from {} for {}", self.binary, owner);
        let output = tokio::process::Command::new(&self.binary)
            .args([
                "util",
                "sign-message",
                "--from-account",
                owner,
                "--message",
                &encode_hex(message),
                "--recoverable",
                "--output-format",
                "json",
            ])
            .output()
            .await
            .map_err(|e| HelperError::SignerFailure(format!("{}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(HelperError::SignerFailure(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        // ckb-cli may print a banner before the JSON object.
        let json_start = stdout.find('{').ok_or_else(|| {
            HelperError::SignerFailure(format!("no JSON in signer output: {}", stdout.trim()))
        })?;
        let value: serde_json::Value = serde_json::from_str(stdout[json_start..].trim())
            .map_err(|e| HelperError::SignerFailure(format!("unparseable signer output: {}", e)))?;
        let signature_hex = value
            .get("signature")
            .and_then(|s| s.as_str())
            .ok_or_else(|| {
                HelperError::SignerFailure("signer output has no signature field".to_string())
            })?;

        let bytes = decode_hex(signature_hex)
            .map_err(|e| HelperError::SignerFailure(format!("bad signature hex: {}", e)))?;
        bytes.try_into().map_err(|_| {
            HelperError::SignerFailure(format!(
                "signature must be {} bytes",
                SIGNATURE_LEN
            ))
        })
    }
}
