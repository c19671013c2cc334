//! Proof-of-payment normalization
//!
//! Every claim stores a single `proof` string: the transaction hash for BSC
//! payments, the stored screenshot filename for everything else, or "" when
//! no proof was supplied. Screenshot files are written to the configured
//! upload directory with a unix-time prefix.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::Path;

use crate::claims::PaymentMethod;

/// A file received from the submission form
#[derive(Debug, Clone)]
pub struct ProofUpload {
    pub original_name: String,
    pub data: Vec<u8>,
}

/// The normalized proof for a claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedProof {
    /// BSC payments carry the transaction hash (possibly empty)
    TxHash(String),
    /// Uploaded screenshot persisted under the upload directory
    StoredFile(String),
    /// No proof supplied
    Missing,
}

impl ResolvedProof {
    /// The string persisted in the claim's `proof` column
    pub fn stored_value(&self) -> &str {
        match self {
            ResolvedProof::TxHash(hash) => hash,
            ResolvedProof::StoredFile(name) => name,
            ResolvedProof::Missing => "",
        }
    }
}

/// Normalize the submitted proof for a payment method.
///
/// BSC claims keep the transaction hash and ignore any upload. Other methods
/// persist the uploaded screenshot (if any) as
/// `<unix_seconds>_<original basename>`. Write failures bubble up; callers
/// log them and fall back to an empty proof so the claim still goes through.
pub fn resolve(
    method: PaymentMethod,
    upload: Option<ProofUpload>,
    tx_hash: Option<&str>,
    upload_dir: &Path,
) -> Result<ResolvedProof> {
    if method == PaymentMethod::Bsc {
        return Ok(ResolvedProof::TxHash(
            tx_hash.unwrap_or_default().to_string(),
        ));
    }

    let upload = match upload {
        Some(upload) => upload,
        None => return Ok(ResolvedProof::Missing),
    };

    fs::create_dir_all(upload_dir).with_context(|| {
        format!("Failed to create upload directory {}", upload_dir.display())
    })?;

    // Strip any path the client sent along; keep just the base name
    let base = Path::new(&upload.original_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "proof".to_string());

    let filename = format!("{}_{}", Utc::now().timestamp(), base);
    let target = upload_dir.join(&filename);

    fs::write(&target, &upload.data)
        .with_context(|| format!("Failed to store proof at {}", target.display()))?;

    Ok(ResolvedProof::StoredFile(filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_upload_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "slh-gateway-proof-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ))
    }

    #[test]
    fn test_bsc_passes_hash_through() {
        let dir = temp_upload_dir();
        let proof = resolve(PaymentMethod::Bsc, None, Some("0xabc123"), &dir).unwrap();
        assert_eq!(proof, ResolvedProof::TxHash("0xabc123".to_string()));
        assert_eq!(proof.stored_value(), "0xabc123");
    }

    #[test]
    fn test_bsc_without_hash_is_empty() {
        let dir = temp_upload_dir();
        let proof = resolve(PaymentMethod::Bsc, None, None, &dir).unwrap();
        assert_eq!(proof.stored_value(), "");
    }

    #[test]
    fn test_bsc_ignores_upload() {
        let dir = temp_upload_dir();
        let upload = ProofUpload {
            original_name: "receipt.png".to_string(),
            data: vec![1, 2, 3],
        };
        let proof = resolve(PaymentMethod::Bsc, Some(upload), Some("0xdd"), &dir).unwrap();
        assert_eq!(proof, ResolvedProof::TxHash("0xdd".to_string()));
        assert!(!dir.exists());
    }

    #[test]
    fn test_no_upload_is_missing() {
        let dir = temp_upload_dir();
        let proof = resolve(PaymentMethod::Bank, None, None, &dir).unwrap();
        assert_eq!(proof, ResolvedProof::Missing);
        assert_eq!(proof.stored_value(), "");
    }

    #[test]
    fn test_upload_stored_with_time_prefix() {
        let dir = temp_upload_dir();
        let upload = ProofUpload {
            original_name: "receipt.png".to_string(),
            data: b"fake image bytes".to_vec(),
        };

        let proof = resolve(PaymentMethod::Bit, Some(upload), None, &dir).unwrap();
        let name = proof.stored_value().to_string();

        assert!(name.ends_with("_receipt.png"), "unexpected name: {}", name);
        let prefix = name.split('_').next().unwrap();
        assert!(prefix.chars().all(|c| c.is_ascii_digit()));

        let written = fs::read(dir.join(&name)).unwrap();
        assert_eq!(written, b"fake image bytes");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_client_path_components_stripped() {
        let dir = temp_upload_dir();
        let upload = ProofUpload {
            original_name: "../../etc/receipt.png".to_string(),
            data: vec![0u8; 4],
        };

        let proof = resolve(PaymentMethod::Paybox, Some(upload), None, &dir).unwrap();
        let name = proof.stored_value();

        assert!(name.ends_with("_receipt.png"));
        assert!(!name.contains(".."));
        assert!(dir.join(name).exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
