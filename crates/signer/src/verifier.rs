//! Manifest verification.
//!
//! The verifier is pure: it performs no I/O and keeps no state beyond its
//! trusted key set. A [`VerifiedManifest`] can only be produced here, which
//! is what lets the store accept nothing else.

use crate::error::VerifyError;
use crate::signer::TrustedKeys;
use bytes::Bytes;
use onekey_core::manifest::{ManifestEntry, VerificationStatus};

/// Checks downloaded manifest bytes against their index entry.
#[derive(Clone, Debug, Default)]
pub struct ManifestVerifier {
    trusted: TrustedKeys,
    require_signatures: bool,
}

impl ManifestVerifier {
    pub fn new(trusted: TrustedKeys, require_signatures: bool) -> Self {
        Self {
            trusted,
            require_signatures,
        }
    }

    /// Verify `bytes` against `entry`.
    ///
    /// Size and content hash are checked first (IntegrityError). If the entry
    /// carries a signature, or signatures are required, the signature must
    /// verify with a trusted key (AuthenticityError).
    pub fn verify(
        &self,
        entry: &ManifestEntry,
        bytes: Bytes,
    ) -> Result<VerifiedManifest, VerifyError> {
        let key = entry.key().to_string();

        if bytes.len() as u64 != entry.size {
            return Err(VerifyError::Integrity {
                key,
                detail: format!("size mismatch: expected {}, got {}", entry.size, bytes.len()),
            });
        }

        entry
            .content_hash
            .verify(&bytes)
            .map_err(|e| VerifyError::Integrity {
                key: key.clone(),
                detail: e.to_string(),
            })?;

        let status = match &entry.signature {
            Some(signature) => {
                self.trusted
                    .verify(entry, signature)
                    .map_err(|e| VerifyError::Authenticity {
                        key: key.clone(),
                        detail: e.to_string(),
                    })?;
                VerificationStatus::SignatureVerified {
                    key_name: signature.key_name.clone(),
                }
            }
            None if self.require_signatures => {
                return Err(VerifyError::Authenticity {
                    key,
                    detail: "manifest is unsigned and signatures are required".to_string(),
                });
            }
            None => VerificationStatus::HashVerified,
        };

        tracing::debug!(manifest = %key, hash = %entry.content_hash.short(), ?status, "Manifest verified");

        Ok(VerifiedManifest {
            entry: entry.clone(),
            bytes,
            status,
        })
    }
}

/// Manifest bytes that passed verification, together with their entry.
#[derive(Clone, Debug)]
pub struct VerifiedManifest {
    entry: ManifestEntry,
    bytes: Bytes,
    status: VerificationStatus,
}

impl VerifiedManifest {
    pub fn entry(&self) -> &ManifestEntry {
        &self.entry
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn status(&self) -> &VerificationStatus {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::ManifestSigner;
    use onekey_core::{AppId, ContentHash, DepotId, ManifestId};

    fn entry_for(data: &[u8]) -> ManifestEntry {
        ManifestEntry {
            app_id: AppId(440),
            depot_id: DepotId(1),
            manifest_id: ManifestId(11),
            revision: 1,
            content_hash: ContentHash::compute(data),
            size: data.len() as u64,
            signature: None,
        }
    }

    #[test]
    fn test_matching_bytes_verify() {
        let data = b"depot manifest payload";
        let verified = ManifestVerifier::default()
            .verify(&entry_for(data), Bytes::from_static(data))
            .unwrap();
        assert_eq!(verified.status(), &VerificationStatus::HashVerified);
        assert_eq!(verified.bytes().as_ref(), data);
    }

    #[test]
    fn test_any_single_tampered_byte_is_an_integrity_error() {
        let data: Vec<u8> = (0u8..=200).collect();
        let entry = entry_for(&data);
        let verifier = ManifestVerifier::default();

        for i in 0..data.len() {
            let mut tampered = data.clone();
            tampered[i] ^= 0x01;
            let result = verifier.verify(&entry, Bytes::from(tampered));
            assert!(
                matches!(result, Err(VerifyError::Integrity { .. })),
                "tampering byte {i} was not detected"
            );
        }
    }

    #[test]
    fn test_truncated_bytes_are_an_integrity_error() {
        let data = b"0123456789";
        let result = ManifestVerifier::default().verify(&entry_for(data), Bytes::from_static(&data[..9]));
        match result {
            Err(VerifyError::Integrity { detail, .. }) => assert!(detail.contains("size mismatch")),
            other => panic!("expected integrity error, got {other:?}"),
        }
    }

    #[test]
    fn test_signed_manifest_with_trusted_key() {
        let data = b"signed payload";
        let signer = ManifestSigner::generate("repo-1");
        let mut entry = entry_for(data);
        signer.sign(&mut entry);

        let trusted = TrustedKeys::parse_all(&[signer.public_key_string()]).unwrap();
        let verified = ManifestVerifier::new(trusted, true)
            .verify(&entry, Bytes::from_static(data))
            .unwrap();
        assert_eq!(
            verified.status(),
            &VerificationStatus::SignatureVerified {
                key_name: "repo-1".to_string()
            }
        );
    }

    #[test]
    fn test_signature_from_untrusted_key_is_an_authenticity_error() {
        let data = b"signed payload";
        let signer = ManifestSigner::generate("repo-1");
        let impostor = ManifestSigner::generate("repo-1");
        let mut entry = entry_for(data);
        impostor.sign(&mut entry);

        let trusted = TrustedKeys::parse_all(&[signer.public_key_string()]).unwrap();
        let result = ManifestVerifier::new(trusted, false).verify(&entry, Bytes::from_static(data));
        assert!(matches!(result, Err(VerifyError::Authenticity { .. })));
    }

    #[test]
    fn test_unsigned_manifest_when_signatures_required() {
        let data = b"unsigned";
        let result = ManifestVerifier::new(TrustedKeys::new(), true)
            .verify(&entry_for(data), Bytes::from_static(data));
        assert!(matches!(result, Err(VerifyError::Authenticity { .. })));
    }

    #[test]
    fn test_hash_is_checked_before_signature() {
        let data = b"payload";
        let mut entry = entry_for(data);
        ManifestSigner::generate("unknown").sign(&mut entry);

        let result = ManifestVerifier::default().verify(&entry, Bytes::from_static(b"paylaod"));
        assert!(matches!(result, Err(VerifyError::Integrity { .. })));
    }
}
