//! Manifest entry signing and signature checks.

use crate::error::{SignerError, SignerResult};
use crate::key::{KeyPair, PublicKey};
use base64::Engine;
use ed25519_dalek::Signer as _;
use ed25519_dalek::Verifier;
use onekey_core::manifest::{ManifestEntry, ManifestSignature};

/// Signs manifest entries on behalf of a repository.
pub struct ManifestSigner {
    keypair: KeyPair,
}

impl ManifestSigner {
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    pub fn from_secret_key(s: &str) -> SignerResult<Self> {
        Ok(Self::new(KeyPair::from_secret_key(s)?))
    }

    /// Generate a new signer with a random key.
    pub fn generate(key_name: impl Into<String>) -> Self {
        Self::new(KeyPair::generate(key_name))
    }

    pub fn key_name(&self) -> &str {
        &self.keypair.name
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.keypair.public
    }

    pub fn public_key_string(&self) -> String {
        self.keypair.public_key_string()
    }

    /// Sign an entry in place, replacing any existing signature.
    pub fn sign(&self, entry: &mut ManifestEntry) {
        entry.signature = Some(self.sign_fingerprint(&entry.fingerprint()));
    }

    /// Sign a fingerprint string and return the signature.
    pub fn sign_fingerprint(&self, fingerprint: &str) -> ManifestSignature {
        let sig = self
            .keypair
            .secret
            .signing_key()
            .sign(fingerprint.as_bytes());
        ManifestSignature {
            key_name: self.keypair.name.clone(),
            signature: base64::engine::general_purpose::STANDARD.encode(sig.to_bytes()),
        }
    }
}

/// Verify one signature over an entry's fingerprint.
pub fn verify_signature(
    entry: &ManifestEntry,
    signature: &ManifestSignature,
    public_key: &PublicKey,
) -> SignerResult<()> {
    let sig_bytes = base64::engine::general_purpose::STANDARD
        .decode(&signature.signature)
        .map_err(|e| SignerError::InvalidSignature(format!("invalid base64: {e}")))?;

    let sig_array: [u8; 64] = sig_bytes.try_into().map_err(|b: Vec<u8>| {
        SignerError::InvalidSignature(format!("expected 64 bytes, got {}", b.len()))
    })?;

    let signature = ed25519_dalek::Signature::from_bytes(&sig_array);

    public_key
        .verifying_key()
        .verify(entry.fingerprint().as_bytes(), &signature)
        .map_err(|_| SignerError::VerificationFailed)
}

/// The set of public keys a client trusts, looked up by key name.
#[derive(Clone, Debug, Default)]
pub struct TrustedKeys {
    keys: Vec<(String, PublicKey)>,
}

impl TrustedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every `name:base64` entry; the first malformed key fails the whole set.
    pub fn parse_all<S: AsRef<str>>(keys: &[S]) -> SignerResult<Self> {
        let mut trusted = Self::new();
        for key in keys {
            let (name, public) = PublicKey::parse(key.as_ref())?;
            trusted.insert(name, public);
        }
        Ok(trusted)
    }

    /// Add a key; a key with the same name is replaced.
    pub fn insert(&mut self, name: impl Into<String>, key: PublicKey) {
        let name = name.into();
        self.keys.retain(|(n, _)| n != &name);
        self.keys.push((name, key));
    }

    pub fn get(&self, name: &str) -> Option<&PublicKey> {
        self.keys.iter().find(|(n, _)| n == name).map(|(_, k)| k)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Verify a signature using the trusted key named by the signature.
    pub fn verify(&self, entry: &ManifestEntry, signature: &ManifestSignature) -> SignerResult<()> {
        let key = self
            .get(&signature.key_name)
            .ok_or_else(|| SignerError::UnknownKey(signature.key_name.clone()))?;
        verify_signature(entry, signature, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onekey_core::{AppId, ContentHash, DepotId, ManifestId};

    fn entry() -> ManifestEntry {
        ManifestEntry {
            app_id: AppId(440),
            depot_id: DepotId(441),
            manifest_id: ManifestId(1),
            revision: 1,
            content_hash: ContentHash::compute(b"payload"),
            size: 7,
            signature: None,
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = ManifestSigner::generate("repo-1");
        let mut entry = entry();
        signer.sign(&mut entry);

        let sig = entry.signature.clone().unwrap();
        assert_eq!(sig.key_name, "repo-1");
        assert!(verify_signature(&entry, &sig, signer.public_key()).is_ok());
    }

    #[test]
    fn test_verify_with_wrong_key() {
        let signer1 = ManifestSigner::generate("key-1");
        let signer2 = ManifestSigner::generate("key-2");
        let mut entry = entry();
        signer1.sign(&mut entry);

        let sig = entry.signature.clone().unwrap();
        assert!(matches!(
            verify_signature(&entry, &sig, signer2.public_key()),
            Err(SignerError::VerificationFailed)
        ));
    }

    #[test]
    fn test_signature_covers_revision() {
        let signer = ManifestSigner::generate("repo-1");
        let mut entry = entry();
        signer.sign(&mut entry);
        entry.revision += 1;

        let sig = entry.signature.clone().unwrap();
        assert!(verify_signature(&entry, &sig, signer.public_key()).is_err());
    }

    #[test]
    fn test_trusted_keys_lookup_by_name() {
        let signer = ManifestSigner::generate("repo-1");
        let trusted = TrustedKeys::parse_all(&[signer.public_key_string()]).unwrap();
        assert_eq!(trusted.len(), 1);

        let mut entry = entry();
        signer.sign(&mut entry);
        let sig = entry.signature.clone().unwrap();
        assert!(trusted.verify(&entry, &sig).is_ok());

        let renamed = ManifestSignature {
            key_name: "other".to_string(),
            ..sig
        };
        assert!(matches!(
            trusted.verify(&entry, &renamed),
            Err(SignerError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_malformed_signature_is_rejected() {
        let signer = ManifestSigner::generate("repo-1");
        let bad = ManifestSignature {
            key_name: "repo-1".to_string(),
            signature: "AAAA".to_string(),
        };
        assert!(matches!(
            verify_signature(&entry(), &bad, signer.public_key()),
            Err(SignerError::InvalidSignature(_))
        ));
    }
}
