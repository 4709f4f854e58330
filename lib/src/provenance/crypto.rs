//! RSA key handling and PKCS#1 v1.5 / SHA-256 signatures.
//!
//! Keys travel as PEM text. Private keys are read as PKCS#8 or PKCS#1;
//! public keys as SubjectPublicKeyInfo or PKCS#1. Whatever the input, the
//! public key written into a container is SubjectPublicKeyInfo PEM.

use std::fmt;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::errors::Aff4Error;
use crate::Result;

fn pem_text(pem: &[u8]) -> Result<&str> {
    std::str::from_utf8(pem).map_err(|_| Aff4Error::Key("PEM is not valid UTF-8".to_string()))
}

/// Parse a private key from PEM bytes.
pub fn load_keypair(pem: &[u8]) -> Result<RsaPrivateKey> {
    let text = pem_text(pem)?;
    RsaPrivateKey::from_pkcs8_pem(text)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(text))
        .map_err(|e| Aff4Error::Key(format!("cannot parse private key: {e}")))
}

/// Parse a public key from PEM bytes.
pub fn load_public_key(pem: &[u8]) -> Result<RsaPublicKey> {
    let text = pem_text(pem)?;
    RsaPublicKey::from_public_key_pem(text)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(text))
        .map_err(|e| Aff4Error::Key(format!("cannot parse public key: {e}")))
}

/// Signing and verification state for one authority.
///
/// Holds a public key and, when the holder is able to sign, the matching
/// private key. Passed around explicitly; there is no process-wide key.
#[derive(Clone)]
pub struct CryptoContext {
    private: Option<RsaPrivateKey>,
    public: RsaPublicKey,
}

impl fmt::Debug for CryptoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoContext")
            .field("can_sign", &self.can_sign())
            .finish_non_exhaustive()
    }
}

impl CryptoContext {
    /// Generate a fresh key pair of `bits` bits.
    pub fn generate(bits: usize) -> Result<Self> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|e| Aff4Error::Key(format!("key generation failed: {e}")))?;
        Ok(Self::from_private_key(private))
    }

    pub fn from_private_key(private: RsaPrivateKey) -> Self {
        let public = private.to_public_key();
        Self {
            private: Some(private),
            public,
        }
    }

    /// Verification-only context.
    pub fn from_public_key(public: RsaPublicKey) -> Self {
        Self {
            private: None,
            public,
        }
    }

    pub fn from_private_pem(pem: &[u8]) -> Result<Self> {
        Ok(Self::from_private_key(load_keypair(pem)?))
    }

    pub fn from_public_pem(pem: &[u8]) -> Result<Self> {
        Ok(Self::from_public_key(load_public_key(pem)?))
    }

    pub fn can_sign(&self) -> bool {
        self.private.is_some()
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn public_pem(&self) -> Result<String> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Aff4Error::Key(e.to_string()))
    }

    /// PKCS#8 PEM of the private key, if this context holds one.
    pub fn private_pem(&self) -> Result<String> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| Aff4Error::Key("no private key loaded".to_string()))?;
        let pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Aff4Error::Key(e.to_string()))?;
        Ok(pem.as_str().to_owned())
    }

    /// PKCS#1 v1.5 signature over the SHA-256 of `message`.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let private = self
            .private
            .clone()
            .ok_or_else(|| Aff4Error::Crypto("no private key loaded".to_string()))?;
        let signing_key = SigningKey::<Sha256>::new(private);
        let signature = signing_key
            .try_sign(message)
            .map_err(|e| Aff4Error::Crypto(e.to_string()))?;
        Ok(signature.to_vec())
    }

    /// True only if `signature` is a valid signature of `message` under this key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::try_from(signature) else {
            return false;
        };
        VerifyingKey::<Sha256>::new(self.public.clone())
            .verify(message, &signature)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_and_tamper() {
        let ctx = CryptoContext::generate(1024).unwrap();
        let sig = ctx.sign(b"graph digest").unwrap();
        assert!(ctx.verify(b"graph digest", &sig));
        assert!(!ctx.verify(b"graph digesT", &sig));
        let mut bad = sig.clone();
        bad[10] ^= 0x01;
        assert!(!ctx.verify(b"graph digest", &bad));
        assert!(!ctx.verify(b"graph digest", b"short"));
    }

    const KEY: &[u8] = include_bytes!("../../tests/fixtures/authority_key.pem");
    const PUB: &[u8] = include_bytes!("../../tests/fixtures/authority_pub.pem");

    #[test]
    fn fixture_keys_match() {
        let ctx = CryptoContext::from_private_pem(KEY).unwrap();
        let public = load_public_key(PUB).unwrap();
        assert_eq!(ctx.public_key(), &public);
    }

    #[test]
    fn pem_roundtrip_and_public_only() {
        let ctx = CryptoContext::from_private_pem(KEY).unwrap();
        let private_pem = ctx.private_pem().unwrap();
        let public_pem = ctx.public_pem().unwrap();
        assert!(public_pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        let reloaded = CryptoContext::from_private_pem(private_pem.as_bytes()).unwrap();
        let sig = reloaded.sign(b"m").unwrap();

        let verifier = CryptoContext::from_public_pem(public_pem.as_bytes()).unwrap();
        assert!(!verifier.can_sign());
        assert!(verifier.verify(b"m", &sig));
        assert!(matches!(verifier.sign(b"m"), Err(Aff4Error::Crypto(_))));
    }

    #[test]
    fn garbage_pem_is_a_key_error() {
        assert!(matches!(
            load_public_key(b"-----BEGIN PUBLIC KEY-----\nnope\n-----END PUBLIC KEY-----\n"),
            Err(Aff4Error::Key(_))
        ));
        assert!(matches!(load_keypair(&[0xff, 0xfe]), Err(Aff4Error::Key(_))));
    }
}
