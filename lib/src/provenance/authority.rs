//! Signing identities.
//!
//! An authority is a URN, a contact address and a key. Closing it publishes
//! the public key as the segment `{urn}/cert.pem` and records the identity
//! in a graph named after the authority, leaving the volume graph alone.
//! Only a closed authority can issue warrants, so every warrant points at a
//! certificate that is already in the container.

use aff4_bevy::BlobStore;
use log::info;

use crate::consts::{CONTACT, CONTAINS, IDENTITY, PUBLIC_KEY_CERTIFICATE, TYPE};
use crate::container::Container;
use crate::errors::Aff4Error;
use crate::provenance::crypto::{load_public_key, CryptoContext};
use crate::term::Object;
use crate::Result;

#[derive(Debug, Clone)]
pub struct Authority {
    urn: String,
    contact: String,
    crypto: CryptoContext,
    certificate: Option<String>,
}

impl Authority {
    pub fn new(urn: impl Into<String>, contact: impl Into<String>, crypto: CryptoContext) -> Self {
        Self {
            urn: urn.into(),
            contact: contact.into(),
            crypto,
            certificate: None,
        }
    }

    /// Authority with a key loaded from private-key PEM.
    pub fn from_private_pem(
        urn: impl Into<String>,
        contact: impl Into<String>,
        pem: &[u8],
    ) -> Result<Self> {
        Ok(Self::new(urn, contact, CryptoContext::from_private_pem(pem)?))
    }

    pub fn urn(&self) -> &str {
        &self.urn
    }

    pub fn contact(&self) -> &str {
        &self.contact
    }

    pub fn crypto(&self) -> &CryptoContext {
        &self.crypto
    }

    /// Replace the signing key. Not allowed once closed.
    pub fn set_private_cert(&mut self, pem: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.crypto = CryptoContext::from_private_pem(pem)?;
        Ok(())
    }

    /// Check a separately supplied public key against the signing key.
    pub fn set_public_cert(&mut self, pem: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let public = load_public_key(pem)?;
        if &public != self.crypto.public_key() {
            return Err(Aff4Error::Key(format!(
                "public key does not match the private key of {}",
                self.urn
            )));
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.certificate.is_some()
    }

    /// Segment holding the published public key, once closed.
    pub fn certificate_segment(&self) -> Option<&str> {
        self.certificate.as_deref()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Aff4Error::Key(format!(
                "authority {} is closed; its key can no longer change",
                self.urn
            )));
        }
        Ok(())
    }

    /// Publish the certificate and identity facts. Closing twice is a no-op.
    pub fn close<S: BlobStore>(&mut self, container: &mut Container<S>) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let segment = format!("{}/cert.pem", self.urn);
        let pem = self.crypto.public_pem()?;
        container.store().put(&segment, pem.as_bytes(), false)?;
        let urn = self.urn.as_str();
        let graph = container.graph_mut();
        graph.insert(urn, urn, TYPE, Object::resource(IDENTITY));
        graph.insert(urn, urn, CONTACT, Object::literal(self.contact.as_str()));
        graph.insert(
            urn,
            urn,
            PUBLIC_KEY_CERTIFICATE,
            Object::resource(segment.as_str()),
        );
        // kept out of the volume graph so warrants over it stay valid
        graph.insert(urn, urn, CONTAINS, Object::resource(segment.as_str()));
        info!("Closed authority {} (certificate {})", urn, segment);
        self.certificate = Some(segment);
        Ok(())
    }

    /// Load the verification side of authority `urn` from a container.
    pub fn load<S: BlobStore>(container: &Container<S>, urn: &str) -> Result<Self> {
        let graph = container.graph();
        let segment = graph
            .require_resource(Some(urn), urn, PUBLIC_KEY_CERTIFICATE)?
            .to_string();
        let contact = match graph.value(Some(urn), urn, CONTACT)? {
            Some(Object::Literal(lit)) => lit.value.clone(),
            _ => String::new(),
        };
        let pem = container.store().get(&segment)?;
        Ok(Self {
            urn: urn.to_string(),
            contact,
            crypto: CryptoContext::from_public_pem(&pem)?,
            certificate: Some(segment),
        })
    }

    /// Reattach the signing key of an authority published in an earlier
    /// session. The key must match the stored certificate.
    pub fn resume<S: BlobStore>(container: &Container<S>, urn: &str, pem: &[u8]) -> Result<Self> {
        let mut authority = Self::load(container, urn)?;
        let crypto = CryptoContext::from_private_pem(pem)?;
        if crypto.public_key() != authority.crypto.public_key() {
            return Err(Aff4Error::Key(format!(
                "private key does not match the published certificate of {}",
                urn
            )));
        }
        authority.crypto = crypto;
        Ok(authority)
    }
}

/// URNs of all identities recorded in the container, sorted.
pub fn authorities<S: BlobStore>(container: &Container<S>) -> Vec<String> {
    container.typed_subjects(IDENTITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use aff4_bevy::MemoryStore;

    const KEY: &[u8] = include_bytes!("../../tests/fixtures/authority_key.pem");
    const PUB: &[u8] = include_bytes!("../../tests/fixtures/authority_pub.pem");

    #[test]
    fn close_publishes_certificate_and_identity() {
        let mut c = Container::create(MemoryStore::new(), ContainerConfig::default()).unwrap();
        let mut a = Authority::from_private_pem("aff4://examiner", "examiner@lab", KEY).unwrap();
        a.set_public_cert(PUB).unwrap();
        a.close(&mut c).unwrap();
        a.close(&mut c).unwrap();

        assert_eq!(a.certificate_segment(), Some("aff4://examiner/cert.pem"));
        assert_eq!(c.graph().graph("aff4://examiner").len(), 4);
        // only the volume's own type fact
        assert_eq!(c.graph().graph(c.volume()).len(), 1);
        assert_eq!(authorities(&c), vec!["aff4://examiner".to_string()]);
        assert!(a.set_private_cert(KEY).is_err());

        let loaded = Authority::load(&c, "aff4://examiner").unwrap();
        assert_eq!(loaded.contact(), "examiner@lab");
        assert!(!loaded.crypto().can_sign());
        assert_eq!(loaded.crypto().public_key(), a.crypto().public_key());
    }

    #[test]
    fn resumed_authority_signs_again() {
        let mut c = Container::create(MemoryStore::new(), ContainerConfig::default()).unwrap();
        let mut a = Authority::from_private_pem("aff4://examiner", "examiner@lab", KEY).unwrap();
        a.close(&mut c).unwrap();

        let resumed = Authority::resume(&c, "aff4://examiner", KEY).unwrap();
        assert!(resumed.is_closed());
        assert!(resumed.crypto().can_sign());
        assert_eq!(resumed.contact(), "examiner@lab");

        let other = CryptoContext::generate(512).unwrap().private_pem().unwrap();
        assert!(matches!(
            Authority::resume(&c, "aff4://examiner", other.as_bytes()),
            Err(Aff4Error::Key(_))
        ));
    }

    #[test]
    fn mismatched_public_key_is_rejected() {
        let other = CryptoContext::generate(512).unwrap();
        let mut a = Authority::new("aff4://a", "a@lab", other);
        assert!(matches!(a.set_public_cert(PUB), Err(Aff4Error::Key(_))));
    }
}
