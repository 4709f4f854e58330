//! Provenance: who vouches for which graphs, and whether they still match.
//!
//! An [`Authority`] publishes its public key into the container. A
//! [`Warrant`] issued by a closed authority records SHA-256 digests of the
//! canonical form of selected graphs and signs them. Verification needs only
//! the container: the certificate segment, the warrant graph and the
//! asserted graphs.
//!
//! Basic example
//!
//! ```no_run
//! use aff4::provenance::{verify_warrant, Authority, CryptoContext, Warrant};
//! use aff4::{Container, ContainerConfig};
//! use aff4_bevy::MemoryStore;
//!
//! let mut c = Container::create(MemoryStore::new(), ContainerConfig::default()).unwrap();
//! let volume = c.volume().to_string();
//! let key = CryptoContext::generate(2048).unwrap();
//! let mut authority = Authority::new("aff4://examiner", "examiner@lab", key);
//! authority.close(&mut c).unwrap();
//!
//! let mut warrant = Warrant::new("aff4://warrant/1", &authority).unwrap();
//! warrant.assert_graph(&mut c, &volume).unwrap();
//! warrant.close(&mut c).unwrap();
//!
//! assert!(verify_warrant(&c, "aff4://warrant/1").is_valid());
//! ```

pub mod authority;
pub mod canonical;
pub mod crypto;
pub mod warrant;

pub use authority::{authorities, Authority};
pub use canonical::GraphCanonicalizer;
pub use crypto::{load_keypair, load_public_key, CryptoContext};
pub use warrant::{
    verify_all_warrants, verify_warrant, warrants, AssertionReport, AssertionStatus,
    SignatureStatus, Warrant, WarrantReport,
};
