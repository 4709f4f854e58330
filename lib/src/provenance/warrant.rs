//! Warrants: signed statements that named graphs had a given content.
//!
//! A warrant's properties live in a graph named after the warrant. For each
//! asserted graph it records the digest method, the SHA-256 of the graph's
//! canonical form, and who asserted it. Closing the warrant adds its type,
//! authority and signing time, then signs the canonical form of its own
//! graph and stores the base64 signature in that same graph.
//!
//! Verification runs in two steps. The signature is checked first; only if
//! it holds are the recorded digests compared against the graphs as they
//! are now. A warrant missing any required fact fails closed.

use aff4_bevy::BlobStore;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{SecondsFormat, Utc};
use log::{info, warn};

use crate::consts::{
    ASSERTED_BY, ASSERTS, AUTHORITY, DIGEST_METHOD, DIGEST_VALUE, SHA256_DIGEST, SIGNATURE,
    SIGNED_AT, TYPE, WARRANT, XSD_BASE64, XSD_DATETIME,
};
use crate::container::Container;
use crate::errors::Aff4Error;
use crate::provenance::authority::Authority;
use crate::provenance::canonical::GraphCanonicalizer;
use crate::term::Object;
use crate::Result;

/// A warrant being assembled. Borrows the authority that will sign it.
#[derive(Debug)]
pub struct Warrant<'a> {
    urn: String,
    authority: &'a Authority,
    asserted: Vec<String>,
    canonicalizer: GraphCanonicalizer,
}

impl<'a> Warrant<'a> {
    /// Start a warrant issued by a closed `authority`.
    pub fn new(urn: impl Into<String>, authority: &'a Authority) -> Result<Self> {
        if !authority.is_closed() {
            return Err(Aff4Error::AuthorityNotClosed(authority.urn().to_string()));
        }
        if !authority.crypto().can_sign() {
            return Err(Aff4Error::Key(format!(
                "authority {} has no private key",
                authority.urn()
            )));
        }
        Ok(Self {
            urn: urn.into(),
            authority,
            asserted: Vec::new(),
            canonicalizer: GraphCanonicalizer::new(),
        })
    }

    pub fn urn(&self) -> &str {
        &self.urn
    }

    /// Graphs asserted so far.
    pub fn asserted(&self) -> &[String] {
        &self.asserted
    }

    /// Record the current digest of graph `graph`. Returns the hex digest.
    pub fn assert_graph<S: BlobStore>(
        &mut self,
        container: &mut Container<S>,
        graph: &str,
    ) -> Result<String> {
        if graph == self.urn {
            return Err(Aff4Error::InvalidWarrant {
                warrant: self.urn.clone(),
                reason: "a warrant cannot assert its own graph".to_string(),
            });
        }
        self.ensure_unissued(container)?;
        let digest = self.canonicalizer.digest_graph(container.graph(), graph);
        if self.asserted.iter().any(|g| g == graph) {
            return Ok(digest);
        }
        let w = self.urn.as_str();
        let store = container.graph_mut();
        store.insert(w, w, ASSERTS, Object::resource(graph));
        store.insert(w, graph, DIGEST_METHOD, Object::resource(SHA256_DIGEST));
        store.insert(w, graph, DIGEST_VALUE, Object::literal(digest.as_str()));
        store.insert(w, graph, ASSERTED_BY, Object::resource(w));
        self.asserted.push(graph.to_string());
        Ok(digest)
    }

    /// A URN already closed as a warrant cannot be signed again.
    fn ensure_unissued<S: BlobStore>(&self, container: &Container<S>) -> Result<()> {
        let w = self.urn.as_str();
        let issued = container
            .graph()
            .query(Some(w), Some(w), Some(TYPE), Some(&Object::resource(WARRANT)));
        if issued.is_empty() {
            Ok(())
        } else {
            Err(Aff4Error::Exists(self.urn.clone()))
        }
    }

    /// Finalize and sign. Returns the base64 signature.
    pub fn close<S: BlobStore>(self, container: &mut Container<S>) -> Result<String> {
        self.ensure_unissued(container)?;
        let w = self.urn.as_str();
        let signed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        {
            let store = container.graph_mut();
            store.insert(w, w, TYPE, Object::resource(WARRANT));
            store.insert(w, w, AUTHORITY, Object::resource(self.authority.urn()));
            store.insert(w, w, SIGNED_AT, Object::typed(signed_at, XSD_DATETIME));
        }
        let canonical = self
            .canonicalizer
            .canonicalize_graph(container.graph(), w);
        let signature = self.authority.crypto().sign(canonical.as_bytes())?;
        let encoded = STANDARD.encode(signature);
        container.graph_mut().insert(
            w,
            w,
            SIGNATURE,
            Object::typed(encoded.as_str(), XSD_BASE64),
        );
        info!(
            "Signed warrant {} over {} graph(s) as {}",
            w,
            self.asserted.len(),
            self.authority.urn()
        );
        Ok(encoded)
    }
}

// ---------------- Verification ----------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    Valid,
    Invalid,
    /// The warrant could not be checked at all (missing facts, unreadable key).
    Unverifiable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertionStatus {
    Match,
    Mismatch { expected: String, actual: String },
    /// The warrant's record of this graph is incomplete or unsupported.
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionReport {
    pub graph: String,
    pub status: AssertionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarrantReport {
    pub warrant: String,
    pub authority: Option<String>,
    pub signature: SignatureStatus,
    /// Empty unless the signature is valid.
    pub assertions: Vec<AssertionReport>,
}

impl WarrantReport {
    pub fn is_valid(&self) -> bool {
        self.signature == SignatureStatus::Valid
            && self
                .assertions
                .iter()
                .all(|a| a.status == AssertionStatus::Match)
    }

    fn unverifiable(warrant: &str, authority: Option<String>, reason: String) -> Self {
        warn!("Warrant {} is unverifiable: {}", warrant, reason);
        Self {
            warrant: warrant.to_string(),
            authority,
            signature: SignatureStatus::Unverifiable(reason),
            assertions: Vec::new(),
        }
    }
}

/// Check warrant `urn`: signature first, then every asserted digest.
pub fn verify_warrant<S: BlobStore>(container: &Container<S>, urn: &str) -> WarrantReport {
    let graph = container.graph();
    let authority_urn = match graph.require_resource(Some(urn), urn, AUTHORITY) {
        Ok(a) => a.to_string(),
        Err(e) => return WarrantReport::unverifiable(urn, None, e.to_string()),
    };
    let authority = Some(authority_urn.clone());
    let signature = match graph.require(Some(urn), urn, SIGNATURE) {
        Ok(Object::Literal(lit)) => match STANDARD.decode(lit.value.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                return WarrantReport::unverifiable(
                    urn,
                    authority,
                    format!("bad signature encoding: {e}"),
                )
            }
        },
        Ok(_) => {
            return WarrantReport::unverifiable(
                urn,
                authority,
                "signature is not a literal".to_string(),
            )
        }
        Err(e) => return WarrantReport::unverifiable(urn, authority, e.to_string()),
    };
    let signer = match Authority::load(container, &authority_urn) {
        Ok(a) => a,
        Err(e) => {
            return WarrantReport::unverifiable(
                urn,
                authority,
                format!("cannot load authority {authority_urn}: {e}"),
            )
        }
    };

    let canonicalizer = GraphCanonicalizer::new();
    let canonical = canonicalizer.canonicalize_graph(graph, urn);
    if !signer.crypto().verify(canonical.as_bytes(), &signature) {
        warn!("Warrant {} has an invalid signature", urn);
        return WarrantReport {
            warrant: urn.to_string(),
            authority,
            signature: SignatureStatus::Invalid,
            assertions: Vec::new(),
        };
    }

    let mut assertions = Vec::new();
    for asserted in graph.objects(Some(urn), urn, ASSERTS) {
        let report = match asserted.as_resource() {
            Some(g) => AssertionReport {
                graph: g.to_string(),
                status: check_assertion(container, urn, g, &canonicalizer),
            },
            None => AssertionReport {
                graph: asserted.to_string(),
                status: AssertionStatus::Malformed(
                    "asserted graph is not a resource".to_string(),
                ),
            },
        };
        if report.status != AssertionStatus::Match {
            warn!("Warrant {}: graph {} {:?}", urn, report.graph, report.status);
        }
        assertions.push(report);
    }
    WarrantReport {
        warrant: urn.to_string(),
        authority,
        signature: SignatureStatus::Valid,
        assertions,
    }
}

fn check_assertion<S: BlobStore>(
    container: &Container<S>,
    warrant: &str,
    graph_name: &str,
    canonicalizer: &GraphCanonicalizer,
) -> AssertionStatus {
    let graph = container.graph();
    let method = match graph.require_resource(Some(warrant), graph_name, DIGEST_METHOD) {
        Ok(m) => m,
        Err(e) => return AssertionStatus::Malformed(e.to_string()),
    };
    if method != SHA256_DIGEST {
        return AssertionStatus::Malformed(format!("unsupported digest method {method}"));
    }
    let expected = match graph.require(Some(warrant), graph_name, DIGEST_VALUE) {
        Ok(Object::Literal(lit)) => lit.value.to_ascii_lowercase(),
        Ok(_) => return AssertionStatus::Malformed("digest value is not a literal".to_string()),
        Err(e) => return AssertionStatus::Malformed(e.to_string()),
    };
    match graph.require_resource(Some(warrant), graph_name, ASSERTED_BY) {
        Ok(by) if by == warrant => {}
        Ok(by) => return AssertionStatus::Malformed(format!("asserted by {by}")),
        Err(e) => return AssertionStatus::Malformed(e.to_string()),
    }
    let actual = canonicalizer.digest_graph(graph, graph_name);
    if actual == expected {
        AssertionStatus::Match
    } else {
        AssertionStatus::Mismatch { expected, actual }
    }
}

/// URNs of all warrants in the container, sorted.
pub fn warrants<S: BlobStore>(container: &Container<S>) -> Vec<String> {
    container.typed_subjects(WARRANT)
}

/// Verify every warrant; one bad warrant does not stop the others.
pub fn verify_all_warrants<S: BlobStore>(container: &Container<S>) -> Vec<WarrantReport> {
    warrants(container)
        .iter()
        .map(|w| verify_warrant(container, w))
        .collect()
}
