use aff4::consts::{AUTHORITY, SIGNATURE, SIZE, XSD_BASE64};
use aff4::provenance::{
    verify_all_warrants, verify_warrant, warrants, AssertionStatus, Authority, CryptoContext,
    GraphCanonicalizer, SignatureStatus, Warrant,
};
use aff4::{Aff4Error, Container, ContainerConfig, Object, QuadStore};
use aff4_bevy::{BlobStore, MemoryStore};
use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

const KEY: &[u8] = include_bytes!("fixtures/authority_key.pem");
const WARRANT: &str = "aff4://warrant/1";

fn examiner() -> Authority {
    Authority::from_private_pem("aff4://examiner", "examiner@lab.example", KEY)
        .expect("fixture key loads")
}

/// A closed container holding one stream and one signed warrant over the volume graph.
fn signed_container() -> Result<(MemoryStore, String)> {
    let mut c = Container::create(MemoryStore::new(), ContainerConfig::default())?;
    let mut w = c.new_image_stream_named("aff4://disk")?;
    w.write(&[7u8; 10_000])?;
    w.close()?;
    let volume = c.volume().to_string();

    let mut authority = examiner();
    authority.close(&mut c)?;
    let mut warrant = Warrant::new(WARRANT, &authority)?;
    warrant.assert_graph(&mut c, &volume)?;
    warrant.close(&mut c)?;
    Ok((c.close()?, volume))
}

/// Rewrite the metadata segment through `edit`.
fn tamper(store: &MemoryStore, edit: impl FnOnce(&QuadStore) -> QuadStore) -> Result<()> {
    let text = String::from_utf8(store.get("information.json")?)?;
    let graph = aff4::text::parse_store(&text)?;
    let edited = edit(&graph);
    let text = aff4::text::serialize(edited.iter())?;
    store.put("information.json", text.as_bytes(), true)?;
    Ok(())
}

#[test]
fn untouched_warrant_verifies() -> Result<()> {
    let (store, volume) = signed_container()?;
    let c = Container::open(store)?;
    assert_eq!(warrants(&c), vec![WARRANT.to_string()]);
    let report = verify_warrant(&c, WARRANT);
    assert_eq!(report.signature, SignatureStatus::Valid);
    assert_eq!(report.authority.as_deref(), Some("aff4://examiner"));
    assert_eq!(report.assertions.len(), 1);
    assert_eq!(report.assertions[0].graph, volume);
    assert!(report.is_valid());
    Ok(())
}

#[test]
fn mutated_graph_is_a_digest_mismatch_not_a_signature_failure() -> Result<()> {
    let (store, volume) = signed_container()?;
    tamper(&store, |g| {
        g.iter()
            .map(|q| {
                let mut q = q.clone();
                if q.subject == "aff4://disk" && q.predicate == SIZE {
                    q.object = Object::long(9_999);
                }
                q
            })
            .collect()
    })?;

    let c = Container::open(store)?;
    let report = verify_warrant(&c, WARRANT);
    assert_eq!(report.signature, SignatureStatus::Valid);
    assert!(!report.is_valid());
    match &report.assertions[0].status {
        AssertionStatus::Mismatch { expected, actual } => {
            assert_ne!(expected, actual);
            assert_eq!(
                actual,
                &GraphCanonicalizer::new().digest_graph(c.graph(), &volume)
            );
        }
        other => panic!("expected a mismatch, got {other:?}"),
    }
    Ok(())
}

#[test]
fn corrupted_signature_fails_before_digests_are_checked() -> Result<()> {
    let (store, _) = signed_container()?;
    tamper(&store, |g| {
        g.iter()
            .map(|q| {
                let mut q = q.clone();
                if q.predicate == SIGNATURE {
                    let lit = q.object.as_literal().expect("signature literal");
                    let mut raw = STANDARD.decode(&lit.value).expect("base64");
                    raw[0] ^= 0x80;
                    q.object = Object::typed(STANDARD.encode(raw), XSD_BASE64);
                }
                q
            })
            .collect()
    })?;

    let c = Container::open(store)?;
    let report = verify_warrant(&c, WARRANT);
    assert_eq!(report.signature, SignatureStatus::Invalid);
    assert!(report.assertions.is_empty());
    assert!(!report.is_valid());
    Ok(())
}

#[test]
fn facts_added_to_the_warrant_graph_break_the_signature() -> Result<()> {
    let (store, _) = signed_container()?;
    tamper(&store, |g| {
        let mut g = g.clone();
        g.insert(WARRANT, WARRANT, "aff4://note", Object::literal("smuggled"));
        g
    })?;
    let c = Container::open(store)?;
    assert_eq!(verify_warrant(&c, WARRANT).signature, SignatureStatus::Invalid);
    Ok(())
}

#[test]
fn malformed_warrant_fails_closed() -> Result<()> {
    let (store, _) = signed_container()?;
    tamper(&store, |g| {
        g.iter()
            .filter(|q| q.predicate != AUTHORITY)
            .cloned()
            .collect()
    })?;
    let c = Container::open(store)?;
    let report = verify_warrant(&c, WARRANT);
    assert!(matches!(report.signature, SignatureStatus::Unverifiable(_)));
    assert!(!report.is_valid());
    Ok(())
}

#[test]
fn missing_certificate_is_unverifiable() -> Result<()> {
    let (store, _) = signed_container()?;
    assert!(store.remove("aff4://examiner/cert.pem"));
    let c = Container::open(store)?;
    assert!(matches!(
        verify_warrant(&c, WARRANT).signature,
        SignatureStatus::Unverifiable(_)
    ));
    Ok(())
}

#[test]
fn open_authority_cannot_issue_warrants() {
    let authority = examiner();
    let err = Warrant::new("aff4://w", &authority).unwrap_err();
    assert!(matches!(err, Aff4Error::AuthorityNotClosed(urn) if urn == "aff4://examiner"));
}

#[test]
fn batch_verification_reports_every_warrant() -> Result<()> {
    let mut c = Container::create(MemoryStore::new(), ContainerConfig::default())?;
    let volume = c.volume().to_string();
    c.graph_mut()
        .insert("aff4://notes", "aff4://case", "aff4://title", Object::literal("burglary"));
    let mut authority = examiner();
    authority.close(&mut c)?;

    let mut first = Warrant::new("aff4://w/1", &authority)?;
    first.assert_graph(&mut c, &volume)?;
    first.close(&mut c)?;
    let mut second = Warrant::new("aff4://w/2", &authority)?;
    second.assert_graph(&mut c, "aff4://notes")?;
    second.assert_graph(&mut c, "aff4://notes")?;
    assert_eq!(second.asserted().len(), 1);
    second.close(&mut c)?;

    // changing the notes graph only affects the second warrant
    c.graph_mut()
        .insert("aff4://notes", "aff4://case", "aff4://title", Object::literal("arson"));
    let reports = verify_all_warrants(&c);
    assert_eq!(reports.len(), 2);
    assert!(reports[0].is_valid(), "{:?}", reports[0]);
    assert_eq!(reports[1].signature, SignatureStatus::Valid);
    assert!(!reports[1].is_valid());
    Ok(())
}

#[test]
fn warrant_cannot_assert_itself() -> Result<()> {
    let mut c = Container::create(MemoryStore::new(), ContainerConfig::default())?;
    let mut authority = examiner();
    authority.close(&mut c)?;
    let mut w = Warrant::new(WARRANT, &authority)?;
    assert!(matches!(
        w.assert_graph(&mut c, WARRANT),
        Err(Aff4Error::InvalidWarrant { .. })
    ));
    Ok(())
}

#[test]
fn a_second_signer_does_not_disturb_earlier_warrants() -> Result<()> {
    let (store, volume) = signed_container()?;
    let mut c = Container::open(store)?;
    let mut reviewer = Authority::new(
        "aff4://reviewer",
        "reviewer@lab.example",
        CryptoContext::generate(512)?,
    );
    reviewer.close(&mut c)?;
    assert!(verify_warrant(&c, WARRANT).is_valid());

    let mut second = Warrant::new("aff4://warrant/2", &reviewer)?;
    second.assert_graph(&mut c, &volume)?;
    second.close(&mut c)?;
    let reports = verify_all_warrants(&c);
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.is_valid()), "{reports:?}");
    Ok(())
}

#[test]
fn a_warrant_urn_is_issued_once() -> Result<()> {
    let (store, volume) = signed_container()?;
    let mut c = Container::open(store)?;
    let authority = Authority::resume(&c, "aff4://examiner", KEY)?;

    let mut again = Warrant::new(WARRANT, &authority)?;
    let err = again.assert_graph(&mut c, &volume).unwrap_err();
    assert!(matches!(err, Aff4Error::Exists(ref urn) if urn == WARRANT), "{err}");
    let err = Warrant::new(WARRANT, &authority)?.close(&mut c).unwrap_err();
    assert!(matches!(err, Aff4Error::Exists(_)));

    assert_eq!(c.graph().objects(Some(WARRANT), WARRANT, SIGNATURE).len(), 1);
    assert!(verify_warrant(&c, WARRANT).is_valid());
    Ok(())
}
