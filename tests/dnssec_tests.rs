mod common;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};

use common::MockDataSource;
use mimir::dnssec::verifier::signed_data;
use mimir::dnssec::{digest, key_tag, TrustAnchorStore, UnverifiedReason};
use mimir::message::{Dnskey, Ds, Record, RecordClass, RecordData, Rrsig};
use mimir::{
    DnsClient, DnsError, DnsMessage, DnsName, IpVersion, Question, RecordType, ResolutionMode,
    ResolverConfig,
};

const ED25519: u8 = 15;

const SERVER: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 53)), 53);

fn name(s: &str) -> DnsName {
    DnsName::parse(s).unwrap()
}

fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as u32
}

/// A zone with a single Ed25519 key that acts as both KSK and ZSK.
struct TestZone {
    name: DnsName,
    pair: Ed25519KeyPair,
    dnskey: Dnskey,
    key_tag: u16,
}

impl TestZone {
    fn new(zone: &str) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
        let dnskey = Dnskey {
            flags: Dnskey::FLAG_ZONE | Dnskey::FLAG_SECURE_ENTRY_POINT,
            protocol: 3,
            algorithm: ED25519,
            public_key: pair.public_key().as_ref().to_vec(),
        };
        let key_tag = key_tag::key_tag(&dnskey);
        TestZone {
            name: name(zone),
            pair,
            dnskey,
            key_tag,
        }
    }

    fn dnskey_record(&self) -> Record {
        Record::new(
            self.name.clone(),
            RecordClass::In,
            3600,
            RecordData::Dnskey(self.dnskey.clone()),
        )
    }

    fn ds(&self) -> Ds {
        Ds {
            key_tag: self.key_tag,
            algorithm: ED25519,
            digest_type: digest::SHA_256,
            digest: digest::dnskey_digest(&self.name, &self.dnskey, digest::SHA_256).unwrap(),
        }
    }

    fn ds_record(&self) -> Record {
        Record::new(
            self.name.clone(),
            RecordClass::In,
            3600,
            RecordData::Ds(self.ds()),
        )
    }

    fn sign(&self, records: &[Record]) -> Record {
        let owner = records[0].name.clone();
        let mut sig = Rrsig {
            type_covered: records[0].rtype(),
            algorithm: ED25519,
            labels: owner.label_count() as u8,
            original_ttl: records[0].ttl,
            expiration: now() + 3600,
            inception: now().saturating_sub(3600),
            key_tag: self.key_tag,
            signer: self.name.clone(),
            signature: Vec::new(),
        };
        sig.signature = self
            .pair
            .sign(&signed_data(&owner, records, &sig))
            .as_ref()
            .to_vec();
        Record::new(
            owner,
            RecordClass::In,
            records[0].ttl,
            RecordData::Rrsig(sig),
        )
    }
}

/// An upstream response carrying the given records plus the signer's RRSIG,
/// with the flags a validating forwarder must echo.
fn signed_response(signer: &TestZone, records: Vec<Record>) -> DnsMessage {
    let sig = signer.sign(&records);
    let mut builder = DnsMessage::builder()
        .recursion_available(true)
        .checking_disabled(true)
        .dnssec_ok();
    for record in records {
        builder = builder.answer(record);
    }
    builder.answer(sig).build()
}

fn negative_response() -> DnsMessage {
    DnsMessage::builder()
        .recursion_available(true)
        .checking_disabled(true)
        .dnssec_ok()
        .build()
}

struct Fixture {
    mock: Arc<MockDataSource>,
    root: TestZone,
    com: TestZone,
    example: TestZone,
    question: Question,
}

/// A three-level chain: root signs com's DS, com signs example.com's DS,
/// example.com signs the answer.
fn chain_fixture() -> Fixture {
    let mock = Arc::new(MockDataSource::new());
    let root = TestZone::new(".");
    let com = TestZone::new("com");
    let example = TestZone::new("example.com");

    let question = Question::new(name("example.com"), RecordType::A);
    let answer = Record::new(
        name("example.com"),
        RecordClass::In,
        300,
        RecordData::A(Ipv4Addr::new(1, 1, 1, 2)),
    );
    mock.respond(
        SERVER,
        question.clone(),
        signed_response(&example, vec![answer]),
    );

    for zone in [&root, &com, &example] {
        mock.respond(
            SERVER,
            Question::new(zone.name.clone(), RecordType::Dnskey),
            signed_response(zone, vec![zone.dnskey_record()]),
        );
    }
    mock.respond(
        SERVER,
        Question::new(name("com"), RecordType::Ds),
        signed_response(&root, vec![com.ds_record()]),
    );
    mock.respond(
        SERVER,
        Question::new(name("example.com"), RecordType::Ds),
        signed_response(&com, vec![example.ds_record()]),
    );

    Fixture {
        mock,
        root,
        com,
        example,
        question,
    }
}

fn validating_client(fixture: &Fixture, anchors: TrustAnchorStore) -> DnsClient {
    let config = ResolverConfig {
        mode: ResolutionMode::Forwarding,
        forward_servers: vec![SERVER],
        use_hardcoded_fallback_servers: false,
        ip_version: IpVersion::V4Only,
        ask_for_dnssec: true,
        ..Default::default()
    };
    DnsClient::with_data_source(config, fixture.mock.clone()).trust_anchors(Arc::new(anchors))
}

fn root_anchor(fixture: &Fixture) -> TrustAnchorStore {
    let anchors = TrustAnchorStore::empty();
    anchors.add(DnsName::root(), fixture.root.ds());
    anchors
}

#[tokio::test]
async fn full_chain_authenticates() {
    common::init_tracing();
    let fixture = chain_fixture();
    let client = validating_client(&fixture, root_anchor(&fixture));

    let resolved = client.query(fixture.question.clone()).await.unwrap();
    assert!(resolved.is_authentic(), "{:?}", resolved.unverified_reasons);
    assert!(resolved.message.authentic_data);
    // Signatures are stripped from the authenticated answer.
    assert!(resolved
        .message
        .answers
        .iter()
        .all(|r| r.rtype() == RecordType::A));
}

#[tokio::test]
async fn tampered_signature_is_fatal() {
    let fixture = chain_fixture();

    // Replace the answer with one whose signature bytes are corrupted.
    let answer = Record::new(
        name("example.com"),
        RecordClass::In,
        300,
        RecordData::A(Ipv4Addr::new(1, 1, 1, 2)),
    );
    let mut response = signed_response(&fixture.example, vec![answer]);
    for record in &mut response.answers {
        if let RecordData::Rrsig(sig) = &mut record.data {
            if let Some(last) = sig.signature.last_mut() {
                *last ^= 0xFF;
            }
        }
    }
    fixture
        .mock
        .respond(SERVER, fixture.question.clone(), response);

    let client = validating_client(&fixture, root_anchor(&fixture));
    let err = client.query(fixture.question.clone()).await.unwrap_err();
    assert!(matches!(err, DnsError::ValidationFailed(_)), "{err:?}");
}

#[tokio::test]
async fn missing_ds_is_soft_unverified() {
    let fixture = chain_fixture();
    // The parent zone no longer publishes a DS for example.com.
    fixture.mock.respond(
        SERVER,
        Question::new(name("example.com"), RecordType::Ds),
        negative_response(),
    );

    let client = validating_client(&fixture, root_anchor(&fixture));
    let resolved = client.query(fixture.question.clone()).await.unwrap();

    assert!(!resolved.is_authentic());
    assert!(resolved
        .unverified_reasons
        .contains(&UnverifiedReason::NoTrustAnchor {
            zone: name("example.com")
        }));
    // The answer itself is still delivered.
    assert_eq!(resolved.message.answers[0].rtype(), RecordType::A);
}

#[tokio::test]
async fn no_trust_anchor_reports_insecure_root() {
    let fixture = chain_fixture();
    let client = validating_client(&fixture, TrustAnchorStore::empty());

    let resolved = client.query(fixture.question.clone()).await.unwrap();
    assert!(!resolved.is_authentic());
    assert_eq!(
        resolved.unverified_reasons.first(),
        Some(&UnverifiedReason::NoRootSecureEntryPoint)
    );
}

#[tokio::test]
async fn anchor_mismatch_is_reported() {
    let fixture = chain_fixture();
    // Anchor a key the root zone does not actually use.
    let impostor = TestZone::new(".");
    let anchors = TrustAnchorStore::empty();
    anchors.add(DnsName::root(), impostor.ds());

    let client = validating_client(&fixture, anchors);
    let resolved = client.query(fixture.question.clone()).await.unwrap();

    assert!(!resolved.is_authentic());
    assert!(resolved.unverified_reasons.iter().any(|r| matches!(
        r,
        UnverifiedReason::ConflictsWithTrustAnchor { .. }
    )));
}

#[tokio::test]
async fn ds_pointing_at_unpublished_key_is_fatal() {
    let fixture = chain_fixture();

    // The parent vouches, with a valid signature, for a key example.com
    // never published. That is an inconsistent chain, not a missing one.
    let impostor = TestZone::new("example.com");
    fixture.mock.respond(
        SERVER,
        Question::new(name("example.com"), RecordType::Ds),
        signed_response(&fixture.com, vec![impostor.ds_record()]),
    );

    let client = validating_client(&fixture, root_anchor(&fixture));
    let err = client.query(fixture.question.clone()).await.unwrap_err();
    assert!(matches!(err, DnsError::ValidationFailed(_)), "{err:?}");
}

#[tokio::test]
async fn unsigned_answer_is_soft_unverified() {
    let fixture = chain_fixture();
    let unsigned = DnsMessage::builder()
        .recursion_available(true)
        .checking_disabled(true)
        .dnssec_ok()
        .answer(Record::new(
            name("example.com"),
            RecordClass::In,
            300,
            RecordData::A(Ipv4Addr::new(1, 1, 1, 2)),
        ))
        .build();
    fixture
        .mock
        .respond(SERVER, fixture.question.clone(), unsigned);

    let client = validating_client(&fixture, root_anchor(&fixture));
    let resolved = client.query(fixture.question.clone()).await.unwrap();

    assert!(!resolved.is_authentic());
    assert!(resolved
        .unverified_reasons
        .iter()
        .any(|r| matches!(r, UnverifiedReason::NoSignatures { .. })));
}

#[tokio::test]
async fn lookaside_zone_substitutes_for_missing_ds() {
    let fixture = chain_fixture();
    let dlv = TestZone::new("dlv.test");

    // No DS for example.com, but the lookaside zone vouches for its key.
    fixture.mock.respond(
        SERVER,
        Question::new(name("example.com"), RecordType::Ds),
        negative_response(),
    );
    let dlv_entry = Record::new(
        name("example.com.dlv.test"),
        RecordClass::In,
        3600,
        RecordData::Dlv(fixture.example.ds()),
    );
    fixture.mock.respond(
        SERVER,
        Question::new(name("example.com.dlv.test"), RecordType::Dlv),
        signed_response(&dlv, vec![dlv_entry]),
    );
    fixture.mock.respond(
        SERVER,
        Question::new(name("dlv.test"), RecordType::Dnskey),
        signed_response(&dlv, vec![dlv.dnskey_record()]),
    );

    let anchors = root_anchor(&fixture);
    anchors.add(name("dlv.test"), dlv.ds());

    let config = ResolverConfig {
        mode: ResolutionMode::Forwarding,
        forward_servers: vec![SERVER],
        use_hardcoded_fallback_servers: false,
        ip_version: IpVersion::V4Only,
        ask_for_dnssec: true,
        dlv_zone: Some(name("dlv.test")),
        ..Default::default()
    };
    let client = DnsClient::with_data_source(config, fixture.mock.clone())
        .trust_anchors(Arc::new(anchors));

    let resolved = client.query(fixture.question.clone()).await.unwrap();
    assert!(resolved.is_authentic(), "{:?}", resolved.unverified_reasons);
}

#[tokio::test]
async fn negative_answer_without_denial_proof() {
    let fixture = chain_fixture();
    let missing = Question::new(name("missing.example.com"), RecordType::A);
    fixture.mock.respond(SERVER, missing.clone(), negative_response());

    let client = validating_client(&fixture, root_anchor(&fixture));
    let resolved = client.query(missing.clone()).await.unwrap();

    assert!(!resolved.is_authentic());
    assert!(resolved
        .unverified_reasons
        .iter()
        .any(|r| matches!(r, UnverifiedReason::NsecMismatch { .. })));
}

#[tokio::test]
async fn signed_nsec_proves_negative_answer() {
    let fixture = chain_fixture();
    let missing = Question::new(name("missing.example.com"), RecordType::A);

    let nsec = Record::new(
        name("example.com"),
        RecordClass::In,
        300,
        RecordData::Nsec(mimir::message::Nsec {
            next: name("zz.example.com"),
            types: vec![RecordType::A, RecordType::Soa],
        }),
    );
    let sig = fixture.example.sign(&[nsec.clone()]);
    let response = DnsMessage::builder()
        .recursion_available(true)
        .checking_disabled(true)
        .dnssec_ok()
        .authority(nsec)
        .authority(sig)
        .build();
    fixture.mock.respond(SERVER, missing.clone(), response);

    let client = validating_client(&fixture, root_anchor(&fixture));
    let resolved = client.query(missing.clone()).await.unwrap();

    assert!(resolved.is_authentic(), "{:?}", resolved.unverified_reasons);
    // Stripping removes the signatures but keeps the denial proof: for a
    // negative answer the NSEC record is the answer.
    assert!(resolved
        .message
        .authorities
        .iter()
        .any(|r| r.rtype() == RecordType::Nsec));
    assert!(resolved
        .message
        .authorities
        .iter()
        .all(|r| r.rtype() != RecordType::Rrsig));
}
