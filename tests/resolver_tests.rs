mod common;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use common::MockDataSource;
use mimir::message::{Record, RecordClass, RecordData};
use mimir::{
    DnsClient, DnsError, DnsMessage, DnsName, IpVersion, Question, RecordType, ResolutionMode,
    ResolverConfig,
};

fn addr(a: u8, b: u8, c: u8, d: u8) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(a, b, c, d)), 53)
}

fn name(s: &str) -> DnsName {
    DnsName::parse(s).unwrap()
}

fn a_question(s: &str) -> Question {
    Question::new(name(s), RecordType::A)
}

fn a_record(owner: &str, ip: Ipv4Addr) -> Record {
    Record::new(name(owner), RecordClass::In, 300, RecordData::A(ip))
}

fn ns_record(zone: &str, target: &str) -> Record {
    Record::new(
        name(zone),
        RecordClass::In,
        300,
        RecordData::Ns(name(target)),
    )
}

/// A referral for `zone` served by `ns`, with a glue address.
fn referral(zone: &str, ns: &str, glue: Ipv4Addr) -> DnsMessage {
    DnsMessage::builder()
        .authority(ns_record(zone, ns))
        .additional(a_record(ns, glue))
        .build()
}

fn authoritative_a(owner: &str, ip: Ipv4Addr) -> DnsMessage {
    DnsMessage::builder()
        .authoritative(true)
        .answer(a_record(owner, ip))
        .build()
}

fn iterative_config() -> ResolverConfig {
    ResolverConfig {
        mode: ResolutionMode::Iterative,
        ip_version: IpVersion::V4Only,
        ..Default::default()
    }
}

const ROOT: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(198, 41, 0, 4)), 53);

#[tokio::test]
async fn iterative_walk_from_root_to_answer() {
    common::init_tracing();
    let mock = Arc::new(MockDataSource::new());
    let tld_server = addr(192, 0, 2, 10);
    let zone_server = addr(192, 0, 2, 20);
    let question = a_question("example.com");

    mock.respond(
        ROOT,
        question.clone(),
        referral("com", "ns1.gtld.test", Ipv4Addr::new(192, 0, 2, 10)),
    );
    mock.respond(
        tld_server,
        question.clone(),
        referral("example.com", "ns1.example.com", Ipv4Addr::new(192, 0, 2, 20)),
    );
    mock.respond(
        zone_server,
        question.clone(),
        authoritative_a("example.com", Ipv4Addr::new(1, 1, 1, 2)),
    );

    let client = DnsClient::with_data_source(iterative_config(), mock.clone());
    let resolved = client.query(question).await.unwrap();

    assert_eq!(resolved.message.answers.len(), 1);
    assert_eq!(
        resolved.message.answers[0].data,
        RecordData::A(Ipv4Addr::new(1, 1, 1, 2))
    );
    assert_eq!(mock.queries_to(ROOT), 1);
    assert_eq!(mock.queries_to(tld_server), 1);
    assert_eq!(mock.queries_to(zone_server), 1);
}

#[tokio::test]
async fn cached_delegation_skips_the_root() {
    let mock = Arc::new(MockDataSource::new());
    let tld_server = addr(192, 0, 2, 10);
    let zone_server = addr(192, 0, 2, 20);

    let first = a_question("example.com");
    mock.respond(
        ROOT,
        first.clone(),
        referral("com", "ns1.gtld.test", Ipv4Addr::new(192, 0, 2, 10)),
    );
    mock.respond(
        tld_server,
        first.clone(),
        referral("example.com", "ns1.example.com", Ipv4Addr::new(192, 0, 2, 20)),
    );
    mock.respond(
        zone_server,
        first.clone(),
        authoritative_a("example.com", Ipv4Addr::new(1, 1, 1, 2)),
    );

    let second = a_question("www.example.com");
    mock.respond(
        zone_server,
        second.clone(),
        authoritative_a("www.example.com", Ipv4Addr::new(1, 1, 1, 3)),
    );

    let client = DnsClient::with_data_source(iterative_config(), mock.clone());
    client.query(first).await.unwrap();
    let resolved = client.query(second).await.unwrap();

    assert_eq!(
        resolved.message.answers[0].data,
        RecordData::A(Ipv4Addr::new(1, 1, 1, 3))
    );
    // The second lookup starts at the cached example.com delegation.
    assert_eq!(mock.queries_to(ROOT), 1);
    assert_eq!(mock.queries_to(tld_server), 1);
}

#[tokio::test]
async fn referral_loop_is_fatal() {
    let mock = Arc::new(MockDataSource::new());
    let looper = addr(192, 0, 2, 10);
    let question = a_question("example.com");

    mock.respond(
        ROOT,
        question.clone(),
        referral("com", "ns1.gtld.test", Ipv4Addr::new(192, 0, 2, 10)),
    );
    // The server refers the query back to itself.
    mock.respond(
        looper,
        question.clone(),
        referral("com", "ns1.gtld.test", Ipv4Addr::new(192, 0, 2, 10)),
    );

    let client = DnsClient::with_data_source(iterative_config(), mock);
    let err = client.query(question).await.unwrap_err();
    assert!(matches!(err, DnsError::LoopDetected { .. }), "{err:?}");
}

#[tokio::test]
async fn step_budget_is_enforced() {
    let mock = Arc::new(MockDataSource::new());
    let question = a_question("example.com");
    mock.respond(
        ROOT,
        question.clone(),
        authoritative_a("example.com", Ipv4Addr::new(1, 1, 1, 2)),
    );

    let config = ResolverConfig {
        max_steps: 0,
        ..iterative_config()
    };
    let client = DnsClient::with_data_source(config, mock);
    let err = client.query(question).await.unwrap_err();
    assert!(matches!(err, DnsError::MaxStepsReached), "{err:?}");
}

#[tokio::test]
async fn cname_chain_is_followed_across_lookups() {
    let mock = Arc::new(MockDataSource::new());
    let tld_server = addr(192, 0, 2, 10);
    let zone_server = addr(192, 0, 2, 20);
    let question = a_question("www.example.com");

    mock.respond(
        ROOT,
        question.clone(),
        referral("com", "ns1.gtld.test", Ipv4Addr::new(192, 0, 2, 10)),
    );
    mock.respond(
        tld_server,
        question.clone(),
        referral("example.com", "ns1.example.com", Ipv4Addr::new(192, 0, 2, 20)),
    );
    mock.respond(
        zone_server,
        question.clone(),
        DnsMessage::builder()
            .authoritative(true)
            .answer(Record::new(
                name("www.example.com"),
                RecordClass::In,
                300,
                RecordData::Cname(name("cdn.example.com")),
            ))
            .build(),
    );
    // The follow-up starts at the cached example.com delegation.
    mock.respond(
        zone_server,
        a_question("cdn.example.com"),
        authoritative_a("cdn.example.com", Ipv4Addr::new(1, 1, 1, 4)),
    );

    let client = DnsClient::with_data_source(iterative_config(), mock);
    let resolved = client.query(question.clone()).await.unwrap();

    assert_eq!(resolved.message.questions, vec![question]);
    assert_eq!(resolved.message.answers.len(), 2);
    assert!(matches!(
        resolved.message.answers[0].data,
        RecordData::Cname(_)
    ));
    assert_eq!(
        resolved.message.answers[1].data,
        RecordData::A(Ipv4Addr::new(1, 1, 1, 4))
    );
}

#[tokio::test]
async fn forwarder_without_recursion_is_blacklisted() {
    let mock = Arc::new(MockDataSource::new());
    let lame = addr(10, 0, 0, 1);
    let good = addr(10, 0, 0, 2);

    let first = a_question("example.com");
    let second = a_question("other.com");

    // The lame server answers but never sets the RA bit.
    let mut no_ra = authoritative_a("example.com", Ipv4Addr::new(1, 1, 1, 2));
    no_ra.recursion_available = false;
    mock.respond(lame, first.clone(), no_ra);

    let mut good_first = authoritative_a("example.com", Ipv4Addr::new(1, 1, 1, 2));
    good_first.recursion_available = true;
    mock.respond(good, first.clone(), good_first);
    let mut good_second = authoritative_a("other.com", Ipv4Addr::new(1, 1, 1, 3));
    good_second.recursion_available = true;
    mock.respond(good, second.clone(), good_second);

    let config = ResolverConfig {
        mode: ResolutionMode::Forwarding,
        forward_servers: vec![lame, good],
        use_hardcoded_fallback_servers: false,
        ip_version: IpVersion::V4Only,
        ..Default::default()
    };
    let client = DnsClient::with_data_source(config, mock.clone());

    client.query(first).await.unwrap();
    client.query(second).await.unwrap();

    // The lame server was tried once and never again.
    assert_eq!(mock.queries_to(lame), 1);
    assert_eq!(mock.queries_to(good), 2);
}

#[tokio::test]
async fn dead_forwarder_falls_back_to_iteration() {
    let mock = Arc::new(MockDataSource::new());
    let forwarder = addr(10, 0, 0, 1);
    let question = a_question("example.com");

    // The forwarder never answers; the full answer is reachable by walking
    // the tree.
    mock.respond(
        ROOT,
        question.clone(),
        referral("example.com", "ns1.example.com", Ipv4Addr::new(192, 0, 2, 20)),
    );
    mock.respond(
        addr(192, 0, 2, 20),
        question.clone(),
        authoritative_a("example.com", Ipv4Addr::new(1, 1, 1, 2)),
    );

    let config = ResolverConfig {
        mode: ResolutionMode::ForwardingWithIterativeFallback,
        forward_servers: vec![forwarder],
        use_hardcoded_fallback_servers: false,
        ip_version: IpVersion::V4Only,
        ..Default::default()
    };
    let client = DnsClient::with_data_source(config, mock.clone());
    let resolved = client.query(question).await.unwrap();

    assert_eq!(
        resolved.message.answers[0].data,
        RecordData::A(Ipv4Addr::new(1, 1, 1, 2))
    );
    assert_eq!(mock.queries_to(forwarder), 1);
    assert_eq!(mock.queries_to(ROOT), 1);
}

#[tokio::test]
async fn all_candidates_failing_aggregates_errors() {
    let mock = Arc::new(MockDataSource::new());
    let config = ResolverConfig {
        mode: ResolutionMode::Forwarding,
        forward_servers: vec![addr(10, 0, 0, 1), addr(10, 0, 0, 2)],
        use_hardcoded_fallback_servers: false,
        ip_version: IpVersion::V4Only,
        ..Default::default()
    };
    let client = DnsClient::with_data_source(config, mock);

    let err = client.query(a_question("example.com")).await.unwrap_err();
    match err {
        DnsError::NoServersReached(causes) => assert_eq!(causes.len(), 2),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn repeated_query_is_served_from_cache() {
    let mock = Arc::new(MockDataSource::new());
    let server = addr(10, 0, 0, 1);
    let question = a_question("example.com");

    let mut response = authoritative_a("example.com", Ipv4Addr::new(1, 1, 1, 2));
    response.recursion_available = true;
    mock.respond(server, question.clone(), response);

    let config = ResolverConfig {
        mode: ResolutionMode::Forwarding,
        forward_servers: vec![server],
        use_hardcoded_fallback_servers: false,
        ip_version: IpVersion::V4Only,
        ..Default::default()
    };
    let client = DnsClient::with_data_source(config, mock.clone());

    client.query(question.clone()).await.unwrap();
    client.query(question).await.unwrap();

    assert_eq!(mock.queries_to(server), 1);
    assert_eq!(client.cache_stats().hits, 1);
}
